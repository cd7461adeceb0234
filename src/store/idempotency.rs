use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::{AllocationOutcome, AllocationRequest};

#[derive(Debug, Clone)]
enum Slot {
    /// Claimed by a commit that has not finished yet
    Pending {
        request: AllocationRequest,
        claim: Uuid,
        reserved_at: Instant,
    },
    Committed(StoredAllocation),
}

impl Slot {
    fn since(&self) -> Instant {
        match self {
            Slot::Pending { reserved_at, .. } => *reserved_at,
            Slot::Committed(stored) => stored.stored_at,
        }
    }
}

/// Allocations keyed by caller-supplied request id.
///
/// An id is claimed with [`IdempotencyStore::reserve`] before any entity is
/// touched, so two commits carrying the same id can never both allocate.
#[derive(Clone)]
pub struct IdempotencyStore(Arc<DashMap<Uuid, Slot>>);

impl Default for IdempotencyStore {
    fn default() -> Self {
        Self(Arc::new(DashMap::new()))
    }
}

/// Result of claiming a request id.
#[derive(Debug)]
pub enum Reservation {
    /// The id is held until the guard is completed or dropped
    Reserved(PendingRequest),
    /// The same request was already committed
    Replay(AllocationOutcome),
}

impl IdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `request_id` for `request`.
    ///
    /// An id still being committed is a conflict even for an identical
    /// payload; the caller may retry once the first commit settles. Entries
    /// older than `ttl` are treated as free.
    pub fn reserve(
        &self,
        request_id: Uuid,
        request: &AllocationRequest,
        ttl: Duration,
    ) -> Result<Reservation, ServiceError> {
        let claim = Uuid::new_v4();
        let pending = || Slot::Pending {
            request: request.clone(),
            claim,
            reserved_at: Instant::now(),
        };

        match self.0.entry(request_id) {
            Entry::Vacant(slot) => {
                slot.insert(pending());
            }
            Entry::Occupied(mut slot) => {
                if slot.get().since().elapsed() < ttl {
                    return match slot.get() {
                        Slot::Committed(stored) if stored.request.same_payload(request) => {
                            Ok(Reservation::Replay(stored.outcome.clone()))
                        }
                        Slot::Committed(_) => Err(ServiceError::Conflict(format!(
                            "Request id {} was already used for a different allocation",
                            request_id
                        ))),
                        Slot::Pending { .. } => Err(ServiceError::Conflict(format!(
                            "Request id {} is already being committed",
                            request_id
                        ))),
                    };
                }
                slot.insert(pending());
            }
        }

        debug!(%request_id, "Reserved request id");
        Ok(Reservation::Reserved(PendingRequest {
            store: self.clone(),
            request_id,
            claim,
            settled: false,
        }))
    }

    /// The committed allocation for `request_id`, if it is younger than `ttl`.
    pub fn get(&self, request_id: &Uuid, ttl: Duration) -> Option<StoredAllocation> {
        match self.0.get(request_id).as_deref() {
            Some(Slot::Committed(stored)) if stored.stored_at.elapsed() < ttl => {
                Some(stored.clone())
            }
            _ => None,
        }
    }

    pub fn cleanup(&self, ttl: Duration) {
        let now = Instant::now();
        self.0.retain(|_, slot| now.duration_since(slot.since()) < ttl);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn release(&self, request_id: Uuid, claim: Uuid) {
        let removed = self.0.remove_if(&request_id, |_, slot| {
            matches!(slot, Slot::Pending { claim: held, .. } if *held == claim)
        });
        if removed.is_some() {
            debug!(%request_id, "Released request id");
        }
    }
}

/// A claimed request id. Dropping it without [`PendingRequest::complete`]
/// frees the id again, so a rejected or abandoned commit can be retried.
#[derive(Debug)]
pub struct PendingRequest {
    store: IdempotencyStore,
    request_id: Uuid,
    claim: Uuid,
    settled: bool,
}

impl PendingRequest {
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Records the committed outcome for replay.
    pub fn complete(mut self, stored: StoredAllocation) {
        self.store
            .0
            .insert(self.request_id, Slot::Committed(stored));
        self.settled = true;
    }
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        if !self.settled {
            self.store.release(self.request_id, self.claim);
        }
    }
}

impl std::fmt::Debug for IdempotencyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdempotencyStore")
            .field("entries", &self.0.len())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct StoredAllocation {
    pub request: AllocationRequest,
    pub outcome: AllocationOutcome,
    pub stored_at: Instant,
}

impl StoredAllocation {
    pub fn new(request: AllocationRequest, outcome: AllocationOutcome) -> Self {
        Self {
            request,
            outcome,
            stored_at: Instant::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Rack, Shipment};
    use crate::services::allocator;
    use assert_matches::assert_matches;

    const TTL: Duration = Duration::from_secs(60);

    fn stored() -> (Uuid, StoredAllocation) {
        let shipment = Shipment::new("SHP-4", 4, 0);
        let rack = Rack::new("R-01", 10);
        let request_id = Uuid::new_v4();
        let request = allocator::fit_to_rack(&allocator::propose(&shipment), &rack)
            .with_request_id(request_id);
        let outcome = allocator::commit(&request, &shipment, &rack).unwrap();
        (request_id, StoredAllocation::new(request, outcome))
    }

    fn reserved(reservation: Result<Reservation, ServiceError>) -> PendingRequest {
        match reservation {
            Ok(Reservation::Reserved(pending)) => pending,
            other => panic!("expected a fresh reservation, got {:?}", other),
        }
    }

    #[test]
    fn id_is_held_until_the_commit_settles() {
        let store = IdempotencyStore::new();
        let (request_id, entry) = stored();
        let request = entry.request.clone();

        let pending = reserved(store.reserve(request_id, &request, TTL));
        assert_eq!(pending.request_id(), request_id);
        assert_matches!(
            store.reserve(request_id, &request, TTL),
            Err(ServiceError::Conflict(_))
        );

        pending.complete(entry);

        assert_matches!(
            store.reserve(request_id, &request, TTL),
            Ok(Reservation::Replay(outcome)) if outcome.allocated_boxes == 4
        );
        let other = AllocationRequest::new(request.shipment_id, request.rack_id, 0, 1)
            .with_request_id(request_id);
        assert_matches!(
            store.reserve(request_id, &other, TTL),
            Err(ServiceError::Conflict(_))
        );
        assert_eq!(store.get(&request_id, TTL).unwrap().outcome.allocated_boxes, 4);
    }

    #[test]
    fn dropped_reservation_frees_the_id() {
        let store = IdempotencyStore::new();
        let (request_id, entry) = stored();

        drop(reserved(store.reserve(request_id, &entry.request, TTL)));

        assert!(store.is_empty());
        assert!(store.get(&request_id, TTL).is_none());
        let again = reserved(store.reserve(request_id, &entry.request, TTL));
        again.complete(entry);
        assert!(store.get(&request_id, TTL).is_some());
    }

    #[test]
    fn stale_release_leaves_a_newer_claim_alone() {
        let store = IdempotencyStore::new();
        let (request_id, entry) = stored();

        let stale = reserved(store.reserve(request_id, &entry.request, TTL));
        // A zero ttl lets the second caller take over the abandoned claim
        let fresh = reserved(store.reserve(request_id, &entry.request, Duration::ZERO));
        drop(stale);

        assert_matches!(
            store.reserve(request_id, &entry.request, TTL),
            Err(ServiceError::Conflict(_))
        );
        drop(fresh);
        assert!(store.is_empty());
    }

    #[test]
    fn expired_entries_are_ignored_and_cleaned() {
        let store = IdempotencyStore::new();
        let (request_id, entry) = stored();
        reserved(store.reserve(request_id, &entry.request, TTL)).complete(entry);

        assert!(store.get(&request_id, Duration::ZERO).is_none());
        store.cleanup(Duration::ZERO);
        assert!(store.is_empty());
    }
}
