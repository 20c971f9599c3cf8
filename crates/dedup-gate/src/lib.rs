//! Message-level deduplication gate.
//!
//! Delivery channels may hand the same inbound request over more than once.
//! The gate records recently seen request ids per originator in an injected
//! [`SeenStore`] and turns repeats into [`GateDecision::AlreadyProcessed`]
//! before any task work starts.

use std::collections::{HashSet, VecDeque};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use taskrelay_core_types::{OriginatorId, RelayError, RequestId};
use tracing::debug;

/// Per-originator record of recently seen request ids.
#[async_trait]
pub trait SeenStore: Send + Sync {
    async fn contains(
        &self,
        originator: &OriginatorId,
        request: &RequestId,
    ) -> Result<bool, RelayError>;

    /// Record `request` for `originator`. Returns `false` when it was
    /// already present. Check and insert happen atomically.
    async fn put(&self, originator: &OriginatorId, request: RequestId) -> Result<bool, RelayError>;

    /// Forget everything recorded for `originator`.
    async fn evict(&self, originator: &OriginatorId) -> Result<(), RelayError>;

    async fn len(&self, originator: &OriginatorId) -> Result<usize, RelayError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Request ids remembered per originator before the oldest is dropped.
    /// Default: 100
    pub capacity: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self { capacity: 100 }
    }
}

/// FIFO set: membership checks are O(1), insertion order drives eviction.
#[derive(Debug)]
struct BoundedSet {
    capacity: usize,
    order: VecDeque<RequestId>,
    members: HashSet<RequestId>,
}

impl BoundedSet {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            members: HashSet::with_capacity(capacity),
        }
    }

    fn contains(&self, request: &RequestId) -> bool {
        self.members.contains(request)
    }

    fn insert(&mut self, request: RequestId) -> bool {
        if self.members.contains(&request) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.members.remove(&oldest);
            }
        }
        self.members.insert(request.clone());
        self.order.push_back(request);
        true
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}

/// Process-local [`SeenStore`]. Nothing survives a restart.
pub struct InMemorySeenStore {
    capacity: usize,
    seen: DashMap<OriginatorId, Mutex<BoundedSet>>,
}

impl InMemorySeenStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            seen: DashMap::new(),
        }
    }

    pub fn from_config(config: &DedupConfig) -> Self {
        Self::new(config.capacity)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of originators with at least one recorded request.
    pub fn originators(&self) -> usize {
        self.seen.len()
    }
}

impl Default for InMemorySeenStore {
    fn default() -> Self {
        Self::from_config(&DedupConfig::default())
    }
}

#[async_trait]
impl SeenStore for InMemorySeenStore {
    async fn contains(
        &self,
        originator: &OriginatorId,
        request: &RequestId,
    ) -> Result<bool, RelayError> {
        Ok(self
            .seen
            .get(originator)
            .map(|entry| entry.lock().contains(request))
            .unwrap_or(false))
    }

    async fn put(&self, originator: &OriginatorId, request: RequestId) -> Result<bool, RelayError> {
        let entry = self
            .seen
            .entry(originator.clone())
            .or_insert_with(|| Mutex::new(BoundedSet::new(self.capacity)));
        let inserted = entry.lock().insert(request);
        Ok(inserted)
    }

    async fn evict(&self, originator: &OriginatorId) -> Result<(), RelayError> {
        self.seen.remove(originator);
        Ok(())
    }

    async fn len(&self, originator: &OriginatorId) -> Result<usize, RelayError> {
        Ok(self
            .seen
            .get(originator)
            .map(|entry| entry.lock().len())
            .unwrap_or(0))
    }
}

/// Verdict for one inbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateDecision {
    Proceed,
    AlreadyProcessed,
}

impl GateDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proceed => "proceed",
            Self::AlreadyProcessed => "already_processed",
        }
    }
}

pub struct DedupGate<S> {
    store: S,
}

impl<S: SeenStore> DedupGate<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Admit a request the first time its id is seen for this originator.
    pub async fn admit(
        &self,
        request: &RequestId,
        originator: &OriginatorId,
    ) -> Result<GateDecision, RelayError> {
        if self.store.put(originator, request.clone()).await? {
            Ok(GateDecision::Proceed)
        } else {
            debug!(originator = %originator, request = %request, "duplicate request dropped");
            Ok(GateDecision::AlreadyProcessed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_set_evicts_oldest() {
        let mut set = BoundedSet::new(2);
        assert!(set.insert(RequestId::from("a")));
        assert!(set.insert(RequestId::from("b")));
        assert!(!set.insert(RequestId::from("a")));
        assert!(set.insert(RequestId::from("c")));
        assert_eq!(set.len(), 2);
        assert!(!set.contains(&RequestId::from("a")));
        assert!(set.contains(&RequestId::from("b")));
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let store = InMemorySeenStore::new(0);
        assert_eq!(store.capacity(), 1);
    }

    #[test]
    fn decision_wire_names() {
        assert_eq!(GateDecision::AlreadyProcessed.as_str(), "already_processed");
        assert_eq!(
            serde_json::to_value(GateDecision::Proceed).unwrap(),
            "proceed"
        );
    }

    #[tokio::test]
    async fn store_isolates_originators() {
        let store = InMemorySeenStore::new(10);
        let alice = OriginatorId::from("alice");
        let bob = OriginatorId::from("bob");

        assert!(store.put(&alice, RequestId::from("1")).await.unwrap());
        assert!(store.put(&bob, RequestId::from("1")).await.unwrap());
        assert!(store.contains(&alice, &RequestId::from("1")).await.unwrap());
        assert_eq!(store.originators(), 2);

        store.evict(&alice).await.unwrap();
        assert_eq!(store.len(&alice).await.unwrap(), 0);
        assert_eq!(store.len(&bob).await.unwrap(), 1);
    }
}
