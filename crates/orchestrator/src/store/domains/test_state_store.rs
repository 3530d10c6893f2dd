use crate::models::test_state::TestState;
use crate::store::core::StoreEvent;
use std::collections::{HashMap, HashSet};
use tokio::sync::{broadcast, RwLock};

#[derive(Debug, Default)]
struct TestStates {
    states: HashMap<String, TestState>,
    // Nodes with a trigger that has not stored its outcome yet
    in_flight: HashSet<String>,
}

/// One test state per node name. Entries outlive their node in the directory.
pub struct TestStateStore {
    inner: RwLock<TestStates>,
    events: broadcast::Sender<StoreEvent>,
}

impl TestStateStore {
    pub fn new(events: broadcast::Sender<StoreEvent>) -> Self {
        Self {
            inner: RwLock::new(TestStates::default()),
            events,
        }
    }

    pub async fn get(&self, node_name: &str) -> TestState {
        self.inner
            .read()
            .await
            .states
            .get(node_name)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn snapshot(&self) -> HashMap<String, TestState> {
        self.inner.read().await.states.clone()
    }

    pub async fn is_in_flight(&self, node_name: &str) -> bool {
        self.inner.read().await.in_flight.contains(node_name)
    }

    /// Claims the node for a new test and marks it `Running`.
    ///
    /// Returns `false`, changing nothing, if a test on the node is in flight.
    pub async fn try_begin(&self, node_name: &str) -> bool {
        let mut inner = self.inner.write().await;
        if !inner.in_flight.insert(node_name.to_string()) {
            return false;
        }
        inner
            .states
            .insert(node_name.to_string(), TestState::Running);
        drop(inner);

        self.publish_change(node_name);
        true
    }

    /// Stores the outcome of a test started with [`TestStateStore::try_begin`].
    pub async fn finish(&self, node_name: &str, state: TestState) {
        let mut inner = self.inner.write().await;
        inner.in_flight.remove(node_name);
        inner.states.insert(node_name.to_string(), state);
        drop(inner);

        self.publish_change(node_name);
    }

    /// Releases a claim whose test never stored an outcome, leaving the node
    /// `Idle`.
    pub async fn abandon(&self, node_name: &str) {
        let mut inner = self.inner.write().await;
        Self::release(&mut inner, node_name);
        drop(inner);

        self.publish_change(node_name);
    }

    /// Same as [`TestStateStore::abandon`] without waiting for the lock.
    /// Returns `false` if the lock was busy and nothing changed.
    pub fn try_abandon(&self, node_name: &str) -> bool {
        let Ok(mut inner) = self.inner.try_write() else {
            return false;
        };
        Self::release(&mut inner, node_name);
        drop(inner);

        self.publish_change(node_name);
        true
    }

    fn release(inner: &mut TestStates, node_name: &str) {
        if inner.in_flight.remove(node_name) {
            inner.states.insert(node_name.to_string(), TestState::Idle);
        }
    }

    /// Starts a sequential run over `node_names`.
    ///
    /// Every listed node goes back to `Idle` and all other entries are
    /// dropped, except tests that are still in flight.
    pub async fn reset_for_run(&self, node_names: &[String]) {
        let mut inner = self.inner.write().await;
        let mut states: HashMap<String, TestState> = inner
            .in_flight
            .iter()
            .filter_map(|name| {
                inner
                    .states
                    .get(name)
                    .map(|state| (name.clone(), state.clone()))
            })
            .collect();
        for name in node_names {
            states.entry(name.clone()).or_insert(TestState::Idle);
        }
        inner.states = states;
        drop(inner);

        let _ = self.events.send(StoreEvent::TestStatesReset);
    }

    fn publish_change(&self, node_name: &str) {
        let _ = self.events.send(StoreEvent::TestStateChanged {
            node: node_name.to_string(),
        });
    }
}
