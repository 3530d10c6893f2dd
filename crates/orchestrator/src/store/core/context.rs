use crate::store::domains::directory_store::DirectoryStore;
use crate::store::domains::test_state_store::TestStateStore;
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    DirectoryChanged,
    TestStateChanged { node: String },
    TestStatesReset,
}

/// All orchestrator state. Refresh and test operations get it passed in
/// explicitly as an `Arc<StoreContext>`.
pub struct StoreContext {
    pub directory_store: DirectoryStore,
    pub test_state_store: TestStateStore,
    events: broadcast::Sender<StoreEvent>,
}

impl StoreContext {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            directory_store: DirectoryStore::new(events.clone()),
            test_state_store: TestStateStore::new(events.clone()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}

impl Default for StoreContext {
    fn default() -> Self {
        Self::new()
    }
}
