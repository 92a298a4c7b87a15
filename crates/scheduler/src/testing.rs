//! Hand-written doubles shared by the unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use floorline_bus::{BusError, EventPublisher, Message, MessageCategory, QueueSnapshot};

use crate::machine::{MachineProbe, ProbeError, SkillState, StorageProbe, StorageQuery};

/// Records every published message; can be switched to fail.
pub struct MockPublisher {
    messages: tokio::sync::Mutex<Vec<Message>>,
    failing: AtomicBool,
}

impl MockPublisher {
    pub fn new() -> Self {
        Self {
            messages: tokio::sync::Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn messages(&self) -> Vec<Message> {
        self.messages.lock().await.clone()
    }

    pub async fn on_topic(&self, topic: &str) -> Vec<Message> {
        self.messages
            .lock()
            .await
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    pub async fn with_category(&self, category: MessageCategory) -> Vec<Message> {
        self.messages
            .lock()
            .await
            .iter()
            .filter(|m| m.category() == Some(category))
            .cloned()
            .collect()
    }

    /// Decoded queue snapshots in publish order.
    pub async fn snapshots(&self) -> Vec<QueueSnapshot> {
        self.messages
            .lock()
            .await
            .iter()
            .filter(|m| m.topic.ends_with("/ActionQueue"))
            .filter_map(|m| m.decode::<QueueSnapshot>().ok())
            .collect()
    }

    pub async fn clear(&self) {
        self.messages.lock().await.clear();
    }
}

#[async_trait]
impl EventPublisher for MockPublisher {
    async fn publish(&self, message: Message) -> Result<(), BusError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(BusError::Transport("mock publisher down".into()));
        }
        self.messages.lock().await.push(message);
        Ok(())
    }
}

/// Storage unit holding a fixed set of ids/types.
pub struct ScriptedStorage {
    name: String,
    items: Vec<String>,
    error: Option<ProbeError>,
    calls: AtomicUsize,
}

impl ScriptedStorage {
    pub fn holding(name: &str, items: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            items: items.iter().map(|s| s.to_string()).collect(),
            error: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(name: &str, error: ProbeError) -> Self {
        Self {
            error: Some(error),
            ..Self::holding(name, &[])
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageProbe for ScriptedStorage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn contains(&self, query: &StorageQuery) -> Result<bool, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = &self.error {
            return Err(e.clone());
        }
        let wanted = [
            &query.product_id,
            &query.product_type,
            &query.carrier_id,
            &query.carrier_type,
        ];
        Ok(wanted
            .iter()
            .filter_map(|v| v.as_deref())
            .any(|v| self.items.iter().any(|item| item == v)))
    }
}

/// Machine whose readiness facts are set by the test.
pub struct ScriptedMachine {
    name: String,
    coupled: AtomicBool,
    locked: AtomicBool,
    startup: Mutex<Result<Option<SkillState>, ProbeError>>,
    storages: Vec<Arc<dyn StorageProbe>>,
    lock_checks: AtomicUsize,
}

impl ScriptedMachine {
    /// Coupled, startup skill running, locked by us, no storages.
    pub fn ready(name: &str) -> Self {
        Self {
            name: name.to_string(),
            coupled: AtomicBool::new(true),
            locked: AtomicBool::new(true),
            startup: Mutex::new(Ok(Some(SkillState::Running))),
            storages: Vec::new(),
            lock_checks: AtomicUsize::new(0),
        }
    }

    pub fn coupled(self, coupled: bool) -> Self {
        self.coupled.store(coupled, Ordering::SeqCst);
        self
    }

    pub fn locked(self, locked: bool) -> Self {
        self.locked.store(locked, Ordering::SeqCst);
        self
    }

    pub fn startup(self, state: Option<SkillState>) -> Self {
        *self.startup.lock().unwrap() = Ok(state);
        self
    }

    pub fn startup_error(self, error: ProbeError) -> Self {
        *self.startup.lock().unwrap() = Err(error);
        self
    }

    pub fn with_storage(mut self, storage: Arc<dyn StorageProbe>) -> Self {
        self.storages.push(storage);
        self
    }

    pub fn set_locked(&self, locked: bool) {
        self.locked.store(locked, Ordering::SeqCst);
    }

    pub fn set_coupled(&self, coupled: bool) {
        self.coupled.store(coupled, Ordering::SeqCst);
    }

    pub fn lock_checks(&self) -> usize {
        self.lock_checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MachineProbe for ScriptedMachine {
    fn name(&self) -> &str {
        &self.name
    }

    async fn is_coupled(&self) -> Result<bool, ProbeError> {
        Ok(self.coupled.load(Ordering::SeqCst))
    }

    async fn startup_skill_state(&self) -> Result<Option<SkillState>, ProbeError> {
        self.startup.lock().unwrap().clone()
    }

    async fn is_locked_by_us(&self) -> Result<bool, ProbeError> {
        self.lock_checks.fetch_add(1, Ordering::SeqCst);
        Ok(self.locked.load(Ordering::SeqCst))
    }

    fn storages(&self) -> Vec<Arc<dyn StorageProbe>> {
        self.storages.clone()
    }
}
