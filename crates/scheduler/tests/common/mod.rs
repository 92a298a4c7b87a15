use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use floorline_scheduler::{MachineProbe, ProbeError, SkillState, StorageProbe, StorageQuery};

/// Storage holding a fixed list of product/carrier ids.
pub struct Shelf {
    pub items: Vec<String>,
}

#[async_trait]
impl StorageProbe for Shelf {
    fn name(&self) -> &str {
        "Shelf"
    }

    async fn contains(&self, query: &StorageQuery) -> Result<bool, ProbeError> {
        let wanted = [&query.product_id, &query.carrier_id];
        Ok(wanted
            .iter()
            .filter_map(|v| v.as_deref())
            .any(|v| self.items.iter().any(|i| i == v)))
    }
}

/// Machine whose coupling and lock can be flipped during a test.
pub struct FakeMachine {
    name: String,
    coupled: AtomicBool,
    locked: AtomicBool,
    shelf: Arc<Shelf>,
}

impl FakeMachine {
    pub fn new(name: &str, items: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            coupled: AtomicBool::new(true),
            locked: AtomicBool::new(true),
            shelf: Arc::new(Shelf {
                items: items.iter().map(|s| s.to_string()).collect(),
            }),
        })
    }

    pub fn set_coupled(&self, coupled: bool) {
        self.coupled.store(coupled, Ordering::SeqCst);
    }
}

#[async_trait]
impl MachineProbe for FakeMachine {
    fn name(&self) -> &str {
        &self.name
    }

    async fn is_coupled(&self) -> Result<bool, ProbeError> {
        Ok(self.coupled.load(Ordering::SeqCst))
    }

    async fn startup_skill_state(&self) -> Result<Option<SkillState>, ProbeError> {
        Ok(Some(SkillState::Running))
    }

    async fn is_locked_by_us(&self) -> Result<bool, ProbeError> {
        Ok(self.locked.load(Ordering::SeqCst))
    }

    fn storages(&self) -> Vec<Arc<dyn StorageProbe>> {
        vec![self.shelf.clone() as Arc<dyn StorageProbe>]
    }
}
