//! Event bus for broadcasting freshly recorded attacks to live dashboards

use crate::db::AttackRecord;
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Arc<AttackRecord>>,
}

impl EventBus {
    pub fn new(sender: broadcast::Sender<Arc<AttackRecord>>) -> Self {
        Self { sender }
    }

    /// Lossy by design: a send with no subscribers, or to a lagging one,
    /// never affects the request path.
    pub fn publish(&self, record: AttackRecord) {
        let _ = self.sender.send(Arc::new(record));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<AttackRecord>> {
        self.sender.subscribe()
    }
}
