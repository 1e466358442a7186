//! Provider data structure passed to resources

use crate::api::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Pauses between lifecycle steps that Proxmox needs to settle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleDelays {
    /// After applying configuration to an existing VM
    pub settle: Duration,
    pub before_start: Duration,
    pub after_stop: Duration,
    pub task_poll: Duration,
}

impl Default for LifecycleDelays {
    fn default() -> Self {
        Self {
            settle: Duration::from_secs(5),
            before_start: Duration::from_secs(15),
            after_stop: Duration::from_secs(2),
            task_poll: Duration::from_secs(1),
        }
    }
}

impl LifecycleDelays {
    pub fn none() -> Self {
        Self {
            settle: Duration::ZERO,
            before_start: Duration::ZERO,
            after_stop: Duration::ZERO,
            task_poll: Duration::from_millis(10),
        }
    }
}

#[derive(Clone)]
pub struct ProxmoxProviderData {
    pub client: Arc<Client>,
    /// Bounds how many VM operations run against the cluster at once
    pub semaphore: Arc<Semaphore>,
    pub task_timeout: Duration,
    pub delays: LifecycleDelays,
}

impl ProxmoxProviderData {
    pub fn new(client: Client, parallel: usize, task_timeout: Duration) -> Self {
        Self {
            client: Arc::new(client),
            semaphore: Arc::new(Semaphore::new(parallel.max(1))),
            task_timeout,
            delays: LifecycleDelays::default(),
        }
    }

    pub fn with_delays(mut self, delays: LifecycleDelays) -> Self {
        self.delays = delays;
        self
    }
}
