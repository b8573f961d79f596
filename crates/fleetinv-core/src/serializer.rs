//! Per-agent mutual exclusion for inventory reports

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockMap = DashMap<String, Arc<Mutex<()>>>;

/// Keyed lock map ensuring one report per agent is merged at a time
///
/// Reports from different agents never wait on each other. Entries are
/// removed once no permit holds or awaits them.
#[derive(Debug, Clone, Default)]
pub struct ReportSerializer {
    locks: Arc<LockMap>,
}

impl ReportSerializer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to the agent's inventory
    pub async fn acquire(&self, agent: &str) -> ReportPermit {
        let lock = Arc::clone(self.locks.entry(agent.to_string()).or_default().value());
        let guard = lock.lock_owned().await;

        ReportPermit {
            agent: agent.to_string(),
            guard: Some(guard),
            locks: Arc::clone(&self.locks),
        }
    }

    /// Number of agents with a held or awaited permit
    #[must_use]
    pub fn active(&self) -> usize {
        self.locks.len()
    }
}

/// Exclusive access to one agent's inventory, released on drop
#[derive(Debug)]
pub struct ReportPermit {
    agent: String,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<LockMap>,
}

impl ReportPermit {
    #[must_use]
    pub fn agent(&self) -> &str {
        &self.agent
    }
}

impl Drop for ReportPermit {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks
            .remove_if(&self.agent, |_, lock| Arc::strong_count(lock) == 1);
    }
}
