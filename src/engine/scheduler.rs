//! Periodic scan scheduling
//!
//! Enqueues one scan per registered repository on a fixed cadence, with
//! an inter-job delay so downstream registries and oracles are not
//! saturated by a burst of lookups. Delivery is at-least-once: a cycle
//! that overlaps an in-flight scan simply gets refused by the engine's
//! single-flight permit and retried on the next tick.

use super::{ScanEngine, ScanStatus};
use std::sync::Arc;
use std::time::Duration;

pub struct ScanScheduler {
    interval: Duration,
    /// Pause between consecutive repository scans within one cycle
    stagger: Duration,
}

impl ScanScheduler {
    pub fn new(interval: Duration, stagger: Duration) -> Self {
        Self { interval, stagger }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run scan cycles forever. Individual failures never stop the
    /// scheduler.
    pub async fn run(&self, engine: Arc<ScanEngine>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.run_cycle(&engine).await;
        }
    }

    /// One pass over every registered repository. Returns the number of
    /// completed scans.
    pub async fn run_cycle(&self, engine: &ScanEngine) -> usize {
        let repositories = match engine.store().repositories() {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(error = %e, "failed to list repositories");
                return 0;
            }
        };

        tracing::info!(repositories = repositories.len(), "scan cycle started");
        let mut completed = 0usize;

        for (i, repo) in repositories.iter().enumerate() {
            if i > 0 && !self.stagger.is_zero() {
                tokio::time::sleep(self.stagger).await;
            }

            match engine.scan(repo).await {
                Ok(outcome) if outcome.status == ScanStatus::AlreadyRunning => {
                    tracing::debug!(repository = %repo.id, "skipped, scan in flight");
                }
                Ok(outcome) => {
                    completed += 1;
                    tracing::info!(
                        repository = %repo.id,
                        alerts = outcome.alerts_raised,
                        "scheduled scan finished"
                    );
                }
                Err(e) => {
                    tracing::error!(repository = %repo.id, error = %e, "scheduled scan failed");
                }
            }
        }

        tracing::info!(completed, "scan cycle finished");
        completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ScanConfig;
    use crate::oracle::{VulnDetails, VulnOracle, Vulnerability};
    use crate::registry::{PackageMetadata, Registry};
    use crate::store::{MemoryStore, ScanStore};
    use crate::workflow::{ActionRunner, TriggerEvent, WorkflowAction};
    use crate::DepwatchResult;
    use async_trait::async_trait;

    struct NullRegistry;

    #[async_trait]
    impl Registry for NullRegistry {
        async fn lookup(&self, _name: &str) -> Option<PackageMetadata> {
            None
        }
    }

    struct NullOracle;

    #[async_trait]
    impl VulnOracle for NullOracle {
        async fn query(
            &self,
            _package: &str,
            _ecosystem: &str,
            _version: &str,
        ) -> Option<Vec<Vulnerability>> {
            Some(Vec::new())
        }

        async fn fetch_details(&self, _id: &str) -> Option<VulnDetails> {
            None
        }
    }

    struct NullRunner;

    #[async_trait]
    impl ActionRunner for NullRunner {
        async fn run(&self, _action: &WorkflowAction, _event: &TriggerEvent) -> DepwatchResult<()> {
            Ok(())
        }
    }

    fn engine() -> ScanEngine {
        ScanEngine::builder()
            .config(ScanConfig::default())
            .registry(Arc::new(NullRegistry))
            .oracle(Arc::new(NullOracle))
            .action_runner(Arc::new(NullRunner))
            .store(Arc::new(MemoryStore::new()))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn empty_cycle_completes() {
        let engine = engine();
        let scheduler = ScanScheduler::new(Duration::from_secs(3600), Duration::ZERO);
        assert_eq!(scheduler.run_cycle(&engine).await, 0);
    }

    #[tokio::test]
    async fn failed_repository_does_not_stop_the_cycle() {
        let engine = engine();
        // Both clones will fail (bogus URLs); the cycle must still visit
        // every repository and come back.
        engine
            .store()
            .register_repository(crate::fetch::Repository::new(
                "repo-a",
                "owner-1",
                "file:///nonexistent/a",
                "main",
            ))
            .unwrap();
        engine
            .store()
            .register_repository(crate::fetch::Repository::new(
                "repo-b",
                "owner-1",
                "file:///nonexistent/b",
                "main",
            ))
            .unwrap();

        let scheduler = ScanScheduler::new(Duration::from_secs(3600), Duration::ZERO);
        let completed = scheduler.run_cycle(&engine).await;
        assert_eq!(completed, 0);
    }
}
