//! The publisher: replication of change events to all configured targets.

use canopy_store::ContentStore;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

use crate::config::{PublisherConfig, RetryConfig};
use crate::error::{ReplicationError, ReplicationResult};
use crate::process::{ProcessState, ProcessStatus, ReplicationProcess};
use crate::release::ChangeEvent;
use crate::replicator::{CompareResult, ReplicationSummary};
use crate::target::ReplicationTarget;
use crate::transport::ReceiverTransport;

/// The outcome of one target in a publish run.
#[derive(Debug)]
pub struct TargetOutcome {
    /// The target.
    pub target_id: String,
    /// What the replication did, or why it failed.
    pub result: ReplicationResult<ReplicationSummary>,
}

/// Outcomes of all targets that had something to do.
#[derive(Debug, Default)]
pub struct PublishReport {
    /// One entry per target run, in configuration order.
    pub outcomes: Vec<TargetOutcome>,
}

impl PublishReport {
    /// Returns true if no target failed.
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    /// The failed targets with their errors.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &ReplicationError)> {
        self.outcomes.iter().filter_map(|o| match &o.result {
            Ok(_) => None,
            Err(e) => Some((o.target_id.as_str(), e)),
        })
    }

    /// The successful targets with their summaries.
    pub fn succeeded(&self) -> impl Iterator<Item = &ReplicationSummary> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().ok())
    }

    /// A serializable digest of the report.
    pub fn digest(&self) -> Vec<OutcomeDigest> {
        self.outcomes
            .iter()
            .map(|o| match &o.result {
                Ok(summary) => OutcomeDigest {
                    target_id: o.target_id.clone(),
                    summary: Some(summary.clone()),
                    error: None,
                },
                Err(e) => OutcomeDigest {
                    target_id: o.target_id.clone(),
                    summary: None,
                    error: Some(e.to_string()),
                },
            })
            .collect()
    }
}

/// One line of a [`PublishReport`] digest.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeDigest {
    /// The target.
    pub target_id: String,
    /// Summary of a successful run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<ReplicationSummary>,
    /// Message of a failed run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Replicates change events to the configured targets.
///
/// Every target has its own [`ReplicationProcess`]. Failures stay with their
/// target: all targets are run, and the report lists each outcome.
pub struct Publisher {
    config: PublisherConfig,
    source: Arc<dyn ContentStore>,
    processes: RwLock<Vec<Arc<ReplicationProcess>>>,
}

impl Publisher {
    /// Creates a publisher without targets.
    pub fn new(config: PublisherConfig, source: Arc<dyn ContentStore>) -> Self {
        Self {
            config,
            source,
            processes: RwLock::new(Vec::new()),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &PublisherConfig {
        &self.config
    }

    /// Adds a target. Remote targets need a transport to their receiver.
    pub fn add_target(
        &self,
        target: ReplicationTarget,
        transport: Option<Arc<dyn ReceiverTransport>>,
    ) -> ReplicationResult<()> {
        let mut processes = self.processes.write();
        if processes.iter().any(|p| p.target().id == target.id) {
            return Err(ReplicationError::Validation(format!(
                "duplicate target id {}",
                target.id
            )));
        }
        let process = ReplicationProcess::new(target, Arc::clone(&self.source), transport)?;
        info!(target_id = %process.target().id, "target added");
        processes.push(Arc::new(process));
        Ok(())
    }

    /// Ids of all targets, in configuration order.
    pub fn target_ids(&self) -> Vec<String> {
        self.processes
            .read()
            .iter()
            .map(|p| p.target().id.clone())
            .collect()
    }

    /// The process of a target.
    pub fn process(&self, target_id: &str) -> Option<Arc<ReplicationProcess>> {
        self.processes
            .read()
            .iter()
            .find(|p| p.target().id == target_id)
            .cloned()
    }

    /// Hands `event` to every process. Returns the ids of the targets it concerns.
    pub fn trigger(&self, event: &ChangeEvent) -> Vec<String> {
        self.processes
            .read()
            .iter()
            .filter(|p| p.trigger(event))
            .map(|p| p.target().id.clone())
            .collect()
    }

    /// Runs every process with pending paths.
    pub fn run_pending(&self) -> PublishReport {
        let processes: Vec<Arc<ReplicationProcess>> = self.processes.read().clone();
        let retry = &self.config.retry;

        let outcomes: Vec<TargetOutcome> = if self.config.parallel_targets {
            std::thread::scope(|scope| {
                let handles: Vec<_> = processes
                    .iter()
                    .map(|p| scope.spawn(move || run_one(p, retry)))
                    .collect();
                handles
                    .into_iter()
                    .filter_map(|handle| match handle.join() {
                        Ok(outcome) => outcome,
                        Err(panic) => std::panic::resume_unwind(panic),
                    })
                    .collect()
            })
        } else {
            processes.iter().filter_map(|p| run_one(p, retry)).collect()
        };

        let report = PublishReport { outcomes };
        for (target_id, e) in report.failures() {
            error!(target_id = %target_id, error = %e, "replication failed");
        }
        report
    }

    /// Triggers all targets with `event` and runs them.
    pub fn publish(&self, event: &ChangeEvent) -> PublishReport {
        if !self.config.enabled {
            info!(release_root = %event.release.root, "publishing is disabled");
            return PublishReport::default();
        }
        let triggered = self.trigger(event);
        info!(
            release_root = %event.release.root,
            change_number = %event.release.change_number,
            targets = triggered.len(),
            "publishing"
        );
        self.run_pending()
    }

    /// Compares a remote target with the source below `paths`.
    pub fn compare_tree(&self, target_id: &str, paths: &[String]) -> ReplicationResult<CompareResult> {
        self.process_or_err(target_id)?.compare_tree(paths)
    }

    /// Asks a target's running replication to stop.
    pub fn abort(&self, target_id: &str) -> ReplicationResult<()> {
        self.process_or_err(target_id)?.abort();
        Ok(())
    }

    /// The state of a target's process.
    pub fn process_state(&self, target_id: &str) -> Option<ProcessState> {
        self.process(target_id).map(|p| p.state())
    }

    /// Snapshots of all processes.
    pub fn statuses(&self) -> Vec<ProcessStatus> {
        self.processes.read().iter().map(|p| p.status()).collect()
    }

    fn process_or_err(&self, target_id: &str) -> ReplicationResult<Arc<ReplicationProcess>> {
        self.process(target_id)
            .ok_or_else(|| ReplicationError::UnknownTarget(target_id.to_string()))
    }
}

fn run_one(process: &ReplicationProcess, retry: &RetryConfig) -> Option<TargetOutcome> {
    process.run(retry).map(|result| TargetOutcome {
        target_id: process.target().id.clone(),
        result,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::release::Release;
    use crate::replicator::ReplicationStatus;
    use crate::target::RemoteConfig;
    use crate::transport::MockTransport;
    use canopy_testkit::prelude::*;

    fn publisher(config: PublisherConfig) -> Publisher {
        let publisher = Publisher::new(config, Arc::new(sample_store()));
        publisher
            .add_target(
                ReplicationTarget::in_place("copy", SITE_ROOT, "/content/copy", "preview"),
                None,
            )
            .unwrap();
        publisher
    }

    fn event(marks: &[&str]) -> ChangeEvent {
        let release = Release::new(SITE_ROOT, INITIAL_CHANGE_NUMBER).with_marks(marks.iter().copied());
        ChangeEvent::new(release).with_updated(["/content/site/c"])
    }

    #[test]
    fn duplicate_targets_are_rejected() {
        let publisher = publisher(PublisherConfig::default());
        let again = ReplicationTarget::in_place("copy", SITE_ROOT, "/content/other", "preview");
        assert!(matches!(
            publisher.add_target(again, None),
            Err(ReplicationError::Validation(_))
        ));
        assert_eq!(publisher.target_ids(), vec!["copy"]);
    }

    #[test]
    fn publish_runs_matching_targets() {
        let publisher = publisher(PublisherConfig::default());
        let report = publisher.publish(&event(&["preview"]));
        assert!(report.is_success());
        let summaries: Vec<_> = report.succeeded().collect();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].status, ReplicationStatus::Copied);
        assert_eq!(publisher.process_state("copy"), Some(ProcessState::Success));

        assert!(publisher.publish(&event(&["public"])).outcomes.is_empty());
    }

    #[test]
    fn disabled_publisher_does_nothing() {
        let publisher = publisher(PublisherConfig::new().with_enabled(false));
        assert!(publisher.publish(&event(&["preview"])).outcomes.is_empty());
        assert_eq!(publisher.process_state("copy"), Some(ProcessState::Idle));
    }

    #[test]
    fn failing_target_does_not_stop_others() {
        let config = PublisherConfig::new().with_retry(RetryConfig::no_retry());
        let publisher = publisher(config);
        let transport = Arc::new(MockTransport::new());
        transport.set_connected(false);
        let remote = ReplicationTarget::remote(
            "broken",
            SITE_ROOT,
            "preview",
            RemoteConfig::new("http://broken/bin/receiver"),
        );
        publisher.add_target(remote, Some(transport)).unwrap();

        let report = publisher.publish(&event(&["preview"]));
        assert!(!report.is_success());
        let failed: Vec<_> = report.failures().map(|(id, _)| id).collect();
        assert_eq!(failed, vec!["broken"]);
        assert_eq!(report.succeeded().count(), 1);
        assert_eq!(publisher.process_state("broken"), Some(ProcessState::Error));
        assert_eq!(report.digest().len(), 2);
    }

    #[test]
    fn parallel_targets() {
        let publisher = publisher(PublisherConfig::new().with_parallel_targets(true));
        publisher
            .add_target(
                ReplicationTarget::in_place("copy2", SITE_ROOT, "/content/copy2", "preview"),
                None,
            )
            .unwrap();
        let report = publisher.publish(&event(&["preview"]));
        assert_eq!(report.outcomes.len(), 2);
        assert!(report.is_success());
        assert_eq!(report.outcomes[0].target_id, "copy");
        assert_eq!(report.outcomes[1].target_id, "copy2");
    }

    #[test]
    fn unknown_targets() {
        let publisher = publisher(PublisherConfig::default());
        assert!(matches!(
            publisher.abort("nope"),
            Err(ReplicationError::UnknownTarget(_))
        ));
        assert!(matches!(
            publisher.compare_tree("copy", &[]),
            Err(ReplicationError::Validation(_))
        ));
        assert!(publisher.process_state("nope").is_none());
    }
}
