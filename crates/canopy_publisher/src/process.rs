//! Per-target replication processes.
//!
//! A process collects the changed paths of the releases its target applies to
//! and replicates them when run. Paths arriving while a run is in progress
//! abort that run; everything not replicated stays pending for the next run.

use canopy_protocol::consolidate_ordered;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::RetryConfig;
use crate::error::{ReplicationError, ReplicationResult};
use crate::release::{ChangeEvent, Release};
use crate::replicator::{CompareResult, Replicator, ReplicationSummary};
use crate::target::ReplicationTarget;
use crate::transport::ReceiverTransport;
use canopy_store::ContentStore;

/// The state of a replication process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ProcessState {
    /// Nothing happened yet.
    Idle,
    /// Changed paths wait for the next run.
    Awaiting,
    /// A run is in progress.
    Processing,
    /// The last run succeeded.
    Success,
    /// The last run failed; its paths are pending again.
    Error,
    /// The target is disabled.
    Disabled,
}

impl ProcessState {
    /// Returns true if a run is in progress.
    pub fn is_active(&self) -> bool {
        matches!(self, ProcessState::Processing)
    }
}

/// A snapshot of a process for reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessStatus {
    /// The target.
    pub target_id: String,
    /// Current state.
    pub state: ProcessState,
    /// Paths waiting for replication.
    pub changed_paths: Vec<String>,
    /// Message of the last failure, cleared by a successful run.
    pub last_error: Option<String>,
    /// End of the last run.
    pub last_run: Option<DateTime<Utc>>,
}

struct ProcessInner {
    state: ProcessState,
    release: Option<Release>,
    changed_paths: Vec<String>,
    last_error: Option<String>,
    last_run: Option<DateTime<Utc>>,
}

/// Replication process of one target.
pub struct ReplicationProcess {
    target: ReplicationTarget,
    replicator: Replicator,
    inner: RwLock<ProcessInner>,
    abort: AtomicBool,
}

impl ReplicationProcess {
    /// Creates the process of `target`.
    pub fn new(
        target: ReplicationTarget,
        source: Arc<dyn ContentStore>,
        transport: Option<Arc<dyn ReceiverTransport>>,
    ) -> ReplicationResult<Self> {
        let replicator = Replicator::for_target(target.clone(), source, transport)?;
        let state = if target.enabled {
            ProcessState::Idle
        } else {
            ProcessState::Disabled
        };
        Ok(Self {
            target,
            replicator,
            inner: RwLock::new(ProcessInner {
                state,
                release: None,
                changed_paths: Vec::new(),
                last_error: None,
                last_run: None,
            }),
            abort: AtomicBool::new(false),
        })
    }

    /// The target.
    pub fn target(&self) -> &ReplicationTarget {
        &self.target
    }

    /// Current state.
    pub fn state(&self) -> ProcessState {
        self.inner.read().state
    }

    /// Paths waiting for replication.
    pub fn changed_paths(&self) -> Vec<String> {
        self.inner.read().changed_paths.clone()
    }

    /// The latest release seen.
    pub fn release(&self) -> Option<Release> {
        self.inner.read().release.clone()
    }

    /// Message of the last failure.
    pub fn last_error(&self) -> Option<String> {
        self.inner.read().last_error.clone()
    }

    /// Returns a snapshot for reporting.
    pub fn status(&self) -> ProcessStatus {
        let inner = self.inner.read();
        ProcessStatus {
            target_id: self.target.id.clone(),
            state: inner.state,
            changed_paths: inner.changed_paths.clone(),
            last_error: inner.last_error.clone(),
            last_run: inner.last_run,
        }
    }

    /// Asks a running replication to stop at the next possibility.
    pub fn abort(&self) {
        self.abort.store(true, Ordering::SeqCst);
    }

    /// Takes note of a change event.
    ///
    /// Returns true if the event concerns this target.
    pub fn trigger(&self, event: &ChangeEvent) -> bool {
        let mut inner = self.inner.write();
        if !self.target.enabled {
            inner.state = ProcessState::Disabled;
            return false;
        }
        if !self.target.applies_to(&event.release) {
            return false;
        }
        let paths = self.target.scope_paths(&event.changed_paths());
        if paths.is_empty() {
            return false;
        }

        let other_release = inner
            .release
            .as_ref()
            .is_some_and(|r| r.root != event.release.root);
        if other_release {
            debug!(target_id = %self.target.id, release_root = %event.release.root, "release root changed, restarting");
            inner.changed_paths.clear();
            self.abort();
        }

        let merged = consolidate_ordered(inner.changed_paths.iter().chain(&paths));
        if merged != inner.changed_paths {
            if inner.state.is_active() {
                info!(target_id = %self.target.id, "new changes, aborting running replication");
                self.abort();
            }
            inner.changed_paths = merged;
        }
        inner.release = Some(event.release.clone());
        if !inner.state.is_active() {
            inner.state = ProcessState::Awaiting;
        }
        true
    }

    /// Replicates the pending paths, retrying as `retry` allows.
    ///
    /// Returns `None` if nothing was pending.
    pub fn run(&self, retry: &RetryConfig) -> Option<ReplicationResult<ReplicationSummary>> {
        let (release, paths) = {
            let mut inner = self.inner.write();
            if inner.state != ProcessState::Awaiting || inner.changed_paths.is_empty() {
                return None;
            }
            let release = inner.release.clone()?;
            inner.state = ProcessState::Processing;
            self.abort.store(false, Ordering::SeqCst);
            (release, std::mem::take(&mut inner.changed_paths))
        };

        let result = self.replicate_with_retry(&release, &paths, retry);

        let mut inner = self.inner.write();
        inner.last_run = Some(Utc::now());
        match &result {
            Ok(summary) => {
                inner.last_error = None;
                inner.state = if inner.changed_paths.is_empty() {
                    ProcessState::Success
                } else {
                    ProcessState::Awaiting
                };
                debug!(target_id = %self.target.id, status = ?summary.status, "run finished");
            }
            Err(e) => {
                inner.last_error = Some(e.to_string());
                let arrived = std::mem::take(&mut inner.changed_paths);
                inner.state = if arrived.is_empty() {
                    ProcessState::Error
                } else {
                    ProcessState::Awaiting
                };
                // Paths of a superseded release root are not retried.
                let same_release = inner
                    .release
                    .as_ref()
                    .is_some_and(|r| r.root == release.root);
                inner.changed_paths = if same_release {
                    consolidate_ordered(paths.iter().chain(&arrived))
                } else {
                    arrived
                };
                warn!(target_id = %self.target.id, error = %e, pending = inner.changed_paths.len(), "run failed");
            }
        }
        Some(result)
    }

    /// Compares the target's content with the source.
    ///
    /// Uses the release of the latest event, or the source path if none was seen yet.
    pub fn compare_tree(&self, paths: &[String]) -> ReplicationResult<CompareResult> {
        let release_root = self
            .release()
            .map(|r| r.root)
            .unwrap_or_else(|| self.target.source_path.clone());
        self.replicator.compare_tree(&release_root, paths)
    }

    fn replicate_with_retry(
        &self,
        release: &Release,
        paths: &[String],
        retry: &RetryConfig,
    ) -> ReplicationResult<ReplicationSummary> {
        let mut last_error = None;

        for attempt in 0..retry.max_attempts {
            if attempt > 0 {
                let delay = retry.delay_for_attempt(attempt);
                debug!(target_id = %self.target.id, attempt, ?delay, "retrying");
                std::thread::sleep(delay);
            }

            match self.replicator.replicate(release, paths, &self.abort) {
                Ok(mut summary) => {
                    summary.attempts = attempt + 1;
                    return Ok(summary);
                }
                Err(e) => {
                    if e.is_retryable() && attempt + 1 < retry.max_attempts {
                        warn!(target_id = %self.target.id, attempt, error = %e, "replication failed, will retry");
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            ReplicationError::Validation("no replication attempts made".to_string())
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::RemoteConfig;
    use canopy_protocol::{HttpRequest, HttpResponse};
    use canopy_store::MemoryStore;
    use canopy_testkit::prelude::*;
    use std::sync::{OnceLock, Weak};

    fn process(store: Arc<MemoryStore>) -> ReplicationProcess {
        let target = ReplicationTarget::in_place("copy", SITE_ROOT, "/content/copy", "preview");
        ReplicationProcess::new(target, store, None).unwrap()
    }

    fn event(paths: &[&str]) -> ChangeEvent {
        let release = Release::new(SITE_ROOT, INITIAL_CHANGE_NUMBER).with_marks(["preview"]);
        ChangeEvent::new(release).with_updated(paths.iter().copied())
    }

    #[test]
    fn trigger_accumulates_paths() {
        let process = process(Arc::new(sample_store()));
        assert_eq!(process.state(), ProcessState::Idle);

        assert!(process.trigger(&event(&["/content/site/a/b"])));
        assert!(process.trigger(&event(&["/content/site/c", "/content/site/a"])));
        assert_eq!(process.state(), ProcessState::Awaiting);
        assert_eq!(
            process.changed_paths(),
            vec!["/content/site/a", "/content/site/c"]
        );
    }

    #[test]
    fn trigger_ignores_other_stages() {
        let process = process(Arc::new(sample_store()));
        let release = Release::new(SITE_ROOT, INITIAL_CHANGE_NUMBER).with_marks(["public"]);
        assert!(!process.trigger(&ChangeEvent::new(release).with_updated(["/content/site/a"])));
        assert!(!process.trigger(&event(&["/content/other"])));
        assert_eq!(process.state(), ProcessState::Idle);
    }

    #[test]
    fn run_replicates_pending_paths() {
        let store = Arc::new(sample_store());
        let process = process(store.clone());
        assert!(process.run(&RetryConfig::no_retry()).is_none());

        process.trigger(&event(&["/content/site/c"]));
        let summary = process.run(&RetryConfig::no_retry()).unwrap().unwrap();
        assert_eq!(summary.attempts, 1);
        assert_eq!(process.state(), ProcessState::Success);
        assert!(process.changed_paths().is_empty());
        assert!(store.exists("/content/copy/c").unwrap());
    }

    #[test]
    fn failed_run_restores_paths() {
        let store = Arc::new(sample_store());
        let process = process(store.clone());
        process.trigger(&event(&["/content/site/c"]));
        set_change_number(store.as_ref(), SITE_ROOT, "cn-0002");

        let result = process.run(&RetryConfig::no_retry()).unwrap();
        assert!(matches!(result, Err(ReplicationError::SourceChanged { .. })));
        assert_eq!(process.state(), ProcessState::Error);
        assert_eq!(process.changed_paths(), vec!["/content/site/c"]);
        assert!(process.last_error().is_some());
        assert!(!store.exists("/content/copy/c").unwrap());
    }

    #[test]
    fn disabled_target_is_not_triggered() {
        let target = ReplicationTarget::in_place("copy", SITE_ROOT, "/content/copy", "preview")
            .with_enabled(false);
        let process = ReplicationProcess::new(target, Arc::new(sample_store()), None).unwrap();
        assert!(!process.trigger(&event(&["/content/site/a"])));
        assert_eq!(process.state(), ProcessState::Disabled);
    }

    /// Switches the process to another release on the first request, then fails it.
    struct SwitchingTransport {
        process: OnceLock<Weak<ReplicationProcess>>,
        event: ChangeEvent,
    }

    impl ReceiverTransport for SwitchingTransport {
        fn send(&self, _request: &HttpRequest) -> ReplicationResult<HttpResponse> {
            if let Some(process) = self.process.get().and_then(Weak::upgrade) {
                assert!(process.trigger(&self.event));
            }
            Err(ReplicationError::transport("sending request", "connection refused"))
        }

        fn is_connected(&self) -> bool {
            false
        }
    }

    #[test]
    fn failed_run_drops_paths_of_superseded_release() {
        let other = Release::new("/content/other", "cn-9").with_marks(["preview"]);
        let transport = Arc::new(SwitchingTransport {
            process: OnceLock::new(),
            event: ChangeEvent::new(other).with_updated(["/content/other/y"]),
        });
        let target = ReplicationTarget::remote(
            "remote",
            "/content",
            "preview",
            RemoteConfig::new("http://receiver.example/bin/receiver"),
        );
        let process = Arc::new(
            ReplicationProcess::new(
                target,
                Arc::new(sample_store()),
                Some(transport.clone() as Arc<dyn ReceiverTransport>),
            )
            .unwrap(),
        );
        transport.process.set(Arc::downgrade(&process)).unwrap();

        process.trigger(&event(&["/content/site/c"]));
        let result = process.run(&RetryConfig::no_retry()).unwrap();
        assert!(result.is_err());

        assert_eq!(process.state(), ProcessState::Awaiting);
        assert_eq!(process.changed_paths(), vec!["/content/other/y"]);
        assert_eq!(process.release().unwrap().root, "/content/other");
    }

    #[test]
    fn new_release_root_replaces_pending_paths() {
        let process = process(Arc::new(sample_store()));
        process.trigger(&event(&["/content/site/a"]));

        let other = Release::new("/content", "cn-9").with_marks(["preview"]);
        assert!(process.trigger(&ChangeEvent::new(other).with_updated(["/content/site/c"])));
        assert_eq!(process.changed_paths(), vec!["/content/site/c"]);
        assert_eq!(process.release().unwrap().root, "/content");
    }
}
