//! End-to-end replication between two in-memory stores.

use canopy_protocol::{HttpRequest, HttpResponse, Operation};
use canopy_publisher::{
    ChangeEvent, HttpClient, HttpTransport, LoopbackClient, ProcessState, Publisher,
    PublisherConfig, ReceiverTransport, Release, RemoteConfig, ReplicationError,
    ReplicationStatus, ReplicationTarget, RetryConfig,
};
use canopy_receiver::{ReceiverConfig, ReceiverServer};
use canopy_store::{ContentStore, MemoryStore};
use canopy_testkit::prelude::*;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const URL: &str = "http://receiver.example/bin/receiver";

/// Records the operation of every request before passing it on.
struct RecordingClient {
    inner: LoopbackClient<ReceiverServer>,
    operations: Mutex<Vec<Operation>>,
}

impl RecordingClient {
    fn new(server: Arc<ReceiverServer>) -> Self {
        Self {
            inner: LoopbackClient::new(server),
            operations: Mutex::new(Vec::new()),
        }
    }

    fn count(&self, operation: Operation) -> usize {
        self.operations.lock().iter().filter(|op| **op == operation).count()
    }
}

fn operation_of(request: &HttpRequest) -> Option<Operation> {
    Operation::ALL
        .into_iter()
        .find(|op| request.url.contains(&format!(".{}.", op.name())))
}

impl HttpClient for RecordingClient {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, String> {
        if let Some(op) = operation_of(request) {
            self.operations.lock().push(op);
        }
        self.inner.execute(request)
    }

    fn is_healthy(&self) -> bool {
        true
    }
}

/// Changes the receiver's change number right before the first commit.
struct InterferingClient {
    inner: LoopbackClient<ReceiverServer>,
    live: Arc<MemoryStore>,
    interfered: AtomicBool,
}

impl HttpClient for InterferingClient {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, String> {
        if operation_of(request) == Some(Operation::CommitUpdate)
            && !self.interfered.swap(true, Ordering::SeqCst)
        {
            set_change_number(self.live.as_ref(), SITE_ROOT, "cn-foreign");
        }
        self.inner.execute(request)
    }

    fn is_healthy(&self) -> bool {
        true
    }
}

/// A client whose receiver is never reachable.
struct UnreachableClient;

impl HttpClient for UnreachableClient {
    fn execute(&self, _request: &HttpRequest) -> Result<HttpResponse, String> {
        Err("connection refused".to_string())
    }

    fn is_healthy(&self) -> bool {
        false
    }
}

fn quick_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig::new(max_attempts)
        .with_initial_delay(Duration::ZERO)
        .with_jitter(false)
}

/// A source one release ahead of a receiver holding the sample site.
fn changed_source() -> MemoryStore {
    let source = sample_store();
    put_page(&source, "/content/site/a/b", "v2", "Page B2");
    put_page(&source, "/content/site/c", "v2", "Page C2");
    set_change_number(&source, SITE_ROOT, "cn-0002");
    source
}

fn receiver() -> (Arc<MemoryStore>, Arc<ReceiverServer>) {
    let live = Arc::new(sample_store());
    let server = Arc::new(ReceiverServer::new(ReceiverConfig::default(), live.clone()));
    (live, server)
}

fn public_event(paths: &[&str]) -> ChangeEvent {
    let release = Release::new(SITE_ROOT, "cn-0002").with_marks(["public"]);
    ChangeEvent::new(release).with_updated(paths.iter().copied())
}

fn remote_target(id: &str) -> ReplicationTarget {
    ReplicationTarget::remote(id, SITE_ROOT, "public", RemoteConfig::new(URL))
}

#[test]
fn changed_paths_are_uploaded_once_and_committed() {
    let source = Arc::new(changed_source());
    let (live, server) = receiver();
    let client = Arc::new(RecordingClient::new(server));
    let transport: Arc<dyn ReceiverTransport> = Arc::new(HttpTransport::new(ArcClient(client.clone())));

    let publisher = Publisher::new(PublisherConfig::default(), source.clone());
    publisher.add_target(remote_target("pub1"), Some(transport)).unwrap();

    let report = publisher.publish(&public_event(&[
        "/content/site/a",
        "/content/site/a/b",
        "/content/site/c",
    ]));
    assert!(report.is_success());

    let summary = report.succeeded().next().unwrap();
    assert_eq!(summary.status, ReplicationStatus::Committed);
    assert_eq!(summary.transferred, vec!["/content/site/a", "/content/site/c"]);
    assert_eq!(summary.attempts, 1);

    assert_eq!(client.count(Operation::StartUpdate), 1);
    assert_eq!(client.count(Operation::PathUpload), 2);
    assert_eq!(client.count(Operation::CommitUpdate), 1);
    assert_eq!(client.count(Operation::AbortUpdate), 0);

    for path in ["/content/site/a", "/content/site/c", "/content/site/d"] {
        assert_eq!(content_of(source.as_ref(), path), content_of(live.as_ref(), path), "{path}");
    }
    assert_eq!(change_number(live.as_ref(), SITE_ROOT).as_deref(), Some("cn-0002"));
    assert_eq!(publisher.process_state("pub1"), Some(ProcessState::Success));

    let compared = publisher.compare_tree("pub1", &[]).unwrap();
    assert!(compared.is_equal(), "{compared:?}");
}

#[test]
fn second_run_of_same_release_is_up_to_date() {
    let source = Arc::new(changed_source());
    let (_live, server) = receiver();
    let client = Arc::new(RecordingClient::new(server));
    let transport: Arc<dyn ReceiverTransport> = Arc::new(HttpTransport::new(ArcClient(client.clone())));

    let publisher = Publisher::new(PublisherConfig::default(), source);
    publisher.add_target(remote_target("pub1"), Some(transport)).unwrap();

    let event = public_event(&["/content/site/c"]);
    assert!(publisher.publish(&event).is_success());
    let report = publisher.publish(&event);
    let summary = report.succeeded().next().unwrap();
    assert_eq!(summary.status, ReplicationStatus::UpToDate);
    assert_eq!(client.count(Operation::PathUpload), 1);
    assert_eq!(client.count(Operation::AbortUpdate), 1);
}

#[test]
fn conflicting_commit_is_retried() {
    let source = Arc::new(changed_source());
    let (live, server) = receiver();
    let client = InterferingClient {
        inner: LoopbackClient::new(server),
        live: live.clone(),
        interfered: AtomicBool::new(false),
    };
    let transport: Arc<dyn ReceiverTransport> = Arc::new(HttpTransport::new(client));

    let config = PublisherConfig::new().with_retry(quick_retry(3));
    let publisher = Publisher::new(config, source.clone());
    publisher.add_target(remote_target("pub1"), Some(transport)).unwrap();

    let report = publisher.publish(&public_event(&["/content/site/c"]));
    assert!(report.is_success());
    let summary = report.succeeded().next().unwrap();
    assert_eq!(summary.attempts, 2);
    assert_eq!(summary.status, ReplicationStatus::Committed);
    assert_eq!(change_number(live.as_ref(), SITE_ROOT).as_deref(), Some("cn-0002"));
    assert_eq!(
        content_of(source.as_ref(), "/content/site/c"),
        content_of(live.as_ref(), "/content/site/c")
    );
}

#[test]
fn conflict_without_retries_fails_the_target() {
    let source = Arc::new(changed_source());
    let (live, server) = receiver();
    let client = InterferingClient {
        inner: LoopbackClient::new(server),
        live: live.clone(),
        interfered: AtomicBool::new(false),
    };
    let transport: Arc<dyn ReceiverTransport> = Arc::new(HttpTransport::new(client));

    let config = PublisherConfig::new().with_retry(RetryConfig::no_retry());
    let publisher = Publisher::new(config, source);
    publisher.add_target(remote_target("pub1"), Some(transport)).unwrap();

    let report = publisher.publish(&public_event(&["/content/site/c"]));
    let (_, err) = report.failures().next().unwrap();
    assert!(err.is_retryable());
    assert_eq!(change_number(live.as_ref(), SITE_ROOT).as_deref(), Some("cn-foreign"));
    assert_eq!(publisher.process_state("pub1"), Some(ProcessState::Error));

    let process = publisher.process("pub1").unwrap();
    assert_eq!(process.changed_paths(), vec!["/content/site/c"]);
}

#[test]
fn failing_target_does_not_affect_others() {
    let source = Arc::new(changed_source());
    let (live, server) = receiver();
    let good: Arc<dyn ReceiverTransport> =
        Arc::new(HttpTransport::new(LoopbackClient::new(server)));
    let bad: Arc<dyn ReceiverTransport> = Arc::new(HttpTransport::new(UnreachableClient));

    let config = PublisherConfig::new().with_retry(quick_retry(2));
    let publisher = Publisher::new(config, source);
    publisher.add_target(remote_target("down"), Some(bad)).unwrap();
    publisher.add_target(remote_target("up"), Some(good)).unwrap();

    let report = publisher.publish(&public_event(&["/content/site/c"]));
    assert_eq!(report.outcomes.len(), 2);

    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, "down");
    assert!(matches!(failures[0].1, ReplicationError::Remote { .. }));

    let succeeded: Vec<_> = report.succeeded().collect();
    assert_eq!(succeeded[0].target_id, "up");
    assert_eq!(change_number(live.as_ref(), SITE_ROOT).as_deref(), Some("cn-0002"));
}

#[test]
fn packaging_problems_surface_as_inconsistency() {
    let failing = FailingStore::new(changed_source());
    failing.fail_reads_of("/content/site/c/content");
    let source = Arc::new(failing);
    let (live, server) = receiver();
    let transport: Arc<dyn ReceiverTransport> =
        Arc::new(HttpTransport::new(LoopbackClient::new(server)));

    let publisher = Publisher::new(PublisherConfig::default(), source);
    publisher.add_target(remote_target("pub1"), Some(transport)).unwrap();

    let report = publisher.publish(&public_event(&["/content/site/c"]));
    let (_, err) = report.failures().next().unwrap();
    match err {
        ReplicationError::Inconsistent { suppressed, .. } => assert_eq!(suppressed.len(), 1),
        other => panic!("unexpected error {other}"),
    }
    assert!(!err.is_retryable());
    assert_eq!(change_number(live.as_ref(), SITE_ROOT).as_deref(), Some(INITIAL_CHANGE_NUMBER));
}

#[test]
fn deleted_paths_are_removed_on_the_receiver() {
    let source = Arc::new(changed_source());
    source.remove("/content/site/d").unwrap();
    let (live, server) = receiver();
    let transport: Arc<dyn ReceiverTransport> =
        Arc::new(HttpTransport::new(LoopbackClient::new(server)));

    let publisher = Publisher::new(PublisherConfig::default(), source);
    publisher.add_target(remote_target("pub1"), Some(transport)).unwrap();

    let report = publisher.publish(&ChangeEvent::new(
        Release::new(SITE_ROOT, "cn-0002").with_marks(["public"]),
    )
    .with_removed(["/content/site/d"]));
    let summary = report.succeeded().next().unwrap();
    assert_eq!(summary.deleted, vec!["/content/site/d"]);
    assert!(!live.exists("/content/site/d").unwrap());
    assert!(live.exists("/content/site/c").unwrap());
}

#[test]
fn in_place_and_remote_targets_together() {
    let source = Arc::new(changed_source());
    let (live, server) = receiver();
    let transport: Arc<dyn ReceiverTransport> =
        Arc::new(HttpTransport::new(LoopbackClient::new(server)));

    let publisher = Publisher::new(PublisherConfig::new().with_parallel_targets(true), source.clone());
    publisher.add_target(remote_target("pub1"), Some(transport)).unwrap();
    publisher
        .add_target(
            ReplicationTarget::in_place("copy", SITE_ROOT, "/content/public", "public"),
            None,
        )
        .unwrap();

    let report = publisher.publish(&public_event(&["/content/site/a"]));
    assert!(report.is_success());
    assert_eq!(
        content_of(source.as_ref(), "/content/site/a"),
        content_of(source.as_ref(), "/content/public/a")
    );
    assert_eq!(
        content_of(source.as_ref(), "/content/site/a"),
        content_of(live.as_ref(), "/content/site/a")
    );
}

/// Lets a test keep a handle on a client it hands to a transport.
struct ArcClient<C>(Arc<C>);

impl<C: HttpClient> HttpClient for ArcClient<C> {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, String> {
        self.0.execute(request)
    }

    fn is_healthy(&self) -> bool {
        self.0.is_healthy()
    }
}
