//! Shared fixtures for integration tests: a scripted activation unit
//! builder and a recording server output.

#![allow(dead_code)]

use job_subscriptions::transport::{encode, ServerOutput, ServerResponse, TransportMessage};
use job_subscriptions::{
    ActivationProcessor, ActivationUnit, ActivationUnitBuilder, Completion, ConnectionId,
    CreditsRequest, JobSubscription, JobType, LogStreamHandle, ManagerConfig, Partition,
    PartitionId, RequestId, SubscriberKey, SubscriptionManager,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const WAIT: Duration = Duration::from_secs(5);

pub fn init_test_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("job_subscriptions=trace".parse().expect("valid directive")),
        )
        .with_test_writer()
        .try_init();
}

pub fn partition(id: u16) -> Partition {
    Partition::new(PartitionId(id), LogStreamHandle::new(format!("default-{}", id)))
}

/// Manager with partition 1 registered.
pub fn start_manager(builder: &Arc<ScriptedBuilder>) -> SubscriptionManager {
    init_test_logging();
    let manager = SubscriptionManager::start(ManagerConfig::default(), builder.clone()).unwrap();
    manager.add_partition("partition-1", partition(1));
    manager
}

pub fn subscribe(manager: &SubscriptionManager, job_type: &str, connection: i32) -> SubscriberKey {
    manager
        .add_subscription(JobSubscription::new(PartitionId(1), job_type, ConnectionId(connection)))
        .wait_timeout(WAIT)
        .unwrap()
}

/// Poll `condition` until it holds or the wait budget runs out.
pub fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}

/// How processors of one job type behave.
#[derive(Clone, Copy, Debug, Default)]
pub struct Behavior {
    /// Credit requests to reject before accepting.
    pub reject_credits: usize,
    pub fail_add: bool,
    pub fail_connection_close: bool,
    /// Park adds until [`ScriptedProcessor::release_adds`].
    pub hold_adds: bool,
}

pub struct ScriptedProcessor {
    pub job_type: JobType,
    behavior: Behavior,
    rejections: AtomicUsize,
    subscriptions: Mutex<Vec<JobSubscription>>,
    held_adds: Mutex<Vec<(JobSubscription, Completion<()>)>>,
    credits: Mutex<Vec<CreditsRequest>>,
}

impl ScriptedProcessor {
    fn new(job_type: JobType, behavior: Behavior) -> Self {
        Self {
            job_type,
            behavior,
            rejections: AtomicUsize::new(behavior.reject_credits),
            subscriptions: Mutex::new(Vec::new()),
            held_adds: Mutex::new(Vec::new()),
            credits: Mutex::new(Vec::new()),
        }
    }

    pub fn held_adds(&self) -> usize {
        self.held_adds.lock().len()
    }

    /// Accept every parked add.
    pub fn release_adds(&self) {
        let held: Vec<_> = self.held_adds.lock().drain(..).collect();
        for (subscription, done) in held {
            self.subscriptions.lock().push(subscription);
            done.complete(());
        }
    }

    pub fn subscriptions(&self) -> Vec<JobSubscription> {
        self.subscriptions.lock().clone()
    }

    pub fn subscriber_keys(&self) -> Vec<SubscriberKey> {
        self.subscriptions
            .lock()
            .iter()
            .filter_map(|s| s.subscriber_key)
            .collect()
    }

    pub fn credits(&self) -> Vec<CreditsRequest> {
        self.credits.lock().clone()
    }

    pub fn rejections_left(&self) -> usize {
        self.rejections.load(Ordering::SeqCst)
    }
}

impl ActivationProcessor for ScriptedProcessor {
    fn add_subscription(&self, subscription: JobSubscription, done: Completion<()>) {
        if self.behavior.fail_add {
            done.fail("subscription rejected");
            return;
        }
        if self.behavior.hold_adds {
            self.held_adds.lock().push((subscription, done));
            return;
        }
        self.subscriptions.lock().push(subscription);
        done.complete(());
    }

    fn remove_subscription(&self, subscriber_key: SubscriberKey, done: Completion<bool>) {
        let mut subscriptions = self.subscriptions.lock();
        subscriptions.retain(|s| s.subscriber_key != Some(subscriber_key));
        done.complete(!subscriptions.is_empty());
    }

    fn increase_subscription_credits(&self, request: CreditsRequest) -> bool {
        let rejected = self
            .rejections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if rejected {
            return false;
        }
        self.credits.lock().push(request);
        true
    }

    fn on_connection_closed(&self, connection: ConnectionId, done: Completion<bool>) {
        if self.behavior.fail_connection_close {
            done.fail("connection sweep failed");
            return;
        }
        let mut subscriptions = self.subscriptions.lock();
        subscriptions.retain(|s| s.connection != connection);
        done.complete(!subscriptions.is_empty());
    }
}

/// Builder that records every unit it builds and tears down.
#[derive(Default)]
pub struct ScriptedBuilder {
    behaviors: Mutex<HashMap<JobType, Behavior>>,
    failing_builds: Mutex<Vec<JobType>>,
    fail_teardown: AtomicBool,
    hold_teardowns: AtomicBool,
    held_teardowns: Mutex<Vec<Completion<()>>>,
    hold_builds: AtomicBool,
    held: Mutex<Vec<(ActivationUnit, Completion<Arc<dyn ActivationProcessor>>)>>,
    built: Mutex<Vec<(ActivationUnit, Arc<ScriptedProcessor>)>>,
    torn_down: Mutex<Vec<ActivationUnit>>,
}

impl ScriptedBuilder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn behave(&self, job_type: &str, behavior: Behavior) {
        self.behaviors.lock().insert(JobType::from(job_type), behavior);
    }

    pub fn fail_builds_of(&self, job_type: &str) {
        self.failing_builds.lock().push(JobType::from(job_type));
    }

    pub fn fail_teardowns(&self) {
        self.fail_teardown.store(true, Ordering::SeqCst);
    }

    /// Record teardowns but keep them running until
    /// [`release_teardowns`](Self::release_teardowns).
    pub fn hold_teardowns(&self) {
        self.hold_teardowns.store(true, Ordering::SeqCst);
    }

    pub fn release_teardowns(&self) {
        self.hold_teardowns.store(false, Ordering::SeqCst);
        let held: Vec<_> = self.held_teardowns.lock().drain(..).collect();
        for done in held {
            done.complete(());
        }
    }

    /// Park build requests until [`release_builds`](Self::release_builds).
    pub fn hold_builds(&self) {
        self.hold_builds.store(true, Ordering::SeqCst);
    }

    pub fn release_builds(&self) {
        self.hold_builds.store(false, Ordering::SeqCst);
        let held: Vec<_> = self.held.lock().drain(..).collect();
        for (unit, done) in held {
            self.finish_build(unit, done);
        }
    }

    pub fn held_builds(&self) -> usize {
        self.held.lock().len()
    }

    /// Build requests received, including failed and held ones.
    pub fn build_count(&self) -> usize {
        self.built.lock().len() + self.held.lock().len()
    }

    pub fn teardown_count(&self) -> usize {
        self.torn_down.lock().len()
    }

    pub fn torn_down_names(&self) -> Vec<String> {
        self.torn_down.lock().iter().map(|u| u.name.clone()).collect()
    }

    pub fn built_names(&self) -> Vec<String> {
        self.built.lock().iter().map(|(u, _)| u.name.clone()).collect()
    }

    /// Most recently built processor for `job_type`.
    pub fn processor(&self, job_type: &str) -> Arc<ScriptedProcessor> {
        let job_type = JobType::from(job_type);
        self.built
            .lock()
            .iter()
            .rev()
            .find(|(unit, _)| unit.job_type == job_type)
            .map(|(_, processor)| processor.clone())
            .expect("processor was built")
    }

    fn finish_build(&self, unit: ActivationUnit, done: Completion<Arc<dyn ActivationProcessor>>) {
        let behavior = self
            .behaviors
            .lock()
            .get(&unit.job_type)
            .copied()
            .unwrap_or_default();
        let processor = Arc::new(ScriptedProcessor::new(unit.job_type.clone(), behavior));
        let failing = self.failing_builds.lock().contains(&unit.job_type);
        self.built.lock().push((unit, processor.clone()));

        if failing {
            done.fail("unit failed to start");
        } else {
            done.complete(processor);
        }
    }
}

impl ActivationUnitBuilder for ScriptedBuilder {
    fn build(&self, unit: ActivationUnit, done: Completion<Arc<dyn ActivationProcessor>>) {
        if self.hold_builds.load(Ordering::SeqCst) {
            self.held.lock().push((unit, done));
            return;
        }
        self.finish_build(unit, done);
    }

    fn teardown(
        &self,
        unit: ActivationUnit,
        _processor: Arc<dyn ActivationProcessor>,
        done: Completion<()>,
    ) {
        self.torn_down.lock().push(unit);
        if self.hold_teardowns.load(Ordering::SeqCst) {
            self.held_teardowns.lock().push(done);
            return;
        }
        if self.fail_teardown.load(Ordering::SeqCst) {
            done.fail("unit refused to stop");
        } else {
            done.complete(());
        }
    }
}

/// A frame accepted by [`RecordingOutput`].
#[derive(Clone, Debug)]
pub struct SentFrame {
    pub connection: ConnectionId,
    pub request_id: Option<RequestId>,
    pub bytes: Vec<u8>,
}

/// Server output that encodes and keeps every frame it accepts.
pub struct RecordingOutput {
    accept: AtomicBool,
    frames: Mutex<Vec<SentFrame>>,
}

impl RecordingOutput {
    pub fn new() -> Self {
        Self {
            accept: AtomicBool::new(true),
            frames: Mutex::new(Vec::new()),
        }
    }

    pub fn rejecting() -> Self {
        let output = Self::new();
        output.accept.store(false, Ordering::SeqCst);
        output
    }

    pub fn frames(&self) -> Vec<SentFrame> {
        self.frames.lock().clone()
    }
}

impl ServerOutput for RecordingOutput {
    fn send_response(&self, response: ServerResponse<'_>) -> bool {
        if !self.accept.load(Ordering::SeqCst) {
            return false;
        }
        self.frames.lock().push(SentFrame {
            connection: response.connection,
            request_id: Some(response.request_id),
            bytes: encode(response.writer),
        });
        true
    }

    fn send_message(&self, message: TransportMessage<'_>) -> bool {
        if !self.accept.load(Ordering::SeqCst) {
            return false;
        }
        self.frames.lock().push(SentFrame {
            connection: message.connection,
            request_id: None,
            bytes: encode(message.writer),
        });
        true
    }
}
