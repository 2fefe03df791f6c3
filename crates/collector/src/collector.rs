//! The collector facade and its lifecycle.
//!
//! A [`Collector`] is either uninitialized or active. [`Collector::init`]
//! resolves identifiers, starts the flush timer, registers the unload flush
//! and hooks into native `tracing` events; [`Collector::destroy`] flushes
//! and returns to the initial state. Captures made while uninitialized are
//! dropped.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use flog_protocol::{EnrichedLogRecord, LogRecord, User};
use flog_transport::Transport;
use serde_json::Value;
use tokio::runtime::Handle;

use crate::config::Config;
use crate::context::ContextStore;
use crate::error::CollectorError;
use crate::host::Host;
use crate::identity::Identity;
use crate::interceptor::{CaptureFn, CaptureSink};
use crate::logger::Logger;
use crate::queue::CaptureQueue;
use crate::scheduler::FlushScheduler;

/// Log capture and batching pipeline.
///
/// Cheap to clone; clones share the same state. A process is expected to
/// build one and hand it around.
#[derive(Clone)]
pub struct Collector {
    shared: Arc<Shared>,
}

struct Shared {
    host: Host,
    transport: Arc<dyn Transport>,
    /// This collector's entry in the console hook.
    sink: Arc<dyn CaptureSink>,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    active: bool,
    config: Config,
    queue: CaptureQueue,
    context: ContextStore,
    identity: Option<Identity>,
    scheduler: FlushScheduler,
}

/// A drained batch and where it goes.
struct Outgoing {
    endpoint: String,
    batch: Vec<EnrichedLogRecord>,
}

/// Append path that holds the collector weakly, so hooks never keep it
/// alive and a dropped collector can be replaced in the console hook.
struct CollectorSink(Weak<Shared>);

impl CaptureSink for CollectorSink {
    fn capture(&self, record: LogRecord) {
        if let Some(shared) = self.0.upgrade() {
            shared.append(record);
        }
    }

    fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

impl Collector {
    /// Creates an uninitialized collector.
    pub fn new(host: Host, transport: Arc<dyn Transport>) -> Self {
        Self {
            shared: Arc::new_cyclic(|weak| Shared {
                host,
                transport,
                sink: Arc::new(CollectorSink(weak.clone())),
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// Starts capturing.
    ///
    /// Does nothing if already active. Must be called inside a tokio runtime.
    pub fn init(&self, config: Config) -> Result<(), CollectorError> {
        if self.is_active() {
            return Ok(());
        }

        config.validate()?;
        let handle = Handle::try_current().map_err(|_| CollectorError::NoRuntime)?;

        // The store and the timer may emit events that the console hook
        // feeds back into `append`; neither may run under the state lock.
        let identity = Identity::resolve(self.shared.host.store.as_ref());

        let mut scheduler = FlushScheduler::default();
        let weak = Arc::downgrade(&self.shared);
        scheduler.start(&handle, config.flush_interval(), move || {
            match weak.upgrade() {
                Some(shared) => {
                    shared.flush();
                    true
                }
                None => false,
            }
        });

        let session_id = identity.session_id.clone();
        let tab_id = identity.tab_id.clone();
        let endpoint = config.endpoint.clone();
        let intercept = config.intercept_native_console_logs;

        let mut state = self.shared.lock();
        if state.active {
            // Lost a race with a concurrent init.
            drop(state);
            return Ok(());
        }
        state.config = config;
        state.identity = Some(identity);
        state.active = true;
        let previous = std::mem::replace(&mut state.scheduler, scheduler);
        drop(state);
        drop(previous);

        let weak = Arc::downgrade(&self.shared);
        self.shared.host.unload.set(move || {
            if let Some(shared) = weak.upgrade() {
                shared.flush();
            }
        });

        let console = &self.shared.host.console;
        let intercepting = intercept && {
            // No-op when this collector is already the live sink.
            console.install(Arc::clone(&self.shared.sink));
            console.is_bound_to(&self.shared.sink)
        };

        tracing::info!(%session_id, %tab_id, %endpoint, intercepting, "collector initialized");
        Ok(())
    }

    /// Replaces the user attached to flushed records. `None` clears it.
    pub fn set_user(&self, user: Option<User>) {
        self.shared.lock().context.set_user(user);
    }

    /// Sets a property attached to flushed records. Last write wins.
    pub fn set_property(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.shared
            .lock()
            .context
            .set_property(name.into(), value.into());
    }

    /// Manual logging entry points bound to this collector.
    pub fn logger(&self) -> Logger {
        Logger::new(self.capture_fn())
    }

    /// Sends everything queued. Returns the number of records handed over.
    pub fn flush(&self) -> usize {
        self.shared.flush()
    }

    /// Flushes, then resets to the uninitialized state.
    ///
    /// User and properties are cleared. Native event capture stays hooked
    /// in but drops events until the next `init`.
    pub fn destroy(&self) {
        let (outgoing, was_active, mut scheduler) = {
            let mut state = self.shared.lock();
            let outgoing = state.take_batch();
            let was_active = state.active;

            state.queue.clear();
            state.context.clear();
            state.config = Config::default();
            state.identity = None;
            state.active = false;
            let scheduler = std::mem::take(&mut state.scheduler);
            (outgoing, was_active, scheduler)
        };
        scheduler.stop();

        let flushed = self.shared.send(outgoing);
        if was_active {
            tracing::info!(flushed, "collector destroyed");
        }
    }

    /// Returns `true` between a successful `init` and `destroy`.
    pub fn is_active(&self) -> bool {
        self.shared.lock().active
    }

    /// Number of records waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.shared.lock().queue.len()
    }

    /// The session id, while active.
    pub fn session_id(&self) -> Option<String> {
        self.shared
            .lock()
            .identity
            .as_ref()
            .map(|i| i.session_id.clone())
    }

    /// The tab id minted by the current `init`, while active.
    pub fn tab_id(&self) -> Option<String> {
        self.shared
            .lock()
            .identity
            .as_ref()
            .map(|i| i.tab_id.clone())
    }

    /// Returns a copy of the current config. Default when uninitialized.
    pub fn config(&self) -> Config {
        self.shared.lock().config.clone()
    }

    /// The append path handed to loggers.
    fn capture_fn(&self) -> CaptureFn {
        let sink = Arc::clone(&self.shared.sink);
        Arc::new(move |record: LogRecord| sink.capture(record))
    }
}

impl Shared {
    /// Must not be held while emitting `tracing` events or calling out of
    /// the crate; the console hook re-enters through `append`.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn append(&self, record: LogRecord) {
        let mut state = self.lock();
        if state.active {
            state.queue.push(record);
        }
    }

    fn flush(&self) -> usize {
        let outgoing = self.lock().take_batch();
        self.send(outgoing)
    }

    /// Hands a batch to the transport. Never called with the lock held.
    fn send(&self, outgoing: Option<Outgoing>) -> usize {
        let Some(Outgoing { endpoint, batch }) = outgoing else {
            return 0;
        };

        let count = batch.len();
        self.transport.send(&endpoint, batch);
        tracing::debug!(count, "log batch flushed");
        count
    }
}

impl State {
    fn take_batch(&mut self) -> Option<Outgoing> {
        let identity = self.identity.as_ref()?;
        let batch = self.queue.drain_enriched(&self.context, identity)?;
        Some(Outgoing {
            endpoint: self.config.endpoint.clone(),
            batch,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interceptor::CaptureLayer;
    use crate::store::{MemoryStore, SessionStore, StoreError};
    use flog_protocol::Level;
    use serde_json::json;
    use std::time::Duration;
    use tracing_subscriber::layer::SubscriberExt;

    type Sent = Arc<Mutex<Vec<(String, Vec<EnrichedLogRecord>)>>>;

    /// Keeps every batch it is handed.
    struct RecordingTransport(Sent);

    impl Transport for RecordingTransport {
        fn send(&self, endpoint: &str, batch: Vec<EnrichedLogRecord>) {
            self.0.lock().unwrap().push((endpoint.to_string(), batch));
        }
    }

    fn setup_with(host: Host) -> (Collector, Sent) {
        let sent: Sent = Arc::new(Mutex::new(Vec::new()));
        let collector = Collector::new(host, Arc::new(RecordingTransport(Arc::clone(&sent))));
        (collector, sent)
    }

    fn setup() -> (Collector, Sent, Host) {
        let host = Host::isolated(Arc::new(MemoryStore::new()));
        let (collector, sent) = setup_with(host.clone());
        (collector, sent, host)
    }

    /// A config whose timer never fires during a test.
    fn manual_config() -> Config {
        Config {
            flush_interval_ms: 60_000,
            ..Config::new("https://x/y")
        }
    }

    fn records(sent: &Sent) -> Vec<EnrichedLogRecord> {
        sent.lock()
            .unwrap()
            .iter()
            .flat_map(|(_, batch)| batch.clone())
            .collect()
    }

    #[tokio::test]
    async fn init_rejects_missing_endpoint() {
        let (collector, _sent, host) = setup();

        let err = collector.init(Config::default()).unwrap_err();
        assert!(matches!(err, CollectorError::MissingEndpoint));

        assert!(!collector.is_active());
        assert!(collector.tab_id().is_none());
        assert!(!host.unload.is_set());
        assert!(!host.console.is_installed());
        assert!(!collector.shared.lock().scheduler.is_running());
    }

    #[test]
    fn init_outside_runtime_fails_cleanly() {
        let (collector, _sent, host) = setup();

        let err = collector.init(manual_config()).unwrap_err();
        assert!(matches!(err, CollectorError::NoRuntime));
        assert!(!collector.is_active());
        assert!(!host.console.is_installed());
    }

    #[tokio::test]
    async fn init_is_idempotent() {
        let (collector, _sent, _host) = setup();
        collector.init(manual_config()).unwrap();
        let session = collector.session_id().unwrap();
        let tab = collector.tab_id().unwrap();

        let timer = collector.shared.lock().scheduler.token().unwrap();

        collector.init(Config::new("https://other")).unwrap();

        assert_eq!(collector.session_id().unwrap(), session);
        assert_eq!(collector.tab_id().unwrap(), tab);
        assert_eq!(collector.config().endpoint, "https://x/y");
        assert!(!timer.is_cancelled());
        let current = collector.shared.lock().scheduler.token().unwrap();
        assert!(!current.is_cancelled());
        current.cancel();
        assert!(timer.is_cancelled(), "second init replaced the timer");
    }

    #[tokio::test]
    async fn captures_before_init_are_dropped() {
        let (collector, sent, _host) = setup();
        let logger = collector.logger();

        logger.error("too early");
        assert_eq!(collector.pending(), 0);

        collector.init(manual_config()).unwrap();
        logger.info("on time");
        collector.flush();

        let flushed = records(&sent);
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].record.message, "on time");
    }

    #[tokio::test]
    async fn every_capture_is_delivered_once() {
        let (collector, sent, _host) = setup();
        collector.init(manual_config()).unwrap();
        let logger = collector.logger();

        for i in 0..7 {
            logger.info(format!("first {i}"));
        }
        assert_eq!(collector.flush(), 7);

        logger.warn("second 0");
        logger.debug("second 1");
        logger.log("second 2");
        assert_eq!(collector.flush(), 3);
        assert_eq!(collector.flush(), 0);

        let flushed = records(&sent);
        assert_eq!(flushed.len(), 10);
        assert_eq!(sent.lock().unwrap().len(), 2);
        assert_eq!(flushed[0].record.message, "first 0");
        assert_eq!(flushed[9].record.message, "second 2");
    }

    #[tokio::test]
    async fn empty_flush_does_not_send() {
        let (collector, sent, _host) = setup();
        collector.init(manual_config()).unwrap();

        assert_eq!(collector.flush(), 0);
        assert!(sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn property_last_write_wins() {
        let (collector, sent, _host) = setup();
        collector.init(manual_config()).unwrap();

        collector.logger().info("x");
        collector.set_property("a", 1);
        collector.set_property("a", 2);
        collector.flush();

        assert_eq!(records(&sent)[0].properties["a"], json!(2));
    }

    #[tokio::test]
    async fn context_is_read_at_flush_time() {
        let (collector, sent, _host) = setup();
        collector.set_user(Some(User::new().with("id", "before-init")));
        collector.init(manual_config()).unwrap();

        collector.logger().info("x");
        collector.set_user(Some(User::new().with("id", "late")));
        collector.set_property("release", "1.0");
        collector.flush();

        let flushed = records(&sent);
        assert_eq!(flushed[0].user.as_ref().unwrap().get("id"), Some(&json!("late")));
        assert_eq!(flushed[0].properties["release"], "1.0");

        collector.set_user(None);
        collector.logger().info("y");
        collector.flush();
        assert!(records(&sent)[1].user.is_none());
    }

    #[tokio::test]
    async fn destroy_flushes_pending_once() {
        let (collector, sent, _host) = setup();
        collector.init(manual_config()).unwrap();
        collector.logger().error("pending");

        collector.destroy();
        assert_eq!(sent.lock().unwrap().len(), 1);

        assert_eq!(collector.flush(), 0);
        assert_eq!(sent.lock().unwrap().len(), 1);
        assert_eq!(records(&sent)[0].record.message, "pending");
    }

    #[tokio::test]
    async fn destroy_resets_state() {
        let (collector, sent, _host) = setup();
        collector.set_user(Some(User::new().with("id", 1)));
        collector.set_property("a", 1);
        collector.init(manual_config()).unwrap();

        collector.destroy();

        assert!(!collector.is_active());
        assert_eq!(collector.config(), Config::default());
        assert!(collector.tab_id().is_none());
        assert!(!collector.shared.lock().scheduler.is_running());

        collector.logger().info("after destroy");
        assert_eq!(collector.pending(), 0);

        collector.init(manual_config()).unwrap();
        collector.logger().info("reinit");
        collector.flush();

        let flushed = records(&sent);
        assert_eq!(flushed.len(), 1);
        assert!(flushed[0].user.is_none());
        assert!(flushed[0].properties.is_empty());
    }

    #[tokio::test]
    async fn session_survives_cycles_tab_does_not() {
        let (collector, _sent, _host) = setup();

        collector.init(manual_config()).unwrap();
        let (session1, tab1) = (collector.session_id().unwrap(), collector.tab_id().unwrap());
        collector.destroy();

        collector.init(manual_config()).unwrap();
        let (session2, tab2) = (collector.session_id().unwrap(), collector.tab_id().unwrap());

        assert_eq!(session1, session2);
        assert_ne!(tab1, tab2);
    }

    #[tokio::test]
    async fn session_is_shared_through_the_store() {
        let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
        let (first, _) = setup_with(Host::isolated(store.clone()));
        let (second, _) = setup_with(Host::isolated(store));

        first.init(manual_config()).unwrap();
        second.init(manual_config()).unwrap();

        assert_eq!(first.session_id(), second.session_id());
        assert_ne!(first.tab_id(), second.tab_id());
    }

    #[tokio::test]
    async fn timer_delivers_error_scenario() {
        let (collector, sent, _host) = setup();
        let config = Config {
            flush_interval_ms: 50,
            ..Config::new("https://x/y")
        };
        collector.init(config).unwrap();

        collector.logger().error("boom");
        tokio::time::sleep(Duration::from_millis(200)).await;

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let (endpoint, batch) = &sent[0];
        assert_eq!(endpoint, "https://x/y");
        assert_eq!(batch.len(), 1);

        let record = &batch[0];
        assert_eq!(record.record.level, Level::Error);
        assert!(record.record.message.contains("boom"));
        assert!(!record.session_id.is_empty());
        assert!(!record.tab_id.is_empty());
        assert!(record.user.is_none());
        assert!(record.properties.is_empty());
    }

    #[tokio::test]
    async fn unload_hook_flushes() {
        let (collector, sent, host) = setup();
        collector.init(manual_config()).unwrap();
        collector.logger().warn("leaving");

        assert!(host.unload.fire());
        assert!(!host.unload.fire());

        let flushed = records(&sent);
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].record.message, "leaving");
    }

    #[tokio::test]
    async fn native_events_are_captured() {
        let (collector, sent, host) = setup();
        collector.init(manual_config()).unwrap();
        assert!(host.console.is_installed());

        let subscriber =
            tracing_subscriber::registry().with(CaptureLayer::new(Arc::clone(&host.console)));
        tracing::subscriber::with_default(subscriber, || {
            tracing::error!(target: "app", user_id = 3, "payment failed");
        });
        collector.logger().info("manual");
        collector.flush();

        let flushed = records(&sent);
        assert_eq!(flushed.len(), 2);
        assert_eq!(flushed[0].record.level, Level::Error);
        assert_eq!(flushed[0].record.message, "payment failed user_id=3");
        assert_eq!(flushed[0].tab_id, flushed[1].tab_id);
    }

    #[tokio::test]
    async fn interception_can_be_disabled() {
        let (collector, _sent, host) = setup();
        let config = Config {
            intercept_native_console_logs: false,
            ..manual_config()
        };
        collector.init(config).unwrap();

        assert!(!host.console.is_installed());
    }

    #[tokio::test]
    async fn interception_survives_destroy_without_double_capture() {
        let (collector, sent, host) = setup();
        let subscriber =
            tracing_subscriber::registry().with(CaptureLayer::new(Arc::clone(&host.console)));
        let dispatch = tracing::Dispatch::new(subscriber);

        collector.init(manual_config()).unwrap();
        collector.destroy();
        assert!(host.console.is_installed());

        tracing::dispatcher::with_default(&dispatch, || {
            tracing::info!(target: "app", "while destroyed");
        });
        assert_eq!(collector.pending(), 0);

        collector.init(manual_config()).unwrap();
        tracing::dispatcher::with_default(&dispatch, || {
            tracing::info!(target: "app", "after reinit");
        });
        collector.flush();

        let flushed = records(&sent);
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].record.message, "after reinit");
    }

    /// A store that logs on every access, like a host's own persistence.
    struct LoggingStore(MemoryStore);

    impl SessionStore for LoggingStore {
        fn get(&self, key: &str) -> Option<String> {
            tracing::info!(target: "app::store", key, "session lookup");
            self.0.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
            tracing::info!(target: "app::store", key, "session saved");
            self.0.set(key, value)
        }
    }

    #[test]
    fn init_with_logging_store_does_not_deadlock() {
        let (done_tx, done_rx) = std::sync::mpsc::channel();

        std::thread::spawn(move || {
            let host = Host::isolated(Arc::new(LoggingStore(MemoryStore::new())));
            let (collector, sent) = setup_with(host.clone());
            let subscriber =
                tracing_subscriber::registry().with(CaptureLayer::new(Arc::clone(&host.console)));
            let _guard = tracing::subscriber::set_default(subscriber);

            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            rt.block_on(async {
                collector.init(manual_config()).unwrap();
                collector.destroy();
                collector.init(manual_config()).unwrap();
                tracing::warn!(target: "app", "after reinit");
                collector.destroy();
            });

            let messages: Vec<_> = records(&sent)
                .into_iter()
                .map(|r| r.record.message)
                .collect();
            done_tx.send(messages).unwrap();
        });

        let messages = done_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("init deadlocked");
        assert_eq!(messages, ["after reinit"]);
    }

    #[tokio::test]
    async fn console_hook_moves_to_next_collector_after_drop() {
        let host = Host::isolated(Arc::new(MemoryStore::new()));
        let subscriber =
            tracing_subscriber::registry().with(CaptureLayer::new(Arc::clone(&host.console)));
        let dispatch = tracing::Dispatch::new(subscriber);

        let (first, _) = setup_with(host.clone());
        first.init(manual_config()).unwrap();
        first.destroy();
        drop(first);
        assert!(!host.console.is_installed());

        let (second, sent) = setup_with(host.clone());
        second.init(manual_config()).unwrap();
        assert!(host.console.is_bound_to(&second.shared.sink));

        tracing::dispatcher::with_default(&dispatch, || {
            tracing::error!(target: "app", "native boom");
        });
        second.flush();

        let flushed = records(&sent);
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].record.message, "native boom");
    }

    #[tokio::test]
    async fn live_collector_keeps_the_console_hook() {
        let host = Host::isolated(Arc::new(MemoryStore::new()));
        let (first, _) = setup_with(host.clone());
        let (second, _) = setup_with(host.clone());

        first.init(manual_config()).unwrap();
        second.init(manual_config()).unwrap();

        assert!(host.console.is_bound_to(&first.shared.sink));
        assert!(!host.console.is_bound_to(&second.shared.sink));
    }

    #[tokio::test]
    async fn dropping_the_collector_releases_it() {
        let (collector, _sent, host) = setup();
        collector.init(Config {
            flush_interval_ms: 10,
            ..Config::new("https://x/y")
        })
        .unwrap();

        let weak = Arc::downgrade(&collector.shared);
        drop(collector);
        assert!(weak.upgrade().is_none());

        // Hooks outlive the collector but do nothing.
        assert!(host.unload.fire());
        tokio::time::sleep(Duration::from_millis(40)).await;
    }
}
