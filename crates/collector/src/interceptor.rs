//! Capture of native `tracing` events.
//!
//! The host adds a [`CaptureLayer`] to its subscriber next to whatever layers
//! already print or store its logs, so events keep their normal behavior.
//! The layer forwards every event to a [`ConsoleHook`]; until a collector
//! installs itself into the hook, events pass through untouched.

use std::fmt::Write;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use flog_protocol::{Level, LogRecord};
use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

/// The collector's append path.
pub type CaptureFn = Arc<dyn Fn(LogRecord) + Send + Sync + 'static>;

/// Receiver of forwarded events.
pub trait CaptureSink: Send + Sync + 'static {
    fn capture(&self, record: LogRecord);

    /// Whether the owner is still around. A dead sink may be replaced.
    fn is_alive(&self) -> bool {
        true
    }
}

impl<F> CaptureSink for F
where
    F: Fn(LogRecord) + Send + Sync + 'static,
{
    fn capture(&self, record: LogRecord) {
        self(record)
    }
}

/// Targets whose events are never captured: the pipeline itself and the
/// HTTP stack under the transport. Capturing them would feed every send
/// back into the queue.
const INTERNAL_TARGETS: &[&str] = &[
    "flog_collector",
    "flog_transport",
    "reqwest",
    "hyper",
    "hyper_util",
    "h2",
    "rustls",
];

static GLOBAL_HOOK: OnceLock<Arc<ConsoleHook>> = OnceLock::new();

/// Forwarding slot between [`CaptureLayer`] and a collector.
///
/// Holds at most one sink. While that sink is alive later installs are
/// ignored, so re-initializing never double-captures; once it dies the next
/// install takes its place.
#[derive(Default)]
pub struct ConsoleHook {
    sink: RwLock<Option<Arc<dyn CaptureSink>>>,
}

impl ConsoleHook {
    /// Creates an empty hook, detached from the process-wide one.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide hook used by [`layer`].
    pub fn global() -> Arc<Self> {
        Arc::clone(GLOBAL_HOOK.get_or_init(|| Arc::new(Self::new())))
    }

    /// Installs `sink`. Returns `false` if a live sink was already installed.
    pub fn install(&self, sink: Arc<dyn CaptureSink>) -> bool {
        let mut slot = self.sink.write().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|current| current.is_alive()) {
            return false;
        }
        *slot = Some(sink);
        true
    }

    /// Returns `true` if a live sink is installed.
    pub fn is_installed(&self) -> bool {
        self.current().is_some()
    }

    /// Returns `true` if `sink` is the installed, live sink.
    pub fn is_bound_to(&self, sink: &Arc<dyn CaptureSink>) -> bool {
        self.current()
            .is_some_and(|current| Arc::ptr_eq(&current, sink))
    }

    fn current(&self) -> Option<Arc<dyn CaptureSink>> {
        self.sink
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .filter(|sink| sink.is_alive())
    }

    fn forward(&self, record: LogRecord) {
        if let Some(sink) = self.current() {
            sink.capture(record);
        }
    }
}

/// A capture layer bound to the process-wide [`ConsoleHook`].
pub fn layer() -> CaptureLayer {
    CaptureLayer::new(ConsoleHook::global())
}

/// Tracing layer that turns events into [`LogRecord`]s.
pub struct CaptureLayer {
    hook: Arc<ConsoleHook>,
}

impl CaptureLayer {
    /// Creates a layer that forwards into `hook`.
    pub fn new(hook: Arc<ConsoleHook>) -> Self {
        Self { hook }
    }
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if !self.hook.is_installed() || is_internal(event.metadata().target()) {
            return;
        }

        let level = match *event.metadata().level() {
            tracing::Level::ERROR => Level::Error,
            tracing::Level::WARN => Level::Warn,
            tracing::Level::INFO => Level::Info,
            tracing::Level::DEBUG | tracing::Level::TRACE => Level::Debug,
        };

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        self.hook
            .forward(visitor.into_record(level, event.metadata().name()));
    }
}

fn is_internal(target: &str) -> bool {
    INTERNAL_TARGETS.iter().any(|internal| {
        target
            .strip_prefix(internal)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
    })
}

/// Collects the `message` field and the remaining fields as JSON.
#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: Map<String, Value>,
}

impl FieldVisitor {
    fn into_record(self, level: Level, fallback: &str) -> LogRecord {
        let mut message = self.message.unwrap_or_default();
        for (name, value) in &self.fields {
            if !message.is_empty() {
                message.push(' ');
            }
            let _ = match value {
                Value::String(s) => write!(message, "{name}={s}"),
                other => write!(message, "{name}={other}"),
            };
        }
        if message.is_empty() {
            message = fallback.to_string();
        }

        let record = LogRecord::new(level, message);
        if self.fields.is_empty() {
            record
        } else {
            record.with_args(Value::Object(self.fields))
        }
    }

    fn insert(&mut self, field: &Field, value: Value) {
        self.fields.insert(field.name().to_string(), value);
    }
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let text = format!("{value:?}");
        if field.name() == "message" {
            self.message = Some(text);
        } else {
            self.insert(field, Value::String(text));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.insert(field, Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::from(value));
    }
}
