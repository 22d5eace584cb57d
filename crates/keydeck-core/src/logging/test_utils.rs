//! In-memory log capture for tests.
//!
//! Events remember the fields of every span they were emitted in, so a log
//! line written by a handler running under [`instance_span`](super::instance_span)
//! can be attributed to its context without the handler repeating it.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::field::{Field, Visit};
use tracing::level_filters::LevelFilter;
use tracing::span::{Attributes, Id};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

/// One captured event.
#[derive(Clone, Debug)]
pub struct CapturedEvent {
    /// Level it was emitted at.
    pub level: Level,
    /// Formatted message.
    pub message: String,
    /// Fields on the event itself.
    pub fields: Vec<(String, String)>,
    /// Fields inherited from enclosing spans, innermost first.
    pub scope: Vec<(String, String)>,
}

impl CapturedEvent {
    /// A field from the event, falling back to the enclosing spans.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .chain(&self.scope)
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// The action context the event belongs to, if any.
    pub fn context(&self) -> Option<&str> {
        self.field("context")
    }
}

/// Handle onto everything captured since [`capture_logs`].
#[derive(Clone, Default)]
pub struct CapturedLogs {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
    spans: Arc<Mutex<Vec<String>>>,
}

impl CapturedLogs {
    /// Snapshot of all events.
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().clone()
    }

    /// Events attributed to one action context.
    pub fn for_context(&self, context: &str) -> Vec<CapturedEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.context() == Some(context))
            .cloned()
            .collect()
    }

    /// Whether any message contains `needle`.
    pub fn has_message(&self, needle: &str) -> bool {
        self.count_matching(needle) > 0
    }

    /// Whether any message at `level` contains `needle`.
    pub fn has_event(&self, level: Level, needle: &str) -> bool {
        self.events
            .lock()
            .iter()
            .any(|e| e.level == level && e.message.contains(needle))
    }

    /// Whether a span named `name` was opened.
    pub fn has_span(&self, name: &str) -> bool {
        self.spans.lock().iter().any(|s| s == name)
    }

    /// Number of events at `level`.
    pub fn count_at_level(&self, level: Level) -> usize {
        self.events.lock().iter().filter(|e| e.level == level).count()
    }

    /// Number of messages containing `needle`.
    pub fn count_matching(&self, needle: &str) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.message.contains(needle))
            .count()
    }

    /// Forget everything captured so far.
    pub fn clear(&self) {
        self.events.lock().clear();
        self.spans.lock().clear();
    }
}

#[derive(Default)]
struct Recorded {
    message: String,
    fields: Vec<(String, String)>,
}

impl Visit for Recorded {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            value.clone_into(&mut self.message);
        } else {
            self.fields.push((field.name().to_owned(), value.to_owned()));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let rendered = format!("{value:?}");
        if field.name() == "message" {
            self.message = rendered;
        } else {
            self.fields.push((field.name().to_owned(), rendered));
        }
    }
}

/// Span fields, stored in the registry's span extensions.
struct SpanFields(Vec<(String, String)>);

struct CaptureLayer {
    logs: CapturedLogs,
}

impl<S> Layer<S> for CaptureLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut recorded = Recorded::default();
        attrs.record(&mut recorded);
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(SpanFields(recorded.fields));
        }
        self.logs.spans.lock().push(attrs.metadata().name().to_owned());
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut recorded = Recorded::default();
        event.record(&mut recorded);

        let mut scope = Vec::new();
        if let Some(spans) = ctx.event_scope(event) {
            for span in spans {
                if let Some(SpanFields(fields)) = span.extensions().get::<SpanFields>() {
                    scope.extend(fields.iter().cloned());
                }
            }
        }

        self.logs.events.lock().push(CapturedEvent {
            level: *event.metadata().level(),
            message: recorded.message,
            fields: recorded.fields,
            scope,
        });
    }
}

/// Capture every event on the current thread until the guard drops.
///
/// Uses `set_default`, so logs from tasks spawned onto other worker threads
/// are missed. Async tests should stay on the current-thread runtime.
pub fn capture_logs() -> (CapturedLogs, tracing::subscriber::DefaultGuard) {
    let logs = CapturedLogs::default();
    let guard = tracing_subscriber::registry()
        .with(CaptureLayer { logs: logs.clone() })
        .with(LevelFilter::TRACE)
        .set_default();
    (logs, guard)
}
