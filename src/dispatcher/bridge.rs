//! Bridge from tracing to a dispatcher

use std::fmt::Write as _;
use std::sync::Arc;

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use crate::record::Level;
use crate::FALLBACK_TARGET;

use super::{is_dispatching, Dispatcher};

/// A tracing layer that forwards events to a [`Dispatcher`]
///
/// The event target becomes the caller tag and extra fields are appended to
/// the message as `key=value`. Events on the fallback target are skipped, as
/// are events raised on a thread that is already inside a dispatcher, such
/// as from a sink or a library a sink calls.
pub struct DispatcherLayer {
    dispatcher: Arc<Dispatcher>,
}

impl DispatcherLayer {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }
}

impl<S> Layer<S> for DispatcherLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if metadata.target() == FALLBACK_TARGET || is_dispatching() {
            return;
        }

        let level = Level::from(*metadata.level());

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let spans: Vec<&str> = ctx
            .event_scope(event)
            .map(|scope| scope.from_root().map(|span| span.name()).collect())
            .unwrap_or_default();
        let text = visitor.finish();
        let message = if spans.is_empty() {
            text
        } else {
            format!("{}: {}", spans.join("::"), text)
        };

        self.dispatcher.emit(metadata.target(), level, &message);
    }
}

/// Visitor collecting the message and the remaining fields
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn push_field(&mut self, field: &Field, value: &dyn std::fmt::Display) {
        let _ = write!(self.fields, " {}={}", field.name(), value);
    }

    fn finish(self) -> String {
        if self.message.is_empty() {
            self.fields.trim_start().to_string()
        } else {
            self.message + &self.fields
        }
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.push_field(field, &value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            self.push_field(field, &format_args!("{:?}", value));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push_field(field, &value);
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.push_field(field, &value);
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push_field(field, &value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::record::LogRecord;
    use crate::sink::{MemorySink, Sink};
    use std::sync::mpsc;
    use std::time::Duration;
    use tracing_subscriber::layer::SubscriberExt;

    /// Sink that emits a tracing event of its own on every write
    struct ChattySink {
        memory: Arc<MemorySink>,
    }

    impl Sink for ChattySink {
        fn name(&self) -> &str {
            "chatty"
        }

        fn write(&self, record: &LogRecord) -> Result<()> {
            tracing::info!(target: "some_dep", "flushing");
            self.memory.write(record)
        }
    }

    fn setup(level: Level) -> (Arc<Dispatcher>, Arc<MemorySink>) {
        let memory = Arc::new(MemorySink::default());
        let dispatcher = Dispatcher::builder()
            .shared_sink(memory.clone())
            .level(level)
            .build()
            .unwrap();
        memory.clear();
        (Arc::new(dispatcher), memory)
    }

    #[test]
    fn test_events_reach_dispatcher() {
        let (dispatcher, memory) = setup(Level::Info);
        let subscriber =
            tracing_subscriber::registry().with(DispatcherLayer::new(Arc::clone(&dispatcher)));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "app::net", peer = "10.0.0.1", port = 8080u64, "connected");
            tracing::debug!(target: "app::net", "below threshold");
            tracing::error!(target: "app::net", retry = false, "lost connection");
        });

        assert_eq!(
            memory.lines(),
            vec![
                "[INFO] connected peer=10.0.0.1 port=8080",
                "[ERROR] lost connection retry=false",
            ]
        );
    }

    #[test]
    fn test_span_names_prefix_message() {
        let (dispatcher, memory) = setup(Level::Info);
        let subscriber =
            tracing_subscriber::registry().with(DispatcherLayer::new(Arc::clone(&dispatcher)));

        tracing::subscriber::with_default(subscriber, || {
            let span = tracing::info_span!("upload");
            let _guard = span.enter();
            tracing::warn!("slow chunk");
        });

        assert_eq!(memory.lines(), vec!["[WARN] upload: slow chunk"]);
    }

    #[test]
    fn test_fallback_target_is_skipped() {
        let (dispatcher, memory) = setup(Level::Trace);
        let subscriber =
            tracing_subscriber::registry().with(DispatcherLayer::new(Arc::clone(&dispatcher)));

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(target: FALLBACK_TARGET, "internal");
            dispatcher.set_level(Level::Debug);
        });

        assert!(memory.is_empty());
    }

    #[test]
    fn test_sink_tracing_events_do_not_reenter() {
        let memory = Arc::new(MemorySink::default());
        let dispatcher = Dispatcher::builder()
            .sink(ChattySink {
                memory: Arc::clone(&memory),
            })
            .level(Level::Info)
            .build()
            .unwrap();
        memory.clear();
        let dispatcher = Arc::new(dispatcher);

        let (done_tx, done_rx) = mpsc::channel();
        let worker = Arc::clone(&dispatcher);
        std::thread::spawn(move || {
            let subscriber =
                tracing_subscriber::registry().with(DispatcherLayer::new(Arc::clone(&worker)));
            tracing::subscriber::with_default(subscriber, || {
                worker.info("app", "hello");
                tracing::warn!(target: "app::net", "via tracing");
            });
            let _ = done_tx.send(());
        });

        assert!(
            done_rx.recv_timeout(Duration::from_secs(5)).is_ok(),
            "dispatcher blocked on its own lock"
        );
        assert_eq!(memory.lines(), vec!["[INFO] hello", "[WARN] via tracing"]);
    }
}
