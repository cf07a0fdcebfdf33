//! Custom tracing layers and writers
//!
//! [`NodeContextLayer`] tags every new span with the node context active at
//! creation time; [`jsonl_file_layer`] is the JSONL formatter used for files
//! and captured output.

use std::io;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use tracing::{Subscriber, span};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::fmt::format::{Format, Json, JsonFields};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

use crate::context::{NodeContextData, NodeContextGuard};

/// Layer that attaches the active node context to new spans
#[derive(Debug, Default)]
pub struct NodeContextLayer;

impl NodeContextLayer {
    pub fn new() -> Self {
        Self
    }
}

/// Extension data stored on spans
#[derive(Debug, Clone)]
pub struct NodeContextExtension {
    pub data: NodeContextData,
}

impl<S> Layer<S> for NodeContextLayer
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    fn on_new_span(&self, _attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        if let (Some(span), Some(node)) = (ctx.span(id), NodeContextGuard::current()) {
            span.extensions_mut()
                .insert(NodeContextExtension { data: node });
        }
    }
}

/// JSONL formatting layer for `writer`
pub fn jsonl_file_layer<S, W>(
    writer: W,
    include_location: bool,
    include_thread_info: bool,
) -> tracing_subscriber::fmt::Layer<S, JsonFields, Format<Json>, W>
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
    W: for<'writer> MakeWriter<'writer> + 'static,
{
    tracing_subscriber::fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .flatten_event(true)
        .with_file(include_location)
        .with_line_number(include_location)
        .with_thread_ids(include_thread_info)
        .with_thread_names(include_thread_info)
        .with_writer(writer)
}

/// In-memory log sink, shareable between the subscriber and a reader
#[derive(Debug, Clone, Default)]
pub struct MemoryWriter {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buf.lock()).into_owned()
    }

    /// Captured output split into lines
    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_owned).collect()
    }

    pub fn clear(&self) {
        self.buf.lock().clear();
    }
}

/// Writer handed out per event; holds the buffer lock while writing
pub struct MemoryWriterGuard<'a>(MutexGuard<'a, Vec<u8>>);

impl io::Write for MemoryWriterGuard<'_> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.0.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for MemoryWriter {
    type Writer = MemoryWriterGuard<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        MemoryWriterGuard(self.buf.lock())
    }
}

#[cfg(test)]
mod tests {
    use satnet_core::{NodeId, NodeRole};
    use tracing_subscriber::Registry;
    use tracing_subscriber::layer::SubscriberExt;

    use super::*;

    #[test]
    fn test_jsonl_lines_carry_node_span() {
        let writer = MemoryWriter::new();
        let subscriber = Registry::default()
            .with(NodeContextLayer::new())
            .with(jsonl_file_layer(writer.clone(), false, false));

        tracing::subscriber::with_default(subscriber, || {
            let _guard = NodeContextGuard::new(NodeId(4), NodeRole::Satellite);
            let span = NodeContextGuard::current().unwrap().span();
            let _entered = span.enter();
            tracing::info!(target_gs = 2, "Forwarding packet");
        });

        let lines = writer.lines();
        assert_eq!(lines.len(), 1);
        let value: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(value["message"], "Forwarding packet");
        assert_eq!(value["target_gs"], 2);
        assert_eq!(value["span"]["node_id"], "4");
        assert_eq!(value["span"]["node_role"], "satellite");
    }

    #[test]
    fn test_memory_writer_clear() {
        let writer = MemoryWriter::new();
        {
            use std::io::Write;
            let mut w = writer.make_writer();
            w.write_all(b"one\ntwo\n").unwrap();
        }
        assert_eq!(writer.lines(), vec!["one", "two"]);
        writer.clear();
        assert!(writer.contents().is_empty());
    }
}
