//! Correlation of OpenTelemetry spans with primary traces.
//!
//! * [`Mapper`] resolves finished spans against registered correlations and
//!   forwards them to the primary tracer.
//! * [`PendingSpans`] parks spans whose parent is not known yet.
pub use mapper::{Mapper, MapperBuilder, CORRELATION_ENTRY_SPAN_NAME, SPAN_KIND_TAG};
pub use pending::PendingSpans;

mod mapper;
mod pending;
mod span_processor;

use opentelemetry::trace::{SpanId, SpanKind, TraceId};
use opentelemetry::KeyValue;
use opentelemetry_sdk::trace::SpanData;
use std::borrow::Cow;
use std::cmp::Ordering;
use std::time::SystemTime;

/// Identifies a position in a secondary trace: the trace plus one of its spans.
///
/// Looked up with the *parent* span id of a finished span to find the primary
/// span it belongs to, and registered with the span's *own* id once it has
/// been forwarded, so that its children can resolve against it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CorrelationKey {
    trace_id: TraceId,
    span_id: SpanId,
}

impl CorrelationKey {
    /// Construct a new `CorrelationKey`
    pub fn new(trace_id: TraceId, span_id: SpanId) -> Self {
        CorrelationKey { trace_id, span_id }
    }

    /// The secondary trace id.
    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    /// The secondary span id.
    pub fn span_id(&self) -> SpanId {
        self.span_id
    }
}

impl Ord for CorrelationKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.trace_id
            .to_bytes()
            .cmp(&other.trace_id.to_bytes())
            .then_with(|| self.span_id.to_bytes().cmp(&other.span_id.to_bytes()))
    }
}

impl PartialOrd for CorrelationKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A finished span of the secondary tracing layer.
///
/// `SpanData` cannot be constructed outside of the SDK, so the mapper works on
/// its own copy of the fields it needs. Missing fields default to invalid ids,
/// the Unix epoch and no attributes.
#[derive(Clone, Debug, PartialEq)]
pub struct SpanRecord {
    /// Secondary trace id
    pub trace_id: TraceId,
    /// Secondary span id
    pub span_id: SpanId,
    /// Secondary parent span id
    pub parent_span_id: SpanId,
    /// Span name
    pub name: Cow<'static, str>,
    /// Span kind
    pub span_kind: SpanKind,
    /// Span start time
    pub start_time: SystemTime,
    /// Span end time
    pub end_time: SystemTime,
    /// Span attributes
    pub attributes: Vec<KeyValue>,
}

impl SpanRecord {
    /// Key under which the parent of this span is registered.
    pub fn parent_key(&self) -> CorrelationKey {
        CorrelationKey::new(self.trace_id, self.parent_span_id)
    }

    /// Key under which the children of this span look up their parent.
    pub fn key(&self) -> CorrelationKey {
        CorrelationKey::new(self.trace_id, self.span_id)
    }
}

impl Default for SpanRecord {
    fn default() -> Self {
        SpanRecord {
            trace_id: TraceId::INVALID,
            span_id: SpanId::INVALID,
            parent_span_id: SpanId::INVALID,
            name: Cow::Borrowed(""),
            span_kind: SpanKind::Internal,
            start_time: SystemTime::UNIX_EPOCH,
            end_time: SystemTime::UNIX_EPOCH,
            attributes: Vec::new(),
        }
    }
}

impl From<SpanData> for SpanRecord {
    fn from(span: SpanData) -> Self {
        SpanRecord {
            trace_id: span.span_context.trace_id(),
            span_id: span.span_context.span_id(),
            parent_span_id: span.parent_span_id,
            name: span.name,
            span_kind: span.span_kind,
            start_time: span.start_time,
            end_time: span.end_time,
            attributes: span.attributes,
        }
    }
}

/// Position of a span in the call graph, as reported in the `span.kind` tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SpanRole {
    /// Handles an incoming request.
    Entry,
    /// Calls out of the process; never has children of its own.
    Exit,
    Intermediate,
}

impl SpanRole {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            SpanRole::Entry => "server",
            SpanRole::Exit => "client",
            SpanRole::Intermediate => "intermediate",
        }
    }
}

impl From<&SpanKind> for SpanRole {
    fn from(kind: &SpanKind) -> Self {
        match kind {
            SpanKind::Client | SpanKind::Producer => SpanRole::Exit,
            SpanKind::Server | SpanKind::Consumer => SpanRole::Entry,
            SpanKind::Internal => SpanRole::Intermediate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_of_a_record() {
        let record = SpanRecord {
            trace_id: TraceId::from(1u128),
            span_id: SpanId::from(3u64),
            parent_span_id: SpanId::from(2u64),
            ..Default::default()
        };

        assert_eq!(
            record.parent_key(),
            CorrelationKey::new(TraceId::from(1u128), SpanId::from(2u64))
        );
        assert_eq!(
            record.key(),
            CorrelationKey::new(TraceId::from(1u128), SpanId::from(3u64))
        );
    }

    #[test]
    fn keys_order_by_trace_then_span() {
        let key = |trace: u128, span: u64| CorrelationKey::new(trace.into(), span.into());

        let mut keys = vec![key(2, 1), key(1, 9), key(1, 2)];
        keys.sort();
        assert_eq!(keys, vec![key(1, 2), key(1, 9), key(2, 1)]);
    }

    #[test]
    fn default_record_is_unresolvable() {
        let record = SpanRecord::default();

        assert_eq!(record.parent_key().trace_id(), TraceId::INVALID);
        assert_eq!(record.parent_key().span_id(), SpanId::INVALID);
        assert!(record.attributes.is_empty());
    }

    #[test]
    fn roles_from_span_kinds() {
        assert_eq!(SpanRole::from(&SpanKind::Client).as_str(), "client");
        assert_eq!(SpanRole::from(&SpanKind::Producer), SpanRole::Exit);
        assert_eq!(SpanRole::from(&SpanKind::Server).as_str(), "server");
        assert_eq!(SpanRole::from(&SpanKind::Consumer), SpanRole::Entry);
        assert_eq!(SpanRole::from(&SpanKind::Internal).as_str(), "intermediate");
    }
}
