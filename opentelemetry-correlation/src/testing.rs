//! In-memory primary tracer for tests.
use crate::error::CorrelationError;
use crate::primary::{PrimarySpan, PrimarySpanContext, PrimaryTracer, Tags};
use crate::trace_state::TraceState;
use opentelemetry::trace::{SpanId, TraceId};
use std::borrow::Cow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

/// A span finished by an [`InMemoryTracer`].
#[derive(Clone, Debug, PartialEq)]
pub struct FinishedSpan {
    /// Span name
    pub name: Cow<'static, str>,
    /// Identity assigned by the tracer
    pub span_context: PrimarySpanContext,
    /// Parent span id, invalid for root spans
    pub parent_span_id: SpanId,
    /// Span start time
    pub start_time: SystemTime,
    /// Span end time
    pub end_time: SystemTime,
    /// Span tags
    pub tags: Tags,
}

/// A primary tracer that stores finished spans in memory.
///
/// Clones share the finished spans and the id sequence. Ids are assigned
/// sequentially starting at 1.
///
/// # Example
///
/// ```
/// use opentelemetry_correlation::testing::InMemoryTracer;
/// use opentelemetry_correlation::PrimarySpan;
/// use std::time::SystemTime;
///
/// let tracer = InMemoryTracer::default();
/// tracer.start_root_span("entry").finish_at(SystemTime::now());
///
/// let spans = tracer.finished_spans().unwrap();
/// assert_eq!(spans[0].name, "entry");
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryTracer {
    next_id: Arc<AtomicU64>,
    spans: Arc<Mutex<Vec<FinishedSpan>>>,
}

impl InMemoryTracer {
    /// Starts a span with no parent in a new trace.
    pub fn start_root_span(&self, name: &'static str) -> InMemorySpan {
        self.start_root_span_with_state(name, TraceState::default())
    }

    /// Starts a span with no parent in a new trace carrying `trace_state`.
    pub fn start_root_span_with_state(
        &self,
        name: &'static str,
        trace_state: TraceState,
    ) -> InMemorySpan {
        let trace_id = TraceId::from(u128::from(self.next_id()));
        self.span(
            Cow::Borrowed(name),
            PrimarySpanContext::new(trace_id, SpanId::from(self.next_id()), trace_state),
            SpanId::INVALID,
            SystemTime::now(),
            Tags::new(),
        )
    }

    /// Returns the finished spans in the order they were finished.
    ///
    /// # Errors
    ///
    /// Returns a `CorrelationError` if the internal lock cannot be acquired.
    pub fn finished_spans(&self) -> Result<Vec<FinishedSpan>, CorrelationError> {
        self.spans
            .lock()
            .map(|spans| spans.clone())
            .map_err(CorrelationError::from)
    }

    /// Clears the finished spans.
    pub fn reset(&self) {
        let _ = self.spans.lock().map(|mut spans| spans.clear());
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn span(
        &self,
        name: Cow<'static, str>,
        span_context: PrimarySpanContext,
        parent_span_id: SpanId,
        start_time: SystemTime,
        tags: Tags,
    ) -> InMemorySpan {
        InMemorySpan {
            name,
            span_context,
            parent_span_id,
            start_time,
            tags,
            spans: Arc::clone(&self.spans),
        }
    }
}

impl PrimaryTracer for InMemoryTracer {
    type Span = InMemorySpan;

    fn start_span(
        &self,
        name: Cow<'static, str>,
        parent: &PrimarySpanContext,
        start_time: SystemTime,
        tags: Tags,
    ) -> InMemorySpan {
        let span_context = PrimarySpanContext::new(
            parent.trace_id(),
            SpanId::from(self.next_id()),
            parent.trace_state().clone(),
        );
        self.span(name, span_context, parent.span_id(), start_time, tags)
    }
}

/// A span started by an [`InMemoryTracer`], recorded once finished.
#[derive(Debug)]
pub struct InMemorySpan {
    name: Cow<'static, str>,
    span_context: PrimarySpanContext,
    parent_span_id: SpanId,
    start_time: SystemTime,
    tags: Tags,
    spans: Arc<Mutex<Vec<FinishedSpan>>>,
}

impl PrimarySpan for InMemorySpan {
    fn span_context(&self) -> &PrimarySpanContext {
        &self.span_context
    }

    fn finish_at(self, end_time: SystemTime) {
        let finished = FinishedSpan {
            name: self.name,
            span_context: self.span_context,
            parent_span_id: self.parent_span_id,
            start_time: self.start_time,
            end_time,
            tags: self.tags,
        };
        let _ = self.spans.lock().map(|mut spans| spans.push(finished));
    }
}
