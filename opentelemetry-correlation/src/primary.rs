//! # Primary tracer
//!
//! The primary tracer owns the canonical trace and span identifiers and the
//! reporting pipeline spans are forwarded to. The mapper only needs three
//! things from it:
//!
//! * the context of the primary span active in the current [`Context`]
//!   ([`PrimaryContextExt`]),
//! * a way to start a child span with an explicit start time and tags
//!   ([`PrimaryTracer`]),
//! * a way to finish that span at an explicit end time ([`PrimarySpan`]).
use crate::trace_state::TraceState;
use opentelemetry::trace::{SpanId, TraceId};
use opentelemetry::{Context, Key, Value};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::time::SystemTime;

/// Tags attached to a span emitted into the primary trace.
pub type Tags = HashMap<Key, Value>;

/// Identity of a span of the primary tracer.
///
/// Captured once and copied around freely, it is never mutated.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PrimarySpanContext {
    trace_id: TraceId,
    span_id: SpanId,
    trace_state: TraceState,
}

impl PrimarySpanContext {
    /// Construct a new `PrimarySpanContext`
    pub fn new(trace_id: TraceId, span_id: SpanId, trace_state: TraceState) -> Self {
        PrimarySpanContext {
            trace_id,
            span_id,
            trace_state,
        }
    }

    /// The primary trace id.
    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    /// The primary span id.
    pub fn span_id(&self) -> SpanId {
        self.span_id
    }

    /// Vendor data propagated with this span.
    pub fn trace_state(&self) -> &TraceState {
        &self.trace_state
    }
}

/// A started span of the primary tracer.
pub trait PrimarySpan {
    /// The identity of this span, used to parent spans emitted below it.
    fn span_context(&self) -> &PrimarySpanContext;

    /// Finishes the span at `end_time` and hands it to the primary tracer's
    /// reporting pipeline.
    fn finish_at(self, end_time: SystemTime);
}

/// The tracer spans are forwarded to.
pub trait PrimaryTracer: Send + Sync + fmt::Debug + 'static {
    /// The span type started by this tracer.
    type Span: PrimarySpan;

    /// Starts a span named `name` as a child of `parent`.
    fn start_span(
        &self,
        name: Cow<'static, str>,
        parent: &PrimarySpanContext,
        start_time: SystemTime,
        tags: Tags,
    ) -> Self::Span;
}

/// The primary span stored in a [`Context`].
#[derive(Clone, Debug)]
struct ActivePrimarySpan(PrimarySpanContext);

/// Methods for storing and retrieving the active primary span in a [`Context`].
///
/// Attaching the returned context with [`Context::attach`] makes the primary
/// span active for the current thread until the guard is dropped.
pub trait PrimaryContextExt {
    /// Returns a clone of the current context with `span_context` as the
    /// active primary span.
    fn current_with_primary_span(span_context: PrimarySpanContext) -> Self;

    /// Returns a clone of this context with `span_context` as the active
    /// primary span.
    fn with_primary_span(&self, span_context: PrimarySpanContext) -> Self;

    /// The active primary span, if any.
    fn primary_span(&self) -> Option<&PrimarySpanContext>;
}

impl PrimaryContextExt for Context {
    fn current_with_primary_span(span_context: PrimarySpanContext) -> Self {
        Context::current().with_primary_span(span_context)
    }

    fn with_primary_span(&self, span_context: PrimarySpanContext) -> Self {
        self.with_value(ActivePrimarySpan(span_context))
    }

    fn primary_span(&self) -> Option<&PrimarySpanContext> {
        self.get::<ActivePrimarySpan>().map(|active| &active.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span_context(span_id: u64) -> PrimarySpanContext {
        PrimarySpanContext::new(
            TraceId::from(42u128),
            SpanId::from(span_id),
            TraceState::parse("in=2a;1"),
        )
    }

    #[test]
    fn context_without_primary_span() {
        assert!(Context::new().primary_span().is_none());
    }

    #[test]
    fn context_with_primary_span() {
        let cx = Context::new().with_primary_span(span_context(1));

        assert_eq!(cx.primary_span(), Some(&span_context(1)));
        assert_eq!(cx.primary_span().map(|sc| sc.trace_state().fetch("in")), Some(Some("2a;1")));
    }

    #[test]
    fn attached_primary_span_is_detached_on_drop() {
        {
            let _guard = Context::current_with_primary_span(span_context(7)).attach();
            assert_eq!(
                Context::map_current(|cx| cx.primary_span().cloned()),
                Some(span_context(7))
            );
        }

        assert!(Context::map_current(|cx| cx.primary_span().is_none()));
    }
}
