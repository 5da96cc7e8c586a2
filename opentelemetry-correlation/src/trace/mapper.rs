//! ## Mapper
//!
//! Forwards finished OpenTelemetry spans into the trace of a primary tracer.
//!
//! A span is forwarded once the primary span its parent corresponds to is
//! known. That knowledge is a *correlation*: a mapping from the key of a
//! secondary span to the context of a primary span. Correlations are seeded by
//! [`Mapper::context`] and extended by every forwarded span that may have
//! children of its own. Spans that finish before their parent is known are
//! parked in [`PendingSpans`] and forwarded as soon as the parent is.
//!
//! ```ascii
//!   secondary span ends
//!          |
//!          v
//!   (trace, parent) correlated? --no--> park under (trace, parent)
//!          |
//!         yes: consume correlation
//!          |
//!          v
//!   emit child of the primary span
//!          |
//!          +--> not an exit span: correlate (trace, span) with emitted span
//!          |
//!          v
//!   fetch spans parked under (trace, span) and map each of them
//! ```
use crate::config::MapperConfig;
use crate::error::CorrelationError;
use crate::primary::{PrimaryContextExt, PrimarySpan, PrimarySpanContext, PrimaryTracer, Tags};
use crate::trace::pending::{CleanupWorker, PendingSpans};
use crate::trace::{CorrelationKey, SpanRecord, SpanRole};
use opentelemetry::otel_debug;
use opentelemetry::trace::{SpanBuilder, SpanContext, TraceContextExt, Tracer};
use opentelemetry::{Context, Key, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Name of the span started by [`Mapper::context`].
pub const CORRELATION_ENTRY_SPAN_NAME: &str = "opentelemetry-correlation.Context";

/// Tag classifying a forwarded span as `client`, `server` or `intermediate`.
pub const SPAN_KIND_TAG: &str = "span.kind";

/// Maps OpenTelemetry spans onto the traces of a [`PrimaryTracer`].
///
/// The mapper is a cheap handle: clones share the same correlations and parked
/// spans, so one clone can be registered with an `SdkTracerProvider` while
/// another is used to call [`Mapper::context`]. Independent mappers never share
/// any state.
///
/// # Examples
///
/// Requires the `testing` feature for `InMemoryTracer`.
///
#[cfg_attr(feature = "testing", doc = "```")]
#[cfg_attr(not(feature = "testing"), doc = "```ignore")]
/// use opentelemetry::trace::{Span, TraceContextExt, Tracer, TracerProvider as _};
/// use opentelemetry::Context;
/// use opentelemetry_correlation::testing::InMemoryTracer;
/// use opentelemetry_correlation::{Mapper, PrimaryContextExt, PrimarySpan};
/// use opentelemetry_sdk::trace::SdkTracerProvider;
///
/// let primary = InMemoryTracer::default();
/// let mapper = Mapper::new(primary.clone());
/// let provider = SdkTracerProvider::builder()
///     .with_span_processor(mapper.clone())
///     .build();
/// let tracer = provider.tracer("example");
///
/// let entry = primary.start_root_span("entry");
/// let cx = Context::new().with_primary_span(entry.span_context().clone());
/// let (cx, _) = mapper.context(&tracer, &cx);
///
/// tracer.start_with_context("work", &cx).end();
///
/// let spans = primary.finished_spans().unwrap();
/// assert_eq!(spans.len(), 1);
/// assert_eq!(spans[0].parent_span_id, entry.span_context().span_id());
/// ```
pub struct Mapper<T> {
    inner: Arc<MapperInner<T>>,
}

struct MapperInner<T> {
    tracer: T,
    config: MapperConfig,
    correlations: RwLock<HashMap<CorrelationKey, PrimarySpanContext>>,
    pending: Arc<PendingSpans>,
    cleanup: Mutex<Option<CleanupWorker>>,
    is_shutdown: AtomicBool,
}

impl<T> Clone for Mapper<T> {
    fn clone(&self) -> Self {
        Mapper {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Mapper<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mapper")
            .field("tracer", &self.inner.tracer)
            .field("config", &self.inner.config)
            .field("is_shutdown", &self.inner.is_shutdown.load(Ordering::Relaxed))
            .finish()
    }
}

impl<T: PrimaryTracer> Mapper<T> {
    /// Create a new mapper forwarding spans to `tracer`, configured from the
    /// environment.
    ///
    /// # Panics
    ///
    /// Panics if the cleanup worker thread cannot be spawned. Use
    /// [`Mapper::builder`] to handle that error instead.
    pub fn new(tracer: T) -> Self {
        match Mapper::builder(tracer).build() {
            Ok(mapper) => mapper,
            Err(err) => panic!("failed to start mapper: {}", err),
        }
    }

    /// Create a new [`MapperBuilder`].
    pub fn builder(tracer: T) -> MapperBuilder<T> {
        MapperBuilder {
            tracer,
            config: None,
        }
    }

    /// Records that spans whose parent is `key` belong to `primary`.
    ///
    /// Registering the same key again replaces the previous primary span.
    pub fn register_correlation(&self, key: CorrelationKey, primary: PrimarySpanContext) {
        self.inner
            .correlations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, primary);
    }

    /// Starts a sampled OpenTelemetry span below `cx` marking the entry into
    /// OpenTelemetry-instrumented code.
    ///
    /// An unsampled parent in `cx` is treated as sampled, so the span is
    /// recorded by any parent based sampler, including the SDK default.
    ///
    /// If `cx` carries an active primary span, the new span is correlated with
    /// it, and every span started below the returned context ends up in the
    /// primary trace. Otherwise spans below it are parked until they expire.
    ///
    /// Returns a context holding the new span, and the span's context. End the
    /// span through the returned context.
    pub fn context<S>(&self, tracer: &S, cx: &Context) -> (Context, SpanContext)
    where
        S: Tracer,
        S::Span: Send + Sync + 'static,
    {
        // parent based samplers follow the parent, so mark it as sampled
        let parent = cx.span().span_context().clone();
        let sampling_cx = if parent.is_valid() && !parent.is_sampled() {
            cx.with_remote_span_context(SpanContext::new(
                parent.trace_id(),
                parent.span_id(),
                parent.trace_flags().with_sampled(true),
                parent.is_remote(),
                parent.trace_state().clone(),
            ))
        } else {
            cx.clone()
        };

        let span = tracer.build_with_context(
            SpanBuilder::from_name(CORRELATION_ENTRY_SPAN_NAME),
            &sampling_cx,
        );
        let span_context = opentelemetry::trace::Span::span_context(&span).clone();

        // a non-recording tracer hands out invalid ids shared by every span
        if let Some(primary) = cx.primary_span().filter(|_| span_context.is_valid()) {
            self.register_correlation(
                CorrelationKey::new(span_context.trace_id(), span_context.span_id()),
                primary.clone(),
            );
        }

        (cx.with_span(span), span_context)
    }

    /// Forwards a finished span to the primary tracer, or parks it until its
    /// parent is forwarded.
    ///
    /// Forwarding a span also forwards every span parked below it, in the
    /// order they were parked, before this call returns.
    pub fn export_span(&self, span: SpanRecord) {
        let mut queue = vec![span];
        while let Some(span) = queue.pop() {
            let mut next = self.map_span(span);
            next.reverse();
            queue.append(&mut next);
        }
    }

    /// Number of spans waiting for their parent.
    pub fn pending_span_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Number of registered correlations not consumed yet.
    pub fn correlation_count(&self) -> usize {
        self.inner
            .correlations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// The configuration of this mapper.
    pub fn config(&self) -> &MapperConfig {
        &self.inner.config
    }

    /// Stops the worker evicting expired spans.
    ///
    /// Spans are still mapped after shutdown, but the SDK no longer delivers
    /// them. A second call returns [`CorrelationError::AlreadyShutdown`].
    pub fn shutdown(&self) -> Result<(), CorrelationError> {
        if self.inner.is_shutdown.swap(true, Ordering::Relaxed) {
            return Err(CorrelationError::AlreadyShutdown);
        }

        self.inner.stop_cleanup()
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.inner.is_shutdown.load(Ordering::Relaxed)
    }

    /// Runs one span through the state machine and returns the parked spans
    /// to map next.
    fn map_span(&self, span: SpanRecord) -> Vec<SpanRecord> {
        let parent_key = span.parent_key();
        let Some(parent) = self.take_correlation(&parent_key) else {
            return self.park(parent_key, span);
        };

        otel_debug!(
            name: "Mapper.SpanMapped",
            span = describe(&span),
            primary_trace_id = format!("{}", parent.trace_id())
        );

        let role = SpanRole::from(&span.span_kind);
        let mut tags: Tags = span
            .attributes
            .iter()
            .map(|kv| (kv.key.clone(), kv.value.clone()))
            .collect();
        tags.insert(Key::from_static_str(SPAN_KIND_TAG), Value::from(role.as_str()));

        let emitted = self
            .inner
            .tracer
            .start_span(span.name.clone(), &parent, span.start_time, tags);
        let emitted_context = emitted.span_context().clone();
        emitted.finish_at(span.end_time);

        // exit spans have no children to wait for
        if role != SpanRole::Exit {
            self.register_correlation(span.key(), emitted_context);
        }

        let children = self.inner.pending.fetch(&span.key());
        if !children.is_empty() {
            otel_debug!(
                name: "Mapper.ParkedSpansFlushed",
                span = describe(&span),
                count = format!("{}", children.len())
            );
        }
        children
    }

    fn take_correlation(&self, key: &CorrelationKey) -> Option<PrimarySpanContext> {
        let known = self
            .inner
            .correlations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key);
        if !known {
            return None;
        }

        // another thread may have consumed it in between
        self.inner
            .correlations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }

    fn park(&self, key: CorrelationKey, span: SpanRecord) -> Vec<SpanRecord> {
        if !self.inner.config.park_unmapped_spans {
            otel_debug!(name: "Mapper.SpanDropped", span = describe(&span));
            return Vec::new();
        }

        otel_debug!(name: "Mapper.SpanParked", span = describe(&span));
        self.inner.pending.put(key, span);

        // the parent may have been correlated while this span was parked
        let registered = self
            .inner
            .correlations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&key);
        if registered {
            self.inner.pending.fetch(&key)
        } else {
            Vec::new()
        }
    }
}

impl<T> MapperInner<T> {
    fn stop_cleanup(&self) -> Result<(), CorrelationError> {
        let worker = self
            .cleanup
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match worker {
            Some(worker) => worker.stop(),
            None => Ok(()),
        }
    }
}

impl<T> Drop for MapperInner<T> {
    fn drop(&mut self) {
        if let Err(err) = self.stop_cleanup() {
            otel_debug!(name: "Mapper.Drop.CleanupError", reason = format!("{}", err));
        }
    }
}

fn describe(span: &SpanRecord) -> String {
    format!(
        "{} (traceID: {}, spanID: {})",
        span.name, span.trace_id, span.span_id
    )
}

/// Builder for [`Mapper`].
#[derive(Debug)]
pub struct MapperBuilder<T> {
    tracer: T,
    config: Option<MapperConfig>,
}

impl<T: PrimaryTracer> MapperBuilder<T> {
    /// Set the [`MapperConfig`] for [`MapperBuilder`]. Without it the
    /// configuration is read from the environment.
    pub fn with_config(self, config: MapperConfig) -> Self {
        MapperBuilder {
            config: Some(config),
            ..self
        }
    }

    /// Build a new [`Mapper`], starting the cleanup worker when parked spans
    /// expire.
    pub fn build(self) -> Result<Mapper<T>, CorrelationError> {
        let config = self.config.unwrap_or_default();
        let pending = Arc::new(PendingSpans::new(config.max_trace_duration));
        let cleanup = pending.spawn_cleanup()?;

        Ok(Mapper {
            inner: Arc::new(MapperInner {
                tracer: self.tracer,
                config,
                correlations: RwLock::new(HashMap::new()),
                pending,
                cleanup: Mutex::new(cleanup),
                is_shutdown: AtomicBool::new(false),
            }),
        })
    }
}
