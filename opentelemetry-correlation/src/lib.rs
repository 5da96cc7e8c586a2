//! # OpenTelemetry Correlation
//!
//! Forwards spans recorded through OpenTelemetry into the traces of another
//! tracer, the *primary* tracer, so that both end up in one trace.
//!
//! The two tracers assign their own identifiers, and OpenTelemetry spans are
//! finished in arbitrary order. The [`Mapper`] bridges both: it is registered
//! as a span processor, starts correlation entry spans where
//! OpenTelemetry-instrumented code is entered below a primary span, and
//! re-parents every span ending below such an entry into the primary trace.
//! Spans ending before their parent is known are parked until it is.
//!
//! With the `testing` feature, `testing::InMemoryTracer` stands in for the
//! primary tracer:
//!
#![cfg_attr(feature = "testing", doc = "```")]
#![cfg_attr(not(feature = "testing"), doc = "```ignore")]
//! use opentelemetry::trace::{Tracer, TracerProvider as _};
//! use opentelemetry::Context;
//! use opentelemetry_correlation::testing::InMemoryTracer;
//! use opentelemetry_correlation::{Mapper, PrimaryContextExt, PrimarySpan};
//! use opentelemetry_sdk::trace::SdkTracerProvider;
//!
//! let primary = InMemoryTracer::default();
//! let mapper = Mapper::new(primary.clone());
//! let provider = SdkTracerProvider::builder()
//!     .with_span_processor(mapper.clone())
//!     .build();
//! let tracer = provider.tracer("my-component");
//!
//! // wherever a primary span is active
//! let request = primary.start_root_span("GET /users");
//! let cx = Context::current_with_primary_span(request.span_context().clone());
//! let (cx, _) = mapper.context(&tracer, &cx);
//! let guard = cx.attach();
//!
//! // spans started here are reported as descendants of the primary span
//! tracer.in_span("query", |_cx| {});
//! drop(guard);
//!
//! let spans = primary.finished_spans().unwrap();
//! assert_eq!(spans[0].name, "query");
//! assert_eq!(spans[0].parent_span_id, request.span_context().span_id());
//! ```
//!
//! [`TraceState`] is the vendor trace state carried by primary span contexts.
//!
//! ## Configuration
//!
//! See [`MapperConfig`]. The following environment variables are read when no
//! configuration is given explicitly:
//!
//! * `OTEL_CORRELATION_MAX_TRACE_DURATION`: milliseconds a span waits for its
//!   parent before it is dropped, `0` waits forever (the default).
//! * `OTEL_CORRELATION_PARK_UNMAPPED_SPANS`: `false` drops spans whose parent
//!   is unknown right away. Defaults to `true`.
//!
//! ## Crate Feature Flags
//!
//! * `internal-logs`: emits internal diagnostics through the OpenTelemetry
//!   internal logging macros. Enabled by default.
//! * `testing`: exposes `testing::InMemoryTracer`.
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]
#![doc(
    html_logo_url = "https://raw.githubusercontent.com/open-telemetry/opentelemetry-rust/main/assets/logo.svg"
)]

mod config;
mod error;
mod primary;
mod trace;
mod trace_state;

#[cfg(any(test, feature = "testing"))]
#[cfg_attr(docsrs, doc(cfg(feature = "testing")))]
pub mod testing;

pub use config::{MapperConfig, MapperConfigBuilder};
pub use error::CorrelationError;
pub use primary::{PrimaryContextExt, PrimarySpan, PrimarySpanContext, PrimaryTracer, Tags};
pub use trace::{
    CorrelationKey, Mapper, MapperBuilder, PendingSpans, SpanRecord, CORRELATION_ENTRY_SPAN_NAME,
    SPAN_KIND_TAG,
};
pub use trace_state::{TraceState, ENTRY_LENGTH_THRESHOLD, MAX_ENTRIES};
