//! ## Mapper span processor
//!
//! Hands every sampled span the SDK finishes to the [`Mapper`]. Register a
//! clone of the mapper with the tracer provider:
//!
//! ```ignore
//! let provider = SdkTracerProvider::builder()
//!     .with_span_processor(mapper.clone())
//!     .build();
//! ```
use crate::primary::PrimaryTracer;
use crate::trace::{Mapper, SpanRecord};
use opentelemetry::{otel_debug, Context};
use opentelemetry_sdk::error::OTelSdkResult;
use opentelemetry_sdk::trace::{Span, SpanData, SpanProcessor};
use std::time::Duration;

impl<T: PrimaryTracer> SpanProcessor for Mapper<T> {
    fn on_start(&self, _span: &mut Span, _cx: &Context) {
        // Ignored
    }

    fn on_end(&self, span: SpanData) {
        if !span.span_context.is_sampled() {
            return;
        }

        if self.is_shutdown() {
            otel_debug!(
                name: "Mapper.OnEnd.AfterShutdown",
                span_name = span.name.to_string()
            );
            return;
        }

        self.export_span(SpanRecord::from(span));
    }

    fn force_flush(&self) -> OTelSdkResult {
        // spans are mapped synchronously in on_end
        Ok(())
    }

    fn shutdown_with_timeout(&self, _timeout: Duration) -> OTelSdkResult {
        self.shutdown().map_err(Into::into)
    }
}
