//! Mapper configuration.
use std::{env, str::FromStr, time::Duration};

/// Maximum time in milliseconds a span waits for its parent to be forwarded.
/// `0` keeps waiting spans forever.
pub(crate) const OTEL_CORRELATION_MAX_TRACE_DURATION: &str = "OTEL_CORRELATION_MAX_TRACE_DURATION";
/// Whether spans finishing before their parent is known are parked (`true`)
/// or dropped (`false`).
pub(crate) const OTEL_CORRELATION_PARK_UNMAPPED_SPANS: &str =
    "OTEL_CORRELATION_PARK_UNMAPPED_SPANS";
/// Default for parking spans.
pub(crate) const OTEL_CORRELATION_PARK_UNMAPPED_SPANS_DEFAULT: bool = true;

/// Mapper configuration.
/// Use [`MapperConfigBuilder`] to configure your own instance of [`MapperConfig`].
#[derive(Clone, Debug)]
pub struct MapperConfig {
    /// The maximum time to keep spans that cannot be mapped to a primary trace
    /// yet. If the parent of a span is not forwarded within this period, the
    /// span is discarded. `None` keeps spans until their parent arrives.
    pub(crate) max_trace_duration: Option<Duration>,

    /// Park spans finishing before their parent is known. When disabled such
    /// spans are dropped right away.
    pub(crate) park_unmapped_spans: bool,
}

impl MapperConfig {
    /// Create a new [`MapperConfigBuilder`].
    pub fn builder() -> MapperConfigBuilder {
        MapperConfigBuilder::default()
    }

    /// The maximum time to keep spans waiting for their parent.
    pub fn max_trace_duration(&self) -> Option<Duration> {
        self.max_trace_duration
    }

    /// Whether spans waiting for their parent are parked.
    pub fn park_unmapped_spans(&self) -> bool {
        self.park_unmapped_spans
    }
}

impl Default for MapperConfig {
    fn default() -> Self {
        MapperConfigBuilder::default().build()
    }
}

/// A builder for creating [`MapperConfig`] instances.
#[derive(Debug)]
pub struct MapperConfigBuilder {
    max_trace_duration: Option<Duration>,
    park_unmapped_spans: bool,
}

impl Default for MapperConfigBuilder {
    /// Create a new [`MapperConfigBuilder`] initialized with default values:
    /// spans are parked and never expire.
    /// The values are overridden by environment variables if set.
    /// The supported environment variables are:
    /// * `OTEL_CORRELATION_MAX_TRACE_DURATION`
    /// * `OTEL_CORRELATION_PARK_UNMAPPED_SPANS`
    fn default() -> Self {
        MapperConfigBuilder {
            max_trace_duration: None,
            park_unmapped_spans: OTEL_CORRELATION_PARK_UNMAPPED_SPANS_DEFAULT,
        }
        .init_from_env_vars()
    }
}

impl MapperConfigBuilder {
    /// Set max_trace_duration for [`MapperConfigBuilder`].
    /// Spans that cannot be mapped to a primary trace are discarded once they
    /// have waited this long for their parent. A zero duration keeps them
    /// forever.
    pub fn with_max_trace_duration(mut self, max_trace_duration: Duration) -> Self {
        self.max_trace_duration = Some(max_trace_duration);
        self
    }

    /// Set park_unmapped_spans for [`MapperConfigBuilder`].
    /// When disabled, spans finishing before their parent is known are
    /// dropped instead of waiting for it.
    pub fn with_parking(mut self, park_unmapped_spans: bool) -> Self {
        self.park_unmapped_spans = park_unmapped_spans;
        self
    }

    /// Builds a `MapperConfig`. A zero `max_trace_duration` is normalized to
    /// `None`.
    pub fn build(self) -> MapperConfig {
        MapperConfig {
            max_trace_duration: self.max_trace_duration.filter(|d| !d.is_zero()),
            park_unmapped_spans: self.park_unmapped_spans,
        }
    }

    fn init_from_env_vars(mut self) -> Self {
        if let Some(max_trace_duration) = env::var(OTEL_CORRELATION_MAX_TRACE_DURATION)
            .ok()
            .and_then(|duration| u64::from_str(&duration).ok())
        {
            self.max_trace_duration = Some(Duration::from_millis(max_trace_duration));
        }

        if let Some(park_unmapped_spans) = env::var(OTEL_CORRELATION_PARK_UNMAPPED_SPANS)
            .ok()
            .and_then(|park| bool::from_str(&park.to_ascii_lowercase()).ok())
        {
            self.park_unmapped_spans = park_unmapped_spans;
        }

        self
    }
}
