//! Logging context and subscriber setup
//!
//! The engine holds no global logger. Every editor, session and change log
//! is built with a [`LogContext`] and enters its span for each operation, so
//! all events carry the rule and target they belong to.

use tracing::Span;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Span handed to engine components at construction
#[derive(Debug, Clone)]
pub struct LogContext {
    span: Span,
}

impl LogContext {
    pub fn new(span: Span) -> Self {
        Self { span }
    }

    /// Context for one rule acting on one target.
    pub fn for_rule(rule: u32, target: &str) -> Self {
        Self {
            span: tracing::info_span!("rule", rule, target = %target),
        }
    }

    /// Context that records nothing.
    pub fn disabled() -> Self {
        Self { span: Span::none() }
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}

impl Default for LogContext {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Initialize a tracing subscriber for binaries embedding the engine.
///
/// Honors `RUST_LOG`, defaulting to "info".
pub fn init() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_file(true)
        .with_line_number(true)
        .compact();

    let filter_layer = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}
