//! Logging infrastructure - structured tracing throughout the bridge
//!
//! Design: Uses `tracing` for structured, contextual logging with:
//! - Configurable log levels per module
//! - Zero-cost when disabled
//! - JSON or human-readable output

use once_cell::sync::OnceCell;
use std::io;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

pub use tracing::{debug, error, info, trace, warn};

/// Global logging state
static LOGGER_INITIALIZED: OnceCell<()> = OnceCell::new();

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default log level
    pub level: Level,
    /// Enable JSON format (vs human-readable)
    pub json_format: bool,
    /// Show span events (enter/exit)
    pub show_spans: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_format: false,
            show_spans: false,
        }
    }
}

impl LogConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // VESPER_BRIDGE_LOG_LEVEL: trace, debug, info, warn, error
        if let Ok(level_str) = std::env::var("VESPER_BRIDGE_LOG_LEVEL") {
            config.level = match level_str.to_lowercase().as_str() {
                "trace" => Level::TRACE,
                "debug" => Level::DEBUG,
                "info" => Level::INFO,
                "warn" => Level::WARN,
                "error" => Level::ERROR,
                _ => Level::INFO,
            };
        }

        // VESPER_BRIDGE_LOG_JSON: enable JSON format
        config.json_format = std::env::var("VESPER_BRIDGE_LOG_JSON").is_ok();

        // VESPER_BRIDGE_LOG_SPANS: show span events
        config.show_spans = std::env::var("VESPER_BRIDGE_LOG_SPANS").is_ok();

        config
    }
}

/// Initialize logging with default configuration
pub fn init() {
    init_with_config(LogConfig::from_env());
}

/// Initialize logging with custom configuration (idempotent)
pub fn init_with_config(config: LogConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "vesper_bridge={}",
                config.level.as_str().to_lowercase()
            ))
        });

        let span_events = if config.show_spans {
            FmtSpan::ENTER | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        if config.json_format {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_writer(io::stderr)
                        .with_span_events(span_events)
                        .with_target(true),
                )
                .init();
        } else {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .with_writer(io::stderr)
                        .with_span_events(span_events)
                        .with_target(true)
                        .with_thread_ids(cfg!(debug_assertions)),
                )
                .init();
        }
    });
}

/// Check if logging is initialized
pub fn is_initialized() -> bool {
    LOGGER_INITIALIZED.get().is_some()
}

// ============================================================================
// Bridge-specific logging functions
// ============================================================================

/// Log opaque handle creation
#[inline]
pub fn log_handle_created(tag: &str, owned: bool) {
    trace!(event = "handle_created", tag = tag, owned = owned, "Handle created");
}

/// Log opaque handle release
#[inline]
pub fn log_handle_released(tag: &str, destructor_invoked: bool) {
    trace!(
        event = "handle_released",
        tag = tag,
        destructor_invoked = destructor_invoked,
        "Handle released"
    );
}

/// Log successful array view negotiation
#[inline]
pub fn log_view_acquired(format: char, ndim: usize, items: usize) {
    trace!(
        event = "view_acquired",
        format = %format,
        ndim = ndim,
        items = items,
        "Array view acquired"
    );
}

/// Log array view release
#[inline]
pub fn log_view_released(items: usize) {
    trace!(event = "view_released", items = items, "Array view released");
}

/// Log failed array view negotiation
pub fn log_view_rejected(reason: &str) {
    debug!(event = "view_rejected", reason = reason, "Array view negotiation failed");
}

/// Log capability publication
pub fn log_capability_published(name: &str, version: u32, entries: usize) {
    info!(
        event = "capability_published",
        name = name,
        version = version,
        entries = entries,
        "Capability table published"
    );
}

/// Log capability import
pub fn log_capability_imported(name: &str, version: u32) {
    debug!(
        event = "capability_imported",
        name = name,
        version = version,
        "Capability table imported"
    );
}

/// Log execution lock contention (caller is about to block)
#[inline]
pub fn log_lock_contended() {
    trace!(event = "lock_contended", "Execution lock contended, blocking");
}

/// Log marshaling failure
pub fn log_marshal_error(index: Option<usize>, message: &str) {
    debug!(
        event = "marshal_error",
        index = index,
        error = message,
        "Argument marshaling failed"
    );
}

/// Log bridge initialization
pub fn log_bridge_init() {
    info!(event = "bridge_init", "Vesper bridge initializing");
}

/// Log bridge shutdown
pub fn log_bridge_shutdown(handles_drained: usize) {
    info!(
        event = "bridge_shutdown",
        handles_drained = handles_drained,
        "Vesper bridge shutting down"
    );
}
