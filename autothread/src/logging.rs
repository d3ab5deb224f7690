// Logging for autothread
//
// Structured logging for the worker pool, built on the `tracing` ecosystem.
// Pools, workers and the registry emit records with stable field names
// (`pool`, `worker`, `task`, `workload`, ...) so scaling decisions can be
// followed in a log aggregator.
//
// # Usage Examples
//
// ```rust
// use autothread::logging;
//
// // INFO level, human-readable console output
// logging::init_default();
//
// // Or pick a preset
// logging::init_development();
// logging::init_production();
// ```
//
// ## File Logging
//
// ```rust
// use autothread::logging::{self, LogConfig};
//
// logging::init_with_file(LogConfig::default(), "/var/log/autothread/pool.log");
// ```
//
// ## Log Macros
//
// ```rust
// use autothread::{log_scaling, pool_span};
//
// let span = pool_span!("3f1c...", pool_size = 4);
// let _guard = span.enter();
// log_scaling!(true, "grow", worker = 5u64, pool_size = 4usize);
// ```

use std::io;
use std::sync::Once;
use tracing::{Level, Subscriber};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Configuration for the logging subscriber.
///
/// # Examples
///
/// ```rust
/// use autothread::logging::LogConfig;
/// use tracing::Level;
///
/// let config = LogConfig {
///     level: Level::DEBUG,
///     target_filters: Some("autothread::pool=trace".to_string()),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: Level,
    /// Whether to use JSON format for logs
    pub json_format: bool,
    /// Whether to include file and line information
    pub show_file_line: bool,
    /// Whether to include thread name/id
    pub show_thread_info: bool,
    /// Whether to include timestamps
    pub show_time: bool,
    /// Target filter expressions (format: "target=level,target2=level2,...")
    pub target_filters: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_format: false,
            show_file_line: true,
            show_thread_info: true,
            show_time: true,
            target_filters: None,
        }
    }
}

static INIT: Once = Once::new();

fn env_filter(config: &LogConfig) -> EnvFilter {
    let mut filter = EnvFilter::from_default_env().add_directive(config.level.into());
    if let Some(filters) = &config.target_filters {
        for directive in filters.split(',') {
            if let Ok(directive) = directive.trim().parse() {
                filter = filter.add_directive(directive);
            }
        }
    }
    filter
}

/// Initialize the global subscriber. Only the first call takes effect.
pub fn init(config: LogConfig) {
    INIT.call_once(|| {
        let registry = tracing_subscriber::registry().with(env_filter(&config));

        let subscriber: Box<dyn Subscriber + Send + Sync> = if config.json_format {
            Box::new(registry.with(fmt::layer().json().flatten_event(true)))
        } else if config.show_time {
            Box::new(registry.with(console_layer(&config)))
        } else {
            Box::new(registry.with(console_layer(&config).without_time()))
        };

        set_global_subscriber(subscriber);
    });
}

fn console_layer<S>(config: &LogConfig) -> fmt::Layer<S> {
    fmt::layer()
        .with_ansi(atty::is(atty::Stream::Stdout))
        .with_file(config.show_file_line)
        .with_line_number(config.show_file_line)
        .with_thread_names(config.show_thread_info)
        .with_thread_ids(config.show_thread_info)
}

fn set_global_subscriber<S>(subscriber: S)
where
    S: Subscriber + Send + Sync + 'static,
{
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Error setting global tracing subscriber: {}", err);
    }
}

/// Open `path` in append mode for use as a log writer.
pub fn file_writer(path: &str) -> io::Result<Box<dyn io::Write + Send + Sync + 'static>> {
    use std::fs::OpenOptions;

    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(Box::new(file))
}

/// Initialize logging to both the console and `log_file`.
///
/// The file is checked up front so a bad path is reported to the caller
/// instead of silently falling back to stderr.
pub fn init_with_file(config: LogConfig, log_file: &str) -> io::Result<()> {
    file_writer(log_file)?;

    INIT.call_once(|| {
        let log_file_path = log_file.to_string();
        let file_layer = fmt::layer()
            .with_ansi(false)
            .with_writer(move || match file_writer(&log_file_path) {
                Ok(writer) => writer,
                Err(_) => Box::new(io::stderr()),
            })
            .with_file(true)
            .with_line_number(true)
            .with_thread_names(true)
            .with_thread_ids(true);

        let subscriber = tracing_subscriber::registry()
            .with(env_filter(&config))
            .with(console_layer(&config))
            .with(file_layer);

        set_global_subscriber(subscriber);
    });

    Ok(())
}

/// INFO level, human-readable console output.
pub fn init_default() {
    init(LogConfig::default());
}

/// DEBUG everywhere, TRACE for pool scaling decisions.
pub fn init_development() {
    init(LogConfig {
        level: Level::DEBUG,
        target_filters: Some("autothread=debug,autothread::pool=trace".to_string()),
        ..Default::default()
    });
}

/// JSON output for log aggregators, no file/line information.
pub fn init_production() {
    init(LogConfig {
        level: Level::INFO,
        json_format: true,
        show_file_line: false,
        ..Default::default()
    });
}

/// Warnings and errors only, compact output for test runs.
pub fn init_test() {
    init(LogConfig {
        level: Level::WARN,
        show_thread_info: false,
        show_time: false,
        ..Default::default()
    });
}

/// Span covering the operations of one pool instance.
///
/// ```rust
/// use autothread::pool_span;
///
/// let span = pool_span!("pool-id");
/// let span = pool_span!("pool-id", pool_size = 3);
/// ```
#[macro_export]
macro_rules! pool_span {
    ($pool_id:expr) => {
        tracing::info_span!("pool", pool = %$pool_id)
    };
    ($pool_id:expr, $($fields:tt)*) => {
        tracing::info_span!("pool", pool = %$pool_id, $($fields)*)
    };
}

/// Log a scaling decision (grow, reuse, shrink, retain).
///
/// The first argument is the pool's `inspect` flag: inspected pools log
/// decisions at INFO, others at TRACE.
#[macro_export]
macro_rules! log_scaling {
    ($inspect:expr, $decision:expr) => {
        if $inspect {
            tracing::info!(decision = $decision, "scaling decision");
        } else {
            tracing::trace!(decision = $decision, "scaling decision");
        }
    };
    ($inspect:expr, $decision:expr, $($fields:tt)*) => {
        if $inspect {
            tracing::info!(decision = $decision, $($fields)*, "scaling decision");
        } else {
            tracing::trace!(decision = $decision, $($fields)*, "scaling decision");
        }
    };
}

/// Log a task lifecycle event (registered, dispatched, finalized, ...).
#[macro_export]
macro_rules! log_task {
    ($task_id:expr, $event:expr) => {
        tracing::debug!(task = $task_id, event = $event);
    };
    ($task_id:expr, $event:expr, $($fields:tt)*) => {
        tracing::debug!(task = $task_id, event = $event, $($fields)*);
    };
}

/// Log an error with optional context fields.
#[macro_export]
macro_rules! log_error {
    ($error:expr) => {
        tracing::error!(error = %$error);
    };
    ($error:expr, $($fields:tt)*) => {
        tracing::error!(error = %$error, $($fields)*);
    };
}

pub use tracing::{debug, error, info, trace, warn};
