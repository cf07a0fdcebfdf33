//! Multi-node JSONL logging for constellation routing simulations
//!
//! Every satellite and ground station of a simulation runs in the same
//! process, so log lines need to say which node produced them.
//!
//! # Features
//!
//! - **JSONL Output**: Structured JSON lines for log aggregation (default)
//! - **Node Context**: [`NodeContextGuard`] scopes the node identity of a thread
//! - **File Rotation**: Daily/hourly rotation via tracing-appender
//! - **Captured Output**: [`MemoryWriter`] for tests and scenario reports
//!
//! # Quick Start
//!
//! ```ignore
//! use satnet_logging::{LogConfig, SatnetSubscriberBuilder};
//!
//! // JSONL to console
//! let _guard = SatnetSubscriberBuilder::new().init();
//!
//! // Human-readable output while developing
//! let _guard = SatnetSubscriberBuilder::new()
//!     .with_config(LogConfig::development())
//!     .init();
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod layers;

pub use config::{ConsoleConfig, FileConfig, FilterConfig, JsonlConfig, LogConfig, RotationStrategy};
pub use context::{NodeContextData, NodeContextGuard};
pub use error::{LoggingError, LoggingResult};
pub use layers::{MemoryWriter, NodeContextLayer, jsonl_file_layer};

use std::fs::{self, File};

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Builder for configuring and installing the global subscriber
///
/// Console output is JSONL unless the configuration asks for pretty output.
pub struct SatnetSubscriberBuilder {
    config: LogConfig,
}

impl SatnetSubscriberBuilder {
    pub fn new() -> Self {
        Self {
            config: LogConfig::default(),
        }
    }

    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the default log level
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.default_level = level.into();
        self
    }

    pub fn with_console(mut self, enabled: bool) -> Self {
        self.config.console.enabled = enabled;
        self
    }

    pub fn with_file_output(mut self, config: FileConfig) -> Self {
        self.config.file = Some(config);
        self
    }

    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// Install the subscriber, reporting failures on stderr.
    ///
    /// The returned guard flushes file output when dropped; keep it alive
    /// for the whole run.
    pub fn init(self) -> Option<WorkerGuard> {
        match self.try_init() {
            Ok(guard) => guard,
            Err(e) => {
                eprintln!("Warning: logging not initialized: {}", e);
                None
            }
        }
    }

    /// Install the subscriber
    pub fn try_init(self) -> LoggingResult<Option<WorkerGuard>> {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.config.directives()));

        let mut layers: Vec<BoxedLayer> = vec![NodeContextLayer::new().boxed()];
        let mut guard = None;

        if self.config.console.enabled {
            layers.push(self.console_layer());
        }
        if let Some(file) = &self.config.file {
            let (writer, file_guard) = file_writer(file)?;
            guard = Some(file_guard);
            layers.push(
                jsonl_file_layer(
                    writer,
                    self.config.jsonl.include_location,
                    self.config.jsonl.include_thread_info,
                )
                .boxed(),
            );
        }

        Registry::default()
            .with(layers)
            .with(env_filter)
            .try_init()
            .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;
        Ok(guard)
    }

    fn console_layer(&self) -> BoxedLayer {
        if self.config.console.pretty {
            return tracing_subscriber::fmt::layer()
                .with_ansi(self.config.console.ansi)
                .with_target(true)
                .boxed();
        }
        let jsonl = &self.config.jsonl;
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(jsonl.include_spans)
            .flatten_event(jsonl.flatten_events)
            .with_file(jsonl.include_location)
            .with_line_number(jsonl.include_location)
            .with_thread_ids(jsonl.include_thread_info)
            .boxed()
    }
}

impl Default for SatnetSubscriberBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Non-blocking writer for file output; `Never` truncates a single file
fn file_writer(config: &FileConfig) -> LoggingResult<(NonBlocking, WorkerGuard)> {
    fs::create_dir_all(&config.directory).map_err(|source| LoggingError::Io {
        path: config.directory.clone(),
        source,
    })?;

    let rotation = match config.rotation {
        RotationStrategy::Never => {
            let path = config.directory.join(format!("{}.log", config.prefix));
            let file = File::create(&path).map_err(|source| LoggingError::Io { path, source })?;
            return Ok(tracing_appender::non_blocking(file));
        }
        RotationStrategy::Daily => Rotation::DAILY,
        RotationStrategy::Hourly => Rotation::HOURLY,
    };

    let mut builder = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(config.prefix.as_str());
    if let Some(max) = config.max_files {
        builder = builder.max_log_files(max);
    }
    let appender = builder
        .build(&config.directory)
        .map_err(|e| LoggingError::Appender(e.to_string()))?;
    Ok(tracing_appender::non_blocking(appender))
}

/// JSONL to console at `info`
pub fn init_default() -> Option<WorkerGuard> {
    SatnetSubscriberBuilder::new().init()
}

/// Verbose, pretty console output
pub fn init_development() -> Option<WorkerGuard> {
    SatnetSubscriberBuilder::new()
        .with_config(LogConfig::development())
        .init()
}

/// Warnings only; silently keeps an already installed subscriber
pub fn init_testing() {
    let _ = SatnetSubscriberBuilder::new()
        .with_config(LogConfig::testing())
        .try_init();
}
