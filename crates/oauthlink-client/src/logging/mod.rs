//! Tracing setup for hosts embedding the coordinator
//!
//! - Console: compact format
//! - File: daily rotation under `LoggingConfig::log_dir`, when set

use oauthlink_core::LoggingConfig;
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const CRATE_DIRECTIVES: [&str; 3] = [
    "oauthlink_core=debug",
    "oauthlink_client=debug",
    "oauthlink_storage=debug",
];

/// Build the filter: `RUST_LOG` takes precedence, otherwise `config.level`
/// with our crates at debug.
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        CRATE_DIRECTIVES
            .iter()
            .filter_map(|directive| directive.parse().ok())
            .fold(EnvFilter::new(&config.level), |filter, directive| {
                filter.add_directive(directive)
            })
    })
}

/// Install the global subscriber.
///
/// The returned guard flushes the file writer; keep it alive for the life of
/// the program. `None` when no file layer was installed.
pub fn init_tracing(config: &LoggingConfig) -> Option<WorkerGuard> {
    let mut file_error = None;
    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = std::fs::create_dir_all(dir)
                .map_err(|e| e.to_string())
                .and_then(|_| {
                    RollingFileAppender::builder()
                        .rotation(Rotation::DAILY)
                        .filename_prefix(&config.file_prefix)
                        .filename_suffix("log")
                        .build(dir)
                        .map_err(|e| e.to_string())
                });
            match appender {
                Ok(appender) => {
                    let (writer, guard) = tracing_appender::non_blocking(appender);
                    let layer = fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false)
                        .with_thread_ids(true)
                        .with_line_number(true)
                        .with_file(true)
                        .with_target(true);
                    (Some(layer), Some(guard))
                }
                Err(e) => {
                    file_error = Some(e);
                    (None, None)
                }
            }
        }
        None => (None, None),
    };

    let console_layer = fmt::layer()
        .with_ansi(true)
        .compact()
        .with_line_number(false)
        .with_file(false)
        .with_target(true);

    let installed = tracing_subscriber::registry()
        .with(env_filter(config))
        .with(console_layer)
        .with(file_layer)
        .try_init();

    if let Err(e) = installed {
        warn!(error = %e, "[Logging] Global subscriber already installed");
    }
    if let Some(e) = file_error {
        warn!(error = %e, "[Logging] File logging disabled");
    }

    guard
}
