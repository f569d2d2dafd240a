use mail_dispatch::Environment;
use tracing::{debug, info};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Install color-eyre for error reports on stderr.
///
/// Shows the file and line of each error and hides the environment section.
/// Safe to call more than once.
pub fn install_color_eyre() {
    let _ = color_eyre::config::HookBuilder::default()
        .display_location_section(true)
        .display_env_section(false)
        .install();
}

/// Initialize tracing for the given environment.
///
/// - **Production**: flattened JSON events for log aggregation, `info` by default
/// - **Development**: pretty output, `debug` by default
///
/// `RUST_LOG` overrides the default filter in both modes. An `ErrorLayer` is
/// installed so eyre reports carry the active span trace.
pub fn init_tracing(environment: &Environment) {
    let filter = env_filter(environment);

    let result = if environment.is_production() {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(false)
                    .flatten_event(true),
            )
            .with(tracing_error::ErrorLayer::default())
            .with(filter)
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_file(false)
                    .with_line_number(false)
                    .pretty(),
            )
            .with(tracing_error::ErrorLayer::default())
            .with(filter)
            .try_init()
    };

    match result {
        Ok(_) => info!(environment = ?environment, "Tracing initialized"),
        // Already installed, e.g. by another test
        Err(_) => debug!("Tracing already initialized, skipping re-initialization"),
    }
}

/// `RUST_LOG` when set, otherwise the environment's default directives.
pub fn env_filter(environment: &Environment) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if environment.is_production() {
            EnvFilter::new("info,aws_config=warn,aws_smithy_runtime=warn")
        } else {
            EnvFilter::new("debug,hyper=info,aws_smithy_runtime=info")
        }
    })
}
