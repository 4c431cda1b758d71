//! Tracing setup.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the tracing subscriber. The base level is `warn`, moved up or
/// down by the `-v`/`-q` counts; the `GMG_LOG` environment variable (an
/// `EnvFilter` directive) overrides everything.
pub fn init(verbose: u8, quiet: u8) {
    let level = match i16::from(verbose) - i16::from(quiet) {
        i16::MIN..=-2 => "off",
        -1 => "error",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_env("GMG_LOG")
        .unwrap_or_else(|_| EnvFilter::new(format!("gmg={level},gmg_core={level},gmg_toolchain={level},gmg_graph={level},gmg_solver={level},gmg_cli={level}")));

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}
