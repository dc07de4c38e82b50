// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
pub mod config;

pub use config::{AppCfg, ConfigError, LogCfg, RenderCfg, StalePolicyCfg, WindowCfg};

/// Install the global fmt subscriber. `RUST_LOG` wins over `fallback_filter`.
/// Calling this more than once is harmless.
pub fn init_tracing(fallback_filter: &str) {
    use tracing_subscriber::{fmt, EnvFilter};
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init();
}
