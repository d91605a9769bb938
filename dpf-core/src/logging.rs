// MIT License
// Copyright 2023--present dpf-core developers

//! Logging initialization for binaries and tests embedding the crate.
//!
//! The library itself only emits `tracing` events; nothing is printed unless
//! a subscriber is installed, either by the host application or with
//! [`init_logging`].

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ServiceConfig;
use crate::error::{Error, Result};

/// Filter used when `RUST_LOG` is not set.
fn default_directive(config: &ServiceConfig) -> String {
    format!("dpf_core={}", config.log_level)
}

/// Install a compact stderr subscriber. `RUST_LOG` takes precedence over the
/// configured level. Fails if a global subscriber is already set.
pub fn init_logging(config: &ServiceConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive(config)))
        .map_err(|e| Error::Config(format!("invalid log filter: {e}")))?;

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| Error::Config(format!("failed to install subscriber: {e}")))
}
