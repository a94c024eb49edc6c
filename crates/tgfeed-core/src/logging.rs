use tracing_subscriber::{fmt, EnvFilter};

use crate::{config::AppEnv, errors::Error, Result};

/// Initialize tracing for the service.
///
/// Default: info for our crates and dependencies. Can be overridden with `RUST_LOG`.
/// ANSI colours are off in production.
pub fn init(service_name: &str, app_env: AppEnv) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "info,tgfeed=info,tgfeed_core=info,tgfeed_telegram=info,tgfeed_http=info,{service_name}=info"
        ))
    });

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(!app_env.is_production())
        .try_init()
        .map_err(|e| Error::Config(format!("failed to initialize logging: {e}")))
}
