use tracing_subscriber::{fmt, EnvFilter};

use crate::{config::LogFormat, Error, Result};

/// Initialize logging/tracing for the relay.
///
/// Default: info for our crates. Can be overridden with `RUST_LOG`.
/// `LogFormat::Json` emits one JSON object per line for log shippers.
pub fn init(service_name: &str, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "info,ghrelay=info,ghrelay_core=info,ghrelay_github=info,ghrelay_telegram=info,{service_name}=info"
        ))
    });

    let res = match format {
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(false)
            .try_init(),
        LogFormat::Pretty => fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_ansi(true)
            .try_init(),
    };

    res.map_err(|e| Error::Config(format!("failed to install tracing subscriber: {e}")))
}
