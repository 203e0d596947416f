//! Logging initialisation
//!
//! `RUST_LOG` selects the filter (default `info`); `CLIP_LOG_FORMAT=json`
//! switches to JSON lines.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{ClipError, ClipResult};

/// Install the global subscriber. Fails if one is already installed.
pub fn init_tracing() -> ClipResult<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("CLIP_LOG_FORMAT").is_ok_and(|v| v == "json");

    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    result.map_err(|e| ClipError::Telemetry(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_rejected() {
        // The first call may already have happened in another test thread.
        let _ = init_tracing();
        let err = init_tracing().unwrap_err();
        assert_eq!(err.error_code(), "telemetry_error");
    }
}
