use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Install a tracing subscriber for hosts embedding the engine.
///
/// The level comes from `RUST_LOG`, defaulting to `info`. Engine logs never
/// carry sensitive values in cleartext.
pub fn init() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .compact();

    let filter_layer = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}

/// Mask a sensitive value for display, keeping at most a short prefix.
pub fn redact(value: &str) -> String {
    let visible: String = if value.chars().count() > 8 {
        value.chars().take(2).collect()
    } else {
        String::new()
    };
    format!("{visible}▒▒▒▒▒")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::{info, warn};

    #[test]
    fn test_logging_init() {
        // only the first init in a process succeeds
        let _ = init();

        info!("This is an info message");
        warn!("This is a warning message");
    }

    #[test]
    fn test_redact_hides_short_values_entirely() {
        assert_eq!(redact("hunter2"), "▒▒▒▒▒");
        assert_eq!(redact("sk_live_abcdef"), "sk▒▒▒▒▒");
        assert!(!redact("sk_live_abcdef").contains("live"));
    }
}
