use evalkit_core::{AppError, AppResult};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(AppError::usage(format!(
                "invalid --log-format '{value}'; expected text|json"
            ))),
        }
    }
}

fn validate_log_level(value: &str) -> AppResult<()> {
    match value {
        "error" | "warn" | "info" | "debug" | "trace" => Ok(()),
        _ => Err(AppError::usage(format!(
            "invalid --log-level '{value}'; expected error|warn|info|debug|trace"
        ))),
    }
}

/// Installs the process-wide subscriber. Logs go to stderr so that stdout
/// carries only command output.
pub fn init(level: &str, format: LogFormat) -> AppResult<()> {
    validate_log_level(level)?;
    let filter = EnvFilter::try_new(level)
        .map_err(|e| AppError::usage(format!("invalid --log-level '{level}': {e}")))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    let installed = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| AppError::internal(format!("failed to install logger: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use evalkit_core::ErrorKind;

    #[test]
    fn parses_known_formats() {
        assert_eq!(LogFormat::parse("text").unwrap(), LogFormat::Text);
        assert_eq!(LogFormat::parse("json").unwrap(), LogFormat::Json);
        assert_eq!(LogFormat::parse("yaml").unwrap_err().kind(), ErrorKind::Usage);
    }

    #[test]
    fn rejects_unknown_level() {
        let err = validate_log_level("verbose").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert!(validate_log_level("debug").is_ok());
    }
}
