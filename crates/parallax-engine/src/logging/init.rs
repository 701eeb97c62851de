use std::sync::OnceLock;

/// Filter used when neither the config nor `RUST_LOG` names one. wgpu and naga
/// stay at warn since their info output floods every pipeline build.
pub const DEFAULT_FILTER: &str = "info,wgpu_core=warn,wgpu_hal=warn,naga=warn";

/// Logger setup for hosts.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// `env_logger` directives, e.g. `"parallax_stereo=debug,wgpu_core=warn"`.
    /// Overrides `RUST_LOG` when set.
    pub filter: Option<String>,
    pub style: env_logger::WriteStyle,
    /// Millisecond timestamps; per-frame diagnostics are hard to read without them.
    pub timestamps: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: None,
            style: env_logger::WriteStyle::Auto,
            timestamps: true,
        }
    }
}

static FILTER: OnceLock<String> = OnceLock::new();

/// Installs the global logger on first call and returns the filter in effect.
/// Later calls change nothing.
pub fn init_logging(config: LoggingConfig) -> &'static str {
    FILTER.get_or_init(|| {
        let filter = config
            .filter
            .or_else(|| std::env::var("RUST_LOG").ok())
            .unwrap_or_else(|| DEFAULT_FILTER.to_owned());

        let mut builder = env_logger::Builder::new();
        builder.parse_filters(&filter).write_style(config.style);
        if config.timestamps {
            builder.format_timestamp_millis();
        } else {
            builder.format_timestamp(None);
        }
        // A test harness may own the logger already.
        if builder.try_init().is_ok() {
            log::debug!("logger installed with {filter:?}");
        }
        filter
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_call_keeps_first_filter() {
        let first = init_logging(LoggingConfig {
            filter: Some("warn".into()),
            ..LoggingConfig::default()
        });
        let second = init_logging(LoggingConfig {
            filter: Some("trace".into()),
            ..LoggingConfig::default()
        });
        assert_eq!(first, second);
    }
}
