//! Bootstrap utilities for photolink binaries.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{LOG_ENV_VAR, LOG_FORMAT_ENV_VAR};

/// Initialize tracing with the PHOTOLINK_LOG environment variable.
///
/// Defaults to "info" level if PHOTOLINK_LOG is not set. Set
/// PHOTOLINK_LOG_FORMAT=json for one JSON object per line.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = std::env::var(LOG_FORMAT_ENV_VAR)
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Read `--config <path>` (or `--config=<path>`) from the process arguments.
pub fn parse_config_path() -> Option<String> {
    config_path_from(std::env::args().skip(1))
}

fn config_path_from<I>(args: I) -> Option<String>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        if arg == "--config" || arg == "-c" {
            return args.next();
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(path.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_config_path_forms() {
        assert_eq!(
            config_path_from(args(&["--config", "/etc/photolink.yaml"])),
            Some("/etc/photolink.yaml".to_string())
        );
        assert_eq!(
            config_path_from(args(&["--verbose", "--config=local.yaml"])),
            Some("local.yaml".to_string())
        );
        assert_eq!(config_path_from(args(&["-c", "x.yaml"])), Some("x.yaml".to_string()));
        assert_eq!(config_path_from(args(&["--config"])), None);
        assert_eq!(config_path_from(args(&[])), None);
    }
}
