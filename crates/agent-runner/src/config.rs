//! Runner configuration

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

pub const DEFAULT_DATA_DIR: &str = ".aos-data";
pub const DEFAULT_TOOL_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_TOOL_RETRIES: u32 = 0;
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 1_000;
pub const DEFAULT_BACKOFF_CAP_MS: u64 = 10_000;

/// Engine-wide defaults; per-action limits override the tool values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Root of the run journal
    pub data_dir: PathBuf,
    /// Timeout for one tool attempt when the action sets none
    pub tool_timeout_ms: u64,
    /// Retries after the first attempt when the action sets none
    pub tool_retries: u32,
    /// First backoff delay; doubles per attempt
    pub backoff_base_ms: u64,
    /// Upper bound on a single backoff delay
    pub backoff_cap_ms: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            tool_timeout_ms: DEFAULT_TOOL_TIMEOUT_MS,
            tool_retries: DEFAULT_TOOL_RETRIES,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            backoff_cap_ms: DEFAULT_BACKOFF_CAP_MS,
        }
    }
}

impl RunnerConfig {
    /// Read `AOS_*` variables, keeping defaults for unset or invalid values
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            data_dir: lookup("AOS_DATA_DIR")
                .filter(|raw| !raw.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            tool_timeout_ms: parse_var(&lookup, "AOS_TOOL_TIMEOUT_MS", defaults.tool_timeout_ms, |v| {
                *v > 0
            }),
            tool_retries: parse_var(&lookup, "AOS_TOOL_RETRIES", defaults.tool_retries, |_| true),
            backoff_base_ms: parse_var(&lookup, "AOS_BACKOFF_BASE_MS", defaults.backoff_base_ms, |_| {
                true
            }),
            backoff_cap_ms: parse_var(&lookup, "AOS_BACKOFF_CAP_MS", defaults.backoff_cap_ms, |_| {
                true
            }),
        }
    }

    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    /// Delay before the retry that follows `attempt`: `min(base * 2^attempt, cap)`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let delay = self
            .backoff_base_ms
            .saturating_mul(factor)
            .min(self.backoff_cap_ms);
        Duration::from_millis(delay)
    }
}

fn parse_var<T: std::str::FromStr + Copy>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
    valid: impl Fn(&T) -> bool,
) -> T {
    let Some(raw) = lookup(name) else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(value) if valid(&value) => value,
        _ => {
            warn!("Ignoring invalid {}={:?}, using default", name, raw);
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> RunnerConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RunnerConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults_when_unset() {
        assert_eq!(config_from(&[]), RunnerConfig::default());
    }

    #[test]
    fn test_reads_overrides() {
        let config = config_from(&[
            ("AOS_DATA_DIR", "/tmp/aos"),
            ("AOS_TOOL_TIMEOUT_MS", "500"),
            ("AOS_TOOL_RETRIES", "3"),
            ("AOS_BACKOFF_BASE_MS", "10"),
            ("AOS_BACKOFF_CAP_MS", "40"),
        ]);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/aos"));
        assert_eq!(config.tool_timeout_ms, 500);
        assert_eq!(config.tool_retries, 3);
        assert_eq!(config.backoff_base_ms, 10);
        assert_eq!(config.backoff_cap_ms, 40);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = config_from(&[("AOS_TOOL_TIMEOUT_MS", "0"), ("AOS_TOOL_RETRIES", "many")]);
        assert_eq!(config.tool_timeout_ms, DEFAULT_TOOL_TIMEOUT_MS);
        assert_eq!(config.tool_retries, DEFAULT_TOOL_RETRIES);
    }

    #[test]
    fn test_backoff_doubles_up_to_cap() {
        let config = RunnerConfig::default();
        assert_eq!(config.backoff(0), Duration::from_millis(1_000));
        assert_eq!(config.backoff(1), Duration::from_millis(2_000));
        assert_eq!(config.backoff(3), Duration::from_millis(8_000));
        assert_eq!(config.backoff(4), Duration::from_millis(10_000));
        assert_eq!(config.backoff(70), Duration::from_millis(10_000));
    }
}
