//! Interpreter configuration aggregated from defaults and environment variables.
//!
//! A single struct resolved once when the interpreter is created; the
//! evaluation loop reads it without any per-operation cost.

// =============================================================================
// VM Configuration
// =============================================================================

/// Environment variable overriding [`VmConfig::recursion_limit`].
pub const ENV_RECURSION_LIMIT: &str = "REWIND_RECURSION_LIMIT";

/// Environment variable enabling [`VmConfig::echo_print`].
pub const ENV_ECHO: &str = "REWIND_ECHO";

/// Complete interpreter configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmConfig {
    /// Maximum number of live bytecode frames. Continuation replay rebuilds
    /// the captured chain on the native stack, so this also bounds resume.
    pub recursion_limit: usize,

    /// Write `print` output to stdout in addition to the output buffer.
    pub echo_print: bool,

    /// Environment variables were not consulted.
    pub ignore_environment: bool,
}

impl VmConfig {
    /// Default frame depth limit.
    pub const DEFAULT_RECURSION_LIMIT: usize = 1000;

    /// Resolve configuration from the process environment.
    pub fn from_env() -> Self {
        Self::resolve(false)
    }

    /// Resolve configuration, consulting `REWIND_*` variables unless
    /// `ignore_environment` is set.
    pub fn resolve(ignore_environment: bool) -> Self {
        if ignore_environment {
            return Self {
                ignore_environment: true,
                ..Self::default()
            };
        }

        Self {
            recursion_limit: parse_recursion_limit(std::env::var(ENV_RECURSION_LIMIT).ok().as_deref()),
            echo_print: parse_bool(std::env::var(ENV_ECHO).ok().as_deref()),
            ignore_environment: false,
        }
    }

    /// Override the recursion limit.
    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit.max(1);
        self
    }

    /// Override stdout echo of `print`.
    pub fn with_echo_print(mut self, echo: bool) -> Self {
        self.echo_print = echo;
        self
    }
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            recursion_limit: Self::DEFAULT_RECURSION_LIMIT,
            echo_print: false,
            ignore_environment: false,
        }
    }
}

/// A variable is truthy when set to anything but empty or `0`.
#[inline]
fn parse_bool(value: Option<&str>) -> bool {
    value.map(|v| !v.is_empty() && v != "0").unwrap_or(false)
}

/// Positive integer, falling back to the default on absence or garbage.
fn parse_recursion_limit(value: Option<&str>) -> usize {
    value
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|&n| n > 0)
        .unwrap_or(VmConfig::DEFAULT_RECURSION_LIMIT)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = VmConfig::default();
        assert_eq!(config.recursion_limit, 1000);
        assert!(!config.echo_print);
        assert!(!config.ignore_environment);
    }

    #[test]
    fn test_ignore_environment_uses_defaults() {
        let config = VmConfig::resolve(true);
        assert!(config.ignore_environment);
        assert_eq!(config.recursion_limit, VmConfig::DEFAULT_RECURSION_LIMIT);
    }

    #[test]
    fn test_parse_bool() {
        assert!(!parse_bool(None));
        assert!(!parse_bool(Some("")));
        assert!(!parse_bool(Some("0")));
        assert!(parse_bool(Some("1")));
        assert!(parse_bool(Some("yes")));
    }

    #[test]
    fn test_parse_recursion_limit() {
        assert_eq!(parse_recursion_limit(None), 1000);
        assert_eq!(parse_recursion_limit(Some("250")), 250);
        assert_eq!(parse_recursion_limit(Some(" 64 ")), 64);
        assert_eq!(parse_recursion_limit(Some("0")), 1000);
        assert_eq!(parse_recursion_limit(Some("lots")), 1000);
    }

    #[test]
    fn test_builder_overrides() {
        let config = VmConfig::default()
            .with_recursion_limit(0)
            .with_echo_print(true);
        assert_eq!(config.recursion_limit, 1);
        assert!(config.echo_print);
    }
}
