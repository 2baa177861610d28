//! Process-wide engine configuration.
//!
//! All tunables are read once from the environment on first use and cached
//! in a global `OnceLock`; there is no writable global state.

use std::sync::OnceLock;
use std::time::Duration;

/// Read-only engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Worker count used when a caller passes 0 threads.
    /// From `HPTT_NUM_THREADS`, falling back to the rayon pool size.
    pub default_threads: usize,
    /// Wall-clock budget for measured plan selection.
    /// From `HPTT_TIMING_BUDGET_SECONDS`, default 1 second.
    pub timing_budget: Duration,
    /// Diagnostic level. 0 is silent; >= 1 prints the chosen plan to stderr.
    /// From `HPTT_VERBOSE`.
    pub verbose: u32,
}

static CONFIG: OnceLock<EngineConfig> = OnceLock::new();

/// Get the global engine configuration, reading the environment on first call.
pub fn engine_config() -> &'static EngineConfig {
    CONFIG.get_or_init(|| EngineConfig {
        default_threads: env_parse("HPTT_NUM_THREADS")
            .filter(|&n| n > 0)
            .unwrap_or_else(rayon::current_num_threads),
        timing_budget: Duration::from_secs_f64(
            env_parse::<f64>("HPTT_TIMING_BUDGET_SECONDS")
                .filter(|s| s.is_finite() && *s > 0.0)
                .unwrap_or(1.0),
        ),
        verbose: env_parse("HPTT_VERBOSE").unwrap_or(0),
    })
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_are_sane() {
        let cfg = engine_config();
        assert!(cfg.default_threads >= 1);
        assert!(cfg.timing_budget > Duration::ZERO);
    }

    #[test]
    fn test_env_parse_rejects_garbage() {
        std::env::set_var("STRIDED_TRANSPOSE_TEST_GARBAGE", "not-a-number");
        assert_eq!(env_parse::<usize>("STRIDED_TRANSPOSE_TEST_GARBAGE"), None);
        std::env::set_var("STRIDED_TRANSPOSE_TEST_NUM", " 4 ");
        assert_eq!(env_parse::<usize>("STRIDED_TRANSPOSE_TEST_NUM"), Some(4));
    }
}
