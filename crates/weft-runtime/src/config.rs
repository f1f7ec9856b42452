//! Runtime configuration
//!
//! Builder-style config with validation, `WEFT_*` environment overrides,
//! and command-line consumption: `apply_args` strips the options it
//! recognizes (`--numCores N`, `--maxNumCores N`, `--stackSize N`) and
//! leaves everything else for the application's own parser.

use std::time::Duration;

use weft_core::constants::{DEFAULT_STACK_SIZE, MAX_CORES};
use weft_core::env::env_get_opt;
use weft_core::error::{RuntimeError, RuntimeResult};

/// Configuration for the runtime
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Initial number of active cores (default: hardware concurrency).
    pub num_cores: usize,

    /// Upper bound on the active core set (default: `num_cores`).
    pub max_num_cores: usize,

    /// Per-uthread stack size in bytes (default 1 MiB).
    pub stack_size: usize,

    /// Estimator: average occupied slots per core above which to ramp up.
    pub load_factor_threshold: f64,

    /// Estimator: how far utilization must fall below the recorded
    /// high-water mark before ramping down.
    pub idle_core_fraction_hysteresis: f64,

    /// Estimator: slot fill fraction above which ramp-down is vetoed.
    pub slot_occupancy_threshold: f64,

    /// Dispatcher: a runnable hit within this many examined candidates
    /// triggers a ramp-up attempt.
    pub core_increase_threshold: usize,

    /// Cadence of the load monitor thread.
    pub estimation_interval: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        let num_cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
            .min(MAX_CORES);

        Self {
            num_cores: num_cpus,
            max_num_cores: num_cpus,
            stack_size: DEFAULT_STACK_SIZE,
            load_factor_threshold: 1.0,
            idle_core_fraction_hysteresis: 0.2,
            slot_occupancy_threshold: 0.5,
            core_increase_threshold: 3,
            estimation_interval: Duration::from_millis(50),
        }
    }
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults with `WEFT_NUM_CORES` / `WEFT_MAX_NUM_CORES` /
    /// `WEFT_STACK_SIZE` overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(n) = env_get_opt("WEFT_NUM_CORES") {
            config.num_cores = n;
            config.max_num_cores = config.max_num_cores.max(n);
        }
        if let Some(n) = env_get_opt("WEFT_MAX_NUM_CORES") {
            config.max_num_cores = n;
        }
        if let Some(n) = env_get_opt("WEFT_STACK_SIZE") {
            config.stack_size = n;
        }
        config
    }

    pub fn num_cores(mut self, n: usize) -> Self {
        self.num_cores = n;
        if self.max_num_cores < n {
            self.max_num_cores = n;
        }
        self
    }

    pub fn max_num_cores(mut self, n: usize) -> Self {
        self.max_num_cores = n;
        self
    }

    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = bytes;
        self
    }

    pub fn estimation_interval(mut self, interval: Duration) -> Self {
        self.estimation_interval = interval;
        self
    }

    /// Consume recognized command-line options in place.
    ///
    /// Unrecognized arguments are left untouched for the caller.
    pub fn apply_args(&mut self, args: &mut Vec<String>) -> RuntimeResult<()> {
        let mut i = 0;
        while i < args.len() {
            let (field, name): (&mut usize, _) = match args[i].as_str() {
                "--numCores" => (&mut self.num_cores, "--numCores"),
                "--maxNumCores" => (&mut self.max_num_cores, "--maxNumCores"),
                "--stackSize" => (&mut self.stack_size, "--stackSize"),
                _ => {
                    i += 1;
                    continue;
                }
            };
            let value = args
                .get(i + 1)
                .and_then(|v| v.parse::<usize>().ok())
                .ok_or(RuntimeError::InvalidConfig("missing or bad option value"))?;
            *field = value;
            if name == "--numCores" && self.max_num_cores < value {
                self.max_num_cores = value;
            }
            args.drain(i..i + 2);
        }
        Ok(())
    }

    pub fn validate(&self) -> RuntimeResult<()> {
        if self.num_cores == 0 {
            return Err(RuntimeError::InvalidConfig("numCores must be at least 1"));
        }
        if self.max_num_cores < self.num_cores {
            return Err(RuntimeError::InvalidConfig(
                "maxNumCores must be >= numCores",
            ));
        }
        if self.max_num_cores > MAX_CORES {
            return Err(RuntimeError::InvalidConfig("maxNumCores exceeds registry cap"));
        }
        if self.stack_size < 16 * 1024 {
            return Err(RuntimeError::InvalidConfig("stackSize too small"));
        }
        if self.estimation_interval.is_zero() {
            return Err(RuntimeError::InvalidConfig(
                "estimation interval must be nonzero",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_apply_args_consumes_recognized() {
        let mut config = RuntimeConfig::default();
        let mut argv = args(&[
            "prog",
            "--numCores",
            "2",
            "--verbose",
            "--maxNumCores",
            "4",
            "--stackSize",
            "65536",
            "positional",
        ]);
        config.apply_args(&mut argv).unwrap();

        assert_eq!(config.num_cores, 2);
        assert_eq!(config.max_num_cores, 4);
        assert_eq!(config.stack_size, 65536);
        // Unrecognized arguments stay, in order.
        assert_eq!(argv, args(&["prog", "--verbose", "positional"]));
    }

    #[test]
    fn test_apply_args_bad_value() {
        let mut config = RuntimeConfig::default();
        let mut argv = args(&["--numCores", "lots"]);
        assert!(config.apply_args(&mut argv).is_err());
    }

    #[test]
    fn test_num_cores_raises_cap() {
        let config = RuntimeConfig::default().max_num_cores(1).num_cores(3);
        assert_eq!(config.max_num_cores, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_configs() {
        assert!(RuntimeConfig::default().num_cores(0).validate().is_err());
        assert!(RuntimeConfig::default()
            .stack_size(1024)
            .validate()
            .is_err());

        let mut config = RuntimeConfig::default().num_cores(2);
        config.max_num_cores = 1;
        assert!(config.validate().is_err());

        config.max_num_cores = MAX_CORES + 1;
        assert!(config.validate().is_err());
    }
}
