//! Environment variable utilities
//!
//! Small `env_get<T>` helpers used by logging and configuration.

use std::str::FromStr;

/// Get an environment variable as an optional parsed value.
///
/// Unset or unparseable values both come back as `None`.
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Get an environment variable parsed as `T`, or the default.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

const TRUTHY: [&str; 4] = ["1", "true", "yes", "on"];

/// Get an environment variable as a boolean.
///
/// "1", "true", "yes", "on" (any case) count as true; any other set
/// value counts as false; unset returns the default.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    let Ok(val) = std::env::var(key) else {
        return default;
    };
    let val = val.trim();
    TRUTHY.iter().any(|t| val.eq_ignore_ascii_case(t))
}
