//! Environment variable utilities
//!
//! ```ignore
//! use uvbridge_core::env::{env_get, env_get_bool};
//!
//! let max_anchors: usize = env_get("UVB_MAX_ANCHORS", 1 << 20);
//! let strict: bool = env_get_bool("UVB_STRICT_SHAPES", false);
//! ```

use std::str::FromStr;

/// Get environment variable parsed as type T, or return default.
///
/// Unparseable values fall back to the default.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Get environment variable as boolean
///
/// "1", "true", "yes", "on" (case-insensitive) are true, anything else set
/// is false, unset returns the default.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(val.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

/// `Some(T)` if set and parseable.
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

#[inline]
pub fn env_is_set(key: &str) -> bool {
    std::env::var_os(key).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_get_default() {
        let val: usize = env_get("__UVB_TEST_UNSET__", 42);
        assert_eq!(val, 42);
        assert!(!env_is_set("__UVB_TEST_UNSET__"));
    }

    #[test]
    fn test_env_get_with_set_var() {
        std::env::set_var("__UVB_TEST_NUM__", " 123 ");
        let val: usize = env_get("__UVB_TEST_NUM__", 0);
        assert_eq!(val, 123);
        std::env::remove_var("__UVB_TEST_NUM__");
    }

    #[test]
    fn test_env_get_invalid_parse() {
        std::env::set_var("__UVB_TEST_INVALID__", "not_a_number");
        let val: u64 = env_get("__UVB_TEST_INVALID__", 99);
        assert_eq!(val, 99);
        let opt: Option<u64> = env_get_opt("__UVB_TEST_INVALID__");
        assert!(opt.is_none());
        std::env::remove_var("__UVB_TEST_INVALID__");
    }

    #[test]
    fn test_env_get_bool_variants() {
        std::env::set_var("__UVB_TEST_BOOL__", "YES");
        assert!(env_get_bool("__UVB_TEST_BOOL__", false));

        std::env::set_var("__UVB_TEST_BOOL__", "0");
        assert!(!env_get_bool("__UVB_TEST_BOOL__", true));

        std::env::remove_var("__UVB_TEST_BOOL__");
        assert!(env_get_bool("__UVB_TEST_BOOL__", true));
    }
}
