use std::str::FromStr;

use crate::error::CoreError;
use crate::sizing::{clamp_pool_size, host_parallelism_hint, pool_size_for_hint};

/// Default broadcast capacity for dispatch events.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Worker pool configuration loaded from environment variables.
///
/// Every field is optional in the environment; unset variables fall back
/// to the host-derived defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Explicit pool size. Takes precedence over `parallelism_hint`.
    pub pool_size: Option<usize>,
    /// Parallelism hint used to derive the pool size. `None` reads the host.
    pub parallelism_hint: Option<usize>,
    /// Maximum pending queue depth. `None` means unbounded.
    pub max_pending: Option<usize>,
    /// Capacity of the dispatch event broadcast channel.
    pub event_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_size: None,
            parallelism_hint: None,
            max_pending: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl PoolConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                        | Default                  |
    /// |--------------------------------|--------------------------|
    /// | `PALETTEPOOL_POOL_SIZE`        | derived from the hint    |
    /// | `PALETTEPOOL_PARALLELISM_HINT` | host parallelism, or `4` |
    /// | `PALETTEPOOL_MAX_PENDING`      | unbounded                |
    /// | `PALETTEPOOL_EVENT_CAPACITY`   | `256`                    |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let pool_size = parse_optional::<usize>(&lookup, "PALETTEPOOL_POOL_SIZE")?;
        let parallelism_hint = parse_optional::<usize>(&lookup, "PALETTEPOOL_PARALLELISM_HINT")?;
        let max_pending = parse_optional::<usize>(&lookup, "PALETTEPOOL_MAX_PENDING")?;
        let event_capacity = parse_optional::<usize>(&lookup, "PALETTEPOOL_EVENT_CAPACITY")?
            .unwrap_or(DEFAULT_EVENT_CAPACITY);

        let config = Self {
            pool_size,
            parallelism_hint,
            max_pending,
            event_capacity,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check field combinations that parse fine but cannot be used.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.pool_size == Some(0) {
            return Err(CoreError::Validation(
                "PALETTEPOOL_POOL_SIZE must be at least 1".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(CoreError::Validation(
                "PALETTEPOOL_EVENT_CAPACITY must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve the number of workers to create.
    ///
    /// An explicit size wins and is clamped; otherwise the size is derived
    /// from the configured hint or, failing that, the host's parallelism.
    pub fn resolved_pool_size(&self) -> usize {
        match self.pool_size {
            Some(size) => clamp_pool_size(size),
            None => {
                pool_size_for_hint(self.parallelism_hint.unwrap_or_else(host_parallelism_hint))
            }
        }
    }

    /// Builder-style override of the pool size.
    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = Some(size);
        self
    }

    /// Builder-style override of the pending queue bound.
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = Some(max_pending);
        self
    }
}

fn parse_optional<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, CoreError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| CoreError::Config(format!("{key}={raw:?} is invalid: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::sizing::MAX_POOL_SIZE;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = PoolConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, PoolConfig::default());
    }

    #[test]
    fn parses_all_fields() {
        let config = PoolConfig::from_lookup(lookup_from(&[
            ("PALETTEPOOL_POOL_SIZE", "6"),
            ("PALETTEPOOL_PARALLELISM_HINT", "12"),
            ("PALETTEPOOL_MAX_PENDING", "100"),
            ("PALETTEPOOL_EVENT_CAPACITY", "32"),
        ]))
        .unwrap();

        assert_eq!(config.pool_size, Some(6));
        assert_eq!(config.parallelism_hint, Some(12));
        assert_eq!(config.max_pending, Some(100));
        assert_eq!(config.event_capacity, 32);
    }

    #[test]
    fn blank_values_are_treated_as_unset() {
        let config =
            PoolConfig::from_lookup(lookup_from(&[("PALETTEPOOL_MAX_PENDING", "  ")])).unwrap();
        assert_eq!(config.max_pending, None);
    }

    #[test]
    fn malformed_value_is_a_config_error() {
        let err = PoolConfig::from_lookup(lookup_from(&[("PALETTEPOOL_POOL_SIZE", "lots")]))
            .unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
        assert!(err.to_string().contains("PALETTEPOOL_POOL_SIZE"));
    }

    #[test]
    fn zero_pool_size_is_rejected() {
        let err =
            PoolConfig::from_lookup(lookup_from(&[("PALETTEPOOL_POOL_SIZE", "0")])).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn zero_event_capacity_is_rejected() {
        let err = PoolConfig::from_lookup(lookup_from(&[("PALETTEPOOL_EVENT_CAPACITY", "0")]))
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn explicit_size_wins_over_hint() {
        let config = PoolConfig {
            pool_size: Some(3),
            parallelism_hint: Some(64),
            ..Default::default()
        };
        assert_eq!(config.resolved_pool_size(), 3);
    }

    #[test]
    fn hint_derives_size() {
        let config = PoolConfig {
            parallelism_hint: Some(8),
            ..Default::default()
        };
        assert_eq!(config.resolved_pool_size(), 6);
    }

    #[test]
    fn explicit_size_is_clamped_to_max() {
        let config = PoolConfig::default().with_pool_size(4096);
        assert_eq!(config.resolved_pool_size(), MAX_POOL_SIZE);
    }
}
