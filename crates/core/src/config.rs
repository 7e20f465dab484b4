//! Query engine configuration.

use crate::error::ConfigError;
use crate::ports::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::query::ContainsStrategy;

/// Similarity threshold used when none is configured.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.1;

/// Pagination configuration shared by every connection.
#[derive(Debug, Clone, PartialEq)]
pub struct PaginationConfig {
    /// Page size used when a request has no count.
    pub default_page_size: u32,
    /// Matching used by the `contains` filter operator.
    pub contains: ContainsStrategy,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_page_size: DEFAULT_PAGE_SIZE,
            contains: ContainsStrategy::Substring,
        }
    }
}

impl PaginationConfig {
    pub fn new(default_page_size: u32, contains: ContainsStrategy) -> Result<Self, ConfigError> {
        if default_page_size == 0 || default_page_size > MAX_PAGE_SIZE {
            return Err(ConfigError::InvalidDefaultPageSize {
                size: default_page_size,
                max: MAX_PAGE_SIZE,
            });
        }
        Ok(Self {
            default_page_size,
            contains,
        })
    }

    /// Build the contains strategy from its configured name
    /// (`substring` or `trigram`) and similarity threshold.
    pub fn contains_strategy(mode: &str, threshold: f64) -> Result<ContainsStrategy, ConfigError> {
        match mode.to_ascii_lowercase().as_str() {
            "substring" => Ok(ContainsStrategy::Substring),
            "trigram" => {
                if !(0.0..=1.0).contains(&threshold) {
                    return Err(ConfigError::InvalidSimilarityThreshold(threshold));
                }
                Ok(ContainsStrategy::Trigram { threshold })
            }
            other => Err(ConfigError::UnknownContainsMode(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PaginationConfig::default();
        assert_eq!(config.default_page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.contains, ContainsStrategy::Substring);
    }

    #[test]
    fn test_contains_strategy_parsing() {
        assert_eq!(
            PaginationConfig::contains_strategy("Trigram", 0.3).unwrap(),
            ContainsStrategy::Trigram { threshold: 0.3 }
        );
        assert_eq!(
            PaginationConfig::contains_strategy("substring", 7.0).unwrap(),
            ContainsStrategy::Substring
        );
        assert!(PaginationConfig::contains_strategy("trigram", 1.5).is_err());
        assert!(PaginationConfig::contains_strategy("fuzzy", 0.1).is_err());
    }

    #[test]
    fn test_default_page_size_bounds() {
        assert!(PaginationConfig::new(0, ContainsStrategy::Substring).is_err());
        assert!(PaginationConfig::new(MAX_PAGE_SIZE + 1, ContainsStrategy::Substring).is_err());
        assert_eq!(
            PaginationConfig::new(10, ContainsStrategy::Substring)
                .unwrap()
                .default_page_size,
            10
        );
    }
}
