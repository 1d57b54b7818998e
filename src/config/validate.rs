//! Configuration validation.

use crate::cache::policy::SnippetWindow;
use crate::config::{Config, SorterConfig};
use crate::error::{Error, Result};

/// Validate the entire configuration.
pub fn validate_config(config: &Config) -> Result<()> {
    // reuse the window's own bounds checking
    SnippetWindow::new(config.waveforms.ms_before, config.waveforms.ms_after)?;

    if config.waveforms.max_spikes_per_unit == 0 {
        return Err(Error::ConfigValidation {
            message: "waveforms.max_spikes_per_unit must be at least 1".to_string(),
        });
    }

    if config.jobs.max_parallel == 0 {
        return Err(Error::ConfigValidation {
            message: "jobs.max_parallel must be at least 1".to_string(),
        });
    }

    if config.jobs.timeout_secs == 0 {
        return Err(Error::ConfigValidation {
            message: "jobs.timeout_secs must be at least 1".to_string(),
        });
    }

    for (name, sorter) in &config.sorters {
        validate_sorter_config(name, sorter)?;
    }

    Ok(())
}

/// Validate a single sorter entry.
pub fn validate_sorter_config(name: &str, sorter: &SorterConfig) -> Result<()> {
    if sorter.binary.trim().is_empty() {
        return Err(Error::ConfigValidation {
            message: format!("sorters.{name}.binary must not be empty"),
        });
    }
    if sorter.timeout_secs == Some(0) {
        return Err(Error::ConfigValidation {
            message: format!("sorters.{name}.timeout_secs must be at least 1"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sorter::adapters::SorterProtocol;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_bad_window() {
        let mut config = Config::default();
        config.waveforms.ms_before = -1.0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_zero_max_parallel() {
        let mut config = Config::default();
        config.jobs.max_parallel = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_zero_max_spikes() {
        let mut config = Config::default();
        config.waveforms.max_spikes_per_unit = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_empty_sorter_binary() {
        let mut config = Config::default();
        config.sorters.insert(
            "demo".to_string(),
            SorterConfig {
                binary: "  ".to_string(),
                args: vec![],
                protocol: SorterProtocol::Json,
                timeout_secs: None,
            },
        );
        let result = validate_config(&config);
        assert!(matches!(result, Err(Error::ConfigValidation { .. })));
    }
}
