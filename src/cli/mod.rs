//! CLI argument types and helpers.

pub mod args;

pub use args::{CacheAction, Cli, Command, ConfigAction};

use crate::error::{Error, Result};
use crate::sorter::params::ParameterSet;

/// Parse repeated `NAME=VALUE` CLI arguments into a parameter set.
pub fn parse_params(raw: &[String]) -> Result<ParameterSet> {
    let mut params = ParameterSet::new();
    for entry in raw {
        let Some((name, value)) = entry.split_once('=') else {
            return Err(Error::InvalidParameter {
                name: entry.clone(),
                message: "expected NAME=VALUE".to_string(),
            });
        };
        params.set_raw(name.trim(), value.trim());
    }
    Ok(params)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_params() {
        let params = parse_params(&[
            "detect_threshold=6.5".to_string(),
            "detect_sign=positive".to_string(),
        ])
        .unwrap();
        assert_eq!(params.get("detect_threshold"), Some(&serde_json::json!(6.5)));
        assert_eq!(
            params.get("detect_sign"),
            Some(&serde_json::json!("positive"))
        );
    }

    #[test]
    fn test_parse_params_missing_equals() {
        let result = parse_params(&["detect_threshold".to_string()]);
        assert!(matches!(result, Err(Error::InvalidParameter { .. })));
    }
}
