//! Canonical sorter parameters and their declared specifications.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Canonical parameter set handed to a sorter adapter.
///
/// Backed by a sorted map so serialization (and therefore fingerprinting)
/// is independent of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSet(BTreeMap<String, Value>);

impl ParameterSet {
    /// Empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a parameter value.
    pub fn set(&mut self, name: &str, value: Value) -> &mut Self {
        self.0.insert(name.to_string(), value);
        self
    }

    /// Set a parameter from a raw `key=value` string (CLI input).
    ///
    /// The value is parsed as JSON where possible and kept as a plain
    /// string otherwise.
    pub fn set_raw(&mut self, name: &str, raw: &str) -> &mut Self {
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        self.0.insert(name.to_string(), value);
        self
    }

    /// Look up a parameter value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Iterate parameters in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Declared type and range of one canonical parameter.
#[derive(Debug, Clone)]
pub enum ParamKind {
    /// Floating point value within an inclusive range.
    Float {
        /// Minimum accepted value.
        min: f64,
        /// Maximum accepted value.
        max: f64,
    },
    /// Integer value within an inclusive range.
    Int {
        /// Minimum accepted value.
        min: i64,
        /// Maximum accepted value.
        max: i64,
    },
    /// Boolean flag.
    Bool,
    /// One of a fixed set of strings.
    Choice {
        /// Accepted values.
        choices: Vec<&'static str>,
    },
}

/// One declared parameter.
#[derive(Debug, Clone)]
pub struct ParamDef {
    /// Canonical parameter name.
    pub name: &'static str,
    /// Declared type and range.
    pub kind: ParamKind,
    /// Default applied when the caller leaves the parameter unset.
    pub default: Value,
}

/// A sorter's declared parameter schema.
#[derive(Debug, Clone, Default)]
pub struct ParamSpec {
    defs: Vec<ParamDef>,
}

impl ParamSpec {
    /// Empty spec accepting no parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter definition.
    #[must_use]
    pub fn with(mut self, def: ParamDef) -> Self {
        self.defs.push(def);
        self
    }

    /// Declared parameter definitions.
    pub fn defs(&self) -> &[ParamDef] {
        &self.defs
    }

    /// The canonical parameter schema shared by the built-in protocol
    /// adapters.
    pub fn standard_sorting() -> Self {
        Self::new()
            .with(ParamDef {
                name: "detect_threshold",
                kind: ParamKind::Float { min: 0.0, max: 100.0 },
                default: Value::from(5.0),
            })
            .with(ParamDef {
                name: "detect_sign",
                kind: ParamKind::Choice {
                    choices: vec!["negative", "positive", "both"],
                },
                default: Value::from("negative"),
            })
            .with(ParamDef {
                name: "freq_min",
                kind: ParamKind::Float { min: 0.0, max: 20_000.0 },
                default: Value::from(300.0),
            })
            .with(ParamDef {
                name: "freq_max",
                kind: ParamKind::Float { min: 0.0, max: 30_000.0 },
                default: Value::from(6000.0),
            })
            .with(ParamDef {
                name: "common_reference",
                kind: ParamKind::Bool,
                default: Value::from(true),
            })
            .with(ParamDef {
                name: "num_workers",
                kind: ParamKind::Int { min: 1, max: 128 },
                default: Value::from(1),
            })
    }

    /// Validate a caller-supplied set and merge in defaults.
    ///
    /// Unknown names and out-of-range values fail with
    /// [`Error::InvalidParameter`]; nothing is touched on disk before this
    /// passes.
    pub fn resolve(&self, params: &ParameterSet) -> Result<ParameterSet> {
        for (name, value) in params.iter() {
            let def = self
                .defs
                .iter()
                .find(|d| d.name == name.as_str())
                .ok_or_else(|| Error::InvalidParameter {
                    name: name.clone(),
                    message: "not a declared parameter of this sorter".to_string(),
                })?;
            check_value(def, value)?;
        }

        let mut resolved = params.clone();
        for def in &self.defs {
            if resolved.get(def.name).is_none() {
                resolved.set(def.name, def.default.clone());
            }
        }
        Ok(resolved)
    }
}

fn check_value(def: &ParamDef, value: &Value) -> Result<()> {
    let fail = |message: String| {
        Err(Error::InvalidParameter {
            name: def.name.to_string(),
            message,
        })
    };
    match &def.kind {
        ParamKind::Float { min, max } => match value.as_f64() {
            Some(v) if (*min..=*max).contains(&v) => Ok(()),
            Some(v) => fail(format!("must be between {min} and {max}, got {v}")),
            None => fail(format!("expected a number, got {value}")),
        },
        ParamKind::Int { min, max } => match value.as_i64() {
            Some(v) if (*min..=*max).contains(&v) => Ok(()),
            Some(v) => fail(format!("must be between {min} and {max}, got {v}")),
            None => fail(format!("expected an integer, got {value}")),
        },
        ParamKind::Bool => {
            if value.is_boolean() {
                Ok(())
            } else {
                fail(format!("expected a boolean, got {value}"))
            }
        }
        ParamKind::Choice { choices } => match value.as_str() {
            Some(v) if choices.contains(&v) => Ok(()),
            _ => fail(format!("must be one of {choices:?}, got {value}")),
        },
    }
}
