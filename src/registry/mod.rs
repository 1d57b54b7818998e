//! Process-wide catalog of format and sorter adapters.
//!
//! A [`Registry`] is built once, through [`RegistryBuilder`] or from the
//! configuration file, and never mutated afterwards: it is passed by
//! reference and every lookup is pure. Unknown names fail with
//! [`Error::UnknownAdapter`].

pub mod format;

pub use format::{FormatAdapter, FormatBundle, RawBinaryFormat};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::sorter::adapter::SorterAdapter;
use crate::sorter::adapters::ProtocolAdapter;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Immutable name → adapter catalog.
pub struct Registry {
    formats: BTreeMap<String, Arc<dyn FormatAdapter>>,
    sorters: BTreeMap<String, Arc<dyn SorterAdapter>>,
}

impl Registry {
    /// Start building a registry.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Registry with the built-in format adapters and the sorter instances
    /// declared in the configuration.
    pub fn from_config(config: &Config) -> Self {
        let mut builder = Self::builder().with_format(Arc::new(RawBinaryFormat));
        for (name, sorter) in &config.sorters {
            builder = builder.with_sorter(Arc::new(ProtocolAdapter::new(
                name,
                &sorter.binary,
                sorter.args.clone(),
                sorter.protocol,
            )));
        }
        builder.build()
    }

    /// Look up a format adapter by name.
    pub fn format(&self, name: &str) -> Result<&Arc<dyn FormatAdapter>> {
        self.formats.get(name).ok_or_else(|| Error::UnknownAdapter {
            name: name.to_string(),
        })
    }

    /// Look up a sorter adapter by name.
    pub fn sorter(&self, name: &str) -> Result<&Arc<dyn SorterAdapter>> {
        self.sorters.get(name).ok_or_else(|| Error::UnknownAdapter {
            name: name.to_string(),
        })
    }

    /// Registered format names, sorted.
    pub fn format_names(&self) -> Vec<&str> {
        self.formats.keys().map(String::as_str).collect()
    }

    /// Registered sorter names, sorted.
    pub fn sorter_names(&self) -> Vec<&str> {
        self.sorters.keys().map(String::as_str).collect()
    }

    /// Open a source with the first format adapter that recognizes it.
    pub fn open_any(&self, path: &Path) -> Result<FormatBundle> {
        for adapter in self.formats.values() {
            if adapter.probe(path) {
                return adapter.open(path);
            }
        }
        Err(Error::UnsupportedFormat {
            path: path.to_path_buf(),
        })
    }
}

/// Append-only builder; consumed by [`RegistryBuilder::build`].
#[derive(Default)]
pub struct RegistryBuilder {
    formats: BTreeMap<String, Arc<dyn FormatAdapter>>,
    sorters: BTreeMap<String, Arc<dyn SorterAdapter>>,
}

impl RegistryBuilder {
    /// Register a format adapter.
    #[must_use]
    pub fn with_format(mut self, adapter: Arc<dyn FormatAdapter>) -> Self {
        self.formats.insert(adapter.name().to_string(), adapter);
        self
    }

    /// Register a sorter adapter.
    #[must_use]
    pub fn with_sorter(mut self, adapter: Arc<dyn SorterAdapter>) -> Self {
        self.sorters.insert(adapter.name().to_string(), adapter);
        self
    }

    /// Freeze into an immutable registry.
    pub fn build(self) -> Registry {
        Registry {
            formats: self.formats,
            sorters: self.sorters,
        }
    }
}
