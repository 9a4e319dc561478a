//! TOML configuration for the mapping layer.
//!
//! ```toml
//! strategy = "auto"            # auto | indexed | subreference | noop
//! detachable_by_default = true
//! log = "sombra_ogm=debug"
//!
//! [store]
//! snapshot = "graph.json"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{OgmError, Result};
use crate::typerep::Strategy;

/// Which type encoding to use, or `Auto` to probe the store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyOverride {
    #[default]
    Auto,
    Indexed,
    #[serde(rename = "subreference")]
    SubReference,
    Noop,
}

impl StrategyOverride {
    /// The forced strategy, if any.
    pub fn forced(self) -> Option<Strategy> {
        match self {
            StrategyOverride::Auto => None,
            StrategyOverride::Indexed => Some(Strategy::Indexed),
            StrategyOverride::SubReference => Some(Strategy::SubReference),
            StrategyOverride::Noop => Some(Strategy::Noop),
        }
    }
}

impl From<Strategy> for StrategyOverride {
    fn from(strategy: Strategy) -> Self {
        match strategy {
            Strategy::Indexed => StrategyOverride::Indexed,
            Strategy::SubReference => StrategyOverride::SubReference,
            Strategy::Noop => StrategyOverride::Noop,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSection {
    /// JSON snapshot the in-memory store is loaded from and saved to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<PathBuf>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OgmConfig {
    #[serde(default)]
    pub strategy: StrategyOverride,
    #[serde(default = "default_detachable")]
    pub detachable_by_default: bool,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<String>,
    #[serde(default)]
    pub store: StoreSection,
}

fn default_detachable() -> bool {
    true
}

impl Default for OgmConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyOverride::Auto,
            detachable_by_default: default_detachable(),
            log: None,
            store: StoreSection::default(),
        }
    }
}

impl OgmConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|err| {
            OgmError::Config(format!("failed to read {}: {err}", path.display()))
        })?;
        toml::from_str(&contents).map_err(|err| {
            OgmError::Config(format!("failed to parse {}: {err}", path.display()))
        })
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|err| OgmError::Config(err.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|err| OgmError::Config(err.to_string()))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    pub fn strategy(mut self, strategy: StrategyOverride) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn detachable_by_default(mut self, detachable: bool) -> Self {
        self.detachable_by_default = detachable;
        self
    }

    pub fn log(mut self, directive: impl Into<String>) -> Self {
        self.log = Some(directive.into());
        self
    }

    pub fn snapshot(mut self, path: impl Into<PathBuf>) -> Self {
        self.store.snapshot = Some(path.into());
        self
    }
}
