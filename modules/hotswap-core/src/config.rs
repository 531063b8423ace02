//! Runtime configuration and the options an `App` is built with.

use std::any::Any;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use hotswap_store::ReducerFn;
use serde::Deserialize;
use serde_json::Value;
use typed_builder::TypedBuilder;

/// Opaque navigation/history collaborator handed to every subscription.
pub type Navigation = Arc<dyn Any + Send + Sync>;

/// What `unmodel` does with a namespace nobody registered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownNamespacePolicy {
    #[default]
    Fail,
    Ignore,
}

/// Runtime tuning. Loadable from the `[runtime]` table of a TOML file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    pub unknown_namespace: UnknownNamespacePolicy,
    /// Warn when a model-scoped dispatch is given its own prefix.
    pub warn_prefixed_dispatch: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            unknown_namespace: UnknownNamespacePolicy::Fail,
            warn_prefixed_dispatch: true,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    runtime: RuntimeConfig,
}

/// Parse runtime config from TOML text.
pub fn parse_config(content: &str) -> Result<RuntimeConfig> {
    let file: ConfigFile = toml::from_str(content).context("Failed to parse runtime config")?;
    Ok(file.runtime)
}

/// Load and parse a TOML config file.
pub fn load_config(path: &Path) -> Result<RuntimeConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Options fixed at construction time.
#[derive(Clone, TypedBuilder)]
pub struct AppOptions {
    #[builder(default)]
    pub config: RuntimeConfig,
    /// Seed for the whole state. Slices it contains win over model defaults.
    #[builder(default, setter(strip_option))]
    pub initial_state: Option<Value>,
    /// Static reducers composed next to the models, keyed by state slice.
    #[builder(default)]
    pub reducers: Vec<(String, ReducerFn)>,
    #[builder(default, setter(strip_option))]
    pub navigation: Option<Navigation>,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}
