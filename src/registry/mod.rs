//! Resolves a channel-type string to an adapter factory. Grounded on the
//! teacher's `channels::manager::ChannelManager` static construction, turned
//! into a dynamic table so new channel types don't require a recompiled
//! match arm (spec §4.1, §9 "duck-typed adapter").

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use crate::channels::adapter::ChannelAdapter;
use crate::errors::{GatewayError, Result};
use serde_json::Value;
use tracing::warn;

pub type ChannelFactory =
    Arc<dyn Fn(&str, &Value) -> anyhow::Result<Box<dyn ChannelAdapter>> + Send + Sync>;

/// A process-wide table of plugin-contributed factories, additional to the
/// compile-time built-in table. Stands in for the out-of-scope OS-level
/// `"letsgo.channels"` entry-point catalog: a real plugin loader would
/// populate this same table by dlopen-ing shared objects and calling their
/// registration entry point.
static PLUGIN_FACTORIES: OnceLock<RwLock<HashMap<String, ChannelFactory>>> = OnceLock::new();

fn plugin_table() -> &'static RwLock<HashMap<String, ChannelFactory>> {
    PLUGIN_FACTORIES.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Registers (or overrides) a factory for `type_str`, visible to every
/// `PluginRegistry` built afterward in this process.
pub fn register_factory(type_str: impl Into<String>, factory: ChannelFactory) {
    let type_str = type_str.into();
    match plugin_table().write() {
        Ok(mut table) => {
            table.insert(type_str, factory);
        }
        Err(_) => warn!("plugin factory table lock poisoned; registration dropped"),
    }
}

#[derive(Clone)]
pub struct PluginRegistry {
    builtins: HashMap<String, ChannelFactory>,
}

impl PluginRegistry {
    /// Builds a registry from the compile-time built-in table. Plugin
    /// entries are consulted lazily at `resolve` time so a plugin registered
    /// after this call is still visible — this matches the spec's "lazy;
    /// results may be cached per process" wording for the built-in half only.
    pub fn discover_channels() -> Self {
        let mut builtins: HashMap<String, ChannelFactory> = HashMap::new();
        crate::channels::register_builtins(&mut builtins);
        Self { builtins }
    }

    /// Returns the union of built-in and plugin-contributed type names.
    pub fn registered_types(&self) -> Vec<String> {
        let mut names: Vec<String> = self.builtins.keys().cloned().collect();
        if let Ok(table) = plugin_table().read() {
            for key in table.keys() {
                if !names.contains(key) {
                    names.push(key.clone());
                }
            }
        }
        names.sort();
        names
    }

    /// Resolves `type_str` to a factory. Plugin entries override built-ins
    /// on name collision.
    pub fn resolve(&self, type_str: &str) -> Result<ChannelFactory> {
        if let Ok(table) = plugin_table().read()
            && let Some(factory) = table.get(type_str)
        {
            return Ok(factory.clone());
        }
        self.builtins
            .get(type_str)
            .cloned()
            .ok_or_else(|| GatewayError::UnknownChannelType(type_str.to_string()))
    }
}
