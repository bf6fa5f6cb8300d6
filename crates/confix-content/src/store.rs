//! Host store abstractions for the store-backed grammars
//!
//! The engine never shells out to host tools. Callers inject a
//! [`PreferenceStore`] or [`ProfileStore`]; the in-memory implementations
//! here back tests and dry runs.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// A single mutation of a host store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum StoreCommand {
    SetPreference {
        domain: String,
        key: String,
        value: Value,
    },
    DeletePreference {
        domain: String,
        key: String,
    },
    InstallProfile {
        identifier: String,
        options: Value,
    },
    RemoveProfile {
        identifier: String,
    },
}

impl StoreCommand {
    /// Short human-readable description for logs.
    pub fn describe(&self) -> String {
        match self {
            Self::SetPreference { domain, key, value } => format!("set {domain} {key} = {value}"),
            Self::DeletePreference { domain, key } => format!("delete {domain} {key}"),
            Self::InstallProfile { identifier, .. } => format!("install profile {identifier}"),
            Self::RemoveProfile { identifier } => format!("remove profile {identifier}"),
        }
    }
}

/// Runs store commands, typically when undoing a recorded change
pub trait CommandInvoker {
    fn invoke(&self, command: &StoreCommand) -> Result<()>;
}

/// Host preference key/value store, organised by domain
pub trait PreferenceStore: Send + Sync {
    fn domains(&self) -> Result<Vec<String>>;
    /// Key/value pairs of one domain, in store order.
    fn read(&self, domain: &str) -> Result<Vec<(String, Value)>>;
    fn write(&self, domain: &str, key: &str, value: &Value) -> Result<()>;
    fn delete(&self, domain: &str, key: &str) -> Result<()>;
}

/// An installed host profile and its option tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstalledProfile {
    pub identifier: String,
    pub options: Value,
}

/// Host profile list
pub trait ProfileStore: Send + Sync {
    fn installed(&self) -> Result<Vec<InstalledProfile>>;
    /// Install or replace a profile.
    fn install(&self, identifier: &str, options: &Value) -> Result<()>;
    fn remove(&self, identifier: &str) -> Result<()>;
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| Error::store("in-memory store lock poisoned"))
}

/// In-memory [`PreferenceStore`]. Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryPreferenceStore {
    domains: Arc<Mutex<BTreeMap<String, Map<String, Value>>>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: seed a value.
    pub fn with(self, domain: &str, key: &str, value: impl Into<Value>) -> Self {
        if let Ok(mut domains) = self.domains.lock() {
            domains
                .entry(domain.to_string())
                .or_default()
                .insert(key.to_string(), value.into());
        }
        self
    }

    pub fn get(&self, domain: &str, key: &str) -> Option<Value> {
        let domains = self.domains.lock().ok()?;
        domains.get(domain)?.get(key).cloned()
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn domains(&self) -> Result<Vec<String>> {
        Ok(lock(&self.domains)?.keys().cloned().collect())
    }

    fn read(&self, domain: &str) -> Result<Vec<(String, Value)>> {
        Ok(lock(&self.domains)?
            .get(domain)
            .map(|values| {
                values
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn write(&self, domain: &str, key: &str, value: &Value) -> Result<()> {
        lock(&self.domains)?
            .entry(domain.to_string())
            .or_default()
            .insert(key.to_string(), value.clone());
        Ok(())
    }

    fn delete(&self, domain: &str, key: &str) -> Result<()> {
        let mut domains = lock(&self.domains)?;
        if let Some(values) = domains.get_mut(domain) {
            values.shift_remove(key);
            if values.is_empty() {
                domains.remove(domain);
            }
        }
        Ok(())
    }
}

/// In-memory [`ProfileStore`]. Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryProfileStore {
    profiles: Arc<Mutex<Vec<InstalledProfile>>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: seed an installed profile.
    pub fn with_profile(self, identifier: &str, options: Value) -> Self {
        let _ = ProfileStore::install(&self, identifier, &options);
        self
    }

    pub fn get(&self, identifier: &str) -> Option<InstalledProfile> {
        let profiles = self.profiles.lock().ok()?;
        profiles.iter().find(|p| p.identifier == identifier).cloned()
    }
}

impl ProfileStore for MemoryProfileStore {
    fn installed(&self) -> Result<Vec<InstalledProfile>> {
        Ok(lock(&self.profiles)?.clone())
    }

    fn install(&self, identifier: &str, options: &Value) -> Result<()> {
        let mut profiles = lock(&self.profiles)?;
        let profile = InstalledProfile {
            identifier: identifier.to_string(),
            options: options.clone(),
        };
        match profiles.iter_mut().find(|p| p.identifier == identifier) {
            Some(existing) => *existing = profile,
            None => profiles.push(profile),
        }
        Ok(())
    }

    fn remove(&self, identifier: &str) -> Result<()> {
        lock(&self.profiles)?.retain(|p| p.identifier != identifier);
        Ok(())
    }
}
