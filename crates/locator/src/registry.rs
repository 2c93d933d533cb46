//! Strategy registry
//!
//! Holds the strategy set behind a mutex so a shared registry can be
//! reconfigured (enable/disable, priority overrides) while resolutions are in
//! flight. Ordering is recomputed on read, so an override takes effect on the
//! next cycle.

use crate::strategies::{default_strategies, LocateStrategy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

struct Entry {
    strategy: Arc<dyn LocateStrategy>,
    enabled: bool,
    priority_override: Option<i32>,
}

impl Entry {
    fn effective_priority(&self) -> i32 {
        self.priority_override
            .unwrap_or_else(|| self.strategy.descriptor().priority)
    }
}

/// Serializable snapshot of the registry's configuration (not its code).
/// Importing a state only touches strategies the registry already knows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryState {
    pub disabled: Vec<String>,
    pub priority_overrides: BTreeMap<String, i32>,
}

/// Thread-safe, reconfigurable collection of locate strategies.
pub struct StrategyRegistry {
    entries: Mutex<Vec<Entry>>,
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl StrategyRegistry {
    /// An empty registry. Useful for tests and fully custom setups.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    /// A registry preloaded with the standard ten strategies.
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        for strategy in default_strategies() {
            registry.register(strategy);
        }
        registry
    }

    /// Add a strategy, enabled, with its own declared priority. A strategy
    /// with the same name replaces the existing entry and keeps the old
    /// entry's enabled flag and override.
    pub fn register(&self, strategy: Arc<dyn LocateStrategy>) {
        let mut entries = self.entries.lock().unwrap();
        let name = strategy.name();
        if let Some(existing) = entries.iter_mut().find(|e| e.strategy.name() == name) {
            debug!(strategy = name, "replacing registered strategy");
            existing.strategy = strategy;
            return;
        }
        entries.push(Entry {
            strategy,
            enabled: true,
            priority_override: None,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.strategy.name().to_string())
            .collect()
    }

    /// Enabled strategies sorted by effective priority, lowest first. Ties
    /// keep registration order.
    pub fn active(&self) -> Vec<Arc<dyn LocateStrategy>> {
        let entries = self.entries.lock().unwrap();
        let mut selected: Vec<(i32, Arc<dyn LocateStrategy>)> = entries
            .iter()
            .filter(|e| e.enabled)
            .map(|e| (e.effective_priority(), Arc::clone(&e.strategy)))
            .collect();
        selected.sort_by_key(|(priority, _)| *priority);
        selected.into_iter().map(|(_, s)| s).collect()
    }

    pub fn set_enabled(&self, name: &str, enabled: bool) -> bool {
        let mut entries = self.entries.lock().unwrap();
        match entries.iter_mut().find(|e| e.strategy.name() == name) {
            Some(entry) => {
                entry.enabled = enabled;
                true
            }
            None => {
                warn!(strategy = name, "cannot toggle unknown strategy");
                false
            }
        }
    }

    pub fn enable(&self, name: &str) -> bool {
        self.set_enabled(name, true)
    }

    pub fn disable(&self, name: &str) -> bool {
        self.set_enabled(name, false)
    }

    /// Enable exactly the named strategies, disabling the rest.
    pub fn enable_only(&self, names: &[&str]) {
        let mut entries = self.entries.lock().unwrap();
        for entry in entries.iter_mut() {
            entry.enabled = names.contains(&entry.strategy.name());
        }
    }

    pub fn disable_all(&self) {
        let mut entries = self.entries.lock().unwrap();
        for entry in entries.iter_mut() {
            entry.enabled = false;
        }
    }

    /// Override a strategy's position in the fallback chain.
    pub fn set_priority(&self, name: &str, priority: i32) -> bool {
        let mut entries = self.entries.lock().unwrap();
        match entries.iter_mut().find(|e| e.strategy.name() == name) {
            Some(entry) => {
                entry.priority_override = Some(priority);
                true
            }
            None => {
                warn!(strategy = name, "cannot reprioritize unknown strategy");
                false
            }
        }
    }

    /// Drop any override, restoring the strategy's declared priority.
    pub fn reset_priority(&self, name: &str) -> bool {
        let mut entries = self.entries.lock().unwrap();
        match entries.iter_mut().find(|e| e.strategy.name() == name) {
            Some(entry) => {
                entry.priority_override = None;
                true
            }
            None => false,
        }
    }

    /// Snapshot the current configuration for persistence.
    pub fn export_state(&self) -> RegistryState {
        let entries = self.entries.lock().unwrap();
        let mut state = RegistryState::default();
        for entry in entries.iter() {
            let name = entry.strategy.name();
            if !entry.enabled {
                state.disabled.push(name.to_string());
            }
            if let Some(priority) = entry.priority_override {
                state.priority_overrides.insert(name.to_string(), priority);
            }
        }
        state
    }

    /// Apply a persisted configuration. Strategies named in the state but
    /// not present in this registry are ignored.
    pub fn import_state(&self, state: &RegistryState) {
        let mut entries = self.entries.lock().unwrap();
        for entry in entries.iter_mut() {
            let name = entry.strategy.name();
            entry.enabled = !state.disabled.iter().any(|d| d == name);
            entry.priority_override = state.priority_overrides.get(name).copied();
        }
    }
}
