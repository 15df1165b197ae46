use std::sync::Arc;

use crate::contract::Adapter;

pub type AdapterRef = Arc<dyn Adapter>;

type Constructor = fn() -> AdapterRef;

#[cfg(feature = "calamine")]
fn make_calamine() -> AdapterRef {
    Arc::new(crate::calamine_reader::CalamineAdapter::new())
}

#[cfg(feature = "xlsxwriter")]
fn make_rust_xlsxwriter() -> AdapterRef {
    Arc::new(crate::xlsxwriter_writer::RustXlsxWriterAdapter::new())
}

/// Adapters compiled into this build, in registration order.
const BUILTIN: &[(&str, Constructor)] = &[
    #[cfg(feature = "calamine")]
    ("calamine", make_calamine),
    #[cfg(feature = "xlsxwriter")]
    ("rust_xlsxwriter", make_rust_xlsxwriter),
];

/// Names of the adapters compiled into this build.
pub fn builtin_names() -> impl Iterator<Item = &'static str> {
    BUILTIN.iter().map(|(name, _)| *name)
}

/// Construct one built-in adapter by name.
pub fn builtin(name: &str) -> Option<AdapterRef> {
    BUILTIN
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, make)| make())
}

/// Explicit set of adapters for one run. Names are unique; order is
/// registration order.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: Vec<AdapterRef>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every adapter compiled into this build.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for (_, make) in BUILTIN {
            registry.register(make());
        }
        registry
    }

    /// Add an adapter, replacing any previous adapter with the same name.
    pub fn register(&mut self, adapter: AdapterRef) {
        let name = adapter.name();
        match self.adapters.iter().position(|a| a.name() == name) {
            Some(idx) => self.adapters[idx] = adapter,
            None => self.adapters.push(adapter),
        }
    }

    pub fn get(&self, name: &str) -> Option<AdapterRef> {
        self.adapters.iter().find(|a| a.name() == name).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AdapterRef> {
        self.adapters.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.adapters.iter().map(|a| a.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Keep only adapters named in `names`. An empty filter keeps everything.
    pub fn retain_named(&mut self, names: &[String]) {
        if names.is_empty() {
            return;
        }
        self.adapters.retain(|a| names.iter().any(|n| *n == a.name()));
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
