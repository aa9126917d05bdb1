//! Interface registry owned by a [`Stack`](crate::Stack).
//!
//! Interfaces are discoverable by name from registration until they are
//! deinitialized. Names are unique among live interfaces.

use crate::error::{Error, Result};
use crate::interface::{Interface, InterfaceStats};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, Weak};

/// Maximum interface name length in bytes.
pub const IFACE_NAME_MAX: usize = 16;

/// Bounded interface name.
pub type InterfaceName = heapless::String<IFACE_NAME_MAX>;

/// Validate and convert an interface name.
pub fn interface_name(name: &str) -> Result<InterfaceName> {
    if name.is_empty() {
        return Err(Error::InvalidArgument(
            "interface name cannot be empty".to_string(),
        ));
    }
    let mut bounded = InterfaceName::new();
    bounded.push_str(name).map_err(|_| {
        Error::InvalidArgument(format!(
            "interface name '{name}' exceeds {IFACE_NAME_MAX} bytes"
        ))
    })?;
    Ok(bounded)
}

type Table = RwLock<BTreeMap<InterfaceName, Interface>>;

/// The set of live interfaces of one stack.
#[derive(Clone, Default)]
pub struct Registry {
    table: Arc<Table>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `iface` under its name.
    ///
    /// Fails with [`Error::InvalidArgument`] if the name is taken.
    pub fn add(&self, iface: Interface) -> Result<()> {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        if table.contains_key(iface.name()) {
            return Err(Error::InvalidArgument(format!(
                "interface '{}' is already registered",
                iface.name()
            )));
        }
        table.insert(iface.name().clone(), iface);
        Ok(())
    }

    /// Remove `iface` if it is the one registered under its name.
    pub fn remove(&self, iface: &Interface) -> bool {
        remove_from(&self.table, iface)
    }

    /// Look up a live interface by name.
    pub fn get(&self, name: &str) -> Option<Interface> {
        let key = interface_name(name).ok()?;
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Names of all live interfaces, sorted.
    pub fn names(&self) -> Vec<InterfaceName> {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// All live interfaces, sorted by name.
    pub fn interfaces(&self) -> Vec<Interface> {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Counter snapshot of every live interface, sorted by name.
    pub fn stats(&self) -> Vec<(InterfaceName, InterfaceStats)> {
        self.interfaces()
            .into_iter()
            .map(|iface| (iface.name().clone(), iface.stats()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.table.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn downgrade(&self) -> RegistryRef {
        RegistryRef {
            table: Arc::downgrade(&self.table),
        }
    }
}

/// Non-owning handle kept by each interface so deinit can deregister it
/// without the registry and its interfaces keeping each other alive.
#[derive(Clone, Default)]
pub(crate) struct RegistryRef {
    table: Weak<Table>,
}

impl RegistryRef {
    pub(crate) fn remove(&self, iface: &Interface) -> bool {
        match self.table.upgrade() {
            Some(table) => remove_from(&table, iface),
            None => false,
        }
    }
}

fn remove_from(table: &Table, iface: &Interface) -> bool {
    let mut table = table.write().unwrap_or_else(PoisonError::into_inner);
    match table.get(iface.name()) {
        Some(registered) if registered.same_as(iface) => {
            table.remove(iface.name());
            true
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_validated() {
        assert!(interface_name("can0").is_ok());
        assert!(matches!(
            interface_name(""),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            interface_name("this-name-is-far-too-long"),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn empty_registry() {
        let registry = Registry::new();
        assert!(registry.is_empty());
        assert!(registry.get("if0").is_none());
        assert!(registry.get("this-name-is-far-too-long").is_none());
        assert!(registry.names().is_empty());
    }
}
