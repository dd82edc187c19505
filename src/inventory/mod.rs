// Inventory module for host management

mod static_inv;

pub use static_inv::*;

use std::collections::HashMap;
use std::path::Path;

use crate::output::errors::FleetError;

/// A named group of hosts.
///
/// Host order is preserved for reporting; duplicates are kept as written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostGroup {
    pub name: String,
    pub hosts: Vec<String>,
}

impl HostGroup {
    pub fn new(name: impl Into<String>) -> Self {
        HostGroup {
            name: name.into(),
            hosts: Vec::new(),
        }
    }

    pub fn with_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hosts.extend(hosts.into_iter().map(Into::into));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

/// The complete inventory
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    groups: HashMap<String, HostGroup>,
    /// Group names in declaration order
    order: Vec<String>,
}

impl Inventory {
    pub fn new() -> Self {
        Inventory::default()
    }

    /// Load inventory from an INI-style hosts file
    pub fn from_file(path: &Path) -> Result<Self, FleetError> {
        parse_inventory_file(path)
    }

    /// Add a group, replacing any existing group of the same name
    pub fn add_group(&mut self, group: HostGroup) {
        if !self.groups.contains_key(&group.name) {
            self.order.push(group.name.clone());
        }
        self.groups.insert(group.name.clone(), group);
    }

    pub fn get_group(&self, name: &str) -> Option<&HostGroup> {
        self.groups.get(name)
    }

    /// Resolve a group reference, failing if it is not defined
    pub fn resolve(&self, name: &str) -> Result<&HostGroup, FleetError> {
        self.groups.get(name).ok_or_else(|| FleetError::Inventory {
            message: format!("Host group '{}' not found in hosts file", name),
            suggestion: Some(format!("Add a [{}] section to the hosts file", name)),
        })
    }

    /// Groups in declaration order
    pub fn groups(&self) -> impl Iterator<Item = &HostGroup> {
        self.order.iter().filter_map(|name| self.groups.get(name))
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

impl FromIterator<HostGroup> for Inventory {
    fn from_iter<T: IntoIterator<Item = HostGroup>>(iter: T) -> Self {
        let mut inventory = Inventory::new();
        for group in iter {
            inventory.add_group(group);
        }
        inventory
    }
}
