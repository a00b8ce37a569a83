//! Turns node and group selectors into the list of addresses to contact.

use std::collections::HashMap;

use indexmap::IndexSet;
use itertools::Itertools;
use serde::Serialize;

use crate::error::ResolveError;
use crate::state::ConfigState;

/// Include and exclude selectors, as given on the command line.
#[derive(Debug, Clone, Default)]
pub struct NodeSet {
    nodes: IndexSet<String>,
    groups: IndexSet<String>,
    exclude_nodes: IndexSet<String>,
    exclude_groups: IndexSet<String>,
}

impl NodeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a comma separated list of nodes.
    pub fn add_nodes(&mut self, list: &str) {
        self.nodes.extend(split_list(list));
    }

    pub fn add_groups(&mut self, list: &str) {
        self.groups.extend(split_list(list));
    }

    pub fn exclude_nodes(&mut self, list: &str) {
        self.exclude_nodes.extend(split_list(list));
    }

    pub fn exclude_groups(&mut self, list: &str) {
        self.exclude_groups.extend(split_list(list));
    }

    /// Computes the addresses of the selected nodes.
    ///
    /// Without include selectors the configured default node set is used.
    /// Any name that is not configured aborts resolution. Nodes that are
    /// ignored, either by name or through one of their groups, are left out
    /// and listed in `ResolvedNodeSet::ignored`.
    pub fn resolve(&self, state: &ConfigState) -> Result<ResolvedNodeSet, ResolveError> {
        let (nodes, groups) = if self.nodes.is_empty() && self.groups.is_empty() {
            if state.params.default_nodeset.is_empty() {
                return Ok(ResolvedNodeSet::default());
            }
            state
                .params
                .default_nodeset
                .iter()
                .cloned()
                .partition::<IndexSet<_>, _>(|name| state.is_node(name))
        } else {
            (self.nodes.clone(), self.groups.clone())
        };

        // The user may have given bogus names.
        if let Some(node) = nodes
            .iter()
            .chain(&self.exclude_nodes)
            .find(|node| !state.is_node(node))
        {
            return Err(ResolveError::UnknownNode(node.clone()));
        }
        if let Some(group) = groups
            .iter()
            .chain(&self.exclude_groups)
            .find(|group| !state.is_group(group))
        {
            return Err(ResolveError::UnknownGroup(group.clone()));
        }

        let mut selected = state.nodes_in_groups(&groups);
        selected.extend(nodes);
        let mut excluded = state.nodes_in_groups(&self.exclude_groups);
        excluded.extend(self.exclude_nodes.iter().cloned());

        let ignore = &state.params.ignore_groups;
        let mut resolved = ResolvedNodeSet::default();

        // Definition order keeps the result stable across calls.
        for node in state.nodes.keys() {
            if !selected.contains(node) || excluded.contains(node) {
                continue;
            }
            if ignore.contains(node) {
                tracing::info!("node {} is ignored", node);
                resolved.ignored.push(IgnoredNode {
                    nodename: node.clone(),
                    reason: IgnoreReason::Node,
                });
                continue;
            }
            if state.groups_of(node).iter().any(|g| ignore.contains(g)) {
                tracing::info!("node {} is ignored due to an ignored group", node);
                resolved.ignored.push(IgnoredNode {
                    nodename: node.clone(),
                    reason: IgnoreReason::Group,
                });
                continue;
            }
            resolved.insert(state.address_of(node), node);
        }
        Ok(resolved)
    }
}

fn split_list(list: &str) -> impl Iterator<Item = String> + '_ {
    list.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The node itself is ignored.
    Node,
    /// The node is in an ignored group.
    Group,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoredNode {
    pub nodename: String,
    pub reason: IgnoreReason,
}

/// An address together with the node it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeAddress {
    pub nodename: String,
    pub address: String,
}

/// Addresses to contact, in order and without duplicates.
#[derive(Debug, Clone, Default)]
pub struct ResolvedNodeSet {
    addresses: IndexSet<String>,
    namemap: HashMap<String, String>,
    ignored: Vec<IgnoredNode>,
}

impl ResolvedNodeSet {
    /// Adds an address. When two nodes share an address the list keeps one
    /// entry while the name map follows the latest node.
    fn insert(&mut self, address: &str, node: &str) {
        self.namemap.insert(address.to_string(), node.to_string());
        self.addresses.insert(address.to_string());
    }

    pub fn addresses(&self) -> Vec<&str> {
        self.addresses.iter().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    /// Running on nothing is an error; listing nothing is not.
    pub fn require_nodes(&self) -> Result<(), ResolveError> {
        if self.is_empty() {
            return Err(ResolveError::NoValidNodes);
        }
        Ok(())
    }

    pub fn ignored(&self) -> &[IgnoredNode] {
        &self.ignored
    }

    /// Maps an address back to its node. Unknown addresses are returned as is.
    pub fn nodename_for<'a>(&'a self, address: &'a str) -> &'a str {
        self.namemap
            .get(address)
            .map(String::as_str)
            .unwrap_or(address)
    }

    pub fn entries(&self) -> Vec<NodeAddress> {
        self.addresses
            .iter()
            .map(|address| NodeAddress {
                nodename: self.nodename_for(address).to_string(),
                address: address.clone(),
            })
            .collect()
    }

    /// The warning to show about ignored nodes, if there are any.
    pub fn ignored_warning(&self, terse: bool) -> Option<String> {
        if self.ignored.is_empty() {
            return None;
        }
        if terse {
            return Some("ignored nodes".to_string());
        }
        let names = self.ignored.iter().map(|i| i.nodename.as_str()).join(",");
        let warning = format!("warning: ignored nodes: {}", names);
        if warning.len() < 80 {
            Some(warning)
        } else {
            Some("warning: some nodes are ignored".to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::ConfigLoader;

    fn config(text: &str) -> ConfigState {
        let mut loader = ConfigLoader::new(ConfigState::new());
        assert_eq!(loader.load_str("test.conf", text), 0, "{:?}", loader.diagnostics());
        let (state, diagnostics) = loader.finish();
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
        state
    }

    const FLEET: &str = "\
group webfarm web frontend
node web1 webfarm ipaddress:10.0.0.1
node web2 web
node db1 db ipaddress:10.0.1.1
node lab1 test
";

    fn resolve(state: &ConfigState, setup: impl FnOnce(&mut NodeSet)) -> ResolvedNodeSet {
        let mut nodeset = NodeSet::new();
        setup(&mut nodeset);
        nodeset.resolve(state).unwrap()
    }

    #[test]
    fn test_resolve_group_maps_addresses() {
        let state = config(FLEET);
        let resolved = resolve(&state, |n| n.add_groups("web"));
        assert_eq!(resolved.addresses(), ["10.0.0.1", "web2"]);
        assert_eq!(resolved.nodename_for("10.0.0.1"), "web1");
        assert_eq!(resolved.nodename_for("web2"), "web2");
        assert_eq!(resolved.nodename_for("172.16.0.1"), "172.16.0.1");
    }

    #[test]
    fn test_compound_group_and_exclusions() {
        let state = config(FLEET);
        let resolved = resolve(&state, |n| {
            n.add_groups("frontend,db");
            n.add_nodes("lab1");
            n.exclude_nodes("web2");
        });
        assert_eq!(resolved.addresses(), ["10.0.0.1", "10.0.1.1", "lab1"]);

        let resolved = resolve(&state, |n| {
            n.add_groups("all");
            n.exclude_groups("web,test");
        });
        assert_eq!(resolved.addresses(), ["10.0.1.1"]);
    }

    #[test]
    fn test_default_nodeset() {
        let state = config(FLEET);
        assert_eq!(resolve(&state, |_| {}).len(), 4);

        let state = config(&format!("{}default_nodeset lab1 db\n", FLEET));
        assert_eq!(resolve(&state, |_| {}).addresses(), ["10.0.1.1", "lab1"]);

        let state = config(&format!("{}default_nodeset none\n", FLEET));
        assert!(resolve(&state, |_| {}).is_empty());
        assert_eq!(
            resolve(&state, |_| {}).require_nodes(),
            Err(ResolveError::NoValidNodes)
        );
        assert_eq!(resolve(&state, |n| n.add_nodes("lab1")).require_nodes(), Ok(()));
    }

    #[test]
    fn test_unknown_names_abort() {
        let state = config(FLEET);
        let mut nodeset = NodeSet::new();
        nodeset.add_nodes("web1,ghost");
        assert_eq!(
            nodeset.resolve(&state).unwrap_err(),
            ResolveError::UnknownNode("ghost".into())
        );

        let mut nodeset = NodeSet::new();
        nodeset.add_groups("web");
        nodeset.exclude_groups("phantom");
        assert_eq!(
            nodeset.resolve(&state).unwrap_err(),
            ResolveError::UnknownGroup("phantom".into())
        );
    }

    #[test]
    fn test_ignored_nodes_and_groups() {
        let state = config(&format!("{}ignore_node web2\nignore_group test\n", FLEET));
        let resolved = resolve(&state, |n| n.add_groups("all"));
        assert_eq!(resolved.addresses(), ["10.0.0.1", "10.0.1.1"]);
        assert_eq!(
            resolved.ignored(),
            [
                IgnoredNode {
                    nodename: "web2".into(),
                    reason: IgnoreReason::Node
                },
                IgnoredNode {
                    nodename: "lab1".into(),
                    reason: IgnoreReason::Group
                },
            ]
        );
        assert_eq!(
            resolved.ignored_warning(false).as_deref(),
            Some("warning: ignored nodes: web2,lab1")
        );
        assert_eq!(resolved.ignored_warning(true).as_deref(), Some("ignored nodes"));
    }

    #[test]
    fn test_shared_address_keeps_one_entry() {
        let state = config("node alpha ipaddress:beta\nnode beta\n");
        let resolved = resolve(&state, |n| n.add_nodes("alpha,beta"));
        assert_eq!(resolved.addresses(), ["beta"]);
        assert_eq!(resolved.nodename_for("beta"), "beta");
    }

    #[test]
    fn test_shared_address_keeps_first_position() {
        let state = config("node alpha ipaddress:beta\nnode gamma\nnode beta\n");
        let resolved = resolve(&state, |n| n.add_groups("all"));
        assert_eq!(resolved.addresses(), ["beta", "gamma"]);
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved.nodename_for("beta"), "beta");
    }

    #[test]
    fn test_resolution_is_repeatable() {
        let state = config(FLEET);
        let mut nodeset = NodeSet::new();
        nodeset.add_groups("db,web");
        nodeset.add_nodes("lab1");
        let first = nodeset.resolve(&state).unwrap();
        let second = nodeset.resolve(&state).unwrap();
        assert_eq!(first.addresses(), second.addresses());
        assert_eq!(first.entries(), second.entries());
    }
}
