//! Configuration state.
//!
//! A `ConfigState` is built once by the loader and then only read: the node
//! set resolver and the dispatcher borrow it, nothing mutates it after
//! `finalize`.

use std::collections::{HashMap, HashSet};

use indexmap::{IndexMap, IndexSet};

use crate::loader::Diagnostic;
use crate::node::NodeDefinition;
use crate::symbol::SymbolTable;

/// Group names with a fixed meaning that can never be (re)defined.
pub const RESERVED_GROUPS: [&str; 3] = ["all", "none", "template"];

/// Vocabularies the directive handlers validate against.
#[derive(Debug, Clone)]
pub struct Defaults {
    pub boolean_true: HashSet<&'static str>,
    pub boolean_false: HashSet<&'static str>,
    pub package_managers: HashSet<&'static str>,
    pub color_names: HashSet<&'static str>,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            boolean_true: ["yes", "on", "true", "1"].into_iter().collect(),
            boolean_false: ["no", "off", "false", "0"].into_iter().collect(),
            package_managers: ["apt-get", "yum", "zypper", "brew", "pacman", "bsdpkg", "pkg"]
                .into_iter()
                .collect(),
            color_names: [
                "default", "white", "bold", "black", "darkgray", "red", "green", "yellow", "blue",
                "magenta", "cyan",
            ]
            .into_iter()
            .collect(),
        }
    }
}

/// Scalar settings. Each field corresponds to one directive.
#[derive(Debug, Clone)]
pub struct Params {
    pub prefix: String,
    pub tempdir: String,
    pub package_manager: Option<String>,
    pub num_proc: usize,

    pub require_extension: bool,
    pub full_path: bool,
    pub backup_copies: bool,
    pub syslogging: bool,
    pub ignore_dotfiles: bool,
    pub ignore_dotdirs: bool,
    pub terse: bool,
    pub colorize: bool,
    pub colorize_full_line: bool,
    pub colorize_bright: bool,

    /// Color name per output role (`info`, `warn`, ...).
    pub colors: HashMap<String, String>,

    pub diff_cmd: String,
    pub ping_cmd: String,
    pub ssh_cmd: String,
    pub scp_cmd: String,
    pub rsync_cmd: String,
    pub synctool_cmd: String,
    pub pkg_cmd: String,

    /// Nodes and groups used when no selector is given.
    pub default_nodeset: IndexSet<String>,
    pub ignore_files: IndexSet<String>,
    pub ignore_files_with_wildcards: Vec<String>,
    /// Ignored groups; `ignore_node` lands here too since a node is its own group.
    pub ignore_groups: IndexSet<String>,
    pub master: Option<String>,
    pub slaves: IndexSet<String>,
}

impl Default for Params {
    fn default() -> Self {
        let colors = [
            ("info", "default"),
            ("warn", "magenta"),
            ("error", "red"),
            ("fail", "red"),
            ("sync", "default"),
            ("link", "cyan"),
            ("mkdir", "blue"),
            ("rm", "yellow"),
            ("chown", "cyan"),
            ("chmod", "cyan"),
            ("exec", "green"),
            ("upload", "magenta"),
            ("new", "default"),
            ("type", "magenta"),
            ("dryrun", "default"),
            ("fixing", "default"),
            ("ok", "default"),
        ]
        .into_iter()
        .map(|(role, color)| (role.to_string(), color.to_string()))
        .collect();

        Self {
            prefix: "/opt/fleetsh".to_string(),
            tempdir: "/tmp/fleetsh".to_string(),
            package_manager: None,
            num_proc: 16,
            require_extension: true,
            full_path: false,
            backup_copies: true,
            syslogging: true,
            ignore_dotfiles: false,
            ignore_dotdirs: false,
            terse: false,
            colorize: true,
            colorize_full_line: false,
            colorize_bright: true,
            colors,
            diff_cmd: "diff -u".to_string(),
            ping_cmd: "ping -q -c 1 -t 1".to_string(),
            ssh_cmd: "ssh -o ConnectTimeout=10 -x -q".to_string(),
            scp_cmd: "scp -o ConnectTimeout=10 -p".to_string(),
            rsync_cmd: "rsync -ar --numeric-ids --delete --delete-excluded -q".to_string(),
            synctool_cmd: "/opt/fleetsh/bin/synctool-client".to_string(),
            pkg_cmd: "/opt/fleetsh/bin/synctool-client-pkg".to_string(),
            default_nodeset: ["all".to_string()].into_iter().collect(),
            ignore_files: IndexSet::new(),
            ignore_files_with_wildcards: Vec::new(),
            ignore_groups: IndexSet::new(),
            master: None,
            slaves: IndexSet::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigState {
    pub defaults: Defaults,
    pub params: Params,
    pub symbols: SymbolTable,
    /// Group name to its expanded member groups. Empty means leaf group.
    pub groups: IndexMap<String, Vec<String>>,
    pub nodes: IndexMap<String, NodeDefinition>,
    /// Hostname alias to node name.
    pub hostnames: HashMap<String, String>,
    /// Contents of the first readable `hostid:` file.
    pub host_id: Option<String>,
}

impl ConfigState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_node(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn is_group(&self, name: &str) -> bool {
        name == "all"
            || name == "none"
            || self.groups.contains_key(name)
            || self.nodes.contains_key(name)
    }

    /// The node itself, its expanded groups, and `all`.
    pub fn groups_of(&self, node: &str) -> Vec<String> {
        let mut groups = IndexSet::new();
        groups.insert(node.to_string());
        if let Some(def) = self.nodes.get(node) {
            groups.extend(def.groups.iter().cloned());
        }
        groups.insert("all".to_string());
        groups.into_iter().collect()
    }

    /// Nodes belonging to any of `groups`, in definition order.
    pub fn nodes_in_groups<'a, I>(&self, groups: I) -> IndexSet<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let wanted: HashSet<&str> = groups.into_iter().map(String::as_str).collect();
        if wanted.is_empty() {
            return IndexSet::new();
        }
        self.nodes
            .values()
            .filter(|def| {
                wanted.contains("all")
                    || wanted.contains(def.name.as_str())
                    || def.groups.iter().any(|g| wanted.contains(g.as_str()))
            })
            .map(|def| def.name.clone())
            .collect()
    }

    /// Connection address: the explicit `ipaddress:` or else the node name.
    pub fn address_of<'a>(&'a self, node: &'a str) -> &'a str {
        self.nodes
            .get(node)
            .and_then(|def| def.ipaddress.as_deref())
            .unwrap_or(node)
    }

    /// Whether the node is exempt from file transfer (`rsync:no`).
    pub fn no_rsync(&self, node: &str) -> bool {
        self.nodes.get(node).is_some_and(|def| !def.rsync)
    }

    /// Cross-checks that can only be done once every file has been read.
    pub fn finalize(&self) -> Vec<Diagnostic> {
        let mut diagnostics = vec![];

        let origin_of = |key: &str| self.symbols.get(key).cloned();

        for name in &self.params.default_nodeset {
            if !self.is_node(name) && !self.is_group(name) {
                diagnostics.push(Diagnostic::new(
                    origin_of("default_nodeset"),
                    format!("unknown node or group '{}' in default_nodeset", name),
                ));
            }
        }
        if let Some(master) = &self.params.master {
            if !self.is_node(master) {
                diagnostics.push(Diagnostic::new(
                    origin_of("master"),
                    format!("master node '{}' is not defined", master),
                ));
            }
        }
        for slave in &self.params.slaves {
            if !self.is_node(slave) {
                diagnostics.push(Diagnostic::new(
                    None,
                    format!("slave node '{}' is not defined", slave),
                ));
            }
        }
        diagnostics
    }

    /// Which configured node this host is.
    ///
    /// A host id wins; otherwise the system hostname (full, then short form)
    /// is looked up among hostname aliases and then among node names.
    pub fn local_nodename(&self, system_hostname: &str) -> Option<String> {
        if let Some(host_id) = &self.host_id {
            if let Some(node) = self.hostnames.get(host_id) {
                return Some(node.clone());
            }
            if self.is_node(host_id) {
                return Some(host_id.clone());
            }
        }

        let short = system_hostname.split('.').next().unwrap_or(system_hostname);
        for name in [system_hostname, short] {
            if let Some(node) = self.hostnames.get(name) {
                return Some(node.clone());
            }
        }
        [system_hostname, short]
            .into_iter()
            .find(|name| self.is_node(name))
            .map(str::to_string)
    }
}

/// Best-effort system hostname.
pub fn system_hostname() -> String {
    std::fs::read_to_string("/proc/sys/kernel/hostname")
        .map(|s| s.trim().to_string())
        .ok()
        .filter(|s| !s.is_empty())
        .or_else(|| std::env::var("HOSTNAME").ok())
        .unwrap_or_else(|| "localhost".to_string())
}
