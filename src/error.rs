use thiserror::Error;

use crate::symbol::Origin;

#[derive(Error, Debug)]
pub enum FleetError {
    #[error("{path}: {errors} error(s) in configuration")]
    Config { path: String, errors: usize },
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("{param}: unbalanced quotes in '{line}'")]
    Quoting { param: String, line: String },
    #[error("{param}: no such command '{command}'")]
    CommandNotFound { param: String, command: String },
    #[error("Failed to execute command: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("Empty command line")]
    EmptyCommand,
}

/// Selector names that do not exist in the configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("no such node '{0}'")]
    UnknownNode(String),
    #[error("no such group '{0}'")]
    UnknownGroup(String),
    #[error("no valid nodes specified")]
    NoValidNodes,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExpandError {
    #[error("node {0} can not be part of compound group list")]
    NodeInGroupList(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("redefinition of {what}")]
pub struct SymbolError {
    pub what: String,
    pub original: Origin,
}

/// Problems with the trailing `key:value` tokens of a `node` directive.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpecifierError {
    #[error("syntax error in node specifier '{0}'")]
    Syntax(String),
    #[error("missing argument to node specifier '{0}'")]
    MissingArgument(String),
    #[error("redefinition of IP address for node {0}")]
    IpAddressRedefined(String),
    #[error("IP address {address} already in use for node {node}")]
    IpAddressInUse { address: String, node: String },
    #[error("redefinition of hostname for node {0}")]
    HostnameRedefined(String),
    #[error("hostname {alias} already in use for node {node}")]
    HostnameInUse { alias: String, node: String },
    #[error("node specifier 'rsync' can have value 'yes' or 'no'")]
    RsyncValue,
    #[error("unknown node specifier {0}")]
    Unknown(String),
}
