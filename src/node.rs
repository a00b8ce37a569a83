//! Node definitions and their connection specifiers.
//!
//! A node line ends with optional `key:value` tokens:
//!
//! ```text
//! node web1 web prod ipaddress:10.0.0.1 hostname:web1.example.com rsync:no
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::SpecifierError;
use crate::state::ConfigState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeDefinition {
    pub name: String,
    /// Expanded group memberships, in order.
    pub groups: Vec<String>,
    pub ipaddress: Option<String>,
    pub hostname: Option<String>,
    /// `false` when the node is exempt from file transfer.
    pub rsync: bool,
}

impl NodeDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            groups: vec![],
            ipaddress: None,
            hostname: None,
            rsync: true,
        }
    }
}

/// Connection attributes parsed from the specifier tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSpecifiers {
    pub ipaddress: Option<String>,
    pub hostname: Option<String>,
    pub host_id: Option<String>,
    pub rsync: bool,
}

impl Default for NodeSpecifiers {
    fn default() -> Self {
        Self {
            ipaddress: None,
            hostname: None,
            host_id: None,
            rsync: true,
        }
    }
}

/// Splits the tokens after the node name into group tokens and the trailing
/// run of tokens containing a colon.
pub fn split_specifiers(tokens: &[String]) -> (&[String], &[String]) {
    let groups_len = tokens
        .iter()
        .rposition(|t| !t.contains(':'))
        .map_or(0, |i| i + 1);
    tokens.split_at(groups_len)
}

/// Parses specifier tokens for `node`, last token first.
pub fn parse_specifiers(
    state: &ConfigState,
    node: &str,
    tokens: &[String],
) -> Result<NodeSpecifiers, SpecifierError> {
    let mut specs = NodeSpecifiers::default();

    for token in tokens.iter().rev() {
        let (key, arg) = match token.split_once(':') {
            Some(("", _)) | None => return Err(SpecifierError::Syntax(token.clone())),
            Some(pair) => pair,
        };

        match key {
            "ipaddress" => {
                if specs.ipaddress.is_some() {
                    return Err(SpecifierError::IpAddressRedefined(node.to_string()));
                }
                if arg.is_empty() {
                    return Err(SpecifierError::MissingArgument(key.to_string()));
                }
                if let Some(other) = state
                    .nodes
                    .values()
                    .find(|def| def.ipaddress.as_deref() == Some(arg))
                {
                    return Err(SpecifierError::IpAddressInUse {
                        address: arg.to_string(),
                        node: other.name.clone(),
                    });
                }
                specs.ipaddress = Some(arg.to_string());
            }
            "hostname" => {
                if arg.is_empty() {
                    return Err(SpecifierError::MissingArgument(key.to_string()));
                }
                if let Some(other) = state.hostnames.get(arg) {
                    return Err(SpecifierError::HostnameInUse {
                        alias: arg.to_string(),
                        node: other.clone(),
                    });
                }
                if specs.hostname.is_some() {
                    return Err(SpecifierError::HostnameRedefined(node.to_string()));
                }
                specs.hostname = Some(arg.to_string());
            }
            "hostid" => {
                // Only the host the file belongs to has it; elsewhere this is a no-op.
                if let Some(host_id) = read_host_id(Path::new(arg)) {
                    specs.host_id = Some(host_id);
                }
            }
            "rsync" => match arg {
                "" => return Err(SpecifierError::MissingArgument(key.to_string())),
                "yes" => specs.rsync = true,
                "no" => specs.rsync = false,
                _ => return Err(SpecifierError::RsyncValue),
            },
            _ => return Err(SpecifierError::Unknown(key.to_string())),
        }
    }
    Ok(specs)
}

/// First line of `path`, trimmed. `None` if unreadable or blank.
fn read_host_id(path: &Path) -> Option<String> {
    let file = File::open(path).ok()?;
    let mut line = String::new();
    BufReader::new(file).read_line(&mut line).ok()?;
    let host_id = line.trim();
    (!host_id.is_empty()).then(|| host_id.to_string())
}
