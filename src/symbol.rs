//! Symbol table of everything the configuration defines.
//!
//! Parameters are keyed by their keyword, nodes and groups by `node <name>`
//! and `group <name>`. A key is inserted at most once; later definitions are
//! rejected and point back at the first one.

use std::fmt;

use indexmap::IndexMap;

use crate::error::SymbolError;

/// Where a directive was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub file: String,
    pub line: usize,
}

impl Origin {
    pub fn new(file: impl Into<String>, line: usize) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

#[derive(Debug, Default, Clone)]
pub struct SymbolTable {
    symbols: IndexMap<String, Origin>,
}

impl SymbolTable {
    pub fn node_key(name: &str) -> String {
        format!("node {}", name)
    }

    pub fn group_key(name: &str) -> String {
        format!("group {}", name)
    }

    /// Fails if `key` was defined before. Never mutates the table.
    pub fn check(&self, key: &str) -> Result<(), SymbolError> {
        match self.symbols.get(key) {
            Some(original) => Err(SymbolError {
                what: describe(key),
                original: original.clone(),
            }),
            None => Ok(()),
        }
    }

    pub fn define(&mut self, key: &str, origin: &Origin) -> Result<(), SymbolError> {
        self.check(key)?;
        self.symbols.insert(key.to_string(), origin.clone());
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Origin> {
        self.symbols.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.symbols.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.symbols.keys().map(String::as_str)
    }
}

fn describe(key: &str) -> String {
    if let Some(name) = key.strip_prefix("node ") {
        format!("node '{}'", name)
    } else if let Some(name) = key.strip_prefix("group ") {
        format!("group '{}'", name)
    } else {
        format!("'{}'", key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_define_once() {
        let mut table = SymbolTable::default();
        let first = Origin::new("a.conf", 3);
        table.define("ssh_cmd", &first).unwrap();

        let err = table.define("ssh_cmd", &Origin::new("b.conf", 9)).unwrap_err();
        assert_eq!(err.original, first);
        assert_eq!(err.to_string(), "redefinition of 'ssh_cmd'");
        assert_eq!(table.get("ssh_cmd"), Some(&first));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_node_and_group_keys_are_distinct() {
        let mut table = SymbolTable::default();
        let origin = Origin::new("x.conf", 1);
        table.define(&SymbolTable::node_key("web"), &origin).unwrap();
        table.define(&SymbolTable::group_key("web"), &origin).unwrap();

        let err = table.check(&SymbolTable::node_key("web")).unwrap_err();
        assert_eq!(err.to_string(), "redefinition of node 'web'");
    }

    #[test]
    fn test_origin_display() {
        assert_eq!(Origin::new("etc/fleet.conf", 12).to_string(), "etc/fleet.conf:12");
    }
}
