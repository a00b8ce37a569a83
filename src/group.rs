//! Compound group expansion and name validation.

use std::sync::LazyLock;

use indexmap::IndexSet;
use regex::Regex;

use crate::error::ExpandError;
use crate::state::ConfigState;

// Alphanumeric segments joined by a single `_`, `-` or `+`.
// Valid: node1 node1-10 node_10_0_0_2 node1+node2
static SPELLCHECK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9]+([_\-+][a-zA-Z0-9]+)*$").expect("valid regex"));

/// Whether `name` is a valid node or group name.
pub fn spellcheck(name: &str) -> bool {
    SPELLCHECK.is_match(name)
}

/// Expands a list of (compound) group names.
///
/// Every token is kept, followed by the already expanded members of the group
/// it names. Unknown names become new leaf groups, so a group can be
/// referenced before it gets members of its own. Node names are rejected.
/// Duplicates are dropped keeping the first occurrence.
pub fn expand_grouplist(
    state: &mut ConfigState,
    tokens: &[String],
) -> Result<Vec<String>, ExpandError> {
    if let Some(node) = tokens
        .iter()
        .find(|t| !state.groups.contains_key(*t) && state.is_node(t))
    {
        return Err(ExpandError::NodeInGroupList(node.clone()));
    }

    let mut expanded = IndexSet::new();
    for token in tokens {
        expanded.insert(token.clone());
        match state.groups.get(token) {
            Some(members) => expanded.extend(members.iter().cloned()),
            None => {
                state.groups.insert(token.clone(), vec![]);
            }
        }
    }
    Ok(expanded.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeDefinition;

    fn strings(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_spellcheck() {
        for good in ["node1", "node1-10", "node_10_0_0_2", "node1+node2", "A"] {
            assert!(spellcheck(good), "{good}");
        }
        for bad in ["", "-node", "node-", "node--1", "node.1", "no de", "node_"] {
            assert!(!spellcheck(bad), "{bad}");
        }
    }

    #[test]
    fn test_unknown_groups_become_leaves() {
        let mut state = ConfigState::new();
        let expanded = expand_grouplist(&mut state, &strings(&["web", "db"])).unwrap();
        assert_eq!(expanded, strings(&["web", "db"]));
        assert_eq!(state.groups.get("web"), Some(&vec![]));
        assert_eq!(state.groups.get("db"), Some(&vec![]));
    }

    #[test]
    fn test_compound_expansion_keeps_order_and_dedups() {
        let mut state = ConfigState::new();
        state.groups.insert("b".into(), strings(&["d"]));
        state.groups.insert("d".into(), vec![]);
        let expanded = expand_grouplist(&mut state, &strings(&["b", "c", "d", "b"])).unwrap();
        assert_eq!(expanded, strings(&["b", "d", "c"]));
    }

    #[test]
    fn test_expansion_is_idempotent() {
        let mut state = ConfigState::new();
        let inner = expand_grouplist(&mut state, &strings(&["x", "y"])).unwrap();
        state.groups.insert("b".into(), inner);
        let outer = expand_grouplist(&mut state, &strings(&["b", "z"])).unwrap();
        state.groups.insert("a".into(), outer);

        let once = expand_grouplist(&mut state, &strings(&["a", "q"])).unwrap();
        let twice = expand_grouplist(&mut state, &once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_node_names_rejected_without_side_effects() {
        let mut state = ConfigState::new();
        state.nodes.insert("n1".into(), NodeDefinition::new("n1"));
        let err = expand_grouplist(&mut state, &strings(&["fresh", "n1"])).unwrap_err();
        assert_eq!(err, ExpandError::NodeInGroupList("n1".into()));
        assert!(!state.groups.contains_key("fresh"));
    }
}
