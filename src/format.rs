//! KGTK column conventions: reserved roles, their alias names, and the
//! schema record derived from a header line.

use std::collections::HashMap;
use std::fmt;

use crate::error::{KgtkError, Result};

/// KGTK list separator, used as the default separator for composite keys.
pub const LIST_SEPARATOR: &str = "|";

const NODE1_ALIASES: &[&str] = &["node1", "from", "subject"];
const LABEL_ALIASES: &[&str] = &["label", "predicate", "relation", "relationship"];
const NODE2_ALIASES: &[&str] = &["node2", "to", "object"];
const ID_ALIASES: &[&str] = &["id", "ID"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    Node1,
    Label,
    Node2,
    Id,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Node1, Role::Label, Role::Node2, Role::Id];

    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            Role::Node1 => NODE1_ALIASES,
            Role::Label => LABEL_ALIASES,
            Role::Node2 => NODE2_ALIASES,
            Role::Id => ID_ALIASES,
        }
    }

    pub fn canonical(self) -> &'static str {
        self.aliases()[0]
    }

    /// Role whose alias table contains `name`, if any.
    pub fn of(name: &str) -> Option<Role> {
        Role::ALL
            .into_iter()
            .find(|role| role.aliases().contains(&name))
    }

    fn slot(self) -> usize {
        match self {
            Role::Node1 => 0,
            Role::Label => 1,
            Role::Node2 => 2,
            Role::Id => 3,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchemaKind {
    Edge,
    Node,
    Quasi,
}

/// Position of the first column (in header order) whose name is an alias of `role`.
pub fn resolve_role(column_names: &[String], role: Role) -> Option<usize> {
    column_names
        .iter()
        .position(|name| role.aliases().contains(&name.as_str()))
}

/// Column names of one KGTK file plus the positions of its role columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    names: Vec<String>,
    index: HashMap<String, usize>,
    roles: [Option<usize>; 4],
}

impl Schema {
    /// Validates a header: names must be non-empty and unique.
    pub fn new(file: &str, names: Vec<String>) -> Result<Self> {
        let mut index = HashMap::with_capacity(names.len());
        for (position, name) in names.iter().enumerate() {
            if name.trim().is_empty() {
                return Err(KgtkError::EmptyColumnName {
                    file: file.to_string(),
                    position: position + 1,
                });
            }
            if index.insert(name.clone(), position).is_some() {
                return Err(KgtkError::DuplicateColumn {
                    file: file.to_string(),
                    name: name.clone(),
                });
            }
        }

        let mut roles = [None; 4];
        for role in Role::ALL {
            roles[role.slot()] = resolve_role(&names, role);
        }

        Ok(Schema {
            names,
            index,
            roles,
        })
    }

    #[cfg(test)]
    pub fn from_names<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Schema::new("<schema>", names.into_iter().map(Into::into).collect())
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Column holding `role`. An override name bypasses the alias table and
    /// must match a column verbatim.
    pub fn role_index(&self, role: Role, override_name: Option<&str>) -> Option<usize> {
        match override_name {
            Some(name) => self.index_of(name),
            None => self.roles[role.slot()],
        }
    }

    /// Role carried by column `idx`, if it is one of this schema's role columns.
    pub fn role_at(&self, idx: usize) -> Option<Role> {
        Role::ALL
            .into_iter()
            .find(|role| self.roles[role.slot()] == Some(idx))
    }

    pub fn kind(&self) -> SchemaKind {
        if self.roles[Role::Node1.slot()].is_some() {
            SchemaKind::Edge
        } else if self.roles[Role::Id.slot()].is_some() {
            SchemaKind::Node
        } else {
            SchemaKind::Quasi
        }
    }

    pub fn is_edge(&self) -> bool {
        self.kind() == SchemaKind::Edge
    }

    pub fn is_node(&self) -> bool {
        self.kind() == SchemaKind::Node
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn resolves_aliases_first_match_wins() {
        let cols = names(&["subject", "predicate", "object", "node1"]);
        assert_eq!(resolve_role(&cols, Role::Node1), Some(0));
        assert_eq!(resolve_role(&cols, Role::Label), Some(1));
        assert_eq!(resolve_role(&cols, Role::Node2), Some(2));
        assert_eq!(resolve_role(&cols, Role::Id), None);
    }

    #[test]
    fn classifies_edge_node_and_quasi() {
        let kind = |cols: &[&str]| Schema::from_names(cols.iter().copied()).unwrap().kind();
        assert_eq!(kind(&["node1", "label", "node2"]), SchemaKind::Edge);
        assert_eq!(kind(&["id", "name"]), SchemaKind::Node);
        assert_eq!(kind(&["a", "b"]), SchemaKind::Quasi);
        assert_eq!(kind(&["from", "ID"]), SchemaKind::Edge);
    }

    #[test]
    fn schema_rejects_duplicates_and_blanks() {
        assert!(matches!(
            Schema::from_names(["id", "id"]),
            Err(KgtkError::DuplicateColumn { .. })
        ));
        assert!(matches!(
            Schema::from_names(["id", " "]),
            Err(KgtkError::EmptyColumnName { position: 2, .. })
        ));
    }

    #[test]
    fn role_override_must_match_verbatim() {
        let schema = Schema::from_names(["from", "label", "to", "weight"]).unwrap();
        assert_eq!(schema.role_index(Role::Node1, None), Some(0));
        assert_eq!(schema.role_index(Role::Node1, Some("weight")), Some(3));
        assert_eq!(schema.role_index(Role::Node1, Some("node1")), None);
        assert_eq!(schema.role_at(2), Some(Role::Node2));
        assert_eq!(schema.role_at(3), None);
    }

    #[test]
    fn role_of_uses_alias_table() {
        assert_eq!(Role::of("relationship"), Some(Role::Label));
        assert_eq!(Role::of("ID"), Some(Role::Id));
        assert_eq!(Role::of("Id"), None);
    }
}
