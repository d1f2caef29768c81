//! Key columns and composite key construction.

use std::borrow::Cow;

use crate::common::ColumnSelector;
use crate::error::{KgtkError, Result};
use crate::format::{Role, Schema, SchemaKind};

/// Extra role columns appended to the default edge-file key.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImplicitKey {
    pub label: bool,
    pub node2: bool,
}

/// Resolves one selector. Names match verbatim first; a role alias that is
/// not itself a header falls back to the schema's column for that role.
pub fn resolve_column(schema: &Schema, selector: &ColumnSelector) -> Option<usize> {
    match selector {
        ColumnSelector::Index(idx) => (*idx < schema.len()).then_some(*idx),
        ColumnSelector::Name(name) => schema
            .index_of(name)
            .or_else(|| Role::of(name).and_then(|role| schema.role_index(role, None))),
    }
}

pub fn resolve_key_columns(
    schema: &Schema,
    file: &str,
    explicit: &[ColumnSelector],
    implicit: ImplicitKey,
) -> Result<Vec<usize>> {
    if !explicit.is_empty() {
        return explicit
            .iter()
            .map(|selector| {
                resolve_column(schema, selector).ok_or_else(|| KgtkError::MissingKeyColumn {
                    file: file.to_string(),
                    column: match selector {
                        ColumnSelector::Index(idx) => format!("#{}", idx + 1),
                        ColumnSelector::Name(name) => name.clone(),
                    },
                })
            })
            .collect();
    }

    let required = |role: Role| {
        schema
            .role_index(role, None)
            .ok_or_else(|| KgtkError::MissingKeyColumn {
                file: file.to_string(),
                column: role.canonical().to_string(),
            })
    };

    match schema.kind() {
        SchemaKind::Edge => {
            let mut columns = vec![required(Role::Node1)?];
            if implicit.label {
                columns.push(required(Role::Label)?);
            }
            if implicit.node2 {
                columns.push(required(Role::Node2)?);
            }
            Ok(columns)
        }
        SchemaKind::Node => Ok(vec![required(Role::Id)?]),
        SchemaKind::Quasi => Err(KgtkError::config(format!(
            "{}: key columns must be given explicitly for a file without node1 or id columns",
            file
        ))),
    }
}

/// Builds the lookup key for a row. A single key column is returned
/// borrowed; several are joined with `separator`. Separators inside field
/// values are not escaped.
pub fn build_key<'a>(row: &'a [String], key_columns: &[usize], separator: &str) -> Result<Cow<'a, str>> {
    let field = |idx: usize| {
        row.get(idx)
            .map(String::as_str)
            .ok_or(KgtkError::KeyIndex {
                index: idx,
                width: row.len(),
            })
    };

    if let [only] = key_columns {
        return Ok(Cow::Borrowed(field(*only)?));
    }

    let mut key = String::new();
    for (position, &idx) in key_columns.iter().enumerate() {
        if position > 0 {
            key.push_str(separator);
        }
        key.push_str(field(idx)?);
    }
    Ok(Cow::Owned(key))
}

/// Resolved key columns of one input together with the key separator.
#[derive(Debug, Clone)]
pub struct KeySpec {
    columns: Vec<usize>,
    separator: String,
}

impl KeySpec {
    pub fn new(columns: Vec<usize>, separator: impl Into<String>) -> Self {
        KeySpec {
            columns,
            separator: separator.into(),
        }
    }

    pub fn columns(&self) -> &[usize] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn key<'a>(&self, row: &'a [String]) -> Result<Cow<'a, str>> {
        build_key(row, &self.columns, &self.separator)
    }
}

pub fn check_key_counts(input: &KeySpec, filter: &KeySpec) -> Result<()> {
    if input.len() != filter.len() {
        return Err(KgtkError::KeyCountMismatch {
            input: input.len(),
            filter: filter.len(),
        });
    }
    Ok(())
}
