//! Column-space merging for joined outputs.
//!
//! Role columns (node1/label/node2/id) of every merged schema collapse into
//! one output column named after the first schema that supplied the role.
//! Other columns are optionally prefixed and appended; a name that is
//! already present is an error, since the two columns would share one slot.

use std::collections::HashMap;

use indexmap::IndexSet;

use crate::error::{KgtkError, Result};
use crate::format::{Role, Schema};

/// Maps each source column to a target position; `None` drops the column.
pub type ShuffleList = Vec<Option<usize>>;

#[derive(Debug, Default, Clone)]
pub struct ColumnMerger {
    names: IndexSet<String>,
    roles: HashMap<Role, usize>,
}

impl ColumnMerger {
    pub fn new() -> Self {
        ColumnMerger::default()
    }

    /// Adds `schema` to the merged column space and returns the merged name
    /// of each of its columns, in source order.
    pub fn merge(&mut self, schema: &Schema, prefix: Option<&str>) -> Result<Vec<String>> {
        let mut mapped = Vec::with_capacity(schema.len());
        for (idx, name) in schema.names().iter().enumerate() {
            let merged = match schema.role_at(idx) {
                Some(role) => match self.roles.get(&role) {
                    Some(&position) => self.names[position].clone(),
                    None => {
                        let (position, _) = self.names.insert_full(name.clone());
                        self.roles.insert(role, position);
                        name.clone()
                    }
                },
                None => {
                    let merged = match prefix {
                        Some(prefix) => format!("{}{}", prefix, name),
                        None => name.clone(),
                    };
                    if !self.names.insert(merged.clone()) {
                        return Err(KgtkError::config(format!(
                            "column '{}' appears in more than one input; give a prefix to keep both",
                            merged
                        )));
                    }
                    merged
                }
            };
            mapped.push(merged);
        }
        Ok(mapped)
    }

    pub fn names(&self) -> Vec<String> {
        self.names.iter().cloned().collect()
    }
}

pub fn build_shuffle_list(target: &[String], source_names: &[String]) -> ShuffleList {
    let positions: HashMap<&str, usize> = target
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.as_str(), idx))
        .collect();
    source_names
        .iter()
        .map(|name| positions.get(name.as_str()).copied())
        .collect()
}

/// Places `row`'s fields into a blank row of `width` fields.
pub fn shuffle_row(row: &[String], shuffle: &[Option<usize>], width: usize) -> Vec<String> {
    let mut out = vec![String::new(); width];
    place_fields(&mut out, row, shuffle);
    out
}

fn place_fields(out: &mut [String], row: &[String], shuffle: &[Option<usize>]) {
    for (field, slot) in row.iter().zip(shuffle) {
        if let Some(target) = slot.and_then(|idx| out.get_mut(idx)) {
            target.clone_from(field);
        }
    }
}

/// Output layout for rows that combine an input row with a filter row.
#[derive(Debug, Clone)]
pub struct JoinLayout {
    columns: Vec<String>,
    input_shuffle: ShuffleList,
    filter_shuffle: ShuffleList,
    filter_first: bool,
}

impl JoinLayout {
    pub fn new(
        input: &Schema,
        filter: &Schema,
        input_prefix: Option<&str>,
        filter_prefix: Option<&str>,
        filter_first: bool,
    ) -> Result<Self> {
        let mut merger = ColumnMerger::new();
        let (input_names, filter_names) = if filter_first {
            let filter_names = merger.merge(filter, filter_prefix)?;
            (merger.merge(input, input_prefix)?, filter_names)
        } else {
            let input_names = merger.merge(input, input_prefix)?;
            (input_names, merger.merge(filter, filter_prefix)?)
        };
        let columns = merger.names();
        Ok(JoinLayout {
            input_shuffle: build_shuffle_list(&columns, &input_names),
            filter_shuffle: build_shuffle_list(&columns, &filter_names),
            columns,
            filter_first,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Combines the two sides into one row. Missing sides leave their
    /// columns blank; on shared role columns the side merged first wins.
    pub fn merge_rows(&self, input: Option<&[String]>, filter: Option<&[String]>) -> Vec<String> {
        let mut out = vec![String::new(); self.columns.len()];
        let input = input.map(|row| (row, &self.input_shuffle));
        let filter = filter.map(|row| (row, &self.filter_shuffle));
        let (first, second) = if self.filter_first {
            (filter, input)
        } else {
            (input, filter)
        };
        for (row, shuffle) in second.into_iter().chain(first) {
            place_fields(&mut out, row, shuffle);
        }
        out
    }
}
