//! `join`: concatenating join of two KGTK files on their key columns.
//!
//! Left rows and then right rows are written under one merged schema. Which
//! rows survive depends on the join kind:
//!
//! | flags                        | key set            |
//! |------------------------------|--------------------|
//! | neither                      | left ∩ right       |
//! | `--left-join`                | left               |
//! | `--right-join`               | right              |
//! | `--left-join --right-join`   | none, all rows pass |

use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::{debug, info};

use crate::common::{ColumnSelector, ReaderArgs, WriterArgs, ensure_single_stdio, parse_selector_args};
use crate::error::KgtkError;
use crate::format::{LIST_SEPARATOR, Schema};
use crate::key::{ImplicitKey, KeySpec, check_key_counts, resolve_key_columns};
use crate::merge::{ColumnMerger, ShuffleList, build_shuffle_list};
use crate::reader::ReplayableInput;
use crate::writer::{KgtkWriter, RowSink};

#[derive(Args, Debug)]
pub struct JoinArgs {
    /// Left KGTK file (use '-' for stdin)
    #[arg(value_name = "LEFT")]
    pub left: PathBuf,

    /// Right KGTK file (use '-' for stdin)
    #[arg(value_name = "RIGHT")]
    pub right: PathBuf,

    /// Output file
    #[arg(
        short = 'o',
        long = "output-file",
        value_name = "FILE",
        default_value = "-"
    )]
    pub output: PathBuf,

    /// Key columns of the left file (names, aliases, or 1-based positions)
    #[arg(long = "left-file-join-columns", value_name = "COLS", num_args = 1..)]
    pub left_columns: Vec<String>,

    /// Key columns of the right file (names, aliases, or 1-based positions)
    #[arg(long = "right-file-join-columns", value_name = "COLS", num_args = 1..)]
    pub right_columns: Vec<String>,

    /// Extend the default edge-file key with the label column
    #[arg(long = "join-on-label")]
    pub join_on_label: bool,

    /// Extend the default edge-file key with the node2 column
    #[arg(long = "join-on-node2")]
    pub join_on_node2: bool,

    /// Keep every left row
    #[arg(long = "left-join")]
    pub left_join: bool,

    /// Keep every right row
    #[arg(long = "right-join")]
    pub right_join: bool,

    /// Prefix for non-key left columns
    #[arg(long = "left-prefix", value_name = "PREFIX")]
    pub left_prefix: Option<String>,

    /// Prefix for non-key right columns
    #[arg(long = "right-prefix", value_name = "PREFIX")]
    pub right_prefix: Option<String>,

    /// Separator placed between the fields of a multi-column key
    #[arg(long = "field-separator", value_name = "SEP", default_value = LIST_SEPARATOR)]
    pub field_separator: String,

    #[command(flatten)]
    pub reader: ReaderArgs,

    #[command(flatten)]
    pub writer: WriterArgs,
}

#[derive(Clone, Debug)]
pub struct JoinConfig {
    pub left_join: bool,
    pub right_join: bool,
    pub implicit: ImplicitKey,
    pub left_prefix: Option<String>,
    pub right_prefix: Option<String>,
    pub field_separator: String,
}

impl Default for JoinConfig {
    fn default() -> Self {
        JoinConfig {
            left_join: false,
            right_join: false,
            implicit: ImplicitKey::default(),
            left_prefix: None,
            right_prefix: None,
            field_separator: LIST_SEPARATOR.to_string(),
        }
    }
}

impl JoinConfig {
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.field_separator.is_empty() {
            return Err(KgtkError::config("field separator must not be empty"));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct JoinCounts {
    pub left: u64,
    pub right: u64,
}

/// One side of a join with its resolved key and placement in the merged schema.
struct JoinSide {
    input: ReplayableInput,
    key: KeySpec,
    shuffle: ShuffleList,
}

impl JoinSide {
    fn new(
        input: ReplayableInput,
        selectors: &[ColumnSelector],
        config: &JoinConfig,
    ) -> crate::error::Result<Self> {
        let columns =
            resolve_key_columns(input.schema(), input.label(), selectors, config.implicit)?;
        Ok(JoinSide {
            input,
            key: KeySpec::new(columns, config.field_separator.as_str()),
            shuffle: ShuffleList::new(),
        })
    }

    /// Reads every key of this side. Consumes one pass.
    fn key_set(&mut self) -> crate::error::Result<HashSet<String>> {
        let mut keys = HashSet::new();
        for row in self.input.rows()? {
            keys.insert(self.key.key(&row?)?.into_owned());
        }
        debug!(file = self.input.label(), keys = keys.len(), "collected join keys");
        Ok(keys)
    }

    fn emit(
        &mut self,
        keys: Option<&HashSet<String>>,
        sink: &mut dyn RowSink,
    ) -> crate::error::Result<u64> {
        let mut written = 0;
        for row in self.input.rows()? {
            let row = row?;
            if let Some(keys) = keys {
                if !keys.contains(self.key.key(&row)?.as_ref()) {
                    continue;
                }
            }
            sink.write(&row, Some(self.shuffle.as_slice()))?;
            written += 1;
        }
        Ok(written)
    }
}

/// Computes the set of keys whose rows survive the join, or `None` when
/// every row passes.
pub fn join_key_set(
    config: &JoinConfig,
    left: &mut impl FnMut() -> crate::error::Result<HashSet<String>>,
    right: &mut impl FnMut() -> crate::error::Result<HashSet<String>>,
) -> crate::error::Result<Option<HashSet<String>>> {
    match (config.left_join, config.right_join) {
        (true, true) => Ok(None),
        (true, false) => left().map(Some),
        (false, true) => right().map(Some),
        (false, false) => {
            let left_keys = left()?;
            let right_keys = right()?;
            Ok(Some(
                left_keys
                    .into_iter()
                    .filter(|key| right_keys.contains(key))
                    .collect(),
            ))
        }
    }
}

pub struct Joiner {
    config: JoinConfig,
    left: JoinSide,
    right: JoinSide,
    columns: Vec<String>,
}

impl Joiner {
    /// Resolves keys on both sides and builds the merged schema. Fails before
    /// any data row is read when the sides cannot be joined.
    pub fn new(
        config: JoinConfig,
        left: ReplayableInput,
        right: ReplayableInput,
        left_selectors: &[ColumnSelector],
        right_selectors: &[ColumnSelector],
    ) -> crate::error::Result<Self> {
        config.validate()?;
        check_joinable(left.schema(), left.label(), right.schema(), right.label())?;

        let mut left = JoinSide::new(left, left_selectors, &config)?;
        let mut right = JoinSide::new(right, right_selectors, &config)?;
        check_key_counts(&left.key, &right.key)?;

        let mut merger = ColumnMerger::new();
        let left_names = merger.merge(left.input.schema(), config.left_prefix.as_deref())?;
        let right_names = merger.merge(right.input.schema(), config.right_prefix.as_deref())?;
        let columns = merger.names();

        left.shuffle = build_shuffle_list(&columns, &left_names);
        right.shuffle = build_shuffle_list(&columns, &right_names);

        Ok(Joiner {
            config,
            left,
            right,
            columns,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Writes the surviving left rows, then the surviving right rows.
    pub fn run(self, sink: &mut dyn RowSink) -> crate::error::Result<JoinCounts> {
        let Joiner {
            config,
            mut left,
            mut right,
            ..
        } = self;
        let keys = join_key_set(&config, &mut || left.key_set(), &mut || right.key_set())?;
        if let Some(keys) = &keys {
            info!(keys = keys.len(), "joining on key set");
        } else {
            info!("outer join, every row passes");
        }

        let counts = JoinCounts {
            left: left.emit(keys.as_ref(), sink)?,
            right: right.emit(keys.as_ref(), sink)?,
        };
        info!(left = counts.left, right = counts.right, "join complete");
        Ok(counts)
    }
}

fn check_joinable(
    left: &Schema,
    left_label: &str,
    right: &Schema,
    right_label: &str,
) -> crate::error::Result<()> {
    if (left.is_edge() && right.is_node()) || (left.is_node() && right.is_edge()) {
        return Err(KgtkError::config(format!(
            "cannot join {:?} file {} with {:?} file {}",
            left.kind(),
            left_label,
            right.kind(),
            right_label
        )));
    }
    Ok(())
}

pub fn run(args: JoinArgs) -> Result<()> {
    ensure_single_stdio([args.left.as_path(), args.right.as_path()], "input")?;

    let config = JoinConfig {
        left_join: args.left_join,
        right_join: args.right_join,
        implicit: ImplicitKey {
            label: args.join_on_label,
            node2: args.join_on_node2,
        },
        left_prefix: args.left_prefix,
        right_prefix: args.right_prefix,
        field_separator: args.field_separator,
    };
    let reader_options = args.reader.to_options()?;
    let left = ReplayableInput::open(&args.left, reader_options)
        .with_context(|| format!("failed to open left input {}", args.left.display()))?;
    let right = ReplayableInput::open(&args.right, reader_options)
        .with_context(|| format!("failed to open right input {}", args.right.display()))?;

    let joiner = Joiner::new(
        config,
        left,
        right,
        &parse_selector_args(&args.left_columns)?,
        &parse_selector_args(&args.right_columns)?,
    )?;
    let mut writer = KgtkWriter::create(
        &args.output,
        joiner.columns().to_vec(),
        args.writer.to_options(),
    )?;
    joiner.run(&mut writer)?;
    writer.close()?;
    Ok(())
}
