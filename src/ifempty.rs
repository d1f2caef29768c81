//! `ifempty` / `ifnotempty`: keep rows by the emptiness of selected columns.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Args;
use tracing::info;

use crate::common::{ColumnSelector, ReaderArgs, WriterArgs, ensure_single_stdio, parse_selector_args};
use crate::error::KgtkError;
use crate::format::Schema;
use crate::key::resolve_column;
use crate::reader::KgtkReader;
use crate::writer::{KgtkWriter, RowSink};

#[derive(Args, Debug)]
pub struct EmptyArgs {
    /// Input KGTK file (use '-' for stdin)
    #[arg(value_name = "INPUT", default_value = "-")]
    pub input: PathBuf,

    /// Columns to test (names, aliases, or 1-based positions)
    #[arg(long = "columns", value_name = "COLS", num_args = 1.., required = true)]
    pub columns: Vec<String>,

    /// Test whether any column is empty instead of all of them
    #[arg(long = "any")]
    pub any: bool,

    /// Destination for kept rows
    #[arg(
        short = 'o',
        long = "output-file",
        value_name = "FILE",
        default_value = "-"
    )]
    pub output: PathBuf,

    /// Destination for the remaining rows
    #[arg(long = "reject-file", value_name = "FILE")]
    pub reject_file: Option<PathBuf>,

    #[command(flatten)]
    pub reader: ReaderArgs,

    #[command(flatten)]
    pub writer: WriterArgs,
}

#[derive(Clone, Debug)]
pub struct EmptyTestConfig {
    pub columns: Vec<usize>,
    pub any: bool,
    /// Keep rows that fail the emptiness test.
    pub invert: bool,
}

impl EmptyTestConfig {
    pub fn resolve(
        schema: &Schema,
        file: &str,
        selectors: &[ColumnSelector],
        any: bool,
        invert: bool,
    ) -> crate::error::Result<Self> {
        if selectors.is_empty() {
            return Err(KgtkError::config("at least one column must be tested"));
        }
        let columns = selectors
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
            .collect::<crate::error::Result<Vec<_>>>()?;
        Ok(EmptyTestConfig {
            columns,
            any,
            invert,
        })
    }

    pub fn keeps(&self, row: &[String]) -> bool {
        let empty = |idx: &usize| row.get(*idx).is_none_or(|field| field.trim().is_empty());
        let matched = if self.any {
            self.columns.iter().any(empty)
        } else {
            self.columns.iter().all(empty)
        };
        matched != self.invert
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EmptyCounts {
    pub kept: u64,
    pub rejected: u64,
}

pub fn filter_rows<I>(
    config: &EmptyTestConfig,
    rows: I,
    kept: &mut dyn RowSink,
    mut rejected: Option<&mut dyn RowSink>,
) -> crate::error::Result<EmptyCounts>
where
    I: IntoIterator<Item = crate::error::Result<Vec<String>>>,
{
    let mut counts = EmptyCounts::default();
    for row in rows {
        let row = row?;
        if config.keeps(&row) {
            kept.write(&row, None)?;
            counts.kept += 1;
        } else {
            if let Some(sink) = rejected.as_mut() {
                sink.write(&row, None)?;
            }
            counts.rejected += 1;
        }
    }
    Ok(counts)
}

pub fn run_ifempty(args: EmptyArgs) -> Result<()> {
    run(args, false)
}

pub fn run_ifnotempty(args: EmptyArgs) -> Result<()> {
    run(args, true)
}

fn run(args: EmptyArgs, invert: bool) -> Result<()> {
    if args.reject_file.as_deref() == Some(args.output.as_path()) {
        bail!("--reject-file must differ from the output file");
    }
    ensure_single_stdio(
        [Some(args.output.as_path()), args.reject_file.as_deref()]
            .into_iter()
            .flatten(),
        "output",
    )?;

    let reader = KgtkReader::open(&args.input, args.reader.to_options()?)?;
    let config = EmptyTestConfig::resolve(
        reader.schema(),
        reader.label(),
        &parse_selector_args(&args.columns)?,
        args.any,
        invert,
    )
    .with_context(|| format!("invalid columns for {}", args.input.display()))?;

    let writer_options = args.writer.to_options();
    let columns = reader.schema().names().to_vec();
    let mut kept = KgtkWriter::create(&args.output, columns.clone(), writer_options)?;
    let mut rejected = match &args.reject_file {
        Some(path) => Some(KgtkWriter::create(path, columns, writer_options)?),
        None => None,
    };

    let counts = filter_rows(
        &config,
        reader,
        &mut kept,
        rejected.as_mut().map(|w| w as &mut dyn RowSink),
    )?;
    info!(kept = counts.kept, rejected = counts.rejected, "emptiness test complete");

    kept.close()?;
    if let Some(writer) = rejected {
        writer.close()?;
    }
    Ok(())
}
