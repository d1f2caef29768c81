pub mod engine;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Args;
use tracing::debug;

use crate::common::{ReaderArgs, WriterArgs, ensure_single_stdio, parse_selector_args};
use crate::format::{LIST_SEPARATOR, Schema};
use crate::key::ImplicitKey;
use crate::reader::KgtkReader;
use crate::writer::{KgtkWriter, RowSink, WriterOptions};

use self::engine::{FilterConfig, FilterOutputs, FilterSide, JoinedOutput, process};

#[derive(Args, Debug)]
pub struct FilterArgs {
    /// Input KGTK file (use '-' for stdin)
    #[arg(value_name = "INPUT", default_value = "-")]
    pub input: PathBuf,

    /// KGTK file whose keys the input is tested against
    #[arg(long = "filter-on", value_name = "FILTER", required = true)]
    pub filter: PathBuf,

    /// Destination for accepted input rows
    #[arg(
        short = 'o',
        long = "output-file",
        value_name = "FILE",
        default_value = "-"
    )]
    pub output: PathBuf,

    /// Destination for rejected input rows
    #[arg(long = "reject-file", value_name = "FILE")]
    pub reject_file: Option<PathBuf>,

    /// Destination for filter rows that matched at least one input row
    #[arg(long = "matched-filter-file", value_name = "FILE")]
    pub matched_filter_file: Option<PathBuf>,

    /// Destination for filter rows that matched no input row
    #[arg(long = "unmatched-filter-file", value_name = "FILE")]
    pub unmatched_filter_file: Option<PathBuf>,

    /// Destination for merged (input, filter) rows
    #[arg(long = "join-file", value_name = "FILE")]
    pub join_file: Option<PathBuf>,

    /// Key columns of the input file (names, aliases, or 1-based positions)
    #[arg(long = "input-keys", value_name = "COLS", num_args = 1..)]
    pub input_keys: Vec<String>,

    /// Key columns of the filter file (names, aliases, or 1-based positions)
    #[arg(long = "filter-keys", value_name = "COLS", num_args = 1..)]
    pub filter_keys: Vec<String>,

    /// Extend the default edge-file key with the label column
    #[arg(long = "join-on-label")]
    pub join_on_label: bool,

    /// Extend the default edge-file key with the node2 column
    #[arg(long = "join-on-node2")]
    pub join_on_node2: bool,

    /// Cache the input instead of the filter
    #[arg(long = "cache-input")]
    pub cache_input: bool,

    /// Keep input order when caching the input
    #[arg(long = "preserve-order")]
    pub preserve_order: bool,

    /// Keep input rows without a filter match in the join file
    #[arg(long = "left-join")]
    pub left_join: bool,

    /// Keep filter rows without an input match in the join file
    #[arg(long = "right-join")]
    pub right_join: bool,

    /// Merge the filter columns first in the join file
    #[arg(long = "right-first")]
    pub right_first: bool,

    /// Prefix for non-key input columns in the join file
    #[arg(long = "input-prefix", value_name = "PREFIX")]
    pub input_prefix: Option<String>,

    /// Prefix for non-key filter columns in the join file
    #[arg(long = "filter-prefix", value_name = "PREFIX")]
    pub filter_prefix: Option<String>,

    /// Separator placed between the fields of a multi-column key
    #[arg(long = "field-separator", value_name = "SEP", default_value = LIST_SEPARATOR)]
    pub field_separator: String,

    #[command(flatten)]
    pub reader: ReaderArgs,

    #[command(flatten)]
    pub writer: WriterArgs,
}

#[derive(Args, Debug)]
pub struct IfExistsArgs {
    #[command(flatten)]
    pub filter: FilterArgs,

    /// Both files are sorted by key; stream them side by side
    #[arg(long = "presorted")]
    pub presorted: bool,
}

#[derive(Args, Debug)]
pub struct IfNotExistsArgs {
    #[command(flatten)]
    pub filter: FilterArgs,
}

pub fn run_ifexists(args: IfExistsArgs) -> Result<()> {
    run(args.filter, false, args.presorted)
}

pub fn run_ifnotexists(args: IfNotExistsArgs) -> Result<()> {
    run(args.filter, true, false)
}

fn run(args: FilterArgs, invert: bool, presorted: bool) -> Result<()> {
    ensure_single_stdio([args.input.as_path(), args.filter.as_path()], "input")?;
    let outputs = [
        Some(args.output.as_path()),
        args.reject_file.as_deref(),
        args.matched_filter_file.as_deref(),
        args.unmatched_filter_file.as_deref(),
        args.join_file.as_deref(),
    ];
    ensure_single_stdio(outputs.into_iter().flatten(), "output")?;
    if (args.left_join || args.right_join) && args.join_file.is_none() {
        bail!("--left-join and --right-join require --join-file");
    }

    let config = FilterConfig {
        invert,
        left_join: args.left_join,
        right_join: args.right_join,
        cache_input: args.cache_input,
        preserve_order: args.preserve_order,
        presorted,
        right_first: args.right_first,
        field_separator: args.field_separator.clone(),
        input_prefix: args.input_prefix.clone(),
        filter_prefix: args.filter_prefix.clone(),
    };
    config.validate()?;

    let reader_options = args.reader.to_options()?;
    let implicit = ImplicitKey {
        label: args.join_on_label,
        node2: args.join_on_node2,
    };
    let input = FilterSide::new(
        KgtkReader::open(&args.input, reader_options)?,
        &parse_selector_args(&args.input_keys)?,
        implicit,
        &config.field_separator,
    )
    .with_context(|| format!("invalid input keys for {}", args.input.display()))?;
    let filter = FilterSide::new(
        KgtkReader::open(&args.filter, reader_options)?,
        &parse_selector_args(&args.filter_keys)?,
        implicit,
        &config.field_separator,
    )
    .with_context(|| format!("invalid filter keys for {}", args.filter.display()))?;
    debug!(
        input_keys = ?input.key.columns(),
        filter_keys = ?filter.key.columns(),
        "resolved key columns"
    );

    let writer_options = args.writer.to_options();
    let input_schema = input.schema().clone();
    let filter_schema = filter.schema().clone();
    let layout = match &args.join_file {
        Some(path) => Some(
            config
                .join_layout(&input_schema, &filter_schema)
                .with_context(|| format!("cannot build the columns of {}", path.display()))?,
        ),
        None => None,
    };
    let mut accepted = KgtkWriter::create(
        &args.output,
        input_schema.names().to_vec(),
        writer_options,
    )?;
    let mut rejected = open_optional(args.reject_file.as_deref(), &input_schema, writer_options)?;
    let mut matched =
        open_optional(args.matched_filter_file.as_deref(), &filter_schema, writer_options)?;
    let mut unmatched =
        open_optional(args.unmatched_filter_file.as_deref(), &filter_schema, writer_options)?;
    let mut joined = match (&args.join_file, &layout) {
        (Some(path), Some(layout)) => Some(KgtkWriter::create(
            path,
            layout.columns().to_vec(),
            writer_options,
        )?),
        _ => None,
    };

    process(
        &config,
        input,
        filter,
        FilterOutputs {
            accepted: Some(&mut accepted as &mut dyn RowSink),
            rejected: rejected.as_mut().map(|w| w as &mut dyn RowSink),
            matched_filter: matched.as_mut().map(|w| w as &mut dyn RowSink),
            unmatched_filter: unmatched.as_mut().map(|w| w as &mut dyn RowSink),
            joined: joined
                .as_mut()
                .zip(layout)
                .map(|(sink, layout)| JoinedOutput { sink, layout }),
        },
    )?;

    accepted.close()?;
    for writer in [rejected, matched, unmatched, joined].into_iter().flatten() {
        writer.close()?;
    }
    Ok(())
}

fn open_optional(
    path: Option<&Path>,
    schema: &Schema,
    options: WriterOptions,
) -> Result<Option<KgtkWriter<Box<dyn std::io::Write>>>> {
    path.map(|path| KgtkWriter::create(path, schema.names().to_vec(), options))
        .transpose()
        .map_err(Into::into)
}
