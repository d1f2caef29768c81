use std::path::Path;

use anyhow::{Result, anyhow, bail};
use clap::Args;
use csv::StringRecord;

use crate::reader::{LongRowAction, ReaderOptions, ShortRowAction};
use crate::writer::{WriterMode, WriterOptions};

/// A user-supplied column reference: a header name or a 0-based position
/// (parsed from 1-based input).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnSelector {
    Index(usize),
    Name(String),
}

pub fn parse_selector_list(spec: &str) -> Result<Vec<ColumnSelector>> {
    if spec.trim().is_empty() {
        bail!("column specification must not be empty");
    }

    spec.split(',')
        .map(|token| {
            let trimmed = token.trim();
            if trimmed.is_empty() {
                return Err(anyhow!("empty column selector"));
            }
            if let Ok(idx) = trimmed.parse::<usize>() {
                if idx == 0 {
                    bail!("column indices use 1-based positions");
                }
                Ok(ColumnSelector::Index(idx - 1))
            } else {
                Ok(ColumnSelector::Name(trimmed.to_string()))
            }
        })
        .collect()
}

/// Flattens repeated `--keys a b` / `--keys a,b` style arguments.
pub fn parse_selector_args(values: &[String]) -> Result<Vec<ColumnSelector>> {
    let mut selectors = Vec::new();
    for value in values {
        selectors.extend(parse_selector_list(value)?);
    }
    Ok(selectors)
}

/// Row-skipping options shared by every input.
#[derive(Debug, Clone, Copy)]
pub struct InputOptions {
    pub comment: Option<u8>,
    pub ignore_empty_row: bool,
}

impl Default for InputOptions {
    fn default() -> Self {
        InputOptions {
            comment: Some(b'#'),
            ignore_empty_row: false,
        }
    }
}

impl InputOptions {
    pub fn from_flags(comment_char: &str, ignore_empty_row: bool) -> Result<Self> {
        let comment = match comment_char.as_bytes() {
            [] => None,
            [byte] if byte.is_ascii() => Some(*byte),
            _ => bail!(
                "comment character must be a single ASCII character, got '{}'",
                comment_char
            ),
        };
        Ok(InputOptions {
            comment,
            ignore_empty_row,
        })
    }
}

pub fn should_skip_record(record: &StringRecord, opts: &InputOptions) -> bool {
    opts.ignore_empty_row && record.iter().all(|field| field.trim().is_empty())
}

pub fn is_stdio(path: &Path) -> bool {
    path == Path::new("-")
}

/// Fails when more than one of `paths` names standard input or output.
pub fn ensure_single_stdio<'a>(
    paths: impl IntoIterator<Item = &'a Path>,
    what: &str,
) -> Result<()> {
    if paths.into_iter().filter(|path| is_stdio(path)).count() > 1 {
        bail!("only one {} may use '-'", what);
    }
    Ok(())
}

/// Input parsing flags shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct ReaderArgs {
    /// Lines starting with this comment character are skipped (empty string disables comments)
    #[arg(
        short = 'C',
        long = "comment-char",
        value_name = "CHAR",
        default_value = "#"
    )]
    pub comment_char: String,

    /// Ignore rows where every field is empty/whitespace
    #[arg(short = 'E', long = "ignore-empty-row")]
    pub ignore_empty_row: bool,

    /// How to treat rows with fewer fields than the header
    #[arg(long = "short-rows", value_enum, default_value_t = ShortRowAction::Error)]
    pub short_rows: ShortRowAction,

    /// How to treat rows with more fields than the header
    #[arg(long = "long-rows", value_enum, default_value_t = LongRowAction::Error)]
    pub long_rows: LongRowAction,
}

impl ReaderArgs {
    pub fn to_options(&self) -> Result<ReaderOptions> {
        Ok(ReaderOptions {
            input: InputOptions::from_flags(&self.comment_char, self.ignore_empty_row)?,
            short_rows: self.short_rows,
            long_rows: self.long_rows,
        })
    }
}

/// Output column-count policy flags shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct WriterArgs {
    /// Structural check applied to output headers
    #[arg(long = "output-mode", value_enum, default_value_t = WriterMode::None)]
    pub mode: WriterMode,

    /// Pad output rows that are short of the header width with empty fields
    #[arg(long = "fill-missing-columns")]
    pub fill_missing_columns: bool,

    /// Allow output rows with fewer fields than the header
    #[arg(long = "allow-missing-columns")]
    pub allow_missing_columns: bool,

    /// Allow output rows with more fields than the header
    #[arg(long = "allow-extra-columns")]
    pub allow_extra_columns: bool,
}

impl WriterArgs {
    pub fn to_options(&self) -> WriterOptions {
        WriterOptions {
            mode: self.mode,
            require_all_columns: !self.allow_missing_columns,
            prohibit_extra_columns: !self.allow_extra_columns,
            fill_missing_columns: self.fill_missing_columns,
        }
    }
}
