//! KGTK row sources.
//!
//! A [`KgtkReader`] parses the header line into a [`Schema`] and then yields
//! data rows lazily, once. [`ReplayableInput`] wraps a source that must be
//! read more than once: files are reopened, standard input is spooled.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use csv::{ReaderBuilder, StringRecordsIntoIter};
use tracing::{debug, info, warn};

use crate::common::{InputOptions, is_stdio, should_skip_record};
use crate::error::{KgtkError, Result};
use crate::format::Schema;

pub type Row = Vec<String>;

pub type RowIter<'a> = Box<dyn Iterator<Item = Result<Row>> + 'a>;

/// What to do with a data row that has fewer fields than the header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum ShortRowAction {
    /// Pad with empty fields
    Fill,
    /// Skip the row with a warning
    Exclude,
    /// Abort with an error
    #[default]
    Error,
}

/// What to do with a data row that has more fields than the header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LongRowAction {
    /// Drop the extra fields
    Truncate,
    /// Skip the row with a warning
    Exclude,
    /// Abort with an error
    #[default]
    Error,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ReaderOptions {
    pub input: InputOptions,
    pub short_rows: ShortRowAction,
    pub long_rows: LongRowAction,
}

pub fn open_source(path: &Path) -> Result<Box<dyn Read>> {
    if is_stdio(path) {
        return Ok(Box::new(io::stdin().lock()));
    }
    let file = File::open(path).map_err(|source| KgtkError::Open {
        path: path.display().to_string(),
        source,
    })?;
    Ok(Box::new(BufReader::new(file)))
}

pub struct KgtkReader<R: Read> {
    label: String,
    schema: Schema,
    records: StringRecordsIntoIter<R>,
    options: ReaderOptions,
    line: u64,
    excluded: u64,
}

impl KgtkReader<Box<dyn Read>> {
    pub fn open(path: &Path, options: ReaderOptions) -> Result<Self> {
        let label = if is_stdio(path) {
            "<stdin>".to_string()
        } else {
            path.display().to_string()
        };
        KgtkReader::new(label, open_source(path)?, options)
    }
}

impl<R: Read> KgtkReader<R> {
    /// Reads the header line from `source`. An input without a header is an error.
    pub fn new(label: impl Into<String>, source: R, options: ReaderOptions) -> Result<Self> {
        let label = label.into();
        let mut reader = ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .flexible(true)
            .quoting(false)
            .comment(options.input.comment)
            .from_reader(source);

        let header = reader
            .headers()?
            .iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        if header.is_empty() {
            return Err(KgtkError::config(format!("{}: missing header line", label)));
        }
        let schema = Schema::new(&label, header)?;
        debug!(file = %label, columns = schema.len(), kind = ?schema.kind(), "opened input");

        Ok(KgtkReader {
            label,
            schema,
            records: reader.into_records(),
            options,
            line: 1,
            excluded: 0,
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Line number of the most recently returned row.
    pub fn line(&self) -> u64 {
        self.line
    }

    fn exclude(&mut self, found: usize) {
        self.excluded += 1;
        warn!(
            file = %self.label,
            line = self.line,
            expected = self.schema.len(),
            found,
            "excluding row with wrong field count"
        );
    }
}

impl<R: Read> Iterator for KgtkReader<R> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let record = match self.records.next() {
                Some(Ok(record)) => record,
                Some(Err(err)) => return Some(Err(err.into())),
                None => {
                    let excluded = std::mem::take(&mut self.excluded);
                    if excluded > 0 {
                        info!(file = %self.label, excluded, "excluded rows with wrong field count");
                    }
                    return None;
                }
            };
            self.line = record
                .position()
                .map(|pos| pos.line())
                .unwrap_or(self.line + 1);
            if should_skip_record(&record, &self.options.input) {
                continue;
            }

            let width = self.schema.len();
            let found = record.len();
            let mut row: Row = record.iter().map(str::to_string).collect();
            if found < width {
                match self.options.short_rows {
                    ShortRowAction::Fill => row.resize(width, String::new()),
                    ShortRowAction::Exclude => {
                        self.exclude(found);
                        continue;
                    }
                    ShortRowAction::Error => {
                        return Some(Err(KgtkError::RowShape {
                            line: self.line,
                            expected: width,
                            found,
                            reason: "short row in input",
                        }));
                    }
                }
            } else if found > width {
                match self.options.long_rows {
                    LongRowAction::Truncate => row.truncate(width),
                    LongRowAction::Exclude => {
                        self.exclude(found);
                        continue;
                    }
                    LongRowAction::Error => {
                        return Some(Err(KgtkError::RowShape {
                            line: self.line,
                            expected: width,
                            found,
                            reason: "long row in input",
                        }));
                    }
                }
            }
            return Some(Ok(row));
        }
    }
}

/// Where passes after the first one get their rows from.
enum Replay {
    Reopen { path: PathBuf, options: ReaderOptions },
    Spool(Vec<Row>),
}

/// A row source that can be iterated more than once.
pub struct ReplayableInput {
    label: String,
    schema: Schema,
    fresh: Option<KgtkReader<Box<dyn Read>>>,
    replay: Replay,
}

impl ReplayableInput {
    pub fn open(path: &Path, options: ReaderOptions) -> Result<Self> {
        let reader = KgtkReader::open(path, options)?;
        if is_stdio(path) {
            return ReplayableInput::spool(reader);
        }
        Ok(ReplayableInput {
            label: reader.label().to_string(),
            schema: reader.schema().clone(),
            fresh: Some(reader),
            replay: Replay::Reopen {
                path: path.to_path_buf(),
                options,
            },
        })
    }

    /// Drains `reader` into memory so later passes need no I/O.
    pub fn spool<R: Read>(reader: KgtkReader<R>) -> Result<Self> {
        let label = reader.label().to_string();
        let schema = reader.schema().clone();
        let rows = reader.collect::<Result<Vec<_>>>()?;
        debug!(file = %label, rows = rows.len(), "spooled input into memory");
        Ok(ReplayableInput {
            label,
            schema,
            fresh: None,
            replay: Replay::Spool(rows),
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Starts a new pass over the rows.
    pub fn rows(&mut self) -> Result<RowIter<'_>> {
        if let Some(reader) = self.fresh.take() {
            return Ok(Box::new(reader));
        }
        match &self.replay {
            Replay::Spool(rows) => Ok(Box::new(rows.iter().cloned().map(Ok))),
            Replay::Reopen { path, options } => {
                let reader = KgtkReader::open(path, *options)?;
                if reader.schema().names() != self.schema.names() {
                    return Err(KgtkError::config(format!(
                        "{}: header changed between passes",
                        self.label
                    )));
                }
                Ok(Box::new(reader))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use crate::format::SchemaKind;

    fn read_all(text: &str, options: ReaderOptions) -> Result<Vec<Row>> {
        KgtkReader::new("test", text.as_bytes(), options)?.collect()
    }

    #[test]
    fn parses_header_and_rows() {
        let reader =
            KgtkReader::new("t", "node1\tlabel\tnode2\nQ1\tP31\tQ5\n".as_bytes(), ReaderOptions::default())
                .unwrap();
        assert_eq!(reader.schema().kind(), SchemaKind::Edge);
        let rows = reader.collect::<Result<Vec<_>>>().unwrap();
        assert_eq!(rows, vec![vec!["Q1", "P31", "Q5"]]);
    }

    #[test]
    fn skips_comments_and_keeps_quotes_literal() {
        let rows = read_all(
            "id\tname\n# a comment\nA\t\"quoted\n",
            ReaderOptions::default(),
        )
        .unwrap();
        assert_eq!(rows, vec![vec!["A", "\"quoted"]]);
    }

    #[test]
    fn wrong_width_rows_fail_by_default() {
        assert!(matches!(
            read_all("id\tname\nA\talpha\nB\n", ReaderOptions::default()),
            Err(KgtkError::RowShape { line: 3, found: 1, .. })
        ));
        assert!(matches!(
            read_all("id\nA\textra\n", ReaderOptions::default()),
            Err(KgtkError::RowShape { line: 2, found: 2, .. })
        ));
    }

    #[test]
    fn short_rows_follow_configured_action() {
        let text = "id\tname\nA\nB\tb\n";
        let exclude = ReaderOptions {
            short_rows: ShortRowAction::Exclude,
            ..ReaderOptions::default()
        };
        assert_eq!(read_all(text, exclude).unwrap(), vec![vec!["B", "b"]]);

        let fill = ReaderOptions {
            short_rows: ShortRowAction::Fill,
            ..ReaderOptions::default()
        };
        assert_eq!(read_all(text, fill).unwrap()[0], vec!["A", ""]);

        let error = ReaderOptions {
            short_rows: ShortRowAction::Error,
            ..ReaderOptions::default()
        };
        assert!(matches!(
            read_all(text, error),
            Err(KgtkError::RowShape { line: 2, .. })
        ));
    }

    #[test]
    fn long_rows_can_be_truncated() {
        let truncate = ReaderOptions {
            long_rows: LongRowAction::Truncate,
            ..ReaderOptions::default()
        };
        let rows = read_all("id\nA\textra\n", truncate).unwrap();
        assert_eq!(rows, vec![vec!["A"]]);
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(matches!(
            KgtkReader::new("t", "".as_bytes(), ReaderOptions::default()),
            Err(KgtkError::Config(_))
        ));
    }

    #[test]
    fn replayable_file_input_reopens() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "id\nA\nB\n").unwrap();
        let mut input = ReplayableInput::open(file.path(), ReaderOptions::default()).unwrap();
        let first = input.rows().unwrap().collect::<Result<Vec<_>>>().unwrap();
        let second = input.rows().unwrap().collect::<Result<Vec<_>>>().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn spooled_input_replays_from_memory() {
        let reader = KgtkReader::new("t", "id\nA\n".as_bytes(), ReaderOptions::default()).unwrap();
        let mut input = ReplayableInput::spool(reader).unwrap();
        assert_eq!(input.rows().unwrap().count(), 1);
        assert_eq!(input.rows().unwrap().count(), 1);
    }

    #[test]
    fn spooled_input_never_reopens_its_label() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "id\nX\nY\n").unwrap();
        let label = file.path().display().to_string();
        let reader =
            KgtkReader::new(label, "id\nA\n".as_bytes(), ReaderOptions::default()).unwrap();
        let mut input = ReplayableInput::spool(reader).unwrap();
        for _ in 0..3 {
            let rows = input.rows().unwrap().collect::<Result<Vec<_>>>().unwrap();
            assert_eq!(rows, vec![vec!["A"]]);
        }
    }
}
