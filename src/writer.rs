//! KGTK row sinks.

use std::borrow::Cow;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use clap::ValueEnum;

use crate::common::is_stdio;
use crate::error::{KgtkError, Result};
use crate::format::{Role, Schema};
use crate::merge::shuffle_row;

/// Structural requirement checked against the output columns when a writer is opened.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum WriterMode {
    /// No structural check
    #[default]
    None,
    /// Require node1, label, and node2 columns
    Edge,
    /// Require an id column
    Node,
    /// Classify the columns without failing
    Auto,
}

#[derive(Clone, Copy, Debug)]
pub struct WriterOptions {
    pub mode: WriterMode,
    pub require_all_columns: bool,
    pub prohibit_extra_columns: bool,
    pub fill_missing_columns: bool,
}

impl Default for WriterOptions {
    fn default() -> Self {
        WriterOptions {
            mode: WriterMode::None,
            require_all_columns: true,
            prohibit_extra_columns: true,
            fill_missing_columns: false,
        }
    }
}

/// Destination for rows produced by the filter and join engines.
pub trait RowSink {
    /// Writes `row`, first redistributing its fields through `shuffle` when given.
    fn write(&mut self, row: &[String], shuffle: Option<&[Option<usize>]>) -> Result<()>;
}

pub struct KgtkWriter<W: Write> {
    out: BufWriter<W>,
    columns: Vec<String>,
    options: WriterOptions,
    rows: u64,
}

impl KgtkWriter<Box<dyn Write>> {
    pub fn create(path: &Path, columns: Vec<String>, options: WriterOptions) -> Result<Self> {
        let (label, out): (String, Box<dyn Write>) = if is_stdio(path) {
            ("<stdout>".to_string(), Box::new(io::stdout().lock()))
        } else {
            let file = File::create(path).map_err(|source| KgtkError::Create {
                path: path.display().to_string(),
                source,
            })?;
            (path.display().to_string(), Box::new(file))
        };
        KgtkWriter::new(&label, out, columns, options)
    }
}

impl<W: Write> KgtkWriter<W> {
    /// Validates `columns` against the writer mode and writes the header line.
    pub fn new(label: &str, out: W, columns: Vec<String>, options: WriterOptions) -> Result<Self> {
        let schema = Schema::new(label, columns)?;
        let required: &[Role] = match options.mode {
            WriterMode::Edge => &[Role::Node1, Role::Label, Role::Node2],
            WriterMode::Node => &[Role::Id],
            WriterMode::None | WriterMode::Auto => &[],
        };
        if let Some(role) = required
            .iter()
            .find(|role| schema.role_index(**role, None).is_none())
        {
            return Err(KgtkError::config(format!(
                "{}: {:?} output requires a {} column",
                label, options.mode, role
            )));
        }

        let mut writer = KgtkWriter {
            out: BufWriter::new(out),
            columns: schema.names().to_vec(),
            options,
            rows: 0,
        };
        writer.write_fields(&writer.columns.clone())?;
        Ok(writer)
    }

    /// Flushes buffered rows and hands back the underlying writer.
    pub fn close(self) -> Result<W> {
        self.out
            .into_inner()
            .map_err(|err| KgtkError::Io(err.into_error()))
    }

    fn write_fields(&mut self, fields: &[String]) -> Result<()> {
        for (idx, field) in fields.iter().enumerate() {
            if idx > 0 {
                self.out.write_all(b"\t")?;
            }
            self.out.write_all(field.as_bytes())?;
        }
        self.out.write_all(b"\n")?;
        Ok(())
    }
}

impl<W: Write> RowSink for KgtkWriter<W> {
    fn write(&mut self, row: &[String], shuffle: Option<&[Option<usize>]>) -> Result<()> {
        let width = self.columns.len();
        let mut fields: Cow<'_, [String]> = match shuffle {
            Some(shuffle) => Cow::Owned(shuffle_row(row, shuffle, width)),
            None => Cow::Borrowed(row),
        };
        if self.options.fill_missing_columns && fields.len() < width {
            fields.to_mut().resize(width, String::new());
        }

        let found = fields.len();
        let line = self.rows + 2;
        if found < width && self.options.require_all_columns {
            return Err(KgtkError::RowShape {
                line,
                expected: width,
                found,
                reason: "output row is missing required columns",
            });
        }
        if found > width && self.options.prohibit_extra_columns {
            return Err(KgtkError::RowShape {
                line,
                expected: width,
                found,
                reason: "output row has extra columns",
            });
        }

        self.write_fields(&fields)?;
        self.rows += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn output(writer: KgtkWriter<Vec<u8>>) -> String {
        String::from_utf8(writer.close().unwrap()).unwrap()
    }

    #[test]
    fn writes_header_then_rows() {
        let mut writer = KgtkWriter::new(
            "t",
            Vec::new(),
            strings(&["node1", "label", "node2"]),
            WriterOptions::default(),
        )
        .unwrap();
        writer.write(&strings(&["Q1", "P31", "Q5"]), None).unwrap();
        assert_eq!(output(writer), "node1\tlabel\tnode2\nQ1\tP31\tQ5\n");
    }

    #[test]
    fn shuffle_fills_uncovered_positions() {
        let mut writer = KgtkWriter::new(
            "t",
            Vec::new(),
            strings(&["id", "name", "color"]),
            WriterOptions::default(),
        )
        .unwrap();
        writer
            .write(&strings(&["red", "A"]), Some(&[Some(2), Some(0)][..]))
            .unwrap();
        assert_eq!(output(writer), "id\tname\tcolor\nA\t\tred\n");
    }

    #[test]
    fn column_count_policies_are_independent() {
        let columns = strings(&["id", "name"]);

        let mut strict = KgtkWriter::new("t", Vec::new(), columns.clone(), WriterOptions::default())
            .unwrap();
        assert!(matches!(
            strict.write(&strings(&["A"]), None),
            Err(KgtkError::RowShape { found: 1, .. })
        ));
        assert!(matches!(
            strict.write(&strings(&["A", "a", "x"]), None),
            Err(KgtkError::RowShape { found: 3, .. })
        ));

        let fill = WriterOptions {
            fill_missing_columns: true,
            ..WriterOptions::default()
        };
        let mut filled = KgtkWriter::new("t", Vec::new(), columns.clone(), fill).unwrap();
        filled.write(&strings(&["A"]), None).unwrap();
        assert_eq!(output(filled), "id\tname\nA\t\n");

        let lax = WriterOptions {
            require_all_columns: false,
            prohibit_extra_columns: false,
            ..WriterOptions::default()
        };
        let mut lax_writer = KgtkWriter::new("t", Vec::new(), columns, lax).unwrap();
        lax_writer.write(&strings(&["A"]), None).unwrap();
        lax_writer.write(&strings(&["B", "b", "x"]), None).unwrap();
        assert_eq!(output(lax_writer), "id\tname\nA\nB\tb\tx\n");
    }

    #[test]
    fn mode_validates_output_columns() {
        let edge = WriterOptions {
            mode: WriterMode::Edge,
            ..WriterOptions::default()
        };
        assert!(KgtkWriter::new("t", Vec::new(), strings(&["node1", "node2"]), edge).is_err());
        assert!(
            KgtkWriter::new("t", Vec::new(), strings(&["from", "predicate", "to"]), edge).is_ok()
        );

        let node = WriterOptions {
            mode: WriterMode::Node,
            ..WriterOptions::default()
        };
        assert!(KgtkWriter::new("t", Vec::new(), strings(&["name"]), node).is_err());
        assert!(matches!(
            KgtkWriter::new("t", Vec::new(), strings(&["id", "id"]), WriterOptions::default()),
            Err(KgtkError::DuplicateColumn { .. })
        ));
    }
}
