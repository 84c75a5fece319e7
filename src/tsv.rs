//! Tab-separated table plumbing shared by every reader and writer of the crate.
//!
//! Tables have `#`-prefixed comment lines before a header row, CRLF line endings, and
//! case-insensitive field names in any order. Unknown fields are ignored.
use std::io::{Read, Write};
use std::str::FromStr;

use csv::{ReaderBuilder, StringRecord, Terminator, Trim, WriterBuilder};

use crate::constants::FastHashMap;
use crate::stochmap_errors::StochMapError;

pub(crate) fn tsv_reader<R: Read>(r: R) -> csv::Reader<R> {
    ReaderBuilder::new()
        .delimiter(b'\t')
        .comment(Some(b'#'))
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(r)
}

/// Writer with CRLF terminators. Comment lines must be written to `w` before calling this.
pub(crate) fn tsv_writer<W: Write>(w: W) -> csv::Writer<W> {
    WriterBuilder::new()
        .delimiter(b'\t')
        .terminator(Terminator::CRLF)
        .from_writer(w)
}

/// Write `# ...` comment lines.
pub(crate) fn write_comments<W: Write>(w: &mut W, comments: &[&str]) -> std::io::Result<()> {
    for c in comments {
        write!(w, "# {c}\r\n")?;
    }
    Ok(())
}

/// Column positions of a header, keyed by lowercase field name.
pub(crate) struct HeaderIndex {
    source_name: String,
    fields: FastHashMap<String, usize>,
}

impl HeaderIndex {
    pub(crate) fn new<R: Read>(
        rdr: &mut csv::Reader<R>,
        source_name: &str,
    ) -> Result<Self, StochMapError> {
        let fields = rdr
            .headers()?
            .iter()
            .enumerate()
            .map(|(i, h)| (h.to_lowercase(), i))
            .collect();
        Ok(HeaderIndex {
            source_name: source_name.to_string(),
            fields,
        })
    }

    /// Position of a mandatory field.
    pub(crate) fn require(&self, field: &str) -> Result<usize, StochMapError> {
        self.fields
            .get(field)
            .copied()
            .ok_or_else(|| StochMapError::MissingField {
                source_name: self.source_name.clone(),
                field: field.to_string(),
            })
    }

    pub(crate) fn optional(&self, field: &str) -> Option<usize> {
        self.fields.get(field).copied()
    }

    pub(crate) fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Raw (trimmed) cell, empty if the row is short.
    pub(crate) fn cell<'r>(&self, rec: &'r StringRecord, col: usize) -> &'r str {
        rec.get(col).unwrap_or("")
    }

    /// Parse a cell, reporting the field and row on failure.
    pub(crate) fn parse<T: FromStr>(
        &self,
        rec: &StringRecord,
        col: usize,
        field: &str,
    ) -> Result<T, StochMapError> {
        let value = self.cell(rec, col);
        value.parse().map_err(|_| StochMapError::InvalidField {
            source_name: self.source_name.clone(),
            row: row_number(rec),
            field: field.to_string(),
            value: value.to_string(),
        })
    }
}

/// Line number of a record in its source (1-based, comments and header included).
pub(crate) fn row_number(rec: &StringRecord) -> u64 {
    rec.position().map(|p| p.line()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_index() {
        let data = "# comment\r\nTree\tNODE\tage\r\nt1\t3\tx\r\n";
        let mut rdr = tsv_reader(data.as_bytes());
        let head = HeaderIndex::new(&mut rdr, "mem").unwrap();
        assert_eq!(head.require("tree").unwrap(), 0);
        assert_eq!(head.optional("node"), Some(1));
        assert_eq!(head.optional("pixel"), None);
        assert_eq!(
            head.require("pixel").unwrap_err(),
            StochMapError::MissingField {
                source_name: "mem".into(),
                field: "pixel".into()
            }
        );

        let rec = rdr.records().next().unwrap().unwrap();
        let node: u32 = head.parse(&rec, 1, "node").unwrap();
        assert_eq!(node, 3);
        match head.parse::<i64>(&rec, 2, "age").unwrap_err() {
            StochMapError::InvalidField {
                source_name,
                row,
                field,
                value,
            } => {
                assert_eq!(source_name, "mem");
                assert!(row >= 2);
                assert_eq!(field, "age");
                assert_eq!(value, "x");
            }
            e => panic!("unexpected error: {e}"),
        }
    }

    #[test]
    fn test_writer_uses_crlf() {
        let mut buf = Vec::new();
        write_comments(&mut buf, &["hello"]).unwrap();
        {
            let mut w = tsv_writer(&mut buf);
            w.write_record(["a", "b"]).unwrap();
            w.flush().unwrap();
        }
        assert_eq!(String::from_utf8(buf).unwrap(), "# hello\r\na\tb\r\n");
    }
}
