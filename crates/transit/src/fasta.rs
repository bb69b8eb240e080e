use std::io::{self, BufRead};

use serde::{Deserialize, Serialize};

use crate::mass::strip_modifications;

/// Separates alternative names packed into a single FASTA description
pub const ALTERNATIVE_SEPARATOR: char = '\u{1}';

/// One protein entry of a FASTA file
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FastaRecord {
    /// Header line, including the leading `>`
    pub header: String,
    /// Accession: header text up to the first whitespace
    pub name: String,
    /// Cleaned residues of every sequence line, concatenated
    pub sequence: String,
    /// Non-blank sequence lines as written
    pub lines: Vec<String>,
    /// Was any sequence line annotated with bracketed modifications?
    pub modified: bool,
    /// 1-based line number of the header
    pub line: u64,
}

/// Remove bracketed annotations, white space and a trailing stop codon
/// from one line of sequence text. Returns the residues and whether any
/// annotation was removed.
pub fn clean_sequence(line: &str) -> (String, bool) {
    let stripped = strip_modifications(line);
    let modified = stripped.len() != line.len();
    let mut residues = stripped
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>();
    if residues.ends_with('*') {
        residues.pop();
    }
    (residues, modified)
}

/// Lazily read FASTA records from a buffered reader. Reading stops at the
/// first non-blank line that precedes any header.
pub struct FastaRecords<R> {
    reader: R,
    buf: String,
    line: u64,
    bytes: u64,
    pending: Option<FastaRecord>,
    done: bool,
}

impl<R: BufRead> FastaRecords<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: String::new(),
            line: 0,
            bytes: 0,
            pending: None,
            done: false,
        }
    }

    /// Number of lines consumed so far
    pub fn lines_read(&self) -> u64 {
        self.line
    }

    /// Number of bytes consumed so far
    pub fn bytes_read(&self) -> u64 {
        self.bytes
    }

    fn start(&mut self, header: &str) -> Option<FastaRecord> {
        let next = FastaRecord {
            header: header.to_string(),
            name: header
                .trim_start_matches('>')
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .to_string(),
            line: self.line,
            ..Default::default()
        };
        self.pending.replace(next)
    }
}

impl<R: BufRead> Iterator for FastaRecords<R> {
    type Item = io::Result<FastaRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            self.buf.clear();
            match self.reader.read_line(&mut self.buf) {
                Ok(0) => {
                    self.done = true;
                }
                Ok(n) => {
                    self.line += 1;
                    self.bytes += n as u64;
                    let text = std::mem::take(&mut self.buf);
                    let line = text.trim_end_matches(&['\r', '\n'][..]);
                    if line.starts_with('>') {
                        if let Some(record) = self.start(line) {
                            self.buf = text;
                            return Some(Ok(record));
                        }
                    } else if let Some(record) = self.pending.as_mut() {
                        let (residues, modified) = clean_sequence(line);
                        record.modified |= modified;
                        record.sequence.push_str(&residues);
                        if !line.trim().is_empty() {
                            record.lines.push(line.trim().to_string());
                        }
                    } else if !line.trim().is_empty() {
                        log::trace!("stopping FASTA read at line {}: no header", self.line);
                        self.done = true;
                    }
                    self.buf = text;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        self.pending.take().map(Ok)
    }
}

/// An alternative name packed into a FASTA description
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alternative {
    pub name: String,
    pub description: Option<String>,
}

/// Parsed FASTA header line
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FastaHeader {
    pub name: String,
    pub description: Option<String>,
    pub alternatives: Vec<Alternative>,
    /// `>>Name` headers name a peptide list rather than a protein
    pub custom_name: bool,
}

fn split_name(text: &str) -> (String, Option<String>) {
    match text.find(|c| c == ' ' || c == '\t') {
        Some(idx) => {
            let description = text[idx + 1..].trim();
            (
                text[..idx].to_string(),
                match description.is_empty() {
                    true => None,
                    false => Some(description.to_string()),
                },
            )
        }
        None => (text.to_string(), None),
    }
}

impl FastaHeader {
    /// Parse a header, with or without its leading `>`
    pub fn parse(line: &str) -> Self {
        let mut text = line.trim_end();
        let mut custom_name = false;
        if let Some(rest) = text.strip_prefix('>') {
            text = rest;
            if let Some(rest) = text.strip_prefix('>') {
                text = rest;
                custom_name = true;
            }
        }

        let (name, description) = split_name(text);
        let mut alternatives = Vec::new();
        let description = description.and_then(|description| {
            let mut parts = description.split(ALTERNATIVE_SEPARATOR);
            let first = parts.next().map(str::trim).unwrap_or_default().to_string();
            for alt in parts {
                let (name, description) = split_name(alt.trim());
                if !name.is_empty() {
                    alternatives.push(Alternative { name, description });
                }
            }
            match first.is_empty() {
                true => None,
                false => Some(first),
            }
        });

        FastaHeader {
            name,
            description,
            alternatives,
            custom_name,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn read(text: &str) -> Vec<FastaRecord> {
        FastaRecords::new(text.as_bytes())
            .collect::<io::Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn two_records() {
        let records = read(">P1 desc\nMSTK*\n>P2 desc\nAAAK*\n");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "P1");
        assert_eq!(records[0].header, ">P1 desc");
        assert_eq!(records[0].sequence, "MSTK");
        assert_eq!(records[0].line, 1);
        assert_eq!(records[1].name, "P2");
        assert_eq!(records[1].sequence, "AAAK");
        assert_eq!(records[1].line, 3);
    }

    #[test]
    fn consumed_bytes() {
        let text = ">P1\nMSTK\n>P2\nAAAK\n";
        let mut records = FastaRecords::new(text.as_bytes());
        assert_eq!(records.next().unwrap().unwrap().name, "P1");
        // The header of P2 has been read to close P1
        assert_eq!(records.bytes_read(), 13);
        assert_eq!(records.lines_read(), 3);
        assert!(records.next().is_some());
        assert!(records.next().is_none());
        assert_eq!(records.bytes_read(), text.len() as u64);
    }

    #[test]
    fn multiline_and_annotations() {
        let records = read(">P1\r\nMST K\r\n\r\nPEPC[+57]TIDE\r\n");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].sequence, "MSTKPEPCTIDE");
        assert_eq!(records[0].lines, vec!["MST K", "PEPC[+57]TIDE"]);
        assert!(records[0].modified);
    }

    #[test]
    fn leading_text_stops() {
        assert!(read("MSTK\n>P1\nAAAK\n").is_empty());
        assert_eq!(read("\n>P1\nAAAK\n").len(), 1);
        // a header without residues is still a record
        let records = read(">P1\n>P2\nAAAK");
        assert_eq!(records.len(), 2);
        assert!(records[0].sequence.is_empty());
    }

    #[test]
    fn headers() {
        let header = FastaHeader::parse(">sp|P02769|ALBU_BOVIN Serum albumin OS=Bos taurus");
        assert_eq!(header.name, "sp|P02769|ALBU_BOVIN");
        assert_eq!(
            header.description.as_deref(),
            Some("Serum albumin OS=Bos taurus")
        );
        assert!(!header.custom_name);

        let header = FastaHeader::parse(">>My peptides");
        assert!(header.custom_name);
        assert_eq!(header.name, "My");
        assert_eq!(header.description.as_deref(), Some("peptides"));

        let header = FastaHeader::parse(">P1 first\u{1}P1b second name\u{1}P1c");
        assert_eq!(header.description.as_deref(), Some("first"));
        assert_eq!(
            header.alternatives,
            vec![
                Alternative {
                    name: "P1b".into(),
                    description: Some("second name".into())
                },
                Alternative {
                    name: "P1c".into(),
                    description: None
                },
            ]
        );

        let header = FastaHeader::parse("P1");
        assert_eq!(header.name, "P1");
        assert_eq!(header.description, None);
    }

    #[test]
    fn clean() {
        assert_eq!(clean_sequence("MS[+80]TK*"), ("MSTK".to_string(), true));
        assert_eq!(clean_sequence(" MSTK \t"), ("MSTK".to_string(), false));
    }
}
