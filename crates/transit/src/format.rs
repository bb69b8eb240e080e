//! Delimited-text detection: field separators, locale number formats and
//! column classification

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::mass::{is_ex_sequence, strip_modifications};

pub const TAB: char = '\t';
pub const COMMA: char = ',';
/// Separator of spreadsheet exports in locales that use a decimal comma
pub const SEMICOLON: char = ';';

/// Decimal and digit-group separators used to read numbers
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberFormat {
    pub decimal: char,
    pub group: char,
}

impl Default for NumberFormat {
    fn default() -> Self {
        Self::INVARIANT
    }
}

impl NumberFormat {
    pub const INVARIANT: NumberFormat = NumberFormat {
        decimal: '.',
        group: ',',
    };

    /// Number format of a locale with the given decimal separator
    pub fn local(decimal: char) -> Self {
        match decimal {
            '.' => Self::INVARIANT,
            ',' => NumberFormat {
                decimal: ',',
                group: '.',
            },
            _ => NumberFormat {
                decimal,
                group: ',',
            },
        }
    }

    /// Parse a number made of an optional sign, digits with optional group
    /// separators, and at most one decimal separator. Exponents and
    /// `inf`/`nan` are rejected.
    pub fn parse(&self, s: &str) -> Option<f64> {
        let s = s.trim();
        let (negative, rest) = match s.as_bytes().first()? {
            b'-' => (true, &s[1..]),
            b'+' => (false, &s[1..]),
            _ => (false, s),
        };

        let mut normalized = String::with_capacity(rest.len() + 1);
        if negative {
            normalized.push('-');
        }
        let mut digits = 0;
        let mut seen_decimal = false;
        for c in rest.chars() {
            match c {
                '0'..='9' => {
                    digits += 1;
                    normalized.push(c);
                }
                c if c == self.decimal && !seen_decimal => {
                    seen_decimal = true;
                    normalized.push('.');
                }
                c if c == self.group && !seen_decimal => {}
                _ => return None,
            }
        }
        if digits == 0 {
            return None;
        }
        normalized.parse().ok()
    }
}

/// Split one delimited line into fields, honouring quotes
pub fn split_fields(line: &str, separator: char) -> Vec<String> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(separator as u8)
        .has_headers(false)
        .flexible(true)
        .from_reader(line.as_bytes());

    let mut record = csv::StringRecord::new();
    match reader.read_record(&mut record) {
        Ok(true) => record.iter().map(String::from).collect(),
        // Empty lines and undecodable quoting fall back to a plain split
        _ => line.split(separator).map(String::from).collect(),
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Numeric,
    ResidueSequence,
    FreeText,
}

impl ColumnType {
    pub fn classify(value: &str, format: &NumberFormat) -> Self {
        if format.parse(value).is_some() {
            ColumnType::Numeric
        } else if is_ex_sequence(value) {
            ColumnType::ResidueSequence
        } else {
            ColumnType::FreeText
        }
    }
}

/// The result of inspecting the first line of a delimited text
#[derive(Clone, Debug, PartialEq)]
pub struct Columns {
    pub separator: char,
    pub format: NumberFormat,
    pub types: Vec<ColumnType>,
}

impl Columns {
    pub fn has_numeric(&self) -> bool {
        self.types.contains(&ColumnType::Numeric)
    }
}

fn count_fractional(values: &[String], format: &NumberFormat) -> usize {
    values
        .iter()
        .filter_map(|value| format.parse(value))
        .filter(|n| n.fract() != 0.0)
        .count()
}

fn try_split(line: &str, separator: char) -> Option<Vec<String>> {
    let fields = split_fields(line, separator);
    match fields.len() > 1 {
        true => Some(fields),
        false => None,
    }
}

/// Decide whether `text` is delimited, and if so how. Returns `None` for
/// text that should be read as FASTA.
pub fn detect_columns(text: &str, decimal_separator: char) -> Option<Columns> {
    let line = text.lines().next()?;
    let local = NumberFormat::local(decimal_separator);

    let (separator, format, fields) = if let Some(fields) = try_split(line, TAB) {
        let mut format = NumberFormat::INVARIANT;
        if local != NumberFormat::INVARIANT
            && count_fractional(&fields, &local) > count_fractional(&fields, &format)
        {
            format = local;
        }
        (TAB, format, fields)
    } else if decimal_separator == ',' {
        let fields = try_split(line, SEMICOLON)?;
        (SEMICOLON, local, fields)
    } else {
        let fields = try_split(line, COMMA)?;
        (COMMA, NumberFormat::INVARIANT, fields)
    };

    // Sequence text is allowed to contain white space
    let mut non_sequence = !separator.is_whitespace();
    let types = fields
        .iter()
        .map(|value| ColumnType::classify(value.trim(), &format))
        .inspect(|ty| non_sequence |= *ty != ColumnType::ResidueSequence)
        .collect::<Vec<_>>();

    match non_sequence {
        true => Some(Columns {
            separator,
            format,
            types,
        }),
        false => None,
    }
}

/// Convert a table of `name, description..., sequence` rows into FASTA text
pub fn columns_to_fasta(text: &str, separator: char) -> Result<String, Error> {
    let mut fasta = String::with_capacity(text.len());
    for (idx, line) in text.lines().enumerate() {
        let line_num = idx as u64 + 1;
        let columns = split_fields(line, separator);
        if columns.len() < 2 {
            return Err(Error::malformed("Too few columns found").at(line_num, None));
        }
        let last = columns.len() - 1;
        let sequence = columns[last].trim();
        if !is_ex_sequence(sequence) {
            return Err(Error::malformed(
                "Last column does not contain a valid protein sequence",
            )
            .at(line_num, Some(last)));
        }
        fasta.push('>');
        fasta.push_str(&columns[0].trim().replace(' ', "_"));
        for description in &columns[1..last] {
            fasta.push(' ');
            fasta.push_str(description.trim());
        }
        fasta.push('\n');
        fasta.push_str(&strip_modifications(sequence));
        fasta.push('\n');
    }
    Ok(fasta)
}
