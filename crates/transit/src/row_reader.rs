//! Column layout inference and per-row extraction for transition lists

use fnv::FnvHashSet;
use regex::Regex;
use serde::Serialize;

use crate::error::{Error, ErrorKind};
use crate::format::{split_fields, NumberFormat};
use crate::mass::{is_ex_sequence, strip_modifications};
use crate::matcher::{column_mz, MassMatcher, PrecursorExplanation, TransitionExplanation};
use crate::modification::{LabelType, ModificationSet};

/// Values that never name a protein
const EXCLUDED_PROTEIN_VALUES: [&str; 5] = ["true", "false", "heavy", "light", "unit"];

/// Field indices of each role in a transition list
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ColumnLayout {
    pub protein: Option<usize>,
    pub peptide: usize,
    pub precursor: usize,
    pub product: usize,
    pub label: Option<usize>,
    pub decoy: Option<usize>,
}

/// Everything extracted from one row, with its surviving explanations
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TransitionInfo {
    pub protein: Option<String>,
    pub sequence: String,
    pub precursor_mz: f64,
    pub product_mz: f64,
    pub decoy: bool,
    /// The first label tried when explaining the precursor
    pub label: LabelType,
    /// Only `label` may explain the precursor
    pub explicit_label: bool,
    pub explanations: Vec<TransitionExplanation>,
}

impl TransitionInfo {
    /// Distinct modification sets among the explanations, in order
    pub fn potential_mods(&self) -> Vec<ModificationSet> {
        let mut mods: Vec<ModificationSet> = Vec::new();
        for exp in &self.explanations {
            if !mods.contains(&exp.precursor.modifications) {
                mods.push(exp.precursor.modifications.clone());
            }
        }
        mods
    }

    pub fn is_decoy(&self) -> bool {
        self.explanations.iter().any(TransitionExplanation::is_decoy)
    }
}

/// How protein, sequence and label are read from a row
#[derive(Clone, Debug)]
pub enum Strategy {
    /// Each role lives in its own column
    General,
    /// `Protein.Sequence.<anything>.Label` packed into the peptide column
    ExtendedPeptide(Regex),
}

#[derive(Clone, Debug)]
pub struct RowReader {
    pub strategy: Strategy,
    pub layout: ColumnLayout,
    pub format: NumberFormat,
    pub separator: char,
}

/// Remove bracketed notes, then anything from the first `.`
pub fn remove_sequence_notes(field: &str) -> String {
    let mut cleaned = strip_modifications(field);
    if let Some(idx) = cleaned.find('.') {
        cleaned.truncate(idx);
    }
    cleaned
}

/// First column at or after `start` holding a peptide sequence
pub fn find_sequence(fields: &[String], start: usize) -> Option<(usize, String)> {
    fields
        .iter()
        .enumerate()
        .skip(start)
        .map(|(idx, field)| (idx, remove_sequence_notes(field)))
        .find(|(_, sequence)| sequence.len() >= 2 && is_ex_sequence(sequence))
}

fn is_label_code(value: Option<&String>) -> bool {
    matches!(value.map(String::as_str), Some("L") | Some("H"))
}

/// First column whose value is `L` or `H` on every sample row
pub fn find_label_column(rows: &[Vec<String>]) -> Option<usize> {
    let first = rows.first()?;
    (0..first.len()).find(|&idx| rows.iter().all(|row| is_label_code(row.get(idx))))
}

fn label_from_code(code: Option<&String>) -> LabelType {
    match code.map(String::as_str) {
        Some("H") => LabelType::Heavy(LabelType::HEAVY.into()),
        _ => LabelType::Light,
    }
}

/// Pick the protein column among the free-text columns of the sample
pub fn find_protein(
    rows: &[Vec<String>],
    sequence_column: usize,
    headers: Option<&[String]>,
    format: &NumberFormat,
) -> Option<usize> {
    let first = rows.first()?;
    let mut candidates = first
        .iter()
        .enumerate()
        .filter(|(idx, _)| *idx != sequence_column)
        .filter(|(_, value)| {
            format.parse(value).is_none()
                && value.len() > 2
                && !EXCLUDED_PROTEIN_VALUES.contains(&value.to_lowercase().as_str())
        })
        .map(|(idx, _)| idx)
        .collect::<Vec<_>>();

    let sequences = rows
        .iter()
        .map(|row| cell(row, sequence_column))
        .collect::<FnvHashSet<_>>()
        .len();

    // Proteins repeat at least as often as peptides, and are never blank
    candidates.retain(|&idx| {
        let values = rows.iter().map(|row| cell(row, idx)).collect::<FnvHashSet<_>>();
        !values.contains("") && values.len() <= sequences
    });

    if let Some(headers) = headers {
        if candidates.len() > 1 {
            let named = candidates.iter().copied().find(|&idx| {
                headers
                    .get(idx)
                    .map(|h| h.to_lowercase().contains("protein"))
                    .unwrap_or(false)
            });
            if named.is_some() {
                return named;
            }
        }
    }
    candidates.first().copied()
}

fn cell(row: &[String], idx: usize) -> &str {
    row.get(idx).map(String::as_str).unwrap_or("")
}

fn layout_error(message: &str) -> Error {
    Error::new(ErrorKind::LayoutInference, message).at(1, None)
}

fn is_decoy_row(fields: &[String], decoy: Option<usize>) -> bool {
    decoy
        .and_then(|idx| fields.get(idx))
        .map(|value| value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Regex for extended peptide names ending in `light` or a heavy label name
pub fn extended_peptide_regex(heavy_labels: &[String]) -> Result<Regex, regex::Error> {
    let names = std::iter::once("light".to_string())
        .chain(heavy_labels.iter().map(|name| regex::escape(name)))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(
        r"^([^. ]+)\.([A-Z0-9_+\-\[\]]+)\..+\.({})$",
        names
    ))
}

impl RowReader {
    /// Try the extended-peptide-name layout on the first data row
    pub fn infer_extended(
        first: &str,
        decoy: Option<usize>,
        format: NumberFormat,
        separator: char,
        matcher: &MassMatcher,
    ) -> Result<Option<RowReader>, Error> {
        let settings = matcher.settings();
        let heavy = settings
            .heavy_labels
            .iter()
            .map(|label| label.name.clone())
            .collect::<Vec<_>>();
        let regex = extended_peptide_regex(&heavy).map_err(|e| {
            Error::new(
                ErrorKind::LayoutInference,
                format!("Invalid isotope label names: {}", e),
            )
        })?;
        let strategy = Strategy::ExtendedPeptide(regex);

        let fields = split_fields(first, separator);
        let mut found = None;
        for (idx, field) in fields.iter().enumerate() {
            if let Some((_, sequence, label)) = strategy.extended(field, matcher) {
                if is_ex_sequence(&sequence) {
                    found = Some((idx, sequence, label));
                }
                // a match without a peptide in the sequence part ends the search
                break;
            }
        }
        let (peptide, sequence, label) = match found {
            Some(found) => found,
            None => return Ok(None),
        };

        if !label.is_light() && !settings.is_heavy_allowed(label.name()) {
            return Err(Error::malformed(
                "Isotope labeled entry found without matching settings",
            )
            .at(1, Some(peptide)));
        }

        let (precursor, precursors) = matcher
            .find_precursor_column(
                &fields,
                &format,
                &sequence,
                &label,
                peptide,
                is_decoy_row(&fields, decoy),
            )
            .ok_or_else(|| layout_error("No valid precursor m/z column found"))?;
        let product = matcher
            .find_product_column(&fields, &format, &sequence, &precursors, peptide, precursor)
            .ok_or_else(|| layout_error("No valid product m/z column found"))?;

        let layout = ColumnLayout {
            protein: Some(peptide),
            peptide,
            precursor,
            product,
            label: Some(peptide),
            decoy,
        };
        log::trace!("extended peptide layout: {:?}", layout);
        Ok(Some(RowReader {
            strategy,
            layout,
            format,
            separator,
        }))
    }

    /// Infer a one-role-per-column layout from sample lines. `Ok(None)`
    /// means no peptide column exists; every later failure is an error.
    pub fn infer_general(
        lines: &[String],
        headers: Option<&[String]>,
        decoy: Option<usize>,
        format: NumberFormat,
        separator: char,
        matcher: &MassMatcher,
    ) -> Result<Option<RowReader>, Error> {
        let rows = lines
            .iter()
            .map(|line| split_fields(line, separator))
            .collect::<Vec<_>>();
        let fields = match rows.first() {
            Some(fields) => fields,
            None => return Ok(None),
        };
        let settings = matcher.settings();
        let label_column = find_label_column(&rows);
        let decoy_row = is_decoy_row(fields, decoy);

        let mut start = 0;
        let (peptide, sequence, precursor, precursors) = loop {
            let (peptide, sequence) = match find_sequence(fields, start) {
                Some(found) => found,
                None if start > 0 => {
                    return Err(layout_error("No valid precursor m/z column found"))
                }
                None => return Ok(None),
            };
            start = peptide + 1;

            let label = label_from_code(label_column.and_then(|idx| fields.get(idx)));
            let mut found = matcher.find_precursor_column(
                fields, &format, &sequence, &label, peptide, decoy_row,
            );
            if found.is_none() && label_column.is_none() {
                found = settings
                    .heavy_label_types()
                    .filter(|label| settings.is_heavy_allowed(label.name()))
                    .find_map(|label| {
                        matcher.find_precursor_column(
                            fields, &format, &sequence, &label, peptide, decoy_row,
                        )
                    });
            }
            if let Some((precursor, precursors)) = found {
                break (peptide, sequence, precursor, precursors);
            }
        };

        let product = matcher
            .find_product_column(fields, &format, &sequence, &precursors, peptide, precursor)
            .ok_or_else(|| layout_error("No valid product m/z column found"))?;
        let protein = find_protein(&rows, peptide, headers, &format);

        let layout = ColumnLayout {
            protein,
            peptide,
            precursor,
            product,
            label: label_column,
            decoy,
        };
        log::trace!("general layout: {:?}", layout);
        Ok(Some(RowReader {
            strategy: Strategy::General,
            layout,
            format,
            separator,
        }))
    }

    /// Read one row and explain its precursor and product m/z values
    pub fn next_row(
        &self,
        line: &str,
        line_num: u64,
        matcher: &MassMatcher,
    ) -> Result<TransitionInfo, Error> {
        let fields = split_fields(line, self.separator);
        let layout = &self.layout;
        let peptide_field = fields.get(layout.peptide).map(String::as_str).unwrap_or("");

        let (protein, sequence, label, explicit_label) = match &self.strategy {
            Strategy::General => (
                layout
                    .protein
                    .map(|idx| fields.get(idx).cloned().unwrap_or_default()),
                remove_sequence_notes(peptide_field),
                label_from_code(layout.label.and_then(|idx| fields.get(idx))),
                layout.label.is_some(),
            ),
            Strategy::ExtendedPeptide(_) => {
                let (protein, sequence, label) =
                    self.strategy.extended(peptide_field, matcher).ok_or_else(|| {
                        Error::malformed(format!(
                            "Invalid extended peptide format {}",
                            peptide_field
                        ))
                        .at(line_num, Some(layout.peptide))
                    })?;
                (Some(protein), sequence, label, true)
            }
        };

        if !is_ex_sequence(&sequence) {
            return Err(
                Error::malformed(format!("Invalid peptide sequence {} found", sequence))
                    .at(line_num, Some(layout.peptide)),
            );
        }
        let settings = matcher.settings();
        if !label.is_light() && !settings.is_heavy_allowed(label.name()) {
            return Err(
                Error::malformed("Isotope labeled entry found without matching settings")
                    .at(line_num, layout.label),
            );
        }

        let precursor_mz = column_mz(&fields, layout.precursor, &self.format);
        let product_mz = column_mz(&fields, layout.product, &self.format);
        let decoy = is_decoy_row(&fields, layout.decoy);

        let precursors: Vec<PrecursorExplanation> = matcher
            .explain_precursor(&sequence, precursor_mz, &label, explicit_label, decoy)
            .map_err(|e| e.at(line_num, Some(layout.precursor)))?;
        let explanations = matcher
            .explain_products(&sequence, product_mz, precursors)
            .map_err(|e| e.at(line_num, Some(layout.product)))?;

        Ok(TransitionInfo {
            protein,
            sequence,
            precursor_mz,
            product_mz,
            decoy,
            label,
            explicit_label,
            explanations,
        })
    }
}

impl Strategy {
    /// Split an extended peptide name into protein, sequence and label.
    /// The sequence ends at the first `_`.
    fn extended(&self, field: &str, matcher: &MassMatcher) -> Option<(String, String, LabelType)> {
        let regex = match self {
            Strategy::ExtendedPeptide(regex) => regex,
            Strategy::General => return None,
        };
        let captures = regex.captures(field)?;
        let protein = captures.get(1)?.as_str().to_string();
        let packed = captures.get(2)?.as_str();
        let sequence = strip_modifications(packed.split('_').next().unwrap_or_default());
        let label = match captures.get(3).map(|m| m.as_str()) {
            Some(name) if matcher.settings().heavy_label(name).is_some() => {
                LabelType::Heavy(name.to_string())
            }
            _ => LabelType::Light,
        };
        Some((protein, sequence, label))
    }
}
