//! Accumulates matched transition rows (or FASTA sequence lines) into a
//! protein group record

use std::cmp::Ordering;

use fnv::FnvHashMap;

use crate::enzyme::EnzymeParameters;
use crate::error::{Error, ErrorKind};
use crate::fasta::{clean_sequence, FastaHeader};
use crate::matcher::PrecursorExplanation;
use crate::modification::ModificationSet;
use crate::peptide::Peptide;
use crate::record::{
    Alternative, PeptideRecord, PrecursorRecord, ProteinGroup, TransitionRecord,
};
use crate::row_reader::TransitionInfo;
use crate::settings::Settings;

/// Peptide receiving rows
#[derive(Debug)]
struct ActivePeptide {
    sequence: String,
    begin: Option<usize>,
    end: Option<usize>,
    missed_cleavages: u8,
    decoy: bool,
    /// Modification sets explaining every row so far, in preference order
    mods: Vec<ModificationSet>,
    /// Closed precursors, resolved once the peptide's modifications are final
    groups: Vec<OpenPrecursor>,
}

/// Precursor receiving rows
#[derive(Debug)]
struct OpenPrecursor {
    mz: f64,
    /// Explanations shared by every row so far
    candidates: Vec<PrecursorExplanation>,
    rows: Vec<TransitionInfo>,
}

impl OpenPrecursor {
    fn new(info: TransitionInfo) -> Self {
        OpenPrecursor {
            mz: info.precursor_mz,
            candidates: precursors_of(&info),
            rows: vec![info],
        }
    }
}

#[derive(Debug)]
enum State {
    Idle,
    Peptide(ActivePeptide),
    Precursor(ActivePeptide, OpenPrecursor),
}

fn precursors_of(info: &TransitionInfo) -> Vec<PrecursorExplanation> {
    info.explanations
        .iter()
        .map(|exp| exp.precursor.clone())
        .collect()
}

/// Items of `left` also present in `right`, in `left` order and without repeats
fn intersect<T: PartialEq + Clone>(left: &[T], right: &[T]) -> Vec<T> {
    let mut kept: Vec<T> = Vec::with_capacity(left.len());
    for item in left {
        if right.contains(item) && !kept.contains(item) {
            kept.push(item.clone());
        }
    }
    kept
}

fn compare_transitions(a: &TransitionRecord, b: &TransitionRecord) -> Ordering {
    a.ion
        .cmp(&b.ion)
        .then(a.ordinal.cmp(&b.ordinal))
        .then(a.charge.cmp(&b.charge))
        .then(a.losses.mass.total_cmp(&b.losses.mass))
        .then(a.mass_shift.cmp(&b.mass_shift))
}

fn compare_precursors(a: &PrecursorRecord, b: &PrecursorRecord) -> Ordering {
    a.charge
        .cmp(&b.charge)
        .then(a.label.cmp(&b.label))
        .then(a.mass_shift.cmp(&b.mass_shift))
}

fn same_precursor(a: &PrecursorRecord, b: &PrecursorRecord) -> bool {
    compare_precursors(a, b) == Ordering::Equal
}

/// Sort and remove duplicate transitions
fn complete_transitions(transitions: &mut Vec<TransitionRecord>) {
    transitions.sort_by(compare_transitions);
    transitions.dedup();
}

/// Sort precursors, combining the transitions of equal precursors
fn merge_precursors(mut groups: Vec<PrecursorRecord>) -> Vec<PrecursorRecord> {
    groups.sort_by(compare_precursors);
    let mut precursors: Vec<PrecursorRecord> = Vec::with_capacity(groups.len());
    for group in groups {
        match precursors.last_mut() {
            Some(last) if same_precursor(last, &group) => {
                last.transitions.extend(group.transitions);
                complete_transitions(&mut last.transitions);
            }
            _ => precursors.push(group),
        }
    }
    precursors
}

/// Combine records of the same peptide form, keeping first-seen order
pub(crate) fn merge_peptides(peptides: Vec<PeptideRecord>) -> Vec<PeptideRecord> {
    let mut index: FnvHashMap<(String, ModificationSet, bool), usize> = FnvHashMap::default();
    let mut merged: Vec<PeptideRecord> = Vec::with_capacity(peptides.len());
    for peptide in peptides {
        let key = (
            peptide.sequence.clone(),
            peptide.modifications.clone(),
            peptide.decoy,
        );
        match index.get(&key) {
            Some(&idx) => {
                let existing = &mut merged[idx];
                let mut precursors = std::mem::take(&mut existing.precursors);
                precursors.extend(peptide.precursors);
                existing.precursors = merge_precursors(precursors);
            }
            None => {
                index.insert(key, merged.len());
                merged.push(peptide);
            }
        }
    }
    merged
}

pub struct PeptideGroupBuilder<'s> {
    settings: &'s Settings,
    enzyme: &'s EnzymeParameters,
    pub name: String,
    description: Option<String>,
    alternatives: Vec<Alternative>,
    custom_name: bool,
    peptide_list: bool,
    has_explicit_mods: bool,
    /// Residues appended from FASTA sequence lines
    residues: String,
    /// Protein sequence that peptides are located in
    fasta_sequence: Option<String>,
    peptides: Vec<PeptideRecord>,
    /// Transitions of `peptides`
    transitions: usize,
    state: State,
}

impl<'s> PeptideGroupBuilder<'s> {
    fn new(settings: &'s Settings, enzyme: &'s EnzymeParameters, name: String) -> Self {
        PeptideGroupBuilder {
            settings,
            enzyme,
            name,
            description: None,
            alternatives: Vec::new(),
            custom_name: false,
            peptide_list: false,
            has_explicit_mods: false,
            residues: String::new(),
            fasta_sequence: None,
            peptides: Vec::new(),
            transitions: 0,
            state: State::Idle,
        }
    }

    /// Start a group from a FASTA header line (`>Name ...` or `>>Name ...`)
    pub fn from_header(
        line: &str,
        peptide_list: bool,
        settings: &'s Settings,
        enzyme: &'s EnzymeParameters,
    ) -> Self {
        let header = FastaHeader::parse(line);
        let mut builder = Self::new(settings, enzyme, header.name);
        builder.description = header.description;
        builder.alternatives = header.alternatives;
        builder.custom_name = header.custom_name;
        builder.peptide_list = peptide_list;
        builder
    }

    /// Start a group that places its peptides in a protein already in the document
    pub fn from_protein(
        protein: &ProteinGroup,
        settings: &'s Settings,
        enzyme: &'s EnzymeParameters,
    ) -> Self {
        let mut builder = Self::new(settings, enzyme, protein.name.clone());
        builder.description = protein.description.clone();
        builder.alternatives = protein.alternatives.clone();
        builder.fasta_sequence = protein.sequence.clone();
        builder
    }

    /// Residues appended so far
    pub fn residues(&self) -> &str {
        &self.residues
    }

    /// Append one line of FASTA text: residues for a protein, or a whole
    /// peptide for a peptide list
    pub fn append_sequence(&mut self, line: &str) {
        let (residues, modified) = clean_sequence(line);
        self.has_explicit_mods |= modified;
        if !self.peptide_list {
            self.residues.push_str(&residues);
        } else if !residues.is_empty() {
            let annotated = line
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect::<String>();
            self.peptides.push(PeptideRecord {
                missed_cleavages: self.enzyme.missed_cleavages(&residues),
                modified_sequence: annotated.trim_end_matches('*').to_string(),
                sequence: residues,
                modifications: ModificationSet::default(),
                begin: None,
                end: None,
                decoy: false,
                precursors: Vec::new(),
            });
        }
    }

    /// Add one explained transition row
    pub fn append_transition(&mut self, info: TransitionInfo) -> Result<(), Error> {
        // Rows turn any group into a list of explicitly chosen peptides
        self.peptide_list = true;
        if self.fasta_sequence.is_none() && !self.residues.is_empty() {
            self.fasta_sequence = Some(self.residues.clone());
        }

        let state = std::mem::replace(&mut self.state, State::Idle);
        let state = self.reconcile_peptide(state, &info)?;
        let state = match state {
            State::Idle => State::Peptide(self.start_peptide(&info)?),
            state => state,
        };
        let state = self.reconcile_precursor(state, &info)?;
        self.state = match state {
            State::Precursor(active, mut open) => {
                open.rows.push(info);
                State::Precursor(active, open)
            }
            State::Peptide(active) => State::Precursor(active, OpenPrecursor::new(info)),
            State::Idle => State::Idle,
        };
        Ok(())
    }

    /// Keep the active peptide if the row can belong to it, otherwise close it
    fn reconcile_peptide(&mut self, state: State, info: &TransitionInfo) -> Result<State, Error> {
        let (mut active, open) = match state {
            State::Idle => return Ok(State::Idle),
            State::Peptide(active) => (active, None),
            State::Precursor(active, open) => (active, Some(open)),
        };
        if active.sequence != info.sequence {
            self.complete_peptide(active, open);
            return Ok(State::Idle);
        }

        let row_mods = info.potential_mods();
        let mut mods = intersect(&active.mods, &row_mods);
        let same_mz = open
            .as_ref()
            .map(|open| open.mz == info.precursor_mz)
            .unwrap_or(false);

        if mods.is_empty() && same_mz {
            // The open precursor may belong to a differently modified form
            // of the same peptide: close the finished precursors as one
            // peptide and explain the open rows together with this one.
            active = self.split_peptide(active);
            mods = row_mods;
            if let Some(open) = &open {
                for row in &open.rows {
                    mods = intersect(&mods, &row.potential_mods());
                }
            }
        }

        if !mods.is_empty() {
            active.mods = mods;
            Ok(match open {
                Some(open) => State::Precursor(active, open),
                None => State::Peptide(active),
            })
        } else if same_mz {
            Err(Error::new(
                ErrorKind::AmbiguousModification,
                format!(
                    "Failed to explain all transitions for {} m/z {} with a single set of modifications",
                    info.sequence, info.precursor_mz
                ),
            ))
        } else {
            self.complete_peptide(active, open);
            Ok(State::Idle)
        }
    }

    fn start_peptide(&self, info: &TransitionInfo) -> Result<ActivePeptide, Error> {
        let (begin, end) = match &self.fasta_sequence {
            Some(protein) => match protein.find(&info.sequence) {
                Some(begin) => (Some(begin), Some(begin + info.sequence.len())),
                None => {
                    return Err(Error::new(
                        ErrorKind::SequenceNotFound,
                        format!(
                            "The peptide {} was not found in the sequence {}",
                            info.sequence, self.name
                        ),
                    ))
                }
            },
            None => (None, None),
        };
        Ok(ActivePeptide {
            sequence: info.sequence.clone(),
            begin,
            end,
            missed_cleavages: self.enzyme.missed_cleavages(&info.sequence),
            decoy: info
                .explanations
                .first()
                .map(|exp| exp.is_decoy())
                .unwrap_or(false),
            mods: info.potential_mods(),
            groups: Vec::new(),
        })
    }

    /// Keep the open precursor if the row shares an explanation with it,
    /// otherwise close it
    fn reconcile_precursor(&mut self, state: State, info: &TransitionInfo) -> Result<State, Error> {
        let (mut active, mut open) = match state {
            State::Precursor(active, open) => (active, open),
            state => return Ok(state),
        };
        let candidates = intersect(&open.candidates, &precursors_of(info));
        if !candidates.is_empty() {
            open.candidates = candidates;
            Ok(State::Precursor(active, open))
        } else if open.mz == info.precursor_mz {
            Err(Error::new(
                ErrorKind::AmbiguousModification,
                format!(
                    "Failed to explain all transitions for m/z {} with a single precursor",
                    open.mz
                ),
            ))
        } else {
            active.groups.push(open);
            Ok(State::Peptide(active))
        }
    }

    /// Turn a closed precursor into a record, using its first explanation
    /// under the peptide's final modifications
    fn resolve_precursor(open: OpenPrecursor, modifications: &ModificationSet) -> Option<PrecursorRecord> {
        let precursor = open
            .candidates
            .iter()
            .find(|exp| exp.modifications == *modifications)
            .or_else(|| open.candidates.first())?;

        let mut transitions = open
            .rows
            .iter()
            .filter_map(|row| {
                row.explanations
                    .iter()
                    .find(|exp| exp.precursor == *precursor)
                    .and_then(|exp| exp.product.as_ref())
            })
            .map(|product| TransitionRecord {
                ion: product.kind,
                ordinal: product.ordinal,
                charge: product.charge,
                losses: product.losses.clone(),
                mass_shift: product
                    .mass_shift
                    .or_else(|| precursor.mass_shift.map(|_| 0)),
                mz: product.mz,
            })
            .collect::<Vec<_>>();
        complete_transitions(&mut transitions);

        Some(PrecursorRecord {
            charge: precursor.charge,
            label: precursor.label.clone(),
            mass_shift: precursor.mass_shift,
            mz: precursor.mz,
            transitions,
        })
    }

    fn complete_peptide(&mut self, mut active: ActivePeptide, open: Option<OpenPrecursor>) {
        active.groups.extend(open);
        self.push_peptide(active);
    }

    /// Record the completed precursors of `active` and return an empty
    /// peptide of the same sequence
    fn split_peptide(&mut self, active: ActivePeptide) -> ActivePeptide {
        let next = ActivePeptide {
            sequence: active.sequence.clone(),
            begin: active.begin,
            end: active.end,
            missed_cleavages: active.missed_cleavages,
            decoy: active.decoy,
            mods: Vec::new(),
            groups: Vec::new(),
        };
        self.push_peptide(active);
        next
    }

    fn push_peptide(&mut self, active: ActivePeptide) {
        if active.groups.is_empty() {
            return;
        }
        let modifications = active.mods.into_iter().next().unwrap_or_default();
        let precursors = merge_precursors(
            active
                .groups
                .into_iter()
                .filter_map(|open| Self::resolve_precursor(open, &modifications))
                .collect(),
        );
        let modified_sequence = Peptide::try_from(active.sequence.as_str())
            .map(|peptide| {
                peptide
                    .variable_mods(&modifications, &self.settings.variable_mods)
                    .to_string()
            })
            .unwrap_or_else(|_| active.sequence.clone());

        self.transitions += precursors.iter().map(|p| p.transitions.len()).sum::<usize>();
        self.peptides.push(PeptideRecord {
            sequence: active.sequence,
            modified_sequence,
            modifications,
            begin: active.begin,
            end: active.end,
            missed_cleavages: active.missed_cleavages,
            decoy: active.decoy,
            precursors,
        });
    }

    /// Peptides added so far, the active one included
    pub fn peptide_count(&self) -> usize {
        let active = match self.state {
            State::Idle => 0,
            _ => 1,
        };
        self.peptides.len() + active
    }

    /// Transitions added so far. Rows of unresolved precursors count once
    /// each, so repeated rows are counted until their precursor is resolved.
    pub fn transition_count(&self) -> usize {
        let rows = |groups: &[OpenPrecursor]| groups.iter().map(|g| g.rows.len()).sum::<usize>();
        let active = match &self.state {
            State::Idle => 0,
            State::Peptide(active) => rows(&active.groups),
            State::Precursor(active, open) => rows(&active.groups) + open.rows.len(),
        };
        self.transitions + active
    }

    /// Flush the active peptide and build the group record
    pub fn into_group(mut self) -> ProteinGroup {
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Idle => {}
            State::Peptide(active) => self.complete_peptide(active, None),
            State::Precursor(active, open) => self.complete_peptide(active, Some(open)),
        }

        let auto_manage = !self.has_explicit_mods;
        if self.peptide_list {
            let peptides = merge_peptides(std::mem::take(&mut self.peptides));
            let peptide_list = self.fasta_sequence.is_none();
            ProteinGroup {
                decoy: peptide_list && peptides.iter().any(|p| p.decoy),
                name: self.name,
                description: self.description,
                alternatives: self.alternatives,
                sequence: self.fasta_sequence,
                custom_name: self.custom_name,
                peptide_list,
                auto_manage,
                peptides,
            }
        } else {
            let peptides = match self.settings.digest {
                true => self.digest(),
                false => Vec::new(),
            };
            ProteinGroup {
                name: self.name,
                description: self.description,
                alternatives: self.alternatives,
                sequence: Some(self.residues),
                custom_name: self.custom_name,
                peptide_list: false,
                decoy: false,
                auto_manage,
                peptides,
            }
        }
    }

    fn digest(&self) -> Vec<PeptideRecord> {
        self.enzyme
            .digest(&self.residues)
            .into_iter()
            .map(|digest| PeptideRecord {
                modified_sequence: digest.sequence.clone(),
                sequence: digest.sequence,
                modifications: ModificationSet::default(),
                begin: Some(digest.begin),
                end: Some(digest.end),
                missed_cleavages: digest.missed_cleavages,
                decoy: false,
                precursors: Vec::new(),
            })
            .collect()
    }
}
