//! Immutable records produced by an import, and a read-only summary of the
//! document they are imported into

use fnv::{FnvHashMap, FnvHashSet};
use serde::{Deserialize, Serialize};

use crate::builder::merge_peptides;
pub use crate::fasta::Alternative;
use crate::ion_series::Kind;
use crate::modification::{LabelType, Losses, ModificationSet};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub ion: Kind,
    pub ordinal: usize,
    pub charge: u8,
    pub losses: Losses,
    /// Decoy m/z shift, `Some` only for transitions of decoy precursors
    pub mass_shift: Option<i32>,
    pub mz: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PrecursorRecord {
    pub charge: u8,
    pub label: LabelType,
    pub mass_shift: Option<i32>,
    pub mz: f64,
    pub transitions: Vec<TransitionRecord>,
}

impl PrecursorRecord {
    pub fn is_decoy(&self) -> bool {
        self.mass_shift.is_some()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeptideRecord {
    pub sequence: String,
    /// Sequence with variable modifications written inline, e.g. `PEPM[+15.9949]K`
    pub modified_sequence: String,
    pub modifications: ModificationSet,
    /// Offset of the first residue in the parent protein
    pub begin: Option<usize>,
    /// Offset one past the last residue in the parent protein
    pub end: Option<usize>,
    pub missed_cleavages: u8,
    pub decoy: bool,
    pub precursors: Vec<PrecursorRecord>,
}

impl PeptideRecord {
    pub fn transition_count(&self) -> usize {
        self.precursors.iter().map(|p| p.transitions.len()).sum()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProteinGroup {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub alternatives: Vec<Alternative>,
    /// Residues of a FASTA protein; `None` for peptide lists
    pub sequence: Option<String>,
    pub custom_name: bool,
    pub peptide_list: bool,
    pub decoy: bool,
    /// Cleared when the peptides were supplied explicitly with modifications
    pub auto_manage: bool,
    pub peptides: Vec<PeptideRecord>,
}

impl ProteinGroup {
    pub fn peptide_count(&self) -> usize {
        self.peptides.len()
    }

    pub fn transition_count(&self) -> usize {
        self.peptides.iter().map(PeptideRecord::transition_count).sum()
    }

    /// Do both groups stand for the same protein or peptide list?
    pub fn same_protein(&self, other: &ProteinGroup) -> bool {
        self.name == other.name
            && self.sequence == other.sequence
            && self.peptide_list == other.peptide_list
            && self.decoy == other.decoy
    }

    /// Fold the peptides of `other` into this group. Repeated peptide forms
    /// are combined, everything else is appended.
    pub fn merge(&mut self, other: ProteinGroup) {
        let mut peptides = std::mem::take(&mut self.peptides);
        peptides.extend(other.peptides);
        self.peptides = merge_peptides(peptides);
        self.auto_manage &= other.auto_manage;
        for alt in other.alternatives {
            if !self.alternatives.contains(&alt) {
                self.alternatives.push(alt);
            }
        }
    }
}

/// What an import needs to know about the document it is adding to
#[derive(Clone, Debug, Default)]
pub struct Document {
    sequences: FnvHashSet<String>,
    proteins: FnvHashMap<String, ProteinGroup>,
    names: FnvHashSet<String>,
    peptides: usize,
    transitions: usize,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_groups<'a, I: IntoIterator<Item = &'a ProteinGroup>>(groups: I) -> Self {
        let mut document = Self::default();
        for group in groups {
            document.add(group);
        }
        document
    }

    pub fn add(&mut self, group: &ProteinGroup) {
        self.names.insert(group.name.clone());
        self.peptides += group.peptide_count();
        self.transitions += group.transition_count();
        if let Some(sequence) = group.sequence.as_ref().filter(|_| !group.peptide_list) {
            self.sequences.insert(sequence.clone());
            // proteins are remembered without their peptides
            self.proteins
                .entry(group.name.clone())
                .or_insert_with(|| ProteinGroup {
                    peptides: Vec::new(),
                    ..group.clone()
                });
        }
    }

    /// Does the document hold a FASTA protein with exactly these residues?
    pub fn contains_sequence(&self, sequence: &str) -> bool {
        self.sequences.contains(sequence)
    }

    /// A FASTA protein of the document, by name
    pub fn protein(&self, name: &str) -> Option<&ProteinGroup> {
        self.proteins.get(name)
    }

    pub fn is_name_used(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn peptide_count(&self) -> usize {
        self.peptides
    }

    pub fn transition_count(&self) -> usize {
        self.transitions
    }
}
