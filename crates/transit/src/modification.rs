use std::{
    collections::HashMap,
    fmt::{Display, Write},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::mass::VALID_AA;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ModificationSpecificity {
    PeptideN(Option<u8>),
    PeptideC(Option<u8>),
    Residue(u8),
}

impl Display for ModificationSpecificity {
    /// `^` and `$` mark the peptide termini, optionally followed by a residue
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (terminus, residue) = match *self {
            ModificationSpecificity::PeptideN(residue) => (Some('^'), residue),
            ModificationSpecificity::PeptideC(residue) => (Some('$'), residue),
            ModificationSpecificity::Residue(residue) => (None, Some(residue)),
        };
        terminus
            .into_iter()
            .chain(residue.map(char::from))
            .try_for_each(|c| f.write_char(c))
    }
}

impl Serialize for ModificationSpecificity {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InvalidModification {
    Empty,
    InvalidResidue(char),
    TooLong(String),
}

impl FromStr for ModificationSpecificity {
    type Err = InvalidModification;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() > 2 {
            return Err(InvalidModification::TooLong(s.into()));
        }
        let residue = |rest: &str| match rest.chars().next() {
            Some(c) if VALID_AA.contains(&(c as u8)) => Ok(Some(c as u8)),
            Some(c) => Err(InvalidModification::InvalidResidue(c)),
            None => Ok(None),
        };
        if let Some(rest) = s.strip_prefix('^') {
            return residue(rest).map(ModificationSpecificity::PeptideN);
        }
        if let Some(rest) = s.strip_prefix('$') {
            return residue(rest).map(ModificationSpecificity::PeptideC);
        }
        match residue(s)? {
            Some(r) => Ok(ModificationSpecificity::Residue(r)),
            None => Err(InvalidModification::Empty),
        }
    }
}

/// Where on a peptide a modification sits
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Site {
    NTerm,
    Residue(usize),
    CTerm,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct Modification {
    pub specificity: ModificationSpecificity,
    pub mass: f64,
}

impl Modification {
    /// All sites of `sequence` this modification can occupy
    pub fn sites(&self, sequence: &[u8]) -> Vec<Site> {
        match self.specificity {
            ModificationSpecificity::PeptideN(r) => match (r, sequence.first()) {
                (None, Some(_)) => vec![Site::NTerm],
                (Some(r), Some(first)) if r == *first => vec![Site::NTerm],
                _ => Vec::new(),
            },
            ModificationSpecificity::PeptideC(r) => match (r, sequence.last()) {
                (None, Some(_)) => vec![Site::CTerm],
                (Some(r), Some(last)) if r == *last => vec![Site::CTerm],
                _ => Vec::new(),
            },
            ModificationSpecificity::Residue(r) => sequence
                .iter()
                .enumerate()
                .filter(|(_, aa)| **aa == r)
                .map(|(idx, _)| Site::Residue(idx))
                .collect(),
        }
    }
}

/// One placement of a configured variable modification
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VariableSite {
    pub site: Site,
    /// Index into [`crate::settings::Settings::variable_mods`]
    pub index: usize,
}

/// A set of variable modification placements on a peptide. The empty set is
/// the unmodified peptide (static and label modifications still apply).
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModificationSet(pub Vec<VariableSite>);

impl ModificationSet {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &VariableSite> {
        self.0.iter()
    }
}

/// Isotope label type of a precursor
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelType {
    Light,
    Heavy(String),
}

impl LabelType {
    pub const HEAVY: &'static str = "heavy";

    pub fn is_light(&self) -> bool {
        matches!(self, LabelType::Light)
    }

    pub fn name(&self) -> &str {
        match self {
            LabelType::Light => "light",
            LabelType::Heavy(name) => name,
        }
    }
}

impl Display for LabelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A named heavy isotope labeling scheme
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IsotopeLabel {
    pub name: String,
    pub mods: Vec<Modification>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NeutralLoss {
    pub name: String,
    pub mass: f64,
    /// Residues that can lose this fragment; empty means any residue
    #[serde(default)]
    pub residues: String,
}

impl NeutralLoss {
    pub fn applies_to(&self, residues: &[u8]) -> bool {
        self.residues.is_empty() || residues.iter().any(|r| self.residues.as_bytes().contains(r))
    }
}

/// A combination of neutral losses applied to one product ion
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Losses {
    pub names: Vec<String>,
    pub mass: f64,
}

impl Losses {
    pub fn new(losses: &[&NeutralLoss]) -> Self {
        Losses {
            names: losses.iter().map(|l| l.name.clone()).collect(),
            mass: losses.iter().map(|l| l.mass).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValueOrVec {
    Value(f64),
    Vec(Vec<f64>),
}

impl From<ValueOrVec> for Vec<f64> {
    fn from(value: ValueOrVec) -> Self {
        match value {
            ValueOrVec::Value(v) => vec![v],
            ValueOrVec::Vec(v) => v,
        }
    }
}

fn log_invalid(s: &str, err: InvalidModification) {
    match err {
        InvalidModification::Empty => {
            log::error!("Skipping invalid modification string: empty")
        }
        InvalidModification::InvalidResidue(c) => {
            log::error!(
                "Skipping invalid modification string `{}`: unrecognized residue ({})",
                s,
                c
            )
        }
        InvalidModification::TooLong(s) => {
            log::error!("Skipping invalid modification string: {} is too long", s)
        }
    }
}

/// Parse and sort static (or label) modifications. Invalid entries are
/// logged and skipped.
pub fn validate_mods(input: Option<HashMap<String, f64>>) -> Vec<Modification> {
    let mut output = Vec::new();
    if let Some(input) = input {
        for (s, mass) in input {
            match ModificationSpecificity::from_str(&s) {
                Ok(specificity) => output.push(Modification { specificity, mass }),
                Err(err) => log_invalid(&s, err),
            }
        }
    }
    output.sort_by(|a, b| {
        a.specificity
            .cmp(&b.specificity)
            .then(a.mass.total_cmp(&b.mass))
    });
    output
}

/// Parse and sort variable modifications, flattening multiple masses per site
pub fn validate_var_mods(input: Option<HashMap<String, ValueOrVec>>) -> Vec<Modification> {
    let mut output = input
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(s, masses)| match ModificationSpecificity::from_str(&s) {
            Ok(specificity) => Some((specificity, Vec::<f64>::from(masses))),
            Err(err) => {
                log_invalid(&s, err);
                None
            }
        })
        .flat_map(|(specificity, masses)| {
            masses
                .into_iter()
                .map(move |mass| Modification { specificity, mass })
        })
        .collect::<Vec<_>>();
    output.sort_by(|a, b| {
        a.specificity
            .cmp(&b.specificity)
            .then(a.mass.total_cmp(&b.mass))
    });
    output
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_modifications() {
        use InvalidModification::*;
        use ModificationSpecificity::*;
        assert_eq!("^".parse::<ModificationSpecificity>(), Ok(PeptideN(None)));
        assert_eq!(
            "^M".parse::<ModificationSpecificity>(),
            Ok(PeptideN(Some(b'M')))
        );
        assert_eq!(
            "$K".parse::<ModificationSpecificity>(),
            Ok(PeptideC(Some(b'K')))
        );
        assert_eq!("M".parse::<ModificationSpecificity>(), Ok(Residue(b'M')));
        assert_eq!(
            "Z".parse::<ModificationSpecificity>(),
            Err(InvalidResidue('Z'))
        );
        assert_eq!("".parse::<ModificationSpecificity>(), Err(Empty));
        assert_eq!(
            "^MK".parse::<ModificationSpecificity>(),
            Err(TooLong("^MK".into()))
        );
    }

    #[test]
    fn modification_sites() {
        let ox = Modification {
            specificity: ModificationSpecificity::Residue(b'M'),
            mass: 15.994915,
        };
        assert_eq!(
            ox.sites(b"MAMK"),
            vec![Site::Residue(0), Site::Residue(2)]
        );
        let acetyl = Modification {
            specificity: ModificationSpecificity::PeptideN(None),
            mass: 42.010565,
        };
        assert_eq!(acetyl.sites(b"MAMK"), vec![Site::NTerm]);
        let cterm = Modification {
            specificity: ModificationSpecificity::PeptideC(Some(b'R')),
            mass: 1.0,
        };
        assert!(cterm.sites(b"MAMK").is_empty());
    }

    #[test]
    fn variable_mods_are_flattened_and_sorted() {
        let mut input = HashMap::new();
        input.insert("M".to_string(), ValueOrVec::Value(15.994915));
        input.insert("S".to_string(), ValueOrVec::Vec(vec![79.966331, 1.0]));
        input.insert("X".to_string(), ValueOrVec::Value(1.0));
        let mods = validate_var_mods(Some(input));
        let summary = mods
            .iter()
            .map(|m| (m.specificity.to_string(), m.mass))
            .collect::<Vec<_>>();
        assert_eq!(
            summary,
            vec![
                ("M".to_string(), 15.994915),
                ("S".to_string(), 1.0),
                ("S".to_string(), 79.966331)
            ]
        );

        // each listed mass is kept, repeats included
        let mut input = HashMap::new();
        input.insert("C".to_string(), ValueOrVec::Vec(vec![57.021464, 57.021464]));
        assert_eq!(validate_var_mods(Some(input)).len(), 2);
        assert!(validate_var_mods(None).is_empty());
    }

    #[test]
    fn neutral_loss_residues() {
        let water = NeutralLoss {
            name: "H2O".into(),
            mass: 18.010565,
            residues: "STED".into(),
        };
        assert!(water.applies_to(b"PEP"));
        assert!(!water.applies_to(b"PKP"));
        let losses = Losses::new(&[&water, &water]);
        assert_eq!(losses.names.len(), 2);
        assert!((losses.mass - 36.02113).abs() < 1e-9);
    }
}
