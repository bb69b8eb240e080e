use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::enzyme::{Enzyme, EnzymeParameters};
use crate::ion_series::Kind;
use crate::mass::Tolerance;
use crate::modification::{
    validate_mods, validate_var_mods, IsotopeLabel, LabelType, Modification, NeutralLoss,
    ValueOrVec,
};

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct EnzymeBuilder {
    /// How many missed cleavages to use when digesting
    pub missed_cleavages: Option<u8>,
    /// Minimum digested peptide length
    pub min_len: Option<usize>,
    /// Maximum digested peptide length
    pub max_len: Option<usize>,
    pub cleave_at: Option<String>,
    pub restrict: Option<char>,
    pub c_terminal: Option<bool>,
}

impl Default for EnzymeBuilder {
    fn default() -> Self {
        Self {
            missed_cleavages: Some(0),
            min_len: Some(5),
            max_len: Some(50),
            cleave_at: Some("KR".into()),
            restrict: Some('P'),
            c_terminal: Some(true),
        }
    }
}

impl From<EnzymeBuilder> for EnzymeParameters {
    fn from(en: EnzymeBuilder) -> EnzymeParameters {
        EnzymeParameters {
            missed_cleavages: en.missed_cleavages.unwrap_or(0),
            min_len: en.min_len.unwrap_or(5),
            max_len: en.max_len.unwrap_or(50),
            enzyme: Enzyme::new(
                &en.cleave_at.unwrap_or_else(|| "KR".into()),
                en.restrict,
                en.c_terminal.unwrap_or(true),
            ),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct HeavyLabelBuilder {
    pub name: String,
    pub mods: Option<HashMap<String, f64>>,
}

#[derive(Deserialize, Default, Clone, Debug)]
/// Import settings as deserialized from JSON; every field is optional
pub struct Builder {
    /// m/z matching tolerance for precursors and products
    pub tolerance: Option<Tolerance>,
    /// Lowest m/z the instrument can measure
    pub min_mz: Option<f64>,
    /// Highest m/z the instrument can measure
    pub max_mz: Option<f64>,
    /// Inclusive range of precursor charges to consider
    pub precursor_charge: Option<(u8, u8)>,
    /// Maximum product ion charge
    pub max_fragment_charge: Option<u8>,
    /// Which kind of fragment ions to match (a, b, c, x, y, z)
    pub ion_kinds: Option<Vec<Kind>>,
    /// Static modifications to add to matching amino acids
    pub static_mods: Option<HashMap<String, f64>>,
    /// Variable modifications to add to matching amino acids
    pub variable_mods: Option<HashMap<String, ValueOrVec>>,
    /// Limit number of variable modifications on a peptide
    pub max_variable_mods: Option<usize>,
    /// Named heavy isotope labels
    pub heavy_labels: Option<Vec<HeavyLabelBuilder>>,
    pub neutral_losses: Option<Vec<NeutralLoss>>,
    /// Limit number of neutral losses on a product ion
    pub max_neutral_losses: Option<usize>,
    /// Inclusive window of integer m/z shifts tried for decoy rows
    pub decoy_mass_shift: Option<(i32, i32)>,
    pub enzyme: Option<EnzymeBuilder>,
    /// Populate imported FASTA proteins with their enzymatic digest
    pub digest: Option<bool>,
    pub max_peptides: Option<usize>,
    pub max_transitions: Option<usize>,
}

impl Builder {
    pub fn make_parameters(self) -> Settings {
        let mut precursor_charge = self.precursor_charge.unwrap_or((1, 6));
        if precursor_charge.0 > precursor_charge.1 {
            log::warn!(
                "Minimum precursor charge greater than maximum! Typical usage: `precursor_charge: [1, 6]`"
            );
            precursor_charge = (precursor_charge.1, precursor_charge.0);
        }
        if precursor_charge.0 == 0 {
            log::warn!("Precursor charge 0 is not meaningful, using 1 as the minimum");
            precursor_charge.0 = 1;
            precursor_charge.1 = precursor_charge.1.max(1);
        }

        let mut decoy_mass_shift = self.decoy_mass_shift.unwrap_or((-5, 5));
        if decoy_mass_shift.0 > decoy_mass_shift.1 {
            log::warn!("Minimum decoy mass shift greater than maximum, swapping them");
            decoy_mass_shift = (decoy_mass_shift.1, decoy_mass_shift.0);
        }

        let tolerance = self.tolerance.unwrap_or_default();
        check_tolerance(&tolerance);

        let mut heavy_labels = Vec::new();
        for label in self.heavy_labels.unwrap_or_default() {
            if label.name.is_empty() || label.name == "light" {
                log::error!("Skipping isotope label with invalid name `{}`", label.name);
                continue;
            }
            if heavy_labels
                .iter()
                .any(|l: &IsotopeLabel| l.name == label.name)
            {
                log::error!("Skipping duplicate isotope label `{}`", label.name);
                continue;
            }
            heavy_labels.push(IsotopeLabel {
                name: label.name,
                mods: validate_mods(label.mods),
            });
        }

        let static_mods = validate_mods(
            self.static_mods
                .or_else(|| Some([("C".to_string(), 57.021464)].into())),
        );

        Settings {
            tolerance,
            min_mz: self.min_mz.unwrap_or(50.0),
            max_mz: self.max_mz.unwrap_or(1500.0),
            precursor_charge,
            max_fragment_charge: self.max_fragment_charge.unwrap_or(3).max(1),
            ion_kinds: self.ion_kinds.unwrap_or_else(|| vec![Kind::B, Kind::Y]),
            static_mods,
            variable_mods: validate_var_mods(self.variable_mods),
            max_variable_mods: self.max_variable_mods.unwrap_or(2),
            heavy_labels,
            neutral_losses: self.neutral_losses.unwrap_or_default(),
            max_neutral_losses: self.max_neutral_losses.unwrap_or(1),
            decoy_mass_shift,
            enzyme: self.enzyme.unwrap_or_default(),
            digest: self.digest.unwrap_or(false),
            max_peptides: self.max_peptides.unwrap_or(200_000),
            max_transitions: self.max_transitions.unwrap_or(5_000_000),
        }
    }
}

fn check_tolerance(tolerance: &Tolerance) {
    let (lo, hi) = match tolerance {
        Tolerance::Ppm(lo, hi) => (lo, hi),
        Tolerance::Da(lo, hi) => (lo, hi),
    };
    if lo > hi {
        log::warn!("Tolerance window is empty: [{} - {}]", lo, hi);
    }
    if *lo > 0.0 || *hi < 0.0 {
        log::warn!(
            "Tolerance window does not contain the observed m/z: [{} - {}]",
            lo,
            hi
        );
    }
}

/// Validated, immutable import settings
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Settings {
    pub tolerance: Tolerance,
    pub min_mz: f64,
    pub max_mz: f64,
    pub precursor_charge: (u8, u8),
    pub max_fragment_charge: u8,
    pub ion_kinds: Vec<Kind>,
    pub static_mods: Vec<Modification>,
    pub variable_mods: Vec<Modification>,
    pub max_variable_mods: usize,
    pub heavy_labels: Vec<IsotopeLabel>,
    pub neutral_losses: Vec<NeutralLoss>,
    pub max_neutral_losses: usize,
    pub decoy_mass_shift: (i32, i32),
    pub enzyme: EnzymeBuilder,
    pub digest: bool,
    pub max_peptides: usize,
    pub max_transitions: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Builder::default().make_parameters()
    }
}

impl Settings {
    /// Can the instrument measure this m/z?
    pub fn is_measurable(&self, mz: f64) -> bool {
        mz >= self.min_mz && mz <= self.max_mz
    }

    pub fn heavy_label(&self, name: &str) -> Option<&IsotopeLabel> {
        self.heavy_labels.iter().find(|l| l.name == name)
    }

    /// Modifications implied by an isotope label, or `None` when the label
    /// is not configured
    pub fn label_mods(&self, label: &LabelType) -> Option<&[Modification]> {
        match label {
            LabelType::Light => Some(&[][..]),
            LabelType::Heavy(name) => self.heavy_label(name).map(|l| l.mods.as_slice()),
        }
    }

    /// Is a heavy label with this name configured with at least one modification?
    pub fn is_heavy_allowed(&self, name: &str) -> bool {
        self.heavy_label(name)
            .map(|l| !l.mods.is_empty())
            .unwrap_or(false)
    }

    pub fn heavy_label_types(&self) -> impl Iterator<Item = LabelType> + '_ {
        self.heavy_labels
            .iter()
            .map(|l| LabelType::Heavy(l.name.clone()))
    }

    /// Decoy m/z shifts in search order: 0, -1, 1, -2, 2, ... restricted to
    /// the configured window
    pub fn decoy_shifts(&self) -> Vec<i32> {
        let (lo, hi) = self.decoy_mass_shift;
        let reach = lo.unsigned_abs().max(hi.unsigned_abs()) as i32;
        let mut shifts = Vec::new();
        for step in 0..=reach {
            for shift in [-step, step] {
                if shift >= lo && shift <= hi && !shifts.contains(&shift) {
                    shifts.push(shift);
                }
            }
        }
        shifts
    }

    pub fn enzyme_parameters(&self) -> EnzymeParameters {
        self.enzyme.clone().into()
    }

    pub fn precursor_charges(&self) -> impl Iterator<Item = u8> {
        self.precursor_charge.0..=self.precursor_charge.1
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::modification::ModificationSpecificity;

    #[test]
    fn defaults() {
        let settings = Settings::default();
        assert_eq!(settings.tolerance, Tolerance::Da(-0.055, 0.055));
        assert_eq!(settings.precursor_charge, (1, 6));
        assert_eq!(settings.max_fragment_charge, 3);
        assert_eq!(settings.ion_kinds, vec![Kind::B, Kind::Y]);
        assert_eq!(
            settings.static_mods,
            vec![Modification {
                specificity: ModificationSpecificity::Residue(b'C'),
                mass: 57.021464
            }]
        );
        assert!(settings.variable_mods.is_empty());
        assert!(settings.heavy_labels.is_empty());
        assert!(!settings.digest);
        assert!(settings.is_measurable(50.0));
        assert!(!settings.is_measurable(1500.1));
    }

    #[test]
    fn deserialize_builder() {
        let json = r#"{
            "tolerance": { "ppm": [-20.0, 20.0] },
            "precursor_charge": [3, 2],
            "static_mods": {},
            "variable_mods": { "M": 15.994915, "^": [42.010565] },
            "heavy_labels": [
                { "name": "heavy", "mods": { "K": 8.014199, "R": 10.008269 } },
                { "name": "light", "mods": { "K": 1.0 } }
            ],
            "neutral_losses": [{ "name": "H2O", "mass": 18.010565, "residues": "STED" }],
            "decoy_mass_shift": [-2, 3]
        }"#;
        let builder: Builder = serde_json::from_str(json).unwrap();
        let settings = builder.make_parameters();
        assert_eq!(settings.tolerance, Tolerance::Ppm(-20.0, 20.0));
        assert_eq!(settings.precursor_charge, (2, 3));
        assert!(settings.static_mods.is_empty());
        assert_eq!(settings.variable_mods.len(), 2);
        assert_eq!(
            settings.variable_mods[0].specificity,
            ModificationSpecificity::PeptideN(None)
        );
        assert_eq!(settings.heavy_labels.len(), 1);
        assert!(settings.is_heavy_allowed("heavy"));
        assert!(!settings.is_heavy_allowed("medium"));
        assert_eq!(settings.heavy_label("heavy").unwrap().mods.len(), 2);
        assert_eq!(settings.neutral_losses[0].residues, "STED");
        assert_eq!(settings.decoy_shifts(), vec![0, -1, 1, -2, 2, 3]);
    }

    #[test]
    fn label_modifications() {
        let settings = Settings::default();
        assert_eq!(settings.label_mods(&LabelType::Light), Some(&[][..]));
        assert_eq!(
            settings.label_mods(&LabelType::Heavy("heavy".into())),
            None
        );
    }

    #[test]
    fn default_decoy_shifts() {
        let settings = Settings::default();
        assert_eq!(
            settings.decoy_shifts(),
            vec![0, -1, 1, -2, 2, -3, 3, -4, 4, -5, 5]
        );
    }
}
