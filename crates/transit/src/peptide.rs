use std::fmt::Write;

use crate::{
    mass::{Mass, H2O, VALID_AA},
    modification::{Modification, ModificationSet, Site, VariableSite},
};

#[derive(Debug, Clone, PartialEq, PartialOrd)]
pub struct Peptide {
    pub sequence: String,
    /// Modification mass at each residue (0.0 when unmodified)
    pub modifications: Vec<f64>,
    pub nterm: Option<f64>,
    pub cterm: Option<f64>,
    /// Neutral monoisotopic mass, including water and all modifications
    pub monoisotopic: f64,
}

impl TryFrom<&str> for Peptide {
    type Error = char;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let mut monoisotopic = H2O;
        for c in value.bytes() {
            if !VALID_AA.contains(&c) {
                return Err(c as char);
            }
            monoisotopic += c.monoisotopic();
        }

        Ok(Peptide {
            sequence: value.into(),
            modifications: vec![0.0; value.len()],
            nterm: None,
            cterm: None,
            monoisotopic,
        })
    }
}

impl Peptide {
    fn add_mod(&mut self, site: Site, mass: f64) {
        match site {
            Site::NTerm => *self.nterm.get_or_insert(0.0) += mass,
            Site::CTerm => *self.cterm.get_or_insert(0.0) += mass,
            Site::Residue(idx) => self.modifications[idx] += mass,
        }
        self.monoisotopic += mass;
    }

    fn is_free(&self, site: Site) -> bool {
        match site {
            Site::NTerm => self.nterm.is_none(),
            Site::CTerm => self.cterm.is_none(),
            Site::Residue(idx) => self.modifications[idx] == 0.0,
        }
    }

    /// Place the variable modifications of `set`. Indices refer to `variable_mods`.
    pub fn variable_mods(mut self, set: &ModificationSet, variable_mods: &[Modification]) -> Self {
        for VariableSite { site, index } in set.iter() {
            if let Some(m) = variable_mods.get(*index) {
                self.add_mod(*site, m.mass);
            }
        }
        self
    }

    /// Apply static modifications. Sites that already carry a modification
    /// are left untouched.
    pub fn static_mods(mut self, static_mods: &[Modification]) -> Self {
        for m in static_mods {
            for site in m.sites(self.sequence.as_bytes()) {
                if self.is_free(site) {
                    self.add_mod(site, m.mass);
                }
            }
        }
        self
    }

    /// Apply isotope label modifications on top of anything already present
    pub fn label_mods(mut self, label_mods: &[Modification]) -> Self {
        for m in label_mods {
            for site in m.sites(self.sequence.as_bytes()) {
                self.add_mod(site, m.mass);
            }
        }
        self
    }
}

/// Enumerate every placement of up to `max_variable_mods` variable
/// modifications on `sequence`, with at most one modification per site.
///
/// The unmodified set comes first, followed by sets of increasing size. Sets
/// of equal size are ordered lexicographically by (site, modification index).
pub fn modification_sets(
    sequence: &[u8],
    variable_mods: &[Modification],
    max_variable_mods: usize,
) -> Vec<ModificationSet> {
    let mut candidates = variable_mods
        .iter()
        .enumerate()
        .flat_map(|(index, m)| {
            m.sites(sequence)
                .into_iter()
                .map(move |site| VariableSite { site, index })
        })
        .collect::<Vec<_>>();
    candidates.sort();

    let mut sets = vec![ModificationSet::default()];
    let mut current = Vec::new();
    for k in 1..=max_variable_mods.min(candidates.len()) {
        combinations(&candidates, 0, k, &mut current, &mut sets);
    }
    sets
}

fn combinations(
    candidates: &[VariableSite],
    start: usize,
    k: usize,
    current: &mut Vec<VariableSite>,
    sets: &mut Vec<ModificationSet>,
) {
    if current.len() == k {
        sets.push(ModificationSet(current.clone()));
        return;
    }
    for (idx, candidate) in candidates.iter().enumerate().skip(start) {
        if current.iter().any(|c| c.site == candidate.site) {
            continue;
        }
        current.push(*candidate);
        combinations(candidates, idx + 1, k, current, sets);
        current.pop();
    }
}

fn write_mod(f: &mut std::fmt::Formatter<'_>, m: f64) -> std::fmt::Result {
    if m.is_sign_positive() {
        write!(f, "[+{}]", m)
    } else {
        write!(f, "[{}]", m)
    }
}

impl std::fmt::Display for Peptide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(m) = self.nterm {
            write_mod(f, m)?;
            f.write_char('-')?;
        }
        for (residue, m) in self.sequence.chars().zip(self.modifications.iter()) {
            f.write_char(residue)?;
            if *m != 0.0 {
                write_mod(f, *m)?;
            }
        }
        if let Some(m) = self.cterm {
            f.write_char('-')?;
            write_mod(f, m)?;
        }
        Ok(())
    }
}
