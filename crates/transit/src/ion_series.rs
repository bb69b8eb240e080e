use serde::{Deserialize, Serialize};

use crate::mass::{Mass, CO, H, NH3};
use crate::peptide::Peptide;

/// Product ion types a transition can be explained by
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    /// The intact precursor, measured as a product
    Precursor,
    A,
    B,
    C,
    X,
    Y,
    Z,
}

impl Kind {
    pub fn is_n_terminal(&self) -> bool {
        matches!(self, Kind::A | Kind::B | Kind::C)
    }

    /// Neutral mass added to the bare residue sum of a fragment
    fn offset(&self) -> f64 {
        match self {
            Kind::A => -CO,
            Kind::C => NH3,
            Kind::X => CO - 2.0 * H,
            Kind::Z => -NH3,
            Kind::Precursor | Kind::B | Kind::Y => 0.0,
        }
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Kind::Precursor => "precursor",
            Kind::A => "a",
            Kind::B => "b",
            Kind::C => "c",
            Kind::X => "x",
            Kind::Y => "y",
            Kind::Z => "z",
        })
    }
}

/// Theoretical fragment ion
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Ion {
    pub kind: Kind,
    /// Number of residues in the fragment
    pub ordinal: usize,
    /// Neutral fragment mass (no charge)
    pub monoisotopic_mass: f64,
}

impl Ion {
    /// Residues covered by this fragment within a peptide of `sequence`
    pub fn residues<'s>(&self, sequence: &'s [u8]) -> &'s [u8] {
        let ordinal = self.ordinal.min(sequence.len());
        match self.kind {
            Kind::Precursor => sequence,
            Kind::A | Kind::B | Kind::C => &sequence[..ordinal],
            Kind::X | Kind::Y | Kind::Z => &sequence[sequence.len() - ordinal..],
        }
    }
}

/// Fragment ladder of a single ion kind. N-terminal ions are yielded by
/// increasing ordinal, C-terminal ions by decreasing ordinal, and the
/// precursor kind yields the intact peptide once.
pub struct IonSeries {
    kind: Kind,
    /// `prefix[k]` is the mass of the first `k` residues, N-terminal mod included
    prefix: Vec<f64>,
    monoisotopic: f64,
    step: usize,
}

impl IonSeries {
    pub fn new(peptide: &Peptide, kind: Kind) -> Self {
        let mut prefix = Vec::with_capacity(peptide.sequence.len() + 1);
        let mut sum = peptide.nterm.unwrap_or_default();
        prefix.push(sum);
        for (residue, modification) in peptide.sequence.bytes().zip(&peptide.modifications) {
            sum += residue.monoisotopic() + modification;
            prefix.push(sum);
        }
        Self {
            kind,
            prefix,
            monoisotopic: peptide.monoisotopic,
            step: 0,
        }
    }

    fn len(&self) -> usize {
        self.prefix.len() - 1
    }
}

impl Iterator for IonSeries {
    type Item = Ion;

    fn next(&mut self) -> Option<Ion> {
        let len = self.len();
        self.step += 1;
        let (ordinal, mass) = match self.kind {
            Kind::Precursor if self.step == 1 => (len, self.monoisotopic),
            Kind::Precursor => return None,
            _ if self.step >= len => return None,
            kind if kind.is_n_terminal() => (self.step, self.prefix[self.step]),
            // Everything after the first `step` residues
            _ => (len - self.step, self.monoisotopic - self.prefix[self.step]),
        };
        Some(Ion {
            kind: self.kind,
            ordinal,
            monoisotopic_mass: mass + self.kind.offset(),
        })
    }
}
