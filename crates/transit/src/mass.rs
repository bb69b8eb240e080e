use serde::{Deserialize, Serialize};

pub const H2O: f64 = 18.0105646863;
pub const PROTON: f64 = 1.007276466621;
pub const NH3: f64 = 17.0265491015;
pub const CO: f64 = 27.9949146221;
pub const H: f64 = 1.00782503207;

#[derive(Copy, Clone, Serialize, Deserialize, Debug, PartialEq, PartialOrd)]
#[serde(rename_all = "lowercase")]
pub enum Tolerance {
    Ppm(f64, f64),
    Da(f64, f64),
}

impl Default for Tolerance {
    fn default() -> Self {
        Tolerance::Da(-0.055, 0.055)
    }
}

impl Tolerance {
    /// Compute the (`lower`, `upper`) window (in Da) around an observed m/z
    pub fn bounds(&self, center: f64) -> (f64, f64) {
        match self {
            Tolerance::Ppm(lo, hi) => {
                let delta_lo = center * lo / 1_000_000.0;
                let delta_hi = center * hi / 1_000_000.0;
                (center + delta_lo, center + delta_hi)
            }
            Tolerance::Da(lo, hi) => (center + lo, center + hi),
        }
    }

    /// Is the theoretical value `rhs` inside the window around `center`?
    pub fn contains(&self, center: f64, rhs: f64) -> bool {
        let (lo, hi) = self.bounds(center);
        rhs >= lo && rhs <= hi
    }
}

/// Convert a neutral monoisotopic mass into an m/z value
pub fn mz(monoisotopic: f64, charge: u8) -> f64 {
    let charge = charge as f64;
    (monoisotopic + charge * PROTON) / charge
}

/// Round to 4 decimal places, the precision used when reporting m/z values
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

pub trait Mass {
    fn monoisotopic(&self) -> f64;
}

pub const VALID_AA: [u8; 22] = [
    b'A', b'C', b'D', b'E', b'F', b'G', b'H', b'I', b'K', b'L', b'M', b'N', b'P', b'Q', b'R', b'S',
    b'T', b'V', b'W', b'Y', b'U', b'O',
];

impl Mass for u8 {
    fn monoisotopic(&self) -> f64 {
        match self {
            b'A' => 71.037113805,
            b'R' => 156.10111105,
            b'N' => 114.04292747,
            b'D' => 115.026943065,
            b'C' => 103.009184505,
            b'E' => 129.042593135,
            b'Q' => 128.05857754,
            b'G' => 57.021463735,
            b'H' => 137.058911875,
            b'I' => 113.084064015,
            b'L' => 113.084064015,
            b'K' => 128.09496305,
            b'M' => 131.040484645,
            b'F' => 147.068413945,
            b'P' => 97.052763875,
            b'S' => 87.032028435,
            b'T' => 101.047678505,
            b'W' => 186.07931298,
            b'Y' => 163.063328575,
            b'V' => 99.068413945,
            b'U' => 150.953633405,
            b'O' => 237.147726925,
            _ => unreachable!("BUG: invalid amino acid {}", *self as char),
        }
    }
}

/// Is `sequence` a valid residue sequence, allowing bracketed modification
/// annotations such as `PEPC[+57.0]TIDEK`?
pub fn is_ex_sequence(sequence: &str) -> bool {
    let mut residues = 0;
    let mut in_note = false;
    for b in sequence.bytes() {
        match (in_note, b) {
            (false, b'[') if residues > 0 => in_note = true,
            (false, b) if VALID_AA.contains(&b) => residues += 1,
            (false, _) => return false,
            (true, b'[') => return false,
            (true, b']') => in_note = false,
            (true, _) => {}
        }
    }
    residues > 0 && !in_note
}

/// Remove bracket-delimited annotations from a sequence
pub fn strip_modifications(sequence: &str) -> String {
    let mut stripped = String::with_capacity(sequence.len());
    let mut in_note = false;
    for c in sequence.chars() {
        match c {
            '[' => in_note = true,
            ']' if in_note => in_note = false,
            _ if !in_note => stripped.push(c),
            _ => {}
        }
    }
    stripped
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn smoke() {
        for ch in VALID_AA {
            assert!(ch.monoisotopic() > 0.0);
        }
    }

    #[test]
    fn tolerances() {
        let (lo, hi) = Tolerance::Ppm(-10.0, 20.0).bounds(1000.0);
        assert!((lo - 999.99).abs() < 1e-9);
        assert!((hi - 1000.02).abs() < 1e-9);
        assert_eq!(Tolerance::Da(-0.5, 0.5).bounds(100.0), (99.5, 100.5));
        assert!(Tolerance::default().contains(500.0, 500.05));
        assert!(!Tolerance::default().contains(500.0, 500.06));
    }

    #[test]
    fn mz_and_rounding() {
        assert!((mz(1000.0, 1) - 1001.007276466621).abs() < 1e-9);
        assert!((mz(1000.0, 2) - 501.007276466621).abs() < 1e-9);
        assert_eq!(round4(464.734812), 464.7348);
    }

    #[test]
    fn sequences() {
        assert!(is_ex_sequence("PEPTIDEK"));
        assert!(!is_ex_sequence("peptidek"));
        assert!(!is_ex_sequence(""));
        assert!(is_ex_sequence("PEPC[+57.0]TIDEK"));
        assert!(!is_ex_sequence("[+57.0]"));
        assert!(!is_ex_sequence("PEP[+57"));
        assert!(!is_ex_sequence("PEP TIDE"));
        assert_eq!(strip_modifications("PEPC[+57.0]TIDEK"), "PEPCTIDEK");
        assert_eq!(strip_modifications("MS[Phospho]TK*"), "MSTK*");
    }
}
