//! Explain observed precursor and product m/z values with theoretical
//! peptide masses

use serde::Serialize;

use crate::calculator::MassCalculator;
use crate::error::{Error, ErrorKind};
use crate::format::NumberFormat;
use crate::ion_series::Kind;
use crate::mass::{mz, round4};
use crate::modification::{LabelType, Losses, ModificationSet};
use crate::settings::Settings;

/// One way of explaining a precursor m/z
#[derive(Clone, Debug, Serialize)]
pub struct PrecursorExplanation {
    pub modifications: ModificationSet,
    pub charge: u8,
    pub label: LabelType,
    /// `Some` for decoy precursors, holding the m/z shift that matched
    pub mass_shift: Option<i32>,
    /// Theoretical m/z, shift included
    pub mz: f64,
}

// The shift does not take part in identity: rows of one decoy precursor may
// match with different shifts.
impl PartialEq for PrecursorExplanation {
    fn eq(&self, other: &Self) -> bool {
        self.modifications == other.modifications
            && self.charge == other.charge
            && self.label == other.label
    }
}

impl PrecursorExplanation {
    pub fn is_decoy(&self) -> bool {
        self.mass_shift.is_some()
    }
}

/// One way of explaining a product m/z, given a precursor explanation
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProductExplanation {
    pub kind: Kind,
    pub ordinal: usize,
    pub charge: u8,
    pub losses: Losses,
    pub mass_shift: Option<i32>,
    pub mz: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TransitionExplanation {
    pub precursor: PrecursorExplanation,
    pub product: Option<ProductExplanation>,
}

impl TransitionExplanation {
    pub fn is_decoy(&self) -> bool {
        self.precursor.is_decoy()
    }
}

/// Tracks the theoretical value closest to an observed m/z
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Nearest {
    pub observed: f64,
    pub mz: Option<f64>,
}

impl Nearest {
    pub fn new(observed: f64) -> Self {
        Self { observed, mz: None }
    }

    pub fn offer(&mut self, theoretical: f64) {
        let closer = match self.mz {
            Some(best) => (self.observed - theoretical).abs() < (self.observed - best).abs(),
            None => true,
        };
        if closer {
            self.mz = Some(theoretical);
        }
    }

    /// Rounded (nearest, delta) pair, if anything was offered
    pub fn rounded(&self) -> Option<(f64, f64)> {
        self.mz.map(|nearest| {
            let nearest = round4(nearest);
            (nearest, round4((round4(self.observed) - nearest).abs()))
        })
    }
}

/// Parse an m/z cell; anything unreadable counts as 0
pub fn column_mz(fields: &[String], column: usize, format: &NumberFormat) -> f64 {
    fields
        .get(column)
        .and_then(|field| format.parse(field))
        .unwrap_or_default()
}

pub struct MassMatcher<'a> {
    settings: &'a Settings,
    calc: &'a dyn MassCalculator,
}

impl<'a> MassMatcher<'a> {
    pub fn new(settings: &'a Settings, calc: &'a dyn MassCalculator) -> Self {
        Self { settings, calc }
    }

    pub fn settings(&self) -> &'a Settings {
        self.settings
    }

    /// Labels to try for a row: just the row's label when explicit,
    /// otherwise the row's label followed by every configured heavy label
    fn labels(&self, label: &LabelType, explicit: bool) -> Vec<LabelType> {
        let mut labels = vec![label.clone()];
        if !explicit {
            labels.extend(
                self.settings
                    .heavy_label_types()
                    .filter(|l| l != label && self.settings.is_heavy_allowed(l.name())),
            );
        }
        labels
    }

    fn precursor_shifts(&self, decoy: bool) -> Vec<Option<i32>> {
        match decoy {
            true => self.settings.decoy_shifts().into_iter().map(Some).collect(),
            false => vec![None],
        }
    }

    /// Every (charge, shift, m/z) explaining `observed` from a neutral
    /// precursor mass. Each charge keeps its first matching shift.
    fn precursor_charges(
        &self,
        mass: f64,
        observed: f64,
        decoy: bool,
        nearest: &mut Nearest,
    ) -> Vec<(u8, Option<i32>, f64)> {
        let shifts = self.precursor_shifts(decoy);
        let mut matches = Vec::new();
        for charge in self.settings.precursor_charges() {
            let base = mz(mass, charge);
            for shift in &shifts {
                let theoretical = base + shift.unwrap_or_default() as f64;
                nearest.offer(theoretical);
                if self.settings.tolerance.contains(observed, theoretical) {
                    matches.push((charge, *shift, theoretical));
                    break;
                }
            }
        }
        matches
    }

    /// Enumerate (modification set, label, charge, shift) explanations of a
    /// precursor m/z
    pub fn explain_precursor(
        &self,
        sequence: &str,
        observed: f64,
        label: &LabelType,
        explicit: bool,
        decoy: bool,
    ) -> Result<Vec<PrecursorExplanation>, Error> {
        let labels = self.labels(label, explicit);
        let mut nearest = Nearest::new(observed);
        let mut explanations = Vec::new();

        for modifications in self.calc.modification_sets(sequence) {
            for label in &labels {
                let mass = match self.calc.precursor_mass(sequence, &modifications, label) {
                    Some(mass) => mass,
                    None => continue,
                };
                for (charge, mass_shift, mz) in
                    self.precursor_charges(mass, observed, decoy, &mut nearest)
                {
                    explanations.push(PrecursorExplanation {
                        modifications: modifications.clone(),
                        charge,
                        label: label.clone(),
                        mass_shift,
                        mz,
                    });
                }
            }
        }

        if explanations.is_empty() {
            let message = match nearest.rounded() {
                Some((nearest, delta)) => format!(
                    "Precursor m/z {} does not match the closest possible value {} (delta = {})",
                    round4(observed),
                    nearest,
                    delta
                ),
                None => format!(
                    "Precursor m/z {} has no possible explanation for {}",
                    round4(observed),
                    sequence
                ),
            };
            return Err(Error::new(ErrorKind::MassMismatch, message));
        }
        if !self.settings.is_measurable(observed) {
            return Err(Error::new(
                ErrorKind::OutOfRange,
                format!(
                    "The precursor m/z {} is out of range for the instrument settings",
                    round4(observed)
                ),
            ));
        }
        log::trace!(
            "{} precursor m/z {}: {} explanations",
            sequence,
            observed,
            explanations.len()
        );
        Ok(explanations)
    }

    fn losses_apply(&self, losses: &Losses, residues: &[u8]) -> bool {
        losses.names.iter().all(|name| {
            self.settings
                .neutral_losses
                .iter()
                .find(|loss| &loss.name == name)
                .map(|loss| loss.applies_to(residues))
                .unwrap_or(true)
        })
    }

    /// The product ion closest to `observed` within tolerance, searching
    /// charge, then ion, then neutral losses, then shift
    pub fn best_product(
        &self,
        sequence: &str,
        precursor: &PrecursorExplanation,
        observed: f64,
        nearest: &mut Nearest,
    ) -> Option<ProductExplanation> {
        let ladder =
            self.calc
                .fragment_ladder(sequence, &precursor.modifications, &precursor.label)?;
        let losses = self
            .calc
            .potential_losses(sequence, &precursor.modifications);
        let shifts = match precursor.is_decoy() && !precursor.label.is_light() {
            true => self.precursor_shifts(true),
            false => vec![None],
        };
        let max_charge = precursor.charge.min(self.settings.max_fragment_charge);

        let mut best: Option<(f64, ProductExplanation)> = None;
        for charge in 1..=max_charge {
            for ion in &ladder {
                let residues = ion.residues(sequence.as_bytes());
                for loss in losses.iter().filter(|l| self.losses_apply(l, residues)) {
                    let mass = ion.monoisotopic_mass - loss.mass;
                    if mass <= 0.0 {
                        continue;
                    }
                    let base = mz(mass, charge);
                    for shift in &shifts {
                        let theoretical = base + shift.unwrap_or_default() as f64;
                        nearest.offer(theoretical);
                        if !self.settings.tolerance.contains(observed, theoretical) {
                            continue;
                        }
                        let delta = (observed - theoretical).abs();
                        if best.as_ref().map(|(d, _)| delta < *d).unwrap_or(true) {
                            best = Some((
                                delta,
                                ProductExplanation {
                                    kind: ion.kind,
                                    ordinal: ion.ordinal,
                                    charge,
                                    losses: loss.clone(),
                                    mass_shift: *shift,
                                    mz: theoretical,
                                },
                            ));
                        }
                    }
                }
            }
        }
        best.map(|(_, product)| product)
    }

    /// Resolve the product of every precursor explanation, dropping the
    /// explanations that cannot produce `observed`
    pub fn explain_products(
        &self,
        sequence: &str,
        observed: f64,
        precursors: Vec<PrecursorExplanation>,
    ) -> Result<Vec<TransitionExplanation>, Error> {
        let mut nearest = Nearest::new(observed);
        let explanations = precursors
            .into_iter()
            .filter_map(|precursor| {
                self.best_product(sequence, &precursor, observed, &mut nearest)
                    .map(|product| TransitionExplanation {
                        precursor,
                        product: Some(product),
                    })
            })
            .collect::<Vec<_>>();

        if explanations.is_empty() {
            let message = match nearest.rounded() {
                Some((nearest, delta)) => format!(
                    "Product m/z value {} has no matching product ion (closest possible value {}, delta = {})",
                    round4(observed),
                    nearest,
                    delta
                ),
                None => format!(
                    "Product m/z value {} has no matching product ion",
                    round4(observed)
                ),
            };
            return Err(Error::new(ErrorKind::MassMismatch, message));
        }
        if !self.settings.is_measurable(observed) {
            return Err(Error::new(
                ErrorKind::OutOfRange,
                format!(
                    "The product m/z {} is out of range for the instrument settings",
                    round4(observed)
                ),
            ));
        }
        Ok(explanations)
    }

    /// Find the column holding the precursor m/z of a sample row. The first
    /// column that explains the precursor is locked in; further explanations
    /// are only collected from that column.
    pub fn find_precursor_column(
        &self,
        fields: &[String],
        format: &NumberFormat,
        sequence: &str,
        label: &LabelType,
        sequence_column: usize,
        decoy: bool,
    ) -> Option<(usize, Vec<PrecursorExplanation>)> {
        let mut locked: Option<usize> = None;
        let mut explanations = Vec::new();
        // nearest values are irrelevant while guessing columns
        let mut ignored = Nearest::new(0.0);

        for modifications in self.calc.modification_sets(sequence) {
            let mass = match self.calc.precursor_mass(sequence, &modifications, label) {
                Some(mass) => mass,
                None => continue,
            };
            for column in 0..fields.len() {
                if locked.map(|c| c != column).unwrap_or(false) || column == sequence_column {
                    continue;
                }
                let observed = column_mz(fields, column, format);
                if observed == 0.0 {
                    continue;
                }
                let charges = self.precursor_charges(mass, observed, decoy, &mut ignored);
                if !charges.is_empty() {
                    locked = Some(column);
                }
                for (charge, mass_shift, mz) in charges {
                    explanations.push(PrecursorExplanation {
                        modifications: modifications.clone(),
                        charge,
                        label: label.clone(),
                        mass_shift,
                        mz,
                    });
                }
            }
        }
        locked.map(|column| (column, explanations))
    }

    /// Find the first column (other than the sequence and precursor columns)
    /// that any precursor explanation explains as a product
    pub fn find_product_column(
        &self,
        fields: &[String],
        format: &NumberFormat,
        sequence: &str,
        precursors: &[PrecursorExplanation],
        sequence_column: usize,
        precursor_column: usize,
    ) -> Option<usize> {
        let mut ignored = Nearest::new(0.0);
        for precursor in precursors {
            for column in 0..fields.len() {
                if column == sequence_column || column == precursor_column {
                    continue;
                }
                let observed = column_mz(fields, column, format);
                if observed == 0.0 {
                    continue;
                }
                if self
                    .best_product(sequence, precursor, observed, &mut ignored)
                    .is_some()
                {
                    return Some(column);
                }
            }
        }
        None
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::ion_series::Ion;
    use crate::mass::PROTON;

    /// Calculator with fixed masses: PEPTIDEK at m/z 500.2 (2+) with y3 at
    /// 300.1 and y4 at 450.3, and a heavy form 4 m/z units above
    pub struct StubCalc;

    pub const HEAVY_SHIFT: f64 = 8.0;

    impl MassCalculator for StubCalc {
        fn modification_sets(&self, _: &str) -> Vec<ModificationSet> {
            vec![ModificationSet::default()]
        }

        fn precursor_mass(&self, sequence: &str, _: &ModificationSet, label: &LabelType) -> Option<f64> {
            if sequence != "PEPTIDEK" {
                return None;
            }
            let light = 500.2 * 2.0 - 2.0 * PROTON;
            match label {
                LabelType::Light => Some(light),
                LabelType::Heavy(name) if name == "heavy" => Some(light + HEAVY_SHIFT),
                _ => None,
            }
        }

        fn fragment_ladder(&self, sequence: &str, mods: &ModificationSet, label: &LabelType) -> Option<Vec<Ion>> {
            let precursor = self.precursor_mass(sequence, mods, label)?;
            let heavy = match label {
                LabelType::Light => 0.0,
                _ => HEAVY_SHIFT,
            };
            Some(vec![
                Ion {
                    kind: Kind::Precursor,
                    ordinal: 8,
                    monoisotopic_mass: precursor,
                },
                Ion {
                    kind: Kind::Y,
                    ordinal: 3,
                    monoisotopic_mass: 300.1 - PROTON + heavy,
                },
                Ion {
                    kind: Kind::Y,
                    ordinal: 4,
                    monoisotopic_mass: 450.3 - PROTON + heavy,
                },
            ])
        }

        fn potential_losses(&self, _: &str, _: &ModificationSet) -> Vec<Losses> {
            vec![Losses::default()]
        }
    }

    fn strings(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn precursor_charge_and_label() {
        let settings = Settings::default();
        let matcher = MassMatcher::new(&settings, &StubCalc);
        let exps = matcher
            .explain_precursor("PEPTIDEK", 500.2, &LabelType::Light, false, false)
            .unwrap();
        assert_eq!(exps.len(), 1);
        assert_eq!(exps[0].charge, 2);
        assert_eq!(exps[0].label, LabelType::Light);
        assert_eq!(exps[0].mass_shift, None);
        assert!((exps[0].mz - 500.2).abs() < 1e-6);
    }

    #[test]
    fn precursor_mismatch_reports_nearest() {
        let settings = Settings::default();
        let matcher = MassMatcher::new(&settings, &StubCalc);
        let err = matcher
            .explain_precursor("PEPTIDEK", 480.0, &LabelType::Light, false, false)
            .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::MassMismatch));
        assert_eq!(
            err.message,
            "Precursor m/z 480 does not match the closest possible value 500.2 (delta = 20.2)"
        );
    }

    #[test]
    fn precursor_out_of_range() {
        let mut settings = Settings::default();
        settings.max_mz = 450.0;
        let matcher = MassMatcher::new(&settings, &StubCalc);
        let err = matcher
            .explain_precursor("PEPTIDEK", 500.2, &LabelType::Light, false, false)
            .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::OutOfRange));
    }

    #[test]
    fn decoy_shift() {
        let settings = Settings::default();
        let matcher = MassMatcher::new(&settings, &StubCalc);
        let exps = matcher
            .explain_precursor("PEPTIDEK", 502.2, &LabelType::Light, false, true)
            .unwrap();
        assert_eq!(exps.len(), 1);
        assert_eq!(exps[0].mass_shift, Some(2));
        assert!(exps[0].is_decoy());

        let exps = matcher
            .explain_precursor("PEPTIDEK", 500.2, &LabelType::Light, false, true)
            .unwrap();
        assert_eq!(exps[0].mass_shift, Some(0));

        // shifts are only searched for decoys
        assert!(matcher
            .explain_precursor("PEPTIDEK", 502.2, &LabelType::Light, false, false)
            .is_err());
    }

    #[test]
    fn heavy_precursor() {
        let mut settings = Settings::default();
        settings.heavy_labels.push(crate::modification::IsotopeLabel {
            name: "heavy".into(),
            mods: vec![crate::modification::Modification {
                specificity: crate::modification::ModificationSpecificity::Residue(b'K'),
                mass: HEAVY_SHIFT,
            }],
        });
        let matcher = MassMatcher::new(&settings, &StubCalc);
        let exps = matcher
            .explain_precursor("PEPTIDEK", 504.2, &LabelType::Light, false, false)
            .unwrap();
        assert_eq!(exps.len(), 1);
        assert_eq!(exps[0].label, LabelType::Heavy("heavy".into()));

        // an explicit light label does not fall back to heavy
        assert!(matcher
            .explain_precursor("PEPTIDEK", 504.2, &LabelType::Light, true, false)
            .is_err());
    }

    #[test]
    fn products() {
        let settings = Settings::default();
        let matcher = MassMatcher::new(&settings, &StubCalc);
        let exps = matcher
            .explain_precursor("PEPTIDEK", 500.2, &LabelType::Light, false, false)
            .unwrap();
        let transitions = matcher.explain_products("PEPTIDEK", 300.1, exps.clone()).unwrap();
        assert_eq!(transitions.len(), 1);
        let product = transitions[0].product.as_ref().unwrap();
        assert_eq!((product.kind, product.ordinal, product.charge), (Kind::Y, 3, 1));
        assert_eq!(product.mass_shift, None);

        // y4 2+
        let transitions = matcher
            .explain_products("PEPTIDEK", (450.3 + PROTON) / 2.0, exps.clone())
            .unwrap();
        let product = transitions[0].product.as_ref().unwrap();
        assert_eq!((product.kind, product.ordinal, product.charge), (Kind::Y, 4, 2));

        // the intact precursor
        let transitions = matcher.explain_products("PEPTIDEK", 500.2, exps.clone()).unwrap();
        let product = transitions[0].product.as_ref().unwrap();
        assert_eq!(product.kind, Kind::Precursor);

        let err = matcher.explain_products("PEPTIDEK", 320.0, exps).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::MassMismatch));
        assert!(err.message.starts_with("Product m/z value 320 has no matching product ion"));
    }

    #[test]
    fn nearest_is_minimum_delta() {
        let mut nearest = Nearest::new(100.0);
        for mz in [120.0, 95.0, 103.0, 80.0, 97.5] {
            nearest.offer(mz);
        }
        assert_eq!(nearest.mz, Some(97.5));
        assert_eq!(nearest.rounded(), Some((97.5, 2.5)));
    }

    #[test]
    fn find_columns() {
        let settings = Settings::default();
        let matcher = MassMatcher::new(&settings, &StubCalc);
        let fields = strings(&["ALBU", "300.1", "PEPTIDEK", "500.2"]);
        let format = NumberFormat::INVARIANT;
        let (column, exps) = matcher
            .find_precursor_column(&fields, &format, "PEPTIDEK", &LabelType::Light, 2, false)
            .unwrap();
        assert_eq!(column, 3);
        assert_eq!(exps.len(), 1);
        let product = matcher.find_product_column(&fields, &format, "PEPTIDEK", &exps, 2, column);
        assert_eq!(product, Some(1));

        let fields = strings(&["PEPTIDEK", "12", "13"]);
        assert!(matcher
            .find_precursor_column(&fields, &format, "PEPTIDEK", &LabelType::Light, 0, false)
            .is_none());
    }

    #[test]
    fn explanation_identity_ignores_shift() {
        let a = PrecursorExplanation {
            modifications: ModificationSet::default(),
            charge: 2,
            label: LabelType::Light,
            mass_shift: Some(1),
            mz: 501.2,
        };
        let b = PrecursorExplanation {
            mass_shift: Some(-1),
            mz: 499.2,
            ..a.clone()
        };
        assert_eq!(a, b);
        assert_ne!(a, PrecursorExplanation { charge: 3, ..b });
    }
}
