//! Peptide mass calculation, consumed by the importers through the
//! [`MassCalculator`] trait

use crate::ion_series::{Ion, IonSeries, Kind};
use crate::modification::{LabelType, Losses, ModificationSet, NeutralLoss};
use crate::peptide::{modification_sets, Peptide};
use crate::settings::Settings;

pub trait MassCalculator {
    /// Every variable modification set that applies to `sequence`: the
    /// unmodified set first, then by increasing number of modifications
    fn modification_sets(&self, sequence: &str) -> Vec<ModificationSet>;

    /// Neutral monoisotopic mass of the precursor. `None` when the label is
    /// not configured or the sequence cannot be computed.
    fn precursor_mass(&self, sequence: &str, mods: &ModificationSet, label: &LabelType)
        -> Option<f64>;

    /// Neutral fragment masses of the configured ion kinds, preceded by the
    /// intact precursor
    fn fragment_ladder(
        &self,
        sequence: &str,
        mods: &ModificationSet,
        label: &LabelType,
    ) -> Option<Vec<Ion>>;

    /// Neutral loss combinations that may apply to products of `sequence`.
    /// The first entry is always the empty combination.
    fn potential_losses(&self, sequence: &str, mods: &ModificationSet) -> Vec<Losses>;
}

/// Default [`MassCalculator`], built from monoisotopic residue masses and the
/// modifications configured in [`Settings`]
pub struct SequenceMassCalc<'s> {
    settings: &'s Settings,
}

impl<'s> SequenceMassCalc<'s> {
    pub fn new(settings: &'s Settings) -> Self {
        Self { settings }
    }

    fn peptide(&self, sequence: &str, mods: &ModificationSet, label: &LabelType) -> Option<Peptide> {
        let label_mods = self.settings.label_mods(label)?;
        let peptide = Peptide::try_from(sequence).ok()?;
        Some(
            peptide
                .variable_mods(mods, &self.settings.variable_mods)
                .static_mods(&self.settings.static_mods)
                .label_mods(label_mods),
        )
    }
}

impl<'s> MassCalculator for SequenceMassCalc<'s> {
    fn modification_sets(&self, sequence: &str) -> Vec<ModificationSet> {
        modification_sets(
            sequence.as_bytes(),
            &self.settings.variable_mods,
            self.settings.max_variable_mods,
        )
    }

    fn precursor_mass(
        &self,
        sequence: &str,
        mods: &ModificationSet,
        label: &LabelType,
    ) -> Option<f64> {
        self.peptide(sequence, mods, label)
            .map(|peptide| peptide.monoisotopic)
    }

    fn fragment_ladder(
        &self,
        sequence: &str,
        mods: &ModificationSet,
        label: &LabelType,
    ) -> Option<Vec<Ion>> {
        let peptide = self.peptide(sequence, mods, label)?;
        let peptide = &peptide;
        Some(
            std::iter::once(Kind::Precursor)
                .chain(
                    self.settings
                        .ion_kinds
                        .iter()
                        .copied()
                        .filter(|kind| *kind != Kind::Precursor),
                )
                .flat_map(move |kind| IonSeries::new(peptide, kind))
                .collect(),
        )
    }

    fn potential_losses(&self, sequence: &str, _mods: &ModificationSet) -> Vec<Losses> {
        let applicable = self
            .settings
            .neutral_losses
            .iter()
            .filter(|loss| loss.applies_to(sequence.as_bytes()))
            .collect::<Vec<_>>();

        let mut losses = vec![Losses::default()];
        let mut current = Vec::new();
        for k in 1..=self.settings.max_neutral_losses.min(applicable.len()) {
            loss_combinations(&applicable, 0, k, &mut current, &mut losses);
        }
        losses
    }
}

fn loss_combinations<'a>(
    applicable: &[&'a NeutralLoss],
    start: usize,
    k: usize,
    current: &mut Vec<&'a NeutralLoss>,
    losses: &mut Vec<Losses>,
) {
    if current.len() == k {
        losses.push(Losses::new(current));
        return;
    }
    for (idx, loss) in applicable.iter().enumerate().skip(start) {
        current.push(*loss);
        loss_combinations(applicable, idx + 1, k, current, losses);
        current.pop();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mass::{mz, PROTON};
    use crate::modification::{IsotopeLabel, Modification, ModificationSpecificity};

    fn settings() -> Settings {
        let mut settings = Settings::default();
        settings.heavy_labels.push(IsotopeLabel {
            name: "heavy".into(),
            mods: vec![Modification {
                specificity: ModificationSpecificity::Residue(b'K'),
                mass: 8.014199,
            }],
        });
        settings.neutral_losses = vec![
            NeutralLoss {
                name: "H2O".into(),
                mass: 18.010565,
                residues: "STED".into(),
            },
            NeutralLoss {
                name: "NH3".into(),
                mass: 17.026549,
                residues: "RKNQ".into(),
            },
            NeutralLoss {
                name: "HPO3".into(),
                mass: 79.966331,
                residues: "Y".into(),
            },
        ];
        settings
    }

    #[test]
    fn precursor_masses() {
        let settings = settings();
        let calc = SequenceMassCalc::new(&settings);
        let light = calc
            .precursor_mass("PEPTIDEK", &ModificationSet::default(), &LabelType::Light)
            .unwrap();
        assert!((mz(light, 2) - 464.7348).abs() < 1e-3);

        let heavy = calc
            .precursor_mass(
                "PEPTIDEK",
                &ModificationSet::default(),
                &LabelType::Heavy("heavy".into()),
            )
            .unwrap();
        assert!((heavy - light - 8.014199).abs() < 1e-9);

        assert!(calc
            .precursor_mass(
                "PEPTIDEK",
                &ModificationSet::default(),
                &LabelType::Heavy("medium".into())
            )
            .is_none());

        // static carbamidomethyl
        let cys = calc
            .precursor_mass("PEPCK", &ModificationSet::default(), &LabelType::Light)
            .unwrap();
        let bare = Peptide::try_from("PEPCK").unwrap().monoisotopic;
        assert!((cys - bare - 57.021464).abs() < 1e-9);
    }

    #[test]
    fn ladder() {
        let settings = settings();
        let calc = SequenceMassCalc::new(&settings);
        let ions = calc
            .fragment_ladder("PEPTIDEK", &ModificationSet::default(), &LabelType::Light)
            .unwrap();
        // precursor + 7 b + 7 y
        assert_eq!(ions.len(), 15);
        assert_eq!(ions[0].kind, Kind::Precursor);

        let y3 = ions
            .iter()
            .find(|ion| ion.kind == Kind::Y && ion.ordinal == 3)
            .unwrap();
        assert!((y3.monoisotopic_mass + PROTON - 391.1823).abs() < 1e-3);
        let b2 = ions
            .iter()
            .find(|ion| ion.kind == Kind::B && ion.ordinal == 2)
            .unwrap();
        assert!((b2.monoisotopic_mass + PROTON - 227.1026).abs() < 1e-3);
    }

    #[test]
    fn losses() {
        let settings = settings();
        let calc = SequenceMassCalc::new(&settings);
        let losses = calc.potential_losses("PEPTIDEK", &ModificationSet::default());
        let names = losses.iter().map(|l| l.names.join("+")).collect::<Vec<_>>();
        assert_eq!(names, vec!["", "H2O", "NH3"]);
    }
}
