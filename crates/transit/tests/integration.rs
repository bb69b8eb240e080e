//! End-to-end imports with the default mass calculator

use quickcheck_macros::quickcheck;
use transit_core::calculator::{MassCalculator, SequenceMassCalc};
use transit_core::format::NumberFormat;
use transit_core::ion_series::Kind;
use transit_core::mass::mz;
use transit_core::matcher::{MassMatcher, Nearest};
use transit_core::modification::{IsotopeLabel, LabelType, Modification, ModificationSpecificity};
use transit_core::row_reader::{find_label_column, RowReader};
use transit_core::{Document, ErrorKind, FastaImporter, MassListImporter, Settings};

const FASTA: &str = ">P1 desc\nMSTK*\n>P2 desc\nAAAK*\n";

const PROTEIN: &str = "sp|P02769|ALBU_BOVIN";

fn heavy_settings() -> Settings {
    let mut settings = Settings::default();
    settings.heavy_labels.push(IsotopeLabel {
        name: "heavy".into(),
        mods: vec![
            Modification {
                specificity: ModificationSpecificity::Residue(b'K'),
                mass: 8.014199,
            },
            Modification {
                specificity: ModificationSpecificity::Residue(b'R'),
                mass: 10.008269,
            },
        ],
    });
    settings
}

/// Column `i` holds role `permutation[i]`: 0 sequence, 1 precursor, 2 product, 3 protein
fn permutation(mut seed: usize) -> Vec<usize> {
    let mut pool = vec![0, 1, 2, 3];
    let mut order = Vec::with_capacity(4);
    while !pool.is_empty() {
        let idx = seed % pool.len();
        seed /= pool.len();
        order.push(pool.remove(idx));
    }
    order
}

fn position(order: &[usize], role: usize) -> usize {
    order.iter().position(|&r| r == role).unwrap()
}

fn permuted_rows(order: &[usize]) -> Vec<String> {
    let rows = [
        ["PEPTIDEK", "464.7348", "391.1823", PROTEIN],
        ["PEPTIDEK", "464.7348", "504.2664", PROTEIN],
    ];
    rows.iter()
        .map(|row| {
            order
                .iter()
                .map(|&role| row[role])
                .collect::<Vec<_>>()
                .join("\t")
        })
        .collect()
}

#[test]
fn fasta_records() {
    let settings = Settings::default();
    let document = Document::new();
    let groups = FastaImporter::new(&settings, &document, false)
        .import(FASTA.as_bytes(), None, &mut ())
        .unwrap();
    let names = groups.iter().map(|g| g.name.as_str()).collect::<Vec<_>>();
    let sequences = groups
        .iter()
        .map(|g| g.sequence.as_deref().unwrap())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["P1", "P2"]);
    assert_eq!(sequences, vec!["MSTK", "AAAK"]);
    assert_eq!(groups[0].description.as_deref(), Some("desc"));
}

#[test]
fn fasta_reimport_adds_nothing() {
    let settings = Settings::default();
    let first = FastaImporter::new(&settings, &Document::new(), false)
        .import(FASTA.as_bytes(), None, &mut ())
        .unwrap();
    let document = Document::from_groups(&first);
    let second = FastaImporter::new(&settings, &document, false)
        .import(FASTA.as_bytes(), None, &mut ())
        .unwrap();
    assert!(second.is_empty());
}

#[test]
fn two_row_transition_list() {
    let settings = Settings::default();
    let calc = SequenceMassCalc::new(&settings);
    let text = "PEPTIDEK\t464.7348\t391.1823\nPEPTIDEK\t464.7348\t504.2664\n";
    let groups = MassListImporter::new(&settings, &Document::new(), &calc, NumberFormat::default(), '\t')
        .import(text.as_bytes(), None, &mut ())
        .unwrap();

    assert_eq!(groups.len(), 1);
    let peptides = &groups[0].peptides;
    assert_eq!(peptides.len(), 1);
    assert_eq!(peptides[0].sequence, "PEPTIDEK");
    assert_eq!(peptides[0].precursors.len(), 1);

    let precursor = &peptides[0].precursors[0];
    assert_eq!(precursor.charge, 2);
    assert_eq!(precursor.label, LabelType::Light);
    let ions = precursor
        .transitions
        .iter()
        .map(|t| (t.ion, t.ordinal, t.charge))
        .collect::<Vec<_>>();
    assert_eq!(ions, vec![(Kind::Y, 3, 1), (Kind::Y, 4, 1)]);
}

#[test]
fn interleaved_proteins_are_merged() {
    let settings = Settings::default();
    let calc = SequenceMassCalc::new(&settings);
    let text = "sp|P1\tPEPTIDEK\t464.7348\t391.1823\n\
                sp|P1\tPEPTIDEK\t464.7348\t504.2664\n\
                sp|P2\tPEPTIDER\t478.7378\t419.1885\n\
                sp|P1\tPEPTIDEK\t464.7348\t276.1554\n";
    let groups = MassListImporter::new(&settings, &Document::new(), &calc, NumberFormat::default(), '\t')
        .import(text.as_bytes(), None, &mut ())
        .unwrap();

    let summary = groups
        .iter()
        .map(|g| (g.name.as_str(), g.peptide_count(), g.transition_count()))
        .collect::<Vec<_>>();
    assert_eq!(summary, vec![("sp|P1", 1, 3), ("sp|P2", 1, 1)]);
    let ordinals = groups[0].peptides[0].precursors[0]
        .transitions
        .iter()
        .map(|t| t.ordinal)
        .collect::<Vec<_>>();
    assert_eq!(ordinals, vec![2, 3, 4]);
}

#[test]
fn transition_ceiling_within_one_protein() {
    let mut settings = Settings::default();
    settings.max_transitions = 1;
    let calc = SequenceMassCalc::new(&settings);
    let text = format!(
        "{}\tPEPTIDEK\t464.7348\t391.1823\n{}\tPEPTIDEK\t464.7348\t504.2664\n",
        PROTEIN, PROTEIN
    );
    let err = MassListImporter::new(&settings, &Document::new(), &calc, NumberFormat::default(), '\t')
        .import(text.as_bytes(), None, &mut ())
        .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::SizeLimitExceeded));
    assert_eq!(err.line, Some(2));
}

#[test]
fn extended_peptide_names() {
    let settings = heavy_settings();
    let calc = SequenceMassCalc::new(&settings);
    let heavy_precursor = mz(
        calc.precursor_mass("PEPTIDEK", &Default::default(), &LabelType::Heavy("heavy".into()))
            .unwrap(),
        2,
    );
    let text = format!(
        "ALBU.PEPTIDEK.2y3.light\t464.7348\t391.1823\nALBU.PEPTIDEK.2y3.heavy\t{:.4}\t399.1965\n",
        heavy_precursor
    );
    let groups = MassListImporter::new(&settings, &Document::new(), &calc, NumberFormat::default(), '\t')
        .import(text.as_bytes(), None, &mut ())
        .unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].name, "ALBU");
    let labels = groups[0].peptides[0]
        .precursors
        .iter()
        .map(|p| p.label.clone())
        .collect::<Vec<_>>();
    assert_eq!(labels, vec![LabelType::Light, LabelType::Heavy("heavy".into())]);
}

#[quickcheck]
fn any_column_order(seed: usize) -> bool {
    let order = permutation(seed);
    let lines = permuted_rows(&order);
    let settings = Settings::default();
    let calc = SequenceMassCalc::new(&settings);
    let matcher = MassMatcher::new(&settings, &calc);

    let reader = RowReader::infer_general(&lines, None, None, NumberFormat::default(), '\t', &matcher)
        .unwrap()
        .unwrap();
    let layout = reader.layout;
    let laid_out = layout.peptide == position(&order, 0)
        && layout.precursor == position(&order, 1)
        && layout.product == position(&order, 2)
        && layout.protein == Some(position(&order, 3));

    let text = lines.join("\n");
    let groups = MassListImporter::new(&settings, &Document::new(), &calc, NumberFormat::default(), '\t')
        .import(text.as_bytes(), None, &mut ())
        .unwrap();
    laid_out && groups.len() == 1 && groups[0].name == PROTEIN && groups[0].transition_count() == 2
}

#[quickcheck]
fn label_column_is_all_labels(cells: Vec<Vec<u8>>) -> bool {
    let width = cells.iter().map(Vec::len).min().unwrap_or(0);
    let rows = cells
        .iter()
        .map(|row| {
            row.iter()
                .take(width)
                .map(|b| match b % 4 {
                    0 => "L",
                    1 => "H",
                    2 => "light",
                    _ => "12.5",
                })
                .map(String::from)
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();

    match find_label_column(&rows) {
        Some(idx) => rows
            .iter()
            .all(|row| matches!(row.get(idx).map(String::as_str), Some("L") | Some("H"))),
        None => (0..width).all(|idx| {
            rows.iter()
                .any(|row| !matches!(row[idx].as_str(), "L" | "H"))
        }),
    }
}

#[quickcheck]
fn nearest_is_minimum_delta(observed: u16, candidates: Vec<u16>) -> bool {
    let observed = observed as f64 / 10.0;
    let mut nearest = Nearest::new(observed);
    for c in &candidates {
        nearest.offer(*c as f64 / 10.0);
    }
    let best = candidates
        .iter()
        .map(|c| (observed - *c as f64 / 10.0).abs())
        .fold(None, |acc: Option<f64>, d| Some(acc.map_or(d, |a| a.min(d))));
    match (nearest.mz, best) {
        (Some(mz), Some(best)) => (observed - mz).abs() == best,
        (None, None) => true,
        _ => false,
    }
}

#[quickcheck]
fn generated_rows_are_explained(sequence: u8, charge: u8, heavy: bool, ordinal: u8) -> bool {
    let sequences = ["PEPTIDEK", "LVNELTEFAK", "AEFVEVTK", "YLYEIAR", "HPYFYAPELLYYANK"];
    let sequence = sequences[sequence as usize % sequences.len()];
    let charge = charge % 3 + 1;
    let label = match heavy {
        true => LabelType::Heavy("heavy".into()),
        false => LabelType::Light,
    };

    let settings = heavy_settings();
    let calc = SequenceMassCalc::new(&settings);
    let matcher = MassMatcher::new(&settings, &calc);
    let mods = Default::default();

    let precursor_mz = mz(calc.precursor_mass(sequence, &mods, &label).unwrap(), charge);
    let ladder = calc.fragment_ladder(sequence, &mods, &label).unwrap();
    let y = ordinal as usize % (sequence.len() - 1) + 1;
    let ion = ladder
        .iter()
        .find(|ion| ion.kind == Kind::Y && ion.ordinal == y)
        .unwrap();
    let product_mz = mz(ion.monoisotopic_mass, 1);

    let precursors = matcher
        .explain_precursor(sequence, precursor_mz, &LabelType::Light, false, false)
        .unwrap();
    if !precursors
        .iter()
        .any(|p| p.charge == charge && p.label == label)
    {
        return false;
    }
    let explanations = matcher
        .explain_products(sequence, product_mz, precursors)
        .unwrap();
    explanations.iter().any(|exp| {
        exp.precursor.charge == charge
            && exp.precursor.label == label
            && exp
                .product
                .as_ref()
                .map(|p| (p.mz - product_mz).abs() < 1e-9)
                .unwrap_or(false)
    })
}
