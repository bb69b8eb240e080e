use fnv::FnvHashSet;
use regex::Regex;

use crate::mass::VALID_AA;

/// A peptide cut out of a protein sequence
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Default, Hash)]
pub struct Digest {
    pub sequence: String,
    /// Cleavage sites inside the peptide that were not cut
    pub missed_cleavages: u8,
    /// Offset of the first residue within the protein
    pub begin: usize,
    /// Offset one past the last residue within the protein
    pub end: usize,
}

/// Cleavage rule of a protease
#[derive(Clone, Debug)]
pub struct Enzyme {
    /// Matches a single residue the enzyme cuts next to
    regex: Regex,
    /// No cut when the residue across the cut is this one
    pub skip_suffix: Option<char>,
    /// Cut after the site residue rather than before it
    pub c_terminal: bool,
}

pub struct EnzymeParameters {
    /// Number of missed cleavages to produce
    pub missed_cleavages: u8,
    /// Inclusive
    pub min_len: usize,
    /// Inclusive
    pub max_len: usize,
    /// `None` keeps proteins uncut
    pub enzyme: Option<Enzyme>,
}

impl Enzyme {
    /// Returns `None` when `cleave` is empty (no cleavage), or when the
    /// rule contains anything but amino acids, which is logged.
    pub fn new(cleave: &str, skip_suffix: Option<char>, c_terminal: bool) -> Option<Self> {
        if let Some(bad) = cleave.chars().find(|c| !VALID_AA.contains(&(*c as u8))) {
            log::error!("Invalid residue `{}` in enzyme cleavage rule `{}`", bad, cleave);
            return None;
        }
        if let Some(bad) = skip_suffix.filter(|c| !VALID_AA.contains(&(*c as u8))) {
            log::error!("Invalid enzyme restriction residue `{}`", bad);
            return None;
        }
        if cleave.is_empty() {
            return None;
        }
        Some(Enzyme {
            regex: Regex::new(&format!("[{}]", cleave)).ok()?,
            skip_suffix,
            c_terminal,
        })
    }

    /// Interior boundaries where this enzyme cuts. A boundary `b` sits
    /// between `sequence[b - 1]` and `sequence[b]`.
    fn cuts<'a>(&'a self, sequence: &'a str) -> impl Iterator<Item = usize> + 'a {
        self.regex.find_iter(sequence).filter_map(move |site| {
            let (boundary, across) = match self.c_terminal {
                true => (site.end(), sequence[site.end()..].chars().next()),
                false => (site.start(), sequence[..site.start()].chars().next_back()),
            };
            if boundary == 0 || boundary >= sequence.len() {
                return None;
            }
            match (self.skip_suffix, across) {
                (Some(skip), Some(across)) if skip == across => None,
                _ => Some(boundary),
            }
        })
    }

    /// Number of cleavage sites inside `sequence`
    pub fn missed_cleavages(&self, sequence: &str) -> u8 {
        self.cuts(sequence).count().min(u8::MAX as usize) as u8
    }
}

impl EnzymeParameters {
    /// Missed cleavages of a peptide, zero when no enzyme is set
    pub fn missed_cleavages(&self, sequence: &str) -> u8 {
        self.enzyme
            .as_ref()
            .map(|enzyme| enzyme.missed_cleavages(sequence))
            .unwrap_or_default()
    }

    /// Peptides of `sequence` within the length bounds, in order of
    /// missed cleavages and then position. Repeated peptides are only
    /// reported at their first occurrence.
    pub fn digest(&self, sequence: &str) -> Vec<Digest> {
        let mut bounds = vec![0];
        let missed = match &self.enzyme {
            Some(enzyme) => {
                bounds.extend(enzyme.cuts(sequence));
                self.missed_cleavages as usize
            }
            None => 0,
        };
        bounds.push(sequence.len());
        bounds.dedup();

        let mut seen = FnvHashSet::default();
        let mut digests = Vec::new();
        for skipped in 0..=missed {
            for (i, &begin) in bounds.iter().enumerate() {
                let end = match bounds.get(i + skipped + 1) {
                    Some(&end) => end,
                    None => break,
                };
                let len = end - begin;
                if len == 0 || len < self.min_len || len > self.max_len {
                    continue;
                }
                let peptide = &sequence[begin..end];
                if seen.insert(peptide) {
                    digests.push(Digest {
                        sequence: peptide.into(),
                        missed_cleavages: skipped as u8,
                        begin,
                        end,
                    });
                }
            }
        }
        digests
    }
}
