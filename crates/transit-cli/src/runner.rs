use std::fs::File;
use std::io::BufReader;
use std::time::Instant;

use anyhow::Context;
use transit_core::calculator::SequenceMassCalc;
use transit_core::{import_reader, Document, ProgressMonitor, ProgressStatus, ProteinGroup};

use crate::input::{read_groups, Import};

/// Logs import progress, never cancels
#[derive(Default)]
pub struct LogProgress {
    file: String,
    decile: Option<u8>,
}

impl ProgressMonitor for LogProgress {
    fn is_cancelled(&self) -> bool {
        false
    }

    fn update(&mut self, status: &ProgressStatus) {
        let decile = status.percent.map(|p| p / 10);
        if decile.is_some() && decile != self.decile {
            self.decile = decile;
            log::info!(
                "{}: {}% - {}",
                self.file,
                status.percent.unwrap_or_default(),
                status.message
            );
        } else {
            log::trace!("{}: {}", self.file, status.message);
        }
    }
}

pub struct Runner {
    pub parameters: Import,
    document: Document,
    start: Instant,
}

impl Runner {
    pub fn new(parameters: Import) -> anyhow::Result<Self> {
        let start = Instant::now();
        let document = match &parameters.existing {
            Some(path) => {
                let groups = read_groups(path)?;
                log::info!(
                    "loaded {} existing protein groups from {}",
                    groups.len(),
                    path.display()
                );
                Document::from_groups(&groups)
            }
            None => Document::new(),
        };
        Ok(Self {
            parameters,
            document,
            start,
        })
    }

    /// Import every input in order. Each file sees the groups imported from
    /// the files before it, and groups standing for a protein that was
    /// already imported are merged into it.
    pub fn import(&mut self) -> anyhow::Result<Vec<ProteinGroup>> {
        let calc = SequenceMassCalc::new(&self.parameters.settings);
        let mut groups: Vec<ProteinGroup> = Vec::new();
        for path in &self.parameters.inputs {
            let file = File::open(path).with_context(|| format!("Failed to open `{path}`"))?;
            let total = file.metadata().map(|m| m.len()).ok();
            let mut monitor = LogProgress {
                file: path.clone(),
                decile: None,
            };
            let imported = import_reader(
                BufReader::new(file),
                total,
                self.parameters.decimal_separator,
                &self.parameters.settings,
                &self.document,
                &calc,
                &mut monitor,
            )
            .with_context(|| format!("Failed to import `{path}`"))?;

            log::info!(
                "- {path}: {} protein groups, {} peptides, {} transitions",
                imported.len(),
                imported.iter().map(ProteinGroup::peptide_count).sum::<usize>(),
                imported.iter().map(ProteinGroup::transition_count).sum::<usize>(),
            );
            for group in imported {
                self.document.add(&group);
                match groups.iter_mut().find(|g| g.same_protein(&group)) {
                    Some(existing) => existing.merge(group),
                    None => groups.push(group),
                }
            }
        }
        Ok(groups)
    }

    pub fn run(mut self) -> anyhow::Result<()> {
        log::debug!(
            "{}",
            serde_json::to_string_pretty(&self.parameters).unwrap_or_default()
        );
        let groups = self.import()?;

        match &self.parameters.output {
            Some(path) => {
                let file = std::fs::File::create(path)
                    .with_context(|| format!("Failed to create `{}`", path.display()))?;
                self.write(&groups, std::io::BufWriter::new(file))?;
                log::info!("wrote {}", path.display());
            }
            None => self.write(&groups, std::io::stdout().lock())?,
        }

        log::info!("finished in {}s", self.start.elapsed().as_secs());
        Ok(())
    }
}
