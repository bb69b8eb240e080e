use std::path::PathBuf;

use anyhow::{ensure, Context};
use clap::ArgMatches;
use serde::{Deserialize, Serialize};
use transit_core::settings::{Builder, Settings};
use transit_core::ProteinGroup;

#[derive(Serialize)]
/// Actual import parameters - may include overrides or default values not set by user
pub struct Import {
    pub version: String,
    pub settings: Settings,
    pub inputs: Vec<String>,
    pub decimal_separator: char,

    #[serde(skip_serializing)]
    pub output: Option<PathBuf>,

    #[serde(skip_serializing)]
    pub existing: Option<PathBuf>,

    #[serde(skip_serializing)]
    pub tsv: bool,
}

#[derive(Deserialize)]
/// Input import parameters deserialized from JSON file
pub struct Input {
    #[serde(flatten)]
    settings: Builder,
    inputs: Option<Vec<String>>,
    output: Option<String>,
    existing: Option<String>,
    decimal_separator: Option<char>,
    tsv: Option<bool>,
}

impl Input {
    pub fn from_arguments(matches: ArgMatches) -> anyhow::Result<Self> {
        let path = matches
            .get_one::<String>("parameters")
            .context("missing `parameters` argument")?;
        let mut input = Input::load(path)
            .with_context(|| format!("Failed to read parameters from `{path}`"))?;

        // Handle JSON configuration overrides
        if let Some(inputs) = matches.get_many::<String>("inputs") {
            log::trace!("overriding `inputs` parameter.");
            input.inputs = Some(inputs.cloned().collect());
        }
        if let Some(output) = matches.get_one::<String>("output") {
            log::trace!("overriding `output` parameter.");
            input.output = Some(output.into());
        }
        if let Some(existing) = matches.get_one::<String>("existing") {
            log::trace!("overriding `existing` parameter.");
            input.existing = Some(existing.into());
        }
        if let Some(separator) = matches.get_one::<char>("decimal-separator").copied() {
            input.decimal_separator = Some(separator);
        }
        if matches.get_flag("tsv") {
            input.tsv = Some(true);
        }

        ensure!(
            input.inputs.as_ref().map(|i| !i.is_empty()).unwrap_or(false),
            "`inputs` must be set. For more information try '--help'"
        );

        Ok(input)
    }

    pub fn load<S: AsRef<str>>(path: S) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        serde_json::from_str(&contents).map_err(anyhow::Error::from)
    }

    pub fn build(self) -> anyhow::Result<Import> {
        let settings = self.settings.make_parameters();

        let decimal_separator = self.decimal_separator.unwrap_or('.');
        if decimal_separator.is_ascii_digit() || decimal_separator.is_whitespace() {
            log::warn!(
                "Unusual decimal separator `{}`, numbers may not be read correctly",
                decimal_separator
            );
        }
        if settings.heavy_labels.iter().any(|label| label.mods.is_empty()) {
            log::warn!("Isotope labels without modifications are never matched");
        }

        Ok(Import {
            version: clap::crate_version!().into(),
            settings,
            inputs: self.inputs.unwrap_or_default(),
            decimal_separator,
            output: self.output.map(PathBuf::from),
            existing: self.existing.map(PathBuf::from),
            tsv: self.tsv.unwrap_or(false),
        })
    }
}

/// Protein groups of a previous JSON output
pub fn read_groups(path: &std::path::Path) -> anyhow::Result<Vec<ProteinGroup>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read `{}`", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse protein groups from `{}`", path.display()))
}
