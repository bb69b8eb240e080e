pub mod builder;
pub mod calculator;
pub mod enzyme;
pub mod error;
pub mod fasta;
pub mod format;
pub mod importer;
pub mod ion_series;
pub mod mass;
pub mod matcher;
pub mod modification;
pub mod peptide;
pub mod record;
pub mod row_reader;
pub mod settings;

pub use error::{Error, ErrorKind};
pub use importer::{
    import_reader, import_text, FastaImporter, MassListImporter, ProgressMonitor, ProgressStatus,
};
pub use record::{Document, ProteinGroup};
pub use settings::{Builder, Settings};

