use std::io::Write;

use transit_core::record::{PeptideRecord, PrecursorRecord, TransitionRecord};
use transit_core::ProteinGroup;

use crate::Runner;

/// Decoy shifts are written as integers, and left blank for targets
fn shift(shift: Option<i32>) -> String {
    shift
        .map(|shift| itoa::Buffer::new().format(shift).to_string())
        .unwrap_or_default()
}

impl Runner {
    pub fn serialize_transition(
        &self,
        group: &ProteinGroup,
        peptide: &PeptideRecord,
        precursor: &PrecursorRecord,
        transition: &TransitionRecord,
    ) -> csv::ByteRecord {
        let mut record = csv::ByteRecord::new();
        record.push_field(group.name.as_bytes());
        record.push_field(peptide.sequence.as_bytes());
        record.push_field(peptide.modified_sequence.as_bytes());
        record.push_field(peptide.decoy.to_string().as_bytes());
        record.push_field(itoa::Buffer::new().format(precursor.charge).as_bytes());
        record.push_field(precursor.label.name().as_bytes());
        record.push_field(ryu::Buffer::new().format(precursor.mz).as_bytes());
        record.push_field(shift(precursor.mass_shift).as_bytes());
        record.push_field(transition.ion.to_string().as_bytes());
        record.push_field(itoa::Buffer::new().format(transition.ordinal).as_bytes());
        record.push_field(itoa::Buffer::new().format(transition.charge).as_bytes());
        record.push_field(transition.losses.names.join("+").as_bytes());
        record.push_field(ryu::Buffer::new().format(transition.mz).as_bytes());
        record.push_field(shift(transition.mass_shift).as_bytes());
        record
    }

    /// One row per transition
    pub fn write_tsv<W: Write>(&self, groups: &[ProteinGroup], writer: W) -> anyhow::Result<()> {
        let mut wtr = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(writer);

        let headers = csv::ByteRecord::from(vec![
            "protein",
            "peptide",
            "modified_peptide",
            "decoy",
            "precursor_charge",
            "label",
            "precursor_mz",
            "precursor_shift",
            "ion",
            "ordinal",
            "product_charge",
            "losses",
            "product_mz",
            "product_shift",
        ]);

        wtr.write_byte_record(&headers)?;
        for group in groups {
            for peptide in &group.peptides {
                for precursor in &peptide.precursors {
                    for transition in &precursor.transitions {
                        let record =
                            self.serialize_transition(group, peptide, precursor, transition);
                        wtr.write_byte_record(&record)?;
                    }
                }
            }
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn write_json<W: Write>(&self, groups: &[ProteinGroup], mut writer: W) -> anyhow::Result<()> {
        serde_json::to_writer_pretty(&mut writer, groups)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    pub fn write<W: Write>(&self, groups: &[ProteinGroup], writer: W) -> anyhow::Result<()> {
        match self.parameters.tsv {
            true => self.write_tsv(groups, writer),
            false => self.write_json(groups, writer),
        }
    }
}
