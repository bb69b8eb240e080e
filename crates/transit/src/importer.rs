//! Drive the parsers, matcher and group builder over a stream of lines

use std::io::{BufRead, Chain, Cursor, Read};

use fnv::{FnvHashMap, FnvHashSet};

use crate::builder::PeptideGroupBuilder;
use crate::calculator::MassCalculator;
use crate::enzyme::EnzymeParameters;
use crate::error::{Error, ErrorKind};
use crate::fasta::FastaRecords;
use crate::format::{columns_to_fasta, detect_columns, split_fields, NumberFormat};
use crate::matcher::MassMatcher;
use crate::record::{Document, ProteinGroup};
use crate::row_reader::{RowReader, TransitionInfo};
use crate::settings::Settings;

/// Name of the group collecting decoy peptides
pub const DECOYS: &str = "Decoys";

/// Number of data lines sampled for layout inference
const INSPECT_LINES: usize = 50;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProgressStatus {
    /// Percent complete, when the size of the input is known
    pub percent: Option<u8>,
    pub message: String,
}

/// Receives progress updates and may cancel a running import
pub trait ProgressMonitor {
    fn is_cancelled(&self) -> bool;
    fn update(&mut self, status: &ProgressStatus);
}

/// Never cancels, ignores updates
impl ProgressMonitor for () {
    fn is_cancelled(&self) -> bool {
        false
    }

    fn update(&mut self, _: &ProgressStatus) {}
}

fn percent(read: u64, total: Option<u64>) -> Option<u8> {
    total
        .filter(|&total| total > 0)
        .map(|total| (read.saturating_mul(100) / total).min(100) as u8)
}

/// Document totals checked against the size limits
struct SizeLimits {
    peptides: usize,
    transitions: usize,
    max_peptides: usize,
    max_transitions: usize,
}

impl SizeLimits {
    fn new(settings: &Settings, document: &Document) -> Self {
        SizeLimits {
            peptides: document.peptide_count(),
            transitions: document.transition_count(),
            max_peptides: settings.max_peptides,
            max_transitions: settings.max_transitions,
        }
    }

    fn add(&mut self, group: &ProteinGroup) {
        self.peptides += group.peptide_count();
        self.transitions += group.transition_count();
    }

    /// Fails when the totals plus `peptides` and `transitions` still being
    /// built exceed a limit
    fn check(&self, peptides: usize, transitions: usize, line: u64) -> Result<(), Error> {
        if self.peptides + peptides > self.max_peptides
            || self.transitions + transitions > self.max_transitions
        {
            return Err(Error::new(
                ErrorKind::SizeLimitExceeded,
                "Document size limit exceeded",
            )
            .at(line, None));
        }
        Ok(())
    }
}

/// Imports FASTA proteins, or peptide lists written in FASTA form
pub struct FastaImporter<'a> {
    settings: &'a Settings,
    document: &'a Document,
    peptide_list: bool,
}

impl<'a> FastaImporter<'a> {
    pub fn new(settings: &'a Settings, document: &'a Document, peptide_list: bool) -> Self {
        FastaImporter {
            settings,
            document,
            peptide_list,
        }
    }

    /// Import every record of `reader`. Proteins whose residues are already
    /// in the document, or earlier in the same input, are skipped.
    /// `total_bytes` is the size of the input, for progress.
    pub fn import<R: BufRead>(
        &self,
        reader: R,
        total_bytes: Option<u64>,
        monitor: &mut dyn ProgressMonitor,
    ) -> Result<Vec<ProteinGroup>, Error> {
        let enzyme = self.settings.enzyme_parameters();
        let mut limits = SizeLimits::new(self.settings, self.document);
        let mut seen: FnvHashSet<String> = FnvHashSet::default();
        let mut groups = Vec::new();

        let mut records = FastaRecords::new(reader);
        while let Some(record) = records.next() {
            let record = record?;
            if monitor.is_cancelled() {
                return Ok(Vec::new());
            }

            let mut builder = PeptideGroupBuilder::from_header(
                &record.header,
                self.peptide_list,
                self.settings,
                &enzyme,
            );
            monitor.update(&ProgressStatus {
                percent: percent(records.bytes_read(), total_bytes),
                message: format!("Adding protein {}", builder.name),
            });
            for line in &record.lines {
                builder.append_sequence(line);
            }

            let group = builder.into_group();
            if let Some(sequence) = group.sequence.as_ref().filter(|_| !group.peptide_list) {
                if self.document.contains_sequence(sequence) || !seen.insert(sequence.clone()) {
                    log::trace!("skipping {}: sequence already present", group.name);
                    continue;
                }
            }
            limits.add(&group);
            limits.check(0, 0, record.line)?;
            groups.push(group);
        }

        log::info!(
            "imported {} protein groups from {} FASTA lines",
            groups.len(),
            records.lines_read()
        );
        Ok(groups)
    }
}

/// Imports delimited transition lists
pub struct MassListImporter<'a> {
    settings: &'a Settings,
    document: &'a Document,
    matcher: MassMatcher<'a>,
    format: NumberFormat,
    separator: char,
}

/// Lines of the input with their physical line numbers, blank lines skipped
struct NumberedLines<R> {
    reader: R,
    line: u64,
    bytes: u64,
}

impl<R: BufRead> Iterator for NumberedLines<R> {
    type Item = Result<(u64, String), Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut buf = String::new();
        loop {
            buf.clear();
            match self.reader.read_line(&mut buf) {
                Ok(0) => return None,
                Ok(n) => {
                    self.line += 1;
                    self.bytes += n as u64;
                    let line = buf.trim_end_matches(&['\r', '\n'][..]);
                    if !line.trim().is_empty() {
                        return Some(Ok((self.line, line.to_string())));
                    }
                }
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}

/// Groups under construction, one per protein, in order of first appearance
struct Grouping<'s> {
    builders: Vec<PeptideGroupBuilder<'s>>,
    /// Group of each protein name seen in the input
    index: FnvHashMap<String, usize>,
    /// Group receiving rows that name no protein
    current: Option<usize>,
    names: FnvHashSet<String>,
    generated: usize,
    limits: SizeLimits,
    /// Peptides and transitions held by `builders`
    peptides: usize,
    transitions: usize,
}

impl<'s> Grouping<'s> {
    fn new(limits: SizeLimits) -> Self {
        Grouping {
            builders: Vec::new(),
            index: FnvHashMap::default(),
            current: None,
            names: FnvHashSet::default(),
            generated: 0,
            limits,
            peptides: 0,
            transitions: 0,
        }
    }

    fn push(&mut self, builder: PeptideGroupBuilder<'s>) -> usize {
        self.names.insert(builder.name.clone());
        self.builders.push(builder);
        self.builders.len() - 1
    }

    /// Append a row to group `idx`, then check the size limits
    fn append(&mut self, idx: usize, info: TransitionInfo, line_num: u64) -> Result<(), Error> {
        let builder = &mut self.builders[idx];
        let (peptides, transitions) = (builder.peptide_count(), builder.transition_count());
        builder
            .append_transition(info)
            .map_err(|e| e.on_line(line_num))?;
        self.peptides = self.peptides - peptides + builder.peptide_count();
        self.transitions = self.transitions - transitions + builder.transition_count();
        self.limits.check(self.peptides, self.transitions, line_num)
    }

    /// Build every group, merging repeated peptides within each
    fn finish(self, line_num: u64) -> Result<Vec<ProteinGroup>, Error> {
        let groups = self
            .builders
            .into_iter()
            .map(PeptideGroupBuilder::into_group)
            .collect::<Vec<_>>();
        let mut limits = self.limits;
        for group in &groups {
            limits.add(group);
        }
        limits.check(0, 0, line_num)?;
        Ok(groups)
    }

    fn is_used(&self, document: &Document, name: &str) -> bool {
        self.names.contains(name) || document.is_name_used(name)
    }

    /// `name`, or `name` followed by the first free number
    fn unique_name(&self, document: &Document, name: &str) -> String {
        if !self.is_used(document, name) {
            return name.to_string();
        }
        (1..)
            .map(|n| format!("{}{}", name, n))
            .find(|candidate| !self.is_used(document, candidate))
            .unwrap_or_else(|| name.to_string())
    }

    /// Next free `peptidesN` name
    fn generated_name(&mut self, document: &Document) -> String {
        loop {
            self.generated += 1;
            let name = format!("peptides{}", self.generated);
            if !self.is_used(document, &name) {
                return name;
            }
        }
    }
}

impl<'a> MassListImporter<'a> {
    pub fn new(
        settings: &'a Settings,
        document: &'a Document,
        calc: &'a dyn MassCalculator,
        format: NumberFormat,
        separator: char,
    ) -> Self {
        MassListImporter {
            settings,
            document,
            matcher: MassMatcher::new(settings, calc),
            format,
            separator,
        }
    }

    fn is_header(&self, fields: &[String]) -> bool {
        fields
            .iter()
            .all(|field| self.format.parse(field.trim()).is_none())
    }

    /// Infer the column layout from the first lines, returning the reader
    /// and the sampled data lines
    fn infer<R: BufRead>(
        &self,
        lines: &mut NumberedLines<R>,
    ) -> Result<(RowReader, Vec<(u64, String)>), Error> {
        let (mut line_num, mut line) = match lines.next() {
            Some(first) => first?,
            None => return Err(Error::malformed("Empty transition list")),
        };
        let mut fields = split_fields(&line, self.separator);
        let mut headers = None;
        let mut decoy = None;
        if self.is_header(&fields) {
            decoy = fields
                .iter()
                .position(|field| field.trim().eq_ignore_ascii_case("decoy"));
            headers = Some(fields);
            match lines.next() {
                Some(next) => {
                    let (n, l) = next?;
                    line_num = n;
                    line = l;
                    fields = split_fields(&line, self.separator);
                }
                None => {
                    line.clear();
                    fields = Vec::new();
                }
            }
        }
        if fields.len() < 3 {
            return Err(Error::malformed(
                "Invalid transition list. Transition lists must contain at least precursor m/z, product m/z, and peptide sequence.",
            ));
        }

        let mut sample = vec![(line_num, line)];
        if let Some(reader) = RowReader::infer_extended(
            &sample[0].1,
            decoy,
            self.format,
            self.separator,
            &self.matcher,
        )? {
            return Ok((reader, sample));
        }

        while sample.len() < INSPECT_LINES {
            match lines.next() {
                Some(next) => sample.push(next?),
                None => break,
            }
        }
        let text = sample.iter().map(|(_, l)| l.clone()).collect::<Vec<_>>();
        let mut reader = RowReader::infer_general(
            &text,
            headers.as_deref(),
            decoy,
            self.format,
            self.separator,
            &self.matcher,
        )?;
        if reader.is_none() && headers.is_none() {
            // The first line may be a header with numeric-looking names
            let headers = split_fields(&text[0], self.separator);
            sample.remove(0);
            reader = RowReader::infer_general(
                &text[1..],
                Some(headers.as_slice()),
                decoy,
                self.format,
                self.separator,
                &self.matcher,
            )?;
        }
        match reader {
            Some(reader) => Ok((reader, sample)),
            None => Err(Error::new(ErrorKind::LayoutInference, "Failed to find peptide column").at(1, None)),
        }
    }

    /// Import every row of `reader`, grouping rows by protein in order of
    /// first appearance. `total_bytes` is the size of the input, for progress.
    pub fn import<R: BufRead>(
        &self,
        reader: R,
        total_bytes: Option<u64>,
        monitor: &mut dyn ProgressMonitor,
    ) -> Result<Vec<ProteinGroup>, Error> {
        let mut lines = NumberedLines {
            reader,
            line: 0,
            bytes: 0,
        };
        let (rows, sample) = self.infer(&mut lines)?;
        log::trace!("transition list layout: {:?}", rows.layout);

        let enzyme = self.settings.enzyme_parameters();
        let mut grouping = Grouping::new(SizeLimits::new(self.settings, self.document));
        let mut status = ProgressStatus::default();
        let mut sample = sample.into_iter();
        let mut last_line = 0;

        loop {
            let (line_num, line) = match sample.next() {
                Some(next) => next,
                None => match lines.next() {
                    Some(next) => next?,
                    None => break,
                },
            };
            let info = rows.next_row(&line, line_num, &self.matcher)?;
            last_line = line_num;

            if monitor.is_cancelled() {
                return Ok(Vec::new());
            }
            let update = ProgressStatus {
                percent: percent(lines.bytes, total_bytes),
                message: format!(
                    "Importing {}",
                    info.protein.as_deref().unwrap_or(&info.sequence)
                ),
            };
            if update != status {
                monitor.update(&update);
                status = update;
            }

            self.add_row(&mut grouping, &enzyme, info, line_num)?;
        }
        let groups = grouping.finish(last_line)?;

        log::info!(
            "imported {} protein groups, {} peptides, {} transitions",
            groups.len(),
            groups.iter().map(ProteinGroup::peptide_count).sum::<usize>(),
            groups.iter().map(ProteinGroup::transition_count).sum::<usize>(),
        );
        Ok(groups)
    }

    /// Add a row to the group of its protein. Decoy rows share one group,
    /// rows without a protein join the group of the previous row.
    fn add_row<'s>(
        &'s self,
        grouping: &mut Grouping<'s>,
        enzyme: &'s EnzymeParameters,
        info: TransitionInfo,
        line_num: u64,
    ) -> Result<(), Error> {
        let decoy = info.is_decoy();
        let name = match decoy {
            true => Some(DECOYS.to_string()),
            false => info.protein.clone().filter(|name| !name.is_empty()),
        };

        let idx = match (name, grouping.current) {
            (Some(name), _) => match grouping.index.get(&name) {
                Some(&idx) => idx,
                None => {
                    let builder = match self.document.protein(&name) {
                        Some(protein) => {
                            PeptideGroupBuilder::from_protein(protein, self.settings, enzyme)
                        }
                        None => PeptideGroupBuilder::from_header(
                            &format!(">>{}", grouping.unique_name(self.document, &name)),
                            true,
                            self.settings,
                            enzyme,
                        ),
                    };
                    let idx = grouping.push(builder);
                    grouping.index.insert(name, idx);
                    idx
                }
            },
            (None, Some(idx)) => idx,
            (None, None) => {
                let name = grouping.generated_name(self.document);
                grouping.push(PeptideGroupBuilder::from_header(
                    &format!(">>{}", name),
                    true,
                    self.settings,
                    enzyme,
                ))
            }
        };
        if !decoy {
            grouping.current = Some(idx);
        }
        grouping.append(idx, info, line_num)
    }
}

/// First non-blank line among the complete lines of `buf`
fn first_line(buf: &[u8]) -> Option<String> {
    let end = buf.iter().rposition(|&b| b == b'\n')?;
    String::from_utf8_lossy(&buf[..end])
        .lines()
        .find(|line| !line.trim().is_empty())
        .map(String::from)
}

/// The first non-blank line of `reader`, and a reader over the whole input.
/// The line is peeked from the buffer when it is already there, otherwise the
/// leading lines are read and put back in front of `reader`.
fn peek_line<R: BufRead>(mut reader: R) -> Result<(String, Chain<Cursor<Vec<u8>>, R>), Error> {
    let buffered = first_line(reader.fill_buf()?);
    if let Some(line) = buffered {
        return Ok((line, Cursor::new(Vec::new()).chain(reader)));
    }
    let mut head = Vec::new();
    loop {
        let start = head.len();
        if reader.read_until(b'\n', &mut head)? == 0
            || !String::from_utf8_lossy(&head[start..]).trim().is_empty()
        {
            break;
        }
    }
    let line = String::from_utf8_lossy(&head)
        .lines()
        .find(|line| !line.trim().is_empty())
        .unwrap_or_default()
        .to_string();
    Ok((line, Cursor::new(head).chain(reader)))
}

/// Import a file or stream, deciding from its first line between a
/// transition list, a protein table and FASTA. `total_bytes` is the size
/// of the input, for progress.
pub fn import_reader<R: BufRead>(
    reader: R,
    total_bytes: Option<u64>,
    decimal_separator: char,
    settings: &Settings,
    document: &Document,
    calc: &dyn MassCalculator,
    monitor: &mut dyn ProgressMonitor,
) -> Result<Vec<ProteinGroup>, Error> {
    let (first, mut reader) = peek_line(reader)?;
    if first.trim_start().starts_with('>') {
        return FastaImporter::new(settings, document, false).import(reader, total_bytes, monitor);
    }

    match detect_columns(&first, decimal_separator) {
        Some(columns) if columns.has_numeric() => {
            log::trace!("importing transition list: {:?}", columns);
            MassListImporter::new(settings, document, calc, columns.format, columns.separator)
                .import(reader, total_bytes, monitor)
        }
        Some(columns) => {
            // Protein tables are converted to FASTA text as a whole
            log::trace!("importing protein table");
            let mut text = String::new();
            reader.read_to_string(&mut text)?;
            let fasta = columns_to_fasta(&text, columns.separator)?;
            let total = Some(fasta.len() as u64);
            FastaImporter::new(settings, document, false).import(fasta.as_bytes(), total, monitor)
        }
        None => FastaImporter::new(settings, document, false).import(reader, total_bytes, monitor),
    }
}

/// Import pasted or loaded text, see [`import_reader`]
pub fn import_text(
    text: &str,
    decimal_separator: char,
    settings: &Settings,
    document: &Document,
    calc: &dyn MassCalculator,
    monitor: &mut dyn ProgressMonitor,
) -> Result<Vec<ProteinGroup>, Error> {
    import_reader(
        text.as_bytes(),
        Some(text.len() as u64),
        decimal_separator,
        settings,
        document,
        calc,
        monitor,
    )
}
