#[derive(Debug)]
pub enum ErrorKind {
    /// Structurally invalid input: bad sequence, too few columns, unknown label
    Malformed,
    /// The column layout of a transition list could not be inferred
    LayoutInference,
    /// No theoretical value explains an observed m/z
    MassMismatch,
    /// An explained m/z lies outside the instrument range
    OutOfRange,
    /// Rows of one precursor cannot share a single explanation
    AmbiguousModification,
    /// A peptide is missing from its protein sequence
    SequenceNotFound,
    SizeLimitExceeded,
    Io(std::io::Error),
}

/// An import failure, located at a 1-based line and 0-based column
#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
    pub line: Option<u64>,
    pub column: Option<usize>,
}

impl Error {
    pub fn new<S: Into<String>>(kind: ErrorKind, message: S) -> Self {
        Error {
            kind,
            message: message.into(),
            line: None,
            column: None,
        }
    }

    pub fn malformed<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorKind::Malformed, message)
    }

    pub fn at(mut self, line: u64, column: Option<usize>) -> Self {
        self.line = Some(line);
        self.column = column;
        self
    }

    /// Attach a line number unless one is already present
    pub fn on_line(mut self, line: u64) -> Self {
        if self.line.is_none() {
            self.line = Some(line);
        }
        self
    }

    fn suggestion(&self) -> Option<&'static str> {
        match self.kind {
            ErrorKind::MassMismatch => {
                Some("Check the modification and isotope label settings.")
            }
            ErrorKind::OutOfRange => Some("Check the instrument m/z range settings."),
            _ => None,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)?;
        if let Some(line) = self.line {
            write!(f, ", line {}", line)?;
        }
        if let Some(column) = self.column {
            write!(f, ", col {}", column + 1)?;
        }
        f.write_str(".")?;
        if let Some(suggestion) = self.suggestion() {
            write!(f, "\n{}", suggestion)?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ErrorKind::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error {
            message: e.to_string(),
            kind: ErrorKind::Io(e),
            line: None,
            column: None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display() {
        let err = Error::malformed("Invalid peptide sequence 'PEPTIDEX' found").at(3, Some(0));
        assert_eq!(
            err.to_string(),
            "Invalid peptide sequence 'PEPTIDEX' found, line 3, col 1."
        );

        let err = Error::new(ErrorKind::LayoutInference, "Failed to find peptide column").at(1, None);
        assert_eq!(err.to_string(), "Failed to find peptide column, line 1.");

        let err = Error::new(ErrorKind::OutOfRange, "The precursor m/z 1600 is out of range").at(2, Some(1));
        assert_eq!(
            err.to_string(),
            "The precursor m/z 1600 is out of range, line 2, col 2.\nCheck the instrument m/z range settings."
        );
    }

    #[test]
    fn line_is_kept() {
        let err = Error::malformed("bad").at(4, Some(2)).on_line(9);
        assert_eq!(err.line, Some(4));
        let err = Error::malformed("bad").on_line(9);
        assert_eq!(err.line, Some(9));
        assert_eq!(err.column, None);
    }
}
