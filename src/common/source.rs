/// A human-readable source location attached to every statement and error.
///
/// Statements are built by the (external) parser, which records the file and
/// line they came from; diagnostics render this as `file:line`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
}

impl SourceLocation {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self { file: file.into(), line }
    }

    /// A placeholder location for synthesized nodes.
    pub fn dummy() -> Self {
        Self { file: String::new(), line: 0 }
    }
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}
