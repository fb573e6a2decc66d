//! Compile-time diagnostics.
//!
//! Every front-end phase reports failures as `Diagnostic` values carrying the
//! originating file, a span, and a message. The first error stops the
//! pipeline; there is no recovery. Runtime errors are a separate concern: they
//! are ordinary thrown values inside the VM and never use this type.

use crate::position::LineMap;
use crate::span::Span;

/// Which phase produced a diagnostic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Lexical error (bad escape, unterminated string, malformed number).
    Lex,
    /// Syntax error.
    Parse,
    /// Name resolution error, including TDZ reads and duplicate declarations.
    Resolve,
    /// Compile-time type error.
    Type,
    /// Code generation or artifact writing error.
    Emit,
    /// File system failure while loading modules or writing the artifact.
    Io,
}

impl ErrorKind {
    pub const fn label(self) -> &'static str {
        match self {
            ErrorKind::Lex => "lex error",
            ErrorKind::Parse => "parse error",
            ErrorKind::Resolve => "resolve error",
            ErrorKind::Type => "type error",
            ErrorKind::Emit => "emit error",
            ErrorKind::Io => "io error",
        }
    }
}

/// A fatal compile-time error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: ErrorKind,
    pub message: String,
    /// Path of the source file, empty when not yet attributed.
    pub file: String,
    pub span: Span,
}

impl Diagnostic {
    pub fn new(kind: ErrorKind, message: impl Into<String>, span: Span) -> Self {
        Diagnostic {
            kind,
            message: message.into(),
            file: String::new(),
            span,
        }
    }

    pub fn lex(message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::Lex, message, span)
    }

    pub fn parse(message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::Parse, message, span)
    }

    pub fn resolve(message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::Resolve, message, span)
    }

    pub fn type_error(message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::Type, message, span)
    }

    pub fn emit(message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::Emit, message, span)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io, message, Span::dummy())
    }

    /// Attribute this diagnostic to a file if it has none yet.
    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        if self.file.is_empty() {
            self.file = file.into();
        }
        self
    }

    /// Render as `file:line:col: kind: message` against the file's line map.
    pub fn render(&self, line_map: Option<&LineMap>) -> String {
        match (line_map, self.span.is_dummy()) {
            (Some(map), false) => {
                let loc = map.location_of(self.span);
                format!(
                    "{}:{}:{}: {}: {}",
                    self.file,
                    loc.line,
                    loc.column,
                    self.kind.label(),
                    self.message
                )
            }
            _ if self.file.is_empty() => format!("{}: {}", self.kind.label(), self.message),
            _ => format!("{}: {}: {}", self.file, self.kind.label(), self.message),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.render(None))
    }
}

impl std::error::Error for Diagnostic {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_line_and_column() {
        let map = LineMap::new("let x;\nlet y = z;\n");
        let diag = Diagnostic::resolve("undefined variable 'z'", Span::new(15, 16))
            .with_file("main.ts");
        assert_eq!(
            diag.render(Some(&map)),
            "main.ts:2:9: resolve error: undefined variable 'z'"
        );
    }

    #[test]
    fn with_file_does_not_overwrite() {
        let diag = Diagnostic::parse("x", Span::at(0)).with_file("a.ts").with_file("b.ts");
        assert_eq!(diag.file, "a.ts");
    }
}
