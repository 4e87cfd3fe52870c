//! Diagnostics: severity levels, the diagnostic record, the engine that
//! collects reports, and the clients that render them.
//!
//! Actions never unwind on bad input; every error flows through
//! [`DiagnosticsEngine::report`] and the analyzer keeps going so that one
//! pass over the source surfaces as many problems as possible. Callers check
//! [`DiagnosticsEngine::had_errors`] before handing the tree to a backend.

use thiserror::Error;

use codespan_reporting::diagnostic::{Diagnostic as RenderDiagnostic, Label};
use codespan_reporting::files::SimpleFile;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};
use codespan_reporting::term::{emit, Config};

use crate::source::{SourceLocation, SourceRange};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Note,
    Warning,
    Error,
    Fatal,
}

/// An attached secondary message, e.g. "previous definition is here".
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub range: SourceRange,
    pub message: String,
}

#[derive(Debug, Clone, Error)]
#[error("{level:?}: {message}")]
pub struct Diagnostic {
    pub level: Level,
    pub range: SourceRange,
    pub message: String,
    pub notes: Vec<Note>,
}

/// Renders fully formed diagnostics. The core only hands records over;
/// formatting them for a human is the client's business.
pub trait DiagnosticClient {
    fn handle(&mut self, diag: &Diagnostic);
}

/// Renders to stderr through codespan-reporting.
pub struct ConsoleClient {
    stderr: StandardStream,
    file: SimpleFile<String, String>,
    config: Config,
}

impl ConsoleClient {
    pub fn new(file_name: impl Into<String>, source: impl Into<String>) -> ConsoleClient {
        ConsoleClient {
            stderr: StandardStream::stderr(ColorChoice::Auto),
            file: SimpleFile::new(file_name.into(), source.into()),
            config: Config::default(),
        }
    }
}

impl DiagnosticClient for ConsoleClient {
    fn handle(&mut self, diag: &Diagnostic) {
        let rendered = match diag.level {
            Level::Note => RenderDiagnostic::note(),
            Level::Warning => RenderDiagnostic::warning(),
            Level::Error | Level::Fatal => RenderDiagnostic::error(),
        };
        let mut labels = vec![Label::primary((), diag.range.byte_range())];
        for note in &diag.notes {
            labels.push(
                Label::secondary((), note.range.byte_range()).with_message(note.message.clone()),
            );
        }
        let rendered = rendered
            .with_message(diag.message.clone())
            .with_labels(labels);
        let _ = emit(&mut self.stderr, &self.config, &self.file, &rendered);
    }
}

/// Collects diagnostics without rendering; used by tests and embedders.
#[derive(Default)]
pub struct BufferClient {
    pub diagnostics: Vec<Diagnostic>,
}

impl DiagnosticClient for BufferClient {
    fn handle(&mut self, diag: &Diagnostic) {
        self.diagnostics.push(diag.clone());
    }
}

/// Collects reports, tracks counts and the persistent error flag, and
/// forwards each record to the configured client.
pub struct DiagnosticsEngine {
    client: Option<Box<dyn DiagnosticClient>>,
    diagnostics: Vec<Diagnostic>,
    num_errors: u32,
    num_warnings: u32,
    had_fatal: bool,
    /// Treat warnings as errors.
    pub werror: bool,
    /// Stop constructing after this many errors. `None` means no limit.
    pub error_limit: Option<u32>,
}

impl DiagnosticsEngine {
    pub fn new() -> DiagnosticsEngine {
        DiagnosticsEngine {
            client: None,
            diagnostics: Vec::new(),
            num_errors: 0,
            num_warnings: 0,
            had_fatal: false,
            werror: false,
            error_limit: None,
        }
    }

    pub fn with_client(client: Box<dyn DiagnosticClient>) -> DiagnosticsEngine {
        let mut engine = DiagnosticsEngine::new();
        engine.client = Some(client);
        engine
    }

    pub fn set_client(&mut self, client: Box<dyn DiagnosticClient>) {
        self.client = Some(client);
    }

    pub fn report(
        &mut self,
        level: Level,
        range: impl Into<SourceRange>,
        message: impl Into<String>,
    ) {
        self.emit(Diagnostic {
            level,
            range: range.into(),
            message: message.into(),
            notes: Vec::new(),
        });
    }

    /// Report with a secondary note, the shape used for "previous definition
    /// is here" style diagnostics.
    pub fn report_with_note(
        &mut self,
        level: Level,
        range: impl Into<SourceRange>,
        message: impl Into<String>,
        note_range: impl Into<SourceRange>,
        note_message: impl Into<String>,
    ) {
        self.emit(Diagnostic {
            level,
            range: range.into(),
            message: message.into(),
            notes: vec![Note {
                range: note_range.into(),
                message: note_message.into(),
            }],
        });
    }

    pub fn report_error(&mut self, loc: SourceLocation, message: impl Into<String>) {
        self.report(Level::Error, loc, message);
    }

    pub fn report_warning(&mut self, loc: SourceLocation, message: impl Into<String>) {
        self.report(Level::Warning, loc, message);
    }

    fn emit(&mut self, mut diag: Diagnostic) {
        if diag.level == Level::Warning && self.werror {
            diag.level = Level::Error;
        }
        match diag.level {
            Level::Warning => self.num_warnings += 1,
            Level::Error => self.num_errors += 1,
            Level::Fatal => {
                self.num_errors += 1;
                self.had_fatal = true;
            }
            Level::Note => {}
        }
        if let Some(client) = self.client.as_mut() {
            client.handle(&diag);
        }
        self.diagnostics.push(diag);
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn num_errors(&self) -> u32 {
        self.num_errors
    }

    pub fn num_warnings(&self) -> u32 {
        self.num_warnings
    }

    pub fn had_errors(&self) -> bool {
        self.num_errors > 0
    }

    pub fn had_fatal(&self) -> bool {
        self.had_fatal
    }

    /// True once the configured error limit has been hit; the analyzer stops
    /// constructing new nodes but already-built ones stay valid.
    pub fn error_limit_reached(&self) -> bool {
        match self.error_limit {
            Some(limit) => self.num_errors >= limit,
            None => false,
        }
    }
}

impl Default for DiagnosticsEngine {
    fn default() -> Self {
        DiagnosticsEngine::new()
    }
}
