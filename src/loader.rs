//! Reading configuration files.
//!
//! The loader never stops at the first problem: every bad line is recorded
//! as a `Diagnostic`, counted, and reading continues so that one run reports
//! everything that is wrong with a file.

use std::fmt;
use std::path::Path;

use crate::directive::Directive;
use crate::error::SymbolError;
use crate::state::ConfigState;
use crate::symbol::Origin;

/// Includes nested deeper than this are assumed to be a cycle.
const MAX_INCLUDE_DEPTH: usize = 16;

/// One configuration problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub origin: Option<Origin>,
    pub message: String,
    /// Extra line, already qualified with its own location if it has one.
    pub note: Option<String>,
}

impl Diagnostic {
    pub fn new(origin: Option<Origin>, message: impl Into<String>) -> Self {
        Self {
            origin,
            message: message.into(),
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.origin {
            Some(origin) => write!(f, "{}: {}", origin, self.message)?,
            None => write!(f, "{}", self.message)?,
        }
        if let Some(note) = &self.note {
            write!(f, "\n{}", note)?;
        }
        Ok(())
    }
}

pub struct ConfigLoader {
    state: ConfigState,
    diagnostics: Vec<Diagnostic>,
    depth: usize,
}

impl ConfigLoader {
    pub fn new(state: ConfigState) -> Self {
        Self {
            state,
            diagnostics: vec![],
            depth: 0,
        }
    }

    /// Reads a configuration file. Returns the number of errors found.
    pub fn load(&mut self, path: &Path) -> usize {
        match std::fs::read_to_string(path) {
            Ok(text) => self.load_str(&path.display().to_string(), &text),
            Err(e) => {
                self.report(Diagnostic::new(
                    None,
                    format!("failed to read config file '{}' : {}", path.display(), e),
                ));
                1
            }
        }
    }

    /// Parses configuration text as if read from a file called `name`.
    pub fn load_str(&mut self, name: &str, text: &str) -> usize {
        tracing::debug!("reading configuration from {}", name);
        logical_lines(text)
            .into_iter()
            .map(|(line, tokens)| self.directive(&Origin::new(name, line), &tokens))
            .sum()
    }

    fn directive(&mut self, origin: &Origin, tokens: &[String]) -> usize {
        if tokens.len() < 2 {
            return self.error(origin, "syntax error ; expected key/value pair");
        }
        let keyword = tokens[0].to_lowercase();
        match Directive::lookup(&keyword) {
            Some(directive) => {
                tracing::trace!("{}: {:?}", origin, directive);
                directive.apply(self, tokens, origin)
            }
            None => self.error(origin, format!("unknown keyword '{}'", keyword)),
        }
    }

    pub fn state(&self) -> &ConfigState {
        &self.state
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Runs the cross-file checks and hands over the state.
    pub fn finish(mut self) -> (ConfigState, Vec<Diagnostic>) {
        let late = self.state.finalize();
        self.diagnostics.extend(late);
        (self.state, self.diagnostics)
    }

    pub(crate) fn state_mut(&mut self) -> &mut ConfigState {
        &mut self.state
    }

    pub(crate) fn include(&mut self, path: &Path, origin: &Origin) -> usize {
        if self.depth >= MAX_INCLUDE_DEPTH {
            return self.error(
                origin,
                format!("include nested too deeply at '{}'", path.display()),
            );
        }
        self.depth += 1;
        let errors = self.load(path);
        self.depth -= 1;
        errors
    }

    /// Records an error and returns its count, 1.
    pub(crate) fn error(&mut self, origin: &Origin, message: impl Into<String>) -> usize {
        self.report(Diagnostic::new(Some(origin.clone()), message));
        1
    }

    /// Like `error`, with a second line that carries its own location.
    pub(crate) fn error_with_note(
        &mut self,
        origin: &Origin,
        message: impl Into<String>,
        note: String,
    ) -> usize {
        self.report(Diagnostic::new(Some(origin.clone()), message).with_note(note));
        1
    }

    pub(crate) fn redefinition(&mut self, origin: &Origin, err: SymbolError) -> usize {
        let note = format!("{}: previous definition was here", err.original);
        self.error_with_note(origin, err.to_string(), note)
    }

    fn report(&mut self, diagnostic: Diagnostic) {
        tracing::debug!("config error: {}", diagnostic.message);
        self.diagnostics.push(diagnostic);
    }
}

/// Splits text into logical lines of whitespace separated tokens.
///
/// `#` starts a comment anywhere on a line. A trailing backslash joins the
/// next non-blank line. Each logical line carries the number of its last
/// physical line.
pub fn logical_lines(text: &str) -> Vec<(usize, Vec<String>)> {
    let mut lines = vec![];
    let mut pending = String::new();
    let mut last = 0;

    for (index, raw) in text.lines().enumerate() {
        let stripped = match raw.split_once('#') {
            Some((code, _comment)) => code,
            None => raw,
        }
        .trim();
        if stripped.is_empty() {
            continue;
        }
        last = index + 1;

        pending.push(' ');
        if let Some(continued) = stripped.strip_suffix('\\') {
            pending.push_str(continued.trim());
            continue;
        }
        pending.push_str(stripped);
        lines.push((last, tokenize(&pending)));
        pending.clear();
    }

    let tokens = tokenize(&pending);
    if !tokens.is_empty() {
        lines.push((last, tokens));
    }
    lines
}

fn tokenize(line: &str) -> Vec<String> {
    line.split_whitespace().map(str::to_string).collect()
}
