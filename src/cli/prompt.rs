//! Line editor shared by the interactive commands, with masked password entry.

use anyhow::Result;
use rustyline::completion::Completer;
use rustyline::error::ReadlineError;
use rustyline::highlight::{CmdKind, Highlighter};
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{Editor, Helper};
use std::borrow::Cow;

/// Renders every typed character as `*` while `masking` is set.
#[derive(Default)]
pub(crate) struct MaskingHelper {
    masking: bool,
}

impl Completer for MaskingHelper {
    type Candidate = String;
}

impl Hinter for MaskingHelper {
    type Hint = String;
}

impl Validator for MaskingHelper {}

impl Highlighter for MaskingHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if self.masking {
            Cow::Owned("*".repeat(line.chars().count()))
        } else {
            Cow::Borrowed(line)
        }
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _kind: CmdKind) -> bool {
        self.masking
    }
}

impl Helper for MaskingHelper {}

pub(crate) type LineEditor = Editor<MaskingHelper, DefaultHistory>;

pub(crate) fn editor() -> Result<LineEditor> {
    let mut rl = LineEditor::new()?;
    rl.set_helper(Some(MaskingHelper::default()));
    Ok(rl)
}

/// Outcome of reading one line.
pub(crate) enum Line {
    Text(String),
    /// Ctrl+C
    Interrupted,
    /// Ctrl+D
    Eof,
}

pub(crate) fn read_line(rl: &mut LineEditor, prompt: &str) -> Result<Line> {
    match rl.readline(prompt) {
        Ok(line) => Ok(Line::Text(line)),
        Err(ReadlineError::Interrupted) => Ok(Line::Interrupted),
        Err(ReadlineError::Eof) => Ok(Line::Eof),
        Err(e) => Err(e.into()),
    }
}

/// Read a password without echoing it. Never added to history.
/// `None` if the user cancelled.
pub(crate) fn read_password(rl: &mut LineEditor, prompt: &str) -> Result<Option<String>> {
    set_masking(rl, true);
    let line = read_line(rl, prompt);
    set_masking(rl, false);

    match line? {
        Line::Text(password) => Ok(Some(password)),
        Line::Interrupted | Line::Eof => Ok(None),
    }
}

fn set_masking(rl: &mut LineEditor, masking: bool) {
    if let Some(helper) = rl.helper_mut() {
        helper.masking = masking;
    }
}
