use crate::context::ContextPane;
use crate::kiosk::Phase;
use crate::view::{KioskView, LineKind, PromptLine};
use std::io::Write;

/// Line-oriented front-end: the transcript goes to `out`, the auxiliary
/// panes go to the log.
pub struct ConsoleView<W: Write> {
    out: W,
    line_open: bool,
}

impl<W: Write> ConsoleView<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            line_open: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, text: &str) {
        let result = self
            .out
            .write_all(text.as_bytes())
            .and_then(|()| self.out.flush());
        if let Err(err) = result {
            tracing::warn!(error = %err, "console write failed");
        }
    }

    fn break_open_line(&mut self) {
        if std::mem::take(&mut self.line_open) {
            self.emit("\n");
        }
    }
}

impl<W: Write> KioskView for ConsoleView<W> {
    fn print_line(&mut self, kind: LineKind, text: &str) {
        self.break_open_line();
        match kind {
            LineKind::Spacer => self.emit("\n"),
            _ => self.emit(&format!("{text}\n")),
        }
    }

    fn start_assistant_line(&mut self, prefix: &str) {
        self.break_open_line();
        self.emit(prefix);
        self.line_open = true;
    }

    fn append_assistant_text(&mut self, text: &str) {
        self.line_open = true;
        self.emit(text);
    }

    fn finish_assistant_line(&mut self) {
        if std::mem::take(&mut self.line_open) {
            self.emit("\n\n");
        }
    }

    fn render_prompt(&mut self, prompt: &PromptLine) {
        tracing::trace!(prompt = %prompt.text(), "prompt");
    }

    fn show_request(&mut self, preview: &str) {
        tracing::debug!(bytes = preview.len(), "request preview\n{preview}");
    }

    fn show_context(&mut self, pane: &ContextPane) {
        tracing::debug!(lines = pane.lines.len(), "retrieval context\n{}", pane.text());
    }

    fn reset(&mut self) {
        self.break_open_line();
        self.emit("\n");
    }

    fn highlight(&mut self, phase: Phase) {
        tracing::debug!(step = ?phase.step(), "step");
    }
}
