use crate::context::ContextPane;
use crate::kiosk::{Affordances, Layer, Phase};
use std::collections::VecDeque;

pub const PROMPT_PREFIX: &str = "[guest@usr000 ~]$ ";
pub const ASSISTANT_PREFIX: &str = "[FuzzyBot ~] ";
pub const WAITING_PROMPT: &str = "... warte auf Antwort des Modells ...";
pub const WAITING_NOTICE: &str = "--- Waiting for Model Response ---";
pub const ERROR_PREFIX: &str = "FEHLER> ";
pub const MAX_TRANSCRIPT_LINES: usize = 1200;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineKind {
    Plain,
    Prompt,
    Model,
    Error,
    Notice,
    Spacer,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TranscriptLine {
    pub kind: LineKind,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PromptLine {
    Input(String),
    Waiting,
    Hidden,
}

impl PromptLine {
    pub fn text(&self) -> String {
        match self {
            PromptLine::Input(input) => format!("{PROMPT_PREFIX}{input}"),
            PromptLine::Waiting => WAITING_PROMPT.to_string(),
            PromptLine::Hidden => String::new(),
        }
    }
}

/// Rolling buffer behind the chat pane.
#[derive(Clone, Debug)]
pub struct Transcript {
    lines: VecDeque<TranscriptLine>,
    max_lines: usize,
    open_model_line: Option<usize>,
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new(MAX_TRANSCRIPT_LINES)
    }
}

impl Transcript {
    pub fn new(max_lines: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            max_lines: max_lines.max(1),
            open_model_line: None,
        }
    }

    pub fn lines(&self) -> impl Iterator<Item = &TranscriptLine> {
        self.lines.iter()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn count(&self, kind: LineKind) -> usize {
        self.lines.iter().filter(|line| line.kind == kind).count()
    }

    pub fn push(&mut self, kind: LineKind, text: impl Into<String>) {
        self.lines.push_back(TranscriptLine {
            kind,
            text: text.into(),
        });
        self.prune();
    }

    pub fn start_model_line(&mut self, prefix: &str) {
        self.push(LineKind::Model, prefix);
        self.open_model_line = self.lines.len().checked_sub(1);
    }

    pub fn append_model_text(&mut self, text: &str) {
        let open = self
            .open_model_line
            .and_then(|idx| self.lines.get_mut(idx));
        match open {
            Some(line) => line.text.push_str(text),
            None => {
                self.start_model_line(ASSISTANT_PREFIX);
                if let Some(line) = self.lines.back_mut() {
                    line.text.push_str(text);
                }
            }
        }
    }

    /// Closes the streaming line, followed by a spacer. No-op when none is
    /// open.
    pub fn finish_model_line(&mut self) {
        if self.open_model_line.take().is_some() {
            self.push(LineKind::Spacer, "\u{a0}");
        }
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.open_model_line = None;
    }

    fn prune(&mut self) {
        while self.lines.len() > self.max_lines {
            self.lines.pop_front();
            self.open_model_line = self.open_model_line.and_then(|idx| idx.checked_sub(1));
        }
    }
}

/// Rendering collaborator driven by the kiosk session.
pub trait KioskView {
    fn print_line(&mut self, kind: LineKind, text: &str);
    fn start_assistant_line(&mut self, prefix: &str);
    fn append_assistant_text(&mut self, text: &str);
    fn finish_assistant_line(&mut self);
    fn render_prompt(&mut self, prompt: &PromptLine);
    fn show_request(&mut self, preview: &str);
    fn show_context(&mut self, pane: &ContextPane);
    /// Back to the state of a freshly started application.
    fn reset(&mut self);

    fn highlight(&mut self, _phase: Phase) {}
    fn set_affordances(&mut self, _affordances: Affordances) {}
    fn set_keyboard_visible(&mut self, _visible: bool) {}
    fn set_keyboard_layer(&mut self, _layer: Layer) {}
    fn set_keyboard_input(&mut self, _input: &str) {}
    fn set_intro_visible(&mut self, _visible: bool) {}
    fn idle_progress(&mut self, _remaining: f32) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn streaming_line_collects_fragments() {
        let mut transcript = Transcript::default();
        transcript.start_model_line(ASSISTANT_PREFIX);
        transcript.append_model_text("Du");
        transcript.append_model_text(" nutzt");
        transcript.finish_model_line();
        let lines: Vec<_> = transcript.lines().collect();
        assert_eq!(lines[0].text, "[FuzzyBot ~] Du nutzt");
        assert_eq!(lines[1].kind, LineKind::Spacer);
    }

    #[test]
    fn append_without_open_line_starts_one() {
        let mut transcript = Transcript::default();
        transcript.append_model_text("x");
        assert_eq!(
            transcript.lines().next().map(|line| line.text.as_str()),
            Some("[FuzzyBot ~] x")
        );
    }

    #[test]
    fn finishing_twice_adds_one_spacer() {
        let mut transcript = Transcript::default();
        transcript.start_model_line(ASSISTANT_PREFIX);
        transcript.finish_model_line();
        transcript.finish_model_line();
        assert_eq!(transcript.count(LineKind::Spacer), 1);
    }

    #[test]
    fn prunes_oldest_lines_and_tracks_open_line() {
        let mut transcript = Transcript::new(3);
        transcript.push(LineKind::Plain, "a");
        transcript.start_model_line("> ");
        transcript.push(LineKind::Notice, "b");
        transcript.push(LineKind::Notice, "c");
        transcript.append_model_text("tail");
        let texts: Vec<_> = transcript.lines().map(|line| line.text.as_str()).collect();
        assert_eq!(texts, ["> tail", "b", "c"]);

        transcript.push(LineKind::Notice, "d");
        transcript.append_model_text("new");
        let texts: Vec<_> = transcript.lines().map(|line| line.text.as_str()).collect();
        assert_eq!(texts, ["c", "d", "[FuzzyBot ~] new"]);
    }

    #[test]
    fn prompt_line_text() {
        assert_eq!(
            PromptLine::Input("ls".into()).text(),
            "[guest@usr000 ~]$ ls"
        );
        assert_eq!(PromptLine::Waiting.text(), WAITING_PROMPT);
    }
}
