#![allow(dead_code)]

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;
use fuzzybot::ai::{ChatError, ChatResult, EventStream, ResponseSource};
use fuzzybot::context::ContextPane;
use fuzzybot::kiosk::{Affordances, KioskInput, Layer, Phase, PhysicalKey};
use fuzzybot::types::{ChatRequest, RetrievalHit, StreamEvent};
use fuzzybot::view::{KioskView, LineKind, PromptLine, Transcript};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

/// Everything the kiosk painted, kept for assertions.
#[derive(Default)]
pub struct Recorded {
    pub transcript: Transcript,
    pub contexts: Vec<ContextPane>,
    pub requests: Vec<String>,
    pub phases: Vec<Phase>,
    pub affordances: Vec<Affordances>,
    pub layers: Vec<Layer>,
    pub keyboard_visible: Vec<bool>,
    pub keyboard_input: String,
    pub prompt: Option<PromptLine>,
    pub resets: usize,
}

impl Recorded {
    pub fn texts(&self, kind: LineKind) -> Vec<String> {
        self.transcript
            .lines()
            .filter(|line| line.kind == kind)
            .map(|line| line.text.clone())
            .collect()
    }

    pub fn context_text(&self) -> String {
        self.contexts.last().map(ContextPane::text).unwrap_or_default()
    }
}

pub struct RecordingView(Rc<RefCell<Recorded>>);

impl RecordingView {
    pub fn new() -> (Self, Rc<RefCell<Recorded>>) {
        let recorded = Rc::new(RefCell::new(Recorded::default()));
        (Self(Rc::clone(&recorded)), recorded)
    }
}

impl KioskView for RecordingView {
    fn print_line(&mut self, kind: LineKind, text: &str) {
        self.0.borrow_mut().transcript.push(kind, text);
    }

    fn start_assistant_line(&mut self, prefix: &str) {
        self.0.borrow_mut().transcript.start_model_line(prefix);
    }

    fn append_assistant_text(&mut self, text: &str) {
        self.0.borrow_mut().transcript.append_model_text(text);
    }

    fn finish_assistant_line(&mut self) {
        self.0.borrow_mut().transcript.finish_model_line();
    }

    fn render_prompt(&mut self, prompt: &PromptLine) {
        self.0.borrow_mut().prompt = Some(prompt.clone());
    }

    fn show_request(&mut self, preview: &str) {
        self.0.borrow_mut().requests.push(preview.to_string());
    }

    fn show_context(&mut self, pane: &ContextPane) {
        self.0.borrow_mut().contexts.push(pane.clone());
    }

    fn reset(&mut self) {
        let mut recorded = self.0.borrow_mut();
        recorded.transcript.clear();
        recorded.resets += 1;
    }

    fn highlight(&mut self, phase: Phase) {
        self.0.borrow_mut().phases.push(phase);
    }

    fn set_affordances(&mut self, affordances: Affordances) {
        self.0.borrow_mut().affordances.push(affordances);
    }

    fn set_keyboard_visible(&mut self, visible: bool) {
        self.0.borrow_mut().keyboard_visible.push(visible);
    }

    fn set_keyboard_layer(&mut self, layer: Layer) {
        self.0.borrow_mut().layers.push(layer);
    }

    fn set_keyboard_input(&mut self, input: &str) {
        self.0.borrow_mut().keyboard_input = input.to_string();
    }
}

pub enum Script {
    /// Connect succeeds and these items follow; the stream then ends.
    Events(Vec<ChatResult<StreamEvent>>),
    /// Connect succeeds and these items follow; the stream then stalls.
    Stall(Vec<ChatResult<StreamEvent>>),
    /// Connect fails.
    Reject(ChatError),
}

/// Replays one script per exchange and records every request.
pub struct ScriptedSource {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedSource {
    pub fn new(scripts: impl IntoIterator<Item = Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn empty() -> Arc<Self> {
        Self::new(Vec::new())
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResponseSource for ScriptedSource {
    async fn connect(&self, request: ChatRequest) -> ChatResult<EventStream> {
        self.requests.lock().unwrap().push(request);
        let script = self.scripts.lock().unwrap().pop_front();
        match script {
            Some(Script::Events(items)) => Ok(stream::iter(items).boxed()),
            Some(Script::Stall(items)) => Ok(stream::iter(items).chain(stream::pending()).boxed()),
            Some(Script::Reject(err)) => Err(err),
            None => Ok(stream::empty().boxed()),
        }
    }
}

pub fn typed(text: &str) -> Vec<KioskInput> {
    text.chars()
        .map(|c| KioskInput::Key(PhysicalKey::Char(c)))
        .chain([KioskInput::Key(PhysicalKey::Enter)])
        .collect()
}

pub fn hit(document_id: &str, page: Option<u32>, text: &str) -> RetrievalHit {
    RetrievalHit {
        document_id: document_id.to_string(),
        page,
        text: text.to_string(),
    }
}

pub fn meta(hits: Vec<RetrievalHit>) -> ChatResult<StreamEvent> {
    Ok(StreamEvent::Meta {
        hits,
        augmented_user_message: None,
    })
}

pub fn token(text: &str) -> ChatResult<StreamEvent> {
    Ok(StreamEvent::Token(text.to_string()))
}
