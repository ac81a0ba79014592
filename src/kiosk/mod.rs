/// Kiosk session context
///
/// One [`Kiosk`] owns every piece of mutable session state and is driven by a
/// single cooperative loop: input events, stream events and timer deadlines
/// are handled one at a time, so no state is shared across tasks.
///
/// # Architecture
///
/// - `history` - bounded conversation sent with each request
/// - `highlight` - pipeline step shown to the visitor, with a minimum dwell
/// - `idle` - unattended-kiosk reset countdown
/// - `keyboard` - on-screen keyboard layers and modifier state
/// - `gate` - readiness flags and the affordances derived from them
mod gate;
mod highlight;
mod history;
mod idle;
mod keyboard;

pub use gate::{Affordances, SessionState};
pub use highlight::{Pane, Phase, StepHighlighter};
pub use history::ConversationHistory;
pub use idle::{IdleTick, IdleTimer};
pub use keyboard::{KeyCap, KeyboardModifiers, Layer, VirtualKey, layout_rows, resolve};

use crate::ai::{ChatError, ChatResult, ResponseSource};
use crate::config::KioskConfig;
use crate::context::{ContextPane, PREVIEW_CHAR_LIMIT, REQUEST_PLACEHOLDER, request_preview};
use crate::types::{ChatRequest, StreamEvent};
use crate::view::{
    ASSISTANT_PREFIX, ERROR_PREFIX, KioskView, LineKind, PROMPT_PREFIX, PromptLine, WAITING_NOTICE,
};
use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt, future};
use std::sync::Arc;
use tokio::time::Instant;

const SPACER: &str = "\u{a0}";

/// Key from a physical keyboard focused on the terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PhysicalKey {
    Char(char),
    Backspace,
    Enter,
    Other,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KioskInput {
    Key(PhysicalKey),
    VirtualKey(VirtualKey),
    Paste(String),
    Pointer,
    ToggleKeyboard,
    VisibilityChanged { visible: bool },
    DismissIntro,
    Reset,
}

impl KioskInput {
    /// Whether this input counts as visitor activity for the idle window.
    pub fn is_interaction(&self) -> bool {
        !matches!(self, KioskInput::VisibilityChanged { .. })
    }
}

enum SourceItem {
    Accepted,
    Event(StreamEvent),
}

/// The one outstanding request. Dropping it cancels the transport.
struct Exchange {
    items: BoxStream<'static, ChatResult<SourceItem>>,
    deadline: Instant,
    assistant_text: String,
    streaming_started: bool,
    line_open: bool,
}

#[derive(Clone, Copy, Debug)]
struct WaitingBlink {
    next: Instant,
    visible: bool,
}

#[derive(Clone, Debug)]
struct IntroPlayback {
    chars: Vec<char>,
    pos: usize,
    next_at: Instant,
}

enum Wake {
    Input(Option<KioskInput>),
    Exchange(Option<ChatResult<SourceItem>>),
    Timer,
}

pub struct Kiosk<V: KioskView> {
    config: KioskConfig,
    source: Arc<dyn ResponseSource>,
    view: V,
    history: ConversationHistory,
    session: SessionState,
    highlighter: StepHighlighter,
    idle: IdleTimer,
    modifiers: KeyboardModifiers,
    keyboard_visible: bool,
    input: String,
    typed_step_triggered: bool,
    last_question: String,
    exchange: Option<Exchange>,
    speculative_context_at: Option<Instant>,
    blink: Option<WaitingBlink>,
    intro: Option<IntroPlayback>,
    intro_played: bool,
}

impl<V: KioskView> Kiosk<V> {
    pub fn new(config: KioskConfig, source: Arc<dyn ResponseSource>, view: V) -> Self {
        let timings = config.timings;
        Self {
            history: ConversationHistory::new(config.system_prompt.clone(), config.max_history),
            highlighter: StepHighlighter::new(timings.min_step_hold),
            idle: IdleTimer::new(timings.idle_timeout, timings.idle_tick, Instant::now()),
            config,
            source,
            view,
            session: SessionState::default(),
            modifiers: KeyboardModifiers::default(),
            keyboard_visible: false,
            input: String::new(),
            typed_step_triggered: false,
            last_question: String::new(),
            exchange: None,
            speculative_context_at: None,
            blink: None,
            intro: None,
            intro_played: false,
        }
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn session(&self) -> SessionState {
        self.session
    }

    pub fn active_phase(&self) -> Phase {
        self.highlighter.active()
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn into_view(self) -> V {
        self.view
    }

    /// Drives the session until `inputs` ends and nothing is left in flight.
    pub async fn run<I>(mut self, mut inputs: I) -> Self
    where
        I: Stream<Item = KioskInput> + Unpin,
    {
        self.start(Instant::now());
        let mut inputs_open = true;

        loop {
            if !inputs_open && self.is_settled() {
                break;
            }
            let wake_at = self.next_deadline();
            let wake = tokio::select! {
                biased;
                input = inputs.next(), if inputs_open => Wake::Input(input),
                () = sleep_until(wake_at) => Wake::Timer,
                item = next_item(&mut self.exchange) => Wake::Exchange(item),
            };

            let now = Instant::now();
            match wake {
                Wake::Input(Some(input)) => self.handle_input(input, now),
                Wake::Input(None) => {
                    tracing::debug!("input source closed");
                    inputs_open = false;
                }
                Wake::Exchange(item) => self.on_exchange_item(item, now),
                Wake::Timer => self.on_timers(now),
            }
        }
        self
    }

    fn start(&mut self, now: Instant) {
        let hidden = !self.idle.is_running();
        self.idle = IdleTimer::new(
            self.config.timings.idle_timeout,
            self.config.timings.idle_tick,
            now,
        );
        // A reset while the screen is hidden must not restart the countdown.
        if hidden {
            self.idle.pause();
        }
        self.present();
    }

    /// Paints the state of a fresh session onto the view.
    fn present(&mut self) {
        self.view.set_intro_visible(!self.intro_played);
        self.view.set_keyboard_visible(self.keyboard_visible);
        self.view.set_keyboard_layer(self.modifiers.layer());
        self.view.set_keyboard_input(&self.input);
        self.view.show_request(REQUEST_PLACEHOLDER);
        self.view.show_context(&ContextPane::placeholder());
        self.render_prompt();
        self.refresh_gate();
    }

    /// True when no exchange, transition or playback is still scheduled.
    fn is_settled(&self) -> bool {
        self.exchange.is_none()
            && self.highlighter.pending().is_none()
            && self.speculative_context_at.is_none()
            && self.intro.is_none()
    }

    fn next_deadline(&self) -> Option<Instant> {
        [
            self.exchange.as_ref().map(|exchange| exchange.deadline),
            self.highlighter.next_deadline(),
            self.speculative_context_at,
            self.blink.map(|blink| blink.next),
            self.idle.next_tick(),
            self.intro.as_ref().map(|intro| intro.next_at),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    // ============================================
    // Input
    // ============================================

    pub fn handle_input(&mut self, input: KioskInput, now: Instant) {
        if input.is_interaction() {
            self.idle.touch(now);
        }
        match input {
            KioskInput::Key(key) => self.on_physical_key(key, now),
            KioskInput::VirtualKey(key) => self.on_virtual_key(key, now),
            KioskInput::Paste(text) => self.on_paste(&text, now),
            KioskInput::Pointer => {}
            KioskInput::ToggleKeyboard => self.set_keyboard_visible(!self.keyboard_visible),
            KioskInput::VisibilityChanged { visible } => self.on_visibility(visible, now),
            KioskInput::DismissIntro => self.dismiss_intro(now),
            KioskInput::Reset => {
                tracing::info!("manual reset");
                self.reset(now);
            }
        }
    }

    fn on_physical_key(&mut self, key: PhysicalKey, now: Instant) {
        if !self.session.accepts_input() {
            return;
        }
        match key {
            PhysicalKey::Char(c) => self.edit(now, |input| input.push(c)),
            PhysicalKey::Backspace => self.edit(now, |input| {
                input.pop();
            }),
            PhysicalKey::Enter => self.submit(now),
            PhysicalKey::Other => {}
        }
    }

    fn on_virtual_key(&mut self, key: VirtualKey, now: Instant) {
        match key {
            VirtualKey::Shift => {
                let layer = self.modifiers.press_shift();
                self.view.set_keyboard_layer(layer);
            }
            VirtualKey::Caps => {
                let layer = self.modifiers.toggle_caps();
                self.view.set_keyboard_layer(layer);
            }
            VirtualKey::Enter => {
                self.submit(now);
                if self.modifiers.release_shift() {
                    self.view.set_keyboard_layer(self.modifiers.layer());
                }
            }
            key => {
                let used = self.modifiers.strike();
                if self.session.accepts_input() {
                    match key {
                        VirtualKey::Char(c) => self.edit(now, |input| input.push(resolve(c, used))),
                        VirtualKey::Space => self.edit(now, |input| input.push(' ')),
                        VirtualKey::Tab => self.edit(now, |input| input.push('\t')),
                        VirtualKey::Backspace => self.edit(now, |input| {
                            input.pop();
                        }),
                        _ => {}
                    }
                }
                if used != self.modifiers.layer() {
                    self.view.set_keyboard_layer(self.modifiers.layer());
                }
            }
        }
    }

    fn on_paste(&mut self, text: &str, now: Instant) {
        if text.is_empty() {
            return;
        }
        if !self.session.accepts_input() {
            tracing::warn!(
                chars = text.chars().count(),
                "input rejected while a response is pending"
            );
            return;
        }
        let cleaned: String = text
            .chars()
            .filter(|c| *c != '\r')
            .map(|c| if c == '\n' { ' ' } else { c })
            .collect();
        self.edit(now, |input| input.push_str(&cleaned));
    }

    fn edit(&mut self, now: Instant, apply: impl FnOnce(&mut String)) {
        apply(&mut self.input);
        if !self.typed_step_triggered && self.session.ready {
            self.typed_step_triggered = true;
            self.set_phase(Phase::InputStarted, now);
        }
        self.render_prompt();
        if self.keyboard_visible {
            self.view.set_keyboard_input(&self.input);
        }
    }

    fn set_keyboard_visible(&mut self, visible: bool) {
        self.keyboard_visible = visible;
        self.view.set_keyboard_visible(visible);
        if visible {
            self.view.set_keyboard_input(&self.input);
        }
        self.refresh_gate();
    }

    fn on_visibility(&mut self, visible: bool, now: Instant) {
        tracing::debug!(visible, "visibility changed");
        if visible {
            self.idle.resume(now);
        } else {
            self.idle.pause();
        }
    }

    // ============================================
    // Exchange lifecycle
    // ============================================

    /// Sends the current input if the gate is open and it is not blank.
    fn submit(&mut self, now: Instant) {
        if !self.session.accepts_input() {
            return;
        }
        let text = self.input.trim().to_string();
        if text.is_empty() {
            return;
        }
        self.flush_intro();

        self.view.print_line(LineKind::Prompt, &format!("{PROMPT_PREFIX}{text}"));
        self.view.print_line(LineKind::Spacer, SPACER);
        self.set_phase(Phase::RequestSent, now);
        self.speculative_context_at = Some(now + self.config.timings.speculative_context_delay);

        self.input.clear();
        self.view.set_keyboard_input("");
        self.set_waiting(true, now);
        self.session.ready = false;
        self.refresh_gate();

        self.send(text, now);

        if self.keyboard_visible {
            self.set_keyboard_visible(false);
        }
        self.typed_step_triggered = false;
    }

    fn send(&mut self, text: String, now: Instant) {
        self.history.push_user(text.clone());
        self.last_question = text;

        let request = self.config.chat_request(self.history.messages());
        self.view.show_request(&request_preview(&request, PREVIEW_CHAR_LIMIT));
        tracing::info!(
            messages = request.messages.len(),
            demo = self.source.is_demo(),
            "sending question"
        );

        self.exchange = Some(Exchange {
            items: open_exchange(Arc::clone(&self.source), request),
            deadline: now + self.config.timings.request_timeout,
            assistant_text: String::new(),
            streaming_started: false,
            line_open: false,
        });
    }

    fn on_exchange_item(&mut self, item: Option<ChatResult<SourceItem>>, now: Instant) {
        match item {
            Some(Ok(SourceItem::Accepted)) => {
                tracing::debug!("request accepted");
                self.set_phase(Phase::ContextRetrieved, now);
            }
            Some(Ok(SourceItem::Event(event))) => self.on_event(event, now),
            Some(Err(err)) => self.finish_exchange(Some(err), now),
            None => self.finish_exchange(None, now),
        }
    }

    fn on_event(&mut self, event: StreamEvent, now: Instant) {
        let first = match self.exchange.as_mut() {
            Some(exchange) => !std::mem::replace(&mut exchange.streaming_started, true),
            None => return,
        };
        if first {
            self.set_waiting(false, now);
            let phase = match event {
                StreamEvent::Meta { .. } => Phase::ContextRetrieved,
                _ => Phase::AnswerStreaming,
            };
            self.set_phase(phase, now);
        }

        match event {
            StreamEvent::Meta {
                hits,
                augmented_user_message,
            } => {
                tracing::debug!(hits = hits.len(), "retrieval context received");
                let pane = ContextPane::render(
                    &hits,
                    &self.last_question,
                    augmented_user_message.as_deref(),
                );
                self.view.show_context(&pane);
            }
            StreamEvent::Token(fragment) => {
                if fragment.is_empty() {
                    return;
                }
                self.set_phase(Phase::AnswerStreaming, now);
                let Some(exchange) = self.exchange.as_mut() else {
                    return;
                };
                if !exchange.line_open {
                    exchange.line_open = true;
                    self.view.start_assistant_line(ASSISTANT_PREFIX);
                }
                self.view.append_assistant_text(&fragment);
                exchange.assistant_text.push_str(&fragment);
            }
            StreamEvent::End => self.finish_exchange(None, now),
        }
    }

    /// Concludes the outstanding exchange. Runs at most once per exchange.
    fn finish_exchange(&mut self, failure: Option<ChatError>, now: Instant) {
        let Some(exchange) = self.exchange.take() else {
            return;
        };
        if exchange.line_open {
            self.view.finish_assistant_line();
        }

        match &failure {
            Some(err) => {
                tracing::warn!(
                    error = %err,
                    partial_chars = exchange.assistant_text.chars().count(),
                    "exchange failed"
                );
                self.view.print_line(LineKind::Plain, "");
                self.view.print_line(LineKind::Error, &format!("{ERROR_PREFIX}{err}"));
                self.view.show_context(&ContextPane::no_context(&self.last_question));
                self.view.print_line(LineKind::Spacer, SPACER);
            }
            None => {
                tracing::info!(chars = exchange.assistant_text.chars().count(), "exchange complete");
            }
        }

        if !exchange.assistant_text.is_empty() {
            self.history.push_assistant(exchange.assistant_text);
        }

        self.speculative_context_at = None;
        self.set_phase(Phase::None, now);
        self.session.ready = true;
        self.input.clear();
        self.set_waiting(false, now);
    }

    // ============================================
    // Timers
    // ============================================

    fn on_timers(&mut self, now: Instant) {
        if self
            .exchange
            .as_ref()
            .is_some_and(|exchange| now >= exchange.deadline)
        {
            tracing::warn!("request timed out, cancelling");
            self.finish_exchange(Some(ChatError::Timeout), now);
        }

        if let Some(phase) = self.highlighter.fire(now) {
            tracing::trace!(?phase, "deferred step applied");
            self.view.highlight(phase);
        }

        if self.speculative_context_at.is_some_and(|at| now >= at) {
            self.speculative_context_at = None;
            if self.highlighter.active() == Phase::RequestSent
                && self.highlighter.pending().is_none()
            {
                self.set_phase(Phase::ContextRetrieved, now);
            }
        }

        if let Some(blink) = self.blink.as_mut()
            && now >= blink.next
        {
            blink.next += self.config.timings.waiting_blink;
            blink.visible = !blink.visible;
            if blink.visible {
                self.view.print_line(LineKind::Notice, WAITING_NOTICE);
            }
        }

        if self.idle.next_tick().is_some_and(|at| now >= at) {
            let tick = self.idle.tick(now);
            self.view.idle_progress(tick.remaining);
            if tick.expired {
                tracing::info!("idle window elapsed, resetting kiosk");
                self.reset(now);
                return;
            }
        }

        if self.intro.as_ref().is_some_and(|intro| now >= intro.next_at) {
            self.advance_intro();
        }
    }

    // ============================================
    // Intro playback
    // ============================================

    fn dismiss_intro(&mut self, now: Instant) {
        self.view.set_intro_visible(false);
        if self.intro_played {
            return;
        }
        self.intro_played = true;
        self.view.start_assistant_line(ASSISTANT_PREFIX);
        self.intro = Some(IntroPlayback {
            chars: self.config.intro_text().chars().collect(),
            pos: 0,
            next_at: now,
        });
        self.render_prompt();
    }

    fn advance_intro(&mut self) {
        let Some(intro) = self.intro.as_mut() else {
            return;
        };
        if let Some(c) = intro.chars.get(intro.pos) {
            let mut buf = [0u8; 4];
            self.view.append_assistant_text(c.encode_utf8(&mut buf));
            intro.pos += 1;
            intro.next_at += self.config.timings.intro_char_delay;
        }
        if intro.pos >= intro.chars.len() {
            self.intro = None;
            self.view.finish_assistant_line();
            self.render_prompt();
        }
    }

    /// Writes out whatever is left of the intro at once.
    fn flush_intro(&mut self) {
        let Some(intro) = self.intro.take() else {
            return;
        };
        let rest: String = intro.chars[intro.pos.min(intro.chars.len())..].iter().collect();
        if !rest.is_empty() {
            self.view.append_assistant_text(&rest);
        }
        self.view.finish_assistant_line();
    }

    // ============================================
    // Shared transitions
    // ============================================

    fn set_phase(&mut self, phase: Phase, now: Instant) {
        if let Some(applied) = self.highlighter.request(phase, now) {
            tracing::trace!(phase = ?applied, "step applied");
            self.view.highlight(applied);
        }
    }

    fn set_waiting(&mut self, waiting: bool, now: Instant) {
        self.session.waiting = waiting;
        self.blink = waiting.then(|| WaitingBlink {
            next: now + self.config.timings.waiting_blink,
            visible: false,
        });
        self.render_prompt();
        self.refresh_gate();
    }

    fn render_prompt(&mut self) {
        let prompt = if self.intro.is_some() {
            PromptLine::Hidden
        } else if self.session.waiting {
            PromptLine::Waiting
        } else {
            PromptLine::Input(self.input.clone())
        };
        self.view.render_prompt(&prompt);
    }

    fn refresh_gate(&mut self) {
        self.view
            .set_affordances(Affordances::derive(self.session, self.keyboard_visible));
    }

    /// Back to a cold start: outstanding request cancelled, conversation and
    /// every state machine cleared, intro shown again.
    fn reset(&mut self, now: Instant) {
        self.exchange = None;
        self.history.clear();
        self.session = SessionState::default();
        self.highlighter.reset();
        self.modifiers.reset();
        self.keyboard_visible = false;
        self.input.clear();
        self.typed_step_triggered = false;
        self.last_question.clear();
        self.speculative_context_at = None;
        self.blink = None;
        self.intro = None;
        self.intro_played = false;

        self.view.reset();
        self.start(now);
    }
}

/// Connects lazily on first poll; `Accepted` marks a successful connect.
fn open_exchange(
    source: Arc<dyn ResponseSource>,
    request: ChatRequest,
) -> BoxStream<'static, ChatResult<SourceItem>> {
    stream::once(async move { source.connect(request).await })
        .flat_map(|connected| match connected {
            Ok(events) => stream::once(future::ready(Ok(SourceItem::Accepted)))
                .chain(events.map(|event| event.map(SourceItem::Event)))
                .boxed(),
            Err(err) => stream::once(future::ready(Err(err))).boxed(),
        })
        .boxed()
}

async fn next_item(exchange: &mut Option<Exchange>) -> Option<ChatResult<SourceItem>> {
    match exchange {
        Some(exchange) => exchange.items.next().await,
        None => future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => future::pending().await,
    }
}
