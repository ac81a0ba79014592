use crate::config::KioskConfig;
use crate::context::ContextPane;
use crate::kiosk::{
    Affordances, Kiosk, KioskInput, Layer, Pane, Phase, PhysicalKey, SessionState, layout_rows,
};
use crate::view::{KioskView, LineKind, PromptLine, Transcript};
use dioxus::prelude::*;

const KIOSK_CSS: Asset = asset!("/assets/kiosk.css");

const STEPS: [(Phase, &str); 4] = [
    (Phase::InputStarted, "1 Frage eingeben"),
    (Phase::RequestSent, "2 Anfrage an das Modell"),
    (Phase::ContextRetrieved, "3 Kontext aus Dokumenten"),
    (Phase::AnswerStreaming, "4 Antwort wird erzeugt"),
];

const VISIBILITY_JS: &str = r#"
document.addEventListener("visibilitychange", () => dioxus.send(!document.hidden));
"#;

/// Signals the kiosk session paints into.
#[derive(Clone, Copy, PartialEq)]
struct Screen {
    transcript: Signal<Transcript>,
    prompt: Signal<PromptLine>,
    request: Signal<String>,
    context: Signal<ContextPane>,
    phase: Signal<Phase>,
    affordances: Signal<Affordances>,
    keyboard_visible: Signal<bool>,
    layer: Signal<Layer>,
    keyboard_input: Signal<String>,
    intro_visible: Signal<bool>,
    idle_remaining: Signal<f32>,
}

fn use_screen() -> Screen {
    Screen {
        transcript: use_signal(Transcript::default),
        prompt: use_signal(|| PromptLine::Input(String::new())),
        request: use_signal(String::new),
        context: use_signal(ContextPane::placeholder),
        phase: use_signal(|| Phase::None),
        affordances: use_signal(|| Affordances::derive(SessionState::default(), false)),
        keyboard_visible: use_signal(|| false),
        layer: use_signal(|| Layer::Default),
        keyboard_input: use_signal(String::new),
        intro_visible: use_signal(|| true),
        idle_remaining: use_signal(|| 1.0),
    }
}

struct SignalView(Screen);

impl KioskView for SignalView {
    fn print_line(&mut self, kind: LineKind, text: &str) {
        self.0.transcript.write().push(kind, text);
    }

    fn start_assistant_line(&mut self, prefix: &str) {
        self.0.transcript.write().start_model_line(prefix);
    }

    fn append_assistant_text(&mut self, text: &str) {
        self.0.transcript.write().append_model_text(text);
    }

    fn finish_assistant_line(&mut self) {
        self.0.transcript.write().finish_model_line();
    }

    fn render_prompt(&mut self, prompt: &PromptLine) {
        self.0.prompt.set(prompt.clone());
    }

    fn show_request(&mut self, preview: &str) {
        self.0.request.set(preview.to_string());
    }

    fn show_context(&mut self, pane: &ContextPane) {
        self.0.context.set(pane.clone());
    }

    fn reset(&mut self) {
        self.0.transcript.write().clear();
        self.0.phase.set(Phase::None);
        self.0.idle_remaining.set(1.0);
    }

    fn highlight(&mut self, phase: Phase) {
        self.0.phase.set(phase);
    }

    fn set_affordances(&mut self, affordances: Affordances) {
        self.0.affordances.set(affordances);
    }

    fn set_keyboard_visible(&mut self, visible: bool) {
        self.0.keyboard_visible.set(visible);
    }

    fn set_keyboard_layer(&mut self, layer: Layer) {
        self.0.layer.set(layer);
    }

    fn set_keyboard_input(&mut self, input: &str) {
        self.0.keyboard_input.set(input.to_string());
    }

    fn set_intro_visible(&mut self, visible: bool) {
        self.0.intro_visible.set(visible);
    }

    fn idle_progress(&mut self, remaining: f32) {
        self.0.idle_remaining.set(remaining);
    }
}

#[component]
pub fn App() -> Element {
    let config = use_hook(KioskConfig::from_env);
    let screen = use_screen();
    let scale = config.ui_scale;

    let kiosk = use_coroutine(move |inputs: UnboundedReceiver<KioskInput>| {
        let config = config.clone();
        async move {
            let source = config.response_source();
            Kiosk::new(config, source, SignalView(screen)).run(inputs).await;
        }
    });
    use_visibility_listener(kiosk);

    let root_style = format!(":root {{ --ui-scale: {scale}; }}");
    let idle_percent = (screen.idle_remaining)() * 100.0;

    rsx! {
        document::Link { rel: "stylesheet", href: KIOSK_CSS }
        style { dangerous_inner_html: "{root_style}" }
        div { class: "kiosk",
            onpointerdown: move |_| kiosk.send(KioskInput::Pointer),
            StepList { phase: (screen.phase)() }
            div { class: "panes",
                RequestPane { phase: (screen.phase)(), preview: (screen.request)() }
                ContextPaneView { phase: (screen.phase)(), pane: (screen.context)() }
            }
            Terminal { screen, kiosk }
            KeyboardDock { screen, kiosk }
            div { class: "kiosk-footer",
                button {
                    class: "reset-btn", r#type: "button",
                    onclick: move |_| kiosk.send(KioskInput::Reset),
                    "Neu starten"
                }
                div { class: "idle-bar",
                    div {
                        class: "idle-bar-fill",
                        style: "width: {idle_percent:.1}%;",
                    }
                }
            }
            if (screen.intro_visible)() {
                IntroOverlay { kiosk }
            }
        }
    }
}

fn use_visibility_listener(kiosk: Coroutine<KioskInput>) {
    use_future(move || async move {
        let mut eval = document::eval(VISIBILITY_JS);
        while let Ok(visible) = eval.recv::<bool>().await {
            kiosk.send(KioskInput::VisibilityChanged { visible });
        }
    });
}

fn pane_class(base: &str, pane: Pane, phase: Phase) -> String {
    if phase.pane() == Some(pane) {
        format!("{base} highlight-panel")
    } else {
        base.to_string()
    }
}

fn line_class(kind: LineKind) -> &'static str {
    match kind {
        LineKind::Plain => "line",
        LineKind::Prompt => "line prompt-line",
        LineKind::Model => "line model-line",
        LineKind::Error => "line error-line",
        LineKind::Notice => "line notice-line",
        LineKind::Spacer => "line spacer-line",
    }
}

fn physical_key(data: &KeyboardData) -> PhysicalKey {
    let modifiers = data.modifiers();
    match data.key() {
        Key::Enter => PhysicalKey::Enter,
        Key::Backspace => PhysicalKey::Backspace,
        Key::Character(text) if !modifiers.ctrl() && !modifiers.meta() && !modifiers.alt() => {
            let mut chars = text.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => PhysicalKey::Char(c),
                _ => PhysicalKey::Other,
            }
        }
        _ => PhysicalKey::Other,
    }
}

#[component]
fn StepList(phase: Phase) -> Element {
    rsx! {
        ol { class: "steps",
            for (step, label) in STEPS {
                li {
                    class: if step == phase { "step highlight-step" } else { "step" },
                    "{label}"
                }
            }
        }
    }
}

#[component]
fn RequestPane(phase: Phase, preview: String) -> Element {
    rsx! {
        div { class: pane_class("pane request-pane", Pane::Request, phase),
            pre { "{preview}" }
        }
    }
}

#[component]
fn ContextPaneView(phase: Phase, pane: ContextPane) -> Element {
    rsx! {
        div { class: pane_class("pane context-pane", Pane::Context, phase),
            for line in pane.lines {
                div { class: "ctx-line",
                    for segment in line.segments {
                        if segment.highlighted {
                            mark { "{segment.text}" }
                        } else {
                            span { "{segment.text}" }
                        }
                    }
                }
            }
        }
    }
}

#[component]
fn Terminal(screen: Screen, kiosk: Coroutine<KioskInput>) -> Element {
    let phase = (screen.phase)();
    let affordances = (screen.affordances)();
    let prompt = (screen.prompt)();
    let prompt_class = match prompt {
        PromptLine::Waiting => "prompt waiting",
        PromptLine::Hidden => "prompt is-hidden",
        PromptLine::Input(_) if affordances.input_blocked => "prompt input-blocked",
        PromptLine::Input(_) => "prompt",
    };
    let transcript = screen.transcript.read();

    rsx! {
        div {
            class: pane_class("pane terminal", Pane::Chat, phase),
            tabindex: "0",
            onkeydown: move |ev| {
                let key = physical_key(&ev);
                if key != PhysicalKey::Other {
                    ev.prevent_default();
                }
                kiosk.send(KioskInput::Key(key));
            },
            for line in transcript.lines() {
                div { class: line_class(line.kind), "{line.text}" }
            }
            div { class: prompt_class, "{prompt.text()}" }
        }
    }
}

#[component]
fn KeyboardDock(screen: Screen, kiosk: Coroutine<KioskInput>) -> Element {
    let affordances = (screen.affordances)();
    let toggle_class = match (affordances.hidden_during_stream, affordances.call_to_action) {
        (true, _) => "kb-toggle hidden-during-stream",
        (false, true) => "kb-toggle chat-cta",
        (false, false) => "kb-toggle",
    };
    let rows = layout_rows((screen.layer)());

    rsx! {
        button {
            class: toggle_class, r#type: "button",
            onclick: move |_| kiosk.send(KioskInput::ToggleKeyboard),
            "\u{2328}"
        }
        if (screen.keyboard_visible)() {
            div { class: "keyboard",
                div { class: "kb-input", "{screen.keyboard_input}" }
                for row in rows {
                    div { class: "kb-row",
                        for (key, label) in row.into_iter().map(|cap| (cap.key, cap.label)) {
                            button {
                                class: if key.is_modifier() { "kb-key kb-modifier" } else { "kb-key" },
                                r#type: "button",
                                onclick: move |_| kiosk.send(KioskInput::VirtualKey(key)),
                                "{label}"
                            }
                        }
                    }
                }
            }
        }
    }
}

#[component]
fn IntroOverlay(kiosk: Coroutine<KioskInput>) -> Element {
    rsx! {
        div { class: "intro-overlay",
            div { class: "intro-card",
                h1 { "FuzzyBot_Help.Me" }
                p { "Ein Chatbot fuer das KI-Cluster der HSBI." }
                button {
                    class: "intro-start", r#type: "button",
                    onclick: move |_| kiosk.send(KioskInput::DismissIntro),
                    "Start"
                }
            }
        }
    }
}
