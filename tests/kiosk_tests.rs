mod common;

use common::{RecordingView, Script, ScriptedSource, hit, meta, token, typed};
use futures::channel::mpsc;
use futures::stream;
use fuzzybot::ai::{ChatError, DemoSource};
use fuzzybot::kiosk::{Kiosk, KioskInput, Layer, Phase, VirtualKey};
use fuzzybot::types::{Role, StreamEvent};
use fuzzybot::view::LineKind;
use fuzzybot::KioskConfig;
use std::time::Duration;
use tokio::time::Instant;

const QUESTION: &str = "Wie starte ich einen Job?";

#[tokio::test(start_paused = true)]
async fn streams_answer_into_one_assistant_line() {
    let source = ScriptedSource::new([Script::Events(vec![
        meta(vec![hit("slurm.pdf", Some(3), "Einen Job startest du mit salloc.")]),
        token("Du"),
        token(" nutzt"),
        token(" salloc."),
        Ok(StreamEvent::End),
    ])]);
    let (view, recorded) = RecordingView::new();
    let started = Instant::now();

    let kiosk = Kiosk::new(KioskConfig::default(), source.clone(), view)
        .run(stream::iter(typed(QUESTION)))
        .await;

    let requests = source.requests();
    assert_eq!(requests.len(), 1);
    let roles: Vec<Role> = requests[0].messages.iter().map(|msg| msg.role).collect();
    assert_eq!(roles, [Role::System, Role::User]);
    assert_eq!(requests[0].messages[1].content, QUESTION);
    assert!(requests[0].stream);

    let recorded = recorded.borrow();
    assert_eq!(
        recorded.texts(LineKind::Prompt),
        ["[guest@usr000 ~]$ Wie starte ich einen Job?"]
    );
    assert_eq!(recorded.texts(LineKind::Model), ["[FuzzyBot ~] Du nutzt salloc."]);
    assert!(recorded.texts(LineKind::Error).is_empty());
    assert!(recorded.context_text().contains("#1 [slurm.pdf p.3]"));
    assert!(recorded.requests.last().unwrap().contains(QUESTION));

    assert_eq!(kiosk.history().len(), 3);
    assert_eq!(kiosk.history().messages()[2].content, "Du nutzt salloc.");
    assert!(kiosk.session().accepts_input());

    // The final step change still honours the dwell of the first one.
    assert_eq!(recorded.phases.last(), Some(&Phase::None));
    assert!(started.elapsed() >= Duration::from_millis(500));
}

#[tokio::test(start_paused = true)]
async fn server_error_shows_one_error_line_and_reopens_gate() {
    let source = ScriptedSource::new([Script::Reject(ChatError::Status {
        status: 500,
        body: "boom".into(),
    })]);
    let (view, recorded) = RecordingView::new();

    let kiosk = Kiosk::new(KioskConfig::default(), source, view)
        .run(stream::iter(typed(QUESTION)))
        .await;

    let recorded = recorded.borrow();
    assert_eq!(recorded.texts(LineKind::Error), ["FEHLER> 500 boom"]);
    assert!(recorded.texts(LineKind::Model).is_empty());
    assert!(recorded.context_text().contains("Kein RAG-Kontext"));
    assert!(recorded.affordances.last().unwrap().accepts_input);
    assert!(kiosk.session().ready);
    assert_eq!(kiosk.history().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn stalled_stream_times_out_with_distinct_message() {
    let source = ScriptedSource::new([Script::Stall(Vec::new())]);
    let (view, recorded) = RecordingView::new();
    let started = Instant::now();

    let kiosk = Kiosk::new(KioskConfig::default(), source, view)
        .run(stream::iter(typed(QUESTION)))
        .await;

    assert!(started.elapsed() >= Duration::from_secs(120));
    let recorded = recorded.borrow();
    assert_eq!(
        recorded.texts(LineKind::Error),
        ["FEHLER> Zeitüberschreitung bei der Anfrage."]
    );
    assert!(!recorded.texts(LineKind::Notice).is_empty());
    assert!(kiosk.session().accepts_input());
}

#[tokio::test(start_paused = true)]
async fn partial_answer_survives_transport_failure() {
    let source = ScriptedSource::new([Script::Events(vec![
        token("Teil"),
        Err(ChatError::Transport("connection reset".into())),
    ])]);
    let (view, recorded) = RecordingView::new();

    let kiosk = Kiosk::new(KioskConfig::default(), source, view)
        .run(stream::iter(typed(QUESTION)))
        .await;

    let recorded = recorded.borrow();
    assert_eq!(recorded.texts(LineKind::Model), ["[FuzzyBot ~] Teil"]);
    assert_eq!(recorded.texts(LineKind::Error), ["FEHLER> connection reset"]);
    assert_eq!(kiosk.history().len(), 3);
    assert_eq!(kiosk.history().messages()[2].role, Role::Assistant);
    assert_eq!(kiosk.history().messages()[2].content, "Teil");
}

#[tokio::test(start_paused = true)]
async fn tokens_never_clear_the_context_pane() {
    let source = ScriptedSource::new([Script::Events(vec![
        meta(vec![hit("a.pdf", None, "Kontext")]),
        token("x"),
        token("y"),
        Ok(StreamEvent::End),
    ])]);
    let (view, recorded) = RecordingView::new();

    Kiosk::new(KioskConfig::default(), source, view)
        .run(stream::iter(typed(QUESTION)))
        .await;

    let recorded = recorded.borrow();
    // Placeholder at start, then the retrieval context.
    assert_eq!(recorded.contexts.len(), 2);
    assert!(recorded.context_text().contains("#1 [a.pdf p.?]"));
}

#[tokio::test(start_paused = true)]
async fn second_question_is_rejected_while_one_is_outstanding() {
    let source = ScriptedSource::new([Script::Stall(vec![token("warte")])]);
    let (view, recorded) = RecordingView::new();
    let inputs: Vec<KioskInput> = typed("eins").into_iter().chain(typed("zwei")).collect();

    let kiosk = Kiosk::new(KioskConfig::default(), source.clone(), view)
        .run(stream::iter(inputs))
        .await;

    assert_eq!(source.requests().len(), 1);
    assert_eq!(recorded.borrow().texts(LineKind::Prompt).len(), 1);
    assert_eq!(kiosk.input(), "");
    assert_eq!(kiosk.history().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn follow_up_question_carries_history() {
    let source = ScriptedSource::new([
        Script::Events(vec![token("Antwort eins"), Ok(StreamEvent::End)]),
        Script::Events(vec![token("Antwort zwei"), Ok(StreamEvent::End)]),
    ]);
    let (view, _recorded) = RecordingView::new();
    let (tx, rx) = mpsc::unbounded();

    let driver = async move {
        for input in typed("eins") {
            tx.unbounded_send(input).unwrap();
        }
        tokio::time::sleep(Duration::from_secs(2)).await;
        for input in typed("zwei") {
            tx.unbounded_send(input).unwrap();
        }
    };
    let (kiosk, ()) = tokio::join!(
        Kiosk::new(KioskConfig::default(), source.clone(), view).run(rx),
        driver
    );

    let requests = source.requests();
    assert_eq!(requests.len(), 2);
    let contents: Vec<&str> = requests[1]
        .messages
        .iter()
        .map(|msg| msg.content.as_str())
        .skip(1)
        .collect();
    assert_eq!(contents, ["eins", "Antwort eins", "zwei"]);
    assert_eq!(kiosk.history().len(), 5);
}

#[tokio::test(start_paused = true)]
async fn idle_window_resets_exactly_once() {
    let source = ScriptedSource::empty();
    let (view, recorded) = RecordingView::new();
    let (_tx, rx) = mpsc::unbounded::<KioskInput>();

    let run = Kiosk::new(KioskConfig::default(), source, view).run(rx);
    assert!(tokio::time::timeout(Duration::from_secs(301), run).await.is_err());

    assert_eq!(recorded.borrow().resets, 1);
}

#[tokio::test(start_paused = true)]
async fn interaction_postpones_idle_reset() {
    let source = ScriptedSource::empty();
    let (view, recorded) = RecordingView::new();
    let (tx, rx) = mpsc::unbounded();

    let run = Kiosk::new(KioskConfig::default(), source, view).run(rx);
    let driver = async move {
        tokio::time::sleep(Duration::from_secs(200)).await;
        tx.unbounded_send(KioskInput::Pointer).unwrap();
        tx
    };
    let (outcome, _tx) = tokio::join!(tokio::time::timeout(Duration::from_secs(450), run), driver);

    assert!(outcome.is_err());
    assert_eq!(recorded.borrow().resets, 0);
}

#[tokio::test(start_paused = true)]
async fn hidden_screen_pauses_idle_countdown() {
    let source = ScriptedSource::empty();
    let (view, recorded) = RecordingView::new();
    let (tx, rx) = mpsc::unbounded();
    tx.unbounded_send(KioskInput::VisibilityChanged { visible: false })
        .unwrap();

    let run = Kiosk::new(KioskConfig::default(), source, view).run(rx);
    let probe = recorded.clone();
    let driver = async move {
        tokio::time::sleep(Duration::from_secs(400)).await;
        let resets_while_hidden = probe.borrow().resets;
        tx.unbounded_send(KioskInput::VisibilityChanged { visible: true })
            .unwrap();
        (tx, resets_while_hidden)
    };
    let (outcome, (_tx, resets_while_hidden)) =
        tokio::join!(tokio::time::timeout(Duration::from_secs(701), run), driver);

    assert!(outcome.is_err());
    assert_eq!(resets_while_hidden, 0);
    assert_eq!(recorded.borrow().resets, 1);
}

#[tokio::test(start_paused = true)]
async fn reset_while_hidden_keeps_idle_countdown_paused() {
    let source = ScriptedSource::empty();
    let (view, recorded) = RecordingView::new();
    let (tx, rx) = mpsc::unbounded();
    tx.unbounded_send(KioskInput::VisibilityChanged { visible: false })
        .unwrap();
    tx.unbounded_send(KioskInput::Reset).unwrap();

    let run = Kiosk::new(KioskConfig::default(), source, view).run(rx);
    assert!(tokio::time::timeout(Duration::from_secs(700), run).await.is_err());

    // Only the manual reset; the idle window never ran out while hidden.
    assert_eq!(recorded.borrow().resets, 1);
}

#[tokio::test(start_paused = true)]
async fn early_token_wins_over_speculative_context_step() {
    let source = ScriptedSource::new([Script::Stall(vec![token("Du")])]);
    let (view, recorded) = RecordingView::new();
    let (tx, rx) = mpsc::unbounded();
    for input in typed(QUESTION) {
        tx.unbounded_send(input).unwrap();
    }

    let run = Kiosk::new(KioskConfig::default(), source, view).run(rx);
    assert!(tokio::time::timeout(Duration::from_secs(2), run).await.is_err());

    let phases = recorded.borrow().phases.clone();
    let streaming = phases
        .iter()
        .position(|phase| *phase == Phase::AnswerStreaming)
        .expect("answer step applied");
    assert!(!phases[streaming..].contains(&Phase::ContextRetrieved));
    assert_eq!(phases.last(), Some(&Phase::AnswerStreaming));
    drop(tx);
}

#[tokio::test(start_paused = true)]
async fn manual_reset_clears_conversation() {
    let source = ScriptedSource::new([Script::Events(vec![token("ok"), Ok(StreamEvent::End)])]);
    let (view, recorded) = RecordingView::new();
    let (tx, rx) = mpsc::unbounded();

    let driver = async move {
        for input in typed(QUESTION) {
            tx.unbounded_send(input).unwrap();
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
        tx.unbounded_send(KioskInput::Reset).unwrap();
    };
    let (kiosk, ()) = tokio::join!(
        Kiosk::new(KioskConfig::default(), source, view).run(rx),
        driver
    );

    let recorded = recorded.borrow();
    assert_eq!(recorded.resets, 1);
    assert!(recorded.transcript.is_empty());
    assert_eq!(kiosk.history().len(), 1);
    assert_eq!(kiosk.active_phase(), Phase::None);
}

#[tokio::test(start_paused = true)]
async fn virtual_shift_applies_to_one_letter() {
    let source = ScriptedSource::new([Script::Events(vec![Ok(StreamEvent::End)])]);
    let (view, recorded) = RecordingView::new();
    let inputs = [
        KioskInput::ToggleKeyboard,
        KioskInput::VirtualKey(VirtualKey::Shift),
        KioskInput::VirtualKey(VirtualKey::Char('w')),
        KioskInput::VirtualKey(VirtualKey::Char('i')),
        KioskInput::VirtualKey(VirtualKey::Char('e')),
        KioskInput::VirtualKey(VirtualKey::Enter),
    ];

    Kiosk::new(KioskConfig::default(), source.clone(), view)
        .run(stream::iter(inputs))
        .await;

    assert_eq!(source.requests()[0].messages[1].content, "Wie");
    let recorded = recorded.borrow();
    assert_eq!(
        recorded.layers,
        [Layer::Default, Layer::Shift, Layer::Default]
    );
    assert_eq!(recorded.keyboard_visible.last(), Some(&false));
    assert_eq!(recorded.keyboard_input, "");
}

#[tokio::test(start_paused = true)]
async fn demo_source_drives_the_same_session() {
    let config = KioskConfig {
        demo_mode: true,
        ..KioskConfig::default()
    };
    let source = std::sync::Arc::new(DemoSource::new(
        Duration::from_millis(350),
        Duration::from_millis(8),
    ));
    let (view, recorded) = RecordingView::new();

    let kiosk = Kiosk::new(config, source, view)
        .run(stream::iter(typed("Hallo")))
        .await;

    let recorded = recorded.borrow();
    let model = recorded.texts(LineKind::Model);
    assert_eq!(model.len(), 1);
    assert!(model[0].starts_with("[FuzzyBot ~] DEMO: Der LLM-Server"));
    assert!(recorded.context_text().contains("demo-cluster-cheatsheet.pdf"));
    assert_eq!(
        recorded.phases,
        [Phase::InputStarted, Phase::AnswerStreaming, Phase::None]
    );
    assert_eq!(kiosk.history().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn intro_plays_once_and_submit_flushes_it() {
    let source = ScriptedSource::new([Script::Events(vec![Ok(StreamEvent::End)])]);
    let (view, recorded) = RecordingView::new();
    let inputs: Vec<KioskInput> = [KioskInput::DismissIntro, KioskInput::DismissIntro]
        .into_iter()
        .chain(typed("hi"))
        .collect();

    Kiosk::new(KioskConfig::default(), source, view)
        .run(stream::iter(inputs))
        .await;

    let recorded = recorded.borrow();
    let model = recorded.texts(LineKind::Model);
    assert_eq!(model.len(), 1);
    assert!(model[0].starts_with("[FuzzyBot ~] FuzzyBot_Help.Me ist"));
    assert!(model[0].ends_with("mit SEND ab."));
    let prompt_pos = recorded
        .transcript
        .lines()
        .position(|line| line.kind == LineKind::Prompt);
    let model_pos = recorded
        .transcript
        .lines()
        .position(|line| line.kind == LineKind::Model);
    assert!(model_pos < prompt_pos);
}
