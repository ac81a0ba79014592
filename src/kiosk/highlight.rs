use std::time::Duration;
use tokio::time::Instant;

/// Pipeline stage currently highlighted for the visitor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    None,
    InputStarted,
    RequestSent,
    ContextRetrieved,
    AnswerStreaming,
}

/// Screen pane tied to a phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pane {
    Request,
    Context,
    Chat,
}

impl Phase {
    pub fn step(self) -> Option<u8> {
        match self {
            Phase::None => None,
            Phase::InputStarted => Some(1),
            Phase::RequestSent => Some(2),
            Phase::ContextRetrieved => Some(3),
            Phase::AnswerStreaming => Some(4),
        }
    }

    pub fn pane(self) -> Option<Pane> {
        match self {
            Phase::RequestSent => Some(Pane::Request),
            Phase::ContextRetrieved => Some(Pane::Context),
            Phase::AnswerStreaming => Some(Pane::Chat),
            Phase::None | Phase::InputStarted => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct PendingPhase {
    phase: Phase,
    due: Instant,
}

/// Keeps each applied phase on screen for at least `min_hold`.
///
/// A request arriving inside the hold window is parked in a single pending
/// slot; a later request replaces it. The caller polls [`Self::fire`] at
/// [`Self::next_deadline`].
#[derive(Clone, Debug)]
pub struct StepHighlighter {
    min_hold: Duration,
    active: Phase,
    last_switch: Option<Instant>,
    pending: Option<PendingPhase>,
}

impl StepHighlighter {
    pub fn new(min_hold: Duration) -> Self {
        Self {
            min_hold,
            active: Phase::None,
            last_switch: None,
            pending: None,
        }
    }

    pub fn active(&self) -> Phase {
        self.active
    }

    pub fn pending(&self) -> Option<Phase> {
        self.pending.map(|pending| pending.phase)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.map(|pending| pending.due)
    }

    /// Returns the phase if it was applied right away.
    pub fn request(&mut self, phase: Phase, now: Instant) -> Option<Phase> {
        if phase == self.active {
            return None;
        }
        self.pending = None;

        let due = match self.last_switch {
            Some(last) => last + self.min_hold,
            None => now,
        };
        if now >= due {
            Some(self.apply(phase, now))
        } else {
            self.pending = Some(PendingPhase { phase, due });
            None
        }
    }

    /// Applies the pending phase once its hold window has passed.
    pub fn fire(&mut self, now: Instant) -> Option<Phase> {
        match self.pending {
            Some(pending) if now >= pending.due => {
                self.pending = None;
                Some(self.apply(pending.phase, now))
            }
            _ => None,
        }
    }

    pub fn reset(&mut self) {
        self.active = Phase::None;
        self.last_switch = None;
        self.pending = None;
    }

    fn apply(&mut self, phase: Phase, now: Instant) -> Phase {
        self.active = phase;
        self.last_switch = Some(now);
        phase
    }
}
