/// Raw session flags. `ready` is false while an exchange is outstanding;
/// `waiting` is true while the pending indicator is shown.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionState {
    pub ready: bool,
    pub waiting: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            ready: true,
            waiting: false,
        }
    }
}

impl SessionState {
    pub fn accepts_input(&self) -> bool {
        self.ready && !self.waiting
    }
}

/// Everything the screen derives from the readiness gate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Affordances {
    pub accepts_input: bool,
    /// Keyboard toggle styled as call to action.
    pub call_to_action: bool,
    /// Keyboard toggle hidden while a response is pending.
    pub hidden_during_stream: bool,
    pub input_blocked: bool,
}

impl Affordances {
    pub fn derive(session: SessionState, keyboard_visible: bool) -> Self {
        let accepts_input = session.accepts_input();
        Self {
            accepts_input,
            call_to_action: accepts_input && !keyboard_visible,
            hidden_during_stream: session.waiting,
            input_blocked: !accepts_input,
        }
    }
}
