use once_cell::sync::Lazy;
use std::collections::HashMap;

/// German QWERTZ rows of the on-screen keyboard, default layer.
const DEFAULT_ROWS: [&str; 5] = [
    "^ 1 2 3 4 5 6 7 8 9 0 ß ´ {bksp}",
    "{tab} q w e r t z u i o p ü +",
    "{caps} a s d f g h j k l ö ä # {enter}",
    "{shift} < y x c v b n m , . - {shift}",
    "{space}",
];

const SHIFT_ROWS: [&str; 5] = [
    "° ! \" § $ % & / ( ) = ? ` {bksp}",
    "{tab} Q W E R T Z U I O P Ü *",
    "{caps} A S D F G H J K L Ö Ä ' {enter}",
    "{shift} > Y X C V B N M ; : _ {shift}",
    "{space}",
];

static SHIFTED: Lazy<HashMap<char, char>> = Lazy::new(|| {
    DEFAULT_ROWS
        .iter()
        .zip(SHIFT_ROWS.iter())
        .flat_map(|(plain, shifted)| plain.split_whitespace().zip(shifted.split_whitespace()))
        .filter_map(|(plain, shifted)| Some((single_char(plain)?, single_char(shifted)?)))
        .collect()
});

fn single_char(token: &str) -> Option<char> {
    let mut chars = token.chars();
    let first = chars.next()?;
    chars.next().is_none().then_some(first)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Layer {
    #[default]
    Default,
    Shift,
}

impl Layer {
    pub fn name(self) -> &'static str {
        match self {
            Layer::Default => "default",
            Layer::Shift => "shift",
        }
    }
}

/// A key of the on-screen keyboard. Character keys carry their default-layer
/// label; the shifted character is resolved through the active layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VirtualKey {
    Char(char),
    Space,
    Tab,
    Backspace,
    Enter,
    Shift,
    Caps,
}

impl VirtualKey {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "{bksp}" => Some(VirtualKey::Backspace),
            "{tab}" => Some(VirtualKey::Tab),
            "{caps}" => Some(VirtualKey::Caps),
            "{shift}" => Some(VirtualKey::Shift),
            "{enter}" => Some(VirtualKey::Enter),
            "{space}" => Some(VirtualKey::Space),
            other => single_char(other).map(VirtualKey::Char),
        }
    }

    pub fn is_modifier(self) -> bool {
        matches!(self, VirtualKey::Shift | VirtualKey::Caps)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyCap {
    pub key: VirtualKey,
    pub label: String,
}

/// Rows of key caps as they should be drawn for `layer`.
pub fn layout_rows(layer: Layer) -> Vec<Vec<KeyCap>> {
    DEFAULT_ROWS
        .iter()
        .map(|row| {
            row.split_whitespace()
                .filter_map(VirtualKey::from_token)
                .map(|key| KeyCap {
                    key,
                    label: key_label(key, layer),
                })
                .collect()
        })
        .collect()
}

fn key_label(key: VirtualKey, layer: Layer) -> String {
    match key {
        VirtualKey::Char(c) => resolve(c, layer).to_string(),
        VirtualKey::Backspace => "←".to_string(),
        VirtualKey::Enter => "SEND".to_string(),
        VirtualKey::Tab => "↹".to_string(),
        VirtualKey::Caps => "⇪".to_string(),
        VirtualKey::Shift => "⇧".to_string(),
        VirtualKey::Space => "Space".to_string(),
    }
}

/// Character produced by the key labelled `plain` on `layer`.
pub fn resolve(plain: char, layer: Layer) -> char {
    match layer {
        Layer::Default => plain,
        Layer::Shift => SHIFTED.get(&plain).copied().unwrap_or(plain),
    }
}

/// Caps lock and a momentary shift. The active layer is `caps XOR shift`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct KeyboardModifiers {
    caps_lock: bool,
    shift_held: bool,
}

impl KeyboardModifiers {
    pub fn caps_lock(&self) -> bool {
        self.caps_lock
    }

    pub fn shift_held(&self) -> bool {
        self.shift_held
    }

    pub fn layer(&self) -> Layer {
        if self.caps_lock ^ self.shift_held {
            Layer::Shift
        } else {
            Layer::Default
        }
    }

    pub fn toggle_caps(&mut self) -> Layer {
        self.caps_lock = !self.caps_lock;
        self.layer()
    }

    pub fn press_shift(&mut self) -> Layer {
        self.shift_held = true;
        self.layer()
    }

    /// Layer to use for a non-modifier keystroke. A held shift is released
    /// right after, so it affects exactly this one key.
    pub fn strike(&mut self) -> Layer {
        let used = self.layer();
        self.shift_held = false;
        used
    }

    /// Returns true when shift was held.
    pub fn release_shift(&mut self) -> bool {
        std::mem::take(&mut self.shift_held)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
