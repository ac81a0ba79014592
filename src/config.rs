use crate::ai::{DemoSource, LiveSource, ResponseSource};
use crate::types::{ChatMessage, ChatRequest};
use std::sync::Arc;
use std::time::Duration;

/// Bundled config for builds that ship without a `.env` file
const BUNDLED_CONFIG: &str = include_str!("../assets/config.env");

pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:8000";
pub const DEFAULT_MODEL: &str = "Apertus-8B-Instruct-2509";
pub const MAX_HISTORY_MESSAGES: usize = 200;

pub const SYSTEM_PROMPT: &str = "\
Du bist ein hilfreicher Chatbot fuer das KI-Cluster der Hochschule Bielefeld (HSBI).
Kontext: FuzzyBot_Help.Me ist eine Live-Installation (Touchscreen & Web) von Max Schweder. Sie erforscht, wie das Cluster gestalterisch genutzt werden kann, wie offene Modelle (Apertus-8B-Instruct) ressourcenschonend betrieben und mit studiengangsspezifischen Materialien angereichert werden. Das Interface macht Hintergrundprozesse sichtbar und dokumentiert technische und organisatorische Schritte fuer Training und moegliche Live-Einsaetze.
Deine Hauptaufgabe ist es, Nutzer*innen bei allen Fragen zur Arbeit auf dem Cluster zu unterstuetzen
(zum Beispiel Login, SSH, Tunneling, Slurm-Jobs und Queues, GPU-/CPU-Knoten, Speicher, Module/Software und typische Fehlermeldungen).

Antworte kurz, klar und in moeglichst einfacher Sprache.
Benutze die Sprache, die der/die Nutzer*in verwendet.
Wenn du etwas nicht sicher weisst, sag das ehrlich und schlage sinnvolle naechste Schritte vor
(z.B. einen Befehl zum Nachschauen oder eine passende Dokumentation).
Gib keine Anleitungen zu illegalen oder gefaehrlichen Handlungen und halte dich an die Regeln der HSBI.";

const INTRO_TEXT: &str = "\
FuzzyBot_Help.Me ist ein experimenteller Chatbot auf dem KI-Cluster der HSBI, der transparenter machen soll, wie Chatbots mit Zusatzwissen im Hintergrund arbeiten.
Gleichzeitig demonstriert er, wie ein Chatbot aufgebaut sein koennte, der bei der Arbeit mit dem KI-Cluster unterstuetzt.

Stelle deine Fragen mit der \u{2328} Bildschirmtastatur unten und schicke sie mit SEND ab.";

const INTRO_DEMO_NOTICE: &str =
    "\n\nDEMO MODUS: Antworten sind simuliert (keine echte LLM-Verbindung).";

/// Every delay the kiosk schedules.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Timings {
    pub min_step_hold: Duration,
    pub speculative_context_delay: Duration,
    pub idle_timeout: Duration,
    pub idle_tick: Duration,
    pub request_timeout: Duration,
    pub waiting_blink: Duration,
    pub intro_char_delay: Duration,
    pub demo_first_token_delay: Duration,
    pub demo_char_delay: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            min_step_hold: Duration::from_millis(500),
            speculative_context_delay: Duration::from_millis(600),
            idle_timeout: Duration::from_secs(300),
            idle_tick: Duration::from_millis(100),
            request_timeout: Duration::from_secs(120),
            waiting_blink: Duration::from_millis(800),
            intro_char_delay: Duration::from_millis(10),
            demo_first_token_delay: Duration::from_millis(350),
            demo_char_delay: Duration::from_millis(8),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct KioskConfig {
    pub api_base: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
    pub api_key: Option<String>,
    pub demo_mode: bool,
    pub ui_scale: f64,
    pub system_prompt: String,
    pub max_history: usize,
    pub timings: Timings,
}

impl Default for KioskConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 2056,
            temperature: 0.7,
            top_p: 0.95,
            api_key: None,
            demo_mode: false,
            ui_scale: 1.0,
            system_prompt: SYSTEM_PROMPT.to_string(),
            max_history: MAX_HISTORY_MESSAGES,
            timings: Timings::default(),
        }
    }
}

impl KioskConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            api_base: lookup("FUZZYBOT_API_BASE")
                .map(|base| base.trim().trim_end_matches('/').to_string())
                .filter(|base| !base.is_empty())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            model: lookup("FUZZYBOT_MODEL")
                .filter(|model| !model.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_tokens: parsed(&lookup, "FUZZYBOT_MAX_TOKENS").unwrap_or(defaults.max_tokens),
            temperature: parsed(&lookup, "FUZZYBOT_TEMPERATURE").unwrap_or(defaults.temperature),
            top_p: parsed(&lookup, "FUZZYBOT_TOP_P").unwrap_or(defaults.top_p),
            api_key: lookup("FUZZYBOT_API_KEY").filter(|key| !key.trim().is_empty()),
            demo_mode: lookup("FUZZYBOT_DEMO").is_some_and(|raw| is_truthy(&raw)),
            ui_scale: lookup("FUZZYBOT_SCALE")
                .map_or(defaults.ui_scale, |raw| ui_scale(&raw)),
            ..defaults
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.api_base)
    }

    /// Outbound body for the current conversation. Always streamed.
    pub fn chat_request(&self, messages: &[ChatMessage]) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: messages.to_vec(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
            stream: true,
        }
    }

    pub fn intro_text(&self) -> String {
        let mut text = INTRO_TEXT.to_string();
        if self.demo_mode {
            text.push_str(INTRO_DEMO_NOTICE);
        }
        text
    }

    /// Picks the provider once for the whole session.
    pub fn response_source(&self) -> Arc<dyn ResponseSource> {
        if self.demo_mode {
            tracing::info!("demo mode: answers are simulated");
            Arc::new(DemoSource::new(
                self.timings.demo_first_token_delay,
                self.timings.demo_char_delay,
            ))
        } else {
            tracing::info!(endpoint = %self.endpoint(), "live mode");
            Arc::new(LiveSource::new(self.endpoint(), self.api_key.clone()))
        }
    }
}

fn parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable setting");
            None
        }
    }
}

fn is_truthy(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "" | "1" | "true" | "yes" | "on"
    )
}

fn ui_scale(raw: &str) -> f64 {
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() && value > 0.0 => value.clamp(0.4, 1.5),
        _ => 1.0,
    }
}

/// Loads `.env` when present, else the bundled defaults. Variables already
/// set in the environment win.
#[cfg(not(target_arch = "wasm32"))]
pub fn load_env() {
    if dotenvy::dotenv().is_ok() {
        return;
    }
    load_bundled_config();
}

#[cfg(target_arch = "wasm32")]
pub fn load_env() {
    load_bundled_config();
}

fn load_bundled_config() {
    for (key, value) in bundled_pairs(BUNDLED_CONFIG) {
        if std::env::var(key).is_err() {
            // SAFETY: called from `main` before the tokio runtime or any other thread starts
            unsafe {
                std::env::set_var(key, value);
            }
        }
    }
}

fn bundled_pairs(source: &str) -> impl Iterator<Item = (&str, &str)> {
    source.lines().filter_map(|line| {
        let line = line.trim();
        // Skip comments and empty lines
        if line.is_empty() || line.starts_with('#') {
            return None;
        }
        let (key, value) = line.split_once('=')?;
        Some((key.trim(), value.trim()))
    })
}
