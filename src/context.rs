//! Text for the two auxiliary panes: the outgoing request preview and the
//! retrieval context that grounded the answer.

use crate::types::{ChatRequest, RetrievalHit};

pub const PREVIEW_CHAR_LIMIT: usize = 60_000;
pub const TRUNCATION_MARKER: &str = "// ... truncated for preview ...";
pub const REQUEST_PLACEHOLDER: &str =
    "// Vorschau der gesendeten Anfrage erscheint hier, sobald du die erste Nachricht schickst.";
const CONTEXT_PLACEHOLDER: &str =
    "// Abgerufener RAG-Kontext (Top-k Abschnitte + Nutzerfrage) wird hier angezeigt.";
const NO_CONTEXT: &str = "// Kein RAG-Kontext fuer diese Anfrage genutzt.";

const STOPWORDS: &[&str] = &[
    "der", "die", "das", "und", "ein", "eine", "mit", "auf", "im", "in", "von", "the", "and",
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    pub highlighted: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContextLine {
    pub segments: Vec<Segment>,
}

impl ContextLine {
    fn plain(text: impl Into<String>) -> Self {
        let text = text.into();
        if text.is_empty() {
            return Self::default();
        }
        Self {
            segments: vec![Segment {
                text,
                highlighted: false,
            }],
        }
    }

    pub fn text(&self) -> String {
        self.segments.iter().map(|seg| seg.text.as_str()).collect()
    }
}

/// Rendered content of the retrieval-context pane.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContextPane {
    pub lines: Vec<ContextLine>,
}

impl ContextPane {
    pub fn placeholder() -> Self {
        Self {
            lines: vec![ContextLine::plain(CONTEXT_PLACEHOLDER)],
        }
    }

    /// The pane shown when an exchange failed or the server used no context.
    pub fn no_context(question: &str) -> Self {
        Self::render(&[], question, None)
    }

    pub fn render(hits: &[RetrievalHit], question: &str, augmented: Option<&str>) -> Self {
        let tokens = query_tokens(question);
        let mut lines = vec![
            ContextLine::plain("// RAG-ergaenzte Nutzerfrage, die fuer diese Antwort verwendet wird:"),
            ContextLine::default(),
            ContextLine::plain(
                "Benutze den folgenden Kontext, wenn er relevant fuer die Nutzer*innenfrage ist:",
            ),
            ContextLine::default(),
        ];

        if hits.is_empty() {
            lines.push(ContextLine::plain(NO_CONTEXT));
        } else {
            for (idx, hit) in hits.iter().enumerate() {
                let page = hit
                    .page
                    .map_or_else(|| "?".to_string(), |page| page.to_string());
                lines.push(ContextLine::plain(format!(
                    "#{} [{} p.{}]",
                    idx + 1,
                    hit.document_id,
                    page
                )));
                let body = truncate_head(&hit.text, PREVIEW_CHAR_LIMIT);
                lines.push(ContextLine {
                    segments: highlight_segments(&body, &tokens),
                });
                lines.push(ContextLine::default());
            }
        }

        lines.push(ContextLine::default());
        lines.push(ContextLine::plain("Nutzerfrage:"));
        lines.push(ContextLine::plain(question));
        if let Some(augmented) = augmented.filter(|text| !text.is_empty()) {
            lines.push(ContextLine::default());
            lines.push(ContextLine::plain("RAG-augmentierte Nutzerfrage:"));
            lines.push(ContextLine::plain(truncate_head(augmented, PREVIEW_CHAR_LIMIT)));
        }

        let mut pane = Self { lines };
        if pane.text().chars().count() > PREVIEW_CHAR_LIMIT {
            pane.lines.push(ContextLine::plain(TRUNCATION_MARKER));
        }
        pane
    }

    pub fn text(&self) -> String {
        self.lines
            .iter()
            .map(ContextLine::text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Search terms of a question: lowercase alphanumeric runs of at least three
/// characters, stopwords removed, first occurrence kept.
pub fn query_tokens(question: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    for raw in question.split(|c: char| !c.is_alphanumeric()) {
        let token = raw.to_lowercase();
        if token.chars().count() < 3 || STOPWORDS.contains(&token.as_str()) {
            continue;
        }
        if !tokens.contains(&token) {
            tokens.push(token);
        }
    }
    tokens
}

/// Splits `text` into plain and highlighted runs. Matching is
/// case-insensitive; overlapping matches are merged.
pub fn highlight_segments(text: &str, tokens: &[String]) -> Vec<Segment> {
    let chars: Vec<char> = text.chars().collect();
    let folded: Vec<char> = chars
        .iter()
        .map(|c| c.to_lowercase().next().unwrap_or(*c))
        .collect();

    let mut ranges: Vec<(usize, usize)> = Vec::new();
    for token in tokens {
        let needle: Vec<char> = token.chars().collect();
        if needle.is_empty() {
            continue;
        }
        let mut start = 0;
        while start + needle.len() <= folded.len() {
            if folded[start..start + needle.len()] == needle[..] {
                ranges.push((start, start + needle.len()));
                start += needle.len();
            } else {
                start += 1;
            }
        }
    }
    ranges.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));

    let mut merged: Vec<(usize, usize)> = Vec::with_capacity(ranges.len());
    for (start, end) in ranges {
        match merged.last_mut() {
            Some(last) if start <= last.1 => last.1 = last.1.max(end),
            _ => merged.push((start, end)),
        }
    }

    let mut segments = Vec::with_capacity(merged.len() * 2 + 1);
    let mut cursor = 0;
    for (start, end) in merged {
        if cursor < start {
            segments.push(Segment {
                text: chars[cursor..start].iter().collect(),
                highlighted: false,
            });
        }
        segments.push(Segment {
            text: chars[start..end].iter().collect(),
            highlighted: true,
        });
        cursor = end;
    }
    if cursor < chars.len() {
        segments.push(Segment {
            text: chars[cursor..].iter().collect(),
            highlighted: false,
        });
    }
    segments
}

/// Keeps the first `limit` characters.
pub fn truncate_head(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}\n{}", &text[..cut], TRUNCATION_MARKER),
        None => text.to_string(),
    }
}

/// Pretty JSON of the outgoing body. Oversized previews keep the tail.
pub fn request_preview(request: &ChatRequest, limit: usize) -> String {
    let text = serde_json::to_string_pretty(request)
        .unwrap_or_else(|err| format!("// request could not be rendered: {err}"));
    let total = text.chars().count();
    if total <= limit {
        return text;
    }
    let cut = text
        .char_indices()
        .nth(total - limit)
        .map_or(0, |(idx, _)| idx);
    format!("{}\n{}", TRUNCATION_MARKER, &text[cut..])
}
