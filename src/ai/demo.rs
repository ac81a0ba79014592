use super::{ChatResult, EventStream, ResponseSource};
use crate::types::{ChatRequest, RetrievalHit, Role, StreamEvent};
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const DEMO_RESPONSES: [&str; 3] = [
    "DEMO: Der LLM-Server laeuft auf einem GPU-Knoten, der via Slurm-Job reserviert wird.",
    "DEMO: Fuer einen dauerhaften Dienst laeuft der Server in einer tmux-Session auf dem Login-Node, die den Slurm-Job startet.",
    "DEMO: Der Client auf der VM leitet Anfragen an den GPU-Node weiter und zeigt RAG-Kontext an.",
];

fn demo_hits() -> Vec<RetrievalHit> {
    vec![
        RetrievalHit {
            document_id: "demo-cluster-cheatsheet.pdf".to_string(),
            page: Some(2),
            text: "GPU-Nodes muessen per salloc angefordert werden; danach mit srun in den Job wechseln."
                .to_string(),
        },
        RetrievalHit {
            document_id: "demo-ops-notes.pdf".to_string(),
            page: Some(5),
            text: "tmux auf dem Login-Node haelt den Job-Start offen, auch wenn SSH getrennt wird."
                .to_string(),
        },
    ]
}

fn augmented_question(hits: &[RetrievalHit], question: &str) -> String {
    let mut lines = vec![
        "DEMO MODE: This is simulated context (no real retrieval).".to_string(),
        String::new(),
        "Use the following context if relevant:".to_string(),
        String::new(),
    ];
    for hit in hits {
        let page = hit
            .page
            .map_or_else(|| "?".to_string(), |page| page.to_string());
        lines.push(format!("[{} p.{}] {}", hit.document_id, page, hit.text));
    }
    lines.push(String::new());
    lines.push("User question:".to_string());
    lines.push(question.to_string());
    lines.join("\n")
}

/// Plays canned answers without touching the network.
pub struct DemoSource {
    next_response: AtomicUsize,
    first_token_delay: Duration,
    char_delay: Duration,
}

impl DemoSource {
    pub fn new(first_token_delay: Duration, char_delay: Duration) -> Self {
        Self {
            next_response: AtomicUsize::new(0),
            first_token_delay,
            char_delay,
        }
    }
}

#[async_trait]
impl ResponseSource for DemoSource {
    async fn connect(&self, request: ChatRequest) -> ChatResult<EventStream> {
        let index = self.next_response.fetch_add(1, Ordering::Relaxed);
        let answer = DEMO_RESPONSES[index % DEMO_RESPONSES.len()];
        let question = request
            .messages
            .iter()
            .rev()
            .find(|msg| msg.role == Role::User)
            .map(|msg| msg.content.as_str())
            .unwrap_or_default();
        tracing::info!(response = index % DEMO_RESPONSES.len(), "playing demo answer");

        let hits = demo_hits();
        let mut script: VecDeque<(Duration, StreamEvent)> = VecDeque::new();
        script.push_back((
            Duration::ZERO,
            StreamEvent::Meta {
                augmented_user_message: Some(augmented_question(&hits, question)),
                hits,
            },
        ));
        for (pos, ch) in answer.chars().enumerate() {
            let delay = if pos == 0 {
                self.first_token_delay
            } else {
                self.char_delay
            };
            script.push_back((delay, StreamEvent::Token(ch.to_string())));
        }
        script.push_back((Duration::ZERO, StreamEvent::End));

        let events = stream::unfold(script, |mut script| async move {
            let (delay, event) = script.pop_front()?;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Some((Ok(event), script))
        });
        Ok(events.boxed())
    }

    fn is_demo(&self) -> bool {
        true
    }
}
