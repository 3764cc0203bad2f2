//! Structured lead extraction from a finished transcript
//!
//! Best-effort: one bounded model call at session teardown. Any failure
//! returns `None`; the sink still receives the raw transcript, so
//! extraction can never block or fail a session.

use crate::conversation::{Role, Turn};
use crate::lead::Lead;
use crate::llm::{Completion, CompletionGateway, CompletionRequest, DeliveryMode};
use std::time::Duration;
use tokio::time::timeout;

const EXTRACT_PROMPT: &str = r#"Extract lead qualification data from this DSCR loan conversation.
Respond with a single JSON object and nothing else, using exactly these keys:
{"contact": {"name": string, "email": string or null, "phone": string or null},
 "loan_type": "purchase" or "cashout" or "refinance" or null,
 "geo": two-letter US state code or null,
 "budget_min": integer dollars or null,
 "budget_max": integer dollars or null,
 "timeline": string or null}
If the visitor never gave their name, respond with the single word null.

Conversation:"#;

const EXTRACT_TIMEOUT: Duration = Duration::from_secs(10);
const EXTRACT_MAX_TOKENS: u32 = 500;
const MAX_TRANSCRIPT_CHARS: usize = 8_000;

/// Extract a structured lead from the transcript.
///
/// Returns `None` when the visitor never said anything, when the model call
/// fails or times out, or when no contact name was captured.
pub async fn extract<G>(transcript: &[Turn], gateway: &G) -> Option<Lead>
where
    G: CompletionGateway + ?Sized,
{
    if !transcript.iter().any(|turn| turn.role == Role::User) {
        return None;
    }

    let prompt = format!("{EXTRACT_PROMPT}\n{}", render_transcript(transcript));

    let request = CompletionRequest {
        system: String::new(),
        turns: vec![Turn::user(prompt)],
        max_tokens: EXTRACT_MAX_TOKENS,
        mode: DeliveryMode::Atomic,
    };

    let reply = match timeout(EXTRACT_TIMEOUT, gateway.complete(&request)).await {
        Ok(Ok(Completion::Atomic(reply))) => reply,
        Ok(Ok(Completion::Stream(_))) => {
            tracing::warn!("extraction reply unexpectedly streamed; skipping");
            return None;
        }
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "lead extraction failed");
            return None;
        }
        Err(_) => {
            tracing::warn!("lead extraction timed out");
            return None;
        }
    };

    parse_lead(&reply.text)
}

fn render_transcript(transcript: &[Turn]) -> String {
    let mut rendered = String::new();
    for turn in transcript {
        let speaker = match turn.role {
            Role::User => "visitor",
            Role::Assistant => "assistant",
        };
        rendered.push_str(speaker);
        rendered.push_str(": ");
        rendered.push_str(&turn.text);
        rendered.push('\n');
    }

    // Keep the tail; contact details come up late in a conversation.
    if rendered.len() > MAX_TRANSCRIPT_CHARS {
        let target = rendered.len() - MAX_TRANSCRIPT_CHARS;
        let cut = rendered
            .char_indices()
            .map(|(i, _)| i)
            .find(|&i| i >= target)
            .unwrap_or(0);
        rendered.drain(..cut);
    }

    rendered
}

/// Parse the model's JSON output, tolerating fenced code blocks
fn parse_lead(text: &str) -> Option<Lead> {
    let trimmed = text.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix("```").unwrap_or(trimmed).trim();

    if trimmed == "null" {
        return None;
    }

    match serde_json::from_str::<Lead>(trimmed) {
        Ok(lead) if !lead.contact.name.trim().is_empty() => Some(lead),
        Ok(_) => None,
        Err(e) => {
            tracing::warn!(error = %e, "unparseable extraction output");
            None
        }
    }
}
