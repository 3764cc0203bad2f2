//! API request/response types

use crate::conversation::Turn;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct OpenSessionResponse {
    pub session_id: String,
    pub greeting: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct ChatAccepted {
    pub accepted: bool,
}

#[derive(Debug, Serialize)]
pub struct TranscriptResponse {
    pub session_id: String,
    pub turns: Vec<Turn>,
}

#[derive(Debug, Serialize)]
pub struct ClosedResponse {
    pub closed: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
