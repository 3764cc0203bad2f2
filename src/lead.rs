//! Lead handoff types and sink
//!
//! The turn loop never branches on lead content; these types exist for the
//! downstream handoff only. Storage is the sink implementor's concern.

use crate::conversation::Turn;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Loan purpose the visitor is exploring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanType {
    Purchase,
    Cashout,
    Refinance,
}

/// Contact details; a lead is only actionable with at least a name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// Qualification fields distilled from a transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lead {
    pub contact: Contact,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loan_type: Option<LoanType>,
    /// Two-letter US state code, e.g. "TX"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_min: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_max: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeline: Option<String>,
}

/// Everything handed off when a session ends
#[derive(Debug, Clone, Serialize)]
pub struct LeadHandoff {
    pub session_id: String,
    pub captured_at: DateTime<Utc>,
    pub transcript: Vec<Turn>,
    pub lead: Option<Lead>,
}

#[derive(Debug, Error)]
#[error("{0}")]
pub struct SinkError(pub String);

/// Destination for finished conversations.
///
/// Invoked once per session, at teardown, with the full transcript and the
/// best-effort extracted lead. A delivery failure is logged and never fails
/// the session.
#[async_trait]
pub trait LeadSink: Send + Sync {
    async fn deliver(&self, handoff: LeadHandoff) -> Result<(), SinkError>;
}

#[async_trait]
impl<T: LeadSink + ?Sized> LeadSink for Arc<T> {
    async fn deliver(&self, handoff: LeadHandoff) -> Result<(), SinkError> {
        (**self).deliver(handoff).await
    }
}

/// Default sink: emits the handoff as a structured log record
pub struct LoggingLeadSink;

#[async_trait]
impl LeadSink for LoggingLeadSink {
    async fn deliver(&self, handoff: LeadHandoff) -> Result<(), SinkError> {
        match &handoff.lead {
            Some(lead) => tracing::info!(
                session_id = %handoff.session_id,
                contact = %lead.contact.name,
                geo = lead.geo.as_deref().unwrap_or("unknown"),
                turns = handoff.transcript.len(),
                "lead captured"
            ),
            None => tracing::info!(
                session_id = %handoff.session_id,
                turns = handoff.transcript.len(),
                "session ended without an extracted lead"
            ),
        }
        Ok(())
    }
}
