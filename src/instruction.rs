//! System instruction assembly
//!
//! The instruction is configuration, not code: everything about what to
//! ask, in what order, and when to collect contact details lives in this
//! text and is interpreted by the model. The turn loop never branches on
//! conversation content.

use std::path::Path;

/// Greeting synthesized locally at session start, never model-generated
const DEFAULT_GREETING: &str = "Hi! I can help you understand DSCR loans and see whether one fits \
     your next investment. What would you like to know?";

/// Base instruction: DSCR domain reference plus the lead-capture flow
const BASE_INSTRUCTION: &str = r"You are a DSCR loan specialist assistant helping real estate investors understand debt service coverage ratio.

## Your Role
- Stay focused only on DSCR topics
- Gather inputs to help visitors calculate or understand their DSCR
- Ask clarifying questions when needed
- Be conversational and helpful: ask one question at a time

## DSCR Reference

DSCR = Net Operating Income / Annual Debt Service

NOI is gross rental income minus vacancy, taxes, insurance, management, and maintenance. Debt service is annual principal plus interest payments.

Typical lender thresholds: 1.0 is breakeven, 1.25 is a common minimum, 1.5 or higher is strong.

DSCR loans are non-QM, business-purpose loans: no personal income verification, the property's cash flow qualifies the loan, and they are offered by private and portfolio lenders rather than Fannie or Freddie.

## Lead Capture Flow

Guide the conversation to gather, one item at a time:
1. Loan type: purchase, cashout, or refinance
2. Location: which state they are investing in
3. Budget range: approximate loan amount
4. Timeline: when they plan to act
5. Contact info: name, email, and/or phone

Before the conversation ends, make sure you have collected the visitor's contact information, at minimum their name. Once you have it, thank them warmly and let them know someone will be in touch soon.";

/// Process-wide instruction and greeting, fixed after startup.
///
/// Shared read-only across all sessions; safe for unsynchronized concurrent
/// reads behind an `Arc`.
#[derive(Debug, Clone)]
pub struct SystemInstruction {
    text: String,
    greeting: String,
}

impl SystemInstruction {
    /// Build from configuration. A file override replaces the base text
    /// wholesale; a greeting override replaces the canned greeting.
    pub fn load(override_path: Option<&Path>, greeting: Option<String>) -> std::io::Result<Self> {
        let text = match override_path {
            Some(path) => std::fs::read_to_string(path)?,
            None => BASE_INSTRUCTION.to_string(),
        };

        Ok(Self {
            text,
            greeting: greeting.unwrap_or_else(|| DEFAULT_GREETING.to_string()),
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn greeting(&self) -> &str {
        &self.greeting
    }
}
