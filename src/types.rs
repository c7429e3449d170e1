//! Core ticket data model.
//!
//! Tickets serialize to camelCase JSON, the shape both storage backends
//! persist and the HTTP surface returns. There is deliberately no
//! `Deserialize` on [`Ticket`]: stored records may be partial or
//! hand-edited, so every read path goes through [`crate::hydrate`],
//! which fills defaults instead of rejecting the record.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::category::Category;
use crate::error::NoticError;

/// Workflow states, ordered informally by stage. There is no enforced
/// transition graph; any status is reachable from any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TicketStatus {
    #[default]
    Acknowledged,
    #[serde(rename = "Working on it")]
    WorkingOnIt,
    #[serde(rename = "Pending result")]
    PendingResult,
    #[serde(rename = "On hold")]
    OnHold,
    Complete,
}

/// Display names in workflow order, as persisted and shown to admins.
pub const VALID_STATUSES: &[&str] = &[
    "Acknowledged",
    "Working on it",
    "Pending result",
    "On hold",
    "Complete",
];

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Acknowledged => "Acknowledged",
            TicketStatus::WorkingOnIt => "Working on it",
            TicketStatus::PendingResult => "Pending result",
            TicketStatus::OnHold => "On hold",
            TicketStatus::Complete => "Complete",
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = NoticError;

    // Stored tickets and admin forms carry the display form verbatim,
    // so matching is exact rather than case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Acknowledged" => Ok(TicketStatus::Acknowledged),
            "Working on it" => Ok(TicketStatus::WorkingOnIt),
            "Pending result" => Ok(TicketStatus::PendingResult),
            "On hold" => Ok(TicketStatus::OnHold),
            "Complete" => Ok(TicketStatus::Complete),
            other => Err(NoticError::InvalidStatus(other.to_string())),
        }
    }
}

/// Thumbs up or down, collected once a ticket is Complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    Up,
    Down,
}

impl FromStr for Rating {
    type Err = NoticError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(Rating::Up),
            "down" => Ok(Rating::Down),
            _ => Err(NoticError::Validation(
                "Please choose thumbs up or thumbs down.".to_string(),
            )),
        }
    }
}

/// One line of ticket history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketUpdate {
    pub at: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentMeta {
    pub original_name: String,
    pub stored_name: String,
    pub size: u64,
    pub mime: String,
    pub uploaded_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    pub rating: Rating,
    pub comment: String,
    pub at: String,
}

/// A single support request and its accumulated history.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    /// `<PREFIX>-<6 base-36 uppercase chars>`, immutable after creation.
    pub id: String,
    pub name: String,
    /// Zero or more addresses in one string, `,`/`;` separated. Split
    /// and deduplicated at send time, never at rest.
    pub email: String,
    /// Set at creation, never mutated afterwards.
    pub issue: String,
    pub category: Category,
    pub status: TicketStatus,
    /// Set once at creation, immutable.
    pub created: String,
    pub due_at: String,
    pub sla_minutes: i64,
    /// Set the first time a free-text update is appended, then frozen.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_response_at: Option<String>,
    /// Set on the first transition into Complete, then frozen. Not
    /// cleared when a ticket is reopened.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<String>,
    pub updates: Vec<TicketUpdate>,
    pub attachments: Vec<AttachmentMeta>,
    /// Weak reference to another ticket id. Lookup only; the target may
    /// have been deleted, leaving this dangling.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<Feedback>,
}

impl Ticket {
    /// The id notification groups are keyed on: the `related` target if
    /// set, otherwise the ticket's own id.
    pub fn anchor(&self) -> &str {
        self.related.as_deref().unwrap_or(&self.id)
    }
}
