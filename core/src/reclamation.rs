//! Reclamation record and its lifecycle state machine.
//!
//! STATES: Open → InReview → {Resolved, Rejected}.
//! Resolved and Rejected are terminal. The engine owns `status`,
//! `refund_amount`, `penalty_points` and `resolved_at`; the filer owns
//! title, description and attachments while the record is not terminal.

use crate::{
    error::{EngineError, EngineResult},
    types::{BookingId, Money, ReclamationId, UserId},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplainantRole {
    Guest,
    Host,
}

/// Fixed dispute taxonomy. The first four are filed by guests, the last
/// four by hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReclamationType {
    AccessIssue,
    NotAsDescribed,
    Cleanliness,
    SafetyHealth,
    PropertyDamage,
    ExtraCleaning,
    HouseRuleViolation,
    UnauthorizedGuestsOrStay,
}

impl ReclamationType {
    /// The role that normally files this type of dispute.
    pub fn filed_by(self) -> ComplainantRole {
        match self {
            ReclamationType::AccessIssue
            | ReclamationType::NotAsDescribed
            | ReclamationType::Cleanliness
            | ReclamationType::SafetyHealth => ComplainantRole::Guest,
            ReclamationType::PropertyDamage
            | ReclamationType::ExtraCleaning
            | ReclamationType::HouseRuleViolation
            | ReclamationType::UnauthorizedGuestsOrStay => ComplainantRole::Host,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReclamationStatus {
    Open,
    InReview,
    Resolved,
    Rejected,
}

impl ReclamationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ReclamationStatus::Resolved | ReclamationStatus::Rejected)
    }

    /// Statuses from which the filer may still edit or withdraw.
    pub const ACTIVE: [ReclamationStatus; 2] =
        [ReclamationStatus::Open, ReclamationStatus::InReview];
}

// ── String forms ───────────────────────────────────────────────────
// Used for the store's TEXT columns and for inbound enum parsing.
// Unknown strings are a ValidationError ("malformed enum").

macro_rules! string_enum {
    ($ty:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(self) -> &'static str {
                match self {
                    $($ty::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.pad(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = EngineError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim() {
                    $($text => Ok($ty::$variant),)+
                    other => Err(EngineError::Validation(format!(
                        "unknown {} value '{other}'",
                        stringify!($ty)
                    ))),
                }
            }
        }
    };
}

string_enum!(ComplainantRole { Guest => "GUEST", Host => "HOST" });

string_enum!(ReclamationType {
    AccessIssue              => "ACCESS_ISSUE",
    NotAsDescribed           => "NOT_AS_DESCRIBED",
    Cleanliness              => "CLEANLINESS",
    SafetyHealth             => "SAFETY_HEALTH",
    PropertyDamage           => "PROPERTY_DAMAGE",
    ExtraCleaning            => "EXTRA_CLEANING",
    HouseRuleViolation       => "HOUSE_RULE_VIOLATION",
    UnauthorizedGuestsOrStay => "UNAUTHORIZED_GUESTS_OR_STAY",
});

string_enum!(Severity {
    Low      => "LOW",
    Medium   => "MEDIUM",
    High     => "HIGH",
    Critical => "CRITICAL",
});

string_enum!(ReclamationStatus {
    Open     => "OPEN",
    InReview => "IN_REVIEW",
    Resolved => "RESOLVED",
    Rejected => "REJECTED",
});

/// A dispute record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reclamation {
    pub id:               ReclamationId,
    pub booking_id:       BookingId,
    pub complainant_id:   UserId,
    pub complainant_role: ComplainantRole,
    /// Counterparty. `None` means resolution has not succeeded yet; never a
    /// zero sentinel.
    pub target_user_id:   Option<UserId>,
    pub reclamation_type: ReclamationType,
    pub title:            String,
    pub description:      String,
    pub severity:         Severity,
    pub status:           ReclamationStatus,
    pub refund_amount:    Money,
    pub penalty_points:   u32,
    pub resolution_notes: Option<String>,
    pub created_at:       DateTime<Utc>,
    pub updated_at:       DateTime<Utc>,
    pub resolved_at:      Option<DateTime<Utc>>,
}

/// The terminal decision written in one step when adjudication ends.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub status:         ReclamationStatus,
    pub refund_amount:  Money,
    pub penalty_points: u32,
    pub notes:          String,
}

impl Verdict {
    pub fn approved(refund_amount: Money, penalty_points: u32, notes: impl Into<String>) -> Self {
        Self {
            status: ReclamationStatus::Resolved,
            refund_amount,
            penalty_points,
            notes: notes.into(),
        }
    }

    pub fn rejected(notes: impl Into<String>) -> Self {
        Self {
            status: ReclamationStatus::Rejected,
            refund_amount: Decimal::ZERO,
            penalty_points: 0,
            notes: notes.into(),
        }
    }
}

impl Reclamation {
    /// A freshly filed record: OPEN, severity LOW, nothing refunded.
    #[allow(clippy::too_many_arguments)]
    pub fn filed(
        booking_id: BookingId,
        complainant_id: UserId,
        complainant_role: ComplainantRole,
        target_user_id: Option<UserId>,
        reclamation_type: ReclamationType,
        title: String,
        description: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0,
            booking_id,
            complainant_id,
            complainant_role,
            target_user_id,
            reclamation_type,
            title,
            description,
            severity: Severity::Low,
            status: ReclamationStatus::Open,
            refund_amount: Decimal::ZERO,
            penalty_points: 0,
            resolution_notes: None,
            created_at: now,
            updated_at: now,
            resolved_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Fail with a ConflictError when the record is already decided.
    pub fn ensure_active(&self, action: &str) -> EngineResult<()> {
        if self.is_terminal() {
            return Err(EngineError::Conflict(format!(
                "cannot {action} reclamation {} with status {}",
                self.id, self.status
            )));
        }
        Ok(())
    }

    /// Fail with a ConflictError unless `user_id` filed this record.
    pub fn ensure_filed_by(&self, user_id: UserId, action: &str) -> EngineResult<()> {
        if self.complainant_id != user_id {
            return Err(EngineError::Conflict(format!(
                "only the complainant can {action} reclamation {}",
                self.id
            )));
        }
        Ok(())
    }

    /// OPEN/IN_REVIEW → IN_REVIEW. Repeating it is a no-op.
    pub fn mark_in_review(&mut self, now: DateTime<Utc>) -> EngineResult<bool> {
        self.ensure_active("review")?;
        if self.status == ReclamationStatus::InReview {
            return Ok(false);
        }
        self.status = ReclamationStatus::InReview;
        self.updated_at = now;
        Ok(true)
    }

    pub fn set_severity(&mut self, severity: Severity, now: DateTime<Utc>) -> EngineResult<()> {
        self.ensure_active("change severity of")?;
        self.severity = severity;
        self.updated_at = now;
        Ok(())
    }

    /// Move into a terminal state. `resolved_at` is stamped only if it was
    /// never set before.
    pub fn apply_verdict(&mut self, verdict: &Verdict, now: DateTime<Utc>) -> EngineResult<()> {
        self.ensure_active("resolve")?;
        if !verdict.status.is_terminal() {
            return Err(EngineError::Validation(format!(
                "verdict status {} is not terminal",
                verdict.status
            )));
        }
        self.status = verdict.status;
        self.refund_amount = verdict.refund_amount;
        self.penalty_points = verdict.penalty_points;
        self.resolution_notes = Some(verdict.notes.clone());
        self.updated_at = now;
        if self.resolved_at.is_none() {
            self.resolved_at = Some(now);
        }
        Ok(())
    }
}

/// Input for filing a new reclamation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReclamation {
    pub booking_id:       BookingId,
    pub complainant_id:   UserId,
    pub complainant_role: ComplainantRole,
    pub reclamation_type: ReclamationType,
    pub title:            String,
    pub description:      String,
    #[serde(default)]
    pub attachment_count: usize,
}

/// Filer-side edit. Blank or absent fields keep their current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReclamationEdit {
    pub title:            Option<String>,
    pub description:      Option<String>,
    pub attachment_count: Option<usize>,
}

/// Reject a blank title or description before any state change.
pub fn validate_text(field: &str, value: &str) -> EngineResult<()> {
    if value.trim().is_empty() {
        return Err(EngineError::Validation(format!("{field} is required")));
    }
    Ok(())
}

pub fn validate_attachment_count(count: usize, max: usize) -> EngineResult<()> {
    if count > max {
        return Err(EngineError::Validation(format!(
            "at most {max} attachments are allowed, got {count}"
        )));
    }
    Ok(())
}

/// Per-user reclamation counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReclamationStats {
    pub user_id:        UserId,
    pub total_filed:    u64,
    pub total_received: u64,
    /// Filed by the user and still OPEN or IN_REVIEW.
    pub pending_filed:  u64,
    pub resolved_filed: u64,
}

/// Global counts by status for the adjudicator dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusBreakdown {
    pub total:     u64,
    pub open:      u64,
    pub in_review: u64,
    pub resolved:  u64,
    pub rejected:  u64,
}
