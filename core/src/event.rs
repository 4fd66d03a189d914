//! Dispute events: the audit trail of every state change.
//!
//! RULE: every mutation the service performs emits exactly one event per
//! fact, persisted to `event_log` as JSON. Variants are only ever added.

use crate::{
    directory::PoolSource,
    fund_distribution::{DistributionCase, Party},
    reclamation::{ComplainantRole, ReclamationStatus, ReclamationType, Severity},
    types::{BookingId, Money, PropertyId, ReclamationId, UserId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DisputeEvent {
    // ── Lifecycle ──────────────────────────────────
    ReclamationFiled {
        reclamation_id:   ReclamationId,
        booking_id:       BookingId,
        complainant_id:   UserId,
        complainant_role: ComplainantRole,
        reclamation_type: ReclamationType,
        target_user_id:   Option<UserId>,
    },
    SeverityChanged {
        reclamation_id: ReclamationId,
        from:           Severity,
        to:             Severity,
    },
    ReviewStarted {
        reclamation_id: ReclamationId,
    },
    ReclamationUpdated {
        reclamation_id: ReclamationId,
        user_id:        UserId,
    },
    ReclamationWithdrawn {
        reclamation_id: ReclamationId,
        booking_id:     BookingId,
        user_id:        UserId,
    },
    ReclamationResolved {
        reclamation_id: ReclamationId,
        booking_id:     BookingId,
        refund_amount:  Money,
        penalty_points: u32,
        case:           DistributionCase,
    },
    ReclamationRejected {
        reclamation_id: ReclamationId,
        booking_id:     BookingId,
    },

    // ── Settlement ─────────────────────────────────
    SettlementAttempted {
        reclamation_id: ReclamationId,
        plan_id:        String,
        party:          Party,
        recipient:      Option<String>,
        amount:         Money,
        pool:           PoolSource,
        tx_id:          Option<String>,
        error:          Option<String>,
    },

    // ── Reputation ─────────────────────────────────
    PenaltyApplied {
        reclamation_id: ReclamationId,
        user_id:        UserId,
        points:         u32,
        old_score:      u32,
        new_score:      u32,
    },
    AccountSuspended {
        reclamation_id: ReclamationId,
        user_id:        UserId,
        reason:         String,
        until:          Option<DateTime<Utc>>,
    },
    SuspensionLifted {
        reclamation_id: ReclamationId,
        user_id:        UserId,
    },
    PropertySuspensionRecommended {
        reclamation_id: ReclamationId,
        booking_id:     BookingId,
        property_id:    Option<PropertyId>,
        penalty_points: u32,
    },

    // ── Alarms ─────────────────────────────────────
    CounterpartyUnresolved {
        reclamation_id: Option<ReclamationId>,
        booking_id:     BookingId,
        reason:         String,
    },
}

impl DisputeEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            DisputeEvent::ReclamationFiled { .. } => "reclamation_filed",
            DisputeEvent::SeverityChanged { .. } => "severity_changed",
            DisputeEvent::ReviewStarted { .. } => "review_started",
            DisputeEvent::ReclamationUpdated { .. } => "reclamation_updated",
            DisputeEvent::ReclamationWithdrawn { .. } => "reclamation_withdrawn",
            DisputeEvent::ReclamationResolved { .. } => "reclamation_resolved",
            DisputeEvent::ReclamationRejected { .. } => "reclamation_rejected",
            DisputeEvent::SettlementAttempted { .. } => "settlement_attempted",
            DisputeEvent::PenaltyApplied { .. } => "penalty_applied",
            DisputeEvent::AccountSuspended { .. } => "account_suspended",
            DisputeEvent::SuspensionLifted { .. } => "suspension_lifted",
            DisputeEvent::PropertySuspensionRecommended { .. } => {
                "property_suspension_recommended"
            }
            DisputeEvent::CounterpartyUnresolved { .. } => "counterparty_unresolved",
        }
    }

    /// The reclamation this event concerns, when there is one.
    pub fn reclamation_id(&self) -> Option<ReclamationId> {
        match self {
            DisputeEvent::ReclamationFiled { reclamation_id, .. }
            | DisputeEvent::SeverityChanged { reclamation_id, .. }
            | DisputeEvent::ReviewStarted { reclamation_id }
            | DisputeEvent::ReclamationUpdated { reclamation_id, .. }
            | DisputeEvent::ReclamationWithdrawn { reclamation_id, .. }
            | DisputeEvent::ReclamationResolved { reclamation_id, .. }
            | DisputeEvent::ReclamationRejected { reclamation_id, .. }
            | DisputeEvent::SettlementAttempted { reclamation_id, .. }
            | DisputeEvent::PenaltyApplied { reclamation_id, .. }
            | DisputeEvent::AccountSuspended { reclamation_id, .. }
            | DisputeEvent::SuspensionLifted { reclamation_id, .. }
            | DisputeEvent::PropertySuspensionRecommended { reclamation_id, .. } => {
                Some(*reclamation_id)
            }
            DisputeEvent::CounterpartyUnresolved { reclamation_id, .. } => *reclamation_id,
        }
    }
}

/// A persisted event row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id:             Option<i64>,
    pub reclamation_id: Option<ReclamationId>,
    pub event_type:     String,
    pub payload:        String, // JSON-serialized DisputeEvent
    pub created_at:     DateTime<Utc>,
}

impl EventLogEntry {
    pub fn from_event(event: &DisputeEvent, at: DateTime<Utc>) -> serde_json::Result<Self> {
        Ok(Self {
            id:             None,
            reclamation_id: event.reclamation_id(),
            event_type:     event.event_type().to_string(),
            payload:        serde_json::to_string(event)?,
            created_at:     at,
        })
    }

    pub fn decode(&self) -> serde_json::Result<DisputeEvent> {
        serde_json::from_str(&self.payload)
    }
}
