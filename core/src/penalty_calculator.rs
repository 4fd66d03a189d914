//! Penalty calculator: turns (role, type, severity) plus the booking's two
//! money pools into a refund amount and a penalty-point count.
//!
//! The matrix lives in `PENALTY_TABLE` as data. Each row holds the fraction
//! of each pool (in basis points) and the points charged to the
//! counterparty. A (role, type) pair with no rows yields (0, 0).

use crate::{
    reclamation::{ComplainantRole, ReclamationType, Severity},
    types::{bps_fraction, round_money, Money},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::reclamation::{
    ComplainantRole::{Guest, Host},
    ReclamationType::*,
    Severity::{Critical, High, Low, Medium},
};

/// Fraction of each pool owed for one (class, severity) cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PenaltyRule {
    pub rent_bps:    u32,
    pub deposit_bps: u32,
    pub points:      u32,
}

const fn rule(rent_bps: u32, deposit_bps: u32, points: u32) -> PenaltyRule {
    PenaltyRule { rent_bps, deposit_bps, points }
}

type Row = (ComplainantRole, ReclamationType, Severity, PenaltyRule);

#[rustfmt::skip]
pub const PENALTY_TABLE: &[Row] = &[
    // ── Guest filings ──────────────────────────────── rent    deposit  pts
    (Guest, AccessIssue,              Low,      rule(10_000, 10_000, 10)),
    (Guest, AccessIssue,              Medium,   rule(10_000, 10_000, 10)),
    (Guest, AccessIssue,              High,     rule(10_000, 10_000, 10)),
    (Guest, AccessIssue,              Critical, rule(10_000, 10_000, 10)),
    (Guest, NotAsDescribed,           Low,      rule(10_000, 10_000, 10)),
    (Guest, NotAsDescribed,           Medium,   rule(10_000, 10_000, 10)),
    (Guest, NotAsDescribed,           High,     rule(10_000, 10_000, 10)),
    (Guest, NotAsDescribed,           Critical, rule(10_000, 10_000, 10)),
    (Guest, Cleanliness,              Low,      rule(   500, 10_000,  0)),
    (Guest, Cleanliness,              Medium,   rule( 1_250, 10_000,  2)),
    (Guest, Cleanliness,              High,     rule( 3_250, 10_000,  5)),
    (Guest, Cleanliness,              Critical, rule( 5_000, 10_000, 10)),
    (Guest, SafetyHealth,             Low,      rule( 1_000, 10_000,  3)),
    (Guest, SafetyHealth,             Medium,   rule( 3_000, 10_000,  7)),
    (Guest, SafetyHealth,             High,     rule( 7_000, 10_000, 15)),
    (Guest, SafetyHealth,             Critical, rule(10_000, 10_000, 25)),
    // ── Host filings (deposit only) ─────────────────
    (Host,  PropertyDamage,           Low,      rule(0,    750,  2)),
    (Host,  PropertyDamage,           Medium,   rule(0,  3_000,  5)),
    (Host,  PropertyDamage,           High,     rule(0,  7_000, 10)),
    (Host,  PropertyDamage,           Critical, rule(0, 10_000, 15)),
    (Host,  ExtraCleaning,            Low,      rule(0,    750,  1)),
    (Host,  ExtraCleaning,            Medium,   rule(0,  2_000,  3)),
    (Host,  ExtraCleaning,            High,     rule(0,  4_000,  5)),
    (Host,  ExtraCleaning,            Critical, rule(0,  7_000,  8)),
    (Host,  HouseRuleViolation,       Low,      rule(0,      0,  2)), // warning only
    (Host,  HouseRuleViolation,       Medium,   rule(0,  1_500,  5)),
    (Host,  HouseRuleViolation,       High,     rule(0,  5_000, 10)),
    (Host,  HouseRuleViolation,       Critical, rule(0, 10_000, 15)),
    (Host,  UnauthorizedGuestsOrStay, Low,      rule(0,  1_000,  3)),
    (Host,  UnauthorizedGuestsOrStay, Medium,   rule(0,  3_250,  7)),
    (Host,  UnauthorizedGuestsOrStay, High,     rule(0,  7_000, 12)),
    (Host,  UnauthorizedGuestsOrStay, Critical, rule(0, 10_000, 20)),
];

/// Look up the matrix cell, if any.
pub fn lookup_rule(
    role: ComplainantRole,
    reclamation_type: ReclamationType,
    severity: Severity,
) -> Option<PenaltyRule> {
    PENALTY_TABLE
        .iter()
        .find(|(r, t, s, _)| *r == role && *t == reclamation_type && *s == severity)
        .map(|(_, _, _, rule)| *rule)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PenaltyOutcome {
    /// Total owed to the prevailing party, rounded to cents.
    pub refund_amount:  Money,
    pub penalty_points: u32,
}

impl PenaltyOutcome {
    pub const NONE: PenaltyOutcome = PenaltyOutcome {
        refund_amount:  Decimal::ZERO,
        penalty_points: 0,
    };
}

/// Pure calculation. Untabulated combinations return `PenaltyOutcome::NONE`.
pub fn calculate_penalty(
    reclamation_type: ReclamationType,
    severity: Severity,
    role: ComplainantRole,
    rent_total: Money,
    deposit_total: Money,
) -> PenaltyOutcome {
    let Some(rule) = lookup_rule(role, reclamation_type, severity) else {
        log::debug!(
            "no penalty rule for role={role} type={reclamation_type} severity={severity}"
        );
        return PenaltyOutcome::NONE;
    };

    let refund = rent_total * bps_fraction(rule.rent_bps)
        + deposit_total * bps_fraction(rule.deposit_bps);

    PenaltyOutcome {
        refund_amount:  round_money(refund),
        penalty_points: rule.points,
    }
}
