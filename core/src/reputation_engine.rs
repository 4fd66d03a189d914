//! Reputation & suspension engine.
//!
//! Deducts penalty points from a counterparty's score (floored at 0) and
//! re-evaluates the suspension ladder. A deduction never raises a score, and
//! an account that is not found is a hard error: a dangling counterparty
//! reference is a bug upstream, not something to paper over.

use crate::{
    clock::Clock,
    config::{ReputationConfig, SuspensionTier},
    directory::{Account, AccountDirectory},
    error::{EngineError, EngineResult},
    types::UserId,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// What a suspension re-evaluation did to the account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SuspensionChange {
    Unchanged,
    Suspended {
        reason: String,
        until:  Option<DateTime<Utc>>,
    },
    Lifted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreChange {
    pub user_id:    UserId,
    pub old_score:  u32,
    pub new_score:  u32,
    pub suspension: SuspensionChange,
}

/// Apply the suspension ladder to `account` in place.
///
/// Tiers are checked lowest first. Above every tier, an expired suspension
/// is lifted; an unexpired or indefinite one stays.
pub fn evaluate_suspension(
    account: &mut Account,
    tiers: &[SuspensionTier],
    now: DateTime<Utc>,
) -> SuspensionChange {
    let points_lost = 100u32.saturating_sub(account.score);

    if let Some(tier) = tiers.iter().find(|t| account.score <= t.max_score) {
        let reason = format!("{} - {points_lost} penalty points deducted", tier.label);
        let until = tier.days.map(|d| now + Duration::days(d));
        account.is_suspended = true;
        account.suspension_reason = Some(reason.clone());
        account.suspension_until = until;
        return SuspensionChange::Suspended { reason, until };
    }

    let expired = account.suspension_until.is_some_and(|until| now > until);
    if account.is_suspended && expired {
        account.is_suspended = false;
        account.suspension_reason = None;
        account.suspension_until = None;
        return SuspensionChange::Lifted;
    }

    SuspensionChange::Unchanged
}

/// Deductions against the same account run one at a time; different
/// accounts proceed in parallel.
pub struct ReputationEngine {
    accounts: Arc<dyn AccountDirectory>,
    clock:    Arc<dyn Clock>,
    config:   ReputationConfig,
    locks:    Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
}

impl ReputationEngine {
    pub fn new(
        accounts: Arc<dyn AccountDirectory>,
        clock: Arc<dyn Clock>,
        config: ReputationConfig,
    ) -> Self {
        Self { accounts, clock, config, locks: Mutex::new(HashMap::new()) }
    }

    fn account_lock(&self, user_id: UserId) -> EngineResult<Arc<Mutex<()>>> {
        let mut locks = self.locks.lock().map_err(|_| EngineError::LockPoisoned)?;
        Ok(locks.entry(user_id).or_default().clone())
    }

    /// Deduct `points` from the account's score and re-evaluate suspension.
    /// Returns `None` when there was nothing to deduct.
    pub fn deduct_penalty_points(
        &self,
        user_id: UserId,
        points: u32,
    ) -> EngineResult<Option<ScoreChange>> {
        let lock = self.account_lock(user_id)?;
        let _held = lock.lock().map_err(|_| EngineError::LockPoisoned)?;

        let mut account = self
            .accounts
            .get(user_id)?
            .ok_or(EngineError::AccountNotFound { id: user_id })?;

        if points == 0 {
            return Ok(None);
        }

        let old_score = account.score.min(self.config.initial_score);
        let new_score = old_score.saturating_sub(points);
        account.score = new_score;

        let suspension = evaluate_suspension(&mut account, &self.config.tiers, self.clock.now());
        self.accounts.save(&account)?;

        match &suspension {
            SuspensionChange::Suspended { reason, until } => log::warn!(
                "user={user_id} suspended: score {old_score} -> {new_score}, until={until:?} ({reason})"
            ),
            _ => log::info!("user={user_id} score {old_score} -> {new_score} (-{points})"),
        }

        Ok(Some(ScoreChange { user_id, old_score, new_score, suspension }))
    }
}
