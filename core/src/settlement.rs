//! Settlement execution and the reconciliation ledger records.
//!
//! Every planned instruction is submitted to the executor independently and
//! in plan order. A failure is recorded and the next instruction is still
//! attempted. Nothing here rolls back: the decision is the source of truth,
//! and failed rows in `settlement_ledger` are reconciled out-of-band.

use crate::{
    directory::{PoolSource, SettlementExecutor},
    fund_distribution::{DistributionPlan, Party},
    types::{BookingId, Money, ReclamationId, WalletAddress},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of one instruction, as written to `settlement_ledger`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub id:             Option<i64>,
    pub plan_id:        String,
    pub seq:            u32,
    pub reclamation_id: ReclamationId,
    pub booking_id:     BookingId,
    pub party:          Party,
    pub recipient:      Option<WalletAddress>,
    pub amount:         Money,
    pub pool:           PoolSource,
    pub tx_id:          Option<String>,
    pub error:          Option<String>,
    pub created_at:     DateTime<Utc>,
}

impl SettlementRecord {
    pub fn succeeded(&self) -> bool {
        self.tx_id.is_some() && self.error.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettlementReport {
    /// Empty when there was nothing to settle.
    pub plan_id: Option<String>,
    pub records: Vec<SettlementRecord>,
}

impl SettlementReport {
    pub fn failures(&self) -> impl Iterator<Item = &SettlementRecord> {
        self.records.iter().filter(|r| !r.succeeded())
    }

    pub fn fully_settled(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// Push each instruction of `plan` through `executor`.
pub fn execute_plan(
    executor: &dyn SettlementExecutor,
    reclamation_id: ReclamationId,
    booking_id: BookingId,
    plan: &DistributionPlan,
    now: DateTime<Utc>,
) -> SettlementReport {
    if plan.is_empty() {
        return SettlementReport::default();
    }

    let plan_id = uuid::Uuid::new_v4().to_string();
    let mut records = Vec::with_capacity(plan.instructions.len());

    for (seq, instruction) in plan.instructions.iter().enumerate() {
        let result = match &instruction.recipient {
            Some(recipient) => executor
                .transfer(booking_id, recipient, instruction.amount, instruction.pool)
                .map_err(|e| e.to_string()),
            None => Err(format!("no wallet for {}", instruction.party.as_str())),
        };

        let (tx_id, error) = match result {
            Ok(tx) => {
                log::info!(
                    "reclamation={reclamation_id} booking={booking_id} settled {} {} -> {} from {} tx={tx}",
                    instruction.amount,
                    instruction.party.as_str(),
                    instruction.recipient.as_deref().unwrap_or("-"),
                    instruction.pool.as_str(),
                );
                (Some(tx), None)
            }
            Err(e) => {
                log::error!(
                    "reclamation={reclamation_id} booking={booking_id} settlement FAILED {} {} from {}: {e}",
                    instruction.amount,
                    instruction.party.as_str(),
                    instruction.pool.as_str(),
                );
                (None, Some(e))
            }
        };

        records.push(SettlementRecord {
            id: None,
            plan_id: plan_id.clone(),
            seq: seq as u32,
            reclamation_id,
            booking_id,
            party: instruction.party,
            recipient: instruction.recipient.clone(),
            amount: instruction.amount,
            pool: instruction.pool,
            tx_id,
            error,
            created_at: now,
        });
    }

    SettlementReport { plan_id: Some(plan_id), records }
}
