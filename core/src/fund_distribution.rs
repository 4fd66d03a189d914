//! Fund distribution planner: splits an approved reclamation's refund
//! across guest, host and platform, drawing from the booking's rent and
//! deposit pools.
//!
//! The planner is pure: it never moves money. It returns an ordered list of
//! instructions that the service hands to the settlement executor one by
//! one. Four cases, selected by (role, type):
//!
//!   1. Full refund            GUEST + ACCESS_ISSUE / NOT_AS_DESCRIBED
//!   2. Guest refund w/deposit GUEST + CLEANLINESS / SAFETY_HEALTH
//!   3. Host reclamation       HOST + any type
//!   4. Fallback guest refund  any other GUEST filing
//!
//! INVARIANTS (cases 1-3): rent-sourced amounts sum to `rent_total` and
//! deposit-sourced amounts sum to `deposit_total`, to the cent. Every
//! amount is rounded before it enters the plan; the last share of each pool
//! is computed as the exact remainder so no cent drifts.

use crate::{
    config::DistributionConfig,
    directory::PoolSource,
    reclamation::{ComplainantRole, ReclamationType},
    types::{round_money, Money, WalletAddress},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Party {
    Guest,
    Host,
    Platform,
}

impl Party {
    pub fn as_str(self) -> &'static str {
        match self {
            Party::Guest => "GUEST",
            Party::Host => "HOST",
            Party::Platform => "PLATFORM",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionCase {
    FullRefund,
    GuestRefundWithDeposit,
    HostReclamation,
    FallbackGuestRefund,
}

impl DistributionCase {
    pub fn select(role: ComplainantRole, reclamation_type: ReclamationType) -> Self {
        use ReclamationType::*;
        match (role, reclamation_type) {
            (ComplainantRole::Guest, AccessIssue | NotAsDescribed) => DistributionCase::FullRefund,
            (ComplainantRole::Guest, Cleanliness | SafetyHealth) => {
                DistributionCase::GuestRefundWithDeposit
            }
            (ComplainantRole::Host, _) => DistributionCase::HostReclamation,
            (ComplainantRole::Guest, _) => DistributionCase::FallbackGuestRefund,
        }
    }
}

/// A single planned transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementInstruction {
    pub party:     Party,
    /// Resolved wallet. `None` when the party's wallet could not be found;
    /// the instruction is still planned so the shortfall is visible.
    pub recipient: Option<WalletAddress>,
    pub amount:    Money,
    pub pool:      PoolSource,
}

/// Wallets of the two transaction parties, resolved by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartyWallets {
    pub guest: Option<WalletAddress>,
    pub host:  Option<WalletAddress>,
}

/// Everything the planner needs about the decided reclamation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistributionInput {
    pub role:             ComplainantRole,
    pub reclamation_type: ReclamationType,
    pub refund_amount:    Money,
    pub rent_total:       Money,
    pub deposit_total:    Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionPlan {
    pub case:         DistributionCase,
    pub instructions: Vec<SettlementInstruction>,
}

impl DistributionPlan {
    /// Sum of the amounts drawn from `pool`.
    pub fn pool_total(&self, pool: PoolSource) -> Money {
        self.instructions
            .iter()
            .filter(|i| i.pool == pool)
            .map(|i| i.amount)
            .sum()
    }

    /// Sum of the amounts routed to `party`, across both pools.
    pub fn total_to(&self, party: Party) -> Money {
        self.instructions
            .iter()
            .filter(|i| i.party == party)
            .map(|i| i.amount)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

pub struct FundDistributionPlanner {
    config: DistributionConfig,
}

impl FundDistributionPlanner {
    pub fn new(config: DistributionConfig) -> Self {
        Self { config }
    }

    pub fn plan(&self, input: &DistributionInput, wallets: &PartyWallets) -> DistributionPlan {
        let case = DistributionCase::select(input.role, input.reclamation_type);
        let rent = non_negative(input.rent_total);
        let deposit = non_negative(input.deposit_total);
        let refund = non_negative(input.refund_amount);

        let mut builder = PlanBuilder::new(wallets, &self.config.platform_wallet);

        match case {
            DistributionCase::FullRefund => {
                builder.push(Party::Guest, rent, PoolSource::Rent);
                builder.push(Party::Guest, deposit, PoolSource::Deposit);
            }

            DistributionCase::GuestRefundWithDeposit => {
                // The refund is deposit + a share of rent. The share is
                // clamped to the pool so rent is never over-allocated.
                let rent_portion = clamp(refund - deposit, Decimal::ZERO, rent);
                let remainder = rent - rent_portion;
                let fee = self.fee_on(rent_portion).min(remainder);
                let to_host = remainder - fee;

                builder.push(Party::Guest, deposit, PoolSource::Deposit);
                builder.push(Party::Guest, rent_portion, PoolSource::Rent);
                builder.push(Party::Platform, fee, PoolSource::Rent);
                builder.push(Party::Host, to_host, PoolSource::Rent);
            }

            DistributionCase::HostReclamation => {
                // Rent always splits host/platform; the deposit penalty goes
                // to the host and the rest of the deposit back to the guest.
                let fee = self.fee_on(rent);
                let penalty = clamp(refund, Decimal::ZERO, deposit);

                builder.push(Party::Host, rent - fee, PoolSource::Rent);
                builder.push(Party::Platform, fee, PoolSource::Rent);
                builder.push(Party::Host, penalty, PoolSource::Deposit);
                builder.push(Party::Guest, deposit - penalty, PoolSource::Deposit);
            }

            DistributionCase::FallbackGuestRefund => {
                // The refund is taken as already net of the fee; the gross
                // amount is refund / (1 - fee%) and the difference goes to
                // the platform.
                let keep = Decimal::ONE - self.config.platform_fee_percent;
                let fee = if keep > Decimal::ZERO {
                    round_money(refund / keep) - refund
                } else {
                    Decimal::ZERO
                };
                builder.push(Party::Guest, refund, PoolSource::Rent);
                builder.push(Party::Platform, fee, PoolSource::Rent);
            }
        }

        let plan = DistributionPlan { case, instructions: builder.finish() };
        log::debug!(
            "distribution plan case={case:?} rent_out={} deposit_out={} instructions={}",
            plan.pool_total(PoolSource::Rent),
            plan.pool_total(PoolSource::Deposit),
            plan.instructions.len(),
        );
        plan
    }

    /// Platform fee on `amount`, rounded to cents.
    fn fee_on(&self, amount: Money) -> Money {
        round_money(amount * self.config.platform_fee_percent)
    }
}

struct PlanBuilder<'a> {
    wallets:         &'a PartyWallets,
    platform_wallet: &'a str,
    instructions:    Vec<SettlementInstruction>,
}

impl<'a> PlanBuilder<'a> {
    fn new(wallets: &'a PartyWallets, platform_wallet: &'a str) -> Self {
        Self { wallets, platform_wallet, instructions: Vec::new() }
    }

    /// Append an instruction, dropping zero amounts.
    fn push(&mut self, party: Party, amount: Money, pool: PoolSource) {
        let amount = round_money(amount);
        if amount <= Decimal::ZERO {
            return;
        }
        let recipient = match party {
            Party::Guest => self.wallets.guest.clone(),
            Party::Host => self.wallets.host.clone(),
            Party::Platform => Some(self.platform_wallet.to_string()),
        };
        self.instructions.push(SettlementInstruction { party, recipient, amount, pool });
    }

    fn finish(self) -> Vec<SettlementInstruction> {
        self.instructions
    }
}

fn non_negative(amount: Money) -> Money {
    round_money(amount.max(Decimal::ZERO))
}

fn clamp(value: Money, lo: Money, hi: Money) -> Money {
    value.max(lo).min(hi)
}
