//! Reclamation service: the orchestrator behind every filer and
//! adjudicator operation.
//!
//! Execution order of `resolve`:
//!   1. Load the record, reject if terminal                   (store lock)
//!   2. Resolve the counterparty if it was never established
//!   3. Approved: fetch pools, compute penalty, resolve wallets, plan
//!   4. Compare-and-set into the terminal state + event       (store lock)
//!      on unchanged status and severity
//!   5. Clear the booking's dispute flag, mark it completed   (best-effort)
//!   6. Approved: execute the plan, record the ledger         (store lock after)
//!   7. Approved: deduct penalty points from the counterparty
//!   8. Approved: property suspension recommendation
//!
//! RULE: the store lock is never held across a collaborator call. Two
//! concurrent resolutions of the same id both reach step 4; exactly one wins
//! the compare-and-set, the other gets Conflict and never settles.

use crate::{
    clock::Clock,
    config::EngineConfig,
    counterparty::{CounterpartyResolution, CounterpartyResolver},
    directory::{AccountDirectory, BookingDirectory, PropertyDirectory, SettlementExecutor},
    error::{EngineError, EngineResult},
    event::{DisputeEvent, EventLogEntry},
    fund_distribution::{DistributionInput, DistributionPlan, FundDistributionPlanner, PartyWallets},
    penalty_calculator::calculate_penalty,
    reclamation::{
        validate_attachment_count, validate_text, ComplainantRole, NewReclamation, Reclamation,
        ReclamationEdit, ReclamationStats, ReclamationStatus, Severity, StatusBreakdown, Verdict,
    },
    reputation_engine::{ReputationEngine, ScoreChange, SuspensionChange},
    settlement::{execute_plan, SettlementRecord, SettlementReport},
    store::ReclamationStore,
    types::{BookingId, ReclamationId, UserId, WalletAddress},
};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};

/// External collaborators the service is wired to.
#[derive(Clone)]
pub struct Collaborators {
    pub bookings:   Arc<dyn BookingDirectory>,
    pub properties: Arc<dyn PropertyDirectory>,
    pub accounts:   Arc<dyn AccountDirectory>,
    pub executor:   Arc<dyn SettlementExecutor>,
    pub clock:      Arc<dyn Clock>,
}

/// Everything `resolve` did, for the caller to report.
#[derive(Debug, Clone, Serialize)]
pub struct ResolutionOutcome {
    pub reclamation:                     Reclamation,
    /// `None` for rejections.
    pub plan:                            Option<DistributionPlan>,
    pub settlement:                      SettlementReport,
    pub score_change:                    Option<ScoreChange>,
    pub property_suspension_recommended: bool,
}

pub struct ReclamationService {
    store:      Mutex<ReclamationStore>,
    bookings:   Arc<dyn BookingDirectory>,
    accounts:   Arc<dyn AccountDirectory>,
    executor:   Arc<dyn SettlementExecutor>,
    clock:      Arc<dyn Clock>,
    resolver:   CounterpartyResolver,
    planner:    FundDistributionPlanner,
    reputation: ReputationEngine,
    config:     EngineConfig,
}

impl ReclamationService {
    /// Build the service over an already-migrated store.
    pub fn new(store: ReclamationStore, collaborators: Collaborators, config: EngineConfig) -> Self {
        let Collaborators { bookings, properties, accounts, executor, clock } = collaborators;
        Self {
            store: Mutex::new(store),
            resolver: CounterpartyResolver::standard(bookings.clone(), properties),
            planner: FundDistributionPlanner::new(config.distribution.clone()),
            reputation: ReputationEngine::new(
                accounts.clone(),
                clock.clone(),
                config.reputation.clone(),
            ),
            bookings,
            accounts,
            executor,
            clock,
            config,
        }
    }

    /// In-memory store, migrated. Used by tests and the scenario runner.
    pub fn in_memory(collaborators: Collaborators, config: EngineConfig) -> EngineResult<Self> {
        let store = ReclamationStore::in_memory()?;
        store.migrate()?;
        Ok(Self::new(store, collaborators, config))
    }

    fn store(&self) -> EngineResult<MutexGuard<'_, ReclamationStore>> {
        self.store.lock().map_err(|_| EngineError::LockPoisoned)
    }

    fn emit(&self, store: &ReclamationStore, events: &[DisputeEvent]) -> EngineResult<()> {
        let now = self.clock.now();
        for event in events {
            store.append_event(&EventLogEntry::from_event(event, now)?)?;
        }
        Ok(())
    }

    // ── Filing ─────────────────────────────────────────────────

    /// File a new reclamation. Counterparty resolution is best-effort: an
    /// unresolved target is logged and recorded, never fatal.
    pub fn create_reclamation(&self, new: NewReclamation) -> EngineResult<Reclamation> {
        validate_text("title", &new.title)?;
        validate_text("description", &new.description)?;
        validate_attachment_count(new.attachment_count, self.config.max_attachments)?;

        if new.reclamation_type.filed_by() != new.complainant_role {
            log::info!(
                "booking={} {} filing {} is outside the penalty matrix",
                new.booking_id,
                new.complainant_role,
                new.reclamation_type
            );
        }

        let resolution = self.resolver.resolve(new.booking_id, new.complainant_role);
        let mut reclamation = Reclamation::filed(
            new.booking_id,
            new.complainant_id,
            new.complainant_role,
            resolution.user_id(),
            new.reclamation_type,
            new.title.trim().to_string(),
            new.description.trim().to_string(),
            self.clock.now(),
        );

        {
            let store = self.store()?;
            reclamation.id = store.insert_reclamation(&reclamation)?;

            let mut events = vec![DisputeEvent::ReclamationFiled {
                reclamation_id:   reclamation.id,
                booking_id:       reclamation.booking_id,
                complainant_id:   reclamation.complainant_id,
                complainant_role: reclamation.complainant_role,
                reclamation_type: reclamation.reclamation_type,
                target_user_id:   reclamation.target_user_id,
            }];
            if let CounterpartyResolution::Unresolved { reason } = &resolution {
                log::error!(
                    "reclamation={} booking={} filed WITHOUT counterparty: {reason}",
                    reclamation.id,
                    reclamation.booking_id
                );
                events.push(DisputeEvent::CounterpartyUnresolved {
                    reclamation_id: Some(reclamation.id),
                    booking_id:     reclamation.booking_id,
                    reason:         reason.clone(),
                });
            }
            self.emit(&store, &events)?;
        }

        self.best_effort(reclamation.booking_id, "set active-dispute flag", |b| {
            b.set_active_dispute(reclamation.booking_id, true)
        });

        log::info!(
            "reclamation={} booking={} filed by user={} ({} {})",
            reclamation.id,
            reclamation.booking_id,
            reclamation.complainant_id,
            reclamation.complainant_role,
            reclamation.reclamation_type
        );
        Ok(reclamation)
    }

    /// Filer withdraws a non-terminal reclamation.
    pub fn delete_reclamation(&self, id: ReclamationId, user_id: UserId) -> EngineResult<()> {
        let booking_id = {
            let store = self.store()?;
            let r = store.require_reclamation(id)?;
            r.ensure_filed_by(user_id, "delete")?;
            r.ensure_active("delete")?;
            store.delete_active(id)?;
            self.emit(
                &store,
                &[DisputeEvent::ReclamationWithdrawn { reclamation_id: id, booking_id: r.booking_id, user_id }],
            )?;
            r.booking_id
        };

        self.best_effort(booking_id, "clear active-dispute flag", |b| {
            b.set_active_dispute(booking_id, false)
        });
        log::info!("reclamation={id} booking={booking_id} withdrawn by user={user_id}");
        Ok(())
    }

    /// Filer edits title, description or attachments. Blank fields keep the
    /// current value.
    pub fn update_reclamation(
        &self,
        id: ReclamationId,
        user_id: UserId,
        edit: ReclamationEdit,
    ) -> EngineResult<Reclamation> {
        let store = self.store()?;
        let mut r = store.require_reclamation(id)?;
        r.ensure_filed_by(user_id, "update")?;
        r.ensure_active("update")?;

        if let Some(count) = edit.attachment_count {
            validate_attachment_count(count, self.config.max_attachments)?;
        }
        if let Some(title) = edit.title.filter(|t| !t.trim().is_empty()) {
            r.title = title.trim().to_string();
        }
        if let Some(description) = edit.description.filter(|d| !d.trim().is_empty()) {
            r.description = description.trim().to_string();
        }
        r.updated_at = self.clock.now();

        store.update_active(&r)?;
        self.emit(&store, &[DisputeEvent::ReclamationUpdated { reclamation_id: id, user_id }])?;
        Ok(r)
    }

    // ── Adjudication ───────────────────────────────────────────

    pub fn update_severity(&self, id: ReclamationId, severity: Severity) -> EngineResult<Reclamation> {
        let store = self.store()?;
        let mut r = store.require_reclamation(id)?;
        let from = r.severity;
        r.set_severity(severity, self.clock.now())?;
        store.update_active(&r)?;
        if from != severity {
            self.emit(
                &store,
                &[DisputeEvent::SeverityChanged { reclamation_id: id, from, to: severity }],
            )?;
        }
        Ok(r)
    }

    /// Mark adjudication as started. Repeating it changes nothing.
    pub fn review(&self, id: ReclamationId) -> EngineResult<Reclamation> {
        let store = self.store()?;
        let mut r = store.require_reclamation(id)?;
        if r.mark_in_review(self.clock.now())? {
            store.update_active(&r)?;
            self.emit(&store, &[DisputeEvent::ReviewStarted { reclamation_id: id }])?;
        }
        Ok(r)
    }

    pub fn reject(&self, id: ReclamationId, notes: &str) -> EngineResult<ResolutionOutcome> {
        self.resolve(id, false, notes)
    }

    /// Close a reclamation with the adjudicator's decision.
    ///
    /// Once step 4 succeeds the decision is durable: settlement failures are
    /// recorded in the ledger and never roll it back. A missing counterparty
    /// account surfaces as `AccountNotFound` after everything else is done.
    pub fn resolve(
        &self,
        id: ReclamationId,
        approved: bool,
        notes: &str,
    ) -> EngineResult<ResolutionOutcome> {
        let mut r = {
            let store = self.store()?;
            let r = store.require_reclamation(id)?;
            r.ensure_active("resolve")?;
            r
        };

        if r.target_user_id.is_none() {
            self.resolve_counterparty_late(&mut r)?;
        }

        let (verdict, plan) = if approved {
            let (verdict, plan) = self.decide_approval(&r, notes)?;
            (verdict, Some(plan))
        } else {
            (Verdict::rejected(notes), None)
        };

        let now = self.clock.now();
        r.apply_verdict(&verdict, now)?;

        {
            let store = self.store()?;
            store.finalize_reclamation(&r)?;
            let event = match &plan {
                Some(plan) => DisputeEvent::ReclamationResolved {
                    reclamation_id: id,
                    booking_id:     r.booking_id,
                    refund_amount:  r.refund_amount,
                    penalty_points: r.penalty_points,
                    case:           plan.case,
                },
                None => DisputeEvent::ReclamationRejected { reclamation_id: id, booking_id: r.booking_id },
            };
            self.emit(&store, &[event])?;
        }
        log::info!(
            "reclamation={id} booking={} {} refund={} points={}",
            r.booking_id,
            r.status,
            r.refund_amount,
            r.penalty_points
        );

        let booking_id = r.booking_id;
        self.best_effort(booking_id, "clear active-dispute flag", |b| {
            b.set_active_dispute(booking_id, false)
        });
        self.best_effort(booking_id, "mark booking completed", |b| b.mark_completed(booking_id));

        let mut outcome = ResolutionOutcome {
            reclamation: r,
            plan: None,
            settlement: SettlementReport::default(),
            score_change: None,
            property_suspension_recommended: false,
        };
        let Some(plan) = plan else {
            return Ok(outcome);
        };

        outcome.settlement = self.settle(&outcome.reclamation, &plan)?;
        outcome.plan = Some(plan);
        outcome.score_change = self.apply_penalty(&outcome.reclamation)?;
        outcome.property_suspension_recommended =
            self.recommend_property_suspension(&outcome.reclamation)?;
        Ok(outcome)
    }

    /// Steps 2-3 of approval: penalty figures and the distribution plan.
    fn decide_approval(&self, r: &Reclamation, notes: &str) -> EngineResult<(Verdict, DistributionPlan)> {
        let facts = self.bookings.get(r.booking_id)?;
        if facts.deposit_total <= Decimal::ZERO {
            log::error!(
                "reclamation={} booking={} approved with empty deposit pool ({})",
                r.id,
                r.booking_id,
                facts.deposit_total
            );
        }

        let penalty = calculate_penalty(
            r.reclamation_type,
            r.severity,
            r.complainant_role,
            facts.rent_total,
            facts.deposit_total,
        );
        let wallets = self.party_wallets(r);
        let plan = self.planner.plan(
            &DistributionInput {
                role:             r.complainant_role,
                reclamation_type: r.reclamation_type,
                refund_amount:    penalty.refund_amount,
                rent_total:       facts.rent_total,
                deposit_total:    facts.deposit_total,
            },
            &wallets,
        );
        Ok((Verdict::approved(penalty.refund_amount, penalty.penalty_points, notes), plan))
    }

    fn resolve_counterparty_late(&self, r: &mut Reclamation) -> EngineResult<()> {
        match self.resolver.resolve(r.booking_id, r.complainant_role) {
            CounterpartyResolution::Resolved { user_id } => {
                log::info!("reclamation={} counterparty resolved late: user={user_id}", r.id);
                r.target_user_id = Some(user_id);
            }
            CounterpartyResolution::Unresolved { reason } => {
                log::error!(
                    "reclamation={} booking={} still has no counterparty at resolution: {reason}",
                    r.id,
                    r.booking_id
                );
                let store = self.store()?;
                self.emit(
                    &store,
                    &[DisputeEvent::CounterpartyUnresolved {
                        reclamation_id: Some(r.id),
                        booking_id:     r.booking_id,
                        reason,
                    }],
                )?;
            }
        }
        Ok(())
    }

    /// Guest is the complainant on GUEST filings and the target on HOST
    /// filings; host the other way round.
    fn party_wallets(&self, r: &Reclamation) -> PartyWallets {
        let (guest_id, host_id) = match r.complainant_role {
            ComplainantRole::Guest => (Some(r.complainant_id), r.target_user_id),
            ComplainantRole::Host => (r.target_user_id, Some(r.complainant_id)),
        };
        PartyWallets {
            guest: guest_id.and_then(|id| self.wallet_of(r.id, id)),
            host:  host_id.and_then(|id| self.wallet_of(r.id, id)),
        }
    }

    fn wallet_of(&self, reclamation_id: ReclamationId, user_id: UserId) -> Option<WalletAddress> {
        match self.accounts.get(user_id) {
            Ok(Some(account)) => {
                let wallet = account.wallet_address.filter(|w| !w.trim().is_empty());
                if wallet.is_none() {
                    log::warn!("reclamation={reclamation_id} user={user_id} has no wallet address");
                }
                wallet
            }
            Ok(None) => {
                log::warn!("reclamation={reclamation_id} user={user_id} not found for wallet lookup");
                None
            }
            Err(e) => {
                log::warn!("reclamation={reclamation_id} wallet lookup for user={user_id} failed: {e}");
                None
            }
        }
    }

    fn settle(&self, r: &Reclamation, plan: &DistributionPlan) -> EngineResult<SettlementReport> {
        let report = execute_plan(self.executor.as_ref(), r.id, r.booking_id, plan, self.clock.now());

        let store = self.store()?;
        for record in &report.records {
            store.insert_settlement(record)?;
        }
        let events: Vec<_> = report.records.iter().map(settlement_event).collect();
        self.emit(&store, &events)?;

        if !report.fully_settled() {
            log::error!(
                "reclamation={} booking={} partially settled: {} of {} instructions failed",
                r.id,
                r.booking_id,
                report.failures().count(),
                report.records.len()
            );
        }
        Ok(report)
    }

    /// Heavy penalties against a host flag the property for manual
    /// suspension.
    fn recommend_property_suspension(&self, r: &Reclamation) -> EngineResult<bool> {
        if r.complainant_role != ComplainantRole::Guest
            || r.penalty_points < self.config.property_suspension_points
        {
            return Ok(false);
        }

        let property_id = match self.bookings.get(r.booking_id) {
            Ok(facts) => facts.property_id,
            Err(e) => {
                log::warn!("reclamation={} could not look up property: {e}", r.id);
                None
            }
        };
        log::warn!(
            "reclamation={} property={property_id:?} should be suspended: host penalty points {}",
            r.id,
            r.penalty_points
        );

        let store = self.store()?;
        self.emit(
            &store,
            &[DisputeEvent::PropertySuspensionRecommended {
                reclamation_id: r.id,
                booking_id:     r.booking_id,
                property_id,
                penalty_points: r.penalty_points,
            }],
        )?;
        Ok(true)
    }

    fn apply_penalty(&self, r: &Reclamation) -> EngineResult<Option<ScoreChange>> {
        if r.penalty_points == 0 {
            return Ok(None);
        }
        let Some(target) = r.target_user_id else {
            log::error!(
                "reclamation={} booking={} has {} penalty points but no counterparty; score NOT updated",
                r.id,
                r.booking_id,
                r.penalty_points
            );
            return Ok(None);
        };

        let Some(change) = self.reputation.deduct_penalty_points(target, r.penalty_points)? else {
            return Ok(None);
        };

        let mut events = vec![DisputeEvent::PenaltyApplied {
            reclamation_id: r.id,
            user_id:        target,
            points:         r.penalty_points,
            old_score:      change.old_score,
            new_score:      change.new_score,
        }];
        match &change.suspension {
            SuspensionChange::Suspended { reason, until } => events.push(DisputeEvent::AccountSuspended {
                reclamation_id: r.id,
                user_id:        target,
                reason:         reason.clone(),
                until:          *until,
            }),
            SuspensionChange::Lifted => events.push(DisputeEvent::SuspensionLifted {
                reclamation_id: r.id,
                user_id:        target,
            }),
            SuspensionChange::Unchanged => {}
        }
        let store = self.store()?;
        self.emit(&store, &events)?;
        Ok(Some(change))
    }

    /// Run a booking-directory side effect whose failure must not abort the
    /// operation.
    fn best_effort(
        &self,
        booking_id: BookingId,
        what: &str,
        call: impl FnOnce(&dyn BookingDirectory) -> EngineResult<()>,
    ) {
        if let Err(e) = call(self.bookings.as_ref()) {
            log::warn!("booking={booking_id} failed to {what}: {e}");
        }
    }

    // ── Queries ────────────────────────────────────────────────

    pub fn get(&self, id: ReclamationId) -> EngineResult<Reclamation> {
        self.store()?.require_reclamation(id)
    }

    pub fn list_all(&self) -> EngineResult<Vec<Reclamation>> {
        self.store()?.list_reclamations()
    }

    pub fn list_by_status(&self, status: ReclamationStatus) -> EngineResult<Vec<Reclamation>> {
        self.store()?.reclamations_by_status(status)
    }

    pub fn list_by_complainant(&self, user_id: UserId) -> EngineResult<Vec<Reclamation>> {
        self.store()?.reclamations_by_complainant(user_id)
    }

    pub fn list_by_target(&self, user_id: UserId) -> EngineResult<Vec<Reclamation>> {
        self.store()?.reclamations_by_target(user_id)
    }

    pub fn find_by_booking_and_complainant(
        &self,
        booking_id: BookingId,
        complainant_id: UserId,
    ) -> EngineResult<Option<Reclamation>> {
        self.store()?.first_by_booking_and_complainant(booking_id, complainant_id)
    }

    pub fn stats_for_user(&self, user_id: UserId) -> EngineResult<ReclamationStats> {
        self.store()?.stats_for_user(user_id)
    }

    pub fn status_breakdown(&self) -> EngineResult<StatusBreakdown> {
        self.store()?.status_breakdown()
    }

    pub fn settlements_for(&self, id: ReclamationId) -> EngineResult<Vec<SettlementRecord>> {
        self.store()?.settlements_for(id)
    }

    pub fn failed_settlements(&self) -> EngineResult<Vec<SettlementRecord>> {
        self.store()?.failed_settlements()
    }

    pub fn events_for(&self, id: ReclamationId) -> EngineResult<Vec<DisputeEvent>> {
        self.store()?
            .events_for(id)?
            .iter()
            .map(|entry| entry.decode().map_err(EngineError::from))
            .collect()
    }
}

fn settlement_event(record: &SettlementRecord) -> DisputeEvent {
    DisputeEvent::SettlementAttempted {
        reclamation_id: record.reclamation_id,
        plan_id:        record.plan_id.clone(),
        party:          record.party,
        recipient:      record.recipient.clone(),
        amount:         record.amount,
        pool:           record.pool,
        tx_id:          record.tx_id.clone(),
        error:          record.error.clone(),
    }
}
