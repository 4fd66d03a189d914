//! Resolution tests: approval through settlement and reputation.
//!
//! Tests cover: end-to-end approval for guest and host filings, partial
//! settlement failure, missing wallets and accounts, late counterparty
//! resolution, property suspension recommendation, and concurrent resolves.

mod common;

use chrono::Duration;
use common::{
    booking, d, guest_filing, host_filing, start, Harness, BOOKING, GUEST, GUEST_WALLET, HOST,
    HOST_WALLET, PLATFORM_WALLET,
};
use reclamation_core::clock::FixedClock;
use reclamation_core::config::EngineConfig;
use reclamation_core::directory::{
    Account, AccountDirectory, BookingDirectory, BookingFacts, BookingStatus, InMemoryAccounts,
    InMemoryBookings, InMemoryProperties, PoolSource, RecordingExecutor,
};
use reclamation_core::error::{EngineError, EngineResult};
use reclamation_core::event::DisputeEvent;
use reclamation_core::fund_distribution::{DistributionCase, Party};
use reclamation_core::reclamation::{ReclamationStatus, ReclamationType, Severity};
use reclamation_core::reclamation_service::{Collaborators, ReclamationService};
use reclamation_core::reputation_engine::SuspensionChange;
use reclamation_core::types::{BookingId, PropertyId, UserId};
use std::sync::{Arc, Mutex};

/// Guest cleanliness/high on rent 1000.00 and deposit 500.00.
#[test]
fn approved_guest_cleanliness_settles_and_penalises_host() -> EngineResult<()> {
    let h = Harness::new();
    let r = h.service.create_reclamation(guest_filing(ReclamationType::Cleanliness))?;
    h.service.update_severity(r.id, Severity::High)?;
    h.service.review(r.id)?;

    let outcome = h.service.resolve(r.id, true, "photos confirm")?;
    let closed = &outcome.reclamation;
    assert_eq!(closed.status, ReclamationStatus::Resolved);
    assert_eq!(closed.refund_amount, d("825.00"));
    assert_eq!(closed.penalty_points, 5);
    assert_eq!(closed.resolved_at, Some(start()));
    assert_eq!(h.service.get(r.id)?, *closed);

    let transfers: Vec<_> = h
        .executor
        .transfers()?
        .into_iter()
        .map(|t| (t.recipient, t.amount, t.pool))
        .collect();
    assert_eq!(
        transfers,
        vec![
            (GUEST_WALLET.to_string(), d("500.00"), PoolSource::Deposit),
            (GUEST_WALLET.to_string(), d("325.00"), PoolSource::Rent),
            (PLATFORM_WALLET.to_string(), d("32.50"), PoolSource::Rent),
            (HOST_WALLET.to_string(), d("642.50"), PoolSource::Rent),
        ]
    );
    assert!(outcome.settlement.fully_settled());

    let change = outcome.score_change.expect("penalty applied");
    assert_eq!((change.old_score, change.new_score), (100, 95));
    assert_eq!(change.suspension, SuspensionChange::Unchanged);
    assert_eq!(h.accounts.get(HOST)?.unwrap().score, 95);
    assert!(!outcome.property_suspension_recommended);

    let booking = h.bookings.snapshot(BOOKING)?.unwrap();
    assert!(!booking.active_dispute);
    assert_eq!(booking.status, BookingStatus::Completed);
    Ok(())
}

#[test]
fn approved_host_damage_takes_deposit_and_suspends_guest() -> EngineResult<()> {
    let h = Harness::new();
    let r = h.service.create_reclamation(host_filing(ReclamationType::PropertyDamage))?;
    h.service.update_severity(r.id, Severity::Critical)?;

    let outcome = h.service.resolve(r.id, true, "repair invoice")?;
    assert_eq!(outcome.reclamation.refund_amount, d("500.00"));
    assert_eq!(outcome.reclamation.penalty_points, 15);

    let plan = outcome.plan.as_ref().unwrap();
    assert_eq!(plan.case, DistributionCase::HostReclamation);
    assert_eq!(plan.total_to(Party::Host), d("1400.00"));
    assert_eq!(plan.total_to(Party::Platform), d("100.00"));
    assert_eq!(plan.total_to(Party::Guest), d("0"));

    let guest = h.accounts.get(GUEST)?.unwrap();
    assert_eq!(guest.score, 85);
    assert!(guest.is_suspended);
    assert_eq!(guest.suspension_until, Some(start() + Duration::days(7)));
    assert_eq!(
        guest.suspension_reason.as_deref(),
        Some("Moderate score (85-89) - 15 penalty points deducted")
    );
    // Only penalties against a host flag the property.
    assert!(!outcome.property_suspension_recommended);

    let suspended = h.service.events_for(r.id)?.into_iter().find_map(|e| match e {
        DisputeEvent::AccountSuspended { reclamation_id, user_id, until, .. } => {
            Some((reclamation_id, user_id, until))
        }
        _ => None,
    });
    assert_eq!(suspended, Some((r.id, GUEST, Some(start() + Duration::days(7)))));
    Ok(())
}

#[test]
fn heavy_host_penalty_recommends_property_suspension() -> EngineResult<()> {
    let h = Harness::new();
    let r = h.service.create_reclamation(guest_filing(ReclamationType::SafetyHealth))?;
    h.service.update_severity(r.id, Severity::High)?;

    let outcome = h.service.resolve(r.id, true, "gas leak")?;
    assert_eq!(outcome.reclamation.penalty_points, 15);
    assert!(outcome.property_suspension_recommended);

    let recommended = h.service.events_for(r.id)?.into_iter().find_map(|e| match e {
        DisputeEvent::PropertySuspensionRecommended { property_id, penalty_points, .. } => {
            Some((property_id, penalty_points))
        }
        _ => None,
    });
    assert_eq!(recommended, Some((Some(common::PROPERTY), 15)));
    Ok(())
}

#[test]
fn failed_transfer_is_recorded_and_decision_stands() -> EngineResult<()> {
    let h = Harness::new();
    h.executor.fail_transfers_to(HOST_WALLET)?;
    let r = h.service.create_reclamation(guest_filing(ReclamationType::Cleanliness))?;
    h.service.update_severity(r.id, Severity::High)?;

    let outcome = h.service.resolve(r.id, true, "approved")?;
    assert_eq!(h.service.get(r.id)?.status, ReclamationStatus::Resolved);

    // Every instruction was attempted, in order, despite the failure.
    assert_eq!(h.executor.transfers()?.len(), 4);
    assert_eq!(outcome.settlement.records.len(), 4);
    assert!(!outcome.settlement.fully_settled());

    let failed = h.service.failed_settlements()?;
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].party, Party::Host);
    assert_eq!(failed[0].amount, d("642.50"));
    assert_eq!(failed[0].seq, 3);
    assert!(failed[0].error.as_deref().unwrap().contains("rejected"));
    assert_eq!(Some(failed[0].plan_id.clone()), outcome.settlement.plan_id);

    let ledger = h.service.settlements_for(r.id)?;
    assert_eq!(ledger.iter().filter(|s| s.succeeded()).count(), 3);

    // Reputation still follows the decision.
    assert_eq!(h.accounts.get(HOST)?.unwrap().score, 95);
    Ok(())
}

#[test]
fn missing_wallet_fails_only_that_party() -> EngineResult<()> {
    let h = Harness::new();
    h.accounts.insert(Account::new(HOST, None))?;
    let r = h.service.create_reclamation(guest_filing(ReclamationType::Cleanliness))?;
    h.service.update_severity(r.id, Severity::Medium)?;

    let outcome = h.service.resolve(r.id, true, "approved")?;

    let failures: Vec<_> = outcome.settlement.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].party, Party::Host);
    assert_eq!(failures[0].recipient, None);
    assert_eq!(failures[0].error.as_deref(), Some("no wallet for HOST"));
    assert_eq!(h.executor.transfers()?.len(), 3);
    Ok(())
}

#[test]
fn missing_counterparty_account_surfaces_after_decision_is_durable() -> EngineResult<()> {
    let h = Harness::new();
    h.bookings.insert_booking(booking(202, GUEST, Some(602), "400.00", "200.00"))?;
    h.bookings.insert_owner(602, 9)?;

    let mut filing = guest_filing(ReclamationType::AccessIssue);
    filing.booking_id = 202;
    let r = h.service.create_reclamation(filing)?;
    assert_eq!(r.target_user_id, Some(9));

    let err = h.service.resolve(r.id, true, "locked out").unwrap_err();
    assert!(matches!(err, EngineError::AccountNotFound { id: 9 }), "got {err:?}");

    let stored = h.service.get(r.id)?;
    assert_eq!(stored.status, ReclamationStatus::Resolved);
    assert_eq!(stored.refund_amount, d("600.00"));
    assert_eq!(h.service.settlements_for(r.id)?.len(), 2);
    Ok(())
}

#[test]
fn property_is_not_flagged_when_the_host_penalty_cannot_be_applied() -> EngineResult<()> {
    let h = Harness::new();
    h.bookings.insert_booking(booking(202, GUEST, Some(602), "400.00", "200.00"))?;
    h.bookings.insert_owner(602, 9)?;

    let mut filing = guest_filing(ReclamationType::SafetyHealth);
    filing.booking_id = 202;
    let r = h.service.create_reclamation(filing)?;
    h.service.update_severity(r.id, Severity::High)?;

    let err = h.service.resolve(r.id, true, "gas leak").unwrap_err();
    assert!(matches!(err, EngineError::AccountNotFound { id: 9 }), "got {err:?}");
    assert_eq!(h.service.get(r.id)?.penalty_points, 15);

    let flagged = h
        .service
        .events_for(r.id)?
        .iter()
        .any(|e| matches!(e, DisputeEvent::PropertySuspensionRecommended { .. }));
    assert!(!flagged);
    Ok(())
}

#[test]
fn counterparty_is_resolved_late_when_missing_at_filing() -> EngineResult<()> {
    let h = Harness::new();
    h.bookings.set_unavailable(true)?;
    let r = h.service.create_reclamation(guest_filing(ReclamationType::NotAsDescribed))?;
    assert_eq!(r.target_user_id, None);

    h.bookings.set_unavailable(false)?;
    let outcome = h.service.resolve(r.id, true, "no pool")?;

    assert_eq!(outcome.reclamation.target_user_id, Some(HOST));
    assert_eq!(h.service.get(r.id)?.target_user_id, Some(HOST));
    assert_eq!(h.accounts.get(HOST)?.unwrap().score, 90);
    Ok(())
}

#[test]
fn unresolved_counterparty_skips_penalty_but_settles() -> EngineResult<()> {
    let h = Harness::new();
    h.bookings.insert_booking(booking(203, GUEST, None, "300.00", "100.00"))?;
    let mut filing = guest_filing(ReclamationType::Cleanliness);
    filing.booking_id = 203;
    let r = h.service.create_reclamation(filing)?;
    h.service.update_severity(r.id, Severity::Critical)?;

    let outcome = h.service.resolve(r.id, true, "approved anyway")?;
    assert_eq!(outcome.reclamation.penalty_points, 10);

    assert_eq!(outcome.reclamation.status, ReclamationStatus::Resolved);
    assert_eq!(outcome.reclamation.target_user_id, None);
    assert!(outcome.score_change.is_none());
    // Host wallet is unknown, so the host's rent share fails.
    assert!(outcome
        .settlement
        .failures()
        .all(|f| f.party == Party::Host && f.recipient.is_none()));

    let unresolved = h
        .service
        .events_for(r.id)?
        .into_iter()
        .filter(|e| matches!(e, DisputeEvent::CounterpartyUnresolved { .. }))
        .count();
    assert_eq!(unresolved, 2, "one alarm at filing, one at resolution");
    Ok(())
}

#[test]
fn resolution_emits_audit_events_in_order() -> EngineResult<()> {
    let h = Harness::new();
    let r = h.service.create_reclamation(host_filing(ReclamationType::ExtraCleaning))?;
    h.service.resolve(r.id, true, "cleaning invoice")?;

    let kinds: Vec<&str> = h
        .service
        .events_for(r.id)?
        .iter()
        .map(|e| e.event_type())
        .collect();
    assert_eq!(
        kinds,
        vec![
            "reclamation_filed",
            "reclamation_resolved",
            "settlement_attempted",
            "settlement_attempted",
            "settlement_attempted",
            "settlement_attempted",
            "penalty_applied",
        ]
    );
    Ok(())
}

#[test]
fn concurrent_resolves_settle_exactly_once() -> EngineResult<()> {
    let h = Harness::new();
    let r = h.service.create_reclamation(guest_filing(ReclamationType::Cleanliness))?;
    h.service.update_severity(r.id, Severity::High)?;

    let results: Vec<EngineResult<_>> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| s.spawn(|| h.service.resolve(r.id, true, "race")))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let wins = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(EngineError::Conflict(_))))
        .count();
    assert_eq!((wins, conflicts), (1, 7));

    assert_eq!(h.executor.transfers()?.len(), 4);
    assert_eq!(h.accounts.get(HOST)?.unwrap().score, 95);
    Ok(())
}

type Hook = Box<dyn FnOnce() + Send>;

/// Booking directory that runs a one-shot callback inside the next lookup.
struct HookedBookings {
    inner: InMemoryBookings,
    hook:  Mutex<Option<Hook>>,
}

impl BookingDirectory for HookedBookings {
    fn get(&self, booking_id: BookingId) -> EngineResult<BookingFacts> {
        let hook = self.hook.lock().unwrap().take();
        if let Some(hook) = hook {
            hook();
        }
        self.inner.get(booking_id)
    }

    fn get_owner(&self, property_id: PropertyId) -> EngineResult<Option<UserId>> {
        self.inner.get_owner(property_id)
    }

    fn set_active_dispute(&self, booking_id: BookingId, active: bool) -> EngineResult<()> {
        self.inner.set_active_dispute(booking_id, active)
    }

    fn mark_completed(&self, booking_id: BookingId) -> EngineResult<()> {
        self.inner.mark_completed(booking_id)
    }
}

#[test]
fn severity_change_during_resolve_is_a_conflict_not_a_stale_price() -> EngineResult<()> {
    let bookings = Arc::new(HookedBookings { inner: InMemoryBookings::new(), hook: Mutex::new(None) });
    bookings.inner.insert_booking(booking(BOOKING, GUEST, Some(common::PROPERTY), "1000.00", "500.00"))?;
    bookings.inner.insert_owner(common::PROPERTY, HOST)?;
    let accounts = Arc::new(InMemoryAccounts::new());
    accounts.insert(Account::new(GUEST, Some(GUEST_WALLET)))?;
    accounts.insert(Account::new(HOST, Some(HOST_WALLET)))?;
    let executor = Arc::new(RecordingExecutor::new());

    let service = Arc::new(ReclamationService::in_memory(
        Collaborators {
            bookings:   bookings.clone(),
            properties: Arc::new(InMemoryProperties::new()),
            accounts:   accounts.clone(),
            executor:   executor.clone(),
            clock:      Arc::new(FixedClock::new(start())),
        },
        EngineConfig::default_test(),
    )?);

    let r = service.create_reclamation(guest_filing(ReclamationType::Cleanliness))?;
    assert_eq!(r.severity, Severity::Low);

    let adjudicator = service.clone();
    let id = r.id;
    *bookings.hook.lock().unwrap() = Some(Box::new(move || {
        adjudicator.update_severity(id, Severity::Critical).unwrap();
    }));

    let err = service.resolve(r.id, true, "priced at LOW").unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)), "got {err:?}");

    let stored = service.get(r.id)?;
    assert_eq!(stored.status, ReclamationStatus::Open);
    assert_eq!(stored.severity, Severity::Critical);
    assert!(executor.transfers()?.is_empty());
    assert_eq!(accounts.get(HOST)?.unwrap().score, 100);

    let outcome = service.resolve(r.id, true, "priced at CRITICAL")?;
    assert_eq!(outcome.reclamation.severity, Severity::Critical);
    assert_eq!(outcome.reclamation.refund_amount, d("1000.00"));
    assert_eq!(outcome.reclamation.penalty_points, 10);
    Ok(())
}
