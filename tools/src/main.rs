//! dispute-runner: headless driver for the reclamation engine.
//!
//! Loads an engine config and a JSON scenario (bookings, owners, accounts,
//! filings and decisions), runs it through the service against in-memory
//! collaborators and prints what happened.
//!
//! Usage:
//!   dispute-runner --scenario data/scenario.json
//!   dispute-runner --scenario data/scenario.json --config data/engine_config.json --db run.db

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reclamation_core::{
    clock::{Clock, FixedClock},
    config::EngineConfig,
    directory::{
        Account, AccountDirectory, BookingFacts, InMemoryAccounts, InMemoryBookings,
        InMemoryProperties, RecordingExecutor,
    },
    reclamation::{NewReclamation, ReclamationEdit, Severity},
    reclamation_service::{Collaborators, ReclamationService},
    store::ReclamationStore,
    types::{PropertyId, ReclamationId, UserId},
};
use std::{env, sync::Arc};

#[derive(serde::Deserialize)]
struct Scenario {
    #[serde(default)]
    start:           Option<DateTime<Utc>>,
    bookings:        Vec<BookingFacts>,
    /// Owners known to the booking service.
    #[serde(default)]
    booking_owners:  Vec<Ownership>,
    /// Owners known only to the property service.
    #[serde(default)]
    property_owners: Vec<Ownership>,
    accounts:        Vec<Account>,
    #[serde(default)]
    failing_wallets: Vec<String>,
    steps:           Vec<Step>,
}

#[derive(serde::Deserialize)]
struct Ownership {
    property_id: PropertyId,
    owner_id:    UserId,
}

/// One scenario action. `filing` is the 0-based index of an earlier
/// `file` step.
#[derive(serde::Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum Step {
    File(NewReclamation),
    Review { filing: usize },
    Severity { filing: usize, severity: Severity },
    Update { filing: usize, user_id: UserId, edit: ReclamationEdit },
    Withdraw { filing: usize, user_id: UserId },
    Resolve { filing: usize, approved: bool, #[serde(default)] notes: String },
    AdvanceDays { days: i64 },
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let scenario_path = arg_value(&args, "--scenario").unwrap_or("./data/scenario.json");
    let config_path = arg_value(&args, "--config");
    let db = arg_value(&args, "--db").unwrap_or(":memory:");

    println!("Reclamation engine: dispute-runner");
    println!("  scenario:  {scenario_path}");
    println!("  config:    {}", config_path.unwrap_or("(defaults)"));
    println!("  db:        {db}");
    println!();

    let config = match config_path {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let scenario: Scenario = serde_json::from_str(
        &std::fs::read_to_string(scenario_path)
            .with_context(|| format!("Cannot read {scenario_path}"))?,
    )
    .with_context(|| format!("Cannot parse {scenario_path}"))?;

    let bookings = Arc::new(InMemoryBookings::new());
    for facts in &scenario.bookings {
        bookings.insert_booking(facts.clone())?;
    }
    for o in &scenario.booking_owners {
        bookings.insert_owner(o.property_id, o.owner_id)?;
    }
    let properties = Arc::new(InMemoryProperties::new());
    for o in &scenario.property_owners {
        properties.insert_owner(o.property_id, o.owner_id)?;
    }
    let accounts = Arc::new(InMemoryAccounts::new());
    for account in &scenario.accounts {
        accounts.insert(account.clone())?;
    }
    let executor = Arc::new(RecordingExecutor::new());
    for wallet in &scenario.failing_wallets {
        executor.fail_transfers_to(wallet)?;
    }
    let clock = Arc::new(FixedClock::new(scenario.start.unwrap_or_else(Utc::now)));

    let store = if db == ":memory:" {
        ReclamationStore::in_memory()?
    } else {
        ReclamationStore::open(db)?
    };
    store.migrate()?;

    let service = ReclamationService::new(
        store,
        Collaborators {
            bookings:   bookings.clone(),
            properties,
            accounts:   accounts.clone(),
            executor:   executor.clone(),
            clock:      clock.clone(),
        },
        config,
    );

    let mut filed: Vec<ReclamationId> = Vec::new();
    for (n, step) in scenario.steps.into_iter().enumerate() {
        if let Err(e) = run_step(&service, &clock, &mut filed, step) {
            println!("  step {n:>2}: ERROR {e}");
        }
    }

    println!();
    println!("── Reclamations ──────────────────────────────");
    for r in service.list_all()? {
        println!(
            "  #{:<3} booking={:<4} {:<5} {:<28} {:<8} {:<9} refund={:>9} pts={:<2} target={}",
            r.id,
            r.booking_id,
            r.complainant_role,
            r.reclamation_type,
            r.severity,
            r.status,
            r.refund_amount,
            r.penalty_points,
            r.target_user_id.map_or("-".to_string(), |t| t.to_string()),
        );
    }

    let breakdown = service.status_breakdown()?;
    println!();
    println!(
        "  total={} open={} in_review={} resolved={} rejected={}",
        breakdown.total, breakdown.open, breakdown.in_review, breakdown.resolved, breakdown.rejected
    );

    println!();
    println!("── Transfers ─────────────────────────────────");
    for t in executor.transfers()? {
        println!(
            "  booking={:<4} {:<7} {:>9} -> {:<44} {}",
            t.booking_id,
            t.pool.as_str(),
            t.amount,
            t.recipient,
            t.tx_id.as_deref().unwrap_or("REJECTED"),
        );
    }

    let failed = service.failed_settlements()?;
    if !failed.is_empty() {
        println!();
        println!("── Reconciliation queue ({}) ─────────────────", failed.len());
        for f in failed {
            println!(
                "  plan={} #{} reclamation={} {} {} from {}: {}",
                f.plan_id,
                f.seq,
                f.reclamation_id,
                f.party.as_str(),
                f.amount,
                f.pool.as_str(),
                f.error.as_deref().unwrap_or("no tx id"),
            );
        }
    }

    println!();
    println!("── Accounts ──────────────────────────────────");
    for a in &scenario.accounts {
        if let Some(account) = accounts.get(a.user_id)? {
            println!(
                "  user={:<4} score={:<3} suspended={:<5} until={} {}",
                account.user_id,
                account.score,
                account.is_suspended,
                account.suspension_until.map_or("-".to_string(), |u| u.to_rfc3339()),
                account.suspension_reason.as_deref().unwrap_or(""),
            );
        }
    }

    Ok(())
}

fn run_step(
    service: &ReclamationService,
    clock: &FixedClock,
    filed: &mut Vec<ReclamationId>,
    step: Step,
) -> Result<()> {
    match step {
        Step::File(new) => {
            let r = service.create_reclamation(new)?;
            println!("  filed      #{} booking={} target={:?}", r.id, r.booking_id, r.target_user_id);
            filed.push(r.id);
        }
        Step::Review { filing } => {
            let r = service.review(id_of(filed, filing)?)?;
            println!("  review     #{} -> {}", r.id, r.status);
        }
        Step::Severity { filing, severity } => {
            let r = service.update_severity(id_of(filed, filing)?, severity)?;
            println!("  severity   #{} -> {}", r.id, r.severity);
        }
        Step::Update { filing, user_id, edit } => {
            let r = service.update_reclamation(id_of(filed, filing)?, user_id, edit)?;
            println!("  update     #{} title={:?}", r.id, r.title);
        }
        Step::Withdraw { filing, user_id } => {
            let id = id_of(filed, filing)?;
            service.delete_reclamation(id, user_id)?;
            println!("  withdraw   #{id}");
        }
        Step::Resolve { filing, approved, notes } => {
            let outcome = service.resolve(id_of(filed, filing)?, approved, &notes)?;
            let r = &outcome.reclamation;
            println!(
                "  resolve    #{} -> {} refund={} pts={} settled={}/{}",
                r.id,
                r.status,
                r.refund_amount,
                r.penalty_points,
                outcome.settlement.records.iter().filter(|s| s.succeeded()).count(),
                outcome.settlement.records.len(),
            );
        }
        Step::AdvanceDays { days } => {
            clock.advance_days(days);
            println!("  clock      +{days}d -> {}", clock.now().to_rfc3339());
        }
    }
    Ok(())
}

fn id_of(filed: &[ReclamationId], filing: usize) -> Result<ReclamationId> {
    filed
        .get(filing)
        .copied()
        .with_context(|| format!("no filing #{filing} in scenario"))
}

fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2).find(|w| w[0] == flag).map(|w| w[1].as_str())
}
