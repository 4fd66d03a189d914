//! Shared fixture for the integration tests: one service wired to
//! in-memory collaborators and a pinned clock.

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use reclamation_core::{
    clock::FixedClock,
    config::EngineConfig,
    directory::{
        Account, BookingFacts, BookingStatus, InMemoryAccounts, InMemoryBookings,
        InMemoryProperties, RecordingExecutor,
    },
    reclamation::{ComplainantRole, NewReclamation, ReclamationType},
    reclamation_service::{Collaborators, ReclamationService},
};
use rust_decimal::Decimal;
use std::{str::FromStr, sync::Arc};

pub const GUEST: i64 = 1;
pub const HOST: i64 = 2;
pub const BOOKING: i64 = 101;
pub const PROPERTY: i64 = 501;

pub const GUEST_WALLET: &str = "0xGUEST";
pub const HOST_WALLET: &str = "0xHOST";
pub const PLATFORM_WALLET: &str = "0xPLATFORM";

pub fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 1, 10, 0, 0).unwrap()
}

pub struct Harness {
    pub bookings:   Arc<InMemoryBookings>,
    pub properties: Arc<InMemoryProperties>,
    pub accounts:   Arc<InMemoryAccounts>,
    pub executor:   Arc<RecordingExecutor>,
    pub clock:      Arc<FixedClock>,
    pub service:    ReclamationService,
}

impl Harness {
    /// Booking 101: guest 1 rents property 501 owned by host 2,
    /// rent 1000.00, deposit 500.00. Both users have wallets.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default_test())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();

        let bookings = Arc::new(InMemoryBookings::new());
        bookings.insert_booking(booking(BOOKING, GUEST, Some(PROPERTY), "1000.00", "500.00")).unwrap();
        bookings.insert_owner(PROPERTY, HOST).unwrap();

        let accounts = Arc::new(InMemoryAccounts::new());
        accounts.insert(Account::new(GUEST, Some(GUEST_WALLET))).unwrap();
        accounts.insert(Account::new(HOST, Some(HOST_WALLET))).unwrap();

        let properties = Arc::new(InMemoryProperties::new());
        let executor = Arc::new(RecordingExecutor::new());
        let clock = Arc::new(FixedClock::new(start()));

        let service = ReclamationService::in_memory(
            Collaborators {
                bookings:   bookings.clone(),
                properties: properties.clone(),
                accounts:   accounts.clone(),
                executor:   executor.clone(),
                clock:      clock.clone(),
            },
            config,
        )
        .expect("build test service");

        Self { bookings, properties, accounts, executor, clock, service }
    }
}

pub fn booking(
    booking_id: i64,
    renter_id: i64,
    property_id: Option<i64>,
    rent: &str,
    deposit: &str,
) -> BookingFacts {
    BookingFacts {
        booking_id,
        renter_id,
        property_id,
        rent_total: d(rent),
        deposit_total: d(deposit),
        status: BookingStatus::TenantCheckedOut,
        active_dispute: false,
    }
}

pub fn guest_filing(reclamation_type: ReclamationType) -> NewReclamation {
    NewReclamation {
        booking_id:       BOOKING,
        complainant_id:   GUEST,
        complainant_role: ComplainantRole::Guest,
        reclamation_type,
        title:            "Problem with the stay".into(),
        description:      "Details of what went wrong".into(),
        attachment_count: 1,
    }
}

pub fn host_filing(reclamation_type: ReclamationType) -> NewReclamation {
    NewReclamation {
        booking_id:       BOOKING,
        complainant_id:   HOST,
        complainant_role: ComplainantRole::Host,
        reclamation_type,
        title:            "Guest caused a problem".into(),
        description:      "Details of the damage".into(),
        attachment_count: 0,
    }
}
