//! Collaborator contracts the engine consumes, plus in-memory
//! implementations used by the scenario runner and the tests.
//!
//! RULE: the engine never talks to the booking service, the user database
//! or the payment contract directly. Everything crosses one of these traits.

use crate::{
    error::{EngineError, EngineResult},
    types::{BookingId, Money, PropertyId, UserId, WalletAddress},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

// ── Data crossing the seams ────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    TenantCheckedOut,
    Completed,
    Cancelled,
}

/// Financial facts about a booking, as reported by the booking directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingFacts {
    pub booking_id:     BookingId,
    /// The guest who booked.
    pub renter_id:      UserId,
    pub property_id:    Option<PropertyId>,
    pub rent_total:     Money,
    pub deposit_total:  Money,
    pub status:         BookingStatus,
    #[serde(default)]
    pub active_dispute: bool,
}

/// A user account as seen by the engine. Only `score` and the suspension
/// fields are ever written back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub user_id:           UserId,
    pub wallet_address:    Option<WalletAddress>,
    pub score:             u32,
    #[serde(default)]
    pub is_suspended:      bool,
    #[serde(default)]
    pub suspension_reason: Option<String>,
    #[serde(default)]
    pub suspension_until:  Option<DateTime<Utc>>,
}

impl Account {
    pub fn new(user_id: UserId, wallet_address: Option<&str>) -> Self {
        Self {
            user_id,
            wallet_address: wallet_address.map(String::from),
            score: 100,
            is_suspended: false,
            suspension_reason: None,
            suspension_until: None,
        }
    }
}

/// Which of a booking's two money pools a transfer draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PoolSource {
    Rent,
    Deposit,
}

impl PoolSource {
    pub fn as_str(self) -> &'static str {
        match self {
            PoolSource::Rent => "RENT",
            PoolSource::Deposit => "DEPOSIT",
        }
    }
}

// ── Contracts ──────────────────────────────────────────────────────

pub trait BookingDirectory: Send + Sync {
    fn get(&self, booking_id: BookingId) -> EngineResult<BookingFacts>;

    /// Owner of a property, if the directory knows it.
    fn get_owner(&self, property_id: PropertyId) -> EngineResult<Option<UserId>>;

    fn set_active_dispute(&self, booking_id: BookingId, active: bool) -> EngineResult<()>;

    fn mark_completed(&self, booking_id: BookingId) -> EngineResult<()>;
}

/// A secondary source of property ownership, consulted when the booking
/// directory cannot answer.
pub trait PropertyDirectory: Send + Sync {
    fn owner_of(&self, property_id: PropertyId) -> EngineResult<Option<UserId>>;
}

pub trait AccountDirectory: Send + Sync {
    fn get(&self, user_id: UserId) -> EngineResult<Option<Account>>;

    fn save(&self, account: &Account) -> EngineResult<()>;
}

/// Executes one transfer on the settlement ledger. Returns the ledger's
/// transaction id.
pub trait SettlementExecutor: Send + Sync {
    fn transfer(
        &self,
        booking_id: BookingId,
        recipient: &str,
        amount: Money,
        pool: PoolSource,
    ) -> EngineResult<String>;
}

// ── In-memory implementations ──────────────────────────────────────

fn guard<T>(m: &Mutex<T>) -> EngineResult<MutexGuard<'_, T>> {
    m.lock().map_err(|_| EngineError::LockPoisoned)
}

#[derive(Debug, Default)]
pub struct InMemoryBookings {
    bookings:    Mutex<HashMap<BookingId, BookingFacts>>,
    owners:      Mutex<HashMap<PropertyId, UserId>>,
    unavailable: Mutex<bool>,
}

impl InMemoryBookings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_booking(&self, facts: BookingFacts) -> EngineResult<()> {
        guard(&self.bookings)?.insert(facts.booking_id, facts);
        Ok(())
    }

    pub fn insert_owner(&self, property_id: PropertyId, owner_id: UserId) -> EngineResult<()> {
        guard(&self.owners)?.insert(property_id, owner_id);
        Ok(())
    }

    /// Simulate the service being down: every call fails.
    pub fn set_unavailable(&self, unavailable: bool) -> EngineResult<()> {
        *guard(&self.unavailable)? = unavailable;
        Ok(())
    }

    fn check_available(&self) -> EngineResult<()> {
        if *guard(&self.unavailable)? {
            return Err(EngineError::ResolutionDependency(
                "booking directory unavailable".into(),
            ));
        }
        Ok(())
    }

    pub fn snapshot(&self, booking_id: BookingId) -> EngineResult<Option<BookingFacts>> {
        Ok(guard(&self.bookings)?.get(&booking_id).cloned())
    }
}

impl BookingDirectory for InMemoryBookings {
    fn get(&self, booking_id: BookingId) -> EngineResult<BookingFacts> {
        self.check_available()?;
        guard(&self.bookings)?.get(&booking_id).cloned().ok_or_else(|| {
            EngineError::ResolutionDependency(format!("booking {booking_id} not found"))
        })
    }

    fn get_owner(&self, property_id: PropertyId) -> EngineResult<Option<UserId>> {
        self.check_available()?;
        Ok(guard(&self.owners)?.get(&property_id).copied())
    }

    fn set_active_dispute(&self, booking_id: BookingId, active: bool) -> EngineResult<()> {
        self.check_available()?;
        let mut bookings = guard(&self.bookings)?;
        let facts = bookings.get_mut(&booking_id).ok_or_else(|| {
            EngineError::ResolutionDependency(format!("booking {booking_id} not found"))
        })?;
        facts.active_dispute = active;
        Ok(())
    }

    fn mark_completed(&self, booking_id: BookingId) -> EngineResult<()> {
        self.check_available()?;
        let mut bookings = guard(&self.bookings)?;
        let facts = bookings.get_mut(&booking_id).ok_or_else(|| {
            EngineError::ResolutionDependency(format!("booking {booking_id} not found"))
        })?;
        facts.status = BookingStatus::Completed;
        Ok(())
    }
}

/// Property ownership table standing in for the property service.
#[derive(Debug, Default)]
pub struct InMemoryProperties {
    owners: Mutex<HashMap<PropertyId, UserId>>,
}

impl InMemoryProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_owner(&self, property_id: PropertyId, owner_id: UserId) -> EngineResult<()> {
        guard(&self.owners)?.insert(property_id, owner_id);
        Ok(())
    }
}

impl PropertyDirectory for InMemoryProperties {
    fn owner_of(&self, property_id: PropertyId) -> EngineResult<Option<UserId>> {
        Ok(guard(&self.owners)?.get(&property_id).copied())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryAccounts {
    accounts: Mutex<HashMap<UserId, Account>>,
}

impl InMemoryAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, account: Account) -> EngineResult<()> {
        guard(&self.accounts)?.insert(account.user_id, account);
        Ok(())
    }
}

impl AccountDirectory for InMemoryAccounts {
    fn get(&self, user_id: UserId) -> EngineResult<Option<Account>> {
        Ok(guard(&self.accounts)?.get(&user_id).cloned())
    }

    fn save(&self, account: &Account) -> EngineResult<()> {
        guard(&self.accounts)?.insert(account.user_id, account.clone());
        Ok(())
    }
}

/// One transfer the recording executor was asked to perform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub booking_id: BookingId,
    pub recipient:  WalletAddress,
    pub amount:     Money,
    pub pool:       PoolSource,
    pub tx_id:      Option<String>,
}

/// Executor that records every call and fails transfers to configured
/// recipients. Stands in for the payment contract.
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    transfers:          Mutex<Vec<TransferRecord>>,
    failing_recipients: Mutex<Vec<WalletAddress>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every transfer to `recipient` will be rejected.
    pub fn fail_transfers_to(&self, recipient: &str) -> EngineResult<()> {
        guard(&self.failing_recipients)?.push(recipient.to_string());
        Ok(())
    }

    pub fn transfers(&self) -> EngineResult<Vec<TransferRecord>> {
        Ok(guard(&self.transfers)?.clone())
    }
}

impl SettlementExecutor for RecordingExecutor {
    fn transfer(
        &self,
        booking_id: BookingId,
        recipient: &str,
        amount: Money,
        pool: PoolSource,
    ) -> EngineResult<String> {
        let rejected = guard(&self.failing_recipients)?.iter().any(|r| r == recipient);
        let mut transfers = guard(&self.transfers)?;
        let tx_id = (!rejected).then(|| format!("tx-{booking_id}-{}", transfers.len() + 1));
        transfers.push(TransferRecord {
            booking_id,
            recipient: recipient.to_string(),
            amount,
            pool,
            tx_id: tx_id.clone(),
        });
        tx_id.ok_or_else(|| {
            EngineError::Settlement(format!("transfer to {recipient} rejected by ledger"))
        })
    }
}
