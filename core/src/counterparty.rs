//! Counterparty resolution: finds the user a reclamation runs against.
//!
//! GUEST filings target the property owner; HOST filings target the
//! booking's renter. Ownership comes from an ordered list of sources, the
//! first that answers wins. Resolution never fails outward: every failure
//! collapses into `Unresolved` with a reason the caller logs.

use crate::{
    directory::{BookingDirectory, BookingFacts, PropertyDirectory},
    error::{EngineError, EngineResult},
    reclamation::ComplainantRole,
    types::{BookingId, PropertyId, UserId},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CounterpartyResolution {
    Resolved { user_id: UserId },
    Unresolved { reason: String },
}

impl CounterpartyResolution {
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            CounterpartyResolution::Resolved { user_id } => Some(*user_id),
            CounterpartyResolution::Unresolved { .. } => None,
        }
    }

    fn unresolved(reason: impl Into<String>) -> Self {
        CounterpartyResolution::Unresolved { reason: reason.into() }
    }
}

/// One way of answering "who owns this property".
pub trait OwnerSource: Send + Sync {
    fn name(&self) -> &str;

    fn owner_of(&self, property_id: PropertyId) -> EngineResult<Option<UserId>>;
}

/// Primary source: the booking service's ownership endpoint.
pub struct BookingOwnerSource(pub Arc<dyn BookingDirectory>);

impl OwnerSource for BookingOwnerSource {
    fn name(&self) -> &str {
        "booking-directory"
    }

    fn owner_of(&self, property_id: PropertyId) -> EngineResult<Option<UserId>> {
        self.0.get_owner(property_id)
    }
}

/// Secondary source: the property service.
pub struct PropertyOwnerSource(pub Arc<dyn PropertyDirectory>);

impl OwnerSource for PropertyOwnerSource {
    fn name(&self) -> &str {
        "property-directory"
    }

    fn owner_of(&self, property_id: PropertyId) -> EngineResult<Option<UserId>> {
        self.0.owner_of(property_id)
    }
}

pub struct CounterpartyResolver {
    bookings: Arc<dyn BookingDirectory>,
    sources:  Vec<Box<dyn OwnerSource>>,
}

impl CounterpartyResolver {
    pub fn new(bookings: Arc<dyn BookingDirectory>, sources: Vec<Box<dyn OwnerSource>>) -> Self {
        Self { bookings, sources }
    }

    /// Booking directory first, property directory as fallback.
    pub fn standard(
        bookings: Arc<dyn BookingDirectory>,
        properties: Arc<dyn PropertyDirectory>,
    ) -> Self {
        let sources: Vec<Box<dyn OwnerSource>> = vec![
            Box::new(BookingOwnerSource(bookings.clone())),
            Box::new(PropertyOwnerSource(properties)),
        ];
        Self::new(bookings, sources)
    }

    pub fn resolve(&self, booking_id: BookingId, role: ComplainantRole) -> CounterpartyResolution {
        let booking = match self.bookings.get(booking_id) {
            Ok(b) => b,
            Err(e) => {
                log::warn!("booking={booking_id} counterparty lookup failed: {e}");
                return CounterpartyResolution::unresolved(format!("booking lookup failed: {e}"));
            }
        };

        match role {
            ComplainantRole::Host => Self::renter_of(&booking),
            ComplainantRole::Guest => self.owner_of(&booking),
        }
    }

    fn renter_of(booking: &BookingFacts) -> CounterpartyResolution {
        if booking.renter_id <= 0 {
            return CounterpartyResolution::unresolved(format!(
                "booking {} has no valid renter id ({})",
                booking.booking_id, booking.renter_id
            ));
        }
        CounterpartyResolution::Resolved { user_id: booking.renter_id }
    }

    fn owner_of(&self, booking: &BookingFacts) -> CounterpartyResolution {
        let Some(property_id) = booking.property_id else {
            return CounterpartyResolution::unresolved(format!(
                "booking {} has no property reference",
                booking.booking_id
            ));
        };

        let mut failures = Vec::new();
        for source in &self.sources {
            match source.owner_of(property_id) {
                Ok(Some(owner)) if owner > 0 => {
                    log::debug!(
                        "booking={} property={property_id} owner={owner} via {}",
                        booking.booking_id,
                        source.name()
                    );
                    return CounterpartyResolution::Resolved { user_id: owner };
                }
                Ok(Some(owner)) => failures.push(format!("{}: invalid owner id {owner}", source.name())),
                Ok(None) => failures.push(format!("{}: no owner", source.name())),
                Err(e) => {
                    log::warn!(
                        "booking={} property={property_id} {} failed: {e}",
                        booking.booking_id,
                        source.name()
                    );
                    failures.push(format!("{}: {}", source.name(), describe(&e)));
                }
            }
        }

        CounterpartyResolution::unresolved(format!(
            "owner of property {property_id} not found ({})",
            failures.join("; ")
        ))
    }
}

fn describe(e: &EngineError) -> String {
    match e {
        EngineError::ResolutionDependency(msg) => msg.clone(),
        other => other.to_string(),
    }
}
