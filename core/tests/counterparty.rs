//! Counterparty resolution tests.
//!
//! Tests cover: owner lookup with fallback, renter lookup for host filings,
//! and every failure collapsing into an explicit unresolved outcome.

mod common;

use common::{booking, BOOKING, GUEST, HOST, PROPERTY};
use reclamation_core::counterparty::{
    CounterpartyResolution, CounterpartyResolver, OwnerSource, PropertyOwnerSource,
};
use reclamation_core::directory::{InMemoryBookings, InMemoryProperties};
use reclamation_core::error::{EngineError, EngineResult};
use reclamation_core::reclamation::ComplainantRole;
use reclamation_core::types::{PropertyId, UserId};
use std::sync::Arc;

fn directories() -> (Arc<InMemoryBookings>, Arc<InMemoryProperties>) {
    let bookings = Arc::new(InMemoryBookings::new());
    bookings
        .insert_booking(booking(BOOKING, GUEST, Some(PROPERTY), "1000.00", "500.00"))
        .unwrap();
    (bookings, Arc::new(InMemoryProperties::new()))
}

#[test]
fn guest_filing_resolves_owner_from_booking_directory() -> EngineResult<()> {
    let (bookings, properties) = directories();
    bookings.insert_owner(PROPERTY, HOST)?;
    properties.insert_owner(PROPERTY, 99)?;

    let resolver = CounterpartyResolver::standard(bookings, properties);
    assert_eq!(
        resolver.resolve(BOOKING, ComplainantRole::Guest),
        CounterpartyResolution::Resolved { user_id: HOST }
    );
    Ok(())
}

#[test]
fn owner_falls_back_to_property_directory() -> EngineResult<()> {
    let (bookings, properties) = directories();
    properties.insert_owner(PROPERTY, HOST)?;

    let resolver = CounterpartyResolver::standard(bookings, properties);
    assert_eq!(resolver.resolve(BOOKING, ComplainantRole::Guest).user_id(), Some(HOST));
    Ok(())
}

#[test]
fn host_filing_resolves_renter() {
    let (bookings, properties) = directories();
    let resolver = CounterpartyResolver::standard(bookings, properties);
    assert_eq!(resolver.resolve(BOOKING, ComplainantRole::Host).user_id(), Some(GUEST));
}

#[test]
fn no_owner_anywhere_is_unresolved() {
    let (bookings, properties) = directories();
    let resolver = CounterpartyResolver::standard(bookings, properties);

    match resolver.resolve(BOOKING, ComplainantRole::Guest) {
        CounterpartyResolution::Unresolved { reason } => {
            assert!(reason.contains("booking-directory: no owner"), "{reason}");
            assert!(reason.contains("property-directory: no owner"), "{reason}");
        }
        other => panic!("expected unresolved, got {other:?}"),
    }
}

#[test]
fn missing_booking_or_property_reference_is_unresolved() -> EngineResult<()> {
    let (bookings, properties) = directories();
    bookings.insert_booking(booking(202, GUEST, None, "100.00", "50.00"))?;
    bookings.insert_booking(booking(203, 0, Some(PROPERTY), "100.00", "50.00"))?;
    let resolver = CounterpartyResolver::standard(bookings, properties);

    assert_eq!(resolver.resolve(404, ComplainantRole::Guest).user_id(), None);
    assert_eq!(resolver.resolve(202, ComplainantRole::Guest).user_id(), None);
    // A zero renter id is never passed on as a counterparty.
    assert_eq!(resolver.resolve(203, ComplainantRole::Host).user_id(), None);
    Ok(())
}

#[test]
fn unavailable_booking_service_is_unresolved_not_an_error() -> EngineResult<()> {
    let (bookings, properties) = directories();
    properties.insert_owner(PROPERTY, HOST)?;
    bookings.set_unavailable(true)?;

    let resolver = CounterpartyResolver::standard(bookings, properties);
    assert!(matches!(
        resolver.resolve(BOOKING, ComplainantRole::Guest),
        CounterpartyResolution::Unresolved { .. }
    ));
    Ok(())
}

/// An owner source that always fails, standing in for a dead endpoint.
struct Broken;

impl OwnerSource for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    fn owner_of(&self, _property_id: PropertyId) -> EngineResult<Option<UserId>> {
        Err(EngineError::ResolutionDependency("connection refused".into()))
    }
}

/// Always answers with a sentinel zero.
struct ZeroOwner;

impl OwnerSource for ZeroOwner {
    fn name(&self) -> &str {
        "zero"
    }

    fn owner_of(&self, _property_id: PropertyId) -> EngineResult<Option<UserId>> {
        Ok(Some(0))
    }
}

#[test]
fn sources_are_tried_in_order_first_success_wins() -> EngineResult<()> {
    let (bookings, properties) = directories();
    properties.insert_owner(PROPERTY, HOST)?;

    let sources: Vec<Box<dyn OwnerSource>> = vec![
        Box::new(Broken),
        Box::new(ZeroOwner),
        Box::new(PropertyOwnerSource(properties)),
    ];
    let resolver = CounterpartyResolver::new(bookings, sources);
    assert_eq!(resolver.resolve(BOOKING, ComplainantRole::Guest).user_id(), Some(HOST));
    Ok(())
}

#[test]
fn exhausted_sources_report_each_failure() {
    let (bookings, _) = directories();
    let sources: Vec<Box<dyn OwnerSource>> = vec![Box::new(Broken), Box::new(ZeroOwner)];
    let resolver = CounterpartyResolver::new(bookings, sources);

    let CounterpartyResolution::Unresolved { reason } = resolver.resolve(BOOKING, ComplainantRole::Guest)
    else {
        panic!("expected unresolved");
    };
    assert!(reason.contains("broken: connection refused"), "{reason}");
    assert!(reason.contains("zero: invalid owner id 0"), "{reason}");
}
