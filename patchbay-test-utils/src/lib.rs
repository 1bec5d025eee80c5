//! PATCHBAY Test Utilities
//!
//! Centralized test infrastructure for the PATCHBAY workspace:
//! - Fixtures for common profile/route/override scenarios
//! - Proptest generators for entity types
//! - Custom assertions for PATCHBAY-specific invariants

// Re-export the in-memory store from its source crate
pub use patchbay_storage::MemoryStore;

// Re-export core types for convenience
pub use patchbay_core::{
    new_entity_id, Alias, AliasKind, BinderId, EngineError, EntityType, FieldKind,
    FieldValue, PatchbayConfig, PatchbayError, PatchbayResult, Profile, ProfileId,
    ResolvedRoute, Route, RouteField, RouteId, RouteOverride, RoutePatch, RouteSource,
    RouteStatus, StorageError, Timestamp, ValidationError,
};

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Ready-made entities for common test scenarios.

    use super::*;

    /// A non-default profile in the "global" scope.
    pub fn global_profile(name: &str) -> Profile {
        Profile::new(name, "global")
    }

    /// The scope's default profile.
    pub fn default_profile(name: &str, scope: &str) -> Profile {
        let mut profile = Profile::new(name, scope);
        profile.is_default = true;
        profile
    }

    /// A route with plausible topology values at the given ordinal.
    pub fn topology_route(profile_id: ProfileId, ordinal: i32) -> Route {
        let unit = (ordinal + 1) / 2;
        let slot = ((ordinal - 1) % 2) + 1;
        let mut route = Route::new(profile_id, ordinal);
        route.source_mux = 1;
        route.source_sub = ordinal;
        route.encoder_vendor = "ateme".to_string();
        route.encoder_unit = unit;
        route.encoder_slot = slot;
        route.encoder_input_label = format!("S{slot}");
        route.circuit_label = format!("TX {unit}.{slot}");
        route.protocol = "srt".to_string();
        route.endpoint = format!("239.10.0.{ordinal}:5004");
        route.receiver_vendor = "ateme".to_string();
        route.receiver_unit = unit;
        route.destination_label = format!("MCR {ordinal}");
        route
    }

    /// An override moving a route's status from Healthy to Down.
    pub fn status_override(binder_id: BinderId, route_id: RouteId) -> RouteOverride {
        let mut ov = RouteOverride::new(binder_id, route_id);
        ov.record(
            RouteField::Status,
            FieldValue::Status(RouteStatus::Healthy),
            FieldValue::Status(RouteStatus::Down),
        );
        ov
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating PATCHBAY entity types.

    use super::*;
    use proptest::prelude::*;
    use uuid::Uuid;

    /// Generate a random UUID (for generic ID generation).
    pub fn arb_uuid() -> impl Strategy<Value = Uuid> {
        any::<[u8; 16]>().prop_map(Uuid::from_bytes)
    }

    /// Generate a route status.
    pub fn arb_route_status() -> impl Strategy<Value = RouteStatus> {
        prop_oneof![
            Just(RouteStatus::Healthy),
            Just(RouteStatus::Warn),
            Just(RouteStatus::Down),
            Just(RouteStatus::Unknown),
        ]
    }

    /// Generate an alias kind.
    pub fn arb_alias_kind() -> impl Strategy<Value = AliasKind> {
        prop_oneof![
            Just(AliasKind::Production),
            Just(AliasKind::Technical),
            Just(AliasKind::Truck),
            Just(AliasKind::MatrixName),
        ]
    }

    /// Generate a resolution mode.
    pub fn arb_route_source() -> impl Strategy<Value = RouteSource> {
        prop_oneof![
            Just(RouteSource::UseDefault),
            Just(RouteSource::UseProfile),
            Just(RouteSource::ForkProfile),
            Just(RouteSource::Custom),
        ]
    }

    /// Generate any settable route field.
    pub fn arb_route_field() -> impl Strategy<Value = RouteField> {
        prop_oneof![
            Just(RouteField::SourceMux),
            Just(RouteField::SourceSub),
            Just(RouteField::EncoderVendor),
            Just(RouteField::EncoderUnit),
            Just(RouteField::EncoderSlot),
            Just(RouteField::EncoderInputLabel),
            Just(RouteField::CircuitLabel),
            Just(RouteField::Protocol),
            Just(RouteField::Endpoint),
            Just(RouteField::ReceiverVendor),
            Just(RouteField::ReceiverUnit),
            Just(RouteField::DestinationLabel),
            Just(RouteField::Status),
        ]
    }

    /// Generate a value whose kind matches the given field.
    pub fn arb_value_for(field: RouteField) -> BoxedStrategy<FieldValue> {
        match field.kind() {
            FieldKind::Int => (0i32..1000).prop_map(FieldValue::Int).boxed(),
            FieldKind::Text => "[a-z0-9 ]{0,16}".prop_map(FieldValue::Text).boxed(),
            FieldKind::Status => arb_route_status().prop_map(FieldValue::Status).boxed(),
        }
    }

    /// Generate a (field, value) pair of matching kind.
    pub fn arb_field_edit() -> impl Strategy<Value = (RouteField, FieldValue)> {
        arb_route_field().prop_flat_map(|field| {
            arb_value_for(field).prop_map(move |value| (field, value))
        })
    }

    /// Generate a route at a random ordinal under a random profile.
    pub fn arb_route() -> impl Strategy<Value = Route> {
        (arb_uuid(), 1i32..=64, arb_route_status()).prop_map(
            |(profile_id, ordinal, status)| {
                let mut route = fixtures::topology_route(profile_id, ordinal);
                route.status = status;
                route
            },
        )
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Custom assertions for PATCHBAY-specific invariants.

    use super::*;

    /// Assert that a result failed with `NotFound` for the given entity type.
    pub fn assert_not_found<T: std::fmt::Debug>(
        result: &PatchbayResult<T>,
        entity_type: EntityType,
    ) {
        match result {
            Err(PatchbayError::Storage(StorageError::NotFound {
                entity_type: got, ..
            })) => assert_eq!(*got, entity_type),
            other => panic!("expected NotFound({entity_type:?}), got {other:?}"),
        }
    }

    /// Assert that exactly one profile in the slice is flagged default.
    pub fn assert_single_default(profiles: &[Profile]) {
        let defaults = profiles.iter().filter(|p| p.is_default).count();
        assert_eq!(
            defaults, 1,
            "expected exactly one default profile, found {defaults}"
        );
    }

    /// Assert that at most one profile in the slice is flagged default.
    pub fn assert_at_most_one_default(profiles: &[Profile]) {
        let defaults = profiles.iter().filter(|p| p.is_default).count();
        assert!(
            defaults <= 1,
            "expected at most one default profile, found {defaults}"
        );
    }

    /// Assert that route ordinals form a contiguous 1..N sequence.
    pub fn assert_contiguous_ordinals(routes: &[Route]) {
        let ordinals: Vec<i32> = routes.iter().map(|r| r.ordinal).collect();
        let expected: Vec<i32> = (1..=routes.len() as i32).collect();
        assert_eq!(ordinals, expected, "ordinals not contiguous 1..N");
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use patchbay_storage::StorageTrait;
    use proptest::prelude::*;

    #[test]
    fn test_default_profile_fixture() {
        let profile = fixtures::default_profile("Main", "venue-1");
        assert!(profile.is_default);
        assert_eq!(profile.scope, "venue-1");
    }

    #[test]
    fn test_topology_route_fixture_matches_packing() {
        let route = fixtures::topology_route(new_entity_id(), 5);
        assert_eq!(route.encoder_unit, 3);
        assert_eq!(route.encoder_slot, 1);
        assert_eq!(route.circuit_label, "TX 3.1");
    }

    #[test]
    fn test_status_override_fixture() {
        let ov = fixtures::status_override(new_entity_id(), new_entity_id());
        assert_eq!(ov.overridden_fields(), vec![RouteField::Status]);
        assert_eq!(
            ov.after.get(&RouteField::Status),
            Some(&FieldValue::Status(RouteStatus::Down))
        );
    }

    #[tokio::test]
    async fn test_assert_not_found_matches_store_error() {
        let store = MemoryStore::new();
        let result = store.profile_delete(new_entity_id()).await;
        assertions::assert_not_found(&result, EntityType::Profile);
    }

    #[test]
    fn test_assert_single_default() {
        let profiles = vec![
            fixtures::default_profile("A", "global"),
            fixtures::global_profile("B"),
        ];
        assertions::assert_single_default(&profiles);
        assertions::assert_at_most_one_default(&profiles);
    }

    #[test]
    #[should_panic(expected = "expected exactly one default")]
    fn test_assert_single_default_panics_on_two() {
        let profiles = vec![
            fixtures::default_profile("A", "global"),
            fixtures::default_profile("B", "global"),
        ];
        assertions::assert_single_default(&profiles);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn prop_generated_edit_kinds_match((field, value) in generators::arb_field_edit()) {
            prop_assert_eq!(field.kind(), value.kind());
        }

        #[test]
        fn prop_generated_route_is_appliable(route in generators::arb_route(), (field, value) in generators::arb_field_edit()) {
            let mut route = route;
            prop_assert!(route.apply_value(field, &value).is_ok());
            prop_assert_eq!(route.value_of(field), value);
        }
    }
}
