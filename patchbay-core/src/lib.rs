//! PATCHBAY Core - Entity Types
//!
//! Pure data structures with no behavior. All other crates depend on this.
//! The only logic living here is field access on routes and the override
//! merge rule, because every storage backend must share them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Entity identifier using UUIDv7 for timestamp-sortable IDs.
/// UUIDv7 embeds a Unix timestamp, making IDs naturally sortable by creation time.
pub type EntityId = Uuid;

/// Identifier of a baseline profile.
pub type ProfileId = EntityId;

/// Identifier of a signal route.
pub type RouteId = EntityId;

/// Identifier of a route alias.
pub type AliasId = EntityId;

/// Identifier of a binder (the consumer whose overrides the ledger tracks).
/// Binders themselves live outside this engine.
pub type BinderId = EntityId;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Generate a new UUIDv7 EntityId (timestamp-sortable).
pub fn new_entity_id() -> EntityId {
    Uuid::now_v7()
}

// ============================================================================
// ENUMS
// ============================================================================

/// Entity type discriminator for errors and polymorphic references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    Profile,
    Route,
    Alias,
    Override,
}

/// Health status of a signal route, mutated independently of topology.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RouteStatus {
    Healthy,
    Warn,
    Down,
    #[default]
    Unknown,
}

/// Kind of secondary name attached to a route.
/// At most one alias of each kind exists per route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AliasKind {
    /// Name used by the production crew
    Production,
    /// Name used by engineering
    Technical,
    /// Name used inside the truck
    Truck,
    /// Name as it appears on the routing matrix
    MatrixName,
}

/// How a binder sources its route list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RouteSource {
    /// Follow the scope's current default profile, base values only
    UseDefault,
    /// Follow a named profile, base values only
    UseProfile,
    /// Follow a named profile with the binder's overrides applied
    ForkProfile,
    /// No profile backing; the binder's routes live outside this engine
    Custom,
}

// ============================================================================
// FIELD MODEL
// ============================================================================

/// Value kind a route field holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    Int,
    Text,
    Status,
}

/// The closed set of settable route fields.
///
/// `Ord` so that override maps iterate deterministically.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum RouteField {
    SourceMux,
    SourceSub,
    EncoderVendor,
    EncoderUnit,
    EncoderSlot,
    EncoderInputLabel,
    CircuitLabel,
    Protocol,
    Endpoint,
    ReceiverVendor,
    ReceiverUnit,
    DestinationLabel,
    Status,
}

impl RouteField {
    /// Value kind this field holds.
    pub fn kind(&self) -> FieldKind {
        match self {
            RouteField::SourceMux
            | RouteField::SourceSub
            | RouteField::EncoderUnit
            | RouteField::EncoderSlot
            | RouteField::ReceiverUnit => FieldKind::Int,
            RouteField::EncoderVendor
            | RouteField::EncoderInputLabel
            | RouteField::CircuitLabel
            | RouteField::Protocol
            | RouteField::Endpoint
            | RouteField::ReceiverVendor
            | RouteField::DestinationLabel => FieldKind::Text,
            RouteField::Status => FieldKind::Status,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RouteField::SourceMux => "source_mux",
            RouteField::SourceSub => "source_sub",
            RouteField::EncoderVendor => "encoder_vendor",
            RouteField::EncoderUnit => "encoder_unit",
            RouteField::EncoderSlot => "encoder_slot",
            RouteField::EncoderInputLabel => "encoder_input_label",
            RouteField::CircuitLabel => "circuit_label",
            RouteField::Protocol => "protocol",
            RouteField::Endpoint => "endpoint",
            RouteField::ReceiverVendor => "receiver_vendor",
            RouteField::ReceiverUnit => "receiver_unit",
            RouteField::DestinationLabel => "destination_label",
            RouteField::Status => "status",
        }
    }
}

impl fmt::Display for RouteField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A route field value, as stored in override ledgers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldValue {
    Int(i32),
    Text(String),
    Status(RouteStatus),
}

impl FieldValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Int(_) => FieldKind::Int,
            FieldValue::Text(_) => FieldKind::Text,
            FieldValue::Status(_) => FieldKind::Status,
        }
    }
}

/// A typed single-field mutation of a route.
///
/// One variant per settable field keeps mutation closed: a caller cannot
/// name a field that does not exist or hand it a value of the wrong kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoutePatch {
    SourceMux(i32),
    SourceSub(i32),
    EncoderVendor(String),
    EncoderUnit(i32),
    EncoderSlot(i32),
    EncoderInputLabel(String),
    CircuitLabel(String),
    Protocol(String),
    Endpoint(String),
    ReceiverVendor(String),
    ReceiverUnit(i32),
    DestinationLabel(String),
    Status(RouteStatus),
}

impl RoutePatch {
    /// The field this patch targets.
    pub fn field(&self) -> RouteField {
        match self {
            RoutePatch::SourceMux(_) => RouteField::SourceMux,
            RoutePatch::SourceSub(_) => RouteField::SourceSub,
            RoutePatch::EncoderVendor(_) => RouteField::EncoderVendor,
            RoutePatch::EncoderUnit(_) => RouteField::EncoderUnit,
            RoutePatch::EncoderSlot(_) => RouteField::EncoderSlot,
            RoutePatch::EncoderInputLabel(_) => RouteField::EncoderInputLabel,
            RoutePatch::CircuitLabel(_) => RouteField::CircuitLabel,
            RoutePatch::Protocol(_) => RouteField::Protocol,
            RoutePatch::Endpoint(_) => RouteField::Endpoint,
            RoutePatch::ReceiverVendor(_) => RouteField::ReceiverVendor,
            RoutePatch::ReceiverUnit(_) => RouteField::ReceiverUnit,
            RoutePatch::DestinationLabel(_) => RouteField::DestinationLabel,
            RoutePatch::Status(_) => RouteField::Status,
        }
    }

    /// The value this patch carries.
    pub fn value(&self) -> FieldValue {
        match self {
            RoutePatch::SourceMux(v)
            | RoutePatch::SourceSub(v)
            | RoutePatch::EncoderUnit(v)
            | RoutePatch::EncoderSlot(v)
            | RoutePatch::ReceiverUnit(v) => FieldValue::Int(*v),
            RoutePatch::EncoderVendor(v)
            | RoutePatch::EncoderInputLabel(v)
            | RoutePatch::CircuitLabel(v)
            | RoutePatch::Protocol(v)
            | RoutePatch::Endpoint(v)
            | RoutePatch::ReceiverVendor(v)
            | RoutePatch::DestinationLabel(v) => FieldValue::Text(v.clone()),
            RoutePatch::Status(v) => FieldValue::Status(*v),
        }
    }
}

// ============================================================================
// CORE ENTITY STRUCTS
// ============================================================================

/// Profile - a named, independently addressable baseline set of routes.
///
/// Within a scope, at most one profile is flagged default at any time;
/// the storage layer enforces that, not callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub profile_id: ProfileId,
    pub name: String,
    pub scope: String,
    pub is_default: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub metadata: Option<serde_json::Value>,
}

impl Profile {
    /// Create a new, non-default profile.
    pub fn new(name: impl Into<String>, scope: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            profile_id: new_entity_id(),
            name: name.into(),
            scope: scope.into(),
            is_default: false,
            created_at: now,
            updated_at: now,
            metadata: None,
        }
    }
}

/// Route - one logical signal channel's topology, belonging to a profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub route_id: RouteId,
    pub profile_id: ProfileId,
    /// Logical channel number; contiguous 1..N after generation.
    pub ordinal: i32,
    pub source_mux: i32,
    pub source_sub: i32,
    pub encoder_vendor: String,
    pub encoder_unit: i32,
    pub encoder_slot: i32,
    pub encoder_input_label: String,
    pub circuit_label: String,
    pub protocol: String,
    pub endpoint: String,
    pub receiver_vendor: String,
    pub receiver_unit: i32,
    pub destination_label: String,
    pub status: RouteStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Route {
    /// Create an empty route at the given ordinal, status `Unknown`.
    pub fn new(profile_id: ProfileId, ordinal: i32) -> Self {
        let now = Utc::now();
        Self {
            route_id: new_entity_id(),
            profile_id,
            ordinal,
            source_mux: 0,
            source_sub: 0,
            encoder_vendor: String::new(),
            encoder_unit: 0,
            encoder_slot: 0,
            encoder_input_label: String::new(),
            circuit_label: String::new(),
            protocol: String::new(),
            endpoint: String::new(),
            receiver_vendor: String::new(),
            receiver_unit: 0,
            destination_label: String::new(),
            status: RouteStatus::Unknown,
            created_at: now,
            updated_at: now,
        }
    }

    /// Current value of a field.
    pub fn value_of(&self, field: RouteField) -> FieldValue {
        match field {
            RouteField::SourceMux => FieldValue::Int(self.source_mux),
            RouteField::SourceSub => FieldValue::Int(self.source_sub),
            RouteField::EncoderVendor => FieldValue::Text(self.encoder_vendor.clone()),
            RouteField::EncoderUnit => FieldValue::Int(self.encoder_unit),
            RouteField::EncoderSlot => FieldValue::Int(self.encoder_slot),
            RouteField::EncoderInputLabel => {
                FieldValue::Text(self.encoder_input_label.clone())
            }
            RouteField::CircuitLabel => FieldValue::Text(self.circuit_label.clone()),
            RouteField::Protocol => FieldValue::Text(self.protocol.clone()),
            RouteField::Endpoint => FieldValue::Text(self.endpoint.clone()),
            RouteField::ReceiverVendor => FieldValue::Text(self.receiver_vendor.clone()),
            RouteField::ReceiverUnit => FieldValue::Int(self.receiver_unit),
            RouteField::DestinationLabel => {
                FieldValue::Text(self.destination_label.clone())
            }
            RouteField::Status => FieldValue::Status(self.status),
        }
    }

    /// Apply a typed patch. Infallible: the patch carries the right kind.
    pub fn apply(&mut self, patch: &RoutePatch) {
        match patch {
            RoutePatch::SourceMux(v) => self.source_mux = *v,
            RoutePatch::SourceSub(v) => self.source_sub = *v,
            RoutePatch::EncoderVendor(v) => self.encoder_vendor = v.clone(),
            RoutePatch::EncoderUnit(v) => self.encoder_unit = *v,
            RoutePatch::EncoderSlot(v) => self.encoder_slot = *v,
            RoutePatch::EncoderInputLabel(v) => self.encoder_input_label = v.clone(),
            RoutePatch::CircuitLabel(v) => self.circuit_label = v.clone(),
            RoutePatch::Protocol(v) => self.protocol = v.clone(),
            RoutePatch::Endpoint(v) => self.endpoint = v.clone(),
            RoutePatch::ReceiverVendor(v) => self.receiver_vendor = v.clone(),
            RoutePatch::ReceiverUnit(v) => self.receiver_unit = *v,
            RoutePatch::DestinationLabel(v) => self.destination_label = v.clone(),
            RoutePatch::Status(v) => self.status = *v,
        }
        self.updated_at = Utc::now();
    }

    /// Apply a loose (field, value) pair, as override ledgers store them.
    /// Rejects a value whose kind does not match the field.
    pub fn apply_value(
        &mut self,
        field: RouteField,
        value: &FieldValue,
    ) -> Result<(), ValidationError> {
        if field.kind() != value.kind() {
            return Err(ValidationError::InvalidValue {
                field: field.as_str().to_string(),
                reason: format!(
                    "expected {:?} value, got {:?}",
                    field.kind(),
                    value.kind()
                ),
            });
        }
        match (field, value) {
            (RouteField::SourceMux, FieldValue::Int(v)) => self.source_mux = *v,
            (RouteField::SourceSub, FieldValue::Int(v)) => self.source_sub = *v,
            (RouteField::EncoderVendor, FieldValue::Text(v)) => {
                self.encoder_vendor = v.clone()
            }
            (RouteField::EncoderUnit, FieldValue::Int(v)) => self.encoder_unit = *v,
            (RouteField::EncoderSlot, FieldValue::Int(v)) => self.encoder_slot = *v,
            (RouteField::EncoderInputLabel, FieldValue::Text(v)) => {
                self.encoder_input_label = v.clone()
            }
            (RouteField::CircuitLabel, FieldValue::Text(v)) => {
                self.circuit_label = v.clone()
            }
            (RouteField::Protocol, FieldValue::Text(v)) => self.protocol = v.clone(),
            (RouteField::Endpoint, FieldValue::Text(v)) => self.endpoint = v.clone(),
            (RouteField::ReceiverVendor, FieldValue::Text(v)) => {
                self.receiver_vendor = v.clone()
            }
            (RouteField::ReceiverUnit, FieldValue::Int(v)) => self.receiver_unit = *v,
            (RouteField::DestinationLabel, FieldValue::Text(v)) => {
                self.destination_label = v.clone()
            }
            (RouteField::Status, FieldValue::Status(v)) => self.status = *v,
            // Kind check above makes the remaining pairs unreachable
            _ => unreachable!("field/value kind mismatch passed the kind check"),
        }
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Alias - a typed secondary name attached to a route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alias {
    pub alias_id: AliasId,
    pub route_id: RouteId,
    pub kind: AliasKind,
    pub value: String,
}

impl Alias {
    pub fn new(route_id: RouteId, kind: AliasKind, value: impl Into<String>) -> Self {
        Self {
            alias_id: new_entity_id(),
            route_id,
            kind,
            value: value.into(),
        }
    }
}

/// RouteOverride - accumulating per-(binder, route) diff record.
///
/// `before[f]` is the baseline value observed at the first edit of `f` and
/// is never overwritten; `after[f]` tracks the latest edit. The record can
/// therefore answer both "what differs from baseline" and "what did the
/// binder type most recently" across repeated edits of the same field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteOverride {
    pub binder_id: BinderId,
    pub route_id: RouteId,
    pub changed_fields: BTreeSet<RouteField>,
    pub before: BTreeMap<RouteField, FieldValue>,
    pub after: BTreeMap<RouteField, FieldValue>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl RouteOverride {
    /// Create an empty override record for a (binder, route) pair.
    pub fn new(binder_id: BinderId, route_id: RouteId) -> Self {
        let now = Utc::now();
        Self {
            binder_id,
            route_id,
            changed_fields: BTreeSet::new(),
            before: BTreeMap::new(),
            after: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Record one field edit.
    ///
    /// First-write-wins on `before`, last-write-wins on `after`.
    pub fn record(&mut self, field: RouteField, old: FieldValue, new: FieldValue) {
        self.changed_fields.insert(field);
        self.before.entry(field).or_insert(old);
        self.after.insert(field, new);
        self.updated_at = Utc::now();
    }

    /// Fields this binder has touched, in deterministic order.
    pub fn overridden_fields(&self) -> Vec<RouteField> {
        self.changed_fields.iter().copied().collect()
    }
}

/// A route as one binder sees it: base or merged values plus override
/// annotations, carried in every profile-backed resolution mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRoute {
    pub route: Route,
    pub is_overridden: bool,
    pub overridden_fields: Vec<RouteField>,
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchbayConfig {
    /// Profile scope this engine operates in.
    pub scope: String,
    /// Upper bound on `channel_count` accepted by route generation.
    pub max_channels: i32,
}

impl Default for PatchbayConfig {
    fn default() -> Self {
        Self {
            scope: "global".to_string(),
            max_channels: 256,
        }
    }
}

impl PatchbayConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> PatchbayResult<()> {
        if self.scope.is_empty() {
            return Err(PatchbayError::Validation(
                ValidationError::RequiredFieldMissing {
                    field: "scope".to_string(),
                },
            ));
        }
        if self.max_channels < 1 {
            return Err(PatchbayError::Validation(ValidationError::InvalidValue {
                field: "max_channels".to_string(),
                reason: format!("must be >= 1, got {}", self.max_channels),
            }));
        }
        Ok(())
    }
}

// ============================================================================
// ERRORS
// ============================================================================

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Entity not found: {entity_type:?} with id {id}")]
    NotFound { entity_type: EntityType, id: Uuid },

    #[error("Insert failed for {entity_type:?}: {reason}")]
    InsertFailed {
        entity_type: EntityType,
        reason: String,
    },

    #[error("Update failed for {entity_type:?} with id {id}: {reason}")]
    UpdateFailed {
        entity_type: EntityType,
        id: Uuid,
        reason: String,
    },

    #[error("Backing store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Validation errors, rejected before any mutation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Constraint violation on {constraint}: {reason}")]
    ConstraintViolation { constraint: String, reason: String },
}

/// Resolution and promotion errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("Nothing to fork for binder {binder_id}: resolved view is empty")]
    NothingToFork { binder_id: Uuid },
}

/// Master error type for all PATCHBAY errors.
#[derive(Debug, Clone, Error)]
pub enum PatchbayError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
}

/// Result type alias for PATCHBAY operations.
pub type PatchbayResult<T> = Result<T, PatchbayError>;

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_entity_id_is_v7() {
        let id = new_entity_id();
        assert_eq!(id.get_version_num(), 7);
    }

    #[test]
    fn test_entity_ids_are_sortable() {
        let id1 = new_entity_id();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let id2 = new_entity_id();
        // UUIDv7 should be lexicographically sortable by time
        assert!(id1.to_string() < id2.to_string());
    }

    #[test]
    fn test_new_route_defaults_to_unknown_status() {
        let route = Route::new(new_entity_id(), 1);
        assert_eq!(route.status, RouteStatus::Unknown);
        assert_eq!(route.ordinal, 1);
    }

    #[test]
    fn test_patch_projects_field_and_value() {
        let patch = RoutePatch::Endpoint("239.1.2.3:5004".to_string());
        assert_eq!(patch.field(), RouteField::Endpoint);
        assert_eq!(
            patch.value(),
            FieldValue::Text("239.1.2.3:5004".to_string())
        );
    }

    #[test]
    fn test_route_apply_patch() {
        let mut route = Route::new(new_entity_id(), 1);
        route.apply(&RoutePatch::EncoderUnit(3));
        route.apply(&RoutePatch::Status(RouteStatus::Healthy));
        assert_eq!(route.encoder_unit, 3);
        assert_eq!(route.status, RouteStatus::Healthy);
        assert_eq!(route.value_of(RouteField::EncoderUnit), FieldValue::Int(3));
    }

    #[test]
    fn test_route_apply_value_rejects_kind_mismatch() {
        let mut route = Route::new(new_entity_id(), 1);
        let err = route
            .apply_value(RouteField::EncoderUnit, &FieldValue::Text("x".to_string()))
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidValue { .. }));
        // Route untouched
        assert_eq!(route.encoder_unit, 0);
    }

    #[test]
    fn test_every_field_round_trips_through_value_of() {
        let mut route = Route::new(new_entity_id(), 7);
        route.source_mux = 2;
        route.encoder_vendor = "ateme".to_string();
        for field in [
            RouteField::SourceMux,
            RouteField::SourceSub,
            RouteField::EncoderVendor,
            RouteField::EncoderUnit,
            RouteField::EncoderSlot,
            RouteField::EncoderInputLabel,
            RouteField::CircuitLabel,
            RouteField::Protocol,
            RouteField::Endpoint,
            RouteField::ReceiverVendor,
            RouteField::ReceiverUnit,
            RouteField::DestinationLabel,
            RouteField::Status,
        ] {
            let value = route.value_of(field);
            assert_eq!(value.kind(), field.kind());
            let mut copy = route.clone();
            copy.apply_value(field, &value).unwrap();
            assert_eq!(copy.value_of(field), value);
        }
    }

    #[test]
    fn test_override_record_first_write_wins_before() {
        let mut ov = RouteOverride::new(new_entity_id(), new_entity_id());
        ov.record(
            RouteField::DestinationLabel,
            FieldValue::Text("A".to_string()),
            FieldValue::Text("B".to_string()),
        );
        ov.record(
            RouteField::DestinationLabel,
            FieldValue::Text("B".to_string()),
            FieldValue::Text("C".to_string()),
        );

        assert_eq!(
            ov.before.get(&RouteField::DestinationLabel),
            Some(&FieldValue::Text("A".to_string()))
        );
        assert_eq!(
            ov.after.get(&RouteField::DestinationLabel),
            Some(&FieldValue::Text("C".to_string()))
        );
        assert_eq!(ov.changed_fields.len(), 1);
    }

    #[test]
    fn test_override_tracks_multiple_fields() {
        let mut ov = RouteOverride::new(new_entity_id(), new_entity_id());
        ov.record(
            RouteField::Status,
            FieldValue::Status(RouteStatus::Healthy),
            FieldValue::Status(RouteStatus::Down),
        );
        ov.record(
            RouteField::Endpoint,
            FieldValue::Text("a".to_string()),
            FieldValue::Text("b".to_string()),
        );
        assert_eq!(
            ov.overridden_fields(),
            vec![RouteField::Endpoint, RouteField::Status]
        );
    }

    #[test]
    fn test_config_default_is_valid() {
        let config = PatchbayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scope, "global");
    }

    #[test]
    fn test_config_rejects_empty_scope() {
        let config = PatchbayConfig {
            scope: String::new(),
            ..PatchbayConfig::default()
        };
        let result = config.validate();
        assert!(matches!(
            result,
            Err(PatchbayError::Validation(
                ValidationError::RequiredFieldMissing { .. }
            ))
        ));
    }

    #[test]
    fn test_storage_error_display_not_found() {
        let err = StorageError::NotFound {
            entity_type: EntityType::Profile,
            id: Uuid::nil(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Entity not found"));
        assert!(msg.contains("Profile"));
        assert!(msg.contains("00000000-0000-0000-0000-000000000000"));
    }

    #[test]
    fn test_error_from_conversions() {
        let storage = PatchbayError::from(StorageError::LockPoisoned);
        assert!(matches!(storage, PatchbayError::Storage(_)));

        let validation = PatchbayError::from(ValidationError::RequiredFieldMissing {
            field: "scope".to_string(),
        });
        assert!(matches!(validation, PatchbayError::Validation(_)));

        let engine = PatchbayError::from(EngineError::NothingToFork {
            binder_id: Uuid::nil(),
        });
        assert!(matches!(engine, PatchbayError::Engine(_)));
    }
}

// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_field_edit() -> impl Strategy<Value = (String, String)> {
        ("[a-z]{1,8}", "[a-z]{1,8}")
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// For any non-empty edit sequence on one field, `before` holds the
        /// first old value and `after` holds the last new value.
        #[test]
        fn prop_override_merge_is_asymmetric(edits in proptest::collection::vec(arb_field_edit(), 1..20)) {
            let mut ov = RouteOverride::new(new_entity_id(), new_entity_id());
            for (old, new) in &edits {
                ov.record(
                    RouteField::DestinationLabel,
                    FieldValue::Text(old.clone()),
                    FieldValue::Text(new.clone()),
                );
            }
            let first_old = edits.first().map(|(old, _)| old.clone()).map(FieldValue::Text);
            let last_new = edits.last().map(|(_, new)| new.clone()).map(FieldValue::Text);
            prop_assert_eq!(ov.before.get(&RouteField::DestinationLabel).cloned(), first_old);
            prop_assert_eq!(ov.after.get(&RouteField::DestinationLabel).cloned(), last_new);
            prop_assert_eq!(ov.changed_fields.len(), 1);
        }

        /// For any max_channels <= 0, validate() rejects the config.
        #[test]
        fn prop_config_rejects_invalid_max_channels(max_channels in i32::MIN..=0) {
            let config = PatchbayConfig {
                scope: "global".to_string(),
                max_channels,
            };
            let result = config.validate();
            prop_assert!(result.is_err());
            if let Err(PatchbayError::Validation(ValidationError::InvalidValue { field, .. })) = result {
                prop_assert_eq!(field, "max_channels");
            } else {
                prop_assert!(false, "Expected ValidationError::InvalidValue");
            }
        }
    }
}
