//! PATCHBAY Engine - Route Generation, Resolution, and Promotion
//!
//! The command surface UI collaborators call. Owns no state beyond a store
//! handle and its configuration; every operation is a sequential
//! read-then-write against the store, and a failed round trip commits
//! nothing.

use patchbay_core::{
    Alias, AliasKind, BinderId, EngineError, FieldValue, PatchbayConfig, PatchbayError,
    PatchbayResult, Profile, ProfileId, ResolvedRoute, Route, RouteField, RouteId,
    RouteOverride, RoutePatch, RouteSource, StorageError, ValidationError,
    EntityType,
};
use patchbay_storage::StorageTrait;
use std::collections::HashMap;
use std::sync::Arc;

// ============================================================================
// SLOT ALLOCATION
// ============================================================================

/// Encoder unit for a channel ordinal: two channels per unit.
pub fn encoder_unit_for(ordinal: i32) -> i32 {
    (ordinal + 1) / 2
}

/// Encoder input slot for a channel ordinal: 1 or 2 within the unit.
pub fn encoder_slot_for(ordinal: i32) -> i32 {
    ((ordinal - 1) % 2) + 1
}

// ============================================================================
// ROUTE ENGINE
// ============================================================================

/// Layered route configuration engine over a storage handle.
pub struct RouteEngine {
    store: Arc<dyn StorageTrait>,
    config: PatchbayConfig,
}

impl RouteEngine {
    /// Create an engine with the default configuration.
    pub fn new(store: Arc<dyn StorageTrait>) -> Self {
        Self {
            store,
            config: PatchbayConfig::default(),
        }
    }

    /// Create an engine with an explicit, validated configuration.
    pub fn with_config(
        store: Arc<dyn StorageTrait>,
        config: PatchbayConfig,
    ) -> PatchbayResult<Self> {
        config.validate()?;
        Ok(Self { store, config })
    }

    /// The profile scope this engine operates in.
    pub fn scope(&self) -> &str {
        &self.config.scope
    }

    // ========================================================================
    // ROUTE GENERATOR
    // ========================================================================

    /// Replace all routes of `profile_id` with a canonical topology for
    /// `channel_count` channels.
    ///
    /// Destructive and idempotent at the profile level: the previous route
    /// set (and its aliases) is dropped in the same store call that inserts
    /// the new one, so a failure leaves the old set intact and a retry is
    /// safe. Each generated route gets one MatrixName alias.
    pub async fn generate_routes(
        &self,
        profile_id: ProfileId,
        channel_count: i32,
    ) -> PatchbayResult<Vec<Route>> {
        if channel_count < 1 {
            return Err(ValidationError::InvalidValue {
                field: "channel_count".to_string(),
                reason: format!("must be >= 1, got {channel_count}"),
            }
            .into());
        }
        if channel_count > self.config.max_channels {
            return Err(ValidationError::InvalidValue {
                field: "channel_count".to_string(),
                reason: format!(
                    "must be <= {}, got {channel_count}",
                    self.config.max_channels
                ),
            }
            .into());
        }
        if self.store.profile_get(profile_id).await?.is_none() {
            return Err(StorageError::NotFound {
                entity_type: EntityType::Profile,
                id: profile_id,
            }
            .into());
        }

        let mut routes = Vec::with_capacity(channel_count as usize);
        let mut aliases = Vec::with_capacity(channel_count as usize);
        for ordinal in 1..=channel_count {
            let unit = encoder_unit_for(ordinal);
            let slot = encoder_slot_for(ordinal);
            let mut route = Route::new(profile_id, ordinal);
            route.encoder_unit = unit;
            route.encoder_slot = slot;
            route.encoder_input_label = format!("S{slot}");
            route.circuit_label = format!("TX {unit}.{slot}");
            aliases.push(Alias::new(
                route.route_id,
                AliasKind::MatrixName,
                format!("Arena {ordinal}"),
            ));
            routes.push(route);
        }

        self.store
            .route_replace_for_profile(profile_id, &routes, &aliases)
            .await?;
        tracing::info!(
            profile_id = %profile_id,
            channel_count,
            "generated route set"
        );
        Ok(routes)
    }

    // ========================================================================
    // PROFILE STORE OPERATIONS
    // ========================================================================

    /// Create a profile in the engine's scope.
    ///
    /// The first profile ever created in the scope becomes its default;
    /// the store decides that atomically at insert.
    pub async fn create_profile(&self, name: &str) -> PatchbayResult<Profile> {
        let profile = self
            .store
            .profile_insert(&Profile::new(name, self.config.scope.clone()))
            .await?;
        tracing::info!(
            profile_id = %profile.profile_id,
            name,
            is_default = profile.is_default,
            "created profile"
        );
        Ok(profile)
    }

    /// Deep-copy a profile: every route (topology and status, ordinals
    /// verbatim) and every alias, under fresh ids. The copy is never
    /// default.
    pub async fn clone_profile(
        &self,
        source_id: ProfileId,
        new_name: &str,
    ) -> PatchbayResult<Profile> {
        let source =
            self.store
                .profile_get(source_id)
                .await?
                .ok_or(StorageError::NotFound {
                    entity_type: EntityType::Profile,
                    id: source_id,
                })?;

        let profile = self
            .store
            .profile_insert(&Profile::new(new_name, source.scope.clone()))
            .await?;

        let source_routes = self.store.route_list_by_profile(source_id).await?;
        let mut routes = Vec::with_capacity(source_routes.len());
        let mut aliases = Vec::new();
        for src in &source_routes {
            let mut copy = src.clone();
            copy.route_id = patchbay_core::new_entity_id();
            copy.profile_id = profile.profile_id;
            for alias in self.store.alias_list_by_route(src.route_id).await? {
                aliases.push(Alias::new(copy.route_id, alias.kind, alias.value));
            }
            routes.push(copy);
        }
        self.store
            .route_replace_for_profile(profile.profile_id, &routes, &aliases)
            .await?;
        tracing::info!(
            source_id = %source_id,
            profile_id = %profile.profile_id,
            routes = routes.len(),
            "cloned profile"
        );
        Ok(profile)
    }

    /// Delete a profile; the store cascades routes and aliases and
    /// re-elects a default if needed.
    pub async fn delete_profile(&self, id: ProfileId) -> PatchbayResult<()> {
        self.store.profile_delete(id).await?;
        tracing::info!(profile_id = %id, "deleted profile");
        Ok(())
    }

    /// Make `id` the scope's only default profile.
    pub async fn set_default_profile(&self, id: ProfileId) -> PatchbayResult<()> {
        self.store.profile_set_default(id).await?;
        tracing::info!(profile_id = %id, "set default profile");
        Ok(())
    }

    // ========================================================================
    // ALIAS AND BASELINE MUTATION
    // ========================================================================

    /// Insert or update the alias of the given kind on a route.
    pub async fn upsert_alias(
        &self,
        route_id: RouteId,
        kind: AliasKind,
        value: &str,
    ) -> PatchbayResult<Alias> {
        self.store.alias_upsert(route_id, kind, value).await
    }

    /// Mutate one field on a baseline route. Independent of the override
    /// ledger, which only tracks binder-level deviations.
    pub async fn update_route_field(
        &self,
        route_id: RouteId,
        patch: RoutePatch,
    ) -> PatchbayResult<()> {
        self.store.route_update(route_id, &patch).await?;
        tracing::debug!(route_id = %route_id, field = %patch.field(), "updated baseline route field");
        Ok(())
    }

    // ========================================================================
    // OVERRIDE LEDGER
    // ========================================================================

    /// Record one binder-level field edit against a baseline route.
    ///
    /// First edit of a field fixes `before`; every edit moves `after`.
    pub async fn record_binder_change(
        &self,
        binder_id: BinderId,
        route_id: RouteId,
        field: RouteField,
        old: FieldValue,
        new: FieldValue,
    ) -> PatchbayResult<RouteOverride> {
        if old.kind() != field.kind() || new.kind() != field.kind() {
            return Err(ValidationError::InvalidValue {
                field: field.as_str().to_string(),
                reason: format!(
                    "expected {:?} values, got {:?} -> {:?}",
                    field.kind(),
                    old.kind(),
                    new.kind()
                ),
            }
            .into());
        }
        if self.store.route_get(route_id).await?.is_none() {
            return Err(StorageError::NotFound {
                entity_type: EntityType::Route,
                id: route_id,
            }
            .into());
        }

        let mut ov = self
            .store
            .override_get(binder_id, route_id)
            .await?
            .unwrap_or_else(|| RouteOverride::new(binder_id, route_id));
        ov.record(field, old, new);
        self.store.override_upsert(&ov).await?;
        tracing::debug!(
            binder_id = %binder_id,
            route_id = %route_id,
            field = %field,
            changed_fields = ov.changed_fields.len(),
            "recorded binder change"
        );
        Ok(ov)
    }

    /// All override records of a binder.
    pub async fn list_binder_overrides(
        &self,
        binder_id: BinderId,
    ) -> PatchbayResult<Vec<RouteOverride>> {
        self.store.override_list_by_binder(binder_id).await
    }

    /// The override record of a (binder, route) pair, if any.
    pub async fn get_binder_override(
        &self,
        binder_id: BinderId,
        route_id: RouteId,
    ) -> PatchbayResult<Option<RouteOverride>> {
        self.store.override_get(binder_id, route_id).await
    }

    // ========================================================================
    // RESOLUTION ENGINE
    // ========================================================================

    /// Compute the route list a binder should see.
    ///
    /// Mode matrix:
    /// - `UseDefault`: the scope's default profile, base values. An
    ///   explicit `source_profile_id` wins when given.
    /// - `UseProfile`: `source_profile_id`, base values.
    /// - `ForkProfile`: `source_profile_id` with the binder's `after`
    ///   values overlaid.
    /// - `Custom`: always empty; the binder's data lives elsewhere.
    ///
    /// A dangling or absent profile reference degrades to an empty list;
    /// this runs on every view of a binder and must not throw. Override
    /// annotations are attached in every profile-backed mode so read-only
    /// views can show what would differ under `ForkProfile`.
    pub async fn resolve_for_binder(
        &self,
        binder_id: BinderId,
        mode: RouteSource,
        source_profile_id: Option<ProfileId>,
    ) -> PatchbayResult<Vec<ResolvedRoute>> {
        let profile_id = match mode {
            RouteSource::Custom => return Ok(Vec::new()),
            RouteSource::UseDefault => match source_profile_id {
                Some(id) => id,
                None => {
                    match self
                        .store
                        .profile_default_for_scope(&self.config.scope)
                        .await?
                    {
                        Some(p) => p.profile_id,
                        None => return Ok(Vec::new()),
                    }
                }
            },
            RouteSource::UseProfile | RouteSource::ForkProfile => {
                match source_profile_id {
                    Some(id) => id,
                    None => return Ok(Vec::new()),
                }
            }
        };

        if self.store.profile_get(profile_id).await?.is_none() {
            tracing::debug!(
                binder_id = %binder_id,
                profile_id = %profile_id,
                "resolution against dangling profile, returning empty"
            );
            return Ok(Vec::new());
        }

        let routes = self.store.route_list_by_profile(profile_id).await?;
        let overrides: HashMap<RouteId, RouteOverride> = self
            .store
            .override_list_by_binder(binder_id)
            .await?
            .into_iter()
            .map(|ov| (ov.route_id, ov))
            .collect();

        let mut resolved = Vec::with_capacity(routes.len());
        for mut route in routes {
            let (is_overridden, overridden_fields) = match overrides.get(&route.route_id)
            {
                Some(ov) => {
                    if mode == RouteSource::ForkProfile {
                        for (field, value) in &ov.after {
                            route
                                .apply_value(*field, value)
                                .map_err(PatchbayError::Validation)?;
                        }
                    }
                    (true, ov.overridden_fields())
                }
                None => (false, Vec::new()),
            };
            resolved.push(ResolvedRoute {
                route,
                is_overridden,
                overridden_fields,
            });
        }
        Ok(resolved)
    }

    // ========================================================================
    // FORK / PROMOTE
    // ========================================================================

    /// Promote a binder's fully-resolved view into a new, override-free
    /// baseline profile.
    ///
    /// Fails with `NothingToFork` before any record is written when the
    /// resolved view is empty, so no orphan profile is left behind.
    /// Aliases are not carried over; `clone_profile` is the operation that
    /// copies them.
    pub async fn fork_from_binder(
        &self,
        binder_id: BinderId,
        new_name: &str,
        source_profile_id: ProfileId,
    ) -> PatchbayResult<Profile> {
        let resolved = self
            .resolve_for_binder(binder_id, RouteSource::ForkProfile, Some(source_profile_id))
            .await?;
        if resolved.is_empty() {
            return Err(EngineError::NothingToFork { binder_id }.into());
        }

        // Non-empty view implies the source profile exists.
        let scope = match self.store.profile_get(source_profile_id).await? {
            Some(p) => p.scope,
            None => self.config.scope.clone(),
        };

        let profile = self
            .store
            .profile_insert(&Profile::new(new_name, scope))
            .await?;

        let mut routes = Vec::with_capacity(resolved.len());
        for r in resolved {
            let mut route = r.route;
            route.route_id = patchbay_core::new_entity_id();
            route.profile_id = profile.profile_id;
            routes.push(route);
        }
        self.store
            .route_replace_for_profile(profile.profile_id, &routes, &[])
            .await?;
        tracing::info!(
            binder_id = %binder_id,
            source_profile_id = %source_profile_id,
            profile_id = %profile.profile_id,
            routes = routes.len(),
            "forked binder view into new profile"
        );
        Ok(profile)
    }
}

// ============================================================================
// TESTS
// ============================================================================


// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        /// unit(n) = ceil(n/2), slot(n) = ((n-1) mod 2) + 1, and together
        /// they pack exactly two channels per unit.
        #[test]
        fn prop_slot_allocation(ordinal in 1i32..=1024) {
            let unit = encoder_unit_for(ordinal);
            let slot = encoder_slot_for(ordinal);
            prop_assert_eq!(unit, (ordinal as f64 / 2.0).ceil() as i32);
            prop_assert!(slot == 1 || slot == 2);
            // Inverse mapping recovers the ordinal
            prop_assert_eq!((unit - 1) * 2 + slot, ordinal);
        }
    }
}
