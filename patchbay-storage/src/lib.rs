//! PATCHBAY Storage - Storage Trait and In-Memory Implementation
//!
//! Defines the persistence abstraction for profiles, routes, aliases, and
//! override ledgers. Every method is one round trip against the backing
//! store; a failed call commits nothing. `MemoryStore` is the reference
//! implementation, used directly in tests and as the mirror shape a remote
//! backend reconciles into.

use ::async_trait::async_trait;
use patchbay_core::{
    Alias, AliasId, AliasKind, BinderId, EntityType, PatchbayResult, Profile, ProfileId,
    Route, RouteId, RouteOverride, RoutePatch, StorageError,
};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

// ============================================================================
// STORAGE TRAIT
// ============================================================================

/// Async storage trait for PATCHBAY entities.
///
/// Mutating methods return hard `NotFound` errors for dangling references;
/// the read-path degradation to empty lists is the resolution engine's
/// concern, not the store's.
#[async_trait]
pub trait StorageTrait: Send + Sync {
    // === Profile Operations ===

    /// Insert a new profile and return the stored row.
    ///
    /// The store owns the at-most-one-default-per-scope invariant: the
    /// first profile inserted into a scope is stored as its default no
    /// matter what the caller flagged, and an insert claiming `is_default`
    /// while the scope already has a default is rejected. Both checks run
    /// under the same guard as the insert itself.
    async fn profile_insert(&self, p: &Profile) -> PatchbayResult<Profile>;

    /// Get a profile by ID.
    async fn profile_get(&self, id: ProfileId) -> PatchbayResult<Option<Profile>>;

    /// List profiles in a scope, in creation order.
    async fn profile_list_by_scope(&self, scope: &str) -> PatchbayResult<Vec<Profile>>;

    /// Get the scope's current default profile, if any.
    async fn profile_default_for_scope(
        &self,
        scope: &str,
    ) -> PatchbayResult<Option<Profile>>;

    /// Make `id` the only default profile in its scope.
    ///
    /// All-or-nothing: no reader may observe two or zero defaults while the
    /// flag moves.
    async fn profile_set_default(&self, id: ProfileId) -> PatchbayResult<()>;

    /// Delete a profile, cascading to its routes and their aliases.
    ///
    /// If the deleted profile was the scope's default, the first remaining
    /// profile in creation order becomes default; an emptied scope is left
    /// with no default.
    async fn profile_delete(&self, id: ProfileId) -> PatchbayResult<()>;

    // === Route Operations ===

    /// Insert a new route.
    async fn route_insert(&self, r: &Route) -> PatchbayResult<()>;

    /// Get a route by ID.
    async fn route_get(&self, id: RouteId) -> PatchbayResult<Option<Route>>;

    /// List a profile's routes, ordinal ascending.
    async fn route_list_by_profile(
        &self,
        profile_id: ProfileId,
    ) -> PatchbayResult<Vec<Route>>;

    /// Apply a single-field patch to a route.
    async fn route_update(&self, id: RouteId, patch: &RoutePatch) -> PatchbayResult<()>;

    /// Replace all routes of a profile (and their aliases) in one step.
    ///
    /// This is the atomic unit behind route generation: either the old
    /// route set is fully swapped for the new one or nothing changes.
    async fn route_replace_for_profile(
        &self,
        profile_id: ProfileId,
        routes: &[Route],
        aliases: &[Alias],
    ) -> PatchbayResult<()>;

    // === Alias Operations ===

    /// Insert or update the alias of the given kind on a route.
    async fn alias_upsert(
        &self,
        route_id: RouteId,
        kind: AliasKind,
        value: &str,
    ) -> PatchbayResult<Alias>;

    /// List aliases attached to a route.
    async fn alias_list_by_route(&self, route_id: RouteId) -> PatchbayResult<Vec<Alias>>;

    // === Override Ledger Operations ===

    /// Get the override record for a (binder, route) pair.
    async fn override_get(
        &self,
        binder_id: BinderId,
        route_id: RouteId,
    ) -> PatchbayResult<Option<RouteOverride>>;

    /// Insert or replace an override record.
    async fn override_upsert(&self, ov: &RouteOverride) -> PatchbayResult<()>;

    /// List all override records of a binder.
    async fn override_list_by_binder(
        &self,
        binder_id: BinderId,
    ) -> PatchbayResult<Vec<RouteOverride>>;
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

/// In-memory storage over per-table `RwLock`ed maps.
#[derive(Debug, Default)]
pub struct MemoryStore {
    profiles: Arc<RwLock<HashMap<ProfileId, Profile>>>,
    routes: Arc<RwLock<HashMap<RouteId, Route>>>,
    aliases: Arc<RwLock<HashMap<AliasId, Alias>>>,
    overrides: Arc<RwLock<HashMap<(BinderId, RouteId), RouteOverride>>>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all stored data.
    pub fn clear(&self) {
        self.profiles.write().unwrap().clear();
        self.routes.write().unwrap().clear();
        self.aliases.write().unwrap().clear();
        self.overrides.write().unwrap().clear();
    }

    /// Get count of stored profiles.
    pub fn profile_count(&self) -> usize {
        self.profiles.read().unwrap().len()
    }

    /// Get count of stored routes.
    pub fn route_count(&self) -> usize {
        self.routes.read().unwrap().len()
    }

    /// Get count of stored aliases.
    pub fn alias_count(&self) -> usize {
        self.aliases.read().unwrap().len()
    }

    /// Get count of stored override records.
    pub fn override_count(&self) -> usize {
        self.overrides.read().unwrap().len()
    }

    /// First remaining profile of a scope in creation order, for default
    /// re-election. Creation order is (created_at, profile_id); the id
    /// tiebreak keeps the choice deterministic within one timestamp.
    fn elect_default(profiles: &mut HashMap<ProfileId, Profile>, scope: &str) {
        let next = profiles
            .values()
            .filter(|p| p.scope == scope)
            .min_by(|a, b| {
                (a.created_at, a.profile_id).cmp(&(b.created_at, b.profile_id))
            })
            .map(|p| p.profile_id);
        if let Some(id) = next {
            if let Some(p) = profiles.get_mut(&id) {
                p.is_default = true;
            }
        }
    }
}

#[async_trait]
impl StorageTrait for MemoryStore {
    // === Profile Operations ===

    async fn profile_insert(&self, p: &Profile) -> PatchbayResult<Profile> {
        let mut profiles = self
            .profiles
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        if profiles.contains_key(&p.profile_id) {
            return Err(StorageError::InsertFailed {
                entity_type: EntityType::Profile,
                reason: "already exists".to_string(),
            }
            .into());
        }
        let scope_is_empty = !profiles.values().any(|other| other.scope == p.scope);
        let scope_has_default = profiles
            .values()
            .any(|other| other.scope == p.scope && other.is_default);
        if p.is_default && scope_has_default {
            return Err(StorageError::InsertFailed {
                entity_type: EntityType::Profile,
                reason: format!("scope {} already has a default profile", p.scope),
            }
            .into());
        }
        let mut stored = p.clone();
        // First profile in a scope is its default, whatever the caller set.
        if scope_is_empty {
            stored.is_default = true;
        }
        profiles.insert(stored.profile_id, stored.clone());
        Ok(stored)
    }

    async fn profile_get(&self, id: ProfileId) -> PatchbayResult<Option<Profile>> {
        let profiles = self
            .profiles
            .read()
            .map_err(|_| StorageError::LockPoisoned)?;
        Ok(profiles.get(&id).cloned())
    }

    async fn profile_list_by_scope(&self, scope: &str) -> PatchbayResult<Vec<Profile>> {
        let profiles = self
            .profiles
            .read()
            .map_err(|_| StorageError::LockPoisoned)?;
        let mut list: Vec<Profile> = profiles
            .values()
            .filter(|p| p.scope == scope)
            .cloned()
            .collect();
        list.sort_by(|a, b| (a.created_at, a.profile_id).cmp(&(b.created_at, b.profile_id)));
        Ok(list)
    }

    async fn profile_default_for_scope(
        &self,
        scope: &str,
    ) -> PatchbayResult<Option<Profile>> {
        let profiles = self
            .profiles
            .read()
            .map_err(|_| StorageError::LockPoisoned)?;
        Ok(profiles
            .values()
            .find(|p| p.scope == scope && p.is_default)
            .cloned())
    }

    async fn profile_set_default(&self, id: ProfileId) -> PatchbayResult<()> {
        // One write guard across clear-all and set-one keeps the
        // exactly-one-default invariant unobservable mid-flight.
        let mut profiles = self
            .profiles
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        let scope = profiles
            .get(&id)
            .map(|p| p.scope.clone())
            .ok_or(StorageError::NotFound {
                entity_type: EntityType::Profile,
                id,
            })?;
        for p in profiles.values_mut() {
            if p.scope == scope && p.is_default {
                p.is_default = false;
                p.updated_at = chrono::Utc::now();
            }
        }
        if let Some(p) = profiles.get_mut(&id) {
            p.is_default = true;
            p.updated_at = chrono::Utc::now();
        }
        Ok(())
    }

    async fn profile_delete(&self, id: ProfileId) -> PatchbayResult<()> {
        let mut profiles = self
            .profiles
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        let removed = profiles.remove(&id).ok_or(StorageError::NotFound {
            entity_type: EntityType::Profile,
            id,
        })?;

        // Cascade: routes of the profile and their aliases.
        let mut routes = self
            .routes
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        let mut aliases = self
            .aliases
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        let dead_routes: Vec<RouteId> = routes
            .values()
            .filter(|r| r.profile_id == id)
            .map(|r| r.route_id)
            .collect();
        routes.retain(|_, r| r.profile_id != id);
        aliases.retain(|_, a| !dead_routes.contains(&a.route_id));

        if removed.is_default {
            MemoryStore::elect_default(&mut profiles, &removed.scope);
        }
        Ok(())
    }

    // === Route Operations ===

    async fn route_insert(&self, r: &Route) -> PatchbayResult<()> {
        let mut routes = self
            .routes
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        if routes.contains_key(&r.route_id) {
            return Err(StorageError::InsertFailed {
                entity_type: EntityType::Route,
                reason: "already exists".to_string(),
            }
            .into());
        }
        routes.insert(r.route_id, r.clone());
        Ok(())
    }

    async fn route_get(&self, id: RouteId) -> PatchbayResult<Option<Route>> {
        let routes = self
            .routes
            .read()
            .map_err(|_| StorageError::LockPoisoned)?;
        Ok(routes.get(&id).cloned())
    }

    async fn route_list_by_profile(
        &self,
        profile_id: ProfileId,
    ) -> PatchbayResult<Vec<Route>> {
        let routes = self
            .routes
            .read()
            .map_err(|_| StorageError::LockPoisoned)?;
        let mut list: Vec<Route> = routes
            .values()
            .filter(|r| r.profile_id == profile_id)
            .cloned()
            .collect();
        list.sort_by_key(|r| (r.ordinal, r.route_id));
        Ok(list)
    }

    async fn route_update(&self, id: RouteId, patch: &RoutePatch) -> PatchbayResult<()> {
        let mut routes = self
            .routes
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        let route = routes.get_mut(&id).ok_or(StorageError::NotFound {
            entity_type: EntityType::Route,
            id,
        })?;
        route.apply(patch);
        Ok(())
    }

    async fn route_replace_for_profile(
        &self,
        profile_id: ProfileId,
        new_routes: &[Route],
        new_aliases: &[Alias],
    ) -> PatchbayResult<()> {
        {
            let profiles = self
                .profiles
                .read()
                .map_err(|_| StorageError::LockPoisoned)?;
            if !profiles.contains_key(&profile_id) {
                return Err(StorageError::NotFound {
                    entity_type: EntityType::Profile,
                    id: profile_id,
                }
                .into());
            }
        }
        let mut routes = self
            .routes
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        let mut aliases = self
            .aliases
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;

        let dead_routes: Vec<RouteId> = routes
            .values()
            .filter(|r| r.profile_id == profile_id)
            .map(|r| r.route_id)
            .collect();
        routes.retain(|_, r| r.profile_id != profile_id);
        aliases.retain(|_, a| !dead_routes.contains(&a.route_id));

        for r in new_routes {
            routes.insert(r.route_id, r.clone());
        }
        for a in new_aliases {
            aliases.insert(a.alias_id, a.clone());
        }
        Ok(())
    }

    // === Alias Operations ===

    async fn alias_upsert(
        &self,
        route_id: RouteId,
        kind: AliasKind,
        value: &str,
    ) -> PatchbayResult<Alias> {
        {
            let routes = self
                .routes
                .read()
                .map_err(|_| StorageError::LockPoisoned)?;
            if !routes.contains_key(&route_id) {
                return Err(StorageError::NotFound {
                    entity_type: EntityType::Route,
                    id: route_id,
                }
                .into());
            }
        }
        let mut aliases = self
            .aliases
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        if let Some(existing) = aliases
            .values_mut()
            .find(|a| a.route_id == route_id && a.kind == kind)
        {
            existing.value = value.to_string();
            return Ok(existing.clone());
        }
        let alias = Alias::new(route_id, kind, value);
        aliases.insert(alias.alias_id, alias.clone());
        Ok(alias)
    }

    async fn alias_list_by_route(&self, route_id: RouteId) -> PatchbayResult<Vec<Alias>> {
        let aliases = self
            .aliases
            .read()
            .map_err(|_| StorageError::LockPoisoned)?;
        let mut list: Vec<Alias> = aliases
            .values()
            .filter(|a| a.route_id == route_id)
            .cloned()
            .collect();
        list.sort_by_key(|a| a.alias_id);
        Ok(list)
    }

    // === Override Ledger Operations ===

    async fn override_get(
        &self,
        binder_id: BinderId,
        route_id: RouteId,
    ) -> PatchbayResult<Option<RouteOverride>> {
        let overrides = self
            .overrides
            .read()
            .map_err(|_| StorageError::LockPoisoned)?;
        Ok(overrides.get(&(binder_id, route_id)).cloned())
    }

    async fn override_upsert(&self, ov: &RouteOverride) -> PatchbayResult<()> {
        let mut overrides = self
            .overrides
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        overrides.insert((ov.binder_id, ov.route_id), ov.clone());
        Ok(())
    }

    async fn override_list_by_binder(
        &self,
        binder_id: BinderId,
    ) -> PatchbayResult<Vec<RouteOverride>> {
        let overrides = self
            .overrides
            .read()
            .map_err(|_| StorageError::LockPoisoned)?;
        let mut list: Vec<RouteOverride> = overrides
            .values()
            .filter(|ov| ov.binder_id == binder_id)
            .cloned()
            .collect();
        list.sort_by_key(|ov| ov.route_id);
        Ok(list)
    }
}

// ============================================================================
// TESTS
// ============================================================================
