use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{ProfilePatch, ProfileStore};
use crate::error::StoreError;
use crate::failure::FailureInjector;

/// In-memory profile store for tests/dev.
///
/// Patching an unknown user creates an empty profile first.
#[derive(Debug, Default)]
pub struct InMemoryProfileStore {
    profiles: RwLock<HashMap<String, Map<String, Value>>>,
    calls: Mutex<Vec<(String, ProfilePatch)>>,
    failing_users: Mutex<HashMap<String, StoreError>>,
    failures: FailureInjector,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn profile(&self, user_id: &str) -> Option<Map<String, Value>> {
        self.profiles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user_id)
            .cloned()
    }

    pub fn insert_profile(&self, user_id: impl Into<String>, profile: Map<String, Value>) {
        self.profiles
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user_id.into(), profile);
    }

    /// Every `apply_patch` call, in call order, failed ones included.
    pub fn calls(&self) -> Vec<(String, ProfilePatch)> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Reject every patch for `user_id` until [`heal_user`](Self::heal_user).
    pub fn fail_user(&self, user_id: impl Into<String>, error: StoreError) {
        self.failing_users
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user_id.into(), error);
    }

    pub fn heal_user(&self, user_id: &str) {
        self.failing_users
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(user_id);
    }

    pub fn failures(&self) -> &FailureInjector {
        &self.failures
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn apply_patch(&self, user_id: &str, patch: &ProfilePatch) -> Result<(), StoreError> {
        self.calls
            .lock()
            .map_err(|_| StoreError::poisoned())?
            .push((user_id.to_string(), patch.clone()));
        self.failures.check()?;

        if let Some(error) = self
            .failing_users
            .lock()
            .map_err(|_| StoreError::poisoned())?
            .get(user_id)
        {
            return Err(error.clone());
        }

        let mut profiles = self.profiles.write().map_err(|_| StoreError::poisoned())?;
        let mut profile = profiles.get(user_id).cloned().unwrap_or_default();
        patch.apply_to(&mut profile)?;
        profiles.insert(user_id.to_string(), profile);
        Ok(())
    }
}
