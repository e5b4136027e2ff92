//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{IdentityConfig, SellerAllowList, StorefrontConfig};
use crate::db::Stores;
use crate::pi::{PiClient, PiError};
use crate::services::identity::{IdentityError, IdentityProvider, PiIdentityClient};
use crate::services::identity_cache::IdentityCache;
use crate::services::roles::RoleResolver;

/// Error creating the application state from configuration.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("identity client: {0}")]
    Identity(#[from] IdentityError),
    #[error("payments client: {0}")]
    Pi(#[from] PiError),
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to the
/// stores, the identity provider and the Pi payments client.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    stores: Stores,
    identity: Arc<dyn IdentityProvider>,
    identity_cache: IdentityCache,
    identity_timeout: Duration,
    roles: RoleResolver,
    pi: PiClient,
}

impl AppState {
    /// Assemble state from already-built parts.
    #[must_use]
    pub fn new(
        stores: Stores,
        identity: Arc<dyn IdentityProvider>,
        pi: PiClient,
        identity_config: &IdentityConfig,
        sellers: SellerAllowList,
    ) -> Self {
        let roles = RoleResolver::new(stores.users.clone(), sellers);

        Self {
            inner: Arc::new(AppStateInner {
                stores,
                identity,
                identity_cache: IdentityCache::new(identity_config.cache_ttl),
                identity_timeout: identity_config.timeout,
                roles,
                pi,
            }),
        }
    }

    /// Build state for the server binary, talking to Pi Network.
    ///
    /// # Errors
    ///
    /// Returns an error if either Pi HTTP client cannot be built.
    pub fn from_config(config: &StorefrontConfig, stores: Stores) -> Result<Self, StateError> {
        let identity = PiIdentityClient::new(&config.pi)?;
        let pi = PiClient::new(&config.pi)?;

        Ok(Self::new(
            stores,
            Arc::new(identity),
            pi,
            &config.identity,
            config.sellers.clone(),
        ))
    }

    #[must_use]
    pub fn stores(&self) -> &Stores {
        &self.inner.stores
    }

    #[must_use]
    pub fn identity_provider(&self) -> &dyn IdentityProvider {
        self.inner.identity.as_ref()
    }

    #[must_use]
    pub fn identity_cache(&self) -> &IdentityCache {
        &self.inner.identity_cache
    }

    /// Upper bound on one identity provider call.
    #[must_use]
    pub fn identity_timeout(&self) -> Duration {
        self.inner.identity_timeout
    }

    #[must_use]
    pub fn roles(&self) -> &RoleResolver {
        &self.inner.roles
    }

    #[must_use]
    pub fn pi(&self) -> &PiClient {
        &self.inner.pi
    }
}
