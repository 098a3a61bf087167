use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::info;

use crate::api::{ApiClient, ApiError};
use crate::cache::TtlCache;
use crate::config::Config;
use crate::models::{Credentials, User};
use crate::query::QueryClient;
use crate::store::{AuthStore, FileStorage, FiltersStore, Storage, UiStore};

/// Everything a consumer needs, built once and passed by reference.
pub struct AppContext {
    pub config: Config,
    pub api: ApiClient,
    pub queries: QueryClient,
    pub ttl: TtlCache<Value>,
    pub auth: AuthStore,
    pub ui: UiStore,
    pub filters: FiltersStore,
}

impl AppContext {
    /// Build from `config` with stores persisted under its data directory.
    pub fn from_config(config: Config) -> Result<Self> {
        let storage = Arc::new(FileStorage::new(config.data_dir()?)?);
        Self::new(config, storage)
    }

    pub fn new(config: Config, storage: Arc<dyn Storage>) -> Result<Self> {
        let api = ApiClient::new(&config.api_base_url()?)?;
        Ok(Self::with_api(config, api, storage))
    }

    pub fn with_api(config: Config, api: ApiClient, storage: Arc<dyn Storage>) -> Self {
        let queries = QueryClient::new(config.cache.query_config());
        let ttl = TtlCache::new(config.cache.ttl());
        let auth = AuthStore::load(Arc::clone(&storage), api.clone());
        let ui = UiStore::load(Arc::clone(&storage));
        let filters = FiltersStore::load(storage);
        Self {
            config,
            api,
            queries,
            ttl,
            auth,
            ui,
            filters,
        }
    }

    /// Start the query-cache collector and the TTL sweeper.
    pub fn spawn_maintenance(&self) -> Vec<JoinHandle<()>> {
        let interval = self.config.cache.sweep_interval();
        vec![
            self.queries.spawn_gc(interval),
            self.ttl.spawn_sweeper(interval),
        ]
    }

    /// Authenticate and start a session.
    pub async fn login(&self, email: &str, password: &str) -> Result<User, ApiError> {
        let credentials = Credentials {
            email: email.to_string(),
            password: password.to_string(),
        };
        let response = self.api.login(&credentials).await?;
        let user = response
            .user
            .ok_or_else(|| ApiError::invalid_response("login response has no user"))?;

        self.auth
            .set_auth(user.clone(), response.access_token, response.refresh_token);
        info!(user_id = user.id, "Logged in");
        Ok(user)
    }

    /// End the session and drop everything cached for it.
    pub fn logout(&self) {
        self.auth.clear_auth();
        self.queries.clear();
        self.ttl.clear();
        info!("Logged out");
    }
}
