use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

use super::{Persist, PersistedStore, Storage};
use crate::api::ApiClient;
use crate::models::{User, UserPatch};

/// Sessions are valid for 24 hours after login or the last token refresh
const SESSION_HOURS: i64 = 24;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthState {
    pub user: Option<User>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub is_authenticated: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub session_expiry: Option<DateTime<Utc>>,
}

impl AuthState {
    /// True when there is no session or it has passed its expiry.
    pub fn is_session_expired(&self) -> bool {
        self.session_expiry
            .map(|expiry| Utc::now() > expiry)
            .unwrap_or(true)
    }

    pub fn user_display_name(&self) -> String {
        match &self.user {
            Some(user) => format!("{} {}", user.first_name, user.last_name),
            None => "Guest".to_string(),
        }
    }

    /// Minutes left in the session (for display)
    pub fn minutes_until_expiry(&self) -> i64 {
        self.session_expiry
            .map(|expiry| (expiry - Utc::now()).num_minutes().max(0))
            .unwrap_or(0)
    }
}

fn session_expiry() -> DateTime<Utc> {
    Utc::now() + Duration::hours(SESSION_HOURS)
}

impl Persist for AuthState {
    type Persisted = AuthState;
    const STORAGE_KEY: &'static str = "docket-auth-storage";

    fn persisted(&self) -> AuthState {
        self.clone()
    }

    fn rehydrate(persisted: AuthState) -> Self {
        persisted
    }
}

/// Signed-in identity and tokens. Keeps the gateway's bearer token in step
/// with the stored access token.
pub struct AuthStore {
    store: PersistedStore<AuthState>,
    api: ApiClient,
}

impl AuthStore {
    /// Rehydrate the session. An unexpired session's token is installed on
    /// `api` right away.
    pub fn load(storage: Arc<dyn Storage>, api: ApiClient) -> Self {
        let store = PersistedStore::<AuthState>::load(storage);
        let state = store.snapshot();
        if !state.is_session_expired() {
            let expires_in_minutes = state.minutes_until_expiry();
            if let Some(token) = state.access_token {
                debug!(expires_in_minutes, "Restored session");
                api.set_token(Some(token));
            }
        }
        Self { store, api }
    }

    pub fn snapshot(&self) -> AuthState {
        self.store.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.store.subscribe()
    }

    pub fn set_auth(&self, user: User, access_token: String, refresh_token: Option<String>) {
        self.api.set_token(Some(access_token.clone()));
        self.store.update(|state| {
            state.user = Some(user);
            state.access_token = Some(access_token);
            state.refresh_token = refresh_token;
            state.is_authenticated = true;
            state.last_login_at = Some(Utc::now());
            state.session_expiry = Some(session_expiry());
        });
    }

    /// Merge `patch` into the current user; no-op when signed out.
    pub fn update_user(&self, patch: UserPatch) {
        self.store.update(|state| {
            if let Some(user) = state.user.as_mut() {
                user.apply(patch);
            }
        });
    }

    pub fn clear_auth(&self) {
        self.api.set_token(None);
        self.store.update(|state| *state = AuthState::default());
    }

    /// Replace the access token (and the refresh token when given), extending
    /// the session.
    pub fn set_tokens(&self, access_token: String, refresh_token: Option<String>) {
        self.api.set_token(Some(access_token.clone()));
        self.store.update(|state| {
            state.access_token = Some(access_token);
            if refresh_token.is_some() {
                state.refresh_token = refresh_token;
            }
            state.session_expiry = Some(session_expiry());
        });
    }

    pub fn refresh_session(&self) {
        self.store.update(|state| state.session_expiry = Some(session_expiry()));
    }

    pub fn is_session_expired(&self) -> bool {
        self.store.read_with(AuthState::is_session_expired)
    }

    pub fn is_authenticated(&self) -> bool {
        self.store.read_with(|state| state.is_authenticated)
    }

    pub fn user_display_name(&self) -> String {
        self.store.read_with(AuthState::user_display_name)
    }

    pub fn access_token(&self) -> Option<String> {
        self.store.read_with(|state| state.access_token.clone())
    }
}
