//! services/journal_api/src/adapters/identity.rs
//!
//! This module contains the adapter for the identity provider (Firebase Identity
//! Toolkit over REST). It implements the `IdentityService` port from the `core` crate.
//!
//! The credential (id token + refresh token) is cached in memory and persisted under
//! `auth/credential` in the device store so a restart resumes the session. An
//! expired id token is refreshed at most once per call.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use mood_journal_core::{
    ports::{DeviceStore, IdentityError, IdentityResult, IdentityService},
    UserSession,
};
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Device key holding the persisted credential.
pub const CREDENTIAL_KEY: &str = "auth/credential";

/// Id tokens this close to expiry are refreshed before use.
const EXPIRY_SLACK_SECS: i64 = 60;

//=========================================================================================
// Wire Types
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Credential {
    user: UserSession,
    id_token: String,
    refresh_token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthReply {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    id_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<String>,
}

#[derive(Deserialize)]
struct LookupReply {
    #[serde(default)]
    users: Vec<LookupUser>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupUser {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
}

#[derive(Deserialize)]
struct RefreshReply {
    id_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<String>,
}

#[derive(Deserialize)]
struct ErrorReply {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

fn expires_at(expires_in: Option<&str>) -> DateTime<Utc> {
    let secs = expires_in.and_then(|s| s.parse::<i64>().ok()).unwrap_or(3600);
    Utc::now() + ChronoDuration::seconds(secs)
}

/// Maps a provider error code such as `WEAK_PASSWORD : Password should be...`.
pub(crate) fn map_error_code(message: &str) -> IdentityError {
    let code = message
        .split(|c: char| c == ' ' || c == ':')
        .next()
        .unwrap_or_default();
    match code {
        "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" | "INVALID_EMAIL"
        | "MISSING_PASSWORD" => IdentityError::InvalidCredential,
        "EMAIL_EXISTS" => IdentityError::EmailInUse,
        "WEAK_PASSWORD" => IdentityError::WeakPassword,
        "EMAIL_NOT_FOUND" | "USER_NOT_FOUND" => IdentityError::UserNotFound,
        "USER_DISABLED" => IdentityError::UserDisabled,
        "TOO_MANY_ATTEMPTS_TRY_LATER" => IdentityError::TooManyRequests,
        "TOKEN_EXPIRED" | "INVALID_ID_TOKEN" | "INVALID_REFRESH_TOKEN"
        | "CREDENTIAL_TOO_OLD_LOGIN_AGAIN" => IdentityError::SessionExpired,
        _ => IdentityError::Other(message.to_string()),
    }
}

fn network(e: reqwest::Error) -> IdentityError {
    IdentityError::NetworkFailure(e.to_string())
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

pub struct FirebaseIdentityAdapter {
    http: reqwest::Client,
    api_key: String,
    identity_base_url: String,
    token_base_url: String,
    device: Arc<dyn DeviceStore>,
    credential: Mutex<Option<Credential>>,
    loaded: AtomicBool,
}

impl FirebaseIdentityAdapter {
    pub fn new(
        api_key: String,
        identity_base_url: String,
        token_base_url: String,
        device: Arc<dyn DeviceStore>,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            http,
            api_key,
            identity_base_url: identity_base_url.trim_end_matches('/').to_string(),
            token_base_url: token_base_url.trim_end_matches('/').to_string(),
            device,
            credential: Mutex::new(None),
            loaded: AtomicBool::new(false),
        })
    }

    fn accounts_url(&self, method: &str) -> String {
        format!("{}/accounts:{}?key={}", self.identity_base_url, method, self.api_key)
    }

    async fn post<B: Serialize + Sync, R: DeserializeOwned>(
        &self,
        url: String,
        body: &B,
    ) -> IdentityResult<R> {
        let response = self.http.post(url).json(body).send().await.map_err(network)?;
        let status = response.status();
        if status.is_success() {
            return response
                .json::<R>()
                .await
                .map_err(|e| IdentityError::Other(format!("Unreadable provider reply: {}", e)));
        }

        let text = response.text().await.unwrap_or_default();
        Err(match serde_json::from_str::<ErrorReply>(&text) {
            Ok(reply) => map_error_code(&reply.error.message),
            Err(_) if status.as_u16() == 429 => IdentityError::TooManyRequests,
            Err(_) => IdentityError::Other(format!("Provider returned {}", status)),
        })
    }

    //=====================================================================================
    // Credential Cache
    //=====================================================================================

    async fn credential(&self) -> Option<Credential> {
        if !self.loaded.load(Ordering::Acquire) {
            let stored = match self.device.get(CREDENTIAL_KEY).await {
                Ok(Some(bytes)) => serde_json::from_slice::<Credential>(&bytes)
                    .map_err(|e| warn!("Discarding unreadable credential: {}", e))
                    .ok(),
                Ok(None) => None,
                Err(e) => {
                    warn!("Failed to read stored credential: {}", e);
                    None
                }
            };
            {
                let mut slot = self.credential.lock();
                if !self.loaded.swap(true, Ordering::AcqRel) {
                    *slot = stored;
                }
            }
        }
        self.credential.lock().clone()
    }

    async fn store(&self, credential: Credential) {
        let bytes = serde_json::to_vec(&credential);
        {
            *self.credential.lock() = Some(credential);
            self.loaded.store(true, Ordering::Release);
        }
        match bytes {
            Ok(bytes) => {
                if let Err(e) = self.device.set(CREDENTIAL_KEY, &bytes).await {
                    warn!("Failed to persist credential: {}", e);
                }
            }
            Err(e) => warn!("Failed to encode credential: {}", e),
        }
    }

    async fn clear(&self) -> IdentityResult<()> {
        {
            *self.credential.lock() = None;
            self.loaded.store(true, Ordering::Release);
        }
        self.device
            .remove(CREDENTIAL_KEY)
            .await
            .map_err(|e| IdentityError::Other(e.to_string()))
    }

    async fn refresh(&self, credential: &Credential) -> IdentityResult<Credential> {
        debug!("Refreshing id token for {}.", credential.user.user_id);
        let reply: RefreshReply = self
            .post(
                format!("{}/token?key={}", self.token_base_url, self.api_key),
                &json!({
                    "grant_type": "refresh_token",
                    "refresh_token": credential.refresh_token,
                }),
            )
            .await?;
        let fresh = Credential {
            user: credential.user.clone(),
            id_token: reply.id_token,
            refresh_token: reply.refresh_token,
            expires_at: expires_at(reply.expires_in.as_deref()),
        };
        self.store(fresh.clone()).await;
        Ok(fresh)
    }

    /// Runs `call` with a valid id token, refreshing once if the provider rejects it.
    async fn authed<T, F, Fut>(&self, call: F) -> IdentityResult<T>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = IdentityResult<T>>,
    {
        let mut credential = self.credential().await.ok_or(IdentityError::SessionExpired)?;
        let mut refreshed = false;
        if credential.expires_at <= Utc::now() + ChronoDuration::seconds(EXPIRY_SLACK_SECS) {
            credential = self.refresh(&credential).await?;
            refreshed = true;
        }

        match call(credential.id_token.clone()).await {
            Err(IdentityError::SessionExpired) if !refreshed => {
                let fresh = self.refresh(&credential).await?;
                call(fresh.id_token).await
            }
            other => other,
        }
    }

    async fn lookup(&self, id_token: String) -> IdentityResult<UserSession> {
        let reply: LookupReply = self
            .post(self.accounts_url("lookup"), &json!({ "idToken": id_token }))
            .await?;
        let user = reply
            .users
            .into_iter()
            .next()
            .ok_or(IdentityError::UserNotFound)?;
        Ok(UserSession {
            user_id: user.local_id,
            email: user.email.unwrap_or_default(),
            email_verified: user.email_verified,
        })
    }

    // Exchanges email and password for a credential and stores it.
    async fn authenticate(&self, method: &str, email: &str, password: &str) -> IdentityResult<UserSession> {
        let reply: AuthReply = self
            .post(
                self.accounts_url(method),
                &json!({ "email": email, "password": password, "returnSecureToken": true }),
            )
            .await?;

        let credential = Credential {
            user: UserSession {
                user_id: reply.local_id,
                email: reply.email.unwrap_or_else(|| email.to_string()),
                email_verified: false,
            },
            id_token: reply.id_token,
            refresh_token: reply.refresh_token,
            expires_at: expires_at(reply.expires_in.as_deref()),
        };
        let user = credential.user.clone();
        self.store(credential).await;
        Ok(user)
    }

    async fn update_user(&self, user: &UserSession) {
        let updated = {
            let mut slot = self.credential.lock();
            match slot.as_mut() {
                Some(credential) if credential.user != *user => {
                    credential.user = user.clone();
                    Some(credential.clone())
                }
                _ => None,
            }
        };
        if let Some(credential) = updated {
            self.store(credential).await;
        }
    }
}

//=========================================================================================
// `IdentityService` Trait Implementation
//=========================================================================================

#[async_trait]
impl IdentityService for FirebaseIdentityAdapter {
    /// Signs in, then reads the verified flag. The credential is kept even when
    /// that read fails; the user is reported unverified until the next reload.
    async fn sign_in(&self, email: &str, password: &str) -> IdentityResult<UserSession> {
        let user = self.authenticate("signInWithPassword", email, password).await?;
        let id_token = match self.credential().await {
            Some(credential) => credential.id_token,
            None => return Ok(user),
        };
        match self.lookup(id_token).await {
            Ok(current) => {
                self.update_user(&current).await;
                Ok(current)
            }
            Err(e) => {
                warn!("Could not read verification state after sign-in: {}", e);
                Ok(user)
            }
        }
    }

    /// New accounts are always unverified, so no lookup follows.
    async fn sign_up(&self, email: &str, password: &str) -> IdentityResult<UserSession> {
        let user = self.authenticate("signUp", email, password).await?;
        info!("Created account {}.", user.user_id);
        Ok(user)
    }

    /// The provider keeps no server-side session, so signing out drops the credential.
    async fn sign_out(&self) -> IdentityResult<()> {
        self.clear().await
    }

    async fn send_verification_email(&self) -> IdentityResult<()> {
        self.authed(|id_token| async move {
            self.post::<_, serde_json::Value>(
                self.accounts_url("sendOobCode"),
                &json!({ "requestType": "VERIFY_EMAIL", "idToken": id_token }),
            )
            .await
            .map(|_| ())
        })
        .await
    }

    async fn reload_user(&self) -> IdentityResult<Option<UserSession>> {
        if self.credential().await.is_none() {
            return Ok(None);
        }
        match self.authed(|id_token| self.lookup(id_token)).await {
            Ok(user) => {
                self.update_user(&user).await;
                Ok(Some(user))
            }
            Err(
                IdentityError::SessionExpired
                | IdentityError::UserNotFound
                | IdentityError::UserDisabled,
            ) => {
                info!("Stored credential is no longer valid.");
                self.clear().await?;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn send_password_reset(&self, email: &str) -> IdentityResult<()> {
        self.post::<_, serde_json::Value>(
            self.accounts_url("sendOobCode"),
            &json!({ "requestType": "PASSWORD_RESET", "email": email }),
        )
        .await
        .map(|_| ())
    }

    async fn current_user(&self) -> IdentityResult<Option<UserSession>> {
        Ok(self.credential().await.map(|c| c.user))
    }
}
