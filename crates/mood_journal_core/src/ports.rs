//! crates/mood_journal_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the device storage, the classification API and the
//! identity provider.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::domain::{
    AudioClip, Emotion, Entry, EraSample, EraSpan, MonthKey, MonthlyReport, MoodScore,
    UserSession,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all non-identity port operations.
/// This abstracts away the specific errors from external services (e.g., storage, network).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Malformed response: {0}")]
    Malformed(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Identity Errors
//=========================================================================================

/// Typed failure codes reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("Invalid email or password")]
    InvalidCredential,
    #[error("Email already in use")]
    EmailInUse,
    #[error("Password is too weak")]
    WeakPassword,
    #[error("User not found")]
    UserNotFound,
    #[error("User disabled")]
    UserDisabled,
    #[error("Too many requests")]
    TooManyRequests,
    #[error("Network failure: {0}")]
    NetworkFailure(String),
    #[error("Session expired")]
    SessionExpired,
    #[error("Identity provider error: {0}")]
    Other(String),
}

/// The only distinction callers have to branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityErrorClass {
    Retryable,
    Fatal,
}

impl IdentityError {
    pub fn class(&self) -> IdentityErrorClass {
        match self {
            IdentityError::TooManyRequests | IdentityError::NetworkFailure(_) => {
                IdentityErrorClass::Retryable
            }
            _ => IdentityErrorClass::Fatal,
        }
    }

    /// A short message suitable for a dismissible banner.
    pub fn user_message(&self) -> &'static str {
        match self {
            IdentityError::InvalidCredential => "That email and password don't match.",
            IdentityError::EmailInUse => "An account with this email already exists.",
            IdentityError::WeakPassword => "Please choose a stronger password.",
            IdentityError::UserNotFound => "No account found for this email.",
            IdentityError::UserDisabled => "This account has been disabled.",
            IdentityError::TooManyRequests => "Too many attempts. Please wait a moment.",
            IdentityError::NetworkFailure(_) => "You appear to be offline.",
            IdentityError::SessionExpired => "Your session expired. Please sign in again.",
            IdentityError::Other(_) => "Something went wrong. Please try again.",
        }
    }
}

pub type IdentityResult<T> = Result<T, IdentityError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// An asynchronous key-value byte store on the device.
#[async_trait]
pub trait DeviceStore: Send + Sync {
    async fn get(&self, key: &str) -> PortResult<Option<Vec<u8>>>;
    async fn set(&self, key: &str, value: &[u8]) -> PortResult<()>;
    async fn remove(&self, key: &str) -> PortResult<()>;
}

#[async_trait]
pub trait SpeechToTextService: Send + Sync {
    /// Transcribes a recorded clip into text.
    async fn transcribe_audio(&self, clip: &AudioClip) -> PortResult<String>;
}

#[async_trait]
pub trait MoodClassificationService: Send + Sync {
    /// Rates the text on the 1-5 mood scale.
    async fn classify_mood(&self, text: &str) -> PortResult<MoodScore>;
    /// Picks a single emotion label and emoji for the text.
    async fn classify_emotion(&self, text: &str) -> PortResult<Emotion>;
}

#[async_trait]
pub trait EraSegmentationService: Send + Sync {
    /// Splits a chronological list of samples into labeled eras.
    async fn segment_eras(&self, samples: &[EraSample]) -> PortResult<Vec<EraSpan>>;
}

#[async_trait]
pub trait ReportGenerationService: Send + Sync {
    /// Summarizes one month of entries.
    async fn generate_monthly_report(
        &self,
        month: MonthKey,
        entries: &[Entry],
    ) -> PortResult<MonthlyReport>;
}

#[async_trait]
pub trait IdentityService: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> IdentityResult<UserSession>;
    async fn sign_up(&self, email: &str, password: &str) -> IdentityResult<UserSession>;
    async fn sign_out(&self) -> IdentityResult<()>;
    async fn send_verification_email(&self) -> IdentityResult<()>;
    /// Re-reads the current user from the provider. `None` means the
    /// credential is gone or was revoked.
    async fn reload_user(&self) -> IdentityResult<Option<UserSession>>;
    async fn send_password_reset(&self, email: &str) -> IdentityResult<()>;
    /// The locally cached user, without a network round trip.
    async fn current_user(&self) -> IdentityResult<Option<UserSession>>;
}

//=========================================================================================
// In-memory Device Store
//=========================================================================================

/// A `DeviceStore` that lives only as long as the process.
#[derive(Default)]
pub struct InMemoryDeviceStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryDeviceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeviceStore for InMemoryDeviceStore {
    async fn get(&self, key: &str) -> PortResult<Option<Vec<u8>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &[u8]) -> PortResult<()> {
        self.entries.write().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn remove(&self, key: &str) -> PortResult<()> {
        self.entries.write().remove(key);
        Ok(())
    }
}
