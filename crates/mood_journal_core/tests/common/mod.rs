//! Counting test doubles for the core ports.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use mood_journal_core::{
    AudioClip, Emotion, Entry, EntryDraft, EraSample, EraSegmentationService, EraSpan,
    IdentityError, IdentityResult, IdentityService, JournalStore, MonthKey, MonthlyReport,
    MoodClassificationService, MoodScore, PortError, PortResult, ReportGenerationService,
    SpeechToTextService, UserSession,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

//=========================================================================================
// Classification
//=========================================================================================

#[derive(Default)]
pub struct MockClassifier {
    pub fail: AtomicBool,
    pub fail_transcription: AtomicBool,
    pub transcriptions: AtomicUsize,
    pub mood_calls: AtomicUsize,
    pub emotion_calls: AtomicUsize,
    pub era_calls: AtomicUsize,
    pub report_calls: AtomicUsize,
    /// Number of eras each segmentation call returns.
    pub eras_per_call: AtomicUsize,
    /// Entries written to this store while a segmentation call is in flight.
    pub writes_during_segmentation: Mutex<Option<(Arc<JournalStore>, usize)>>,
}

impl MockClassifier {
    pub fn new() -> Self {
        let mock = Self::default();
        mock.eras_per_call.store(3, Ordering::SeqCst);
        mock
    }

    fn check(&self) -> PortResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("service unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl SpeechToTextService for MockClassifier {
    async fn transcribe_audio(&self, _clip: &AudioClip) -> PortResult<String> {
        self.transcriptions.fetch_add(1, Ordering::SeqCst);
        if self.fail_transcription.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("timeout".into()));
        }
        Ok("a quiet walk home".into())
    }
}

#[async_trait]
impl MoodClassificationService for MockClassifier {
    async fn classify_mood(&self, _text: &str) -> PortResult<MoodScore> {
        self.mood_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(MoodScore::new(4).unwrap())
    }

    async fn classify_emotion(&self, _text: &str) -> PortResult<Emotion> {
        self.emotion_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(Emotion {
            label: "content".into(),
            emoji: "🙂".into(),
        })
    }
}

#[async_trait]
impl EraSegmentationService for MockClassifier {
    async fn segment_eras(&self, samples: &[EraSample]) -> PortResult<Vec<EraSpan>> {
        self.era_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let pending = self.writes_during_segmentation.lock().take();
        if let Some((store, n)) = pending {
            for i in 0..n {
                store.add_entry(EntryDraft::text(format!("written meanwhile {i}")));
            }
        }
        let first = samples.first().map(|s| s.date).unwrap_or(NaiveDate::MIN);
        let last = samples.last().map(|s| s.date).unwrap_or(NaiveDate::MIN);
        let n = self.eras_per_call.load(Ordering::SeqCst);
        Ok((0..n)
            .map(|i| EraSpan {
                label: format!("Era {}", i + 1),
                from: first,
                to: last,
                description: None,
            })
            .collect())
    }
}

#[async_trait]
impl ReportGenerationService for MockClassifier {
    async fn generate_monthly_report(
        &self,
        month: MonthKey,
        entries: &[Entry],
    ) -> PortResult<MonthlyReport> {
        self.report_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(MonthlyReport {
            top_triggers: vec![],
            summary: format!("{} entries in {}", entries.len(), month),
        })
    }
}

//=========================================================================================
// Identity
//=========================================================================================

pub fn user(verified: bool) -> UserSession {
    UserSession {
        user_id: "user-1".into(),
        email: "sam@example.com".into(),
        email_verified: verified,
    }
}

#[derive(Default)]
pub struct MockIdentity {
    pub verified: AtomicBool,
    pub signed_in: AtomicBool,
    pub fail_reload: AtomicBool,
    pub fail_sign_in: AtomicBool,
    pub fail_sign_out: AtomicBool,
    pub cached_user: AtomicBool,
    pub gate_reload: AtomicBool,
    pub gate: Notify,
    pub reloads: AtomicUsize,
    pub verification_emails: AtomicUsize,
}

#[async_trait]
impl IdentityService for MockIdentity {
    async fn sign_in(&self, _email: &str, _password: &str) -> IdentityResult<UserSession> {
        if self.fail_sign_in.load(Ordering::SeqCst) {
            return Err(IdentityError::InvalidCredential);
        }
        self.signed_in.store(true, Ordering::SeqCst);
        Ok(user(self.verified.load(Ordering::SeqCst)))
    }

    async fn sign_up(&self, _email: &str, _password: &str) -> IdentityResult<UserSession> {
        self.signed_in.store(true, Ordering::SeqCst);
        Ok(user(false))
    }

    async fn sign_out(&self) -> IdentityResult<()> {
        self.signed_in.store(false, Ordering::SeqCst);
        if self.fail_sign_out.load(Ordering::SeqCst) {
            return Err(IdentityError::NetworkFailure("offline".into()));
        }
        Ok(())
    }

    async fn send_verification_email(&self) -> IdentityResult<()> {
        self.verification_emails.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn reload_user(&self) -> IdentityResult<Option<UserSession>> {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        if self.gate_reload.load(Ordering::SeqCst) {
            self.gate.notified().await;
        }
        if self.fail_reload.load(Ordering::SeqCst) {
            return Err(IdentityError::NetworkFailure("connection reset".into()));
        }
        if !self.signed_in.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(Some(user(self.verified.load(Ordering::SeqCst))))
    }

    async fn send_password_reset(&self, _email: &str) -> IdentityResult<()> {
        Ok(())
    }

    async fn current_user(&self) -> IdentityResult<Option<UserSession>> {
        if self.cached_user.load(Ordering::SeqCst) {
            self.signed_in.store(true, Ordering::SeqCst);
            return Ok(Some(user(false)));
        }
        Ok(None)
    }
}

/// Lets spawned tasks on the current-thread test runtime make progress.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
