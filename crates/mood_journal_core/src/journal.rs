//! crates/mood_journal_core/src/journal.rs
//!
//! Orchestrates the classification services around the store: enriching new
//! entries, generating life eras and producing monthly check-ups.
//!
//! Remote failures never block a save. An entry is always stored, with whatever
//! enrichment succeeded, and the failure is published as a store `Notice`.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::{AudioClip, Entry, EntryDraft, EraSample, EraSpan, MonthKey, MonthlyReport, Tags};
use crate::ports::{
    EraSegmentationService, MoodClassificationService, PortError, ReportGenerationService,
    SpeechToTextService,
};
use crate::selectors::{entries_since, in_month};
use crate::store::{JournalStore, Notice};

/// Product thresholds for the insight features.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsightConfig {
    /// Entries required before the first era generation.
    pub min_entries_for_eras: usize,
    /// Entries created since the previous generation required to regenerate.
    pub min_new_entries_for_regeneration: usize,
    pub min_eras: usize,
    pub max_eras: usize,
    pub report_summary_max_words: usize,
}

impl Default for InsightConfig {
    fn default() -> Self {
        Self {
            min_entries_for_eras: 10,
            min_new_entries_for_regeneration: 10,
            min_eras: 2,
            max_eras: 6,
            report_summary_max_words: 120,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InsightError {
    #[error("Need at least {need} entries to generate eras, have {have}")]
    NotEnoughEntries { have: usize, need: usize },
    #[error("Need at least {need} new entries since the last generation, have {have}")]
    NotEnoughNewEntries { have: usize, need: usize },
    #[error("There are no eras to extend yet")]
    NoEras,
    #[error("No entries recorded in {0}")]
    NoEntriesForMonth(MonthKey),
    #[error("Classification unavailable: {0}")]
    Unavailable(#[from] PortError),
}

/// The remote classification capabilities the journal depends on.
#[derive(Clone)]
pub struct ClassificationServices {
    pub speech: Arc<dyn SpeechToTextService>,
    pub mood: Arc<dyn MoodClassificationService>,
    pub eras: Arc<dyn EraSegmentationService>,
    pub reports: Arc<dyn ReportGenerationService>,
}

pub struct Journal {
    store: Arc<JournalStore>,
    services: ClassificationServices,
    config: InsightConfig,
    // One report generation at a time, so a month is never generated twice.
    report_lock: tokio::sync::Mutex<()>,
}

impl Journal {
    pub fn new(
        store: Arc<JournalStore>,
        services: ClassificationServices,
        config: InsightConfig,
    ) -> Self {
        Self {
            store,
            services,
            config,
            report_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<JournalStore> {
        &self.store
    }

    pub fn config(&self) -> &InsightConfig {
        &self.config
    }

    //=====================================================================================
    // Recording
    //=====================================================================================

    /// Classifies the draft's text (mood unless overridden, and emotion) and saves it.
    pub async fn record(&self, mut draft: EntryDraft) -> Entry {
        if !draft.content.trim().is_empty() {
            let text = draft.content.clone();
            let wants_mood = draft.mood.is_none();
            let wants_emotion = draft.emotion.is_none();

            let (mood, emotion) = tokio::join!(
                async {
                    if wants_mood {
                        Some(self.services.mood.classify_mood(&text).await)
                    } else {
                        None
                    }
                },
                async {
                    if wants_emotion {
                        Some(self.services.mood.classify_emotion(&text).await)
                    } else {
                        None
                    }
                },
            );

            match mood {
                Some(Ok(score)) => draft.mood = Some(score),
                Some(Err(e)) => self.classification_unavailable("mood", &e),
                None => {}
            }
            match emotion {
                Some(Ok(emotion)) => draft.emotion = Some(emotion),
                Some(Err(e)) => self.classification_unavailable("emotion", &e),
                None => {}
            }
        }

        let entry = self.store.add_entry(draft);
        info!("Recorded entry {}.", entry.id);
        entry
    }

    /// Transcribes a voice note and records it. A failed transcription still
    /// saves the entry, with an empty transcript.
    pub async fn record_voice(&self, clip: &AudioClip, media_ref: String, tags: Tags) -> Entry {
        let transcript = match self.services.speech.transcribe_audio(clip).await {
            Ok(text) => text,
            Err(e) => {
                self.classification_unavailable("transcription", &e);
                String::new()
            }
        };
        self.record(EntryDraft::voice(transcript, media_ref).with_tags(tags))
            .await
    }

    fn classification_unavailable(&self, what: &str, error: &PortError) {
        warn!("{} classification unavailable: {}", what, error);
        self.store.notify(Notice::ClassificationUnavailable {
            message: format!("{what} unavailable: {error}"),
        });
    }

    //=====================================================================================
    // Eras
    //=====================================================================================

    /// Generates eras from every entry, replacing any existing ones.
    ///
    /// The first generation needs `min_entries_for_eras` entries; a regeneration
    /// needs `min_new_entries_for_regeneration` entries created since the last one.
    /// Returns the number of eras stored.
    pub async fn generate_eras(&self) -> Result<usize, InsightError> {
        let (entries, last_generated) = self
            .store
            .read(|s| (s.entries().to_vec(), s.eras_generated_at()));

        match last_generated {
            None if entries.len() < self.config.min_entries_for_eras => {
                return Err(InsightError::NotEnoughEntries {
                    have: entries.len(),
                    need: self.config.min_entries_for_eras,
                });
            }
            Some(at) => self.require_new_entries(entries_since(&entries, at).len())?,
            None => {}
        }

        let covered_through = newest_created_at(&entries);
        let samples = era_samples(entries.iter());
        let spans = self.segment(&samples).await?;
        let count = spans.len();
        self.store.set_eras(spans, covered_through);
        info!("Generated {} eras from {} entries.", count, samples.len());
        Ok(count)
    }

    /// Segments only the entries written since the last generation and prepends
    /// the resulting eras to the existing ones.
    pub async fn extend_eras(&self) -> Result<usize, InsightError> {
        let (entries, last_generated) = self
            .store
            .read(|s| (s.entries().to_vec(), s.eras_generated_at()));
        let at = last_generated.ok_or(InsightError::NoEras)?;

        let fresh = entries_since(&entries, at);
        self.require_new_entries(fresh.len())?;

        let covered_through = newest_created_at(&entries);
        let samples = era_samples(fresh.into_iter());
        let spans = self.segment(&samples).await?;
        let count = spans.len();
        self.store.add_eras(spans, covered_through);
        info!("Extended eras with {} new eras.", count);
        Ok(count)
    }

    fn require_new_entries(&self, have: usize) -> Result<(), InsightError> {
        let need = self.config.min_new_entries_for_regeneration;
        if have < need {
            return Err(InsightError::NotEnoughNewEntries { have, need });
        }
        Ok(())
    }

    async fn segment(&self, samples: &[EraSample]) -> Result<Vec<EraSpan>, InsightError> {
        self.services
            .eras
            .segment_eras(samples)
            .await
            .map_err(|e| {
                self.classification_unavailable("era", &e);
                InsightError::Unavailable(e)
            })
    }

    //=====================================================================================
    // Monthly Reports
    //=====================================================================================

    /// Returns the report for `month`, generating and caching it when absent.
    pub async fn monthly_report(&self, month: MonthKey) -> Result<MonthlyReport, InsightError> {
        let _guard = self.report_lock.lock().await;

        if let Some(report) = self.store.monthly_report(month) {
            debug!("Serving cached report for {}.", month);
            return Ok(report);
        }

        let mut entries: Vec<Entry> = self
            .store
            .read(|s| in_month(s.entries(), month).into_iter().cloned().collect());
        if entries.is_empty() {
            return Err(InsightError::NoEntriesForMonth(month));
        }
        entries.reverse();

        let report = self
            .services
            .reports
            .generate_monthly_report(month, &entries)
            .await
            .map_err(|e| {
                self.classification_unavailable("report", &e);
                InsightError::Unavailable(e)
            })?;
        self.store.add_monthly_report(month, report.clone());
        info!("Generated monthly report for {}.", month);
        Ok(report)
    }
}

// The generation cut-off: entries created after it are new to the next generation.
fn newest_created_at(entries: &[Entry]) -> DateTime<Utc> {
    entries.first().map_or_else(Utc::now, |e| e.created_at)
}

// Chronological samples for segmentation; entries arrive newest first.
fn era_samples<'a>(entries: impl DoubleEndedIterator<Item = &'a Entry>) -> Vec<EraSample> {
    entries
        .rev()
        .filter(|e| !e.content.trim().is_empty())
        .map(|e| EraSample {
            date: e.day(),
            text: e.content.clone(),
        })
        .collect()
}
