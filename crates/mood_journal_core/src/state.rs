//! crates/mood_journal_core/src/state.rs
//!
//! The synchronous data container behind `JournalStore`.
//!
//! Every mutation is a `&mut self` method, so callers always apply
//! `new_state = f(old_state)` against the current value. The container also owns
//! the snapshot document format written to the device.

use chrono::{DateTime, Duration, NaiveDate, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

use crate::domain::{
    Entry, EntryDraft, EntryId, Era, EraSpan, MonthKey, MonthlyReport, MoodSample, MoodScore,
    Settings, SettingsPatch,
};

/// Version of the snapshot document this build reads and writes.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("Snapshot is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Snapshot schema version {0} is newer than supported version {}", SCHEMA_VERSION)]
    UnsupportedVersion(u32),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub entries_created: u64,
    pub era_generations: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct JournalState {
    entries: Vec<Entry>,
    moods: Vec<MoodSample>,
    settings: Settings,
    eras: Vec<Era>,
    eras_generated_at: Option<DateTime<Utc>>,
    reports: BTreeMap<MonthKey, MonthlyReport>,
    counters: Counters,
}

//=========================================================================================
// Snapshot Document
//=========================================================================================

#[derive(Serialize)]
struct SnapshotRef<'a> {
    schema_version: u32,
    entries: &'a [Entry],
    moods: &'a [MoodSample],
    settings: &'a Settings,
    eras: &'a [Era],
    eras_generated_at: Option<DateTime<Utc>>,
    reports: &'a BTreeMap<MonthKey, MonthlyReport>,
    counters: &'a Counters,
}

// Documents written before the version field existed deserialize as version 0.
#[derive(Deserialize)]
struct Snapshot {
    #[serde(default)]
    schema_version: u32,
    #[serde(default)]
    entries: Vec<Entry>,
    #[serde(default)]
    moods: Vec<MoodSample>,
    #[serde(default)]
    settings: Settings,
    #[serde(default)]
    eras: Vec<Era>,
    #[serde(default)]
    eras_generated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    reports: BTreeMap<MonthKey, MonthlyReport>,
    #[serde(default)]
    counters: Counters,
}

impl JournalState {
    pub fn to_json(&self) -> Result<Vec<u8>, SnapshotError> {
        let doc = SnapshotRef {
            schema_version: SCHEMA_VERSION,
            entries: &self.entries,
            moods: &self.moods,
            settings: &self.settings,
            eras: &self.eras,
            eras_generated_at: self.eras_generated_at,
            reports: &self.reports,
            counters: &self.counters,
        };
        Ok(serde_json::to_vec(&doc)?)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, SnapshotError> {
        let doc: Snapshot = serde_json::from_slice(bytes)?;
        if doc.schema_version > SCHEMA_VERSION {
            return Err(SnapshotError::UnsupportedVersion(doc.schema_version));
        }
        let mut moods = doc.moods;
        moods.sort_by_key(|m| m.date);
        moods.dedup_by_key(|m| m.date);
        Ok(Self {
            entries: doc.entries,
            moods,
            settings: doc.settings,
            eras: doc.eras,
            eras_generated_at: doc.eras_generated_at,
            reports: doc.reports,
            counters: doc.counters,
        })
    }
}

//=========================================================================================
// Reads
//=========================================================================================

impl JournalState {
    /// All entries, newest first.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn entry(&self, id: EntryId) -> Option<&Entry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Daily samples, oldest first.
    pub fn moods(&self) -> &[MoodSample] {
        &self.moods
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn eras(&self) -> &[Era] {
        &self.eras
    }

    pub fn eras_generated_at(&self) -> Option<DateTime<Utc>> {
        self.eras_generated_at
    }

    pub fn monthly_report(&self, month: MonthKey) -> Option<&MonthlyReport> {
        self.reports.get(&month)
    }

    pub fn reports(&self) -> &BTreeMap<MonthKey, MonthlyReport> {
        &self.reports
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }
}

//=========================================================================================
// Mutations
//=========================================================================================

impl JournalState {
    /// Assigns an id and a creation time, then prepends the entry.
    ///
    /// Creation times strictly increase, so `created_at > t` for the newest entry
    /// seen at `t` selects exactly the entries added afterwards.
    pub fn add_entry(&mut self, draft: EntryDraft, now: DateTime<Utc>) -> Entry {
        let mut id = Uuid::new_v4();
        while self.entry(id).is_some() {
            id = Uuid::new_v4();
        }
        // The snapshot stores milliseconds.
        let mut created_at = now.trunc_subsecs(3);
        if let Some(newest) = self.entries.first() {
            if created_at <= newest.created_at {
                created_at = newest.created_at + Duration::milliseconds(1);
            }
        }
        let entry = Entry {
            id,
            created_at,
            kind: draft.kind,
            content: draft.content,
            mood: draft.mood,
            emotion: draft.emotion,
            tags: draft.tags,
        };
        self.entries.insert(0, entry.clone());
        self.counters.entries_created += 1;
        if entry.mood.is_some() {
            self.refresh_day_sample(entry.day());
        }
        entry
    }

    /// Hard-deletes an entry. Returns `false` when the id is unknown.
    pub fn remove_entry(&mut self, id: EntryId) -> bool {
        let Some(pos) = self.entries.iter().position(|e| e.id == id) else {
            return false;
        };
        let removed = self.entries.remove(pos);
        if removed.mood.is_some() {
            self.refresh_day_sample(removed.day());
        }
        true
    }

    pub fn set_settings(&mut self, patch: SettingsPatch) -> Settings {
        self.settings.merge(patch);
        self.settings.clone()
    }

    /// Writes the calendar sample for a day directly.
    pub fn set_mood(&mut self, date: NaiveDate, score: MoodScore) {
        self.upsert_sample(date, score.get() as f32);
    }

    /// Replaces every era with a freshly stamped list.
    ///
    /// `generated_at` is the creation time of the newest entry the eras cover.
    pub fn set_eras(&mut self, spans: Vec<EraSpan>, generated_at: DateTime<Utc>) {
        self.eras = stamp(spans, generated_at);
        self.mark_generation(generated_at);
    }

    /// Prepends freshly stamped eras to the existing list.
    pub fn add_eras(&mut self, spans: Vec<EraSpan>, generated_at: DateTime<Utc>) {
        let mut eras = stamp(spans, generated_at);
        eras.append(&mut self.eras);
        self.eras = eras;
        self.mark_generation(generated_at);
    }

    /// Flips the `expanded` flag. Returns the new value, or `None` when out of range.
    pub fn toggle_era_expanded(&mut self, index: usize) -> Option<bool> {
        let era = self.eras.get_mut(index)?;
        era.expanded = !era.expanded;
        Some(era.expanded)
    }

    pub fn add_monthly_report(&mut self, month: MonthKey, report: MonthlyReport) {
        self.reports.insert(month, report);
    }

    /// Folds a snapshot that only became readable after startup underneath the
    /// changes made since. Local values win wherever both sides have one.
    pub fn absorb_restored(&mut self, restored: JournalState) {
        let local_ids: HashSet<EntryId> = self.entries.iter().map(|e| e.id).collect();
        let local_days: Vec<NaiveDate> = self
            .entries
            .iter()
            .filter(|e| e.mood.is_some())
            .map(Entry::day)
            .collect();

        self.entries.extend(
            restored
                .entries
                .into_iter()
                .filter(|e| !local_ids.contains(&e.id)),
        );

        let local_moods = std::mem::replace(&mut self.moods, restored.moods);
        for sample in local_moods {
            self.upsert_sample(sample.date, sample.score);
        }
        for day in local_days {
            self.refresh_day_sample(day);
        }

        if self.settings == Settings::default() {
            self.settings = restored.settings;
        }
        if self.eras_generated_at.is_none() && self.eras.is_empty() {
            self.eras = restored.eras;
            self.eras_generated_at = restored.eras_generated_at;
        }
        let local_reports = std::mem::replace(&mut self.reports, restored.reports);
        self.reports.extend(local_reports);

        self.counters.entries_created += restored.counters.entries_created;
        self.counters.era_generations += restored.counters.era_generations;
    }

    fn mark_generation(&mut self, now: DateTime<Utc>) {
        self.eras_generated_at = Some(now);
        self.counters.era_generations += 1;
    }

    // Recomputes a day's sample from its scored entries, dropping it when none are left.
    fn refresh_day_sample(&mut self, day: NaiveDate) {
        let scores: Vec<f32> = self
            .entries
            .iter()
            .filter(|e| e.day() == day)
            .filter_map(|e| e.mood.map(|m| m.get() as f32))
            .collect();
        if scores.is_empty() {
            self.moods.retain(|m| m.date != day);
        } else {
            let mean = scores.iter().sum::<f32>() / scores.len() as f32;
            self.upsert_sample(day, mean);
        }
    }

    fn upsert_sample(&mut self, date: NaiveDate, score: f32) {
        match self.moods.binary_search_by_key(&date, |m| m.date) {
            Ok(i) => self.moods[i].score = score,
            Err(i) => self.moods.insert(i, MoodSample { date, score }),
        }
    }
}

fn stamp(spans: Vec<EraSpan>, now: DateTime<Utc>) -> Vec<Era> {
    spans
        .into_iter()
        .map(|span| Era {
            span,
            expanded: false,
            generated_at: now,
        })
        .collect()
}
