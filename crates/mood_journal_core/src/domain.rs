//! crates/mood_journal_core/src/domain.rs
//!
//! Defines the pure, core data structures of the journal.
//! These types carry their own invariants (validated newtypes, sum types for
//! optional media) and know how to serialize themselves into the snapshot
//! document, but nothing here talks to a device, a network or a clock.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

//=========================================================================================
// Domain Errors
//=========================================================================================

/// Raised when a caller hands the domain an invalid argument.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    #[error("Mood score must be between 1 and 5, got {0}")]
    InvalidMoodScore(i64),
    #[error("Invalid reminder time '{0}', expected HH:MM")]
    InvalidReminderTime(String),
    #[error("Invalid month key '{0}', expected YYYY-MM")]
    InvalidMonthKey(String),
}

//=========================================================================================
// Entries
//=========================================================================================

pub type EntryId = Uuid;

/// An integer sentiment rating in `1..=5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct MoodScore(u8);

impl MoodScore {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(value: i64) -> Result<Self, DomainError> {
        if (Self::MIN as i64..=Self::MAX as i64).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(DomainError::InvalidMoodScore(value))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for MoodScore {
    type Error = DomainError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<MoodScore> for i64 {
    fn from(score: MoodScore) -> Self {
        score.0 as i64
    }
}

/// An emotion label returned by classification, e.g. `("calm", "😌")`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Emotion {
    pub label: String,
    pub emoji: String,
}

/// Free-form tags. Display order is kept, equality ignores it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct Tags(Vec<String>);

impl Tags {
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out = Self::default();
        for tag in tags {
            out.push(tag);
        }
        out
    }

    /// Adds a tag, ignoring blanks and duplicates. Returns whether it was added.
    pub fn push(&mut self, tag: impl Into<String>) -> bool {
        let tag = tag.into().trim().to_string();
        if tag.is_empty() || self.contains(&tag) {
            return false;
        }
        self.0.push(tag);
        true
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.iter().any(|t| t == tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl PartialEq for Tags {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|t| other.contains(t))
    }
}

impl Eq for Tags {}

impl From<Vec<String>> for Tags {
    fn from(tags: Vec<String>) -> Self {
        Self::new(tags)
    }
}

impl From<Tags> for Vec<String> {
    fn from(tags: Tags) -> Self {
        tags.0
    }
}

/// What an entry was recorded as. Voice and media entries always carry a
/// reference to their asset; text entries never do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntryKind {
    Text,
    Voice { media_ref: String },
    Media { media_ref: String },
}

impl EntryKind {
    pub fn media_ref(&self) -> Option<&str> {
        match self {
            EntryKind::Text => None,
            EntryKind::Voice { media_ref } | EntryKind::Media { media_ref } => Some(media_ref),
        }
    }
}

/// A single journal record. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: EntryId,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    pub kind: EntryKind,
    /// Raw text, a transcript, or a caption depending on `kind`.
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<MoodScore>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion: Option<Emotion>,
    #[serde(default)]
    pub tags: Tags,
}

impl Entry {
    /// The UTC calendar day the entry belongs to.
    pub fn day(&self) -> NaiveDate {
        self.created_at.date_naive()
    }

    pub fn month(&self) -> MonthKey {
        MonthKey::from_date(self.day())
    }
}

/// The caller-supplied part of an entry. The store assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryDraft {
    pub kind: EntryKind,
    pub content: String,
    pub tags: Tags,
    /// A user override; when set, mood classification is skipped.
    pub mood: Option<MoodScore>,
    pub emotion: Option<Emotion>,
}

impl EntryDraft {
    pub fn text(content: impl Into<String>) -> Self {
        Self::new(EntryKind::Text, content)
    }

    pub fn voice(transcript: impl Into<String>, media_ref: impl Into<String>) -> Self {
        Self::new(
            EntryKind::Voice {
                media_ref: media_ref.into(),
            },
            transcript,
        )
    }

    pub fn media(caption: impl Into<String>, media_ref: impl Into<String>) -> Self {
        Self::new(
            EntryKind::Media {
                media_ref: media_ref.into(),
            },
            caption,
        )
    }

    fn new(kind: EntryKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            tags: Tags::default(),
            mood: None,
            emotion: None,
        }
    }

    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_mood(mut self, mood: MoodScore) -> Self {
        self.mood = Some(mood);
        self
    }

    pub fn with_emotion(mut self, emotion: Emotion) -> Self {
        self.emotion = Some(emotion);
        self
    }
}

/// One calendar sample per day, used by the mood calendar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoodSample {
    pub date: NaiveDate,
    pub score: f32,
}

//=========================================================================================
// Eras
//=========================================================================================

/// One dated text handed to the segmentation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EraSample {
    pub date: NaiveDate,
    pub text: String,
}

/// A labeled date range as returned by segmentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EraSpan {
    pub label: String,
    pub from: NaiveDate,
    pub to: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A stored era: the segmentation output plus local stamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Era {
    #[serde(flatten)]
    pub span: EraSpan,
    #[serde(default)]
    pub expanded: bool,
    pub generated_at: DateTime<Utc>,
}

//=========================================================================================
// Settings
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

/// A wall-clock reminder time serialized as `"HH:MM"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReminderTime(NaiveTime);

impl ReminderTime {
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(Self)
    }

    pub fn time(&self) -> NaiveTime {
        self.0
    }
}

impl Default for ReminderTime {
    fn default() -> Self {
        Self(NaiveTime::from_hms_opt(20, 0, 0).unwrap_or(NaiveTime::MIN))
    }
}

impl FromStr for ReminderTime {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 5 {
            return Err(DomainError::InvalidReminderTime(s.to_string()));
        }
        NaiveTime::parse_from_str(s, "%H:%M")
            .map(Self)
            .map_err(|_| DomainError::InvalidReminderTime(s.to_string()))
    }
}

impl TryFrom<String> for ReminderTime {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ReminderTime> for String {
    fn from(time: ReminderTime) -> Self {
        time.to_string()
    }
}

impl fmt::Display for ReminderTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%H:%M"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Settings {
    pub reminders_on: bool,
    pub reminder_time: ReminderTime,
    pub theme: Theme,
}

/// A partial settings update. Unset fields keep their previous value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SettingsPatch {
    #[serde(default)]
    pub reminders_on: Option<bool>,
    #[serde(default)]
    pub reminder_time: Option<ReminderTime>,
    #[serde(default)]
    pub theme: Option<Theme>,
}

impl Settings {
    pub fn merge(&mut self, patch: SettingsPatch) {
        if let Some(on) = patch.reminders_on {
            self.reminders_on = on;
        }
        if let Some(time) = patch.reminder_time {
            self.reminder_time = time;
        }
        if let Some(theme) = patch.theme {
            self.theme = theme;
        }
    }
}

//=========================================================================================
// Monthly Reports
//=========================================================================================

/// A calendar month, serialized as `"YYYY-MM"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Result<Self, DomainError> {
        if !(1..=12).contains(&month) || !(0..=9999).contains(&year) {
            return Err(DomainError::InvalidMonthKey(format!("{year:04}-{month:02}")));
        }
        Ok(Self { year, month })
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }
}

impl FromStr for MonthKey {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DomainError::InvalidMonthKey(s.to_string());
        let (year, month) = s.split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        let year = year.parse::<i32>().map_err(|_| invalid())?;
        let month = month.parse::<u32>().map_err(|_| invalid())?;
        Self::new(year, month).map_err(|_| invalid())
    }
}

impl TryFrom<String> for MonthKey {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MonthKey> for String {
    fn from(key: MonthKey) -> Self {
        key.to_string()
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerEmotion {
    Happy,
    Anxious,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub emotion: TriggerEmotion,
    pub phrases: Vec<String>,
}

/// The cached monthly check-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyReport {
    pub top_triggers: Vec<Trigger>,
    pub summary: String,
}

//=========================================================================================
// Identity
//=========================================================================================

/// The signed-in user as last reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSession {
    pub user_id: String,
    pub email: String,
    pub email_verified: bool,
}

/// The simplified view of the session consumed by route guards.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct AuthSnapshot {
    pub user: Option<UserSession>,
    pub is_verified: bool,
    pub is_online: bool,
}

//=========================================================================================
// Audio
//=========================================================================================

/// Audio handed to transcription: raw mono PCM from the recorder, or an
/// already-encoded file such as an `.m4a`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioClip {
    Pcm16 { sample_rate: u32, data: Vec<u8> },
    Encoded { file_name: String, bytes: Vec<u8> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mood_score_rejects_out_of_range() {
        assert!(MoodScore::new(0).is_err());
        assert!(MoodScore::new(6).is_err());
        assert_eq!(MoodScore::new(3).unwrap().get(), 3);
        assert!(serde_json::from_str::<MoodScore>("9").is_err());
    }

    #[test]
    fn tags_equality_ignores_order() {
        let a = Tags::new(["work", "sleep"]);
        let b = Tags::new(["sleep", "work", "work"]);
        assert_eq!(a, b);
        assert_eq!(b.iter().collect::<Vec<_>>(), vec!["sleep", "work"]);
        assert_ne!(a, Tags::new(["work"]));
    }

    #[test]
    fn reminder_time_parses_strict_format() {
        assert_eq!("07:30".parse::<ReminderTime>().unwrap().to_string(), "07:30");
        assert!("7:30".parse::<ReminderTime>().is_err());
        assert!("24:00".parse::<ReminderTime>().is_err());
        assert_eq!(ReminderTime::default().to_string(), "20:00");
    }

    #[test]
    fn month_key_round_trips_through_strings() {
        let key: MonthKey = "2024-03".parse().unwrap();
        assert_eq!(key.to_string(), "2024-03");
        assert!(key.contains(NaiveDate::from_ymd_opt(2024, 3, 31).unwrap()));
        assert!(!key.contains(NaiveDate::from_ymd_opt(2024, 4, 1).unwrap()));
        assert!("2024-13".parse::<MonthKey>().is_err());
        assert!("2024-3".parse::<MonthKey>().is_err());
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"2024-03\"");
    }

    #[test]
    fn settings_merge_is_shallow() {
        let mut settings = Settings::default();
        settings.merge(SettingsPatch {
            theme: Some(Theme::Dark),
            ..Default::default()
        });
        settings.merge(SettingsPatch {
            reminders_on: Some(true),
            ..Default::default()
        });
        assert_eq!(
            settings,
            Settings {
                reminders_on: true,
                reminder_time: ReminderTime::default(),
                theme: Theme::Dark,
            }
        );
    }

    #[test]
    fn entry_kind_carries_media_ref() {
        assert_eq!(EntryKind::Text.media_ref(), None);
        let voice = EntryDraft::voice("hello", "file:///a.m4a");
        assert_eq!(voice.kind.media_ref(), Some("file:///a.m4a"));
    }
}
