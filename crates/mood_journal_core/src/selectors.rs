//! crates/mood_journal_core/src/selectors.rs
//!
//! Pure read-side views over the entry collection. Nothing here mutates state;
//! screens call these on every render.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::{Entry, MonthKey, MoodSample, MoodScore};

/// Trailing window used for mood statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrailingWindow {
    Week,
    Month,
}

impl TrailingWindow {
    pub fn duration(self) -> Duration {
        match self {
            TrailingWindow::Week => Duration::days(7),
            TrailingWindow::Month => Duration::days(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MoodStats {
    pub mean: f64,
    pub min: u8,
    pub max: u8,
    pub count: usize,
}

/// Entries created on a day in `from..=to`.
pub fn in_date_range(entries: &[Entry], from: NaiveDate, to: NaiveDate) -> Vec<&Entry> {
    entries
        .iter()
        .filter(|e| (from..=to).contains(&e.day()))
        .collect()
}

pub fn with_tag<'a>(entries: &'a [Entry], tag: &str) -> Vec<&'a Entry> {
    entries.iter().filter(|e| e.tags.contains(tag)).collect()
}

/// Scored entries with `min <= mood <= max`. Unscored entries never match.
pub fn with_mood_between(entries: &[Entry], min: MoodScore, max: MoodScore) -> Vec<&Entry> {
    entries
        .iter()
        .filter(|e| e.mood.is_some_and(|m| m >= min && m <= max))
        .collect()
}

pub fn in_month(entries: &[Entry], month: MonthKey) -> Vec<&Entry> {
    entries.iter().filter(|e| month.contains(e.day())).collect()
}

/// Entries created strictly after `instant`.
pub fn entries_since(entries: &[Entry], instant: DateTime<Utc>) -> Vec<&Entry> {
    entries.iter().filter(|e| e.created_at > instant).collect()
}

/// Mean, min and max mood over `(now - window, now]`, ignoring unscored entries.
/// Returns `None` when no scored entry falls inside the window.
pub fn mood_stats(entries: &[Entry], window: TrailingWindow, now: DateTime<Utc>) -> Option<MoodStats> {
    let start = now - window.duration();
    let scores: Vec<u8> = entries
        .iter()
        .filter(|e| e.created_at > start && e.created_at <= now)
        .filter_map(|e| e.mood.map(MoodScore::get))
        .collect();

    let min = *scores.iter().min()?;
    let max = *scores.iter().max()?;
    let sum: u32 = scores.iter().map(|&s| s as u32).sum();
    Some(MoodStats {
        mean: sum as f64 / scores.len() as f64,
        min,
        max,
        count: scores.len(),
    })
}

/// Per-day mean mood, oldest first.
pub fn daily_moods(entries: &[Entry]) -> Vec<MoodSample> {
    let mut days: BTreeMap<NaiveDate, (u32, u32)> = BTreeMap::new();
    for entry in entries {
        if let Some(mood) = entry.mood {
            let slot = days.entry(entry.day()).or_default();
            slot.0 += mood.get() as u32;
            slot.1 += 1;
        }
    }
    days.into_iter()
        .map(|(date, (sum, n))| MoodSample {
            date,
            score: sum as f32 / n as f32,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EntryKind, Tags};
    use chrono::TimeZone;
    use uuid::Uuid;

    fn entry(created_at: DateTime<Utc>, mood: Option<i64>, tags: &[&str]) -> Entry {
        Entry {
            id: Uuid::new_v4(),
            created_at,
            kind: EntryKind::Text,
            content: "note".into(),
            mood: mood.map(|m| MoodScore::new(m).unwrap()),
            emotion: None,
            tags: Tags::new(tags.iter().copied()),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn weekly_average_skips_unscored_and_out_of_window_entries() {
        let now = now();
        let entries = vec![
            entry(now - Duration::days(9), Some(3), &[]),
            entry(now - Duration::days(5), Some(5), &[]),
            entry(now - Duration::days(3), None, &[]),
            entry(now - Duration::days(1), Some(1), &[]),
        ];

        let stats = mood_stats(&entries, TrailingWindow::Week, now).unwrap();
        assert_eq!(stats.mean, 3.0);
        assert_eq!(stats.count, 2);
        assert_eq!((stats.min, stats.max), (1, 5));

        let monthly = mood_stats(&entries, TrailingWindow::Month, now).unwrap();
        assert_eq!(monthly.mean, 3.0);
        assert_eq!(monthly.count, 3);
    }

    #[test]
    fn stats_are_none_without_scored_entries() {
        let now = now();
        let entries = vec![entry(now - Duration::days(1), None, &[])];
        assert_eq!(mood_stats(&entries, TrailingWindow::Week, now), None);
        assert_eq!(mood_stats(&[], TrailingWindow::Month, now), None);
    }

    #[test]
    fn filters_by_range_tag_and_mood() {
        let now = now();
        let entries = vec![
            entry(now, Some(4), &["work"]),
            entry(now - Duration::days(2), Some(2), &["family"]),
            entry(now - Duration::days(40), None, &["work"]),
        ];

        let from = (now - Duration::days(2)).date_naive();
        assert_eq!(in_date_range(&entries, from, now.date_naive()).len(), 2);
        assert_eq!(with_tag(&entries, "work").len(), 2);
        let low = MoodScore::new(1).unwrap();
        let mid = MoodScore::new(3).unwrap();
        assert_eq!(with_mood_between(&entries, low, mid).len(), 1);
        assert_eq!(in_month(&entries, "2024-06".parse().unwrap()).len(), 2);
        assert_eq!(entries_since(&entries, now - Duration::days(3)).len(), 2);
    }

    #[test]
    fn daily_moods_average_per_day() {
        let day = now();
        let entries = vec![
            entry(day, Some(5), &[]),
            entry(day - Duration::hours(2), Some(2), &[]),
            entry(day - Duration::days(1), Some(1), &[]),
        ];
        let samples = daily_moods(&entries);
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].score, 1.0);
        assert_eq!(samples[1].score, 3.5);
    }
}
