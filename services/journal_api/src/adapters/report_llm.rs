//! services/journal_api/src/adapters/report_llm.rs
//!
//! This module contains the adapter for the monthly check-up.
//! It implements the `ReportGenerationService` port from the `core` crate.

use async_trait::async_trait;
use mood_journal_core::{
    ports::{PortError, PortResult, ReportGenerationService},
    Entry, MonthKey, MonthlyReport, Trigger, TriggerEmotion,
};
use serde::Deserialize;
use std::fmt::Write;

use super::llm::{parse_json, ChatModel};

const MAX_ENTRY_CHARS: usize = 400;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

#[derive(Clone)]
pub struct OpenAiReportAdapter {
    chat: ChatModel,
    max_summary_words: usize,
}

impl OpenAiReportAdapter {
    pub fn new(chat: ChatModel, max_summary_words: usize) -> Self {
        Self {
            chat,
            max_summary_words,
        }
    }

    fn instructions(&self) -> String {
        format!(
            "You write a gentle monthly check-up from a person's journal entries. Respond with \
             ONLY a JSON object: {{\"topTriggers\": [{{\"emotion\": \"happy\" | \"anxious\", \
             \"phrases\": [\"<short phrase>\", ...]}}], \"summary\": \"<at most {} words>\"}}. \
             Include at most one trigger per emotion.",
            self.max_summary_words
        )
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportReply {
    #[serde(default)]
    top_triggers: Vec<TriggerReply>,
    summary: String,
}

#[derive(Deserialize)]
struct TriggerReply {
    emotion: TriggerEmotion,
    #[serde(default)]
    phrases: Vec<String>,
}

fn render_entries(entries: &[Entry]) -> String {
    let mut out = String::new();
    for entry in entries {
        let text: String = entry.content.chars().take(MAX_ENTRY_CHARS).collect();
        let _ = write!(out, "{}", entry.day());
        if let Some(mood) = entry.mood {
            let _ = write!(out, " (mood {}/5)", mood.get());
        }
        if let Some(emotion) = &entry.emotion {
            let _ = write!(out, " [{}]", emotion.label);
        }
        let _ = writeln!(out, ": {}", text.replace('\n', " "));
    }
    out
}

fn clip_words(text: &str, max_words: usize) -> String {
    text.split_whitespace()
        .take(max_words)
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn parse_report(reply: &str, max_summary_words: usize) -> PortResult<MonthlyReport> {
    let parsed: ReportReply = parse_json(reply)?;
    let summary = clip_words(&parsed.summary, max_summary_words);
    if summary.is_empty() {
        return Err(PortError::Malformed("report summary is empty".to_string()));
    }

    let top_triggers = parsed
        .top_triggers
        .into_iter()
        .map(|t| Trigger {
            emotion: t.emotion,
            phrases: t
                .phrases
                .into_iter()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
        })
        .collect();

    Ok(MonthlyReport {
        top_triggers,
        summary,
    })
}

//=========================================================================================
// `ReportGenerationService` Trait Implementation
//=========================================================================================

#[async_trait]
impl ReportGenerationService for OpenAiReportAdapter {
    async fn generate_monthly_report(
        &self,
        month: MonthKey,
        entries: &[Entry],
    ) -> PortResult<MonthlyReport> {
        let prompt = format!("MONTH: {}\n\nENTRIES:\n{}", month, render_entries(entries));
        let reply = self.chat.complete(&self.instructions(), prompt, 600).await?;
        parse_report(&reply, self.max_summary_words)
    }
}
