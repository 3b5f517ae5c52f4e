//! services/journal_api/src/adapters/mood_llm.rs
//!
//! This module contains the adapter for mood and emotion classification.
//! It implements the `MoodClassificationService` port from the `core` crate.

use async_trait::async_trait;
use mood_journal_core::{
    ports::{MoodClassificationService, PortError, PortResult},
    Emotion, MoodScore,
};

use super::llm::{parse_json, strip_code_fence, ChatModel};

const MOOD_INSTRUCTIONS: &str = "You rate the mood of a personal journal entry on a scale \
from 1 (very low) to 5 (very good). Respond with ONLY the integer, no explanation.";

const EMOTION_INSTRUCTIONS: &str = "You name the single dominant emotion of a personal journal \
entry. Respond with ONLY a JSON object of the form {\"label\": \"<one lowercase word>\", \
\"emoji\": \"<one emoji>\"}.";

/// Journal entries are short; anything beyond this adds cost, not signal.
const MAX_INPUT_CHARS: usize = 4000;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

#[derive(Clone)]
pub struct OpenAiMoodAdapter {
    chat: ChatModel,
}

impl OpenAiMoodAdapter {
    pub fn new(chat: ChatModel) -> Self {
        Self { chat }
    }
}

fn preview(text: &str) -> String {
    text.chars().take(MAX_INPUT_CHARS).collect()
}

pub(crate) fn parse_mood(reply: &str) -> PortResult<MoodScore> {
    let body = strip_code_fence(reply)?;
    let value: i64 = body
        .trim()
        .trim_end_matches('.')
        .parse()
        .map_err(|_| PortError::Malformed(format!("expected a mood score, got '{}'", body)))?;
    MoodScore::new(value).map_err(|e| PortError::Malformed(e.to_string()))
}

pub(crate) fn parse_emotion(reply: &str) -> PortResult<Emotion> {
    let emotion: Emotion = parse_json(reply)?;
    let label = emotion.label.trim().to_lowercase();
    if label.is_empty() {
        return Err(PortError::Malformed("emotion label is empty".to_string()));
    }
    Ok(Emotion {
        label,
        emoji: emotion.emoji.trim().to_string(),
    })
}

//=========================================================================================
// `MoodClassificationService` Trait Implementation
//=========================================================================================

#[async_trait]
impl MoodClassificationService for OpenAiMoodAdapter {
    async fn classify_mood(&self, text: &str) -> PortResult<MoodScore> {
        let reply = self.chat.complete(MOOD_INSTRUCTIONS, preview(text), 5).await?;
        parse_mood(&reply)
    }

    async fn classify_emotion(&self, text: &str) -> PortResult<Emotion> {
        let reply = self
            .chat
            .complete(EMOTION_INSTRUCTIONS, preview(text), 40)
            .await?;
        parse_emotion(&reply)
    }
}
