//! services/journal_api/src/adapters/eras_llm.rs
//!
//! This module contains the adapter for life-era segmentation.
//! It implements the `EraSegmentationService` port from the `core` crate.

use async_trait::async_trait;
use mood_journal_core::{
    ports::{EraSegmentationService, PortError, PortResult},
    EraSample, EraSpan,
};
use serde::Deserialize;
use std::fmt::Write;

use super::llm::{parse_json, ChatModel};

/// Per-sample cap so a long history still fits in one request.
const MAX_SAMPLE_CHARS: usize = 280;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

#[derive(Clone)]
pub struct OpenAiErasAdapter {
    chat: ChatModel,
    min_eras: usize,
    max_eras: usize,
}

impl OpenAiErasAdapter {
    pub fn new(chat: ChatModel, min_eras: usize, max_eras: usize) -> Self {
        Self {
            chat,
            min_eras,
            max_eras,
        }
    }

    fn instructions(&self) -> String {
        format!(
            "You read a person's journal in chronological order and divide it into {} to {} \
             consecutive life eras. Respond with ONLY a JSON array. Each element is \
             {{\"label\": \"<2-4 word title>\", \"from\": \"YYYY-MM-DD\", \"to\": \"YYYY-MM-DD\", \
             \"description\": \"<one sentence>\"}}. Eras must not overlap and `from` must not \
             be after `to`.",
            self.min_eras, self.max_eras
        )
    }
}

// Models sometimes wrap the array in an object.
#[derive(Deserialize)]
#[serde(untagged)]
enum ErasReply {
    Bare(Vec<EraSpan>),
    Wrapped { eras: Vec<EraSpan> },
}

fn render_samples(samples: &[EraSample]) -> String {
    let mut out = String::new();
    for sample in samples {
        let text: String = sample.text.chars().take(MAX_SAMPLE_CHARS).collect();
        // Writing to a String cannot fail.
        let _ = writeln!(out, "{}: {}", sample.date, text.replace('\n', " "));
    }
    out
}

pub(crate) fn parse_eras(reply: &str, min_eras: usize, max_eras: usize) -> PortResult<Vec<EraSpan>> {
    let spans = match parse_json::<ErasReply>(reply)? {
        ErasReply::Bare(spans) | ErasReply::Wrapped { eras: spans } => spans,
    };

    if !(min_eras..=max_eras).contains(&spans.len()) {
        return Err(PortError::Malformed(format!(
            "expected {} to {} eras, got {}",
            min_eras,
            max_eras,
            spans.len()
        )));
    }
    for span in &spans {
        if span.label.trim().is_empty() {
            return Err(PortError::Malformed("era without a label".to_string()));
        }
        if span.from > span.to {
            return Err(PortError::Malformed(format!(
                "era '{}' ends before it starts",
                span.label
            )));
        }
    }
    Ok(spans)
}

//=========================================================================================
// `EraSegmentationService` Trait Implementation
//=========================================================================================

#[async_trait]
impl EraSegmentationService for OpenAiErasAdapter {
    async fn segment_eras(&self, samples: &[EraSample]) -> PortResult<Vec<EraSpan>> {
        if samples.is_empty() {
            return Err(PortError::Unexpected("no journal text to segment".to_string()));
        }
        let reply = self
            .chat
            .complete(&self.instructions(), render_samples(samples), 1200)
            .await?;
        parse_eras(&reply, self.min_eras, self.max_eras)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const TWO_ERAS: &str = r#"[
        {"label": "New City", "from": "2024-01-02", "to": "2024-03-30"},
        {"label": "Settling In", "from": "2024-04-01", "to": "2024-06-10", "description": "Routines form."}
    ]"#;

    #[test]
    fn parses_bare_and_wrapped_arrays() {
        let spans = parse_eras(TWO_ERAS, 2, 6).unwrap();
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].from, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(spans[1].description.as_deref(), Some("Routines form."));

        let wrapped = format!("{{\"eras\": {}}}", TWO_ERAS);
        assert_eq!(parse_eras(&wrapped, 2, 6).unwrap(), spans);
    }

    #[test]
    fn era_count_outside_bounds_is_malformed() {
        assert!(matches!(parse_eras(TWO_ERAS, 3, 6), Err(PortError::Malformed(_))));
        assert!(matches!(parse_eras("[]", 2, 6), Err(PortError::Malformed(_))));
    }

    #[test]
    fn inverted_range_is_malformed() {
        let reply = r#"[
            {"label": "A", "from": "2024-05-01", "to": "2024-04-01"},
            {"label": "B", "from": "2024-05-02", "to": "2024-06-01"}
        ]"#;
        assert!(matches!(parse_eras(reply, 2, 6), Err(PortError::Malformed(_))));
    }

    #[test]
    fn samples_render_one_per_line() {
        let samples = vec![
            EraSample {
                date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                text: "moved\nin".to_string(),
            },
            EraSample {
                date: NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
                text: "x".repeat(1000),
            },
        ];
        let rendered = render_samples(&samples);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "2024-01-02: moved in");
        assert_eq!(lines[1].len(), "2024-01-03: ".len() + MAX_SAMPLE_CHARS);
    }
}
