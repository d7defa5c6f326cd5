//! Per-task-type input parameter schemas.
//!
//! Every payload is validated once, at the creation boundary, before any
//! side effect. Schemas enforce bounded string sizes, enumerated variants
//! and numeric ranges for the closed set of task types.

use crate::error::{Result, TaskError};
use econos_types::TaskType;
use serde_json::Value;

const IMAGE_SIZES: &[&str] = &["512x512", "1024x1024", "1792x1024"];
const RESEARCH_DEPTHS: &[&str] = &["shallow", "standard", "deep"];
const WRITER_TONES: &[&str] = &["neutral", "formal", "casual", "persuasive"];

/// Validate `input` against the schema for `task_type`.
pub fn validate_input(task_type: TaskType, input: &Value) -> Result<()> {
    let obj = input.as_object().ok_or_else(|| TaskError::SchemaViolation {
        field: "$".to_string(),
        reason: "input parameters must be a JSON object".to_string(),
    })?;

    match task_type {
        TaskType::ImageGeneration => {
            required_string(obj, "prompt", 1, 2_000)?;
            optional_enum(obj, "size", IMAGE_SIZES)?;
            optional_string(obj, "style", 200)?;
        }
        TaskType::SummaryGeneration => {
            required_string(obj, "text", 1, 100_000)?;
            optional_integer(obj, "maxSentences", 1, 50)?;
        }
        TaskType::Researcher => {
            required_string(obj, "topic", 1, 500)?;
            optional_enum(obj, "depth", RESEARCH_DEPTHS)?;
        }
        TaskType::Writer => {
            required_string(obj, "brief", 1, 10_000)?;
            optional_enum(obj, "tone", WRITER_TONES)?;
            optional_integer(obj, "maxWords", 50, 20_000)?;
        }
        TaskType::MarketResearch => {
            required_string(obj, "market", 1, 500)?;
            optional_string_array(obj, "regions", 20, 100)?;
            optional_integer(obj, "horizonMonths", 1, 60)?;
        }
    }

    Ok(())
}

type Object = serde_json::Map<String, Value>;

fn violation(field: &str, reason: impl Into<String>) -> TaskError {
    TaskError::SchemaViolation {
        field: field.to_string(),
        reason: reason.into(),
    }
}

fn required_string(obj: &Object, field: &str, min_len: usize, max_len: usize) -> Result<()> {
    let value = obj
        .get(field)
        .ok_or_else(|| violation(field, "missing required field"))?;
    check_string(field, value, min_len, max_len)
}

fn optional_string(obj: &Object, field: &str, max_len: usize) -> Result<()> {
    match obj.get(field) {
        Some(value) => check_string(field, value, 0, max_len),
        None => Ok(()),
    }
}

fn check_string(field: &str, value: &Value, min_len: usize, max_len: usize) -> Result<()> {
    let s = value
        .as_str()
        .ok_or_else(|| violation(field, "expected a string"))?;
    if s.len() < min_len {
        return Err(violation(field, format!("shorter than {} bytes", min_len)));
    }
    if s.len() > max_len {
        return Err(violation(field, format!("longer than {} bytes", max_len)));
    }
    Ok(())
}

fn optional_enum(obj: &Object, field: &str, allowed: &[&str]) -> Result<()> {
    match obj.get(field) {
        None => Ok(()),
        Some(value) => {
            let s = value
                .as_str()
                .ok_or_else(|| violation(field, "expected a string"))?;
            if allowed.contains(&s) {
                Ok(())
            } else {
                Err(violation(field, format!("must be one of {:?}", allowed)))
            }
        }
    }
}

fn optional_integer(obj: &Object, field: &str, min: i64, max: i64) -> Result<()> {
    match obj.get(field) {
        None => Ok(()),
        Some(value) => {
            let n = value
                .as_i64()
                .ok_or_else(|| violation(field, "expected an integer"))?;
            if n < min || n > max {
                return Err(violation(field, format!("must be within {}..={}", min, max)));
            }
            Ok(())
        }
    }
}

fn optional_string_array(
    obj: &Object,
    field: &str,
    max_items: usize,
    max_item_len: usize,
) -> Result<()> {
    match obj.get(field) {
        None => Ok(()),
        Some(value) => {
            let items = value
                .as_array()
                .ok_or_else(|| violation(field, "expected an array"))?;
            if items.len() > max_items {
                return Err(violation(field, format!("more than {} items", max_items)));
            }
            for (i, item) in items.iter().enumerate() {
                check_string(&format!("{}[{}]", field, i), item, 1, max_item_len)?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_summary_accepts_valid_payload() {
        let input = json!({"text": "The quick brown fox.", "maxSentences": 3});
        assert!(validate_input(TaskType::SummaryGeneration, &input).is_ok());
    }

    #[test]
    fn test_summary_rejects_missing_text() {
        let err = validate_input(TaskType::SummaryGeneration, &json!({"maxSentences": 3}))
            .unwrap_err();
        assert!(matches!(err, TaskError::SchemaViolation { ref field, .. } if field == "text"));
    }

    #[test]
    fn test_summary_rejects_out_of_range_sentences() {
        let input = json!({"text": "hi", "maxSentences": 51});
        assert!(validate_input(TaskType::SummaryGeneration, &input).is_err());
        let input = json!({"text": "hi", "maxSentences": 0});
        assert!(validate_input(TaskType::SummaryGeneration, &input).is_err());
        let input = json!({"text": "hi", "maxSentences": 50});
        assert!(validate_input(TaskType::SummaryGeneration, &input).is_ok());
    }

    #[test]
    fn test_image_size_enum() {
        assert!(validate_input(
            TaskType::ImageGeneration,
            &json!({"prompt": "a fox", "size": "1024x1024"})
        )
        .is_ok());
        assert!(validate_input(
            TaskType::ImageGeneration,
            &json!({"prompt": "a fox", "size": "7x7"})
        )
        .is_err());
    }

    #[test]
    fn test_prompt_length_bounds() {
        let long = "x".repeat(2_001);
        assert!(validate_input(TaskType::ImageGeneration, &json!({"prompt": long})).is_err());
        let max = "x".repeat(2_000);
        assert!(validate_input(TaskType::ImageGeneration, &json!({"prompt": max})).is_ok());
        assert!(validate_input(TaskType::ImageGeneration, &json!({"prompt": ""})).is_err());
    }

    #[test]
    fn test_non_object_payload_rejected() {
        assert!(validate_input(TaskType::Writer, &json!("just a string")).is_err());
        assert!(validate_input(TaskType::Writer, &json!(null)).is_err());
    }

    #[test]
    fn test_market_research_regions() {
        let input = json!({"market": "ev-charging", "regions": ["EU", "US"], "horizonMonths": 12});
        assert!(validate_input(TaskType::MarketResearch, &input).is_ok());

        let too_many: Vec<String> = (0..21).map(|i| format!("R{}", i)).collect();
        let input = json!({"market": "ev-charging", "regions": too_many});
        assert!(validate_input(TaskType::MarketResearch, &input).is_err());
    }

    #[test]
    fn test_writer_tone_enum() {
        assert!(
            validate_input(TaskType::Writer, &json!({"brief": "b", "tone": "formal"})).is_ok()
        );
        assert!(
            validate_input(TaskType::Writer, &json!({"brief": "b", "tone": "sardonic"})).is_err()
        );
    }
}
