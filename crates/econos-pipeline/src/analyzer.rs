//! Request analysis: free-form text to a proposed step sequence.
//!
//! The natural-language planner proper is an external collaborator; this
//! module defines its input/output contract and ships a deterministic
//! keyword analyzer as the default implementation.

use crate::error::Result;
use crate::types::{AnalyzedStep, InputSource, RequestAnalysis};
use async_trait::async_trait;
use econos_market::CapabilitySummary;
use econos_types::TaskType;

#[async_trait]
pub trait RequestAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        request: &str,
        capabilities: &CapabilitySummary,
    ) -> Result<RequestAnalysis>;
}

/// Keyword-driven analyzer. Services are proposed in pipeline order
/// (research before writing before summarization before illustration) and
/// restricted to what the capability summary currently advertises.
pub struct KeywordAnalyzer;

/// (service, trigger keywords), in the order steps chain together.
const SERVICE_KEYWORDS: &[(TaskType, &[&str])] = &[
    (TaskType::MarketResearch, &["market", "competitor", "industry", "tam"]),
    (TaskType::Researcher, &["research", "investigate", "find out", "deep dive", "sources"]),
    (TaskType::Writer, &["write", "article", "blog", "draft", "essay", "post"]),
    (TaskType::SummaryGeneration, &["summarize", "summary", "tl;dr", "condense", "shorten"]),
    (TaskType::ImageGeneration, &["image", "illustration", "picture", "draw", "visual"]),
];

#[async_trait]
impl RequestAnalyzer for KeywordAnalyzer {
    async fn analyze(
        &self,
        request: &str,
        capabilities: &CapabilitySummary,
    ) -> Result<RequestAnalysis> {
        let lowered = request.to_lowercase();
        let mut matched: Vec<TaskType> = Vec::new();

        for (service, keywords) in SERVICE_KEYWORDS {
            if keywords.iter().any(|k| lowered.contains(k))
                && capabilities.services.contains_key(service)
            {
                matched.push(*service);
            }
        }

        // Nothing recognizable: fall back to a single research step with
        // low confidence and let budget validation catch the rest.
        let (services, confidence, reasoning) = if matched.is_empty() {
            (
                vec![TaskType::Researcher],
                0.4,
                "no service keyword matched; defaulting to a single research step".to_string(),
            )
        } else {
            let names: Vec<&str> = matched.iter().map(|s| s.label()).collect();
            (
                matched,
                0.9,
                format!("matched service keywords: {}", names.join(", ")),
            )
        };

        let steps = services
            .iter()
            .enumerate()
            .map(|(i, service)| AnalyzedStep {
                order: i as u32 + 1,
                service_type: *service,
                description: format!("{} step for: {}", service.label(), truncate(request, 120)),
                input_source: if i == 0 {
                    InputSource::User
                } else {
                    InputSource::Previous
                },
                input_field: None,
            })
            .collect::<Vec<_>>();

        Ok(RequestAnalysis {
            is_single_agent: steps.len() == 1,
            steps,
            reasoning,
            confidence,
        })
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
