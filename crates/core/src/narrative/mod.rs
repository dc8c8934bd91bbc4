pub mod anthropic;
pub mod error;
pub mod json;

use crate::domain::recommendation::{Narrative, Recommendation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Anthropic,
}

/// A validated narrative plus the provider's raw response body, kept for auditing.
#[derive(Debug, Clone)]
pub struct NarrativeResponse {
    pub narrative: Narrative,
    pub raw_response_json: serde_json::Value,
}

#[async_trait::async_trait]
pub trait NarrativeClient: Send + Sync {
    fn provider(&self) -> Provider;

    async fn narrate(&self, recommendation: &Recommendation) -> anyhow::Result<NarrativeResponse>;
}
