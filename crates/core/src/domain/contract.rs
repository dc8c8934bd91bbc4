use crate::domain::recommendation::Narrative;
use anyhow::ensure;
use serde::{Deserialize, Serialize};

pub const MAX_NARRATIVE_LINES: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmNarrative {
    pub summary: String,
    #[serde(default)]
    pub highlights: Vec<String>,
    #[serde(default)]
    pub cautions: Vec<String>,
}

impl LlmNarrative {
    pub fn validate_and_into_narrative(self) -> anyhow::Result<Narrative> {
        let summary = self.summary.trim().to_string();
        ensure!(!summary.is_empty(), "summary must be non-empty");

        let highlights = trimmed_lines("highlights", self.highlights)?;
        let cautions = trimmed_lines("cautions", self.cautions)?;

        Ok(Narrative {
            summary,
            highlights,
            cautions,
        })
    }
}

fn trimmed_lines(key: &str, lines: Vec<String>) -> anyhow::Result<Vec<String>> {
    let lines: Vec<String> = lines
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    ensure!(
        lines.len() <= MAX_NARRATIVE_LINES,
        "{key} must have at most {MAX_NARRATIVE_LINES} lines (got {})",
        lines.len()
    );
    Ok(lines)
}
