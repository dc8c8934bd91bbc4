pub mod domain;
pub mod engine;
pub mod narrative;
pub mod storage;

pub mod config {
    use crate::engine::PolicyConfig;
    use anyhow::Context;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub anthropic_api_key: Option<String>,
        pub sentry_dsn: Option<String>,
        pub policy_path: Option<String>,
        pub capacity_fraction: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                database_url: std::env::var("DATABASE_URL").ok(),
                anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                policy_path: std::env::var("ADVISOR_POLICY_PATH").ok(),
                capacity_fraction: std::env::var("ADVISOR_CAPACITY_FRACTION").ok(),
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }

        pub fn require_anthropic_api_key(&self) -> anyhow::Result<&str> {
            self.anthropic_api_key
                .as_deref()
                .context("ANTHROPIC_API_KEY is required")
        }
    }

    impl PolicyConfig {
        /// Defaults, overlaid by the JSON file at `ADVISOR_POLICY_PATH` and then by
        /// `ADVISOR_CAPACITY_FRACTION`.
        pub fn load(settings: &Settings) -> anyhow::Result<Self> {
            let file = match settings.policy_path.as_deref() {
                Some(path) => Some(
                    std::fs::read_to_string(path)
                        .with_context(|| format!("failed to read policy file {path}"))?,
                ),
                None => None,
            };
            let policy =
                Self::from_sources(file.as_deref(), settings.capacity_fraction.as_deref())?;
            tracing::info!(
                policy_path = settings.policy_path.as_deref().unwrap_or("<defaults>"),
                capacity_fraction = policy.capacity_fraction,
                "policy loaded"
            );
            Ok(policy)
        }

        pub fn from_sources(
            policy_json: Option<&str>,
            capacity_fraction: Option<&str>,
        ) -> anyhow::Result<Self> {
            let mut policy = match policy_json {
                Some(json) => serde_json::from_str::<PolicyConfig>(json)
                    .context("policy file is not valid policy JSON")?,
                None => PolicyConfig::default(),
            };
            if let Some(raw) = capacity_fraction {
                policy.capacity_fraction = raw.trim().parse::<f64>().with_context(|| {
                    format!("ADVISOR_CAPACITY_FRACTION must be a number (got {raw:?})")
                })?;
            }
            policy.validate()?;
            Ok(policy)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::domain::recommendation::RiskCategory;

        #[test]
        fn defaults_without_sources() {
            let policy = PolicyConfig::from_sources(None, None).unwrap();
            assert_eq!(policy, PolicyConfig::default());
        }

        #[test]
        fn partial_file_keeps_other_defaults() {
            let policy = PolicyConfig::from_sources(Some(r#"{"capacity_fraction": 0.4}"#), None)
                .unwrap();
            assert_eq!(policy.capacity_fraction, 0.4);
            assert_eq!(policy.risk, PolicyConfig::default().risk);
        }

        #[test]
        fn env_override_wins_over_file() {
            let policy =
                PolicyConfig::from_sources(Some(r#"{"capacity_fraction": 0.4}"#), Some(" 0.25 "))
                    .unwrap();
            assert_eq!(policy.capacity_fraction, 0.25);
        }

        #[test]
        fn rejects_unparseable_and_invalid_values() {
            assert!(PolicyConfig::from_sources(None, Some("lots")).is_err());
            assert!(PolicyConfig::from_sources(None, Some("1.5")).is_err());
            assert!(PolicyConfig::from_sources(Some("not json"), None).is_err());
        }

        #[test]
        fn rejects_allocation_rows_that_do_not_sum_to_one() {
            let mut policy = PolicyConfig::default();
            if let Some(row) = policy.allocation.table.get_mut(&RiskCategory::Moderate) {
                row.values_mut().for_each(|w| *w *= 0.5);
            }
            let json = serde_json::to_string(&policy).unwrap();
            let err = PolicyConfig::from_sources(Some(&json), None).unwrap_err();
            assert!(err.to_string().contains("invalid policy"), "{err}");
        }
    }
}
