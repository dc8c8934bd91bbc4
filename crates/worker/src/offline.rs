use advisor_core::domain::client::ClientRecord;
use advisor_core::engine::AdvisorEngine;
use anyhow::Context;
use serde_json::{json, Value};
use std::path::Path;

/// Advises every record in a JSON array file and prints one result per record to stdout.
pub fn run(engine: &AdvisorEngine, path: &Path) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read input file {}", path.display()))?;
    let records: Vec<ClientRecord> = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a JSON array of client records", path.display()))?;

    let results = advise_all(engine, &records);
    let failed = results.iter().filter(|r| r.get("error").is_some()).count();

    let out = serde_json::to_string_pretty(&results).context("failed to serialize results")?;
    println!("{out}");

    tracing::info!(
        input = %path.display(),
        records = records.len(),
        failed,
        "offline run finished"
    );
    Ok(())
}

fn advise_all(engine: &AdvisorEngine, records: &[ClientRecord]) -> Vec<Value> {
    records
        .iter()
        .map(|record| match engine.advise(record) {
            Ok(rec) => serde_json::to_value(&rec).unwrap_or_else(|err| {
                json!({ "client_id": record.client_id, "error": err.to_string() })
            }),
            Err(err) => {
                tracing::warn!(client_id = %record.client_id, error = %err, "record rejected");
                json!({
                    "client_id": record.client_id,
                    "error": err.to_string(),
                    "field": err.field(),
                })
            }
        })
        .collect()
}
