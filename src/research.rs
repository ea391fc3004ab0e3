//! `rsh research` and `rsh ask`.

use anyhow::Result;
use tracing::info;

use research_harness_core::state::ResearchState;

use crate::harness::Harness;

/// Run the pipeline, persist the report to memory, and print it.
pub async fn run_research(harness: &Harness, query: &str, debug: bool, json: bool) -> Result<()> {
    let state = harness.pipeline.run(query, debug).await?;
    let entry = harness.recency.store(query, &state.final_report()).await?;
    info!(id = %entry.id, "report stored in memory");

    if json {
        let mut value = state.to_json();
        value["memory_id"] = entry.id.into();
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        print_state(&state, debug);
        println!();
        println!("Memory id: {}", entry.id);
    }
    Ok(())
}

fn print_state(state: &ResearchState, debug: bool) {
    println!("{}", state.final_report());

    let degraded = state.degraded_stages();
    if !degraded.is_empty() {
        let names: Vec<&str> = degraded.iter().map(|s| s.label()).collect();
        println!();
        println!("Degraded stages: {}", names.join(", "));
    }

    if debug {
        for record in state.debug_records() {
            println!();
            println!("--- {} ---", record.stage);
            println!("input:  {} chars", record.input.chars().count());
            println!("prompt: {} chars", record.prompt.chars().count());
            println!("output: {} chars", record.output.chars().count());
            for (key, value) in &record.extra {
                println!("{}: {}", key, value);
            }
        }
    }
}

/// Answer from stored documents only.
pub async fn run_ask(
    harness: &Harness,
    query: &str,
    max_tokens: Option<usize>,
    debug: bool,
    json: bool,
) -> Result<()> {
    let budget = max_tokens.unwrap_or(harness.config.retrieval.max_context_tokens);
    let answer = harness.pipeline.ask(query, budget, debug).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
        return Ok(());
    }

    println!("{}", answer.output);
    println!();
    println!(
        "context_used: {}  context_length: {}",
        answer.context_used, answer.context_length
    );
    if let Some(reason) = &answer.fallback {
        println!("fallback: {}", reason);
    }
    if let Some(d) = &answer.debug {
        println!("{}", serde_json::to_string_pretty(&d.extra)?);
    }
    Ok(())
}
