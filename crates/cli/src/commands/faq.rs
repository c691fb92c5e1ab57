//! `supportline faq`: Score a message against the FAQ table.

use std::path::Path;

use anyhow::Result;
use supportline_engine::FaqMatcher;

use super::runtime;

pub async fn run(config_path: Option<&Path>, message: &str) -> Result<()> {
    let config = runtime::load_config(config_path)?;
    let matcher = runtime::build_matcher(&config)?;

    println!("FAQ file:   {}", config.faq.path);
    println!("Entries:    {}", matcher.len());
    println!("Threshold:  {:.2}", matcher.threshold());
    println!();

    match matcher.best_candidate(message) {
        Some(candidate) => {
            let verdict = if candidate.score >= matcher.threshold() {
                "MATCH"
            } else {
                "below threshold"
            };
            println!("  Best:   #{} \"{}\"", candidate.entry_index, candidate.question);
            println!("  Score:  {:.3} ({verdict})", candidate.score);
            println!("  Answer: {}", candidate.answer);
        }
        None => println!("  No FAQ entries to compare against."),
    }

    Ok(())
}
