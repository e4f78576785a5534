//! `stepforge classify`: show how the recovery framework reads an error.

use anyhow::Result;
use console::style;
use stepforge_core::recovery::ErrorRecoveryFramework;
use stepforge_types::config::RecoveryConfig;
use stepforge_types::error::StepError;

pub fn handle_classify(
    message: &str,
    code: Option<&str>,
    config: &RecoveryConfig,
    json: bool,
) -> Result<()> {
    let error = match code {
        Some(code) => StepError::with_code(message, code),
        None => StepError::handler(message),
    };
    let recovery = ErrorRecoveryFramework::new(config.clone());
    let classification = recovery.classify_error(&error, None);
    let strategy = recovery.select_recovery_strategy(&classification);
    let delays: Vec<u64> = (0..strategy.max_retries)
        .map(|n| strategy.backoff.delay_ms(n))
        .collect();

    if json {
        let out = serde_json::json!({
            "message": message,
            "code": code,
            "classification": classification,
            "strategy": strategy,
            "delays_ms": delays,
            "on_exhaustion": recovery.terminal_recommendation(&classification).to_string(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!("  Category:   {}", style(classification.category).cyan());
    println!(
        "  Severity:   {}",
        if classification.is_recoverable() {
            style("recoverable").green()
        } else {
            style("fatal").red()
        }
    );
    println!("  Confidence: {:.2}", classification.confidence);
    println!("  Strategy:   {} (max {} retries)", strategy.kind, strategy.max_retries);
    if !delays.is_empty() {
        let rendered: Vec<String> = delays.iter().map(|d| format!("{d}ms")).collect();
        println!("  Backoff:    {}", rendered.join(" -> "));
    }
    println!(
        "  Exhausted:  {}",
        recovery.terminal_recommendation(&classification)
    );
    println!();
    Ok(())
}
