//! `stepforge wait-plan`: preview the adaptive wait for an action.

use anyhow::Result;
use console::style;
use stepforge_core::repository::timing::TimingHistory;
use stepforge_core::timing::{TimingContext, TimingController};
use stepforge_types::step::ActionKind;
use stepforge_types::timing::{NetworkConditions, PageComplexity, WaitStrategy};

pub struct WaitPlanArgs {
    pub action: ActionKind,
    pub latency_ms: Option<f64>,
    pub throughput_kbps: Option<f64>,
    pub dom_nodes: u32,
    pub selector: Option<String>,
}

pub fn plan(
    controller: &TimingController,
    history: &dyn TimingHistory,
    args: &WaitPlanArgs,
) -> (TimingContext, WaitStrategy) {
    let baseline = NetworkConditions::default();
    let ctx = TimingContext {
        network: NetworkConditions {
            latency_ms: args.latency_ms.unwrap_or(baseline.latency_ms),
            throughput_kbps: args.throughput_kbps.unwrap_or(baseline.throughput_kbps),
        },
        complexity: PageComplexity {
            dom_nodes: args.dom_nodes,
            ..Default::default()
        },
        history: args.selector.as_deref().and_then(|s| history.lookup(s)),
    };
    let strategy = controller.calculate_optimal_wait(args.action, &ctx);
    (ctx, strategy)
}

pub fn handle_wait_plan(
    controller: &TimingController,
    history: &dyn TimingHistory,
    args: &WaitPlanArgs,
    json: bool,
) -> Result<()> {
    let (ctx, strategy) = plan(controller, history, args);

    if json {
        let out = serde_json::json!({
            "action": args.action.as_str(),
            "network": ctx.network,
            "dom_nodes": ctx.complexity.dom_nodes,
            "history": ctx.history,
            "wait": strategy,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} wait plan for '{}'",
        style("*").green().bold(),
        style(args.action).cyan()
    );
    println!("  Timeout:   {}ms", strategy.timeout_ms);
    println!("  Condition: {}", strategy.strategy);
    if !strategy.fallback_strategies.is_empty() {
        let fallbacks: Vec<String> = strategy
            .fallback_strategies
            .iter()
            .map(ToString::to_string)
            .collect();
        println!("  Fallbacks: {}", fallbacks.join(", "));
    }
    match &ctx.history {
        Some(h) => println!(
            "  History:   {:.0}ms avg, {:.0}% success over {} runs",
            h.average_ms,
            h.success_rate * 100.0,
            h.samples
        ),
        None if args.selector.is_some() => println!("  History:   {}", style("none recorded").dim()),
        None => {}
    }
    println!();
    Ok(())
}
