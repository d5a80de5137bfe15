use anyhow::Result;

use launchpad_workflow::WorkflowStats;

use super::{print_json, Command, CommandContext};

pub struct StatsCommand;

impl Command for StatsCommand {
    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let counts = ctx.engine.get_workflow_stats(&ctx.cancel).await?;

        if ctx.json {
            return print_json(&counts);
        }

        println!("📊 SITES PER STAGE:");
        println!("────────────────────");
        for (stage, count) in &counts {
            println!("   {:<18} {:>5}  {}", stage.as_str(), count, stage.label());
        }
        println!();
        println!("   🎯 Total sites: {}", WorkflowStats::total(&counts));
        Ok(())
    }
}
