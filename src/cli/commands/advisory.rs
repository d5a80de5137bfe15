use anyhow::Result;
use serde_json::json;

use launchpad_workflow::{Role, Stage};

use super::{print_json, Command, CommandContext};

pub struct NextCommand {
    pub stage: Stage,
    pub role: Role,
}

impl Command for NextCommand {
    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let next = ctx.engine.get_valid_next_statuses(self.stage, self.role);

        if ctx.json {
            return print_json(&next);
        }

        if next.is_empty() {
            println!("🏁 {} is terminal, no further stages", self.stage);
            return Ok(());
        }
        println!("🧭 Next stages from {} for {}:", self.stage, self.role);
        println!("   💡 Role grants are checked when the transition is requested");
        for stage in &next {
            println!("   ➡️  {} ({}, page {})", stage, stage.label(), stage.page_name());
        }
        Ok(())
    }
}

pub struct ValidateCommand {
    pub current: Stage,
    pub target: Stage,
    pub admin: bool,
}

impl Command for ValidateCommand {
    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let advice = ctx
            .engine
            .validate_site_progression(self.current, self.target, self.admin);

        if ctx.json {
            return print_json(&json!({
                "current": self.current,
                "target": self.target,
                "can_progress": advice.can_progress,
                "message": advice.message,
            }));
        }

        let marker = if advice.can_progress { "✅" } else { "❌" };
        println!("{marker} {} → {}: {}", self.current, self.target, advice.message);
        Ok(())
    }
}
