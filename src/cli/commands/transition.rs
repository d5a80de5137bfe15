use anyhow::{bail, Result};

use launchpad_workflow::{Role, Stage, TransitionRequest};

use super::{print_json, Command, CommandContext};

pub struct TransitionCommand {
    pub site_id: String,
    pub to: Stage,
    pub actor: String,
    pub role: Role,
    pub from: Option<Stage>,
    pub reason: Option<String>,
}

impl Command for TransitionCommand {
    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let from = match self.from {
            Some(from) => from,
            None => ctx.engine.current_stage(&self.site_id, &ctx.cancel).await?,
        };

        let mut request = TransitionRequest::new(&self.site_id, from, self.to, &self.actor, self.role);
        if let Some(reason) = &self.reason {
            request = request.with_reason(reason);
        }

        let result = ctx.engine.transition_site_status(&request, &ctx.cancel).await;

        if ctx.json {
            print_json(&result)?;
        } else if result.success {
            if result.admin_override {
                println!("⚠️  {}", result.message);
            } else {
                println!("✅ {}", result.message);
            }
            println!("   📍 Site {} is now at: {}", self.site_id, self.to.label());
        } else {
            println!("❌ {}", result.message);
            if result.is_retryable() {
                println!("   💡 Re-read the current stage and retry");
            }
        }

        if !result.success {
            bail!("transition of site {} was not applied", self.site_id);
        }
        Ok(())
    }
}
