use anyhow::Result;

use super::{print_json, Command, CommandContext};

pub struct CreateSiteCommand {
    pub site_id: String,
}

impl CreateSiteCommand {
    pub fn new(site_id: impl Into<String>) -> Self {
        Self {
            site_id: site_id.into(),
        }
    }
}

impl Command for CreateSiteCommand {
    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let record = ctx.engine.create_site(&self.site_id, &ctx.cancel).await?;

        if ctx.json {
            return print_json(&record);
        }

        println!("🏗️  Site {} created", record.site_id);
        println!("   📍 Stage: {} ({})", record.stage.label(), record.stage);
        println!("   🕒 Created: {}", record.created_at.to_rfc3339());
        Ok(())
    }
}
