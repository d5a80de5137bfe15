use anyhow::Result;

use super::{print_json, Command, CommandContext};

pub struct AuditCommand {
    pub site_id: String,
}

impl Command for AuditCommand {
    async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let entries = ctx
            .engine
            .get_site_audit_logs(&self.site_id, &ctx.cancel)
            .await?;

        if ctx.json {
            return print_json(&entries);
        }

        println!("📜 AUDIT LOG: {}", self.site_id);
        println!("────────────────────");
        if entries.is_empty() {
            println!("📋 No transitions recorded");
            return Ok(());
        }

        for entry in &entries {
            let flag = if entry.admin_override { " ⚠️ override" } else { "" };
            println!(
                "🕒 {}  {} → {}  by {} ({}){}",
                entry.created_at.to_rfc3339(),
                entry.from_stage,
                entry.to_stage,
                entry.actor_id,
                entry.actor_role,
                flag
            );
            if let Some(reason) = &entry.reason {
                println!("   📝 {reason}");
            }
        }
        Ok(())
    }
}
