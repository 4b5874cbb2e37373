use anyhow::Result;

use syndic::models::Severity;

use super::context::AppContext;

pub fn list(
    ctx: &AppContext,
    limit: usize,
    severity: Option<Severity>,
    source: Option<&str>,
) -> Result<()> {
    let entries = ctx.activity.log().recent(limit, severity, source)?;
    if entries.is_empty() {
        println!("No log entries.");
        return Ok(());
    }

    for entry in entries {
        println!(
            "{} [{:<7}] {}{}",
            entry.created_at.format("%Y-%m-%d %H:%M:%S"),
            entry.severity.as_str(),
            entry
                .source_url
                .map(|url| format!("{url}: "))
                .unwrap_or_default(),
            entry.message
        );
    }
    Ok(())
}

pub fn prune(ctx: &AppContext, days: Option<u32>) -> Result<()> {
    let days = days.unwrap_or(ctx.config.logging.retention_days);
    let removed = ctx.activity.prune(days)?;
    println!("Removed {removed} entries older than {days} days.");
    Ok(())
}

pub fn clear(ctx: &AppContext) -> Result<()> {
    let removed = ctx.activity.log().clear()?;
    println!("Removed {removed} entries.");
    Ok(())
}
