use anyhow::Result;

use super::context::AppContext;

pub async fn pause(ctx: &AppContext) -> Result<()> {
    ctx.scheduler.pause().await?;
    println!("Scheduler paused. Cycles will be skipped until `syndic resume`.");
    Ok(())
}

pub async fn resume(ctx: &AppContext) -> Result<()> {
    ctx.scheduler.resume().await?;
    println!("Scheduler resumed.");
    Ok(())
}

pub async fn force_run(ctx: &AppContext) -> Result<()> {
    ctx.scheduler.force_run().await?;
    println!("Run scheduled for now. A running daemon picks it up on its next poll.");
    Ok(())
}

pub async fn unlock(ctx: &AppContext) -> Result<()> {
    if ctx.scheduler.force_unlock().await? {
        println!("Run lock removed.");
    } else {
        println!("Run lock was not held.");
    }
    Ok(())
}

pub async fn status(ctx: &AppContext) -> Result<()> {
    let stats = ctx.registry.statistics().await?;
    let next_run = ctx.scheduler.control().next_run().await?;

    println!("syndic status");
    println!("=============");
    println!("  Running:           {}", yes_no(stats.is_running));
    println!("  Paused:            {}", yes_no(stats.is_paused));
    println!(
        "  Next run:          {}",
        next_run
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "not scheduled".to_string())
    );
    println!();
    println!("  Sources:           {}", stats.total_sources);
    println!("    active:          {}", stats.active_sources);
    println!("    completed:       {}", stats.completed_sources);
    println!("    error:           {}", stats.error_sources);
    println!("  Posts imported:    {}", stats.total_posts);
    println!("  Success rate:      {:.2}%", stats.success_rate);
    println!("  Posts per source:  {:.2}", stats.average_posts_per_source);
    Ok(())
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}
