use anyhow::Result;
use chrono::{NaiveDate, Utc};

use syndic::models::Source;

use super::context::AppContext;

pub async fn add(
    ctx: &AppContext,
    url: &str,
    start_date: Option<NaiveDate>,
    post_type: &str,
    verify: bool,
) -> Result<()> {
    let start_date = start_date.unwrap_or_else(|| Utc::now().date_naive());
    let source = ctx.registry.add(url, start_date, post_type, verify).await?;

    println!("Source added");
    print_source(&source);
    Ok(())
}

pub fn list(ctx: &AppContext) -> Result<()> {
    let sources = ctx.registry.list()?;
    if sources.is_empty() {
        println!("No sources registered. Add one with `syndic source add <url>`.");
        return Ok(());
    }

    println!(
        "{:<60} {:<12} {:>5} {:>6} {:>7}  {}",
        "URL", "STATUS", "PAGE", "ERRORS", "POSTS", "LAST PROCESSED"
    );
    for source in &sources {
        println!(
            "{:<60} {:<12} {:>5} {:>6} {:>7}  {}",
            source.url,
            source.status.as_str(),
            source.current_page,
            source.error_count,
            source.posts_count,
            source
                .last_processed_at
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "-".to_string())
        );
    }
    println!("\n{} source(s)", sources.len());
    Ok(())
}

pub fn delete(ctx: &AppContext, url: &str) -> Result<()> {
    if ctx.registry.delete(url)? {
        println!("Source deleted: {url}");
    } else {
        println!("Source not found: {url}");
    }
    Ok(())
}

pub fn reset(ctx: &AppContext, url: &str) -> Result<()> {
    let source = ctx.registry.reset(url)?;
    println!("Source reset");
    print_source(&source);
    Ok(())
}

fn print_source(source: &Source) {
    println!("  URL:        {}", source.url);
    println!("  Status:     {}", source.status);
    println!("  Start date: {}", source.start_date);
    println!("  Post type:  {}", source.post_type);
    println!("  Page:       {}", source.current_page);
}
