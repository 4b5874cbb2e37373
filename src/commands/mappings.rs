use anyhow::{Context, Result};

use super::context::AppContext;

pub fn list(ctx: &AppContext) -> Result<()> {
    let mappings = ctx.content.list_mappings()?;
    if mappings.is_empty() {
        println!("No category mappings.");
        return Ok(());
    }

    let categories = ctx.content.list_categories()?;
    println!("{:<40} {}", "REMOTE CATEGORY", "LOCAL CATEGORY");
    for mapping in mappings {
        let local = categories
            .iter()
            .find(|c| c.id == mapping.category_id)
            .map(|c| format!("{} ({})", c.name, c.id))
            .unwrap_or_else(|| format!("{} (missing)", mapping.category_id));
        println!("{:<40} {}", mapping.remote_name, local);
    }
    Ok(())
}

pub fn set(ctx: &AppContext, remote_name: &str, category_id: i64) -> Result<()> {
    let remote_name = remote_name.trim();
    if remote_name.is_empty() {
        anyhow::bail!("remote category name cannot be empty");
    }
    if !ctx.content.category_exists(category_id)? {
        anyhow::bail!("Local category {category_id} does not exist");
    }

    ctx.content.set_mapping(remote_name, category_id)?;
    ctx.activity.info(
        None,
        format!("Category mapping set: {remote_name} -> {category_id}"),
    );
    println!("Mapped \"{remote_name}\" to category {category_id}.");
    Ok(())
}

pub fn remove(ctx: &AppContext, remote_name: &str) -> Result<()> {
    if ctx.content.remove_mapping(remote_name.trim())? {
        ctx.activity
            .info(None, format!("Category mapping removed: {remote_name}"));
        println!("Removed mapping for \"{remote_name}\".");
    } else {
        println!("No mapping for \"{remote_name}\".");
    }
    Ok(())
}

pub fn remap(ctx: &AppContext) -> Result<()> {
    let report = ctx
        .importer
        .remap_categories()
        .context("Category re-mapping failed")?;

    println!("Category re-mapping finished");
    println!("  Posts processed: {}", report.processed);
    println!("  Posts updated:   {}", report.updated);
    println!("  Errors:          {}", report.errors);
    Ok(())
}

pub fn discover(ctx: &AppContext) -> Result<()> {
    let categories = ctx
        .importer
        .discover_categories()
        .context("Failed to collect imported categories")?;
    if categories.is_empty() {
        println!("No categories found in imported posts.");
        return Ok(());
    }

    println!("{:<40} {:>6}  {}", "REMOTE CATEGORY", "POSTS", "MAPPED TO");
    for category in &categories {
        let mapped = category
            .mapped_to
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("{:<40} {:>6}  {}", category.name, category.posts, mapped);
    }

    let unmapped = categories.iter().filter(|c| !c.is_mapped()).count();
    if unmapped > 0 {
        println!();
        println!("{unmapped} unmapped; `syndic mapping create-missing` creates them locally.");
    }
    Ok(())
}

pub fn create_missing(ctx: &AppContext) -> Result<()> {
    let creation = ctx
        .importer
        .create_missing_categories()
        .context("Failed to create missing categories")?;

    for name in &creation.created {
        println!("Created and mapped \"{name}\".");
    }
    println!("Missing categories created");
    println!("  Created:        {}", creation.created.len());
    println!("  Already mapped: {}", creation.already_mapped);
    println!("  Errors:         {}", creation.errors);
    if !creation.created.is_empty() {
        println!("Run `syndic mapping remap` to attach them to imported posts.");
    }
    Ok(())
}

pub fn add_category(ctx: &AppContext, name: &str) -> Result<()> {
    let id = ctx.content.create_category(name)?;
    println!("Category \"{}\" has id {id}.", name.trim());
    Ok(())
}

pub fn list_categories(ctx: &AppContext) -> Result<()> {
    let categories = ctx.content.list_categories()?;
    if categories.is_empty() {
        println!("No local categories.");
        return Ok(());
    }
    println!("{:>6}  {}", "ID", "NAME");
    for category in categories {
        println!("{:>6}  {}", category.id, category.name);
    }
    Ok(())
}
