use anyhow::Result;

use super::context::AppContext;

pub fn restore(ctx: &AppContext, post_id: i64) -> Result<()> {
    ctx.importer.restore_original(post_id)?;
    println!("Restored original title, content and excerpt of post {post_id}.");
    Ok(())
}

pub async fn reparaphrase(ctx: &AppContext, post_id: i64) -> Result<()> {
    let updated = ctx.importer.reparaphrase(post_id).await?;
    println!("Post {post_id}: {updated} of 3 fields re-paraphrased.");
    Ok(())
}
