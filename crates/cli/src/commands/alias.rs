use std::path::Path;

use rollcall_core::config::RollcallConfig;
use rollcall_core::db::repository::SchoolRepository;
use tracing::info;

/// Run the `alias` command: map an additional source code onto a
/// school, for codes the source reports inconsistently.
pub async fn run(config_path: &str, school_id: &str, code: &str) -> anyhow::Result<()> {
    let config = RollcallConfig::load(Path::new(config_path))?;
    config.validate()?;

    let repo = super::open_repository(&config).await?;

    let school = repo
        .get_school(school_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("no school with id {school_id:?}"))?;

    repo.add_school_alias(school_id, code).await?;
    info!(school_id, code, "registered school alias");

    println!("Mapped source code {code:?} to {} ({school_id}).", school.name);
    println!(
        "Events previously skipped under this code are picked up on the next sync; \
         run `rollcall recompute` afterwards to rebuild summaries."
    );

    Ok(())
}
