use std::path::Path;

use chrono::NaiveDate;
use rollcall_core::aggregate::{Aggregator, SchoolCalendar};
use rollcall_core::config::RollcallConfig;
use rollcall_core::models::summary::SummaryScope;
use rollcall_core::models::DateRange;
use tracing::info;

/// Run the `recompute` command: rebuild daily summaries for a range
/// from stored events. Used after alias corrections or manual edits
/// to events.
pub async fn run(
    config_path: &str,
    school_id: Option<String>,
    from: NaiveDate,
    to: NaiveDate,
) -> anyhow::Result<()> {
    let config = RollcallConfig::load(Path::new(config_path))?;
    config.validate()?;

    let repo = super::open_repository(&config).await?;
    let calendar = SchoolCalendar::from_config(&config.calendar);
    let aggregator = Aggregator::new(&repo, calendar);

    let scope = SummaryScope::new(school_id.clone(), DateRange::new(from, to)?);
    info!(?school_id, %from, %to, "starting full recompute");

    let written = aggregator.recompute_full(&scope).await?;
    match school_id {
        Some(school) => println!(
            "Rebuilt {written} daily summaries for {school} from {from} to {to}."
        ),
        None => println!("Rebuilt {written} daily summaries from {from} to {to}."),
    }

    Ok(())
}
