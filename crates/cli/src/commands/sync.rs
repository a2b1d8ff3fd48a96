use std::path::Path;
use std::time::Instant;

use chrono::{NaiveDate, Utc};
use rollcall_core::aggregate::SchoolCalendar;
use rollcall_core::config::RollcallConfig;
use rollcall_core::models::operation::SyncOperation;
use rollcall_core::models::DateRange;
use rollcall_core::orchestrator::{SyncOrchestrator, SyncScope};
use rollcall_core::source::client::SourceClient;
use tracing::{error, info, warn};

/// Run the `sync` command: sync attendance for a date range, or resume
/// a previous operation.
pub async fn run(
    config_path: &str,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    school_ids: Vec<String>,
    resume: Option<i64>,
) -> anyhow::Result<()> {
    let config = RollcallConfig::load(Path::new(config_path))?;
    config.validate()?;

    info!("Loaded configuration from {}", config_path);

    if !config.source.enabled {
        warn!("source integration is not enabled in the configuration");
        println!("The source is disabled. Enable it in your config file first.");
        return Ok(());
    }

    let repo = super::open_repository(&config).await?;
    let client = SourceClient::new(&config.source)?;
    let calendar = SchoolCalendar::from_config(&config.calendar);
    let orchestrator = SyncOrchestrator::new(&repo, calendar, config.sync.batch_size);

    let start = Instant::now();
    let result = match resume {
        Some(operation_id) => {
            println!("Resuming operation {operation_id}...");
            orchestrator.resume(&client, operation_id).await
        }
        None => {
            let start_date = from.unwrap_or_else(|| Utc::now().date_naive());
            let end_date = to.unwrap_or(start_date);
            let range = DateRange::new(start_date, end_date)?;
            println!(
                "Syncing attendance for {} through {}...",
                range.start, range.end
            );
            orchestrator
                .run(&client, &SyncScope { school_ids, range })
                .await
        }
    };

    match result {
        Ok(operation) => {
            println!(
                "Sync finished in {:.1}s",
                start.elapsed().as_secs_f64()
            );
            print_operation(&operation);
            Ok(())
        }
        Err(e) => {
            error!("Sync failed: {e}");
            println!("Sync failed: {e}");
            Err(e.into())
        }
    }
}

pub(crate) fn print_operation(operation: &SyncOperation) {
    println!("  Operation: {}", operation.id);
    println!("  Status:    {:?}", operation.status);
    println!(
        "  Range:     {} to {}",
        operation.range.start, operation.range.end
    );
    for school in &operation.schools {
        println!(
            "  {}: {:?} (students {}, events {}, rejected {}, low-fidelity {}, gaps {})",
            school.school_id,
            school.status,
            school.students_synced,
            school.events_loaded,
            school.records_rejected,
            school.records_low_fidelity,
            school.reconciliation_gaps,
        );
    }
    for err in &operation.errors {
        match &err.school_id {
            Some(school) => println!("  Error [{}] {}: {}", err.kind, school, err.message),
            None => println!("  Error [{}]: {}", err.kind, err.message),
        }
    }
}
