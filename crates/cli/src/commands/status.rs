use std::path::Path;

use rollcall_core::config::RollcallConfig;
use rollcall_core::db::repository::OperationRepository;
use tracing::info;

/// Run the `status` command: show one sync operation, or the latest.
pub async fn run(config_path: &str, operation_id: Option<i64>) -> anyhow::Result<()> {
    let config = RollcallConfig::load(Path::new(config_path))?;
    config.validate()?;

    info!("Loaded configuration from {}", config_path);

    let db_size = std::fs::metadata(&config.rollcall.database.path)
        .map(|m| format_bytes(m.len()))
        .unwrap_or_else(|_| "unknown".to_string());
    let repo = super::open_repository(&config).await?;

    println!("Rollcall Status");
    println!("===============");
    println!("Instance: {}", config.rollcall.instance_name);
    println!("Database: SQLite ({})", db_size);
    println!();

    let operation = match operation_id {
        Some(id) => repo.get_operation(id).await?,
        None => repo.get_latest_operation().await?,
    };

    match operation {
        Some(op) => {
            println!("Sync Operation");
            println!("--------------");
            println!(
                "Started:   {}",
                op.started_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
            if let Some(completed) = op.completed_at {
                println!("Completed: {}", completed.format("%Y-%m-%d %H:%M:%S UTC"));
            }
            super::sync::print_operation(&op);
        }
        None => match operation_id {
            Some(id) => println!("No operation with id {id}."),
            None => println!("No sync operations recorded."),
        },
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
