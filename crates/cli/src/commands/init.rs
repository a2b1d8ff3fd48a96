use std::path::Path;

use rollcall_core::config::{DatabaseConfig, RollcallConfig};
use rollcall_core::db::repository::SchoolRepository;
use rollcall_core::db::sqlite::SqliteRepository;
use rollcall_core::db::DatabasePool;
use rollcall_core::models::school::SchoolMapping;
use rollcall_core::source::client::SourceClient;
use rollcall_core::source::AttendanceSource;
use tracing::{info, warn};

/// Run the `init` command: create the data directory, write a default
/// config, and set up the database. With `--discover`, also pull the
/// school registry from the source.
pub async fn run(data_dir: &str, discover: bool) -> anyhow::Result<()> {
    let data_path = Path::new(data_dir);

    if !data_path.exists() {
        std::fs::create_dir_all(data_path)?;
        info!("Created data directory: {}", data_dir);
    }

    let db_path = data_path.join("rollcall.db");
    let db_path_str = db_path.to_string_lossy().to_string();

    let mut config = RollcallConfig::generate_default();
    config.rollcall.data_dir = data_dir.to_string();
    config.rollcall.database = DatabaseConfig {
        path: db_path_str.clone(),
    };

    let config_path = data_path.join("rollcall.toml");
    let toml_str = toml::to_string_pretty(&config)?;
    std::fs::write(&config_path, &toml_str)?;
    info!("Wrote configuration to {}", config_path.display());

    // Create database and run migrations
    let connect_str = format!("sqlite:{}?mode=rwc", db_path_str);
    let pool = DatabasePool::new_sqlite(&connect_str).await?;
    info!("Database initialized at {}", db_path_str);

    if discover {
        if config.source.enabled {
            let DatabasePool::Sqlite(sqlite_pool) = pool;
            let repo = SqliteRepository::new(sqlite_pool);
            let client = SourceClient::new(&config.source)?;
            let schools = client.fetch_schools().await?;
            for raw in &schools {
                repo.upsert_school(&SchoolMapping::new(
                    &format!("sch-{}", raw.school_code),
                    &raw.name,
                    &raw.school_code,
                    raw.period_count,
                ))
                .await?;
            }
            println!("Discovered {} schools from the source.", schools.len());
        } else {
            warn!("--discover requested but the source is not enabled in the generated config");
            println!("Skipping discovery: enable [source] in the config first.");
        }
    }

    println!("Rollcall initialized successfully!");
    println!("  Data directory: {}", data_dir);
    println!("  Configuration:  {}", config_path.display());
    println!("  Database:       {}", db_path_str);
    println!();
    println!("Next steps:");
    println!(
        "  1. Edit {} to configure the source connection",
        config_path.display()
    );
    println!("  2. Run `rollcall init --discover` to import the school registry");
    println!("  3. Run `rollcall sync --from <date> --to <date>` for the first sync");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn init_creates_files_in_temp_dir() {
        let temp_dir = std::env::temp_dir().join("rollcall_test_init");
        // Clean up from any previous run
        let _ = std::fs::remove_dir_all(&temp_dir);

        let data_dir = temp_dir.to_string_lossy().to_string();
        run(&data_dir, false).await.unwrap();

        assert!(temp_dir.exists());

        let config_path = temp_dir.join("rollcall.toml");
        assert!(config_path.exists());
        let content = std::fs::read_to_string(&config_path).unwrap();
        let config: RollcallConfig = toml::from_str(&content).unwrap();
        assert_eq!(config.rollcall.instance_name, "My School District");
        assert_eq!(config.rollcall.data_dir, data_dir);
        assert!(!config.source.enabled);

        let db_path = temp_dir.join("rollcall.db");
        assert!(db_path.exists());
        assert_eq!(
            config.rollcall.database.path,
            db_path.to_string_lossy().to_string()
        );

        let _ = std::fs::remove_dir_all(&temp_dir);
    }

    #[tokio::test]
    async fn init_discover_without_source_is_a_noop() {
        let temp_dir = std::env::temp_dir().join("rollcall_test_init_discover");
        let _ = std::fs::remove_dir_all(&temp_dir);

        let data_dir = temp_dir.to_string_lossy().to_string();
        // The generated config has the source disabled, so discovery
        // is skipped rather than failing.
        run(&data_dir, true).await.unwrap();

        let _ = std::fs::remove_dir_all(&temp_dir);
    }
}
