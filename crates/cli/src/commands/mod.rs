pub mod alias;
pub mod init;
pub mod recompute;
pub mod status;
pub mod sync;

use rollcall_core::config::RollcallConfig;
use rollcall_core::db::sqlite::SqliteRepository;
use rollcall_core::db::DatabasePool;

/// Open the configured SQLite database and wrap it in a repository.
pub(crate) async fn open_repository(config: &RollcallConfig) -> anyhow::Result<SqliteRepository> {
    let connect_str = format!("sqlite:{}?mode=rwc", config.rollcall.database.path);
    let pool = DatabasePool::new_sqlite(&connect_str).await?;
    let DatabasePool::Sqlite(sqlite_pool) = pool;
    Ok(SqliteRepository::new(sqlite_pool))
}
