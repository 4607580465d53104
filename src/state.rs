use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::config::Config;
use crate::db;
use crate::storage::FileStore;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub storage: FileStore,
}

impl AppState {
    /// Open the database, apply migrations and prepare the uploads directory.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let pool = db::create_pool(&config.db_path())?;
        db::run_migrations(&pool)?;

        let storage = FileStore::new(config.uploads_path())?;

        Ok(AppState {
            db: pool,
            config,
            storage,
        })
    }
}
