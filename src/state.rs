use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::db::{AttendanceDb, DbError};
use crate::types::Config;

/// Shared application state.
///
/// Built once at startup and passed to every operation that needs the
/// store; nothing here is a process-wide singleton.
pub struct AppState {
    pub config: Config,
    pub db: Mutex<Option<AttendanceDb>>,
}

impl AppState {
    /// Open the configured database. A database that fails to open leaves
    /// the state usable for read-only directory calls; store operations then
    /// fail with `DbError::Unavailable`.
    pub fn new(config: Config) -> Self {
        let db = match AttendanceDb::open(config.database_path.as_deref()) {
            Ok(db) => Some(db),
            Err(e) => {
                log::warn!("Failed to open attendance database: {e}. Store features disabled.");
                None
            }
        };
        Self {
            config,
            db: Mutex::new(db),
        }
    }

    /// Build state around an already-open database.
    pub fn with_db(config: Config, db: AttendanceDb) -> Self {
        Self {
            config,
            db: Mutex::new(Some(db)),
        }
    }

    /// Run a closure against the database under the lock.
    ///
    /// The lock is held only for the closure; never call this across an
    /// `.await`.
    pub fn with_db_ref<F, T>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&AttendanceDb) -> Result<T, DbError>,
    {
        let guard = self.db.lock();
        let db = guard.as_ref().ok_or(DbError::Unavailable)?;
        f(db)
    }
}

/// Resolve the config directory: `~/.rollcall`.
pub fn get_config_dir() -> Result<PathBuf, String> {
    let home = dirs::home_dir().ok_or("Could not find home directory")?;
    Ok(home.join(".rollcall"))
}

/// Load configuration.
///
/// An explicit path must exist. Without one, `~/.rollcall/config.json` is
/// read if present, else defaults are used (the CRM token can still come
/// from the environment).
pub fn load_config(explicit: Option<&Path>) -> Result<Config, String> {
    let config_path = match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(format!("Config file not found at {}", path.display()));
            }
            path.to_path_buf()
        }
        None => {
            let path = get_config_dir()?.join("config.json");
            if !path.exists() {
                log::info!("No config at {}; using defaults", path.display());
                return Ok(Config::default());
            }
            path
        }
    };

    let content = fs::read_to_string(&config_path)
        .map_err(|e| format!("Failed to read config: {}", e))?;

    let config: Config =
        serde_json::from_str(&content).map_err(|e| format!("Failed to parse config: {}", e))?;

    if config.crm.page_size == 0 {
        return Err("crm.pageSize must be greater than zero".to_string());
    }

    Ok(config)
}
