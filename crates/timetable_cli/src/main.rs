//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `timetable_core` linkage and database bootstrap from a shell.
//! - Keep output deterministic for quick local sanity checks.
//!
//! Usage: `timetable_cli [DB_PATH]`. Without a path an in-memory database is
//! used. Set `TIMETABLE_LOG_DIR` to an absolute path to enable file logging.

use log::info;
use std::process::ExitCode;
use timetable_core::db::migrations::current_user_version;
use timetable_core::{
    default_log_level, init_logging, open_db, open_db_in_memory, LoggingConfig,
    SqliteDocumentStore,
};

fn main() -> ExitCode {
    if let Ok(log_dir) = std::env::var("TIMETABLE_LOG_DIR") {
        if let Err(err) = init_logging(&LoggingConfig::new(default_log_level(), log_dir)) {
            eprintln!("logging disabled: {err}");
        }
    }

    println!("timetable_core ping={}", timetable_core::ping());
    println!("timetable_core version={}", timetable_core::core_version());

    let path = std::env::args().nth(1);
    let conn = match path.as_deref() {
        Some(path) => open_db(path),
        None => open_db_in_memory(),
    };
    let conn = match conn {
        Ok(conn) => conn,
        Err(err) => {
            eprintln!("failed to open database: {err}");
            return ExitCode::FAILURE;
        }
    };

    let schema_version = match current_user_version(&conn) {
        Ok(version) => version,
        Err(err) => {
            eprintln!("failed to read schema version: {err}");
            return ExitCode::FAILURE;
        }
    };
    println!("timetable_core schema_version={schema_version}");

    if let Err(err) = SqliteDocumentStore::try_new(&conn) {
        eprintln!("document store not ready: {err}");
        return ExitCode::FAILURE;
    }
    println!("timetable_core store=ready");
    info!("event=cli_check module=cli status=ok schema_version={schema_version}");
    ExitCode::SUCCESS
}
