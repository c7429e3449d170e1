//! Ticket persistence.
//!
//! Two interchangeable backends sit behind [`TicketStore`]: one JSON
//! document per ticket in a directory, or rows in a SQLite table with
//! the full record in a JSON column. Which one runs is decided once at
//! startup by [`open_store`]; a database that fails to open degrades
//! to the file store so the desk still comes up.
//!
//! Attachment files always live on the filesystem under the ticket
//! directory, one subdirectory per ticket id, regardless of backend.

mod db;
mod fs;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use db::DbStore;
pub use fs::FsStore;

use crate::error::Result;
use crate::types::Ticket;
use crate::utils::parse_ts;

/// Database location used when `DB_FILE` is not set.
pub const DEFAULT_DB_FILE: &str = "data/tickets.db";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Fs,
    Db,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Fs => write!(f, "fs"),
            Backend::Db => write!(f, "db"),
        }
    }
}

/// Contract both backends implement. Every ticket handed out has
/// passed through the hydrator; `save` re-applies the hydration
/// guarantees before writing.
pub trait TicketStore: Send + Sync {
    fn backend(&self) -> Backend;

    /// Root under which per-ticket attachment directories live. Shared
    /// infrastructure even when ticket metadata is in the database.
    fn ticket_dir(&self) -> &Path;

    /// All tickets, newest created first, ties broken by id descending.
    fn list(&self) -> Result<Vec<Ticket>>;

    fn get(&self, id: &str) -> Result<Option<Ticket>>;

    /// Upsert by id, full overwrite of the stored record.
    fn save(&self, ticket: Ticket) -> Result<Ticket>;

    /// Delete the record and its attachment directory. Best-effort:
    /// returns true for any non-empty id, present or not.
    fn remove(&self, id: &str) -> bool;
}

/// Pick and initialize the backend.
///
/// `backend` values `db` and `sqlite` (any case) select SQLite, as
/// does a configured `db_file` on its own. A database that cannot be
/// opened logs a warning and falls back to the file store; only a file
/// store that cannot be created fails startup.
pub fn open_store(
    ticket_dir: &Path,
    backend: Option<&str>,
    db_file: Option<&Path>,
) -> Result<Arc<dyn TicketStore>> {
    let prefer_db = backend
        .map(|b| b.eq_ignore_ascii_case("db") || b.eq_ignore_ascii_case("sqlite"))
        .unwrap_or(false)
        || db_file.is_some();

    if prefer_db {
        let path = db_file
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_FILE));
        match DbStore::open(&path, ticket_dir.to_path_buf()) {
            Ok(store) => return Ok(Arc::new(store)),
            Err(e) => {
                tracing::warn!("falling back to file store; failed to open ticket database: {e}");
            }
        }
    }

    Ok(Arc::new(FsStore::open(ticket_dir.to_path_buf())?))
}

/// `created` descending, then id descending, matching the database
/// backend's `ORDER BY`. Unparseable `created` values sort last.
pub(crate) fn sort_newest_first(tickets: &mut [Ticket]) {
    tickets.sort_by(|a, b| {
        parse_ts(&b.created)
            .cmp(&parse_ts(&a.created))
            .then_with(|| b.id.cmp(&a.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hydrate::hydrate;
    use serde_json::json;
    use tempfile::TempDir;

    fn ticket(id: &str, created: &str) -> Ticket {
        hydrate(&json!({ "id": id, "created": created })).unwrap()
    }

    #[test]
    fn test_sort_newest_first() {
        let mut tickets = vec![
            ticket("NTC-OLD001", "2024-01-01T00:00:00Z"),
            ticket("NTC-NEW001", "2024-06-01T00:00:00Z"),
            ticket("NTC-MID001", "2024-03-01T00:00:00Z"),
        ];
        sort_newest_first(&mut tickets);
        let ids: Vec<&str> = tickets.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, ["NTC-NEW001", "NTC-MID001", "NTC-OLD001"]);
    }

    #[test]
    fn test_sort_ties_break_by_id_descending() {
        let mut tickets = vec![
            ticket("NTC-AAAAAA", "2024-01-01T00:00:00Z"),
            ticket("NTC-ZZZZZZ", "2024-01-01T00:00:00Z"),
        ];
        sort_newest_first(&mut tickets);
        assert_eq!(tickets[0].id, "NTC-ZZZZZZ");
    }

    #[test]
    fn test_open_store_defaults_to_fs() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp.path().join("Ticket"), None, None).unwrap();
        assert_eq!(store.backend(), Backend::Fs);
    }

    #[test]
    fn test_open_store_backend_flag_selects_db() {
        let tmp = TempDir::new().unwrap();
        let db_file = tmp.path().join("tickets.db");
        let store = open_store(
            &tmp.path().join("Ticket"),
            Some("SQLite"),
            Some(&db_file),
        )
        .unwrap();
        assert_eq!(store.backend(), Backend::Db);
    }

    #[test]
    fn test_open_store_db_file_alone_selects_db() {
        let tmp = TempDir::new().unwrap();
        let db_file = tmp.path().join("tickets.db");
        let store = open_store(&tmp.path().join("Ticket"), None, Some(&db_file)).unwrap();
        assert_eq!(store.backend(), Backend::Db);
    }

    #[test]
    fn test_open_store_falls_back_when_db_unopenable() {
        let tmp = TempDir::new().unwrap();
        // a directory is not a valid database file
        let store = open_store(&tmp.path().join("Ticket"), Some("db"), Some(tmp.path())).unwrap();
        assert_eq!(store.backend(), Backend::Fs);
    }
}
