//! SQLite-backed ticket store. The full record lives as JSON in the
//! `data` column; `status`, `category`, `dueAt`, `created`, and
//! `updatedAt` are denormalized alongside it for indexed filtering.
//! Attachment files stay on the filesystem under the same ticket
//! directory the file store uses.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;

use crate::attach;
use crate::error::{NoticError, Result};
use crate::hydrate;
use crate::store::{Backend, TicketStore};
use crate::types::Ticket;
use crate::utils::{now_iso, sanitize_id};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS tickets (
    id TEXT PRIMARY KEY,
    data TEXT NOT NULL,
    status TEXT,
    category TEXT,
    dueAt TEXT,
    created TEXT,
    updatedAt TEXT
);
CREATE INDEX IF NOT EXISTS idx_tickets_status ON tickets(status);
CREATE INDEX IF NOT EXISTS idx_tickets_category ON tickets(category);
CREATE INDEX IF NOT EXISTS idx_tickets_dueAt ON tickets(dueAt);
CREATE INDEX IF NOT EXISTS idx_tickets_created ON tickets(created);
";

pub struct DbStore {
    conn: Mutex<Connection>,
    ticket_dir: PathBuf,
}

impl DbStore {
    pub fn open(db_file: &Path, ticket_dir: PathBuf) -> Result<Self> {
        if let Some(parent) = db_file.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        fs::create_dir_all(&ticket_dir)?;

        let conn = Connection::open(db_file)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
            ticket_dir,
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| NoticError::Storage("ticket database lock poisoned".to_string()))
    }

    fn hydrate_row(data: &str) -> Option<Ticket> {
        match serde_json::from_str::<Value>(data) {
            Ok(value) => hydrate::hydrate(&value),
            Err(e) => {
                tracing::warn!("skipping unreadable ticket row: {e}");
                None
            }
        }
    }
}

impl TicketStore for DbStore {
    fn backend(&self) -> Backend {
        Backend::Db
    }

    fn ticket_dir(&self) -> &Path {
        &self.ticket_dir
    }

    fn list(&self) -> Result<Vec<Ticket>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT data FROM tickets ORDER BY datetime(created) DESC, id DESC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut tickets = Vec::new();
        for row in rows {
            if let Some(ticket) = Self::hydrate_row(&row?) {
                tickets.push(ticket);
            }
        }
        Ok(tickets)
    }

    fn get(&self, id: &str) -> Result<Option<Ticket>> {
        let conn = self.conn()?;
        let data: Option<String> = conn
            .query_row("SELECT data FROM tickets WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(data.as_deref().and_then(Self::hydrate_row))
    }

    fn save(&self, mut ticket: Ticket) -> Result<Ticket> {
        hydrate::refresh(&mut ticket);
        if ticket.id.is_empty() {
            return Err(NoticError::Validation(
                "cannot save a ticket without an id".to_string(),
            ));
        }
        let data = serde_json::to_string_pretty(&ticket)?;
        let now = now_iso();

        // created is written on insert only, so the original creation
        // time survives every later upsert
        self.conn()?.execute(
            "INSERT INTO tickets (id, data, status, category, dueAt, created, updatedAt)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
               data = excluded.data,
               status = excluded.status,
               category = excluded.category,
               dueAt = excluded.dueAt,
               updatedAt = excluded.updatedAt",
            params![
                ticket.id,
                data,
                ticket.status.as_str(),
                ticket.category.as_str(),
                ticket.due_at,
                ticket.created,
                now,
            ],
        )?;
        Ok(ticket)
    }

    fn remove(&self, id: &str) -> bool {
        if id.is_empty() {
            return false;
        }
        match self.conn() {
            Ok(conn) => {
                if let Err(e) = conn.execute("DELETE FROM tickets WHERE id = ?1", params![id]) {
                    tracing::warn!("failed to delete ticket row {id}: {e}");
                }
            }
            Err(e) => tracing::warn!("{e}"),
        }

        // parity with the file store: stray JSON documents and the
        // attachment directory are cleaned up too
        let json = self.ticket_dir.join(format!("{}.json", sanitize_id(id)));
        if json.exists()
            && let Err(e) = fs::remove_file(&json)
        {
            tracing::warn!("failed to remove ticket file {}: {e}", json.display());
        }
        attach::remove_ticket_dir(&self.ticket_dir, id);
        true
    }
}
