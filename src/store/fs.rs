//! File-backed ticket store: one pretty-printed JSON document per
//! ticket, named `<id>.json`, in a flat directory. Attachment
//! subdirectories for each ticket sit alongside the documents.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::attach;
use crate::error::{NoticError, Result};
use crate::hydrate;
use crate::store::{Backend, TicketStore, sort_newest_first};
use crate::types::Ticket;
use crate::utils::sanitize_id;

pub struct FsStore {
    dir: PathBuf,
}

impl FsStore {
    pub fn open(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn ticket_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_id(id)))
    }

    fn read_ticket(path: &Path) -> Result<Option<Ticket>> {
        let raw = fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&raw)?;
        Ok(hydrate::hydrate(&value))
    }
}

impl TicketStore for FsStore {
    fn backend(&self) -> Backend {
        Backend::Fs
    }

    fn ticket_dir(&self) -> &Path {
        &self.dir
    }

    fn list(&self) -> Result<Vec<Ticket>> {
        let mut tickets = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_ticket(&path) {
                Ok(Some(ticket)) => tickets.push(ticket),
                Ok(None) => {
                    tracing::warn!("skipping non-ticket JSON in {}", path.display());
                }
                Err(e) => {
                    tracing::warn!("skipping unreadable ticket file {}: {e}", path.display());
                }
            }
        }
        sort_newest_first(&mut tickets);
        Ok(tickets)
    }

    fn get(&self, id: &str) -> Result<Option<Ticket>> {
        let path = self.ticket_path(id);
        match Self::read_ticket(&path) {
            Ok(ticket) => Ok(ticket),
            Err(NoticError::Io(e)) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn save(&self, mut ticket: Ticket) -> Result<Ticket> {
        hydrate::refresh(&mut ticket);
        if ticket.id.is_empty() {
            return Err(NoticError::Validation(
                "cannot save a ticket without an id".to_string(),
            ));
        }
        let json = serde_json::to_string_pretty(&ticket)?;
        fs::write(self.ticket_path(&ticket.id), json)?;
        Ok(ticket)
    }

    fn remove(&self, id: &str) -> bool {
        if id.is_empty() {
            return false;
        }
        let path = self.ticket_path(id);
        if path.exists()
            && let Err(e) = fs::remove_file(&path)
        {
            tracing::warn!("failed to remove ticket file {}: {e}", path.display());
        }
        attach::remove_ticket_dir(&self.dir, id);
        true
    }
}
