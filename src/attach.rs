//! Attachment files on disk.
//!
//! Every ticket owns at most one directory under the attachment root,
//! named by its id, holding the stored files its metadata points at.
//! Both storage backends share this layout; ticket metadata may live
//! in SQLite but attachment bytes are always filesystem-backed.

use std::fs;
use std::path::{Component, Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{NoticError, Result};
use crate::types::AttachmentMeta;
use crate::utils::{file_stamp, now_iso, sanitize_file_name, sanitize_id};

/// Upload cap, enforced before any bytes are written.
pub const MAX_ATTACHMENT_BYTES: u64 = 35 * 1024 * 1024;
pub const MAX_ATTACHMENT_MB: u64 = 35;

/// Name used when an upload arrives without one.
pub const DEFAULT_UPLOAD_NAME: &str = "upload.bin";

pub const DEFAULT_MIME: &str = "application/octet-stream";

static DOT_SLASH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.+/").expect("dot slash regex should be valid"));

/// Directory holding one ticket's attachment files.
pub fn ticket_dir(root: &Path, id: &str) -> PathBuf {
    root.join(sanitize_id(id))
}

/// Write an uploaded file into the ticket's directory and return its
/// metadata. The stored name is `<stamp>-<sanitized original>`, with a
/// counter inserted on collision so repeated uploads within the same
/// second never overwrite each other.
pub fn store_attachment(
    root: &Path,
    id: &str,
    original_name: &str,
    mime: Option<&str>,
    bytes: &[u8],
) -> Result<AttachmentMeta> {
    if bytes.len() as u64 > MAX_ATTACHMENT_BYTES {
        return Err(NoticError::AttachmentTooLarge(
            original_name.to_string(),
            MAX_ATTACHMENT_MB,
        ));
    }

    let safe_name = match sanitize_file_name(original_name) {
        name if name.is_empty() => DEFAULT_UPLOAD_NAME.to_string(),
        name => name,
    };

    let dir = ticket_dir(root, id);
    fs::create_dir_all(&dir)?;

    let stamp = file_stamp();
    let mut stored_name = format!("{stamp}-{safe_name}");
    let mut dest = dir.join(&stored_name);
    let mut counter = 1;
    while dest.exists() {
        stored_name = format!("{stamp}-{counter}-{safe_name}");
        dest = dir.join(&stored_name);
        counter += 1;
    }

    fs::write(&dest, bytes)?;

    Ok(AttachmentMeta {
        original_name: original_name.to_string(),
        stored_name,
        size: bytes.len() as u64,
        mime: mime.unwrap_or(DEFAULT_MIME).to_string(),
        uploaded_at: now_iso(),
    })
}

/// Resolve a stored file name to its on-disk path for download.
///
/// Traversal sequences are stripped rather than rejected, so a mangled
/// but recoverable name still resolves; anything that is not a plain
/// file name after cleaning is refused.
pub fn resolve_attachment(root: &Path, id: &str, file: &str) -> Result<PathBuf> {
    let cleaned = DOT_SLASH.replace_all(file, "");
    let mut components = Path::new(cleaned.as_ref()).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => {}
        _ => return Err(NoticError::Validation("Invalid file path".to_string())),
    }
    let path = ticket_dir(root, id).join(cleaned.as_ref());
    if !path.is_file() {
        return Err(NoticError::AttachmentNotFound(file.to_string()));
    }
    Ok(path)
}

/// Best-effort removal of a ticket's attachment directory.
pub fn remove_ticket_dir(root: &Path, id: &str) {
    let dir = ticket_dir(root, id);
    if dir.exists()
        && let Err(e) = fs::remove_dir_all(&dir)
    {
        tracing::warn!("failed to remove attachment dir for {id}: {e}");
    }
}

/// Move every listed attachment file from the source ticket's
/// directory into the target's, renaming `-merged-N` before the
/// extension on collision. Files missing on disk or failing to move
/// are skipped, so the returned metadata covers only what actually
/// arrived. The source directory is pruned afterwards if it emptied.
pub fn move_attachments(
    root: &Path,
    source_id: &str,
    target_id: &str,
    attachments: &[AttachmentMeta],
) -> Vec<AttachmentMeta> {
    let src_dir = ticket_dir(root, source_id);
    let dst_dir = ticket_dir(root, target_id);
    let mut moved = Vec::new();

    for meta in attachments {
        let file_name = if !meta.stored_name.is_empty() {
            meta.stored_name.clone()
        } else if !meta.original_name.is_empty() {
            meta.original_name.clone()
        } else {
            "file.bin".to_string()
        };
        let src_path = src_dir.join(&file_name);
        if !src_path.exists() {
            continue;
        }

        if let Err(e) = fs::create_dir_all(&dst_dir) {
            tracing::warn!("failed to create attachment dir for {target_id}: {e}");
            continue;
        }

        let dest_name = unique_dest_name(&dst_dir, &file_name);
        let dest_path = dst_dir.join(&dest_name);
        if let Err(rename_err) = fs::rename(&src_path, &dest_path) {
            // Cross-device moves fall back to copy-then-delete.
            let copied = fs::copy(&src_path, &dest_path).and_then(|_| fs::remove_file(&src_path));
            if let Err(e) = copied {
                tracing::warn!(
                    "failed to move attachment {file_name} from {source_id} to {target_id}: {rename_err}; {e}"
                );
                continue;
            }
        }

        moved.push(AttachmentMeta {
            stored_name: dest_name,
            ..meta.clone()
        });
    }

    if src_dir.exists()
        && let Ok(mut entries) = fs::read_dir(&src_dir)
        && entries.next().is_none()
    {
        let _ = fs::remove_dir(&src_dir);
    }

    moved
}

fn unique_dest_name(dir: &Path, file_name: &str) -> String {
    if !dir.join(file_name).exists() {
        return file_name.to_string();
    }
    let path = Path::new(file_name);
    let (base, ext) = match (path.file_stem(), path.extension()) {
        (Some(stem), Some(ext)) => (
            stem.to_string_lossy().into_owned(),
            format!(".{}", ext.to_string_lossy()),
        ),
        _ => (file_name.to_string(), String::new()),
    };
    let mut i = 1;
    loop {
        let candidate = format!("{base}-merged-{i}{ext}");
        if !dir.join(&candidate).exists() {
            return candidate;
        }
        i += 1;
    }
}
