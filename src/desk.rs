//! Ticket lifecycle engine.
//!
//! Every operation the HTTP surface exposes funnels through [`Desk`]:
//! it owns the store, the outbound mailer, and the user directory, and
//! encodes the ordering rules the rest of the system relies on. The
//! load-bearing one: state is persisted before any notification goes
//! out, so a slow or failing mail transport can never roll back or
//! block a ticket change.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::attach;
use crate::category::Category;
use crate::directory::{Directory, Resolution};
use crate::error::{NoticError, Result};
use crate::mail::{self, Mailer, templates};
use crate::settings::{MailConfig, Settings, SettingsPatch};
use crate::store::{Backend, TicketStore};
use crate::types::{AttachmentMeta, Feedback, Rating, Ticket, TicketStatus, TicketUpdate};
use crate::utils::{
    add_minutes, format_ts, generate_ticket_id, minutes_between, normalize_issue, now_iso,
    parse_ts, ticket_prefix,
};

/// Longest feedback comment kept; anything beyond is cut, not rejected.
const FEEDBACK_COMMENT_MAX: usize = 1000;

/// A submitted support request, before it becomes a ticket.
#[derive(Debug, Clone, Default)]
pub struct NewTicket {
    pub name: String,
    pub issue: String,
    pub attachment: Option<IncomingFile>,
}

/// An uploaded file as it arrives off the wire.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    /// Client-supplied name; empty falls back to a generic one.
    pub name: String,
    pub mime: Option<String>,
    pub bytes: Vec<u8>,
}

/// Response to a successful submission. The ticket itself stays out of
/// the serialized body; submitters get a confirmation and an id.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOutcome {
    pub message: String,
    pub id: String,
    /// Set when the ticket was created but its attachment was not.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment_error: Option<String>,
    #[serde(skip)]
    pub ticket: Ticket,
}

/// Partial admin edit; absent fields leave the ticket untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdatePatch {
    /// New status by display name. Empty keeps the current one.
    pub status: Option<String>,
    pub category: Option<String>,
    /// Requester address list; empty strings are ignored.
    pub email: Option<String>,
    /// Link to another ticket. Empty clears the link.
    pub related: Option<String>,
    /// Rewrites the SLA window, re-deriving the due date from creation.
    pub sla_hours: Option<f64>,
    /// Explicit due date; wins over `sla_hours` when both are present.
    pub due_at: Option<String>,
    /// Free-text progress note appended to the history.
    pub update: Option<String>,
}

/// List query; unknown values fall back to "everything".
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TicketFilter {
    pub status: Option<String>,
    pub category: Option<String>,
}

/// Aggregates for the admin dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeskStats {
    pub total: usize,
    pub open: usize,
    pub closed: usize,
    pub overdue: usize,
    /// Mean minutes from creation to the first history entry, over
    /// tickets that have one. `None` when no ticket qualifies.
    pub avg_first_response_minutes: Option<i64>,
    pub avg_resolve_minutes: Option<i64>,
}

/// The lifecycle engine. Cheap to share behind an `Arc`; all state
/// lives in the store and the settings file.
pub struct Desk {
    store: Arc<dyn TicketStore>,
    mailer: Arc<dyn Mailer>,
    directory: Directory,
    settings_path: PathBuf,
    base_url: String,
    /// Helpdesk inbox notified of new tickets. Empty disables that mail.
    intake_email: String,
}

impl Desk {
    pub fn new(
        store: Arc<dyn TicketStore>,
        mailer: Arc<dyn Mailer>,
        directory: Directory,
        settings_path: PathBuf,
        mail: &MailConfig,
    ) -> Desk {
        Desk {
            store,
            mailer,
            directory,
            settings_path,
            base_url: mail.base_url.clone(),
            intake_email: mail.to_email.clone(),
        }
    }

    pub fn backend(&self) -> Backend {
        self.store.backend()
    }

    pub fn ticket_dir(&self) -> &Path {
        self.store.ticket_dir()
    }

    pub fn settings(&self) -> Settings {
        Settings::load(&self.settings_path)
    }

    pub fn update_settings(&self, patch: &SettingsPatch) -> Result<Settings> {
        Settings::save(&self.settings_path, patch)
    }

    pub fn resolve_name(&self, name: &str) -> Resolution {
        self.directory.resolve(name)
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    /// Open a new ticket from a submission.
    ///
    /// The requester's address is filled in from the directory when the
    /// submitted name resolves unambiguously. If the submission repeats
    /// an open ticket's issue, the new ticket is linked to it. An
    /// attachment that fails to store is reported in the outcome but
    /// never blocks the ticket itself.
    pub async fn create(&self, req: NewTicket) -> Result<CreateOutcome> {
        let name = req.name.trim().to_string();
        let issue = req.issue.trim().to_string();
        if name.is_empty() || issue.is_empty() {
            return Err(NoticError::Validation(
                "Both 'name' and 'issue' are required.".to_string(),
            ));
        }

        let resolution = self.directory.resolve(&name);
        let settings = Settings::load(&self.settings_path);
        let prefix = ticket_prefix(&settings.ticket_prefix);
        let id = generate_ticket_id(&prefix, |candidate| {
            matches!(self.store.get(candidate), Ok(Some(_)))
        })?;

        let created = Timestamp::now();
        let sla_minutes = settings.sla_minutes();
        let mut ticket = Ticket {
            id: id.clone(),
            name: name.clone(),
            email: resolution.email.clone().unwrap_or_default(),
            issue,
            category: Category::Uncategorized,
            status: TicketStatus::Acknowledged,
            created: format_ts(created),
            due_at: format_ts(add_minutes(created, sla_minutes)),
            sla_minutes,
            first_response_at: None,
            resolved_at: None,
            updates: Vec::new(),
            attachments: Vec::new(),
            related: None,
            feedback: None,
        };

        self.link_duplicate(&mut ticket);

        let mut attachment_error = None;
        if let Some(file) = &req.attachment {
            match self.store_upload(&id, file) {
                Ok(meta) => ticket.attachments.push(meta),
                Err(e) => {
                    tracing::warn!("failed to store attachment for {id}: {e}");
                    attachment_error = Some(e.to_string());
                }
            }
        }

        let ticket = self.store.save(ticket)?;

        let subject = templates::new_ticket_subject(&id);
        let html = templates::new_ticket_html(&self.base_url, &id, &name, &ticket.issue);
        mail::notify(
            &self.mailer,
            std::slice::from_ref(&self.intake_email),
            &subject,
            &html,
        )
        .await;

        Ok(CreateOutcome {
            message: format!("Thanks, {name}. Your ticket ID is {id}"),
            id,
            attachment_error,
            ticket,
        })
    }

    /// All tickets, newest first, narrowed by the filter.
    pub fn tickets(&self, filter: &TicketFilter) -> Result<Vec<Ticket>> {
        let mut all = self.store.list()?;
        if let Some(category) = filter.category.as_deref().and_then(category_filter) {
            all.retain(|t| t.category == category);
        }
        match filter.status.as_deref() {
            Some("active") => all.retain(|t| t.status != TicketStatus::Complete),
            Some("complete") => all.retain(|t| t.status == TicketStatus::Complete),
            _ => {}
        }
        Ok(all)
    }

    pub fn ticket(&self, id: &str) -> Result<Ticket> {
        self.store
            .get(id)?
            .ok_or_else(|| NoticError::TicketNotFound(id.to_string()))
    }

    /// Apply a partial edit and notify requesters of any progress note.
    ///
    /// When both `sla_hours` and `due_at` are supplied the explicit due
    /// date wins; it also rewrites the SLA window, but only when it
    /// lands after the creation time. A transition into Complete stamps
    /// `resolved_at` once and sends exactly one resolution notice,
    /// whether or not a text update rode along.
    pub async fn update(&self, id: &str, patch: UpdatePatch) -> Result<Ticket> {
        let mut t = self.ticket(id)?;

        let previous_status = t.status;
        let new_status = match patch.status.as_deref().filter(|s| !s.is_empty()) {
            Some(raw) => raw.parse::<TicketStatus>()?,
            None => previous_status,
        };

        if let Some(email) = patch.email.as_deref().filter(|e| !e.is_empty()) {
            t.email = email.trim().to_string();
        }
        if let Some(related) = &patch.related {
            t.related = (!related.is_empty()).then(|| related.clone());
        }
        if let Some(category) = &patch.category {
            t.category = Category::normalize(category);
        }

        let created = parse_ts(&t.created);
        let mut updated_sla: Option<i64> = None;
        let mut updated_due: Option<String> = None;

        if let Some(hours) = patch.sla_hours
            && hours.is_finite()
            && hours > 0.0
        {
            let minutes = (hours * 60.0).round() as i64;
            updated_sla = Some(minutes);
            if let Some(created) = created {
                updated_due = Some(format_ts(add_minutes(created, minutes)));
            }
        }

        if let Some(raw) = patch.due_at.as_deref().filter(|s| !s.is_empty())
            && let Some(due) = parse_ts(raw.trim())
        {
            updated_due = Some(format_ts(due));
            if let Some(created) = created {
                let diff = minutes_between(created, due);
                if diff > 0 {
                    updated_sla = Some(diff);
                }
            }
        }

        if let Some(minutes) = updated_sla.filter(|m| *m > 0) {
            t.sla_minutes = minutes;
        }
        if let Some(due) = updated_due {
            t.due_at = due;
        }

        let closing = previous_status != TicketStatus::Complete
            && new_status == TicketStatus::Complete;
        let mut outgoing: Option<(Vec<String>, String, String)> = None;

        if let Some(text) = patch.update.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let now = now_iso();
            t.updates.push(TicketUpdate {
                at: now.clone(),
                text: text.to_string(),
            });
            if t.first_response_at.is_none() {
                t.first_response_at = Some(now);
            }

            let recipients = self.anchor_recipients(&t);
            if !recipients.is_empty() {
                let (subject, html) = if closing {
                    (
                        templates::resolved_subject(&t.id),
                        templates::resolved_html(&self.base_url, &t.id, Some(text)),
                    )
                } else {
                    (
                        templates::update_subject(&t.id),
                        templates::update_html(&self.base_url, &t.id, text),
                    )
                };
                outgoing = Some((recipients, subject, html));
            }
        }

        t.status = new_status;
        if closing && t.resolved_at.is_none() {
            t.resolved_at = Some(now_iso());
        }

        // Closing silently still tells the requesters, exactly once.
        if outgoing.is_none() && closing {
            let recipients = self.anchor_recipients(&t);
            if !recipients.is_empty() {
                outgoing = Some((
                    recipients,
                    templates::resolved_subject(&t.id),
                    templates::resolved_html(&self.base_url, &t.id, None),
                ));
            }
        }

        let t = self.store.save(t)?;
        if let Some((recipients, subject, html)) = outgoing {
            mail::notify(&self.mailer, &recipients, &subject, &html).await;
        }
        Ok(t)
    }

    /// Delete a ticket and its attachment files.
    pub fn delete(&self, id: &str) -> Result<()> {
        self.ticket(id)?;
        self.store.remove(id);
        Ok(())
    }

    /// Fold `source_id` into `target_id`.
    ///
    /// Attachment files move into the target's directory, the target
    /// absorbs the source's history behind a pair of system notes, and
    /// the source closes as a stub pointing at the target. The two
    /// saves are independent; a crash in between leaves the target
    /// updated and the source still open.
    pub fn merge(&self, source_id: &str, target_id: &str) -> Result<Ticket> {
        let Some(mut source) = self.store.get(source_id)? else {
            return Err(NoticError::TicketNotFound(source_id.to_string()));
        };
        let target_id = target_id.trim();
        let target = self.store.get(target_id)?;
        let Some(mut target) = target.filter(|t| t.id != source.id) else {
            return Err(NoticError::Validation("Invalid merge target".to_string()));
        };

        let moved = attach::move_attachments(
            self.store.ticket_dir(),
            &source.id,
            &target.id,
            &source.attachments,
        );
        target.attachments.extend(moved);
        source.attachments.clear();

        target.updates.push(note(format!(
            "Merged ticket {} into this ticket.",
            source.id
        )));
        if !source.issue.trim().is_empty() && source.issue != target.issue {
            target
                .updates
                .push(note(format!("Merged {} issue: {}", source.id, source.issue)));
        }
        target.updates.extend(source.updates.iter().cloned());

        source.status = TicketStatus::Complete;
        source.related = Some(target.id.clone());
        source.updates.push(note(format!("Merged into {}", target.id)));
        if source.resolved_at.is_none() {
            source.resolved_at = Some(now_iso());
        }

        let target = self.store.save(target)?;
        self.store.save(source)?;
        Ok(target)
    }

    /// Record requester feedback on a completed ticket. Repeat
    /// submissions overwrite the earlier rating.
    pub fn feedback(&self, id: &str, rating: &str, comment: &str) -> Result<Ticket> {
        let mut t = self.ticket(id)?;
        if t.status != TicketStatus::Complete {
            return Err(NoticError::Validation(
                "Feedback is only available once the ticket is complete.".to_string(),
            ));
        }
        let rating: Rating = rating.parse()?;
        let comment: String = comment.chars().take(FEEDBACK_COMMENT_MAX).collect();
        t.feedback = Some(Feedback {
            rating,
            comment,
            at: now_iso(),
        });
        self.store.save(t)
    }

    /// Store an uploaded file against an existing ticket.
    pub fn add_attachment(&self, id: &str, file: &IncomingFile) -> Result<AttachmentMeta> {
        let mut t = self.ticket(id)?;
        let meta = self.store_upload(&t.id, file)?;
        t.attachments.push(meta.clone());
        self.store.save(t)?;
        Ok(meta)
    }

    /// On-disk path and content type of a stored attachment.
    ///
    /// The content type comes from the upload's recorded metadata;
    /// files on disk without a matching record are served as opaque
    /// bytes.
    pub fn attachment(&self, id: &str, file: &str) -> Result<(PathBuf, String)> {
        let t = self.ticket(id)?;
        let path = attach::resolve_attachment(self.store.ticket_dir(), &t.id, file)?;
        let mime = t
            .attachments
            .iter()
            .find(|a| a.stored_name == file)
            .map(|a| a.mime.clone())
            .unwrap_or_else(|| attach::DEFAULT_MIME.to_string());
        Ok((path, mime))
    }

    pub fn stats(&self) -> Result<DeskStats> {
        let all = self.store.list()?;
        let now = Timestamp::now();

        let mut stats = DeskStats {
            total: all.len(),
            open: 0,
            closed: 0,
            overdue: 0,
            avg_first_response_minutes: None,
            avg_resolve_minutes: None,
        };
        let mut first_total = 0i64;
        let mut first_count = 0i64;
        let mut resolve_total = 0i64;
        let mut resolve_count = 0i64;

        for t in &all {
            if t.status == TicketStatus::Complete {
                stats.closed += 1;
            } else {
                stats.open += 1;
            }
            if is_overdue(t, now) {
                stats.overdue += 1;
            }
            let Some(created) = parse_ts(&t.created) else {
                continue;
            };
            if let Some(first) = t.first_response_at.as_deref().and_then(parse_ts) {
                let minutes = minutes_between(created, first);
                if minutes >= 0 {
                    first_total += minutes;
                    first_count += 1;
                }
            }
            if let Some(resolved) = t.resolved_at.as_deref().and_then(parse_ts) {
                let minutes = minutes_between(created, resolved);
                if minutes >= 0 {
                    resolve_total += minutes;
                    resolve_count += 1;
                }
            }
        }

        if first_count > 0 {
            stats.avg_first_response_minutes = Some(first_total / first_count);
        }
        if resolve_count > 0 {
            stats.avg_resolve_minutes = Some(resolve_total / resolve_count);
        }
        Ok(stats)
    }

    // A fresh ticket repeating an open ticket's issue gets linked to it
    // instead of drifting separately. Failures here only cost the link,
    // never the submission.
    fn link_duplicate(&self, ticket: &mut Ticket) {
        let all = match self.store.list() {
            Ok(all) => all,
            Err(e) => {
                tracing::warn!("duplicate scan skipped: {e}");
                return;
            }
        };
        let canonical = normalize_issue(&ticket.issue);
        let Some(mut existing) = all.into_iter().find(|t| {
            t.status != TicketStatus::Complete && normalize_issue(&t.issue) == canonical
        }) else {
            return;
        };
        ticket.related = Some(existing.id.clone());
        existing.updates.push(note(format!(
            "Linked similar ticket {} opened by {}.",
            ticket.id, ticket.name
        )));
        if let Err(e) = self.store.save(existing) {
            tracing::warn!("failed to note duplicate link on related ticket: {e}");
        }
    }

    fn store_upload(&self, id: &str, file: &IncomingFile) -> Result<AttachmentMeta> {
        let name = if file.name.is_empty() {
            attach::DEFAULT_UPLOAD_NAME
        } else {
            file.name.as_str()
        };
        attach::store_attachment(
            self.store.ticket_dir(),
            id,
            name,
            file.mime.as_deref(),
            &file.bytes,
        )
    }

    // Everyone on the ticket's link group hears about progress: the
    // anchor is the related target if set, else the ticket itself, and
    // the group is every stored ticket pointing at that anchor. The
    // group is read from the store, so edits in the current request
    // only count once saved.
    fn anchor_recipients(&self, t: &Ticket) -> Vec<String> {
        let group = match self.store.list() {
            Ok(all) => all,
            Err(e) => {
                tracing::warn!("recipient scan failed: {e}");
                return Vec::new();
            }
        };
        let anchor = t.anchor();
        let emails: Vec<String> = group
            .into_iter()
            .filter(|x| x.id == anchor || x.related.as_deref() == Some(anchor))
            .map(|x| x.email)
            .collect();
        mail::normalize_recipients(&emails)
    }
}

fn note(text: String) -> TicketUpdate {
    TicketUpdate {
        at: now_iso(),
        text,
    }
}

// Complete and On hold tickets never count as overdue; a hold pauses
// the clock as far as reporting is concerned.
fn is_overdue(t: &Ticket, now: Timestamp) -> bool {
    if t.status == TicketStatus::Complete || t.status == TicketStatus::OnHold {
        return false;
    }
    parse_ts(&t.due_at).is_some_and(|due| due < now)
}

// "All" and unrecognized values disable the category filter;
// "Uncategorized" stays addressable even though it is also the
// normalizer's fallback.
fn category_filter(raw: &str) -> Option<Category> {
    match raw {
        "Uncategorized" => Some(Category::Uncategorized),
        other => {
            let category = Category::normalize(other);
            (category != Category::Uncategorized).then_some(category)
        }
    }
}
