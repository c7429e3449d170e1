//! Turns raw JSON into a well-formed [`Ticket`].
//!
//! Stored records come from hand-edited files, older releases, and the
//! HTTP surface, so every read path funnels through [`hydrate`] instead
//! of deserializing `Ticket` directly. Missing and malformed fields are
//! replaced with defaults; fields that already hold valid values are
//! kept verbatim, so hydrating a hydrated ticket changes nothing.

use jiff::Timestamp;
use serde_json::{Map, Value};

use crate::category::Category;
use crate::settings;
use crate::types::{AttachmentMeta, Feedback, Rating, Ticket, TicketStatus, TicketUpdate};
use crate::utils::{add_minutes, format_ts, now_iso, parse_ts};

/// Build a [`Ticket`] from an arbitrary JSON value.
///
/// Returns `None` only when `raw` is not an object at all; any object,
/// including `{}`, hydrates to a complete ticket.
pub fn hydrate(raw: &Value) -> Option<Ticket> {
    let obj = raw.as_object()?;

    let created_raw = str_field(obj, "created");
    let created = if parse_ts(&created_raw).is_some() {
        created_raw
    } else {
        now_iso()
    };

    let sla_minutes = obj
        .get("slaMinutes")
        .and_then(pos_int)
        .unwrap_or_else(settings::default_sla_minutes);

    let due_at = match obj.get("dueAt").and_then(Value::as_str) {
        Some(s) if parse_ts(s).is_some() => s.to_string(),
        _ => {
            let base = parse_ts(&created).unwrap_or_else(Timestamp::now);
            format_ts(add_minutes(base, sla_minutes))
        }
    };

    let status = str_field(obj, "status")
        .parse::<TicketStatus>()
        .unwrap_or_default();

    let updates = obj
        .get("updates")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_object)
                .map(|u| TicketUpdate {
                    at: str_field(u, "at"),
                    text: str_field(u, "text"),
                })
                .collect()
        })
        .unwrap_or_default();

    let attachments = obj
        .get("attachments")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_object)
                .map(|a| AttachmentMeta {
                    original_name: str_field(a, "originalName"),
                    stored_name: str_field(a, "storedName"),
                    size: size_field(a),
                    mime: str_field(a, "mime"),
                    uploaded_at: str_field(a, "uploadedAt"),
                })
                .collect()
        })
        .unwrap_or_default();

    let related = obj
        .get("related")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let feedback = obj
        .get("feedback")
        .and_then(Value::as_object)
        .and_then(|f| {
            let rating = f
                .get("rating")
                .and_then(Value::as_str)?
                .parse::<Rating>()
                .ok()?;
            Some(Feedback {
                rating,
                comment: str_field(f, "comment"),
                at: str_field(f, "at"),
            })
        });

    Some(Ticket {
        id: str_field(obj, "id"),
        name: str_field(obj, "name"),
        email: str_field(obj, "email"),
        issue: str_field(obj, "issue"),
        category: Category::normalize(&str_field(obj, "category")),
        status,
        created,
        due_at,
        sla_minutes,
        first_response_at: opt_ts_field(obj, "firstResponseAt"),
        resolved_at: opt_ts_field(obj, "resolvedAt"),
        updates,
        attachments,
        related,
        feedback,
    })
}

/// Re-apply the hydration guarantees to an already-typed ticket before
/// it is persisted: `created` is assigned when blank or unparseable,
/// `slaMinutes` falls back to the configured default, and `dueAt` is
/// derived when it does not hold a valid timestamp.
pub fn refresh(ticket: &mut Ticket) {
    if parse_ts(&ticket.created).is_none() {
        ticket.created = now_iso();
    }
    if ticket.sla_minutes <= 0 {
        ticket.sla_minutes = settings::default_sla_minutes();
    }
    if parse_ts(&ticket.due_at).is_none() {
        let base = parse_ts(&ticket.created).unwrap_or_else(Timestamp::now);
        ticket.due_at = format_ts(add_minutes(base, ticket.sla_minutes));
    }
}

fn str_field(obj: &Map<String, Value>, key: &str) -> String {
    obj.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Timestamp fields that are optional stay absent unless they hold a
/// parseable value.
fn opt_ts_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .filter(|s| parse_ts(s).is_some())
        .map(str::to_string)
}

fn pos_int(value: &Value) -> Option<i64> {
    let n = value.as_number()?;
    if let Some(i) = n.as_i64() {
        return (i > 0).then_some(i);
    }
    let f = n.as_f64()?;
    (f > 0.0 && f.fract() == 0.0).then_some(f as i64)
}

fn size_field(obj: &Map<String, Value>) -> u64 {
    let Some(n) = obj.get("size").and_then(Value::as_number) else {
        return 0;
    };
    n.as_u64()
        .or_else(|| {
            n.as_f64()
                .filter(|f| *f >= 0.0 && f.fract() == 0.0)
                .map(|f| f as u64)
        })
        .unwrap_or(0)
}
