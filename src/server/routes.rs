//! Route handlers.
//!
//! Handlers stay thin: extract, call into [`Desk`], serialize. Error
//! mapping lives on [`NoticError`]'s `IntoResponse` impl, so every
//! fallible handler just returns `Result<Json<T>>`.

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::multipart::MultipartError;
use axum::extract::{FromRequest, Multipart, Path, Query, Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::desk::{CreateOutcome, Desk, DeskStats, IncomingFile, NewTicket, TicketFilter, UpdatePatch};
use crate::directory::{DirectoryUser, Resolution};
use crate::error::{NoticError, Result};
use crate::settings::{MailConfig, Settings, SettingsPatch};
use crate::types::{AttachmentMeta, Ticket};

type SharedDesk = Arc<Desk>;

pub(super) fn ticket_routes() -> Router<SharedDesk> {
    Router::new()
        .route("/submit", post(submit))
        .route("/tickets", get(list_tickets).post(submit))
        .route("/tickets/:id", get(show_ticket).delete(delete_ticket))
        .route("/tickets/:id/update", post(update_ticket))
        .route("/tickets/:id/merge", post(merge_ticket))
        .route("/tickets/:id/feedback", post(leave_feedback))
        .route("/tickets/:id/attachments", put(upload_attachment))
        .route("/tickets/:id/attachments/:file", get(download_attachment))
}

pub(super) fn admin_routes() -> Router<SharedDesk> {
    Router::new()
        .route("/stats", get(stats))
        .route("/settings", get(show_settings).put(save_settings))
        .route("/users", get(list_users))
        .route("/users/resolve", get(resolve_user))
}

pub(super) fn health_routes() -> Router<SharedDesk> {
    Router::new().route("/healthz", get(healthz))
}

/// JSON submission body. Browser forms post multipart instead; both
/// land on the same handler.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SubmitBody {
    name: String,
    issue: String,
}

/// Accepts either a JSON body or a multipart form with an optional
/// `attachment` file part.
async fn submit(State(desk): State<SharedDesk>, req: Request) -> Result<Json<CreateOutcome>> {
    let content_type = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let new = if content_type.starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(req, &())
            .await
            .map_err(|e| NoticError::Validation(format!("invalid form submission: {e}")))?;
        read_submission(multipart).await?
    } else {
        let Json(body) = Json::<SubmitBody>::from_request(req, &())
            .await
            .map_err(|e| NoticError::Validation(format!("invalid submission body: {e}")))?;
        NewTicket {
            name: body.name,
            issue: body.issue,
            attachment: None,
        }
    };

    Ok(Json(desk.create(new).await?))
}

async fn read_submission(mut multipart: Multipart) -> Result<NewTicket> {
    let mut new = NewTicket::default();
    while let Some(field) = multipart.next_field().await.map_err(bad_form)? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        match name.as_str() {
            "name" => new.name = field.text().await.map_err(bad_form)?,
            "issue" => new.issue = field.text().await.map_err(bad_form)?,
            "attachment" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let mime = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(bad_form)?;
                // Browsers send an empty part when no file was picked.
                if file_name.is_empty() && bytes.is_empty() {
                    continue;
                }
                new.attachment = Some(IncomingFile {
                    name: file_name,
                    mime,
                    bytes: bytes.to_vec(),
                });
            }
            _ => {}
        }
    }
    Ok(new)
}

fn bad_form(e: MultipartError) -> NoticError {
    NoticError::Validation(format!("unreadable form field: {e}"))
}

async fn list_tickets(
    State(desk): State<SharedDesk>,
    Query(filter): Query<TicketFilter>,
) -> Result<Json<Vec<Ticket>>> {
    Ok(Json(desk.tickets(&filter)?))
}

async fn show_ticket(
    State(desk): State<SharedDesk>,
    Path(id): Path<String>,
) -> Result<Json<Ticket>> {
    Ok(Json(desk.ticket(&id)?))
}

async fn update_ticket(
    State(desk): State<SharedDesk>,
    Path(id): Path<String>,
    Json(patch): Json<UpdatePatch>,
) -> Result<Json<Ticket>> {
    Ok(Json(desk.update(&id, patch).await?))
}

async fn delete_ticket(
    State(desk): State<SharedDesk>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    desk.delete(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MergeBody {
    target: String,
}

async fn merge_ticket(
    State(desk): State<SharedDesk>,
    Path(id): Path<String>,
    Json(body): Json<MergeBody>,
) -> Result<Json<Ticket>> {
    Ok(Json(desk.merge(&id, &body.target)?))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FeedbackBody {
    rating: String,
    comment: String,
}

async fn leave_feedback(
    State(desk): State<SharedDesk>,
    Path(id): Path<String>,
    Json(body): Json<FeedbackBody>,
) -> Result<Json<Ticket>> {
    Ok(Json(desk.feedback(&id, &body.rating, &body.comment)?))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UploadQuery {
    filename: Option<String>,
}

#[derive(Debug, Serialize)]
struct Uploaded {
    message: &'static str,
    attachment: AttachmentMeta,
}

/// Raw-body upload. The file name comes from the `filename` query
/// parameter or an `x-filename` header; the body is the file.
async fn upload_attachment(
    State(desk): State<SharedDesk>,
    Path(id): Path<String>,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse> {
    let name = query
        .filename
        .filter(|f| !f.is_empty())
        .or_else(|| {
            headers
                .get("x-filename")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
        .unwrap_or_default();
    let mime = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let file = IncomingFile {
        name,
        mime,
        bytes: body.to_vec(),
    };
    let attachment = desk.add_attachment(&id, &file)?;
    Ok((
        StatusCode::CREATED,
        Json(Uploaded {
            message: "Uploaded",
            attachment,
        }),
    ))
}

async fn download_attachment(
    State(desk): State<SharedDesk>,
    Path((id, file)): Path<(String, String)>,
) -> Result<impl IntoResponse> {
    let (path, mime) = desk.attachment(&id, &file)?;
    let bytes = tokio::fs::read(&path).await?;
    Ok(([(header::CONTENT_TYPE, mime)], bytes))
}

async fn stats(State(desk): State<SharedDesk>) -> Result<Json<DeskStats>> {
    Ok(Json(desk.stats()?))
}

async fn show_settings(State(desk): State<SharedDesk>) -> Json<Settings> {
    Json(desk.settings())
}

async fn save_settings(
    State(desk): State<SharedDesk>,
    Json(patch): Json<SettingsPatch>,
) -> Result<Json<Settings>> {
    Ok(Json(desk.update_settings(&patch)?))
}

async fn list_users(State(desk): State<SharedDesk>) -> Json<Vec<DirectoryUser>> {
    Json(desk.directory().users().to_vec())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ResolveQuery {
    name: String,
}

async fn resolve_user(
    State(desk): State<SharedDesk>,
    Query(query): Query<ResolveQuery>,
) -> Json<Resolution> {
    Json(desk.resolve_name(&query.name))
}

#[derive(Debug, Serialize)]
struct HealthReport {
    ok: bool,
    checks: HealthChecks,
}

#[derive(Debug, Serialize)]
struct HealthChecks {
    storage: StorageHealth,
    email: MailHealth,
}

#[derive(Debug, Serialize)]
struct StorageHealth {
    ok: bool,
    backend: String,
    path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct MailHealth {
    ok: bool,
    mode: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    missing: Vec<&'static str>,
}

/// Liveness plus the two dependencies worth probing: can we write to
/// the ticket store, and is the mail transport configured. Degraded
/// answers 503 so load balancers rotate the instance out.
async fn healthz(State(desk): State<SharedDesk>) -> impl IntoResponse {
    let storage = storage_health(&desk);
    let email = mail_health();
    let ok = storage.ok && email.ok;
    let status = if ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(HealthReport {
            ok,
            checks: HealthChecks { storage, email },
        }),
    )
}

fn storage_health(desk: &Desk) -> StorageHealth {
    let dir = desk.ticket_dir();
    let probe = dir.join(format!(
        ".healthcheck-{}-{:08x}",
        Timestamp::now().as_millisecond(),
        rand::random::<u32>()
    ));
    let outcome = (|| -> std::io::Result<()> {
        std::fs::create_dir_all(dir)?;
        std::fs::write(&probe, b"ok")?;
        std::fs::remove_file(&probe)
    })();
    StorageHealth {
        ok: outcome.is_ok(),
        backend: desk.backend().to_string(),
        path: dir.display().to_string(),
        error: outcome.err().map(|e| e.to_string()),
    }
}

fn mail_health() -> MailHealth {
    let mail = MailConfig::from_env();
    let missing = mail.missing();
    MailHealth {
        ok: missing.is_empty(),
        mode: mail.mode().to_string(),
        missing,
    }
}
