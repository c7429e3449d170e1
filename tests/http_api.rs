//! Black-box tests against the HTTP surface: a real listener on an
//! ephemeral port, driven with reqwest the way a browser or curl
//! would. Notifications are disabled; mail behavior is covered by the
//! desk's own tests.

use std::sync::Arc;

use secrecy::SecretBox;
use serde_json::{Value, json};
use serial_test::serial;
use tempfile::TempDir;
use tokio::net::TcpListener;

use notic::desk::Desk;
use notic::directory::{Directory, DirectoryUser};
use notic::mail::NullMailer;
use notic::server;
use notic::settings::MailConfig;
use notic::store::open_store;
use notic::test_guards::EnvGuard;

struct TestServer {
    _tmp: TempDir,
    base: String,
    client: reqwest::Client,
}

impl TestServer {
    async fn spawn() -> Self {
        let tmp = TempDir::new().expect("temp dir");
        let store = open_store(&tmp.path().join("Ticket"), None, None).expect("open store");
        let directory = Directory::from_users(vec![DirectoryUser {
            name: "Alice Smith".to_string(),
            email: "alice@example.com".to_string(),
        }]);
        let desk = Desk::new(
            store,
            Arc::new(NullMailer),
            directory,
            tmp.path().join("settings.json"),
            &mail_config(),
        );
        let app = server::router(Arc::new(desk));
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve");
        });
        Self {
            _tmp: tmp,
            base: format!("http://{addr}"),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn submit(&self, name: &str, issue: &str) -> String {
        let res = self
            .client
            .post(self.url("/submit"))
            .json(&json!({ "name": name, "issue": issue }))
            .send()
            .await
            .expect("submit request");
        assert_eq!(res.status(), 200);
        let body: Value = res.json().await.expect("submit body");
        body["id"].as_str().expect("ticket id").to_string()
    }

    async fn get_json(&self, path: &str) -> Value {
        let res = self
            .client
            .get(self.url(path))
            .send()
            .await
            .expect("get request");
        assert_eq!(res.status(), 200, "GET {path}");
        res.json().await.expect("json body")
    }
}

fn mail_config() -> MailConfig {
    MailConfig {
        use_graph: false,
        smtp_host: String::new(),
        smtp_port: 587,
        smtp_secure: false,
        smtp_user: String::new(),
        smtp_pass: SecretBox::new(Box::new(String::new())),
        from_email: String::new(),
        to_email: "helpdesk@example.com".to_string(),
        azure_tenant: String::new(),
        azure_client_id: String::new(),
        azure_client_secret: SecretBox::new(Box::new(String::new())),
        graph_sender: String::new(),
        base_url: "http://desk.test".to_string(),
    }
}

#[tokio::test]
async fn test_submit_json_and_fetch() {
    let server = TestServer::spawn().await;
    let res = server
        .client
        .post(server.url("/submit"))
        .json(&json!({ "name": "  Alice Smith  ", "issue": "Laptop will not boot" }))
        .send()
        .await
        .expect("submit");
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.expect("submit body");
    let id = body["id"].as_str().expect("id");
    assert_eq!(
        body["message"],
        format!("Thanks, Alice Smith. Your ticket ID is {id}")
    );

    let ticket = server.get_json(&format!("/tickets/{id}")).await;
    assert_eq!(ticket["status"], "Acknowledged");
    assert_eq!(ticket["category"], "Uncategorized");
    assert_eq!(ticket["name"], "Alice Smith");
    assert_eq!(ticket["email"], "alice@example.com");
    assert_eq!(ticket["slaMinutes"], 1440);
}

#[tokio::test]
async fn test_submit_rejects_missing_fields() {
    let server = TestServer::spawn().await;
    let res = server
        .client
        .post(server.url("/submit"))
        .json(&json!({ "name": "Alice Smith" }))
        .send()
        .await
        .expect("submit");
    assert_eq!(res.status(), 400);
    let body: Value = res.json().await.expect("error body");
    assert_eq!(body["error"], "Both 'name' and 'issue' are required.");
}

#[tokio::test]
async fn test_multipart_submit_with_attachment() {
    let server = TestServer::spawn().await;
    let boundary = "notic-test-boundary";
    let body = format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"name\"\r\n\r\n\
         Alice Smith\r\n\
         --{boundary}\r\n\
         Content-Disposition: form-data; name=\"issue\"\r\n\r\n\
         VPN drops every hour\r\n\
         --{boundary}\r\n\
         Content-Disposition: form-data; name=\"attachment\"; filename=\"vpn log.txt\"\r\n\
         Content-Type: text/plain\r\n\r\n\
         connection reset by peer\r\n\
         --{boundary}--\r\n"
    );
    let res = server
        .client
        .post(server.url("/tickets"))
        .header(
            "content-type",
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(body)
        .send()
        .await
        .expect("multipart submit");
    assert_eq!(res.status(), 200);
    let created: Value = res.json().await.expect("submit body");
    let id = created["id"].as_str().expect("id");
    assert!(created.get("attachmentError").is_none());

    let ticket = server.get_json(&format!("/tickets/{id}")).await;
    let attachment = &ticket["attachments"][0];
    assert_eq!(attachment["originalName"], "vpn log.txt");
    assert_eq!(attachment["mime"], "text/plain");
    let stored = attachment["storedName"].as_str().expect("stored name");

    let res = server
        .client
        .get(server.url(&format!("/tickets/{id}/attachments/{stored}")))
        .send()
        .await
        .expect("download");
    assert_eq!(res.status(), 200);
    assert_eq!(
        res.headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok()),
        Some("text/plain")
    );
    assert_eq!(res.bytes().await.expect("bytes").as_ref(), b"connection reset by peer");
}

#[tokio::test]
async fn test_update_applies_and_validates() {
    let server = TestServer::spawn().await;
    let id = server.submit("Alice Smith", "Printer out of magenta").await;

    let res = server
        .client
        .post(server.url(&format!("/tickets/{id}/update")))
        .json(&json!({
            "status": "Working on it",
            "category": "Hardware",
            "update": "Toner ordered."
        }))
        .send()
        .await
        .expect("update");
    assert_eq!(res.status(), 200);
    let ticket: Value = res.json().await.expect("updated ticket");
    assert_eq!(ticket["status"], "Working on it");
    assert_eq!(ticket["category"], "Hardware");
    assert_eq!(ticket["updates"][0]["text"], "Toner ordered.");
    assert!(ticket.get("firstResponseAt").is_some());

    let res = server
        .client
        .post(server.url(&format!("/tickets/{id}/update")))
        .json(&json!({ "status": "Done" }))
        .send()
        .await
        .expect("bad update");
    assert_eq!(res.status(), 400);

    let res = server
        .client
        .post(server.url("/tickets/NTC-MISSING/update"))
        .json(&json!({ "update": "hello?" }))
        .send()
        .await
        .expect("missing update");
    assert_eq!(res.status(), 404);
}

#[tokio::test]
async fn test_delete_then_404() {
    let server = TestServer::spawn().await;
    let id = server.submit("Alice Smith", "Keyboard sticky").await;

    let res = server
        .client
        .delete(server.url(&format!("/tickets/{id}")))
        .send()
        .await
        .expect("delete");
    assert_eq!(res.status(), 204);

    let res = server
        .client
        .get(server.url(&format!("/tickets/{id}")))
        .send()
        .await
        .expect("get after delete");
    assert_eq!(res.status(), 404);
    let body: Value = res.json().await.expect("error body");
    assert!(
        body["error"]
            .as_str()
            .expect("error text")
            .contains("not found")
    );
}

#[tokio::test]
async fn test_raw_attachment_upload() {
    let server = TestServer::spawn().await;
    let id = server.submit("Alice Smith", "Monitor flickers").await;

    let res = server
        .client
        .put(server.url(&format!("/tickets/{id}/attachments?filename=diag.log")))
        .header("content-type", "text/plain")
        .body("backlight fault 0x17")
        .send()
        .await
        .expect("upload");
    assert_eq!(res.status(), 201);
    let body: Value = res.json().await.expect("upload body");
    assert_eq!(body["message"], "Uploaded");
    let stored = body["attachment"]["storedName"]
        .as_str()
        .expect("stored name");
    assert!(stored.ends_with("-diag.log"));

    let res = server
        .client
        .get(server.url(&format!("/tickets/{id}/attachments/nope.log")))
        .send()
        .await
        .expect("missing download");
    assert_eq!(res.status(), 404);
}

#[tokio::test]
async fn test_merge_endpoint() {
    let server = TestServer::spawn().await;
    let first = server.submit("Alice Smith", "Shared drive offline").await;
    let second = server.submit("Bob Jones", "shared drive offline").await;

    let res = server
        .client
        .post(server.url(&format!("/tickets/{second}/merge")))
        .json(&json!({ "target": first }))
        .send()
        .await
        .expect("merge");
    assert_eq!(res.status(), 200);
    let target: Value = res.json().await.expect("merge body");
    assert_eq!(target["id"], first.as_str());

    let source = server.get_json(&format!("/tickets/{second}")).await;
    assert_eq!(source["status"], "Complete");
    assert_eq!(source["related"], first.as_str());

    let res = server
        .client
        .post(server.url(&format!("/tickets/{first}/merge")))
        .json(&json!({ "target": first }))
        .send()
        .await
        .expect("self merge");
    assert_eq!(res.status(), 400);
    let body: Value = res.json().await.expect("error body");
    assert_eq!(body["error"], "Invalid merge target");
}

#[tokio::test]
async fn test_feedback_flow() {
    let server = TestServer::spawn().await;
    let id = server.submit("Alice Smith", "Email quota full").await;

    let res = server
        .client
        .post(server.url(&format!("/tickets/{id}/feedback")))
        .json(&json!({ "rating": "up", "comment": "fast!" }))
        .send()
        .await
        .expect("early feedback");
    assert_eq!(res.status(), 400);

    let res = server
        .client
        .post(server.url(&format!("/tickets/{id}/update")))
        .json(&json!({ "status": "Complete" }))
        .send()
        .await
        .expect("close");
    assert_eq!(res.status(), 200);

    let res = server
        .client
        .post(server.url(&format!("/tickets/{id}/feedback")))
        .json(&json!({ "rating": "up", "comment": "fast!" }))
        .send()
        .await
        .expect("feedback");
    assert_eq!(res.status(), 200);
    let ticket: Value = res.json().await.expect("ticket with feedback");
    assert_eq!(ticket["feedback"]["rating"], "up");
    assert_eq!(ticket["feedback"]["comment"], "fast!");
}

#[tokio::test]
async fn test_list_filter_and_stats() {
    let server = TestServer::spawn().await;
    let a = server.submit("Alice Smith", "Mouse squeaks").await;
    server.submit("Alice Smith", "Need VPN access").await;
    let res = server
        .client
        .post(server.url(&format!("/tickets/{a}/update")))
        .json(&json!({ "status": "Complete" }))
        .send()
        .await
        .expect("close");
    assert_eq!(res.status(), 200);

    let active = server.get_json("/tickets?status=active").await;
    assert_eq!(active.as_array().expect("array").len(), 1);
    let complete = server.get_json("/tickets?status=complete").await;
    assert_eq!(complete.as_array().expect("array").len(), 1);
    assert_eq!(complete[0]["id"], a.as_str());

    let stats = server.get_json("/stats").await;
    assert_eq!(stats["total"], 2);
    assert_eq!(stats["open"], 1);
    assert_eq!(stats["closed"], 1);
    assert_eq!(stats["overdue"], 0);
}

#[tokio::test]
async fn test_settings_round_trip_changes_prefix() {
    let server = TestServer::spawn().await;
    let settings = server.get_json("/settings").await;
    assert_eq!(settings["ticketPrefix"], "NTC");
    assert_eq!(settings["slaHours"], 24.0);

    let res = server
        .client
        .put(server.url("/settings"))
        .json(&json!({ "ticketPrefix": "hd", "theme": "light" }))
        .send()
        .await
        .expect("put settings");
    assert_eq!(res.status(), 200);
    let saved: Value = res.json().await.expect("saved settings");
    assert_eq!(saved["ticketPrefix"], "hd");
    assert_eq!(saved["theme"], "light");

    let id = server.submit("Alice Smith", "Docking station dead").await;
    assert!(id.starts_with("HD-"), "unexpected id {id}");
}

#[tokio::test]
async fn test_users_and_name_resolution() {
    let server = TestServer::spawn().await;
    let users = server.get_json("/users").await;
    assert_eq!(users.as_array().expect("array").len(), 1);
    assert_eq!(users[0]["name"], "Alice Smith");

    let exact = server.get_json("/users/resolve?name=alice%20smith").await;
    assert_eq!(exact["email"], "alice@example.com");
    assert_eq!(exact["confidence"], "exact");
    assert_eq!(exact["match"], "Alice Smith");

    let miss = server.get_json("/users/resolve?name=Zed%20Zardoz").await;
    assert_eq!(miss["email"], Value::Null);
    assert_eq!(miss["confidence"], "no-match");
}

#[tokio::test]
async fn test_cors_preflight_is_open() {
    let server = TestServer::spawn().await;
    let res = server
        .client
        .request(reqwest::Method::OPTIONS, server.url("/submit"))
        .header("origin", "https://intranet.example.com")
        .header("access-control-request-method", "POST")
        .send()
        .await
        .expect("preflight");
    assert!(res.status().is_success());
    assert!(res.headers().contains_key("access-control-allow-origin"));
}

#[tokio::test]
#[serial]
async fn test_healthz_reflects_mail_configuration() {
    let server = TestServer::spawn().await;

    {
        let _use_graph = unsafe { EnvGuard::set("USE_GRAPH", "false") };
        let _host = unsafe { EnvGuard::set("SMTP_HOST", "mail.example.com") };
        let _port = unsafe { EnvGuard::set("SMTP_PORT", "587") };
        let _from = unsafe { EnvGuard::set("FROM_EMAIL", "desk@example.com") };
        let res = server
            .client
            .get(server.url("/healthz"))
            .send()
            .await
            .expect("healthz");
        assert_eq!(res.status(), 200);
        let body: Value = res.json().await.expect("health body");
        assert_eq!(body["ok"], true);
        assert_eq!(body["checks"]["storage"]["ok"], true);
        assert_eq!(body["checks"]["storage"]["backend"], "fs");
        assert_eq!(body["checks"]["email"]["mode"], "smtp");
        assert_eq!(body["checks"]["email"]["ok"], true);
    }

    {
        let _use_graph = unsafe { EnvGuard::set("USE_GRAPH", "false") };
        let _host = unsafe { EnvGuard::remove("SMTP_HOST") };
        let _port = unsafe { EnvGuard::remove("SMTP_PORT") };
        let _from = unsafe { EnvGuard::remove("FROM_EMAIL") };
        let res = server
            .client
            .get(server.url("/healthz"))
            .send()
            .await
            .expect("healthz");
        assert_eq!(res.status(), 503);
        let body: Value = res.json().await.expect("health body");
        assert_eq!(body["ok"], false);
        let missing = body["checks"]["email"]["missing"]
            .as_array()
            .expect("missing list");
        assert!(missing.iter().any(|m| m == "SMTP_HOST"));
    }
}
