//! HTML bodies and subject lines for lifecycle notifications.

/// Escape text for interpolation into an HTML body.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn ticket_url(base_url: &str, id: &str) -> String {
    format!("{}/tickets/{}", base_url.trim_end_matches('/'), id)
}

fn button(href: &str, label: &str) -> String {
    format!(
        concat!(
            r#"<a href="{href}" style="display:inline-block;background:#0F6CBD;"#,
            r#"color:#ffffff !important;padding:10px 16px;border-radius:6px;"#,
            r#"text-decoration:none;font-weight:600;font-family:Arial, sans-serif;">{label}</a>"#
        ),
        href = href,
        label = label,
    )
}

fn wrap(inner: &str) -> String {
    format!(
        concat!(
            r#"<div style="font-family:Arial, sans-serif; background:#f7f7f7; padding:20px;">"#,
            r#"<div style="max-width:600px;margin:auto;background:#ffffff;"#,
            r#"border-radius:8px;padding:20px;border:1px solid #e2e2e2;">{inner}</div></div>"#
        ),
        inner = inner,
    )
}

fn blockquote(text: &str) -> String {
    format!(
        concat!(
            r#"<blockquote style="border-left:4px solid #0F6CBD;padding-left:10px;"#,
            r#"color:#333;margin:15px 0;font-style:italic;">{text}</blockquote>"#
        ),
        text = escape(text),
    )
}

pub fn new_ticket_subject(id: &str) -> String {
    format!("New Ticket [{id}]")
}

/// Sent to the intake address when a public submission lands.
pub fn new_ticket_html(base_url: &str, id: &str, name: &str, issue: &str) -> String {
    let inner = format!(
        concat!(
            r#"<h2 style="color:#0F6CBD;margin-bottom:15px;">New Ticket Created</h2>"#,
            "<p><strong>ID:</strong> {id}</p>",
            "<p><strong>Name:</strong> {name}</p>",
            "<p><strong>Issue:</strong><br>{issue}</p>",
            "<br><p>You can view it here:</p>{button}<br><br>",
            r#"<p style="font-size:12px;color:#666;">Support Console Notification</p>"#
        ),
        id = escape(id),
        name = escape(name),
        issue = escape(issue),
        button = button(&ticket_url(base_url, id), "View Ticket"),
    );
    wrap(&inner)
}

pub fn update_subject(id: &str) -> String {
    format!("Update on {id}")
}

/// Sent to the requester group when an admin appends a text update.
pub fn update_html(base_url: &str, id: &str, text: &str) -> String {
    let inner = format!(
        concat!(
            r#"<h2 style="color:#0F6CBD;margin-bottom:15px;">Ticket Update: {id}</h2>"#,
            "<p>Your ticket has been updated:</p>{quote}",
            "<p>You can view your ticket here:</p>{button}<br><br>",
            r#"<p style="font-size:12px;color:#666;">Regards,<br>The Support Desk</p>"#
        ),
        id = escape(id),
        quote = blockquote(text),
        button = button(&ticket_url(base_url, id), "View Ticket"),
    );
    wrap(&inner)
}

pub fn resolved_subject(id: &str) -> String {
    format!("Ticket {id} resolved - quick feedback?")
}

/// Sent to the requester group when a ticket is closed, with the
/// closing update quoted when one was written.
pub fn resolved_html(base_url: &str, id: &str, text: Option<&str>) -> String {
    let lede = match text {
        Some(text) => format!(
            "<p>Your ticket has been resolved with the following update:</p>{}",
            blockquote(text)
        ),
        None => "<p>Your ticket has been resolved.</p>".to_string(),
    };
    let inner = format!(
        concat!(
            r#"<h2 style="color:#0F6CBD;margin-bottom:15px;">Ticket Resolved: {id}</h2>"#,
            "{lede}",
            "<p>You can review the final details and leave quick thumbs up/down feedback here:</p>",
            "{button}<br><br>",
            r#"<p style="font-size:12px;color:#666;">Regards,<br>The Support Desk</p>"#
        ),
        id = escape(id),
        lede = lede,
        button = button(
            &ticket_url(base_url, id),
            "View ticket &amp; give feedback"
        ),
    );
    wrap(&inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(escape("a < b & c"), "a &lt; b &amp; c");
        assert_eq!(
            escape(r#"<script>alert("x")</script>"#),
            "&lt;script&gt;alert(&quot;x&quot;)&lt;/script&gt;"
        );
        assert_eq!(escape("plain"), "plain");
    }

    #[test]
    fn test_subjects() {
        assert_eq!(new_ticket_subject("NTC-A1B2C3"), "New Ticket [NTC-A1B2C3]");
        assert_eq!(update_subject("NTC-A1B2C3"), "Update on NTC-A1B2C3");
        assert_eq!(
            resolved_subject("NTC-A1B2C3"),
            "Ticket NTC-A1B2C3 resolved - quick feedback?"
        );
    }

    #[test]
    fn test_new_ticket_html_escapes_and_links() {
        let html = new_ticket_html(
            "http://localhost:3000/",
            "NTC-A1B2C3",
            "Alice <admin>",
            "printer & scanner down",
        );
        assert!(html.contains("Alice &lt;admin&gt;"));
        assert!(html.contains("printer &amp; scanner down"));
        assert!(html.contains(r#"href="http://localhost:3000/tickets/NTC-A1B2C3""#));
        assert!(!html.contains("<admin>"));
    }

    #[test]
    fn test_update_html_quotes_text() {
        let html = update_html("http://localhost:3000", "NTC-A1B2C3", "swapped the toner");
        assert!(html.contains("Ticket Update: NTC-A1B2C3"));
        assert!(html.contains("<blockquote"));
        assert!(html.contains("swapped the toner"));
    }

    #[test]
    fn test_resolved_html_with_and_without_text() {
        let with = resolved_html("http://localhost:3000", "NTC-A1B2C3", Some("replaced cable"));
        assert!(with.contains("resolved with the following update"));
        assert!(with.contains("replaced cable"));

        let without = resolved_html("http://localhost:3000", "NTC-A1B2C3", None);
        assert!(without.contains("Your ticket has been resolved."));
        assert!(!without.contains("<blockquote"));
    }
}
