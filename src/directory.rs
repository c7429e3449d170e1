//! Requester directory: best-effort name-to-email resolution backed by
//! a `users.json` contact list.
//!
//! Public submissions carry only a display name, so notification
//! addresses are looked up here. Resolution is deliberately cautious:
//! an email is returned only for a single unambiguous match, and
//! anything weaker reports how close it got without risking a
//! misdirected notification.

use std::fs;
use std::io;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static NAME_SEPARATORS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("name separator regex should be valid"));

/// One entry from the contact list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryUser {
    pub name: String,
    pub email: String,
}

/// How a resolution was arrived at. Only [`Confidence::Exact`] and
/// [`Confidence::Tokens`] carry an email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Confidence {
    Exact,
    Tokens,
    WeakPrefix,
    NoMatch,
    Empty,
}

/// Outcome of a name lookup.
#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
    /// Display name of the matched entry, when one entry stood out.
    #[serde(rename = "match", skip_serializing_if = "Option::is_none")]
    pub matched: Option<String>,
    #[serde(skip_serializing_if = "is_false")]
    pub conflict: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<String>,
}

fn is_false(value: &bool) -> bool {
    !value
}

impl Resolution {
    fn empty() -> Self {
        Self {
            email: None,
            confidence: Some(Confidence::Empty),
            matched: None,
            conflict: false,
            candidates: Vec::new(),
        }
    }

    fn no_match() -> Self {
        Self {
            email: None,
            confidence: Some(Confidence::NoMatch),
            matched: None,
            conflict: false,
            candidates: Vec::new(),
        }
    }

    fn hit(confidence: Confidence, user: &DirectoryUser) -> Self {
        Self {
            email: Some(user.email.clone()),
            confidence: Some(confidence),
            matched: Some(user.name.clone()),
            conflict: false,
            candidates: Vec::new(),
        }
    }

    fn weak_prefix(user: &DirectoryUser) -> Self {
        Self {
            email: None,
            confidence: Some(Confidence::WeakPrefix),
            matched: Some(user.name.clone()),
            conflict: false,
            candidates: Vec::new(),
        }
    }

    fn conflict(users: &[&DirectoryUser]) -> Self {
        Self {
            email: None,
            confidence: None,
            matched: None,
            conflict: true,
            candidates: users.iter().map(|u| u.name.clone()).collect(),
        }
    }
}

/// Lowercase and collapse every non-alphanumeric run to a single
/// space, so "O'Brien, Pat" and "pat o brien" compare equal.
fn normalize_name(name: &str) -> String {
    let lowered = name.to_lowercase();
    NAME_SEPARATORS
        .replace_all(&lowered, " ")
        .trim()
        .to_string()
}

/// Contact list loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    users: Vec<DirectoryUser>,
}

impl Directory {
    /// Load the contact list from `path`. A missing or unparseable
    /// file disables resolution rather than failing startup.
    pub fn load(path: &Path) -> Self {
        let users = match fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str::<Vec<DirectoryUser>>(&raw) {
                Ok(users) => users,
                Err(e) => {
                    tracing::warn!("failed to parse user directory, name resolution disabled: {e}");
                    Vec::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                tracing::warn!("failed to read user directory, name resolution disabled: {e}");
                Vec::new()
            }
        };
        Self { users }
    }

    pub fn from_users(users: Vec<DirectoryUser>) -> Self {
        Self { users }
    }

    pub fn users(&self) -> &[DirectoryUser] {
        &self.users
    }

    /// Resolve a display name to an email address.
    ///
    /// Tried in order: exact normalized equality, then token matching
    /// (every input token must equal a name part, except single-letter
    /// tokens which match as initials), then whole-string prefix. The
    /// prefix tier is considered too weak to hand out an email and only
    /// reports which entry it would have picked. More than one match at
    /// any tier is a conflict listing the candidates.
    pub fn resolve(&self, name: &str) -> Resolution {
        let input = normalize_name(name);
        if input.is_empty() {
            return Resolution::empty();
        }

        let normalized: Vec<(String, &DirectoryUser)> = self
            .users
            .iter()
            .map(|u| (normalize_name(&u.name), u))
            .collect();

        let exact: Vec<&DirectoryUser> = normalized
            .iter()
            .filter(|(n, _)| *n == input)
            .map(|(_, u)| *u)
            .collect();
        match exact.as_slice() {
            [user] => return Resolution::hit(Confidence::Exact, user),
            [] => {}
            _ => return Resolution::conflict(&exact),
        }

        let tokens: Vec<&str> = input.split(' ').filter(|t| !t.is_empty()).collect();
        // Initials alone never match: at least one full token has to
        // anchor the candidate.
        if tokens.len() >= 2 && tokens.iter().any(|t| t.len() > 1) {
            let by_tokens: Vec<&DirectoryUser> = normalized
                .iter()
                .filter(|(n, _)| {
                    let parts: Vec<&str> = n.split(' ').collect();
                    tokens.iter().all(|tok| {
                        if tok.len() == 1 {
                            parts.iter().any(|p| p.starts_with(tok))
                        } else {
                            parts.contains(tok)
                        }
                    })
                })
                .map(|(_, u)| *u)
                .collect();
            match by_tokens.as_slice() {
                [user] => return Resolution::hit(Confidence::Tokens, user),
                [] => {}
                _ => return Resolution::conflict(&by_tokens),
            }
        }

        let by_prefix: Vec<&DirectoryUser> = normalized
            .iter()
            .filter(|(n, _)| n.starts_with(&input))
            .map(|(_, u)| *u)
            .collect();
        match by_prefix.as_slice() {
            [user] => Resolution::weak_prefix(user),
            [] => Resolution::no_match(),
            _ => Resolution::conflict(&by_prefix),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Directory {
        Directory::from_users(vec![
            DirectoryUser {
                name: "Alice Smith".to_string(),
                email: "alice.smith@example.com".to_string(),
            },
            DirectoryUser {
                name: "Alan Turing".to_string(),
                email: "alan.turing@example.com".to_string(),
            },
            DirectoryUser {
                name: "Pat O'Brien".to_string(),
                email: "pat.obrien@example.com".to_string(),
            },
            DirectoryUser {
                name: "Sam Smith".to_string(),
                email: "sam.smith@example.com".to_string(),
            },
        ])
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("Alice Smith"), "alice smith");
        assert_eq!(normalize_name("  Pat   O'Brien "), "pat o brien");
        assert_eq!(normalize_name("ALICE-SMITH"), "alice smith");
        assert_eq!(normalize_name("!!!"), "");
    }

    #[test]
    fn test_resolve_empty_input() {
        let r = sample().resolve("   ");
        assert_eq!(r.confidence, Some(Confidence::Empty));
        assert!(r.email.is_none());
    }

    #[test]
    fn test_resolve_exact() {
        let r = sample().resolve("alice smith");
        assert_eq!(r.confidence, Some(Confidence::Exact));
        assert_eq!(r.email.as_deref(), Some("alice.smith@example.com"));
        assert_eq!(r.matched.as_deref(), Some("Alice Smith"));
    }

    #[test]
    fn test_resolve_exact_ignores_punctuation() {
        let r = sample().resolve("pat o'brien");
        assert_eq!(r.confidence, Some(Confidence::Exact));
        assert_eq!(r.email.as_deref(), Some("pat.obrien@example.com"));
    }

    #[test]
    fn test_resolve_exact_conflict() {
        let dir = Directory::from_users(vec![
            DirectoryUser {
                name: "Alex Kim".to_string(),
                email: "akim1@example.com".to_string(),
            },
            DirectoryUser {
                name: "alex-kim".to_string(),
                email: "akim2@example.com".to_string(),
            },
        ]);
        let r = dir.resolve("Alex Kim");
        assert!(r.conflict);
        assert!(r.email.is_none());
        assert_eq!(r.candidates, vec!["Alex Kim", "alex-kim"]);
    }

    #[test]
    fn test_resolve_tokens_with_initial() {
        let r = sample().resolve("a turing");
        assert_eq!(r.confidence, Some(Confidence::Tokens));
        assert_eq!(r.email.as_deref(), Some("alan.turing@example.com"));
    }

    #[test]
    fn test_resolve_tokens_conflict() {
        let r = sample().resolve("s smith");
        // the "s" initial is satisfied by "smith" itself, so both
        // Smiths qualify
        assert!(r.conflict);
        assert_eq!(r.candidates, vec!["Alice Smith", "Sam Smith"]);
    }

    #[test]
    fn test_resolve_initials_only_never_match() {
        let r = sample().resolve("a s");
        assert_eq!(r.confidence, Some(Confidence::NoMatch));
        assert!(r.email.is_none());
    }

    #[test]
    fn test_resolve_weak_prefix_withholds_email() {
        let r = sample().resolve("pat");
        assert_eq!(r.confidence, Some(Confidence::WeakPrefix));
        assert!(r.email.is_none());
        assert_eq!(r.matched.as_deref(), Some("Pat O'Brien"));
    }

    #[test]
    fn test_resolve_prefix_conflict() {
        let r = sample().resolve("al");
        assert!(r.conflict);
        assert_eq!(r.candidates, vec!["Alice Smith", "Alan Turing"]);
    }

    #[test]
    fn test_resolve_no_match() {
        let r = sample().resolve("zed zardoz");
        assert_eq!(r.confidence, Some(Confidence::NoMatch));
        assert!(r.email.is_none());
        assert!(!r.conflict);
    }

    #[test]
    fn test_load_missing_file_disables_resolution() {
        let dir = Directory::load(Path::new("/nonexistent/users.json"));
        assert!(dir.users().is_empty());
        assert_eq!(
            dir.resolve("Alice Smith").confidence,
            Some(Confidence::NoMatch)
        );
    }

    #[test]
    fn test_serialized_shape() {
        let r = sample().resolve("alice smith");
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["confidence"], "exact");
        assert_eq!(json["match"], "Alice Smith");
        assert!(json.get("conflict").is_none());
        assert!(json.get("candidates").is_none());

        let c = sample().resolve("al");
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["conflict"], true);
        assert!(json.get("confidence").is_none());
        assert_eq!(json["email"], serde_json::Value::Null);
    }
}
