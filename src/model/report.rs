use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::UserId;

/// A moderation queue entry. Carries a snapshot of the reported post as it
/// looked when the report was filed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: String,
    #[serde(alias = "comment_id")]
    pub post_id: String,
    #[serde(alias = "comment_content")]
    pub post_content: String,
    #[serde(alias = "comment_author")]
    pub post_author: String,
    /// Author's user id, used for banning from the queue.
    #[serde(default, alias = "user_id")]
    pub author_id: Option<UserId>,
    pub reporter: String,
    pub reason: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Report {
    /// Case-insensitive match against the reported content or author.
    pub fn matches(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.post_content.to_lowercase().contains(&needle)
            || self.post_author.to_lowercase().contains(&needle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_comment_field_names() {
        let json = r#"{
            "id": "r1",
            "comment_id": "c1",
            "comment_content": "spoilers ahead",
            "comment_author": "kana",
            "reporter": "mio",
            "reason": "spoiler",
            "user_id": "u-9"
        }"#;
        let report: Report = serde_json::from_str(json).unwrap();
        assert_eq!(report.post_id, "c1");
        assert_eq!(report.post_author, "kana");
        assert_eq!(report.author_id, Some(UserId::new("u-9")));
        assert!(report.created_at.is_none());
    }

    #[test]
    fn matches_is_case_insensitive() {
        let report = Report {
            id: "r1".into(),
            post_id: "c1".into(),
            post_content: "Totally Off Topic".into(),
            post_author: "Kana".into(),
            author_id: None,
            reporter: "mio".into(),
            reason: "spam".into(),
            created_at: None,
        };
        assert!(report.matches("off topic"));
        assert!(report.matches("KANA"));
        assert!(!report.matches("mio"));
    }
}
