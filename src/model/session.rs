use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::UserId;
use super::post::Author;

/// Caller role, ordered from least to most privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Moderator,
    Admin,
}

impl Role {
    /// Moderator or admin.
    pub fn is_staff(self) -> bool {
        self >= Role::Moderator
    }
}

/// The signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl Actor {
    pub fn new(id: impl Into<String>, username: impl Into<String>, role: Role) -> Self {
        Self {
            id: UserId::new(id),
            username: username.into(),
            role,
            avatar_url: None,
        }
    }

    /// Whether this actor wrote a post by `author`. Prefers the user id and
    /// falls back to the username when the server omitted the id.
    pub fn is_author_of(&self, author: &Author) -> bool {
        match author.id {
            Some(ref id) => *id == self.id,
            None => author.username == self.username,
        }
    }

    pub fn as_author(&self) -> Author {
        Author {
            id: Some(self.id.clone()),
            username: self.username.clone(),
            avatar_url: self.avatar_url.clone(),
        }
    }
}

/// Opaque bearer credential. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken(<redacted>)")
    }
}

/// Per-call context threaded into every backend request.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub credential: Option<BearerToken>,
    pub actor: Option<Actor>,
}

impl Session {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticated(credential: BearerToken, actor: Actor) -> Self {
        Self {
            credential: Some(credential),
            actor: Some(actor),
        }
    }

    pub fn role(&self) -> Option<Role> {
        self.actor.as_ref().map(|a| a.role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_hierarchy() {
        assert!(Role::Admin > Role::Moderator);
        assert!(Role::Moderator > Role::User);
        assert!(Role::Admin.is_staff());
        assert!(Role::Moderator.is_staff());
        assert!(!Role::User.is_staff());
    }

    #[test]
    fn bearer_token_debug_is_redacted() {
        let token = BearerToken::new("super-secret");
        let printed = format!("{:?}", Session::authenticated(token, Actor::new("u1", "kana", Role::User)));
        assert!(!printed.contains("super-secret"));
    }

    #[test]
    fn authorship_falls_back_to_username() {
        let actor = Actor::new("u1", "kana", Role::User);
        let by_id = Author {
            id: Some(UserId::new("u1")),
            username: "renamed".into(),
            avatar_url: None,
        };
        let by_name = Author {
            id: None,
            username: "kana".into(),
            avatar_url: None,
        };
        let other = Author {
            id: Some(UserId::new("u2")),
            username: "kana".into(),
            avatar_url: None,
        };
        assert!(actor.is_author_of(&by_id));
        assert!(actor.is_author_of(&by_name));
        assert!(!actor.is_author_of(&other));
    }
}
