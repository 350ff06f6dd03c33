// Identifier newtypes. Server ids and local placeholders never share a namespace.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a post in the local store.
///
/// `Confirmed` carries the server-assigned id. `Pending` is a locally
/// allocated placeholder for a create that has not been acknowledged yet;
/// it can never compare equal to a server id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PostId {
    Confirmed(String),
    Pending(u64),
}

impl PostId {
    pub fn confirmed(id: impl Into<String>) -> Self {
        Self::Confirmed(id.into())
    }

    /// The server id, if this post has one.
    pub fn server_id(&self) -> Option<&str> {
        match self {
            Self::Confirmed(id) => Some(id),
            Self::Pending(_) => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Confirmed(id) => write!(f, "{}", id),
            Self::Pending(n) => write!(f, "pending#{}", n),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MediaId(pub String);

impl MediaId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MediaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_ids_never_equal_server_ids() {
        assert_ne!(PostId::Pending(1), PostId::confirmed("1"));
        assert_ne!(PostId::Pending(7), PostId::confirmed("pending#7"));
    }

    #[test]
    fn server_id_only_for_confirmed() {
        assert_eq!(PostId::confirmed("abc").server_id(), Some("abc"));
        assert_eq!(PostId::Pending(3).server_id(), None);
        assert!(PostId::Pending(3).is_pending());
    }
}
