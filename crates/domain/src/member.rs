//! Shop members.

use chrono::{DateTime, Utc};
use common::MemberId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberRole {
    #[default]
    User,
    Admin,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::User => "USER",
            MemberRole::Admin => "ADMIN",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "USER" => Some(MemberRole::User),
            "ADMIN" => Some(MemberRole::Admin),
            _ => None,
        }
    }
}

/// A registered customer. Credentials live outside this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub email: String,
    pub nickname: String,
    pub role: MemberRole,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Member {
    /// Creates a member with the `USER` role.
    pub fn new(email: impl Into<String>, nickname: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: MemberId::new(),
            email: email.into(),
            nickname: nickname.into(),
            role: MemberRole::User,
            created_at: now,
            updated_at: now,
        }
    }
}
