pub mod error;

pub use error::{ApiError, ApiResult};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Bearer credential issued at login, plus the identity it belongs to.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub user_id: String,
    pub email: String,
    pub name: String,
    pub issued_at: DateTime<Utc>,
}

impl Session {
    pub fn new(
        access_token: impl Into<String>,
        user_id: impl Into<String>,
        email: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            user_id: user_id.into(),
            email: email.into(),
            name: name.into(),
            issued_at: Utc::now(),
        }
    }

    /// Value for the `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &mask_token(&self.access_token))
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .field("name", &self.name)
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

/// Mask a credential for logs: first and last four characters only.
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

// ---------------------------------------------------------------------------
// Backend-agnostic listing types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: String,
    pub title: String,
    pub description: String,
    pub responsibilities: Vec<String>,
    pub requirements: Vec<String>,
    pub ideal_candidate: String,
    pub categories: Vec<String>,
    pub op_type: String,
    pub start_date: String,
    pub end_date: String,
    pub deadline: String,
    pub locations: Vec<String>,
    pub required_skills: Vec<String>,
    pub when_and_where: String,
    pub org_id: String,
    pub org_name: String,
    pub org_email: String,
    pub org_primary_phone: String,
    pub logo_url: String,
    pub date_posted: String,
    pub status: String,
    pub applicants_count: u32,
    pub views_count: u32,
    /// Server's view at fetch time; the bookmark store is authoritative after that.
    pub is_bookmarked: bool,
    pub is_rolling: bool,
    pub average_rating: f64,
    pub total_reviews: u32,
    pub created_at: String,
    pub updated_at: String,
}

impl Opportunity {
    pub fn deadline_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.deadline)
    }

    pub fn posted_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.date_posted)
    }

    /// Past its deadline. Rolling listings and unparseable deadlines never close.
    pub fn is_closed(&self, now: DateTime<Utc>) -> bool {
        if self.is_rolling {
            return false;
        }
        self.deadline_at().map(|d| d < now).unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookmarkRecord {
    pub opportunity_id: String,
    pub title: String,
    pub org_name: String,
    pub op_type: String,
    pub location: String,
    pub logo_url: String,
    pub date_bookmarked: String,
    pub date_posted: String,
}

impl BookmarkRecord {
    pub fn bookmarked_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.date_bookmarked)
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

// ---------------------------------------------------------------------------
// Backend traits
// ---------------------------------------------------------------------------

/// Remote system of record for a session's bookmarks.
#[async_trait]
pub trait BookmarkApi: Send + Sync {
    /// All bookmarks held by the session's user
    async fn list_bookmarks(&self, session: &Session) -> ApiResult<Vec<BookmarkRecord>>;

    /// Bookmark an opportunity
    async fn add_bookmark(&self, session: &Session, opportunity_id: &str) -> ApiResult<()>;

    /// Remove a bookmark
    async fn remove_bookmark(&self, session: &Session, opportunity_id: &str) -> ApiResult<()>;

    /// Backend name for logging
    fn backend_name(&self) -> &str;
}

/// Read-only listing access. Each call hits the network.
#[async_trait]
pub trait OpportunityApi: Send + Sync {
    async fn list_opportunities(&self) -> ApiResult<Vec<Opportunity>>;

    /// `None` when the backend does not know the id
    async fn get_opportunity(&self, id: &str) -> ApiResult<Option<Opportunity>>;
}
