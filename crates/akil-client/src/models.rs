use serde::{Deserialize, Deserializer, Serialize};

/// Envelope every Akil endpoint wraps its payload in.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
    #[serde(default)]
    pub count: Option<u32>,
}

/// Error body on non-2xx responses. Only `message` is used.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Opportunity {
    pub id: String,
    pub title: String,
    pub description: String,
    // Older listings send a single paragraph instead of a list
    #[serde(deserialize_with = "string_or_list")]
    pub responsibilities: Vec<String>,
    #[serde(deserialize_with = "string_or_list")]
    pub requirements: Vec<String>,
    pub ideal_candidate: String,
    pub categories: Vec<String>,
    pub op_type: String,
    pub start_date: String,
    pub end_date: String,
    pub deadline: String,
    #[serde(deserialize_with = "string_or_list")]
    pub location: Vec<String>,
    pub required_skills: Vec<String>,
    pub when_and_where: String,
    #[serde(rename = "orgID")]
    pub org_id: String,
    pub org_name: String,
    pub org_email: String,
    pub org_primary_phone: String,
    pub logo_url: String,
    pub date_posted: String,
    pub status: String,
    pub applicants_count: u32,
    pub views_count: u32,
    pub is_bookmarked: bool,
    pub is_rolling: bool,
    #[serde(rename = "average_rating")]
    pub average_rating: f64,
    #[serde(rename = "total_reviews")]
    pub total_reviews: u32,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BookmarkData {
    #[serde(rename = "eventID")]
    pub event_id: String,
    pub title: String,
    pub org_name: String,
    pub op_type: String,
    pub location: String,
    pub logo_url: String,
    pub date_bookmarked: String,
    pub date_posted: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginData {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub role: Option<String>,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyEmailRequest<'a> {
    pub email: &'a str,
    #[serde(rename = "OTP")]
    pub otp: &'a str,
}

fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        One(String),
        Many(Vec<String>),
        Missing(()),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::One(s) if s.trim().is_empty() => Vec::new(),
        Raw::One(s) => vec![s],
        Raw::Many(v) => v,
        Raw::Missing(()) => Vec::new(),
    })
}
