use crate::forms::{self, SignInForm, VerifyEmailForm};
use crate::models::*;
use crate::AkilConfig;
use async_trait::async_trait;
use bookmark_api::{
    ApiError, ApiResult, BookmarkApi, BookmarkRecord, Opportunity as ListedOpportunity,
    OpportunityApi, Session,
};
use reqwest::{header, Client, Response, StatusCode};
use serde::de::DeserializeOwned;

pub struct AkilClient {
    client: Client,
    base_url: String,
}

impl AkilClient {
    /// Create a new Akil client
    pub fn new(config: AkilConfig) -> ApiResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(network_error)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Create client from `AKIL_BASE_URL` / `AKIL_TIMEOUT_SECS`.
    pub fn from_env() -> ApiResult<Self> {
        Self::new(AkilConfig::from_env())
    }

    fn auth_headers(session: &Session) -> ApiResult<header::HeaderMap> {
        let mut headers = header::HeaderMap::new();
        let value = header::HeaderValue::from_str(&session.bearer()).map_err(|_| {
            ApiError::InvalidRequest("access token contains invalid header characters".into())
        })?;
        headers.insert(header::AUTHORIZATION, value);
        Ok(headers)
    }

    /// List all published opportunities
    pub async fn list_opportunities(&self) -> ApiResult<Vec<ListedOpportunity>> {
        let url = format!("{}/opportunities/search", self.base_url);
        tracing::debug!("GET {}", url);

        let response = self.client.get(&url).send().await.map_err(network_error)?;
        let (status, body) = read_body(response).await?;
        opportunities_outcome(status, &body)
    }

    /// Get one opportunity. Any non-success status reads as "not found".
    pub async fn get_opportunity(&self, id: &str) -> ApiResult<Option<ListedOpportunity>> {
        let url = format!("{}/opportunities/{}", self.base_url, id);
        tracing::debug!("GET {}", url);

        let response = self.client.get(&url).send().await.map_err(network_error)?;
        let (status, body) = read_body(response).await?;
        if !status.is_success() {
            tracing::debug!("Opportunity {} unavailable: HTTP {}", id, status);
        }
        opportunity_outcome(status, &body)
    }

    /// Get the session user's bookmarks
    pub async fn list_bookmarks(&self, session: &Session) -> ApiResult<Vec<BookmarkRecord>> {
        let url = format!("{}/bookmarks", self.base_url);

        let response = self
            .client
            .get(&url)
            .headers(Self::auth_headers(session)?)
            .send()
            .await
            .map_err(network_error)?;

        let (status, body) = read_body(response).await?;
        bookmarks_outcome(status, &body)
    }

    /// Bookmark an opportunity
    pub async fn add_bookmark(&self, session: &Session, opportunity_id: &str) -> ApiResult<()> {
        let url = format!("{}/bookmarks/{}", self.base_url, opportunity_id);

        let response = self
            .client
            .post(&url)
            .headers(Self::auth_headers(session)?)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(network_error)?;

        let (status, body) = read_body(response).await?;
        mutation_outcome(status, &body, "Failed to add bookmark")?;

        tracing::info!("Bookmark {} added", opportunity_id);
        Ok(())
    }

    /// Remove a bookmark
    pub async fn remove_bookmark(&self, session: &Session, opportunity_id: &str) -> ApiResult<()> {
        let url = format!("{}/bookmarks/{}", self.base_url, opportunity_id);

        let response = self
            .client
            .delete(&url)
            .headers(Self::auth_headers(session)?)
            .send()
            .await
            .map_err(network_error)?;

        let (status, body) = read_body(response).await?;
        mutation_outcome(status, &body, "Failed to remove bookmark")?;

        tracing::info!("Bookmark {} removed", opportunity_id);
        Ok(())
    }

    /// Exchange e-mail and password for a session
    pub async fn login(&self, email: &str, password: &str) -> ApiResult<Session> {
        let form = SignInForm::new(email, password);
        let errors = form.validate();
        if !errors.is_empty() {
            return Err(ApiError::InvalidRequest(forms::describe(&errors)));
        }

        let url = format!("{}/login", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&LoginRequest {
                email: form.email.trim(),
                password: &form.password,
            })
            .send()
            .await
            .map_err(network_error)?;

        let (status, body) = read_body(response).await?;
        let data = login_outcome(status, &body)?;

        tracing::info!("Signed in as {}", data.email);
        Ok(Session::new(data.access_token, data.id, data.email, data.name))
    }

    /// Confirm an account with the one-time code sent by e-mail
    pub async fn verify_email(&self, email: &str, otp: &str) -> ApiResult<()> {
        let form = VerifyEmailForm::new(email, otp);
        let errors = form.validate();
        if !errors.is_empty() {
            return Err(ApiError::InvalidRequest(forms::describe(&errors)));
        }

        let url = format!("{}/verify-email", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&VerifyEmailRequest {
                email: form.email.trim(),
                otp: form.otp.trim(),
            })
            .send()
            .await
            .map_err(network_error)?;

        let (status, body) = read_body(response).await?;
        mutation_outcome(status, &body, "Verification failed")?;

        tracing::info!("E-mail {} verified", form.email.trim());
        Ok(())
    }

    /// Get the base URL (for logging/diagnostics)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

fn network_error(e: reqwest::Error) -> ApiError {
    if e.is_decode() {
        ApiError::Decode(e.to_string())
    } else {
        ApiError::Network(e.to_string())
    }
}

async fn read_body(response: Response) -> ApiResult<(StatusCode, String)> {
    let status = response.status();
    let body = response.text().await.map_err(network_error)?;
    Ok((status, body))
}

fn decode<T: DeserializeOwned>(body: &str) -> ApiResult<ApiResponse<T>> {
    serde_json::from_str(body).map_err(|e| ApiError::Decode(e.to_string()))
}

/// Server-supplied `message` from an error body, else `fallback`.
fn error_message(body: &str, fallback: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

// ---------------------------------------------------------------------------
// Response interpretation: status + body -> result
// ---------------------------------------------------------------------------

fn opportunities_outcome(status: StatusCode, body: &str) -> ApiResult<Vec<ListedOpportunity>> {
    if !status.is_success() {
        return Err(ApiError::server(status.as_u16(), "Failed to fetch opportunities"));
    }
    Ok(decode::<Vec<Opportunity>>(body)?
        .data
        .unwrap_or_default()
        .into_iter()
        .map(opportunity_to_listed)
        .collect())
}

fn opportunity_outcome(status: StatusCode, body: &str) -> ApiResult<Option<ListedOpportunity>> {
    if !status.is_success() {
        return Ok(None);
    }
    Ok(decode::<Opportunity>(body)?.data.map(opportunity_to_listed))
}

fn bookmarks_outcome(status: StatusCode, body: &str) -> ApiResult<Vec<BookmarkRecord>> {
    if !status.is_success() {
        return Err(ApiError::server(status.as_u16(), "Failed to fetch bookmarks"));
    }
    Ok(decode::<Vec<BookmarkData>>(body)?
        .data
        .unwrap_or_default()
        .into_iter()
        .map(bookmark_to_record)
        .collect())
}

/// Add, remove and verify only care about the status; the body is read for
/// the error message.
fn mutation_outcome(status: StatusCode, body: &str, fallback: &str) -> ApiResult<()> {
    if status.is_success() {
        Ok(())
    } else {
        Err(ApiError::server(status.as_u16(), error_message(body, fallback)))
    }
}

fn login_outcome(status: StatusCode, body: &str) -> ApiResult<LoginData> {
    let envelope = match serde_json::from_str::<ApiResponse<LoginData>>(body) {
        Ok(envelope) => envelope,
        Err(e) if status.is_success() => return Err(ApiError::Decode(e.to_string())),
        Err(_) => {
            return Err(ApiError::InvalidCredentials(error_message(
                body,
                "Invalid email or password",
            )))
        }
    };

    match envelope.data {
        Some(data) if status.is_success() && envelope.success => Ok(data),
        _ if envelope.message.trim().is_empty() => {
            Err(ApiError::InvalidCredentials("Invalid email or password".to_string()))
        }
        _ => Err(ApiError::InvalidCredentials(envelope.message)),
    }
}

// ---------------------------------------------------------------------------
// Conversion helpers: Akil wire types -> backend-agnostic types
// ---------------------------------------------------------------------------

fn opportunity_to_listed(o: Opportunity) -> ListedOpportunity {
    ListedOpportunity {
        id: o.id,
        title: o.title,
        description: o.description,
        responsibilities: o.responsibilities,
        requirements: o.requirements,
        ideal_candidate: o.ideal_candidate,
        categories: o.categories,
        op_type: o.op_type,
        start_date: o.start_date,
        end_date: o.end_date,
        deadline: o.deadline,
        locations: o.location,
        required_skills: o.required_skills,
        when_and_where: o.when_and_where,
        org_id: o.org_id,
        org_name: o.org_name,
        org_email: o.org_email,
        org_primary_phone: o.org_primary_phone,
        logo_url: o.logo_url,
        date_posted: o.date_posted,
        status: o.status,
        applicants_count: o.applicants_count,
        views_count: o.views_count,
        is_bookmarked: o.is_bookmarked,
        is_rolling: o.is_rolling,
        average_rating: o.average_rating,
        total_reviews: o.total_reviews,
        created_at: o.created_at,
        updated_at: o.updated_at,
    }
}

fn bookmark_to_record(b: BookmarkData) -> BookmarkRecord {
    BookmarkRecord {
        opportunity_id: b.event_id,
        title: b.title,
        org_name: b.org_name,
        op_type: b.op_type,
        location: b.location,
        logo_url: b.logo_url,
        date_bookmarked: b.date_bookmarked,
        date_posted: b.date_posted,
    }
}

#[async_trait]
impl BookmarkApi for AkilClient {
    async fn list_bookmarks(&self, session: &Session) -> ApiResult<Vec<BookmarkRecord>> {
        self.list_bookmarks(session).await
    }

    async fn add_bookmark(&self, session: &Session, opportunity_id: &str) -> ApiResult<()> {
        self.add_bookmark(session, opportunity_id).await
    }

    async fn remove_bookmark(&self, session: &Session, opportunity_id: &str) -> ApiResult<()> {
        self.remove_bookmark(session, opportunity_id).await
    }

    fn backend_name(&self) -> &str {
        "akil"
    }
}

#[async_trait]
impl OpportunityApi for AkilClient {
    async fn list_opportunities(&self) -> ApiResult<Vec<ListedOpportunity>> {
        self.list_opportunities().await
    }

    async fn get_opportunity(&self, id: &str) -> ApiResult<Option<ListedOpportunity>> {
        self.get_opportunity(id).await
    }
}
