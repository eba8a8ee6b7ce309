//! HTTP client for the Prospect Manager backend.
//!
//! Every request carries `Authorization: Bearer <access key>` when a key is configured.

use crate::engine::MessageDispatcher;
use crate::model::{
    Campaign, CampaignCreateResponse, CampaignRecipient, CreateCampaignRequest,
    ListCampaignsQuery, ListPlacesQuery, ListRecipientsQuery, MessageTemplate, MessageType, Niche,
    Paginated, PlaceItem, SearchRequest, SearchResponse, SendMessagePayload, SendMessageResponse,
};
use async_trait::async_trait;
use reqwest::{header, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_API_URL: &str = "http://localhost:3001";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("access key invalid or not authorized")]
    Unauthorized,

    #[error("API returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("could not decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid base URL {0:?}")]
    BaseUrl(String),
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub access_key: Option<String>,
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.into(),
            access_key: None,
            timeout: Duration::from_secs(30),
            user_agent: format!("prospect-manager-cli/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Clone)]
pub struct ProspectApi {
    http: reqwest::Client,
    base_url: reqwest::Url,
    access_key: Option<String>,
}

impl ProspectApi {
    pub fn new(cfg: &ApiConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .timeout(cfg.timeout)
            .build()?;
        // Trailing slash so `join` appends instead of replacing the last segment.
        let mut base = cfg.base_url.trim_end_matches('/').to_string();
        base.push('/');
        let base_url =
            reqwest::Url::parse(&base).map_err(|_| ApiError::BaseUrl(cfg.base_url.clone()))?;
        Ok(Self {
            http,
            base_url,
            access_key: cfg.access_key.clone().filter(|k| !k.trim().is_empty()),
        })
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ApiError> {
        self.request_with_key(method, path, self.access_key.as_deref())
    }

    fn request_with_key(
        &self,
        method: Method,
        path: &str,
        key: Option<&str>,
    ) -> Result<RequestBuilder, ApiError> {
        let url = self
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(|_| ApiError::BaseUrl(format!("{}{}", self.base_url, path)))?;
        let mut req = self
            .http
            .request(method, url)
            .header(header::ACCEPT, "application/json");
        if let Some(key) = key {
            req = req.bearer_auth(key);
        }
        Ok(req)
    }

    async fn execute<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ApiError> {
        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if status == StatusCode::UNAUTHORIZED {
            tracing::warn!("API rejected access key");
            return Err(ApiError::Unauthorized);
        }
        if !status.is_success() {
            tracing::warn!(%status, "API error response");
            return Err(ApiError::Status { status, body });
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let req = self.request(Method::GET, path)?;
        self.execute(req).await
    }

    async fn get_with<T: DeserializeOwned, Q: Serialize + ?Sized>(
        &self,
        path: &str,
        query: &Q,
    ) -> Result<T, ApiError> {
        let req = self.request(Method::GET, path)?.query(query);
        self.execute(req).await
    }

    async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let req = self.request(Method::POST, path)?.json(body);
        self.execute(req).await
    }

    /// Check an access key against `/auth/validate`. A 401 means the key is
    /// invalid (`Ok(false)`); any other failure is an error.
    pub async fn validate_access_key(&self, key: &str) -> Result<bool, ApiError> {
        let resp = self
            .request_with_key(Method::GET, "/auth/validate", Some(key))?
            .send()
            .await?;
        match resp.status() {
            StatusCode::OK => Ok(true),
            StatusCode::UNAUTHORIZED => Ok(false),
            status => {
                let body = resp.text().await.unwrap_or_default();
                Err(ApiError::Status { status, body })
            }
        }
    }

    pub async fn list_niches(&self) -> Result<Vec<Niche>, ApiError> {
        self.get("/niches").await
    }

    pub async fn search_businesses(&self, req: &SearchRequest) -> Result<SearchResponse, ApiError> {
        self.post("/google-busines-scraper/search", req).await
    }

    pub async fn list_places(
        &self,
        query: &ListPlacesQuery,
    ) -> Result<Paginated<PlaceItem>, ApiError> {
        self.get_with("/google-busines-scraper/places", query)
            .await
    }

    /// Walk the places listing page by page until `limit` items are collected
    /// or the last page is reached.
    pub async fn fetch_all_places(
        &self,
        query: &ListPlacesQuery,
        limit: usize,
    ) -> Result<Vec<PlaceItem>, ApiError> {
        let mut q = query.clone();
        let mut page = q.page.unwrap_or(1).max(1);
        let mut out = Vec::new();
        loop {
            q.page = Some(page);
            let resp = self.list_places(&q).await?;
            let last = page >= resp.total_pages || resp.items.is_empty();
            out.extend(resp.items);
            if out.len() >= limit {
                out.truncate(limit);
                break;
            }
            if last {
                break;
            }
            page += 1;
        }
        tracing::debug!(count = out.len(), "fetched places");
        Ok(out)
    }

    pub async fn list_message_types(&self) -> Result<Vec<MessageType>, ApiError> {
        self.get("/message-types").await
    }

    pub async fn list_templates(
        &self,
        message_type_id: &str,
    ) -> Result<Vec<MessageTemplate>, ApiError> {
        self.get_with("/templates", &[("messageTypeId", message_type_id)])
            .await
    }

    pub async fn list_campaigns(
        &self,
        query: &ListCampaignsQuery,
    ) -> Result<Paginated<Campaign>, ApiError> {
        self.get_with("/campaigns", query).await
    }

    pub async fn get_campaign(&self, id: &str) -> Result<Campaign, ApiError> {
        self.get(&format!("/campaigns/{id}")).await
    }

    pub async fn list_campaign_recipients(
        &self,
        campaign_id: &str,
        query: &ListRecipientsQuery,
    ) -> Result<Paginated<CampaignRecipient>, ApiError> {
        self.get_with(&format!("/campaigns/{campaign_id}/recipients"), query)
            .await
    }

    /// Every recipient of a campaign, following pagination.
    pub async fn fetch_all_recipients(
        &self,
        campaign_id: &str,
        query: &ListRecipientsQuery,
    ) -> Result<Vec<CampaignRecipient>, ApiError> {
        let mut q = query.clone();
        let mut page = 1;
        let mut out = Vec::new();
        loop {
            q.page = Some(page);
            let resp = self.list_campaign_recipients(campaign_id, &q).await?;
            let last = page >= resp.total_pages || resp.items.is_empty();
            out.extend(resp.items);
            if last {
                break;
            }
            page += 1;
        }
        Ok(out)
    }

    pub async fn create_campaign(
        &self,
        req: &CreateCampaignRequest,
    ) -> Result<CampaignCreateResponse, ApiError> {
        self.post("/campaigns", req).await
    }

    pub async fn send_whatsapp_message(
        &self,
        payload: &SendMessagePayload,
    ) -> Result<SendMessageResponse, ApiError> {
        self.post("/whatsapp/sendWhatsappMessage", payload).await
    }
}

#[async_trait]
impl MessageDispatcher for ProspectApi {
    async fn send_message(&self, payload: &SendMessagePayload) -> anyhow::Result<SendMessageResponse> {
        Ok(self.send_whatsapp_message(payload).await?)
    }
}

/// Campaign name the backend expects: `"<message type> - dd/mm/yyyy hh:mm"` in local time.
pub fn campaign_name(message_type_name: &str, now: time::OffsetDateTime) -> String {
    let fmt = time::macros::format_description!("[day]/[month]/[year] [hour]:[minute]");
    let stamp = now.format(&fmt).unwrap_or_default();
    format!("{message_type_name} - {stamp}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, key: Option<&str>) -> ProspectApi {
        ProspectApi::new(&ApiConfig {
            base_url: server.uri(),
            access_key: key.map(Into::into),
            ..Default::default()
        })
        .unwrap()
    }

    fn place_json(id: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "googlePlaceId": format!("g-{id}"),
            "displayName": format!("Place {id}"),
            "nicheSearched": "padaria",
            "normalizedPhoneE164": "+5511999990000",
            "firstMessageSent": false,
            "enrichmentStatus": "enriched",
            "createdAt": "2024-01-01T00:00:00Z",
            "updatedAt": "2024-01-01T00:00:00Z"
        })
    }

    #[tokio::test]
    async fn send_message_posts_payload_with_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/whatsapp/sendWhatsappMessage"))
            .and(header("authorization", "Bearer secret"))
            .and(body_json(serde_json::json!({
                "text": "Olá",
                "number": "5511999990000",
                "googlePlaceId": "g-1"
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "success": true, "message": "sent" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let api = client(&server, Some("secret"));
        let resp = api
            .send_message(&SendMessagePayload {
                text: "Olá".into(),
                number: "5511999990000".into(),
                google_place_id: Some("g-1".into()),
            })
            .await
            .unwrap();
        assert!(resp.success);
        assert_eq!(resp.message.as_deref(), Some("sent"));
    }

    #[tokio::test]
    async fn unauthorized_maps_to_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/niches"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = client(&server, Some("bad")).list_niches().await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized));
    }

    #[tokio::test]
    async fn server_error_keeps_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/campaigns/c1"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        match client(&server, None).get_campaign("c1").await {
            Err(ApiError::Status { status, body }) => {
                assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
                assert_eq!(body, "maintenance");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn validate_access_key_reads_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/validate"))
            .and(header("authorization", "Bearer good"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/auth/validate"))
            .and(header("authorization", "Bearer bad"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let api = client(&server, None);
        assert!(api.validate_access_key("good").await.unwrap());
        assert!(!api.validate_access_key("bad").await.unwrap());
    }

    #[tokio::test]
    async fn fetch_all_places_walks_pages_and_honours_limit() {
        let server = MockServer::start().await;
        for page in 1..=3u32 {
            let items: Vec<_> = (0..2).map(|i| place_json(&format!("{page}-{i}"))).collect();
            Mock::given(method("GET"))
                .and(path("/google-busines-scraper/places"))
                .and(query_param("page", page.to_string()))
                .and(query_param("firstMessageSent", "false"))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "items": items,
                    "page": page,
                    "pageSize": 2,
                    "total": 6,
                    "totalPages": 3
                })))
                .mount(&server)
                .await;
        }

        let api = client(&server, None);
        let query = ListPlacesQuery {
            page_size: Some(2),
            first_message_sent: Some(false),
            ..Default::default()
        };
        let all = api.fetch_all_places(&query, 100).await.unwrap();
        assert_eq!(all.len(), 6);
        assert_eq!(all[5].id, "3-1");

        let capped = api.fetch_all_places(&query, 3).await.unwrap();
        assert_eq!(capped.len(), 3);
        assert_eq!(capped[2].id, "2-0");
    }

    #[tokio::test]
    async fn base_url_with_path_prefix_is_preserved() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/message-types"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "id": "m1", "name": "Primeiro contato", "description": "", "isActive": true, "templateCount": 2 }
            ])))
            .mount(&server)
            .await;

        let api = ProspectApi::new(&ApiConfig {
            base_url: format!("{}/api/", server.uri()),
            ..Default::default()
        })
        .unwrap();
        let types = api.list_message_types().await.unwrap();
        assert_eq!(types[0].template_count, 2);
    }

    #[test]
    fn campaign_name_uses_day_month_year() {
        let now = time::macros::datetime!(2024-03-05 09:07 UTC);
        assert_eq!(
            campaign_name("Primeiro contato", now),
            "Primeiro contato - 05/03/2024 09:07"
        );
    }
}
