use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, error};

use crate::{
    config::WizardConfig,
    models::{Category, GenerateMockupsRequest, GenerateMockupsResponse, GeneratedMockup, UploadTarget, UploadUrlRequest, UploadUrlResponse},
};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("HTTP error! status: {0}")] Status(u16),
    #[error("{0}")] Transport(String),
    #[error("{0}")] Reported(String),
    #[error("Invalid data received from server")] Malformed,
}

impl From<reqwest::Error> for ServiceError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => ServiceError::Status(status.as_u16()),
            None => ServiceError::Transport(e.to_string()),
        }
    }
}

/// The three external collaborators of the wizard.
#[async_trait]
pub trait MockupBackend: Send + Sync {
    async fn fetch_thumbnails(&self, category: &Category) -> Result<Vec<String>, ServiceError>;
    async fn request_upload_url(&self, file_name: &str) -> Result<UploadTarget, ServiceError>;
    async fn put_object(&self, upload_url: &str, bytes: Bytes) -> Result<(), ServiceError>;
    async fn generate_mockups(&self, request: &GenerateMockupsRequest) -> Result<Vec<GeneratedMockup>, ServiceError>;
}

pub struct HttpBackend {
    client: Client,
    thumbnail_service_url: String,
    upload_service_url: String,
    generation_service_url: String,
}

impl HttpBackend {
    pub fn new(config: &WizardConfig) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ServiceError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            thumbnail_service_url: config.thumbnail_service_url.clone(),
            upload_service_url: config.upload_service_url.clone(),
            generation_service_url: config.generation_service_url.clone(),
        })
    }
}

// --- Response Parsing Helpers ---

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ThumbsResponse {
    List(Vec<String>),
    Failure { error: String },
    Other(serde_json::Value),
}

fn parse_thumbs(body: &str) -> Result<Vec<String>, ServiceError> {
    match serde_json::from_str::<ThumbsResponse>(body) {
        Ok(ThumbsResponse::List(thumbs)) => Ok(thumbs),
        Ok(ThumbsResponse::Failure { error }) => Err(ServiceError::Reported(error)),
        Ok(ThumbsResponse::Other(_)) => Err(ServiceError::Malformed),
        Err(e) => {
            error!("❌ Thumbnail response is not JSON: {}", e);
            Err(ServiceError::Malformed)
        }
    }
}

#[async_trait]
impl MockupBackend for HttpBackend {
    async fn fetch_thumbnails(&self, category: &Category) -> Result<Vec<String>, ServiceError> {
        let url = format!("{}/get_thumbs", self.thumbnail_service_url);
        info!("🔗 Fetching thumbnails for '{}' from {}", category, url);

        let response = self.client
            .get(&url)
            .query(&[("category", category.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            error!("❌ Thumbnail service responded with {}", status);
            return Err(ServiceError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        let thumbs = parse_thumbs(&body)?;
        info!("📥 Received {} thumbnails for '{}'", thumbs.len(), category);
        Ok(thumbs)
    }

    async fn request_upload_url(&self, file_name: &str) -> Result<UploadTarget, ServiceError> {
        let url = format!("{}/get-upload-url", self.upload_service_url);
        info!("🔗 Requesting upload URL for '{}'", file_name);

        let response = self.client
            .post(&url)
            .json(&UploadUrlRequest { file_name: file_name.to_string() })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            error!("❌ Upload URL service responded with {} for '{}'", status, file_name);
            return Err(ServiceError::Status(status.as_u16()));
        }

        let parsed: UploadUrlResponse = response.json().await.map_err(|_| ServiceError::Malformed)?;
        Ok(UploadTarget {
            upload_url: parsed.upload_url,
            storage_key: parsed.key.unwrap_or_else(|| file_name.to_string()),
        })
    }

    async fn put_object(&self, upload_url: &str, bytes: Bytes) -> Result<(), ServiceError> {
        let size = bytes.len();
        let response = self.client.put(upload_url).body(bytes).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("❌ Storage PUT failed with {}: {}", status, body);
            return Err(ServiceError::Status(status.as_u16()));
        }
        info!("📤 Stored {} bytes", size);
        Ok(())
    }

    async fn generate_mockups(&self, request: &GenerateMockupsRequest) -> Result<Vec<GeneratedMockup>, ServiceError> {
        let url = format!("{}/generate_mockups", self.generation_service_url);
        info!(
            "🎯 Requesting mockups: {} templates x {} designs for '{}'",
            request.templates.len(), request.designs.len(), request.category
        );

        let response = self.client.post(&url).json(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("❌ Generation service responded with {}: {}", status, body);
            return Err(ServiceError::Status(status.as_u16()));
        }

        let parsed: GenerateMockupsResponse = response.json().await.map_err(|_| ServiceError::Malformed)?;
        info!("✅ Generation service returned {} mockups", parsed.mockups.len());
        Ok(parsed.mockups)
    }
}

#[cfg(test)]
pub(crate) mod fake_server {
    //! Local stand-ins for the external services, bound to an ephemeral port.

    use std::{collections::HashMap, net::SocketAddr, sync::Arc};

    use axum::{
        Json, Router,
        body::Bytes,
        extract::{Path, Query, State},
        http::StatusCode,
        routing::{get, post, put},
    };
    use parking_lot::Mutex;
    use serde_json::{json, Value};

    #[derive(Clone, Default)]
    pub struct Recorded {
        pub stored: Arc<Mutex<HashMap<String, Vec<u8>>>>,
        pub generate_bodies: Arc<Mutex<Vec<Value>>>,
    }

    async fn thumbs(Query(q): Query<HashMap<String, String>>) -> (StatusCode, Json<Value>) {
        match q.get("category").map(String::as_str) {
            Some("mugs") => (StatusCode::OK, Json(json!(["a.png", "b.png"]))),
            Some("weird") => (StatusCode::OK, Json(json!({"unexpected": true}))),
            Some("broken") => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({}))),
            _ => (StatusCode::OK, Json(json!({"error": "unknown category"}))),
        }
    }

    async fn upload_url(State(addr): State<SocketAddr>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
        let name = body["fileName"].as_str().unwrap_or_default().to_string();
        if name.starts_with("nourl") {
            return (StatusCode::FORBIDDEN, Json(json!({"message": "denied"})));
        }
        if name.starts_with("keyed") {
            return (StatusCode::OK, Json(json!({"uploadUrl": format!("http://{addr}/bucket/{name}"), "key": format!("designs/{name}")})));
        }
        (StatusCode::OK, Json(json!({"uploadUrl": format!("http://{addr}/bucket/{name}")})))
    }

    async fn store(State(rec): State<Recorded>, Path(name): Path<String>, body: Bytes) -> StatusCode {
        if name.starts_with("reject") {
            return StatusCode::FORBIDDEN;
        }
        rec.stored.lock().insert(name, body.to_vec());
        StatusCode::OK
    }

    async fn generate(State(rec): State<Recorded>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
        rec.generate_bodies.lock().push(body.clone());
        if body["category"] == "broken" {
            return (StatusCode::BAD_GATEWAY, Json(json!({})));
        }
        (StatusCode::OK, Json(json!({"mockups": [
            {"id": 1, "templateName": body["templates"][0], "designName": body["designs"][0], "mockupKey": "k1.png"}
        ]})))
    }

    pub async fn spawn() -> (String, Recorded) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let recorded = Recorded::default();

        let app = Router::new()
            .route("/get_thumbs", get(thumbs))
            .merge(Router::new().route("/get-upload-url", post(upload_url)).with_state(addr))
            .merge(
                Router::new()
                    .route("/bucket/:name", put(store))
                    .route("/generate_mockups", post(generate))
                    .with_state(recorded.clone()),
            );
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        (format!("http://{addr}"), recorded)
    }
}
