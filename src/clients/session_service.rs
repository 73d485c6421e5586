// Client for the session service: read-only round/phase metadata used for
// display purposes. The hub never mutates session state.

use std::sync::Arc;

use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use crate::models::RoundInfo;

static SESSION_SERVICE_CLIENT: OnceCell<Arc<SessionServiceClient>> = OnceCell::const_new();

#[derive(Debug)]
pub struct SessionServiceClient {
    client: Client,
    base_url: String,
    jwt_secret: String,
    service_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    #[serde(rename = "type")]
    type_: String,
    exp: usize,
}

impl SessionServiceClient {
    pub fn new(base_url: String, jwt_secret: String, service_name: String) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("Failed to build reqwest client");

        Self { client, base_url, jwt_secret, service_name }
    }

    fn generate_token(&self) -> String {
        let expiration = Utc::now()
            .checked_add_signed(Duration::seconds(60)) // 1 minute expiration
            .expect("valid timestamp")
            .timestamp();

        let claims = Claims {
            sub: self.service_name.clone(),
            type_: "service".to_string(),
            exp: expiration as usize,
        };

        encode(&Header::default(), &claims, &EncodingKey::from_secret(self.jwt_secret.as_bytes()))
            .expect("Failed to generate JWT")
    }

    /// Current round metadata for a session; None when the session has no
    /// active round.
    pub async fn current_round(&self, session_id: i64) -> Result<Option<RoundInfo>, reqwest::Error> {
        let token = self.generate_token();
        let url = format!("{}/sessions/{}/round", self.base_url, session_id);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", token))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(response.error_for_status()?.json().await?))
    }
}

/// Initialize the global SessionServiceClient
pub fn init_session_service_client(
    base_url: String,
    jwt_secret: String,
    service_name: String,
) -> Result<(), &'static str> {
    let client = SessionServiceClient::new(base_url, jwt_secret, service_name);
    SESSION_SERVICE_CLIENT
        .set(Arc::new(client))
        .map_err(|_| "SessionServiceClient already initialized")
}

/// Get the global SessionServiceClient instance
pub fn get_session_service_client() -> Option<Arc<SessionServiceClient>> {
    SESSION_SERVICE_CLIENT.get().cloned()
}
