use reqwest::{
    Client,
    header::{HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION},
    Method, StatusCode,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

use shared_config::AppConfig;
use shared_models::error::AppError;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    /// PostgREST answers 409 when a unique or exclusion constraint rejects a write.
    #[error("Constraint conflict: {0}")]
    Conflict(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid request header: {0}")]
    Header(String),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

impl From<DatabaseError> for AppError {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::Auth(msg) => AppError::Auth(msg),
            DatabaseError::NotFound(msg) => AppError::NotFound(msg),
            DatabaseError::Conflict(msg) => AppError::Conflict(msg),
            other => AppError::Database(other.to_string()),
        }
    }
}

pub type DbResult<T> = std::result::Result<T, DatabaseError>;

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            anon_key: config.supabase_anon_key.clone(),
        }
    }

    fn get_headers(&self, auth_token: Option<&str>) -> DbResult<HeaderMap> {
        let mut headers = HeaderMap::new();

        headers.insert(
            "apikey",
            HeaderValue::from_str(&self.anon_key)
                .map_err(|e| DatabaseError::Header(e.to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = auth_token {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|e| DatabaseError::Header(e.to_string()))?,
            );
        }

        Ok(headers)
    }

    pub async fn request<T>(&self, method: Method, path: &str,
                            auth_token: Option<&str>, body: Option<Value>)
                            -> DbResult<T>
    where T: DeserializeOwned {
        self.request_with_headers(method, path, auth_token, body, None).await
    }

    pub async fn request_with_headers<T>(&self, method: Method, path: &str,
                                         auth_token: Option<&str>, body: Option<Value>,
                                         extra_headers: Option<HeaderMap>)
                                         -> DbResult<T>
    where T: DeserializeOwned {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making {} request to {}", method, url);

        let mut headers = self.get_headers(auth_token)?;
        if let Some(extra) = extra_headers {
            headers.extend(extra);
        }

        let mut req = self.client.request(method, &url)
            .headers(headers);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            error!("API error ({}): {}", status, error_text);

            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => DatabaseError::Auth(error_text),
                StatusCode::NOT_FOUND => DatabaseError::NotFound(error_text),
                StatusCode::CONFLICT => DatabaseError::Conflict(error_text),
                _ => DatabaseError::Api { status: status.as_u16(), message: error_text },
            });
        }

        let text = response.text().await?;
        // Writes without a representation come back with an empty body.
        let data = if text.trim().is_empty() {
            serde_json::from_value(Value::Array(Vec::new()))?
        } else {
            serde_json::from_str::<T>(&text)?
        };
        Ok(data)
    }

    /// `Prefer: return=representation`, so writes echo the affected rows.
    pub fn representation_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));
        headers
    }

    /// GET rows from a table path such as `/rest/v1/schedules?doctor_id=eq.X`.
    pub async fn select<T>(&self, path: &str, auth_token: &str) -> DbResult<Vec<T>>
    where T: DeserializeOwned {
        self.request(Method::GET, path, Some(auth_token), None).await
    }

    /// GET at most one row; `None` when the filter matched nothing.
    pub async fn select_one<T>(&self, path: &str, auth_token: &str) -> DbResult<Option<T>>
    where T: DeserializeOwned {
        let rows: Vec<T> = self.select(path, auth_token).await?;
        Ok(rows.into_iter().next())
    }

    /// INSERT and return the created rows.
    pub async fn insert<T>(&self, table_path: &str, body: Value, auth_token: &str) -> DbResult<Vec<T>>
    where T: DeserializeOwned {
        self.request_with_headers(
            Method::POST,
            table_path,
            Some(auth_token),
            Some(body),
            Some(Self::representation_headers()),
        ).await
    }

    /// PATCH every row matched by the filter in `path` and return those rows.
    /// An empty result means the filter matched nothing, which conditional
    /// writes use to detect a lost race.
    pub async fn update<T>(&self, path: &str, body: Value, auth_token: &str) -> DbResult<Vec<T>>
    where T: DeserializeOwned {
        self.request_with_headers(
            Method::PATCH,
            path,
            Some(auth_token),
            Some(body),
            Some(Self::representation_headers()),
        ).await
    }

    pub fn get_base_url(&self) -> &str {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> SupabaseClient {
        SupabaseClient::new(&AppConfig {
            supabase_url: server.uri(),
            supabase_anon_key: "test-anon-key".to_string(),
            supabase_jwt_secret: "secret".to_string(),
            clinic_utc_offset_minutes: 0,
            cancellation_lead_minutes: 120,
            server_port: 3000,
        })
    }

    #[tokio::test]
    async fn test_select_sends_auth_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/doctors"))
            .and(query_param("id", "eq.abc"))
            .and(header("apikey", "test-anon-key"))
            .and(header("authorization", "Bearer token-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": "abc" }])))
            .mount(&server)
            .await;

        let rows: Vec<Value> = client_for(&server)
            .select("/rest/v1/doctors?id=eq.abc", "token-1")
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], "abc");
    }

    #[tokio::test]
    async fn test_conflict_status_maps_to_conflict() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/appointments"))
            .and(header("prefer", "return=representation"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "code": "23505",
                "message": "duplicate key value violates unique constraint"
            })))
            .mount(&server)
            .await;

        let result: DbResult<Vec<Value>> = client_for(&server)
            .insert("/rest/v1/appointments", json!({ "seat": 0 }), "token")
            .await;
        assert_matches!(result, Err(DatabaseError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_server_error_maps_to_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/schedules"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let result: DbResult<Vec<Value>> = client_for(&server)
            .select("/rest/v1/schedules", "token")
            .await;
        assert_matches!(result, Err(DatabaseError::Api { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_select_one_empty_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/patients"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let row: Option<Value> = client_for(&server)
            .select_one("/rest/v1/patients?id=eq.x", "token")
            .await
            .unwrap();
        assert!(row.is_none());
    }
}
