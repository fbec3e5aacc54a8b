//! QuickBooks Online API client
//!
//! Covers the three provider surfaces the service needs: the OAuth
//! authorization URL, the token endpoint (code exchange and refresh),
//! and the company query API used to fetch customers.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, warn};
use url::Url;

use crate::config::AppConfig;
use crate::error::ApiError;

/// OAuth scope required for the accounting query API.
pub const ACCOUNTING_SCOPE: &str = "com.intuit.quickbooks.accounting";

/// Query issued against the company data service.
const CUSTOMER_QUERY: &str = "SELECT * FROM Customer MAXRESULTS 100";

/// QuickBooks client specific errors
#[derive(Debug, Error)]
pub enum QboError {
    #[error("QuickBooks {operation} timed out")]
    Timeout { operation: &'static str },

    #[error("QuickBooks request failed: {0}")]
    Network(reqwest::Error),

    #[error("QuickBooks returned status {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("QuickBooks response could not be parsed: {0}")]
    InvalidResponse(String),

    #[error("QuickBooks integration is not configured: {0}")]
    NotConfigured(&'static str),

    #[error("URL construction failed: {0}")]
    Url(#[from] url::ParseError),
}

impl QboError {
    fn from_request(operation: &'static str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            warn!(operation, "QuickBooks call exceeded the request timeout");
            QboError::Timeout { operation }
        } else {
            QboError::Network(err)
        }
    }
}

impl From<QboError> for ApiError {
    fn from(err: QboError) -> Self {
        match err {
            QboError::Timeout { operation } => crate::error::upstream_timeout(operation),
            QboError::Provider { status, body } => crate::error::upstream_error(status, Some(body)),
            QboError::Network(source) => {
                error!(error = %source, "QuickBooks request failed");
                crate::error::upstream_error(0, Some(source.to_string()))
            }
            QboError::InvalidResponse(message) => {
                error!(%message, "QuickBooks returned an unusable response");
                crate::error::upstream_error(0, Some(message))
            }
            QboError::NotConfigured(what) => crate::error::configuration_error(&format!(
                "QuickBooks {} is not configured",
                what
            )),
            QboError::Url(source) => {
                error!(error = %source, "Failed to build QuickBooks URL");
                ApiError::new(
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "Failed to build provider URL",
                )
            }
        }
    }
}

/// Successful token grant with the expiry resolved to an absolute instant.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Raw token endpoint response body.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    #[serde(default)]
    #[allow(dead_code)]
    x_refresh_token_expires_in: Option<i64>,
}

/// Customer record as returned by the query API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QboCustomer {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "DisplayName", default)]
    pub display_name: Option<String>,
    #[serde(rename = "CompanyName", default)]
    pub company_name: Option<String>,
    #[serde(rename = "GivenName", default)]
    pub given_name: Option<String>,
    #[serde(rename = "FamilyName", default)]
    pub family_name: Option<String>,
    #[serde(rename = "PrimaryEmailAddr", default)]
    pub primary_email_addr: Option<QboEmailAddress>,
    #[serde(rename = "PrimaryPhone", default)]
    pub primary_phone: Option<QboPhoneNumber>,
    #[serde(rename = "BillAddr", default)]
    pub bill_addr: Option<QboPhysicalAddress>,
    #[serde(rename = "Active", default)]
    pub active: Option<bool>,
    #[serde(rename = "Balance", default)]
    pub balance: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QboEmailAddress {
    #[serde(rename = "Address", default)]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QboPhoneNumber {
    #[serde(rename = "FreeFormNumber", default)]
    pub free_form_number: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QboPhysicalAddress {
    #[serde(rename = "Line1", default)]
    pub line1: Option<String>,
    #[serde(rename = "City", default)]
    pub city: Option<String>,
    #[serde(rename = "CountrySubDivisionCode", default)]
    pub country_sub_division_code: Option<String>,
    #[serde(rename = "PostalCode", default)]
    pub postal_code: Option<String>,
    #[serde(rename = "Country", default)]
    pub country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CustomerQueryBody {
    #[serde(rename = "QueryResponse", default)]
    query_response: Option<CustomerQueryResponse>,
}

#[derive(Debug, Default, Deserialize)]
struct CustomerQueryResponse {
    #[serde(rename = "Customer", default)]
    customer: Vec<QboCustomer>,
}

/// HTTP client for the QuickBooks OAuth and query APIs.
#[derive(Debug, Clone)]
pub struct QboClient {
    http: reqwest::Client,
    client_id: Option<String>,
    client_secret: Option<String>,
    redirect_uri: Option<String>,
    auth_base_url: String,
    token_url: String,
    api_base_url: String,
}

impl QboClient {
    /// Build a client from the application configuration.
    ///
    /// Credentials may be absent in local profiles; calls that need them
    /// fail with [`QboError::NotConfigured`] at the point of use.
    pub fn from_config(config: &AppConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_seconds))
            .build()?;

        Ok(Self {
            http,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
            auth_base_url: config.auth_base_url.clone(),
            token_url: config.token_url.clone(),
            api_base_url: config.qbo_api_base(),
        })
    }

    fn client_id(&self) -> Result<&str, QboError> {
        self.client_id
            .as_deref()
            .ok_or(QboError::NotConfigured("client ID"))
    }

    fn client_secret(&self) -> Result<&str, QboError> {
        self.client_secret
            .as_deref()
            .ok_or(QboError::NotConfigured("client secret"))
    }

    fn redirect_uri(&self) -> Result<&str, QboError> {
        self.redirect_uri
            .as_deref()
            .ok_or(QboError::NotConfigured("redirect URI"))
    }

    /// Build the authorization URL the user is redirected to.
    pub fn authorize_url(&self, state: &str) -> Result<Url, QboError> {
        let mut url = Url::parse(&self.auth_base_url)?;
        url.query_pairs_mut()
            .append_pair("client_id", self.client_id()?)
            .append_pair("scope", ACCOUNTING_SCOPE)
            .append_pair("redirect_uri", self.redirect_uri()?)
            .append_pair("response_type", "code")
            .append_pair("state", state);
        Ok(url)
    }

    /// Exchange an authorization code for a token grant.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenGrant, QboError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri()?),
        ];
        self.request_token("code exchange", &params).await
    }

    /// Trade a refresh token for a fresh grant. QuickBooks rotates the
    /// refresh token on every call, so the returned grant must be persisted.
    pub async fn refresh_tokens(&self, refresh_token: &str) -> Result<TokenGrant, QboError> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        self.request_token("token refresh", &params).await
    }

    async fn request_token(
        &self,
        operation: &'static str,
        params: &[(&str, &str)],
    ) -> Result<TokenGrant, QboError> {
        let client_id = self.client_id()?.to_string();
        let client_secret = self.client_secret()?.to_string();

        let requested_at = Utc::now();
        let response = self
            .http
            .post(&self.token_url)
            .basic_auth(&client_id, Some(&client_secret))
            .header("Accept", "application/json")
            .form(params)
            .send()
            .await
            .map_err(|e| QboError::from_request(operation, e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            warn!(operation, status, "QuickBooks token endpoint rejected request");
            return Err(QboError::Provider { status, body });
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| QboError::InvalidResponse(e.to_string()))?;

        if token.access_token.is_empty() {
            return Err(QboError::InvalidResponse(
                "token response contained an empty access token".to_string(),
            ));
        }

        debug!(operation, expires_in = token.expires_in, "Received token grant");

        Ok(TokenGrant {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at: requested_at + chrono::Duration::seconds(token.expires_in),
        })
    }

    /// Fetch up to 100 customers for the given company realm.
    pub async fn query_customers(
        &self,
        realm_id: &str,
        access_token: &str,
    ) -> Result<Vec<QboCustomer>, QboError> {
        let mut url = Url::parse(&format!(
            "{}/v3/company/{}/query",
            self.api_base_url, realm_id
        ))?;
        url.query_pairs_mut().append_pair("query", CUSTOMER_QUERY);

        let response = self
            .http
            .get(url)
            .header("Authorization", format!("Bearer {}", access_token))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| QboError::from_request("customer query", e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            warn!(status, realm_id, "QuickBooks customer query failed");
            return Err(QboError::Provider { status, body });
        }

        let body: CustomerQueryBody = response
            .json()
            .await
            .map_err(|e| QboError::InvalidResponse(e.to_string()))?;

        // An empty QueryResponse (no Customer key) means the company has no customers.
        Ok(body.query_response.unwrap_or_default().customer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(token_url: String, api_base_url: String) -> QboClient {
        QboClient {
            http: reqwest::Client::builder()
                .timeout(Duration::from_millis(500))
                .build()
                .unwrap(),
            client_id: Some("test-client-id".to_string()),
            client_secret: Some("test-client-secret".to_string()),
            redirect_uri: Some("https://app.example.com/qbo/oauth/callback".to_string()),
            auth_base_url: "https://appcenter.intuit.com/connect/oauth2".to_string(),
            token_url,
            api_base_url,
        }
    }

    fn unconfigured_client() -> QboClient {
        QboClient {
            http: reqwest::Client::new(),
            client_id: None,
            client_secret: None,
            redirect_uri: None,
            auth_base_url: "https://appcenter.intuit.com/connect/oauth2".to_string(),
            token_url: "https://oauth.platform.intuit.com/oauth2/v1/tokens/bearer".to_string(),
            api_base_url: "https://sandbox-quickbooks.api.intuit.com".to_string(),
        }
    }

    #[test]
    fn authorize_url_includes_required_params() {
        let client = test_client(
            "https://oauth.platform.intuit.com/oauth2/v1/tokens/bearer".to_string(),
            "https://sandbox-quickbooks.api.intuit.com".to_string(),
        );

        let url = client.authorize_url("state-123").unwrap();

        assert_eq!(url.host_str().unwrap(), "appcenter.intuit.com");
        assert_eq!(url.path(), "/connect/oauth2");

        let query_pairs: std::collections::HashMap<_, _> = url.query_pairs().collect();
        assert_eq!(query_pairs.get("client_id").unwrap(), "test-client-id");
        assert_eq!(query_pairs.get("scope").unwrap(), ACCOUNTING_SCOPE);
        assert_eq!(
            query_pairs.get("redirect_uri").unwrap(),
            "https://app.example.com/qbo/oauth/callback"
        );
        assert_eq!(query_pairs.get("response_type").unwrap(), "code");
        assert_eq!(query_pairs.get("state").unwrap(), "state-123");
    }

    #[test]
    fn authorize_url_without_credentials_is_not_configured() {
        let client = unconfigured_client();

        let err = client.authorize_url("state").unwrap_err();
        assert!(matches!(err, QboError::NotConfigured("client ID")));
    }

    #[tokio::test]
    async fn exchange_code_posts_basic_auth_form() {
        let mock_server = MockServer::start().await;

        // Basic base64("test-client-id:test-client-secret")
        Mock::given(method("POST"))
            .and(path("/oauth2/v1/tokens/bearer"))
            .and(header(
                "authorization",
                "Basic dGVzdC1jbGllbnQtaWQ6dGVzdC1jbGllbnQtc2VjcmV0",
            ))
            .and(header("accept", "application/json"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=auth-code-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "new-access",
                "refresh_token": "new-refresh",
                "token_type": "bearer",
                "expires_in": 3600,
                "x_refresh_token_expires_in": 8726400
            })))
            .mount(&mock_server)
            .await;

        let client = test_client(
            format!("{}/oauth2/v1/tokens/bearer", mock_server.uri()),
            mock_server.uri(),
        );

        let before = Utc::now();
        let grant = client.exchange_code("auth-code-1").await.unwrap();

        assert_eq!(grant.access_token, "new-access");
        assert_eq!(grant.refresh_token, "new-refresh");
        // expires_at should land roughly an hour from now
        let delta = grant.expires_at - before;
        assert!(delta.num_seconds() >= 3595 && delta.num_seconds() <= 3605);
    }

    #[tokio::test]
    async fn refresh_tokens_sends_refresh_grant() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/oauth2/v1/tokens/bearer"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=old-refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "rotated-access",
                "refresh_token": "rotated-refresh",
                "expires_in": 3600
            })))
            .mount(&mock_server)
            .await;

        let client = test_client(
            format!("{}/oauth2/v1/tokens/bearer", mock_server.uri()),
            mock_server.uri(),
        );

        let grant = client.refresh_tokens("old-refresh").await.unwrap();
        assert_eq!(grant.access_token, "rotated-access");
        assert_eq!(grant.refresh_token, "rotated-refresh");
    }

    #[tokio::test]
    async fn token_error_surfaces_provider_status_and_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/oauth2/v1/tokens/bearer"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(serde_json::json!({"error": "invalid_grant"})),
            )
            .mount(&mock_server)
            .await;

        let client = test_client(
            format!("{}/oauth2/v1/tokens/bearer", mock_server.uri()),
            mock_server.uri(),
        );

        let err = client.refresh_tokens("stale").await.unwrap_err();
        match err {
            QboError::Provider { status, body } => {
                assert_eq!(status, 400);
                assert!(body.contains("invalid_grant"));
            }
            other => panic!("expected Provider error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn slow_token_endpoint_maps_to_timeout() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/oauth2/v1/tokens/bearer"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(5))
                    .set_body_json(serde_json::json!({
                        "access_token": "late",
                        "refresh_token": "late",
                        "expires_in": 3600
                    })),
            )
            .mount(&mock_server)
            .await;

        let client = test_client(
            format!("{}/oauth2/v1/tokens/bearer", mock_server.uri()),
            mock_server.uri(),
        );

        let err = client.refresh_tokens("any").await.unwrap_err();
        assert!(matches!(
            err,
            QboError::Timeout {
                operation: "token refresh"
            }
        ));
    }

    #[tokio::test]
    async fn query_customers_parses_query_response() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v3/company/realm-42/query"))
            .and(query_param("query", CUSTOMER_QUERY))
            .and(header("authorization", "Bearer access-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "QueryResponse": {
                    "Customer": [
                        {
                            "Id": "1",
                            "DisplayName": "Acme Corp",
                            "CompanyName": "Acme Corporation",
                            "PrimaryEmailAddr": {"Address": "billing@acme.test"},
                            "PrimaryPhone": {"FreeFormNumber": "+1 555 0100"},
                            "BillAddr": {
                                "Line1": "1 Infinite Loop",
                                "City": "Cupertino",
                                "CountrySubDivisionCode": "CA",
                                "PostalCode": "95014",
                                "Country": "US"
                            },
                            "Active": true,
                            "Balance": 125.5
                        },
                        {"Id": "2", "Active": false}
                    ],
                    "startPosition": 1,
                    "maxResults": 2
                },
                "time": "2026-07-10T12:00:00.000-07:00"
            })))
            .mount(&mock_server)
            .await;

        let client = test_client(
            format!("{}/oauth2/v1/tokens/bearer", mock_server.uri()),
            mock_server.uri(),
        );

        let customers = client
            .query_customers("realm-42", "access-token")
            .await
            .unwrap();

        assert_eq!(customers.len(), 2);
        assert_eq!(customers[0].id, "1");
        assert_eq!(customers[0].display_name.as_deref(), Some("Acme Corp"));
        assert_eq!(
            customers[0]
                .primary_email_addr
                .as_ref()
                .and_then(|e| e.address.as_deref()),
            Some("billing@acme.test")
        );
        assert_eq!(customers[0].balance, Some(125.5));
        assert_eq!(customers[1].id, "2");
        assert_eq!(customers[1].active, Some(false));
        assert_eq!(customers[1].display_name, None);
    }

    #[tokio::test]
    async fn query_customers_handles_empty_query_response() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v3/company/empty/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "QueryResponse": {},
                "time": "2026-07-10T12:00:00.000-07:00"
            })))
            .mount(&mock_server)
            .await;

        let client = test_client(
            format!("{}/oauth2/v1/tokens/bearer", mock_server.uri()),
            mock_server.uri(),
        );

        let customers = client.query_customers("empty", "token").await.unwrap();
        assert!(customers.is_empty());
    }

    #[tokio::test]
    async fn query_customers_maps_401_to_provider_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v3/company/realm/query"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
            .mount(&mock_server)
            .await;

        let client = test_client(
            format!("{}/oauth2/v1/tokens/bearer", mock_server.uri()),
            mock_server.uri(),
        );

        let err = client.query_customers("realm", "expired").await.unwrap_err();
        assert!(matches!(err, QboError::Provider { status: 401, .. }));
    }
}
