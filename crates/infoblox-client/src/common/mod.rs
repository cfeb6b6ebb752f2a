//! Common utilities for the Infoblox WAPI client
//!
//! Provides the authenticated HTTP wrapper shared by every object endpoint.

use crate::error::InfobloxError;
use crate::models::WapiErrorBody;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tracing::debug;

/// HTTP client wrapper with basic authentication
#[derive(Debug)]
pub struct HttpClient {
    client: Client,
    base_url: String,
    username: String,
    password: String,
}

impl HttpClient {
    /// Create a new HTTP client wrapper
    pub fn new(client: Client, base_url: String, username: String, password: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            username,
            password,
        }
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build a full URL from an object path or reference
    pub fn build_url(&self, path: &str) -> String {
        if path.starts_with("http") {
            path.to_string()
        } else {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        }
    }

    /// Build query string from filters
    pub fn build_query_string(&self, filters: &[(&str, &str)]) -> String {
        filters
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Append a query string to an object path
    pub fn with_query(&self, path: &str, filters: &[(&str, &str)]) -> String {
        if filters.is_empty() {
            path.to_string()
        } else {
            format!("{}?{}", path, self.build_query_string(filters))
        }
    }

    /// Make a GET request
    pub async fn get<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T, InfobloxError> {
        let url = self.build_url(path);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.username, Some(&self.password))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(InfobloxError::Http)?;

        let response = Self::check(response, "GET", path).await?;
        response.json().await.map_err(InfobloxError::Http)
    }

    /// Make a POST request
    pub async fn post<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, InfobloxError> {
        let url = self.build_url(path);
        debug!("POST {} with body: {}", url, body);

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.username, Some(&self.password))
            .header("Accept", "application/json")
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(InfobloxError::Http)?;

        let response = Self::check(response, "POST", path).await?;
        response.json().await.map_err(InfobloxError::Http)
    }

    /// Make a DELETE request against an object reference
    pub async fn delete(&self, reference: &str) -> Result<(), InfobloxError> {
        let url = self.build_url(reference);
        debug!("DELETE {}", url);

        let response = self
            .client
            .delete(&url)
            .basic_auth(&self.username, Some(&self.password))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(InfobloxError::Http)?;

        Self::check(response, "DELETE", reference).await?;
        Ok(())
    }

    /// Map non-success statuses onto `InfobloxError`, decoding the WAPI error body when present
    async fn check(response: Response, method: &str, path: &str) -> Result<Response, InfobloxError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<WapiErrorBody>(&body)
            .map(|e| format!("{} {}", e.code, e.text))
            .unwrap_or(body);

        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => InfobloxError::Authentication(
                format!("{} {} failed: {} - {}", method, path, status, message),
            ),
            StatusCode::NOT_FOUND => {
                InfobloxError::NotFound(format!("{} - {}", path, message))
            }
            StatusCode::BAD_REQUEST => InfobloxError::InvalidRequest(format!(
                "{} {} failed: {}",
                method, path, message
            )),
            _ => InfobloxError::Api(format!("{} {} failed: {} - {}", method, path, status, message)),
        })
    }
}
