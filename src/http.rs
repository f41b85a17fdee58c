//! Shared HTTP plumbing for the catalog service

use crate::config::MonitorConfig;
use crate::error::{Result, SyncError};
use reqwest::{Client, RequestBuilder};

/// Build the HTTP client used for reservations and catalog listings
pub fn build_client(config: &MonitorConfig) -> Result<Client> {
    Client::builder()
        .timeout(config.request_timeout)
        .build()
        .map_err(|e| SyncError::config(format!("Failed to create HTTP client: {}", e)))
}

/// Attach the catalog service headers to a request
pub fn with_service_headers(mut request: RequestBuilder, config: &MonitorConfig) -> RequestBuilder {
    for (name, value) in config.request_headers() {
        request = request.header(name, value);
    }
    request
}

/// Fail on non-success responses, keeping the endpoint in the error
pub fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(SyncError::HttpStatus {
            endpoint: response.url().to_string(),
            status: status.as_u16(),
        })
    }
}
