//! Outbound request to a provider

use tracing::{debug, info};

use crate::error::Result;
use crate::header::AuthorizationHeader;

/// Outcome of an authorized request to a provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderResponse {
    /// HTTP 200 with the unmodified response body
    Success(Vec<u8>),
    /// HTTP 403
    Forbidden,
    /// Any other status
    Failed(u16),
}

impl ProviderResponse {
    pub fn is_success(&self) -> bool {
        matches!(self, ProviderResponse::Success(_))
    }
}

/// Send `GET url` with the role token header attached
///
/// Transport failures surface as `ExchangeError::Unavailable`.
pub async fn send_authorized(
    http: &reqwest::Client,
    url: &str,
    header: &AuthorizationHeader,
) -> Result<ProviderResponse> {
    debug!(url = %url, header = %header.name, "Sending authorized request");

    let response = http
        .get(url)
        .header(header.name.as_str(), header.value.as_str())
        .send()
        .await?;

    let status = response.status();
    match status {
        reqwest::StatusCode::OK => {
            let body = response.bytes().await?;
            Ok(ProviderResponse::Success(body.to_vec()))
        }
        reqwest::StatusCode::FORBIDDEN => {
            info!(url = %url, "Provider rejected role token");
            Ok(ProviderResponse::Forbidden)
        }
        other => {
            info!(url = %url, status = other.as_u16(), "Provider request failed");
            Ok(ProviderResponse::Failed(other.as_u16()))
        }
    }
}
