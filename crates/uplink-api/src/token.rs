// Token exchange client
//
// One GET against the credential-issuance endpoint. The device identity
// travels as `X-Midt-*` request headers; the response body, whatever the
// status, is the bearer token verbatim. Redirects are never followed.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use secrecy::SecretString;
use tracing::{debug, error};
use url::Url;
use uuid::Uuid;

use crate::error::Error;
use crate::transport::TransportConfig;

// ── Header names ─────────────────────────────────────────────────────

pub const MAC_ADDRESS_HEADER: &str = "x-midt-mac-address";
pub const SERIAL_NUMBER_HEADER: &str = "x-midt-serial-number";
pub const UUID_HEADER: &str = "x-midt-uuid";
pub const PARTNER_ID_HEADER: &str = "x-midt-partner-id";
pub const HARDWARE_MODEL_HEADER: &str = "x-midt-hardware-model";
pub const HARDWARE_MANUFACTURER_HEADER: &str = "x-midt-hardware-manufacturer";
pub const FIRMWARE_NAME_HEADER: &str = "x-midt-firmware-name";
pub const PROTOCOL_HEADER: &str = "x-midt-protocol";
pub const INTERFACE_USED_HEADER: &str = "x-midt-interface-used";
pub const LAST_REBOOT_REASON_HEADER: &str = "x-midt-last-reboot-reason";

// ── TokenRequest ─────────────────────────────────────────────────────

/// Device attributes sent as request metadata.
///
/// Every field becomes a header, empty or not.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenRequest {
    /// Canonical MAC address; sent as `mac:<mac>`.
    pub mac_address: String,
    pub serial_number: String,
    pub partner_id: String,
    pub hardware_model: String,
    pub hardware_manufacturer: String,
    pub firmware_name: String,
    pub protocol: String,
    pub interface_used: String,
    pub last_reboot_reason: String,
}

impl TokenRequest {
    /// Build the header set for one request. A fresh UUID is minted on
    /// every call.
    fn headers(&self) -> Result<HeaderMap, Error> {
        let request_id = Uuid::new_v4().to_string();
        let mac = format!("mac:{}", self.mac_address);

        let pairs: [(&'static str, &str); 10] = [
            (MAC_ADDRESS_HEADER, &mac),
            (SERIAL_NUMBER_HEADER, &self.serial_number),
            (UUID_HEADER, &request_id),
            (PARTNER_ID_HEADER, &self.partner_id),
            (HARDWARE_MODEL_HEADER, &self.hardware_model),
            (HARDWARE_MANUFACTURER_HEADER, &self.hardware_manufacturer),
            (FIRMWARE_NAME_HEADER, &self.firmware_name),
            (PROTOCOL_HEADER, &self.protocol),
            (INTERFACE_USED_HEADER, &self.interface_used),
            (LAST_REBOOT_REASON_HEADER, &self.last_reboot_reason),
        ];

        let mut headers = HeaderMap::with_capacity(pairs.len());
        for (name, value) in pairs {
            let value = HeaderValue::from_str(value).map_err(|_| Error::InvalidHeader { name })?;
            headers.insert(HeaderName::from_static(name), value);
        }
        Ok(headers)
    }
}

// ── TokenClient ──────────────────────────────────────────────────────

/// HTTP client for the credential-issuance endpoint.
pub struct TokenClient {
    http: reqwest::Client,
    url: Url,
}

impl TokenClient {
    /// Create a token client from a `TransportConfig`. Redirects are
    /// never followed.
    pub fn new(url: &str, transport: &TransportConfig) -> Result<Self, Error> {
        let url = Url::parse(url)?;
        Ok(Self {
            http: transport.build_client()?,
            url,
        })
    }

    /// Perform the exchange and return the response body as the token.
    pub async fn fetch(&self, request: &TokenRequest) -> Result<SecretString, Error> {
        let headers = request.headers()?;

        debug!(url = %self.url, "requesting bearer token");
        let response = self
            .http
            .get(self.url.clone())
            .headers(headers)
            .send()
            .await
            .map_err(|e| {
                error!(url = %self.url, error = %e, "failed to get token");
                Error::Transport(e)
            })?;

        let status = response.status();
        if status.is_redirection() {
            debug!(status = status.as_u16(), "token endpoint redirected; using response as final");
        }

        let body = response.bytes().await.map_err(|source| {
            error!(status = status.as_u16(), error = %source, "failed to read token response");
            Error::TokenBody {
                status: status.as_u16(),
                source,
            }
        })?;

        debug!(status = status.as_u16(), len = body.len(), "token response received");
        Ok(SecretString::from(String::from_utf8_lossy(&body).into_owned()))
    }
}
