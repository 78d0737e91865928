// src/storage/pinata.rs
//! Pinata pinning client.
//!
//! Implements [`ContentUploader`] against Pinata's HTTP pinning
//! endpoint: a multipart POST to `/pinning/pinFileToIPFS` with the
//! provider credentials in request headers. A 2xx response carries the
//! content hash, returned as an `ipfs://` URI; a non-2xx response
//! carries a structured error message which is surfaced verbatim.

use crate::error::UploadError;
use crate::storage::content_uploader::ContentUploader;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;

const PIN_FILE_PATH: &str = "/pinning/pinFileToIPFS";
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Successful pin response body.
#[derive(Deserialize)]
struct PinResponse {
    #[serde(rename = "IpfsHash")]
    ipfs_hash: String,
}

/// Error response body, e.g. `{"error": {"message": "..."}}`.
#[derive(Deserialize)]
struct PinErrorBody {
    error: Option<PinErrorDetail>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PinErrorDetail {
    Structured { message: String },
    Plain(String),
}

/// Pinata-backed content uploader.
pub struct PinataUploader {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    secret_key: String,
}

impl PinataUploader {
    /// Creates an uploader against the given API base
    /// (`https://api.pinata.cloud` in production).
    pub fn new(api_base: &str, api_key: &str, secret_key: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(UPLOAD_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        PinataUploader {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            secret_key: secret_key.to_string(),
        }
    }

    fn classify(err: reqwest::Error) -> UploadError {
        if err.is_timeout() || err.is_connect() {
            UploadError::Timeout
        } else {
            UploadError::Rejected(err.to_string())
        }
    }

    async fn rejection_message(response: reqwest::Response) -> String {
        let status = response.status();
        let message = match response.json::<PinErrorBody>().await {
            Ok(PinErrorBody {
                error: Some(PinErrorDetail::Structured { message }),
            }) => message,
            Ok(PinErrorBody {
                error: Some(PinErrorDetail::Plain(message)),
            }) => message,
            _ => "no error detail".to_string(),
        };
        format!("{}: {}", status, message)
    }
}

#[async_trait]
impl ContentUploader for PinataUploader {
    async fn upload(&self, bytes: &[u8], mime_hint: &str) -> Result<String, UploadError> {
        let part = Part::bytes(bytes.to_vec())
            .file_name("credential.pdf")
            .mime_str(mime_hint)
            .map_err(|e| UploadError::Rejected(format!("invalid mime type: {}", e)))?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(format!("{}{}", self.api_base, PIN_FILE_PATH))
            .header("pinata_api_key", &self.api_key)
            .header("pinata_secret_api_key", &self.secret_key)
            .multipart(form)
            .send()
            .await
            .map_err(Self::classify)?;

        if !response.status().is_success() {
            return Err(UploadError::Rejected(
                Self::rejection_message(response).await,
            ));
        }

        let pinned: PinResponse = response
            .json()
            .await
            .map_err(|e| UploadError::Rejected(format!("malformed pin response: {}", e)))?;

        Ok(format!("ipfs://{}", pinned.ipfs_hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Each test keys its mock to a distinct credential pair so the
    // shared mock server cannot match requests across tests.
    fn uploader(key: &str) -> PinataUploader {
        PinataUploader::new(&mockito::server_url(), key, "test-secret")
    }

    #[tokio::test]
    async fn upload_returns_ipfs_uri_on_success() {
        let _m = mockito::mock("POST", "/pinning/pinFileToIPFS")
            .match_header("pinata_api_key", "key-ok")
            .with_status(200)
            .with_body(r#"{"IpfsHash":"QmTestHash","PinSize":10,"Timestamp":"2026-01-01T00:00:00Z"}"#)
            .create();

        let cid = uploader("key-ok")
            .upload(b"%PDF-1.4 stub", "application/pdf")
            .await
            .unwrap();
        assert_eq!(cid, "ipfs://QmTestHash");
    }

    #[tokio::test]
    async fn non_2xx_is_a_rejection_with_provider_message() {
        let _m = mockito::mock("POST", "/pinning/pinFileToIPFS")
            .match_header("pinata_api_key", "key-denied")
            .with_status(401)
            .with_body(r#"{"error":{"message":"Invalid API credentials"}}"#)
            .create();

        let err = uploader("key-denied")
            .upload(b"%PDF-1.4 stub", "application/pdf")
            .await
            .unwrap_err();
        match err {
            UploadError::Rejected(msg) => assert!(msg.contains("Invalid API credentials")),
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn missing_error_detail_still_reports_status() {
        let _m = mockito::mock("POST", "/pinning/pinFileToIPFS")
            .match_header("pinata_api_key", "key-opaque")
            .with_status(500)
            .with_body("{}")
            .create();

        let err = uploader("key-opaque")
            .upload(b"%PDF-1.4 stub", "application/pdf")
            .await
            .unwrap_err();
        match err {
            UploadError::Rejected(msg) => assert!(msg.contains("500")),
            other => panic!("expected rejection, got {:?}", other),
        }
    }
}
