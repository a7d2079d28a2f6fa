//! S3 Client module
//!
//! Browser-style signed POST uploads (`POST https://{bucket}.s3.amazonaws.com/`).
//!
//! A backend issues a time-boxed policy and signature; the client posts the file
//! directly to the bucket as `multipart/form-data` without proxying it through the
//! backend.
//!
//! # Form fields
//!
//! | Field | Value |
//! |-------|-------|
//! | `key` | `{unique_file_prefix}{suffix}.{extension}` |
//! | `AWSAccessKeyId` | credentials access key |
//! | `policy` | base64 policy from credentials |
//! | `signature` | policy signature from credentials |
//! | `success_action_status` | `201` |
//! | `acl` | batch ACL, `public-read` by default |
//! | `Content-Type` | credentials content type |
//! | `file` | resource bytes with its file name |
//!
//! # Tracing
//!
//! | Operation | Span Name | Attributes |
//! |-----------|-----------|------------|
//! | POST Object | `s3.post_object` | endpoint, key, method, bytes, status_code |

pub mod credentials;
pub mod policy;

pub use credentials::{
    Credentials, CredentialsError, CredentialsProvider, HttpCredentialsProvider,
    StaticCredentials,
};
pub use policy::{PolicyDocument, PolicyError};

use crate::upload::resource::ResolvedResource;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use std::time::Duration;
use thiserror::Error;

/// Fixed endpoint template; `{bucket}` is replaced with the credentials bucket
pub const DEFAULT_ENDPOINT_TEMPLATE: &str = "https://{bucket}.s3.amazonaws.com";

/// Status S3 is asked to answer with on success
pub const SUCCESS_ACTION_STATUS: u16 = 201;

/// S3 client errors
#[derive(Error, Debug)]
pub enum S3ClientError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Request error: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Invalid form: {0}")]
    FormError(String),
}

/// Resolve the upload endpoint for a bucket
pub fn endpoint_for_bucket(template: &str, bucket: &str) -> String {
    template.replace("{bucket}", bucket)
}

/// Public URL of an uploaded object
pub fn object_url(endpoint: &str, key: &str) -> String {
    format!("{}/{}", endpoint, key)
}

/// Fields of one signed POST upload
#[derive(Clone)]
pub struct SignedPostForm {
    pub key: String,
    pub access_key_id: String,
    pub policy: String,
    pub signature: String,
    pub acl: String,
    pub content_type: String,
    pub file_name: String,
    pub file: Bytes,
}

impl SignedPostForm {
    pub fn new(
        credentials: &Credentials,
        key: impl Into<String>,
        acl: impl Into<String>,
        resource: &ResolvedResource,
    ) -> Self {
        Self {
            key: key.into(),
            access_key_id: credentials.access_key_id.clone(),
            policy: credentials.policy.clone(),
            signature: credentials.signature.clone(),
            acl: acl.into(),
            content_type: credentials.content_type.clone(),
            file_name: resource.file_name.clone(),
            file: resource.data.clone(),
        }
    }

    /// Text fields in the order they are sent, before the `file` part.
    ///
    /// S3 ignores every field after `file`, so the file part must stay last.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("key", self.key.clone()),
            ("AWSAccessKeyId", self.access_key_id.clone()),
            ("policy", self.policy.clone()),
            ("signature", self.signature.clone()),
            ("success_action_status", SUCCESS_ACTION_STATUS.to_string()),
            ("acl", self.acl.clone()),
            ("Content-Type", self.content_type.clone()),
        ]
    }

    pub fn into_multipart(self) -> Result<Form, S3ClientError> {
        let mut form = Form::new();
        for (name, value) in self.fields() {
            form = form.text(name, value);
        }

        let len = self.file.len() as u64;
        let mut file_part =
            Part::stream_with_length(reqwest::Body::from(self.file), len).file_name(self.file_name);
        if !self.content_type.is_empty() {
            file_part = file_part
                .mime_str(&self.content_type)
                .map_err(|e| S3ClientError::FormError(format!("invalid content type: {}", e)))?;
        }

        Ok(form.part("file", file_part))
    }
}

impl std::fmt::Debug for SignedPostForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedPostForm")
            .field("key", &self.key)
            .field("access_key_id", &self.access_key_id)
            .field("acl", &self.acl)
            .field("content_type", &self.content_type)
            .field("file_name", &self.file_name)
            .field("file_len", &self.file.len())
            .finish_non_exhaustive()
    }
}

/// Response to a signed POST
#[derive(Debug, Clone)]
pub struct PostObjectResponse {
    pub status: u16,
    pub etag: Option<String>,
}

impl PostObjectResponse {
    pub fn is_success(&self) -> bool {
        self.status == SUCCESS_ACTION_STATUS
    }
}

/// Submits signed POST uploads
///
/// Only transport-level failures are errors here; any HTTP status is returned
/// as a response and judged by the caller.
#[async_trait]
pub trait PostTransport: Send + Sync {
    async fn post_object(
        &self,
        endpoint: &str,
        form: SignedPostForm,
    ) -> Result<PostObjectResponse, S3ClientError>;
}

/// S3 Client configuration
#[derive(Debug, Clone)]
pub struct S3ClientConfig {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for S3ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(60),
            // write (5 min) + read (3 min)
            request_timeout: Duration::from_secs(480),
        }
    }
}

/// reqwest-backed signed POST client
#[derive(Clone)]
pub struct S3PostClient {
    http_client: reqwest::Client,
}

impl S3PostClient {
    pub fn new(config: S3ClientConfig) -> Result<Self, S3ClientError> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| S3ClientError::ConfigError(e.to_string()))?;

        Ok(Self { http_client })
    }
}

#[async_trait]
impl PostTransport for S3PostClient {
    #[tracing::instrument(
        name = "s3.post_object",
        skip(self, form),
        fields(
            s3.endpoint = %endpoint,
            s3.key = %form.key,
            http.method = "POST",
            upload.bytes = form.file.len(),
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    async fn post_object(
        &self,
        endpoint: &str,
        form: SignedPostForm,
    ) -> Result<PostObjectResponse, S3ClientError> {
        let multipart = form.into_multipart()?;

        // S3 expects the POST on the bucket root
        let url = format!("{}/", endpoint.trim_end_matches('/'));
        let response = self.http_client.post(url).multipart(multipart).send().await?;

        let status = response.status().as_u16();
        tracing::Span::current().record("http.status_code", status);

        let etag = response
            .headers()
            .get("ETag")
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        if status != SUCCESS_ACTION_STATUS {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status, body = %body, "POST Object rejected");
        }

        Ok(PostObjectResponse { status, etag })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::resource::ResourceHandle;

    fn credentials() -> Credentials {
        Credentials {
            bucket: "media".into(),
            unique_file_prefix: "u/1-".into(),
            access_key_id: "AKIA".into(),
            policy: "cG9saWN5".into(),
            signature: "sig".into(),
            content_type: "image/jpeg".into(),
        }
    }

    #[test]
    fn test_default_endpoint() {
        assert_eq!(
            endpoint_for_bucket(DEFAULT_ENDPOINT_TEMPLATE, "media"),
            "https://media.s3.amazonaws.com"
        );
    }

    #[test]
    fn test_object_url() {
        let endpoint = endpoint_for_bucket(DEFAULT_ENDPOINT_TEMPLATE, "media");
        assert_eq!(
            object_url(&endpoint, "u/1-0.jpg"),
            "https://media.s3.amazonaws.com/u/1-0.jpg"
        );
    }

    #[test]
    fn test_form_field_order() {
        let handle = ResourceHandle::new("/tmp/a.jpg");
        let resource = ResolvedResource::new(&handle, Bytes::from_static(b"x"), None);
        let form = SignedPostForm::new(&credentials(), "u/1-0.jpg", "private", &resource);

        let names: Vec<&str> = form.fields().iter().map(|(n, _)| *n).collect();
        assert_eq!(
            names,
            [
                "key",
                "AWSAccessKeyId",
                "policy",
                "signature",
                "success_action_status",
                "acl",
                "Content-Type"
            ]
        );

        let values: Vec<String> = form.fields().into_iter().map(|(_, v)| v).collect();
        assert_eq!(
            values,
            ["u/1-0.jpg", "AKIA", "cG9saWN5", "sig", "201", "private", "image/jpeg"]
        );
        assert_eq!(form.file_name, "a.jpg");
    }

    #[test]
    fn test_invalid_content_type_rejected() {
        let handle = ResourceHandle::new("/tmp/a.jpg");
        let resource = ResolvedResource::new(&handle, Bytes::new(), None);
        let mut creds = credentials();
        creds.content_type = "not a mime".into();

        let form = SignedPostForm::new(&creds, "k", "public-read", &resource);
        assert!(matches!(form.into_multipart(), Err(S3ClientError::FormError(_))));
    }

    #[tokio::test]
    async fn test_post_object_reports_status_and_etag() {
        use wiremock::matchers::{body_string_contains, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/media/"))
            .and(body_string_contains("file-body"))
            .respond_with(ResponseTemplate::new(201).insert_header("ETag", "\"abc123\""))
            .expect(1)
            .mount(&server)
            .await;

        let handle = ResourceHandle::new("/tmp/a.jpg");
        let resource =
            ResolvedResource::new(&handle, Bytes::from_static(b"file-body"), None);
        let form = SignedPostForm::new(&credentials(), "u/1-0.jpg", "public-read", &resource);

        let client = S3PostClient::new(S3ClientConfig::default()).unwrap();
        let endpoint = format!("{}/media", server.uri());
        let response = client.post_object(&endpoint, form).await.unwrap();

        assert!(response.is_success());
        assert_eq!(response.etag.as_deref(), Some("\"abc123\""));
    }

    #[test]
    fn test_client_creation() {
        assert!(S3PostClient::new(S3ClientConfig::default()).is_ok());
    }
}
