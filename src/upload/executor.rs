//! Batch upload executor
//!
//! Runs one batch from start to finish:
//!
//! ```text
//! Idle -> CredentialsPending -> Uploading -> Completed
//!                 |                  |
//!                 +-> Aborted <------+-> Cancelled
//! ```
//!
//! Credentials are fetched once per batch. Each resource is then resolved, keyed
//! and posted in input order; the first error reports a failure for its index and
//! stops the batch. Cancellation is cooperative: it is checked before each file
//! and after each POST returns, and an in-flight POST is never interrupted.

use super::reporter::ProgressReporter;
use super::resource::{ResourceHandle, ResourceResolver};
use super::suffix::SuffixRule;
use super::{UploadError, UploadOutcome, UploadRequest, UploadState};
use crate::metrics;
use crate::s3::{
    endpoint_for_bucket, object_url, Credentials, CredentialsProvider, PostTransport,
    SignedPostForm,
};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

/// Shared cancellation flag for one batch
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Storage key for the resource at `index`:
/// `{unique_file_prefix}{suffix}.{extension}`
pub fn storage_key(
    credentials: &Credentials,
    suffix_rule: &dyn SuffixRule,
    handle: &ResourceHandle,
    index: usize,
    extension: &str,
) -> String {
    format!(
        "{}{}.{}",
        credentials.unique_file_prefix,
        suffix_rule.suffix(handle, index),
        extension
    )
}

/// Sequential, fail-fast executor for a single batch
pub struct UploadExecutor {
    credentials_provider: Arc<dyn CredentialsProvider>,
    resolver: Weak<dyn ResourceResolver>,
    transport: Arc<dyn PostTransport>,
    endpoint_template: String,
    cancellation: CancellationFlag,
    state: UploadState,
}

impl UploadExecutor {
    /// Create an executor.
    ///
    /// The resolver is held weakly: it belongs to the host that started the
    /// batch, and if the host goes away mid-batch the next file fails with
    /// [`UploadError::ContextUnavailable`].
    pub fn new(
        credentials_provider: Arc<dyn CredentialsProvider>,
        resolver: Weak<dyn ResourceResolver>,
        transport: Arc<dyn PostTransport>,
        endpoint_template: impl Into<String>,
    ) -> Self {
        Self {
            credentials_provider,
            resolver,
            transport,
            endpoint_template: endpoint_template.into(),
            cancellation: CancellationFlag::new(),
            state: UploadState::Idle,
        }
    }

    /// Flag that cancels this batch when set
    pub fn cancellation(&self) -> CancellationFlag {
        self.cancellation.clone()
    }

    pub fn state(&self) -> UploadState {
        self.state
    }

    /// Run the batch to completion, reporting through `reporter`
    #[tracing::instrument(
        name = "upload.batch",
        skip_all,
        fields(
            batch.id = %uuid::Uuid::new_v4(),
            batch.size = request.len(),
            acl = %request.acl,
            batch.state = tracing::field::Empty
        )
    )]
    pub async fn run(
        mut self,
        request: UploadRequest,
        mut reporter: ProgressReporter,
    ) -> UploadOutcome {
        let total = request.len();
        let mut urls = vec![String::new(); total];

        if self.cancellation.is_cancelled() {
            return self.finish(UploadState::Cancelled, urls);
        }

        self.state = UploadState::CredentialsPending;
        let credentials = match self.credentials_provider.credentials().await {
            Some(credentials) => credentials,
            None => {
                let error = UploadError::CredentialsUnavailable;
                tracing::error!(error = %error, "Batch aborted before upload");
                metrics::record_error(error.kind());
                reporter.fail(error, 0);
                self.cancellation.cancel();
                return self.finish(UploadState::Aborted, urls);
            }
        };
        check_policy(&credentials);

        self.state = UploadState::Uploading;
        for index in 0..total {
            if self.cancellation.is_cancelled() {
                self.state = UploadState::Cancelled;
                break;
            }

            let result = self.upload_file(&credentials, &request, index).await;

            if self.cancellation.is_cancelled() {
                tracing::info!(index, "Batch cancelled during upload, discarding result");
                self.state = UploadState::Cancelled;
                break;
            }

            match result {
                Ok(url) => {
                    urls[index] = url;
                    reporter.progress(index + 1, total);
                }
                Err(error) => {
                    metrics::record_error(error.kind());
                    reporter.fail(error, index);
                    self.cancellation.cancel();
                    self.state = UploadState::Aborted;
                    break;
                }
            }
        }

        if self.state == UploadState::Uploading {
            reporter.complete(urls.clone());
            return self.finish(UploadState::Completed, urls);
        }

        let state = self.state;
        self.finish(state, urls)
    }

    #[tracing::instrument(
        name = "upload.file",
        skip(self, credentials, request),
        fields(
            upload.index = index,
            s3.key = tracing::field::Empty,
            upload.bytes = tracing::field::Empty,
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    async fn upload_file(
        &self,
        credentials: &Credentials,
        request: &UploadRequest,
        index: usize,
    ) -> Result<String, UploadError> {
        let handle = request.resources[index]
            .as_ref()
            .filter(|handle| !handle.is_blank())
            .ok_or(UploadError::InvalidInput)?;

        let resolver = self
            .resolver
            .upgrade()
            .ok_or(UploadError::ContextUnavailable)?;
        let resource = resolver
            .resolve(handle)
            .await
            .map_err(UploadError::ResourceUnreadable)?;
        drop(resolver);

        let key = storage_key(
            credentials,
            request.suffix_rule.as_ref(),
            handle,
            index,
            &resource.extension,
        );
        let endpoint = endpoint_for_bucket(&self.endpoint_template, &credentials.bucket);
        let bytes = resource.len() as u64;

        let span = tracing::Span::current();
        span.record("s3.key", key.as_str());
        span.record("upload.bytes", bytes);

        let form = SignedPostForm::new(credentials, key.as_str(), request.acl.as_str(), &resource);
        let start_time = Instant::now();
        let response = self.transport.post_object(&endpoint, form).await;
        let duration = start_time.elapsed();
        metrics::record_file_upload_duration(duration.as_secs_f64());

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                metrics::record_file_upload_failure();
                return Err(e.into());
            }
        };
        span.record("http.status_code", response.status);

        if !response.is_success() {
            metrics::record_file_upload_failure();
            return Err(UploadError::UnexpectedStatus {
                status: response.status,
            });
        }

        metrics::record_file_upload_success(bytes);
        tracing::info!(
            key = %key,
            etag = response.etag.as_deref().unwrap_or_default(),
            bytes,
            duration_ms = duration.as_millis() as u64,
            "File uploaded"
        );

        Ok(object_url(&endpoint, &key))
    }

    fn finish(&mut self, state: UploadState, urls: Vec<String>) -> UploadOutcome {
        self.state = state;
        let label = match state {
            UploadState::Completed => "completed",
            UploadState::Cancelled => "cancelled",
            _ => "aborted",
        };
        metrics::record_batch(label);
        tracing::Span::current().record("batch.state", label);
        tracing::info!(state = label, "Batch finished");

        UploadOutcome { state, urls }
    }
}

/// Log policy problems up front. Never fails the batch; S3 is the authority.
fn check_policy(credentials: &Credentials) {
    match credentials.policy_document() {
        Ok(policy) if policy.is_expired_at(Utc::now()) => {
            tracing::warn!(
                expiration = %policy.expiration,
                "Signing policy already expired, uploads will likely be rejected"
            );
        }
        Ok(policy) => {
            tracing::debug!(expiration = %policy.expiration, "Signing policy decoded");
        }
        Err(e) => {
            tracing::debug!(error = %e, "Signing policy could not be decoded");
        }
    }
}
