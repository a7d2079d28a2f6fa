//! Upload manager
//!
//! Entry point for callers. The manager owns the collaborators (credentials
//! provider, resource resolver, signed POST transport, callback context) and
//! starts one background task per batch.
//!
//! The `upload*` methods never fail: they return immediately with an
//! [`UploadHandle`], and every outcome is reported through the listener on the
//! callback thread.
//!
//! # Example
//!
//! ```no_run
//! use s3_batch_uploader::config::Config;
//! use s3_batch_uploader::upload::{UploadError, UploadListener};
//! use s3_batch_uploader::UploadManager;
//! use std::sync::Arc;
//!
//! struct PrintListener;
//!
//! impl UploadListener for PrintListener {
//!     fn on_progress(&self, percent: u8) {
//!         println!("{}%", percent);
//!     }
//!     fn on_upload_complete(&self, urls: Vec<String>) {
//!         println!("{:?}", urls);
//!     }
//!     fn on_upload_failed(&self, error: UploadError, index: usize) {
//!         eprintln!("file {} failed: {}", index, error);
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load("config.yaml")?;
//! let (manager, callbacks) = UploadManager::from_config(&config)?;
//!
//! let listener: Arc<dyn UploadListener> = Arc::new(PrintListener);
//! let handle = manager.upload(["/photos/a.jpg", "/photos/b.jpg"], &listener);
//! let outcome = handle.wait().await?;
//! println!("{:?}", outcome.state);
//!
//! drop(manager);
//! callbacks.join();
//! # Ok(())
//! # }
//! ```

use crate::config::{Config, CredentialsConfig};
use crate::s3::{
    CredentialsError, CredentialsProvider, HttpCredentialsProvider, PostTransport,
    S3ClientConfig, S3ClientError, S3PostClient, StaticCredentials, DEFAULT_ENDPOINT_TEMPLATE,
};
use crate::upload::callback::{CallbackContext, CallbackLooper, CallbackThread};
use crate::upload::executor::{CancellationFlag, UploadExecutor};
use crate::upload::reporter::{ProgressReporter, UploadListener};
use crate::upload::resource::{FileSystemResolver, ResourceHandle, ResourceResolver};
use crate::upload::suffix::SuffixRule;
use crate::upload::{UploadOutcome, UploadRequest, DEFAULT_ACL};
use std::sync::Arc;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::{JoinError, JoinHandle};

/// Manager setup errors
#[derive(Error, Debug)]
pub enum ManagerError {
    #[error("No tokio runtime available: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),

    #[error("Client creation error: {0}")]
    ClientCreationError(#[from] S3ClientError),

    #[error("Credentials error: {0}")]
    CredentialsError(#[from] CredentialsError),

    #[error("Failed to start callback thread: {0}")]
    CallbackThread(#[from] std::io::Error),

    #[error("Missing component: {0}")]
    MissingComponent(&'static str),
}

/// Handle to a running batch
pub struct UploadHandle {
    cancellation: CancellationFlag,
    task: JoinHandle<UploadOutcome>,
}

impl UploadHandle {
    /// Ask the batch to stop before its next file. A POST already in flight is
    /// allowed to finish and its result is discarded.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the batch and return its final state and URLs
    pub async fn wait(self) -> Result<UploadOutcome, JoinError> {
        self.task.await
    }
}

/// Uploads batches of local resources to S3 with per-batch credentials
pub struct UploadManager {
    credentials_provider: Arc<dyn CredentialsProvider>,
    resolver: Arc<dyn ResourceResolver>,
    transport: Arc<dyn PostTransport>,
    callbacks: CallbackContext,
    runtime: Handle,
    endpoint_template: String,
    default_acl: String,
}

impl UploadManager {
    pub fn builder() -> UploadManagerBuilder {
        UploadManagerBuilder::default()
    }

    /// Build a manager from configuration, with a dedicated callback thread.
    ///
    /// Must be called from within a tokio runtime.
    pub fn from_config(config: &Config) -> Result<(Self, CallbackThread), ManagerError> {
        let credentials_provider: Arc<dyn CredentialsProvider> = match &config.credentials {
            CredentialsConfig {
                url: Some(url),
                bearer_token,
                ..
            } => {
                let mut provider = HttpCredentialsProvider::new(url.clone())?;
                if let Some(token) = bearer_token.as_ref().filter(|t| !t.is_empty()) {
                    provider = provider.with_bearer_token(token.clone());
                }
                Arc::new(provider)
            }
            CredentialsConfig {
                static_credentials: Some(credentials),
                ..
            } => Arc::new(StaticCredentials::new(credentials.clone())),
            _ => return Err(ManagerError::MissingComponent("credentials")),
        };

        let uploader = &config.uploader;
        let transport = S3PostClient::new(S3ClientConfig {
            connect_timeout: uploader.connect_timeout(),
            request_timeout: uploader.request_timeout(),
        })?;

        let (callbacks, thread) = CallbackLooper::spawn(&uploader.callback_thread_name)?;

        let manager = Self::builder()
            .credentials_provider(credentials_provider)
            .transport(Arc::new(transport))
            .callback_context(callbacks)
            .endpoint_template(uploader.endpoint_template.clone())
            .default_acl(uploader.default_acl.clone())
            .build()?;

        Ok((manager, thread))
    }

    /// Upload resources in order with the incremental suffix rule and the
    /// default ACL
    pub fn upload<I, R>(&self, resources: I, listener: &Arc<dyn UploadListener>) -> UploadHandle
    where
        I: IntoIterator<Item = R>,
        R: Into<ResourceHandle>,
    {
        self.submit(self.request(resources), listener)
    }

    /// Upload resources using `suffix_rule` to build each storage key
    pub fn upload_with_suffix<I, R>(
        &self,
        resources: I,
        suffix_rule: Arc<dyn SuffixRule>,
        listener: &Arc<dyn UploadListener>,
    ) -> UploadHandle
    where
        I: IntoIterator<Item = R>,
        R: Into<ResourceHandle>,
    {
        self.submit(self.request(resources).with_suffix_rule(suffix_rule), listener)
    }

    /// Upload resources with a custom suffix rule and ACL
    pub fn upload_with_acl<I, R>(
        &self,
        resources: I,
        suffix_rule: Arc<dyn SuffixRule>,
        acl: impl Into<String>,
        listener: &Arc<dyn UploadListener>,
    ) -> UploadHandle
    where
        I: IntoIterator<Item = R>,
        R: Into<ResourceHandle>,
    {
        self.submit(
            self.request(resources)
                .with_suffix_rule(suffix_rule)
                .with_acl(acl),
            listener,
        )
    }

    /// Upload a single resource
    pub fn upload_one(
        &self,
        resource: impl Into<ResourceHandle>,
        listener: &Arc<dyn UploadListener>,
    ) -> UploadHandle {
        self.upload([resource.into()], listener)
    }

    /// Upload a single resource using `suffix_rule` to build its storage key
    pub fn upload_one_with_suffix(
        &self,
        resource: impl Into<ResourceHandle>,
        suffix_rule: Arc<dyn SuffixRule>,
        listener: &Arc<dyn UploadListener>,
    ) -> UploadHandle {
        self.upload_with_suffix([resource.into()], suffix_rule, listener)
    }

    /// Start a fully described batch in the background.
    ///
    /// The listener is held weakly; keep it alive for as long as you want to
    /// receive notifications.
    pub fn submit(&self, request: UploadRequest, listener: &Arc<dyn UploadListener>) -> UploadHandle {
        let executor = UploadExecutor::new(
            self.credentials_provider.clone(),
            Arc::downgrade(&self.resolver),
            self.transport.clone(),
            self.endpoint_template.clone(),
        );
        let cancellation = executor.cancellation();
        let reporter = ProgressReporter::new(self.callbacks.clone(), listener);

        tracing::debug!(files = request.len(), acl = %request.acl, "Starting upload batch");
        let task = self.runtime.spawn(executor.run(request, reporter));

        UploadHandle { cancellation, task }
    }

    fn request<I, R>(&self, resources: I) -> UploadRequest
    where
        I: IntoIterator<Item = R>,
        R: Into<ResourceHandle>,
    {
        UploadRequest::new(resources).with_acl(self.default_acl.clone())
    }
}

/// Builder for [`UploadManager`]
#[derive(Default)]
pub struct UploadManagerBuilder {
    credentials_provider: Option<Arc<dyn CredentialsProvider>>,
    resolver: Option<Arc<dyn ResourceResolver>>,
    transport: Option<Arc<dyn PostTransport>>,
    callbacks: Option<CallbackContext>,
    runtime: Option<Handle>,
    endpoint_template: Option<String>,
    default_acl: Option<String>,
}

impl UploadManagerBuilder {
    pub fn credentials_provider(mut self, provider: Arc<dyn CredentialsProvider>) -> Self {
        self.credentials_provider = Some(provider);
        self
    }

    /// Defaults to [`FileSystemResolver`]
    pub fn resolver(mut self, resolver: Arc<dyn ResourceResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Defaults to [`S3PostClient`] with default timeouts
    pub fn transport(mut self, transport: Arc<dyn PostTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn callback_context(mut self, context: CallbackContext) -> Self {
        self.callbacks = Some(context);
        self
    }

    /// Defaults to the runtime `build` is called from
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn endpoint_template(mut self, template: impl Into<String>) -> Self {
        self.endpoint_template = Some(template.into());
        self
    }

    pub fn default_acl(mut self, acl: impl Into<String>) -> Self {
        self.default_acl = Some(acl.into());
        self
    }

    pub fn build(self) -> Result<UploadManager, ManagerError> {
        let credentials_provider = self
            .credentials_provider
            .ok_or(ManagerError::MissingComponent("credentials provider"))?;
        let callbacks = self
            .callbacks
            .ok_or(ManagerError::MissingComponent("callback context"))?;

        let transport: Arc<dyn PostTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(S3PostClient::new(S3ClientConfig::default())?),
        };

        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current()?,
        };

        Ok(UploadManager {
            credentials_provider,
            resolver: self
                .resolver
                .unwrap_or_else(|| Arc::new(FileSystemResolver::new())),
            transport,
            callbacks,
            runtime,
            endpoint_template: self
                .endpoint_template
                .unwrap_or_else(|| DEFAULT_ENDPOINT_TEMPLATE.to_string()),
            default_acl: self.default_acl.unwrap_or_else(|| DEFAULT_ACL.to_string()),
        })
    }
}
