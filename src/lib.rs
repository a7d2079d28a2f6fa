//! S3 Batch Uploader Library
//!
//! Uploads batches of local media files to S3 with short-lived signed-POST
//! credentials, reporting progress, completion, and failure to a listener.
//!
//! # Features
//!
//! - **Per-batch credentials**: A fresh bundle is requested for every batch
//! - **Pluggable key naming**: Incremental, table-based, or custom suffix rules
//! - **Fail-fast**: The first error stops the batch; nothing is retried
//! - **Callback thread**: Listener callbacks run on a designated thread, in order
//!
//! # Example
//!
//! ```no_run
//! use s3_batch_uploader::upload::{CallbackLooper, IndexedSuffix, UploadListener};
//! use s3_batch_uploader::s3::{Credentials, StaticCredentials};
//! use s3_batch_uploader::UploadManager;
//! use std::sync::Arc;
//!
//! # async fn example(listener: Arc<dyn UploadListener>, credentials: Credentials)
//! #     -> Result<(), Box<dyn std::error::Error>> {
//! let (callbacks, callback_thread) = CallbackLooper::spawn("upload-callbacks")?;
//! let manager = UploadManager::builder()
//!     .credentials_provider(Arc::new(StaticCredentials::new(credentials)))
//!     .callback_context(callbacks)
//!     .build()?;
//!
//! let handle = manager.upload_with_suffix(
//!     ["/photos/full.jpg", "/photos/large.jpg"],
//!     Arc::new(IndexedSuffix::dimensions()),
//!     &listener,
//! );
//! handle.wait().await?;
//! # drop(manager);
//! # callback_thread.join();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod manager;
pub mod metrics;
pub mod s3;
pub mod telemetry;
pub mod upload;

// Re-export commonly used types
pub use config::Config;
pub use manager::{UploadHandle, UploadManager};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
