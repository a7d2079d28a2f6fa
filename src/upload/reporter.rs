//! Progress reporting
//!
//! The executor produces notifications on its own task; [`ProgressReporter`]
//! posts each one onto the caller's [`CallbackContext`] so the listener is only
//! ever invoked on the designated callback thread.
//!
//! The reporter holds the listener weakly. If the caller drops its listener
//! mid-batch, notifications are silently discarded and the upload carries on.

use super::callback::CallbackContext;
use super::UploadError;
use std::sync::{Arc, Weak};

/// Receives completion, error, and progress events for one batch.
///
/// All methods are called on the callback thread, never on the upload task.
pub trait UploadListener: Send + Sync {
    /// Called after each file finishes uploading, with
    ///
    /// ```text
    /// progress = files_uploaded * 100 / total_files   (integer division)
    /// ```
    ///
    /// so the last file always reports 100. In batches of more than 100 files the
    /// value is raised to 1 while it would otherwise round down to 0, so every
    /// report lies in `1..=100`. Earlier releases reported the index of the file
    /// that had just finished instead of the number of finished files, which
    /// never reached 100 for batches of two or more files.
    fn on_progress(&self, percent: u8);

    /// Called once, right after the last `on_progress`, with one URL per
    /// resource in input order.
    fn on_upload_complete(&self, urls: Vec<String>);

    /// Called at most once, for the first failure. Nothing follows it.
    fn on_upload_failed(&self, error: UploadError, index: usize);
}

/// A notification on its way to the listener
#[derive(Debug)]
pub enum UploadEvent {
    Progress(u8),
    Completed(Vec<String>),
    Failed { error: UploadError, index: usize },
}

impl UploadEvent {
    fn is_terminal(&self) -> bool {
        !matches!(self, UploadEvent::Progress(_))
    }

    fn deliver(self, listener: &dyn UploadListener) {
        match self {
            UploadEvent::Progress(percent) => listener.on_progress(percent),
            UploadEvent::Completed(urls) => listener.on_upload_complete(urls),
            UploadEvent::Failed { error, index } => listener.on_upload_failed(error, index),
        }
    }
}

/// Percentage of the batch finished once `completed` of `total` files are done
pub fn progress_percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let percent = completed.min(total) * 100 / total;
    if completed > 0 {
        percent.max(1) as u8
    } else {
        percent as u8
    }
}

/// Marshals notifications from the upload task onto the callback context
pub struct ProgressReporter {
    context: CallbackContext,
    listener: Weak<dyn UploadListener>,
    finished: bool,
}

impl ProgressReporter {
    pub fn new(context: CallbackContext, listener: &Arc<dyn UploadListener>) -> Self {
        Self {
            context,
            listener: Arc::downgrade(listener),
            finished: false,
        }
    }

    /// Report that `completed` of `total` files are uploaded
    pub fn progress(&self, completed: usize, total: usize) {
        self.dispatch(UploadEvent::Progress(progress_percent(completed, total)));
    }

    pub fn complete(&mut self, urls: Vec<String>) {
        self.send(UploadEvent::Completed(urls));
    }

    pub fn fail(&mut self, error: UploadError, index: usize) {
        self.send(UploadEvent::Failed { error, index });
    }

    /// Whether a terminal notification has been sent
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn send(&mut self, event: UploadEvent) {
        let terminal = event.is_terminal();
        self.dispatch(event);
        if terminal {
            self.finished = true;
        }
    }

    fn dispatch(&self, event: UploadEvent) {
        if self.finished {
            tracing::debug!(?event, "Dropping notification after terminal event");
            return;
        }

        let listener = self.listener.clone();
        let posted = self.context.post(move || {
            if let Some(listener) = listener.upgrade() {
                event.deliver(listener.as_ref());
            }
        });

        if !posted {
            tracing::debug!("Callback context closed, notification dropped");
        }
    }
}
