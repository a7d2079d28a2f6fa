//! Storage key suffix rules
//!
//! A suffix rule turns a resource and its position in the batch into the string
//! appended to the credentials' unique file prefix. The resulting key looks like:
//!
//! ```text
//! {unique_file_prefix}{suffix}.{extension}
//! ```
//!
//! # Example
//!
//! ```
//! use s3_batch_uploader::upload::resource::ResourceHandle;
//! use s3_batch_uploader::upload::suffix::{IncrementalSuffix, IndexedSuffix, SuffixRule};
//!
//! let photo = ResourceHandle::new("/tmp/photo.jpg");
//!
//! assert_eq!(IncrementalSuffix.suffix(&photo, 3), "3");
//!
//! let sizes = IndexedSuffix::dimensions();
//! assert_eq!(sizes.suffix(&photo, 1), "large");
//! assert_eq!(sizes.suffix(&photo, 5), "large");
//! ```

use super::resource::ResourceHandle;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Suffix rule errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SuffixRuleError {
    #[error("Suffix table cannot be empty")]
    EmptyTable,

    #[error("Unknown suffix rule: {0}")]
    UnknownRule(String),
}

/// Maps a resource and its batch position to a storage key suffix.
///
/// Implementations must be pure: the same `(resource, index)` always yields the
/// same suffix, for every `index >= 0`.
pub trait SuffixRule: Send + Sync {
    fn suffix(&self, resource: &ResourceHandle, index: usize) -> String;
}

impl<F> SuffixRule for F
where
    F: Fn(&ResourceHandle, usize) -> String + Send + Sync,
{
    fn suffix(&self, resource: &ResourceHandle, index: usize) -> String {
        self(resource, index)
    }
}

/// Uses the decimal batch index as the suffix. This is the default rule.
#[derive(Debug, Clone, Copy, Default)]
pub struct IncrementalSuffix;

impl SuffixRule for IncrementalSuffix {
    fn suffix(&self, _resource: &ResourceHandle, index: usize) -> String {
        index.to_string()
    }
}

/// Cycles through a fixed table of suffixes.
///
/// Index `i` maps to `table[i % table.len()]`, so a suffix is always returned
/// no matter how large the batch is.
#[derive(Debug, Clone)]
pub struct IndexedSuffix {
    suffixes: Vec<String>,
}

impl IndexedSuffix {
    /// Create a rule over the given table. An empty table is rejected here so the
    /// rule is total once constructed.
    pub fn new<I, S>(suffixes: I) -> Result<Self, SuffixRuleError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let suffixes: Vec<String> = suffixes.into_iter().map(Into::into).collect();
        if suffixes.is_empty() {
            return Err(SuffixRuleError::EmptyTable);
        }
        Ok(Self { suffixes })
    }

    /// Common dimension descriptors: "original", "large", "medium", "small".
    pub fn dimensions() -> Self {
        Self {
            suffixes: ["original", "large", "medium", "small"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }

    pub fn suffixes(&self) -> &[String] {
        &self.suffixes
    }
}

impl SuffixRule for IndexedSuffix {
    fn suffix(&self, _resource: &ResourceHandle, index: usize) -> String {
        self.suffixes[index % self.suffixes.len()].clone()
    }
}

/// Textual description of a builtin rule, as accepted by the CLI.
///
/// - `incremental`
/// - `dimensions`
/// - `table:a,b,c`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuffixRuleSpec {
    Incremental,
    Dimensions,
    Table(Vec<String>),
}

impl SuffixRuleSpec {
    /// Build the described rule
    pub fn build(&self) -> Result<Arc<dyn SuffixRule>, SuffixRuleError> {
        Ok(match self {
            SuffixRuleSpec::Incremental => Arc::new(IncrementalSuffix),
            SuffixRuleSpec::Dimensions => Arc::new(IndexedSuffix::dimensions()),
            SuffixRuleSpec::Table(table) => Arc::new(IndexedSuffix::new(table.clone())?),
        })
    }
}

impl FromStr for SuffixRuleSpec {
    type Err = SuffixRuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "incremental" => Ok(SuffixRuleSpec::Incremental),
            "dimensions" => Ok(SuffixRuleSpec::Dimensions),
            other => match other.strip_prefix("table:") {
                Some(list) => {
                    let table: Vec<String> = list
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect();
                    if table.is_empty() {
                        return Err(SuffixRuleError::EmptyTable);
                    }
                    Ok(SuffixRuleSpec::Table(table))
                }
                None => Err(SuffixRuleError::UnknownRule(other.to_string())),
            },
        }
    }
}
