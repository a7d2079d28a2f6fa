//! Local resource resolution
//!
//! A [`ResourceHandle`] is an opaque reference to a local media file (a plain path
//! or a `file://` URI). Before upload it is resolved by a [`ResourceResolver`] into
//! its bytes, a file name for the multipart `file` part, and an extension for the
//! storage key.

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

const FILE_SCHEME: &str = "file://";

/// Extension used when neither the path nor the content type hint provides one
pub const FALLBACK_EXTENSION: &str = "bin";

/// Reference to a local media resource
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceHandle(String);

impl ResourceHandle {
    pub fn new(location: impl Into<String>) -> Self {
        Self(location.into())
    }

    /// The handle exactly as the caller provided it
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Blank handles are treated like absent ones
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Local filesystem path, with any `file://` scheme removed
    pub fn path(&self) -> &Path {
        Path::new(self.0.strip_prefix(FILE_SCHEME).unwrap_or(&self.0))
    }

    pub fn file_name(&self) -> Option<&str> {
        self.path().file_name().and_then(|n| n.to_str())
    }

    pub fn file_stem(&self) -> Option<&str> {
        self.path().file_stem().and_then(|n| n.to_str())
    }

    /// Lowercased extension of the path, if it has one
    pub fn extension(&self) -> Option<String> {
        self.path()
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty())
            .map(str::to_ascii_lowercase)
    }
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceHandle {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ResourceHandle {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<PathBuf> for ResourceHandle {
    fn from(value: PathBuf) -> Self {
        Self::new(value.to_string_lossy().into_owned())
    }
}

/// A resource that has been opened for upload
#[derive(Debug, Clone)]
pub struct ResolvedResource {
    pub data: Bytes,
    pub file_name: String,
    pub extension: String,
}

impl ResolvedResource {
    /// Build a resolved resource for `handle`.
    ///
    /// The extension comes from the handle's path; when the path has none, the
    /// content type hint is mapped to an extension, falling back to
    /// [`FALLBACK_EXTENSION`].
    pub fn new(handle: &ResourceHandle, data: Bytes, content_type_hint: Option<&str>) -> Self {
        let extension = handle
            .extension()
            .or_else(|| content_type_hint.and_then(extension_for_mime).map(String::from))
            .unwrap_or_else(|| FALLBACK_EXTENSION.to_string());

        let file_name = handle
            .file_name()
            .map(String::from)
            .unwrap_or_else(|| format!("upload.{}", extension));

        Self {
            data,
            file_name,
            extension,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Map a MIME type to the extension used in storage keys
pub fn extension_for_mime(mime: &str) -> Option<&'static str> {
    let essence = mime.split(';').next().unwrap_or("").trim();
    match essence.to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        "image/heic" => Some("heic"),
        "image/bmp" => Some("bmp"),
        "video/mp4" => Some("mp4"),
        "video/quicktime" => Some("mov"),
        "video/3gpp" => Some("3gp"),
        "video/webm" => Some("webm"),
        "audio/mpeg" => Some("mp3"),
        "audio/mp4" | "audio/aac" => Some("m4a"),
        "application/pdf" => Some("pdf"),
        _ => None,
    }
}

/// Opens resource handles for upload.
///
/// Implementations decide how a handle maps to bytes (filesystem, content store,
/// in-memory fixtures). Any failure to open is reported as an `io::Error`.
#[async_trait]
pub trait ResourceResolver: Send + Sync {
    async fn resolve(&self, handle: &ResourceHandle) -> io::Result<ResolvedResource>;
}

/// Resolves handles as local filesystem paths
#[derive(Debug, Clone, Default)]
pub struct FileSystemResolver {
    root: Option<PathBuf>,
}

impl FileSystemResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative handles against `root`
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn full_path(&self, handle: &ResourceHandle) -> PathBuf {
        let path = handle.path();
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }
}

#[async_trait]
impl ResourceResolver for FileSystemResolver {
    async fn resolve(&self, handle: &ResourceHandle) -> io::Result<ResolvedResource> {
        let path = self.full_path(handle);
        let data = tokio::fs::read(&path).await?;
        tracing::debug!(path = %path.display(), bytes = data.len(), "Resolved resource");
        Ok(ResolvedResource::new(handle, Bytes::from(data), None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_handle_strips_file_scheme() {
        let handle = ResourceHandle::new("file:///tmp/pics/Cat.JPG");
        assert_eq!(handle.path(), Path::new("/tmp/pics/Cat.JPG"));
        assert_eq!(handle.file_name(), Some("Cat.JPG"));
        assert_eq!(handle.extension().as_deref(), Some("jpg"));
    }

    #[test]
    fn test_blank_handle() {
        assert!(ResourceHandle::new("   ").is_blank());
        assert!(!ResourceHandle::new("a.png").is_blank());
    }

    #[test]
    fn test_extension_from_content_type_hint() {
        let handle = ResourceHandle::new("/media/12345");
        let resolved = ResolvedResource::new(&handle, Bytes::new(), Some("image/jpeg; q=1"));
        assert_eq!(resolved.extension, "jpg");
        assert_eq!(resolved.file_name, "12345");
    }

    #[test]
    fn test_extension_fallback() {
        let handle = ResourceHandle::new("/media/blob");
        let resolved = ResolvedResource::new(&handle, Bytes::new(), Some("application/x-unknown"));
        assert_eq!(resolved.extension, FALLBACK_EXTENSION);
    }

    #[test]
    fn test_path_extension_wins_over_hint() {
        let handle = ResourceHandle::new("/media/clip.mov");
        let resolved = ResolvedResource::new(&handle, Bytes::new(), Some("image/png"));
        assert_eq!(resolved.extension, "mov");
    }

    #[tokio::test]
    async fn test_filesystem_resolver_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.png");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"png-bytes").unwrap();

        let resolver = FileSystemResolver::with_root(dir.path());
        let resolved = resolver
            .resolve(&ResourceHandle::new("photo.png"))
            .await
            .unwrap();

        assert_eq!(resolved.data, Bytes::from_static(b"png-bytes"));
        assert_eq!(resolved.file_name, "photo.png");
        assert_eq!(resolved.extension, "png");
    }

    #[tokio::test]
    async fn test_filesystem_resolver_missing_file() {
        let resolver = FileSystemResolver::new();
        let err = resolver
            .resolve(&ResourceHandle::new("/definitely/not/here.jpg"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
