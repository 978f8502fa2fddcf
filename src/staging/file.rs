use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone)]
enum FileSource {
    Memory(Arc<[u8]>),
    Disk(PathBuf),
}

/// A file the user picked, not yet uploaded.
#[derive(Debug, Clone)]
pub struct LocalFile {
    name: String,
    content_type: String,
    size: u64,
    source: FileSource,
}

impl LocalFile {
    pub fn from_bytes(
        name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            size: bytes.len() as u64,
            source: FileSource::Memory(bytes.into()),
        }
    }

    /// Describes a file on disk; its bytes are read only at submission.
    pub fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path)?;
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("upload")
            .to_string();
        Ok(Self {
            content_type: guess_content_type(&name).to_string(),
            name,
            size: metadata.len(),
            source: FileSource::Disk(path.to_path_buf()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_image(&self) -> bool {
        self.content_type.starts_with("image/")
    }

    /// Extension for the uploaded object: the file name's own extension,
    /// else the MIME subtype.
    pub fn extension(&self) -> String {
        let from_name = Path::new(&self.name)
            .extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| !ext.is_empty());
        if let Some(ext) = from_name {
            return ext.to_ascii_lowercase();
        }
        self.content_type
            .split('/')
            .nth(1)
            .map(|subtype| subtype.split('+').next().unwrap_or(subtype))
            .filter(|subtype| !subtype.is_empty())
            .unwrap_or("bin")
            .to_ascii_lowercase()
    }

    pub async fn read_bytes(&self) -> std::io::Result<Vec<u8>> {
        match &self.source {
            FileSource::Memory(bytes) => Ok(bytes.to_vec()),
            FileSource::Disk(path) => tokio::fs::read(path).await,
        }
    }
}

pub fn guess_content_type(name: &str) -> &'static str {
    let ext = Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        Some("svg") => "image/svg+xml",
        Some("heic") => "image/heic",
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}
