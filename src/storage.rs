//! Local file storage for post previews and avatars.
//!
//! Files live flat in one directory under random names. Only the generated
//! filename is persisted in the owning row.

use bytes::Bytes;
use rand::Rng;
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Content types accepted for image-only uploads, with their extensions.
const IMAGE_TYPES: &[(&str, &str)] = &[
    ("image/jpeg", ".jpg"),
    ("image/png", ".png"),
    ("image/gif", ".gif"),
];

/// Random bytes in a generated filename (hex-encoded, so twice as many chars).
const NAME_BYTES: usize = 12;

/// An uploaded file as received from a multipart field.
#[derive(Debug, Clone)]
pub struct Upload {
    pub content_type: Option<String>,
    pub file_name: Option<String>,
    pub bytes: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPolicy {
    /// Only JPEG, PNG and GIF are stored; anything else is a 400.
    ImagesOnly,
    /// Any file is stored; the extension comes from a recognized image type,
    /// else from the original filename.
    Permissive,
}

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: PathBuf) -> std::io::Result<Self> {
        std::fs::create_dir_all(&root)?;
        Ok(FileStore { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write an upload under a fresh random name and return that name.
    pub async fn store(&self, upload: &Upload, policy: UploadPolicy) -> AppResult<String> {
        let ext = extension_for(upload, policy)?;

        let filename = loop {
            let candidate = format!("{}{}", random_name(), ext);
            if !tokio::fs::try_exists(self.root.join(&candidate)).await? {
                break candidate;
            }
        };

        // Write to a hidden temp file and rename, so a reader never sees a
        // partially written file under its public name
        let tmp_path = self.root.join(format!(".{}.part", filename));
        if let Err(e) = tokio::fs::write(&tmp_path, &upload.bytes).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        tokio::fs::rename(&tmp_path, self.root.join(&filename)).await?;

        tracing::debug!(%filename, size = upload.bytes.len(), "Stored upload");
        Ok(filename)
    }

    /// Remove a stored file. Missing files and invalid names are ignored.
    pub async fn delete(&self, filename: &str) {
        let Some(path) = self.path_for(filename) else {
            return;
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => tracing::debug!(%filename, "Deleted stored file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to delete {}: {}", path.display(), e),
        }
    }

    /// Delete the file a row pointed to before it was given a new one.
    pub async fn replace(&self, old: Option<&str>, new: &str) {
        if let Some(old) = old.filter(|old| *old != new) {
            self.delete(old).await;
        }
    }

    /// Read a stored file. Returns 404 for unknown or unsafe names.
    pub async fn read(&self, filename: &str) -> AppResult<Vec<u8>> {
        let path = self
            .path_for(filename)
            .ok_or_else(|| AppError::not_found("File"))?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(AppError::not_found("File")),
            Err(e) => Err(e.into()),
        }
    }

    /// Map a stored filename to its path, refusing anything that could
    /// point outside the storage root or at a temp file.
    fn path_for(&self, filename: &str) -> Option<PathBuf> {
        let valid = !filename.is_empty()
            && !filename.starts_with('.')
            && !filename.contains(['/', '\\', '\0']);
        valid.then(|| self.root.join(filename))
    }
}

/// Pick the extension a stored upload gets under `policy`.
pub fn extension_for(upload: &Upload, policy: UploadPolicy) -> AppResult<String> {
    let known = upload
        .content_type
        .as_deref()
        .and_then(|ct| IMAGE_TYPES.iter().find(|(mime, _)| *mime == ct))
        .map(|(_, ext)| ext.to_string());

    match (policy, known) {
        (_, Some(ext)) => Ok(ext),
        (UploadPolicy::ImagesOnly, None) => Err(AppError::BadRequest(
            "Only image files (JPEG, PNG, GIF) are allowed".into(),
        )),
        (UploadPolicy::Permissive, None) => Ok(upload
            .file_name
            .as_deref()
            .and_then(original_extension)
            .unwrap_or_default()),
    }
}

/// Whether a stored filename carries one of the image extensions this store
/// assigns. Only these are served with their own content type.
pub fn is_image_name(filename: &str) -> bool {
    IMAGE_TYPES.iter().any(|(_, ext)| filename.ends_with(ext))
}

/// Extension of a client-supplied filename, kept only when it is a short
/// alphanumeric suffix.
fn original_extension(file_name: &str) -> Option<String> {
    let ext = Path::new(file_name).extension()?.to_str()?;
    let safe = !ext.is_empty() && ext.len() <= 10 && ext.chars().all(|c| c.is_ascii_alphanumeric());
    safe.then(|| format!(".{}", ext.to_ascii_lowercase()))
}

fn random_name() -> String {
    let bytes: [u8; NAME_BYTES] = rand::thread_rng().gen();
    hex::encode(bytes)
}
