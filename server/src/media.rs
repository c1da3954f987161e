use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::Multipart;
use std::path::PathBuf;

/// Error type for avatar upload and storage operations.
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    /// Represents an upload whose content type is not an accepted image format.
    #[error("Content type '{0}' is not an accepted image format")]
    UnsupportedType(String),
    /// Represents a multipart request without the expected avatar field.
    #[error("Multipart field 'avatar' is required")]
    MissingField,
    /// Represents a malformed multipart request.
    #[error("Invalid multipart request")]
    Multipart(#[from] axum::extract::multipart::MultipartError),
    /// Represents a filesystem error.
    #[error("Avatar storage failed: {0}")]
    Io(#[from] std::io::Error),
}

const AVATAR_EXTENSIONS: [&str; 3] = ["jpg", "png", "webp"];

/// Maps an image content type to the file extension used on disk.
pub fn extension_for(content_type: &str) -> Option<&'static str> {
    match content_type {
        "image/jpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

/// Pulls the avatar image out of a multipart upload.
///
/// # Returns
///
/// A `Result` containing the on-disk extension and the image bytes, or an
/// error when the field is missing or not an accepted image format.
pub async fn read_avatar_upload(
    multipart: &mut Multipart,
) -> Result<(&'static str, Bytes), MediaError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("avatar") {
            continue;
        }

        let content_type = field.content_type().unwrap_or_default().to_string();
        let ext = extension_for(&content_type).ok_or(MediaError::UnsupportedType(content_type))?;
        let bytes = field.bytes().await?;
        return Ok((ext, bytes));
    }

    Err(MediaError::MissingField)
}

/// Storage seam for user avatars.
///
/// Each user has at most one stored avatar; storing a new one replaces it.
#[async_trait]
pub trait AvatarStore: Send + Sync {
    /// Stores the avatar for a user and returns its public URL path.
    async fn store(&self, user_id: i32, ext: &str, bytes: &[u8]) -> Result<String, MediaError>;

    /// Removes any stored avatar for a user.
    async fn remove(&self, user_id: i32) -> Result<(), MediaError>;
}

/// Filesystem-backed avatar store writing under `<root>/avatars/`.
///
/// The files are served by the web server under `/media`, so the returned
/// URL paths start with `/media/avatars/`.
pub struct FsAvatarStore {
    root: PathBuf,
}

impl FsAvatarStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn avatar_path(&self, user_id: i32, ext: &str) -> PathBuf {
        self.root
            .join("avatars")
            .join(format!("{}.{}", user_id, ext))
    }
}

#[async_trait]
impl AvatarStore for FsAvatarStore {
    #[tracing::instrument(skip(self, bytes))]
    async fn store(&self, user_id: i32, ext: &str, bytes: &[u8]) -> Result<String, MediaError> {
        tokio::fs::create_dir_all(self.root.join("avatars")).await?;

        // A re-upload may change the extension; drop the other variants so
        // one file per user remains.
        for other in AVATAR_EXTENSIONS.iter().filter(|other| **other != ext) {
            let stale = self.avatar_path(user_id, other);
            if tokio::fs::try_exists(&stale).await? {
                tokio::fs::remove_file(&stale).await?;
            }
        }

        tokio::fs::write(self.avatar_path(user_id, ext), bytes).await?;
        Ok(format!("/media/avatars/{}.{}", user_id, ext))
    }

    #[tracing::instrument(skip(self))]
    async fn remove(&self, user_id: i32) -> Result<(), MediaError> {
        for ext in AVATAR_EXTENSIONS {
            let path = self.avatar_path(user_id, ext);
            if tokio::fs::try_exists(&path).await? {
                tokio::fs::remove_file(&path).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_map_image_content_types_to_extensions() {
        assert_eq!(extension_for("image/jpeg"), Some("jpg"));
        assert_eq!(extension_for("image/png"), Some("png"));
        assert_eq!(extension_for("image/webp"), Some("webp"));
        assert_eq!(extension_for("image/gif"), None);
        assert_eq!(extension_for("application/pdf"), None);
    }

    #[tokio::test]
    async fn can_store_and_remove_avatar() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsAvatarStore::new(dir.path());

        let url = store.store(7, "png", b"png bytes").await.unwrap();

        assert_eq!(url, "/media/avatars/7.png");
        assert!(dir.path().join("avatars/7.png").exists());

        store.remove(7).await.unwrap();
        assert!(!dir.path().join("avatars/7.png").exists());
    }

    #[tokio::test]
    async fn can_replace_avatar_that_changed_extension() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsAvatarStore::new(dir.path());

        store.store(7, "png", b"png bytes").await.unwrap();
        let url = store.store(7, "jpg", b"jpg bytes").await.unwrap();

        assert_eq!(url, "/media/avatars/7.jpg");
        assert!(dir.path().join("avatars/7.jpg").exists());
        assert!(!dir.path().join("avatars/7.png").exists());
    }

    #[tokio::test]
    async fn can_remove_when_nothing_is_stored() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsAvatarStore::new(dir.path());

        assert!(store.remove(7).await.is_ok());
    }
}
