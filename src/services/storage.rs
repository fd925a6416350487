use crate::{
    config::storage::StorageConfig,
    error::{AppError, AppResult},
};
use anyhow::Context;
use std::{path::Path, sync::Arc};
use tokio::fs;
use uuid::Uuid;

pub const MAX_FILES: usize = 10;
pub const MAX_FILE_SIZE: usize = 2 * 1024 * 1024; // 2 MB
const ALLOWED_CONTENT_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/webp"];

/// One photo read from a multipart request, not yet stored.
#[derive(Debug, Clone)]
pub struct PhotoUpload {
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Validate file magic bytes match the declared content type.
fn validate_magic_bytes(data: &[u8], content_type: &str) -> bool {
    match content_type {
        "image/jpeg" => data.len() >= 3 && data[..3] == [0xFF, 0xD8, 0xFF],
        "image/png" => data.len() >= 4 && data[..4] == [0x89, 0x50, 0x4E, 0x47],
        "image/gif" => data.len() >= 4 && data[..4] == [0x47, 0x49, 0x46, 0x38],
        "image/webp" => {
            data.len() >= 12
                && data[..4] == [0x52, 0x49, 0x46, 0x46]
                && data[8..12] == [0x57, 0x45, 0x42, 0x50]
        }
        _ => false,
    }
}

fn extension(content_type: &str) -> &'static str {
    match content_type {
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => "jpg",
    }
}

/// Check every photo before anything is written; one bad file rejects the
/// whole submission.
pub fn validate_photos(photos: &[PhotoUpload]) -> AppResult<()> {
    if photos.len() > MAX_FILES {
        return Err(AppError::Validation(format!("Max {} images", MAX_FILES)));
    }
    for photo in photos {
        if !ALLOWED_CONTENT_TYPES.contains(&photo.content_type.as_str()) {
            return Err(AppError::Validation(format!(
                "Unsupported image type: {}. Allowed: jpeg, png, gif, webp",
                photo.content_type
            )));
        }
        if photo.data.len() > MAX_FILE_SIZE {
            return Err(AppError::PayloadTooLarge("Image exceeds 2MB".to_string()));
        }
        if !validate_magic_bytes(&photo.data, &photo.content_type) {
            return Err(AppError::validation(
                "File content does not match declared content type",
            ));
        }
    }
    Ok(())
}

/// Where issue photos end up: local disk or Supabase Storage.
#[derive(Clone)]
pub struct StorageService {
    config: Arc<StorageConfig>,
    client: reqwest::Client,
}

impl StorageService {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config: Arc::new(config),
            client: reqwest::Client::new(),
        }
    }

    /// Store one validated photo and return its public URL.
    pub async fn store(&self, issue_id: i32, photo: &PhotoUpload) -> anyhow::Result<String> {
        let key = format!(
            "issues/{}/{}.{}",
            issue_id,
            Uuid::new_v4().simple(),
            extension(&photo.content_type)
        );

        match self.config.as_ref() {
            StorageConfig::Local { upload_dir } => {
                let path = Path::new(upload_dir).join(&key);
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)
                        .await
                        .with_context(|| format!("Failed to create {}", parent.display()))?;
                }
                fs::write(&path, &photo.data)
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                Ok(format!("/uploads/{}", key))
            }
            StorageConfig::Supabase {
                url,
                service_role,
                bucket,
            } => {
                self.client
                    .post(format!("{}/storage/v1/object/{}/{}", url, bucket, key))
                    .bearer_auth(service_role)
                    .header("apikey", service_role)
                    .header(reqwest::header::CONTENT_TYPE, &photo.content_type)
                    .header("x-upsert", "true")
                    .body(photo.data.clone())
                    .timeout(std::time::Duration::from_secs(30))
                    .send()
                    .await?
                    .error_for_status()?;
                Ok(format!("{}/storage/v1/object/public/{}/{}", url, bucket, key))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JPEG: [u8; 6] = [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];

    fn photo(content_type: &str, data: Vec<u8>) -> PhotoUpload {
        PhotoUpload {
            content_type: content_type.to_string(),
            data,
        }
    }

    #[test]
    fn magic_bytes() {
        assert!(validate_magic_bytes(&JPEG, "image/jpeg"));
        assert!(validate_magic_bytes(&[0x89, 0x50, 0x4E, 0x47, 0x0D], "image/png"));
        assert!(validate_magic_bytes(
            &[0x52, 0x49, 0x46, 0x46, 0, 0, 0, 0, 0x57, 0x45, 0x42, 0x50],
            "image/webp"
        ));
        assert!(!validate_magic_bytes(&[0x89, 0x50, 0x4E, 0x47], "image/jpeg"));
        assert!(!validate_magic_bytes(&[], "image/gif"));
        assert!(!validate_magic_bytes(&JPEG, "application/pdf"));
    }

    #[test]
    fn accepts_up_to_ten_valid_photos() {
        let photos = vec![photo("image/jpeg", JPEG.to_vec()); MAX_FILES];
        assert!(validate_photos(&photos).is_ok());
    }

    #[test]
    fn rejects_eleventh_photo() {
        let photos = vec![photo("image/jpeg", JPEG.to_vec()); MAX_FILES + 1];
        assert!(validate_photos(&photos).is_err());
    }

    #[test]
    fn rejects_oversized_photo() {
        let mut data = JPEG.to_vec();
        data.resize(MAX_FILE_SIZE + 1, 0);
        assert!(matches!(
            validate_photos(&[photo("image/jpeg", data)]),
            Err(AppError::PayloadTooLarge(_))
        ));
    }

    #[test]
    fn rejects_disallowed_type_even_among_valid_ones() {
        let photos = vec![
            photo("image/jpeg", JPEG.to_vec()),
            photo("image/svg+xml", b"<svg/>".to_vec()),
        ];
        assert!(validate_photos(&photos).is_err());
    }

    #[test]
    fn extension_follows_content_type() {
        assert_eq!(extension("image/webp"), "webp");
        assert_eq!(extension("image/jpeg"), "jpg");
    }
}
