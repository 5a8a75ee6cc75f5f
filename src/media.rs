use std::path::PathBuf;

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::{
    constants::{IMAGE_SIGNATURES, RECIPE_IMAGE_DIR},
    error::Error,
};

/// Stores uploaded recipe images on disk and turns stored paths into URLs.
#[derive(Debug, Clone)]
pub struct MediaStorage {
    root: PathBuf,
    url: String,
}

impl MediaStorage {
    pub fn new(root: PathBuf, url: String) -> Self {
        Self { root, url }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.url, path)
    }

    /// Whether `data` is just the public URL of the image stored at `path`.
    pub fn is_url_of(&self, data: &str, path: &str) -> bool {
        data.strip_prefix(&self.url) == Some(path)
    }

    /// Decodes a base64 payload (optionally a data URI), writes it under the
    /// recipe image dir and returns the stored relative path.
    pub async fn save_image(&self, data: &str) -> Result<String, Error> {
        let (bytes, extension) = decode_image(data)?;
        let path = format!("{RECIPE_IMAGE_DIR}/{}.{extension}", uuid::Uuid::new_v4().simple());

        let dir = self.root.join(RECIPE_IMAGE_DIR);
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            log::error!("Failed to create {}: {e}", dir.display());
            Error::field("image", "Could not store the image")
        })?;
        tokio::fs::write(self.root.join(&path), bytes)
            .await
            .map_err(|e| {
                log::error!("Failed to write {path}: {e}");
                Error::field("image", "Could not store the image")
            })?;

        log::debug!("Stored image {path}");
        Ok(path)
    }

    /// Best effort; a missing file is not an error.
    pub async fn delete(&self, path: &str) {
        if path.is_empty() || path.contains("..") {
            return;
        }
        if let Err(e) = tokio::fs::remove_file(self.root.join(path)).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("Failed to remove {path}: {e}");
            }
        }
    }
}

/// Decodes `data:image/...;base64,<payload>` or a bare base64 payload and
/// sniffs the image type from its leading bytes.
pub fn decode_image(data: &str) -> Result<(Vec<u8>, &'static str), Error> {
    let payload = match data.split_once(";base64,") {
        Some((_header, payload)) => payload,
        None => data,
    };

    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|_| Error::field("image", "Upload a valid image"))?;

    match image_extension(&bytes) {
        Some(extension) => Ok((bytes, extension)),
        None => Err(Error::field(
            "image",
            "Upload a valid image. The file you uploaded was either not an image or a corrupted image",
        )),
    }
}

fn image_extension(bytes: &[u8]) -> Option<&'static str> {
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return Some("webp");
    }

    IMAGE_SIGNATURES
        .iter()
        .find(|(signature, _)| bytes.starts_with(signature))
        .map(|(_, extension)| *extension)
}
