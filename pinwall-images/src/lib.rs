//! Image files on local disk.
//!
//! Images live flat inside one directory under names generated on save. A
//! reference is the name prefixed with `images/`, matching the URL path the
//! directory is served under.

use async_trait::async_trait;
use pinwall_common::{
    model::image::{ImageRef, ImageUpload},
    store::{ImageStore, StoreError},
};
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

pub const IMAGE_REF_PREFIX: &str = "images/";

#[derive(Debug, Error)]
pub enum ImageStoreError {
    #[error("Image directory {} could not be created: {source}", .path.display())]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("Image {image} could not be written: {source}")]
    Write { image: ImageRef, source: io::Error },
    #[error("Image {image} could not be read: {source}")]
    Read { image: ImageRef, source: io::Error },
    #[error("Image {image} could not be deleted: {source}")]
    Delete { image: ImageRef, source: io::Error },
    #[error("Image reference {0} does not point into the image directory")]
    InvalidRef(ImageRef),
}

impl From<ImageStoreError> for StoreError {
    fn from(value: ImageStoreError) -> Self {
        StoreError::images(value)
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct DiskImageStore {
    root: PathBuf,
}

impl DiskImageStore {
    /// Uses `root` as the image directory, creating it if needed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, ImageStoreError> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .map_err(|source| ImageStoreError::CreateDir {
                path: root.clone(),
                source,
            })?;

        Ok(Self { root })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, image: &ImageRef) -> Result<PathBuf, ImageStoreError> {
        let name = image
            .get()
            .strip_prefix(IMAGE_REF_PREFIX)
            .filter(|name| is_plain_file_name(name))
            .ok_or_else(|| ImageStoreError::InvalidRef(image.clone()))?;

        Ok(self.root.join(name))
    }

    pub async fn save_upload(
        &self,
        upload: &ImageUpload,
    ) -> Result<Option<ImageRef>, ImageStoreError> {
        let Some(kind) = upload.kind() else {
            debug!(content_type = %upload.content_type, "Ignoring upload with unsupported type");
            return Ok(None);
        };

        let name = format!("{}.{}", Uuid::new_v4(), kind.extension());
        let image = ImageRef::new(format!("{IMAGE_REF_PREFIX}{name}"));

        fs::write(self.root.join(&name), &upload.bytes)
            .await
            .map_err(|source| ImageStoreError::Write {
                image: image.clone(),
                source,
            })?;

        debug!(%image, len = upload.bytes.len(), "Stored image");
        Ok(Some(image))
    }

    pub async fn read_image(&self, image: &ImageRef) -> Result<Option<Vec<u8>>, ImageStoreError> {
        let path = self.path_of(image)?;

        match fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(ImageStoreError::Read {
                image: image.clone(),
                source,
            }),
        }
    }

    pub async fn delete_image(&self, image: &ImageRef) -> Result<(), ImageStoreError> {
        let path = self.path_of(image)?;

        fs::remove_file(path)
            .await
            .map_err(|source| ImageStoreError::Delete {
                image: image.clone(),
                source,
            })?;

        debug!(%image, "Deleted image");
        Ok(())
    }
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

#[async_trait]
impl ImageStore for DiskImageStore {
    async fn save(&self, upload: &ImageUpload) -> Result<Option<ImageRef>, StoreError> {
        Ok(self.save_upload(upload).await?)
    }

    async fn read(&self, image: &ImageRef) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.read_image(image).await?)
    }

    async fn delete(&self, image: &ImageRef) -> Result<(), StoreError> {
        Ok(self.delete_image(image).await?)
    }
}
