use crate::server::ServerError;
use axum::extract::{FromRequest, Multipart, Request};
use pinwall_common::{
    lifecycle::{CreatePost, UpdatePost},
    model::image::{ImageRef, ImageUpload},
};
use tracing::debug;

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// The multipart body posted by the feed editor.
///
/// `image` is either a file part, or a plain text part carrying the
/// reference of the image the post already has.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct PostForm {
    pub title: String,
    pub content: String,
    pub image: Option<ImageUpload>,
    pub image_ref: Option<ImageRef>,
}

impl PostForm {
    #[must_use]
    pub fn into_create(self) -> CreatePost {
        CreatePost {
            title: self.title,
            content: self.content,
            image: self.image,
        }
    }

    #[must_use]
    pub fn into_update(self) -> UpdatePost {
        UpdatePost {
            title: self.title,
            content: self.content,
            image: self.image,
            existing_image: self.image_ref,
        }
    }
}

impl<S> FromRequest<S> for PostForm
where
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let mut multipart = Multipart::from_request(req, state).await?;
        let mut form = PostForm::default();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().map(str::to_owned);
            let is_file = field.file_name().is_some();
            let content_type = field
                .content_type()
                .unwrap_or(FALLBACK_CONTENT_TYPE)
                .to_owned();

            match name.as_deref() {
                Some("title") => form.title = field.text().await?,
                Some("content") => form.content = field.text().await?,
                Some("image") if is_file => {
                    let bytes = field.bytes().await?;
                    // Browsers send an empty file part when nothing was picked.
                    form.image = (!bytes.is_empty())
                        .then(|| ImageUpload::new(content_type, bytes.to_vec()));
                }
                Some("image") => form.image_ref = ImageRef::parse_supplied(&field.text().await?),
                other => debug!(field = ?other, "Ignoring unknown form field"),
            }
        }

        Ok(form)
    }
}
