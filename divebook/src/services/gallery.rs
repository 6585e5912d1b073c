use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::{deserialize_id, Entity, Resource};
use crate::api::{ApiClient, Auth, ClientError};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryImage {
    #[serde(
        default,
        alias = "_id",
        deserialize_with = "deserialize_id",
        skip_serializing_if = "String::is_empty"
    )]
    pub id: String,
    #[serde(alias = "imageUrl", alias = "url")]
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Entity for GalleryImage {
    const COLLECTION: &'static str = "/gallery/";
    const SLUG: &'static str = "gallery";
    const LABEL: &'static str = "Image";

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UploadError {
    #[error("no image data received")]
    Empty,
    #[error("unsupported file type {content_type}; only images can be uploaded")]
    NotAnImage { content_type: String },
}

/// A validated image file on its way to the backend.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    file_name: String,
    content_type: String,
    bytes: Bytes,
    pub title: Option<String>,
    pub caption: Option<String>,
}

impl ImageUpload {
    /// Uses the declared content type when present, otherwise guesses from
    /// the file name. Anything that is not `image/*` is refused.
    pub fn new(
        file_name: &str,
        declared_type: Option<&str>,
        bytes: Bytes,
    ) -> Result<Self, UploadError> {
        if bytes.is_empty() {
            return Err(UploadError::Empty);
        }

        let content_type = declared_type
            .map(str::trim)
            .filter(|value| !value.is_empty() && *value != "application/octet-stream")
            .map(str::to_ascii_lowercase)
            .unwrap_or_else(|| {
                mime_guess::from_path(file_name)
                    .first_or_octet_stream()
                    .essence_str()
                    .to_string()
            });

        if !content_type.starts_with("image/") {
            return Err(UploadError::NotAnImage { content_type });
        }

        let file_name = match file_name.trim() {
            "" => String::from("upload"),
            name => name.to_string(),
        };

        Ok(Self {
            file_name,
            content_type,
            bytes,
            title: None,
            caption: None,
        })
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    fn into_form(self, endpoint: &str) -> Result<Form, ClientError> {
        let part = Part::bytes(self.bytes.to_vec())
            .file_name(self.file_name)
            .mime_str(&self.content_type)
            .map_err(|source| ClientError::Transport {
                endpoint: endpoint.to_string(),
                source,
            })?;

        let mut form = Form::new().part("image", part);
        if let Some(title) = self.title {
            form = form.text("title", title);
        }
        if let Some(caption) = self.caption {
            form = form.text("caption", caption);
        }
        Ok(form)
    }
}

pub struct Gallery {
    client: ApiClient,
    images: Resource<GalleryImage>,
}

impl Gallery {
    pub fn new(client: ApiClient) -> Self {
        Self {
            images: Resource::new(client.clone()),
            client,
        }
    }

    pub async fn list(&self) -> Result<Vec<GalleryImage>, ClientError> {
        self.images.list().await
    }

    pub async fn upload(
        &self,
        upload: ImageUpload,
        auth: Auth<'_>,
    ) -> Result<GalleryImage, ClientError> {
        let form = upload.into_form(GalleryImage::COLLECTION)?;
        self.client
            .post_multipart(GalleryImage::COLLECTION, form, auth)
            .await
    }

    pub async fn delete(&self, id: &str, auth: Auth<'_>) -> Result<(), ClientError> {
        self.images.delete(id, auth).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::time::Duration;

    use anyhow::Result;
    use bytes::Bytes;
    use mockito::Matcher;

    use super::{Gallery, ImageUpload, UploadError};
    use crate::api::{ApiClient, Auth};

    #[test]
    fn content_type_is_guessed_from_file_name() {
        let upload = ImageUpload::new("reef.JPG", None, Bytes::from_static(b"\xff\xd8")).unwrap();
        assert_eq!(upload.content_type(), "image/jpeg");

        let declared =
            ImageUpload::new("blob", Some("image/webp"), Bytes::from_static(b"RIFF")).unwrap();
        assert_eq!(declared.content_type(), "image/webp");
    }

    #[test]
    fn non_images_and_empty_files_are_refused() {
        assert_eq!(
            ImageUpload::new("notes.pdf", None, Bytes::from_static(b"%PDF")).unwrap_err(),
            UploadError::NotAnImage {
                content_type: "application/pdf".into()
            }
        );
        assert_eq!(
            ImageUpload::new("reef.png", None, Bytes::new()).unwrap_err(),
            UploadError::Empty
        );
    }

    #[tokio::test]
    async fn upload_sends_multipart_with_bearer() -> Result<()> {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/gallery/")
            .match_header("authorization", "Bearer admin-token")
            .match_header(
                "content-type",
                Matcher::Regex("^multipart/form-data; boundary=".into()),
            )
            .match_body(Matcher::Regex("name=\"caption\"".into()))
            .with_status(201)
            .with_body(r#"{"_id": "g1", "imageUrl": "https://cdn.test/reef.png"}"#)
            .create_async()
            .await;

        let gallery = Gallery::new(ApiClient::new(&server.url(), Duration::from_secs(5))?);
        let mut upload = ImageUpload::new("reef.png", None, Bytes::from_static(b"\x89PNG"))?;
        upload.caption = Some("House reef at dawn".into());

        let image = gallery.upload(upload, Auth::Token("admin-token")).await?;

        assert_eq!(image.id, "g1");
        assert_eq!(image.image, "https://cdn.test/reef.png");
        mock.assert_async().await;
        Ok(())
    }
}
