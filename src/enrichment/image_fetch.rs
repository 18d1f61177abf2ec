use super::error::FetchError;
use super::oracle::ImagePayload;
use anyhow::Result;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;

const FALLBACK_MEDIA_TYPE: &str = "image/jpeg";

/// Downloads the image behind a work item's URL.
pub trait ImageFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<ImagePayload, FetchError>;
}

pub struct HttpImageFetcher {
    client: Client,
}

impl HttpImageFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

impl ImageFetcher for HttpImageFetcher {
    fn fetch(&self, url: &str) -> Result<ImagePayload, FetchError> {
        let response = self.client.get(url).send().map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        let declared = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Network(e.to_string())
            }
        })?;

        let media_type = resolve_media_type(declared.as_deref(), &bytes, url);
        Ok(ImagePayload {
            bytes: bytes.to_vec(),
            media_type,
        })
    }
}

/// Picks the media type to declare: the response header when it names an
/// image, then the sniffed content, then the URL extension, then JPEG.
pub fn resolve_media_type(declared: Option<&str>, bytes: &[u8], url: &str) -> String {
    if let Some(declared) = declared {
        let essence = declared
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_lowercase();
        if essence.starts_with("image/") {
            return essence;
        }
    }

    if let Some(kind) = infer::get(bytes) {
        if kind.mime_type().starts_with("image/") {
            return kind.mime_type().to_string();
        }
    }

    let path = url
        .split(['?', '#'])
        .next()
        .unwrap_or(url)
        .to_lowercase();
    let by_extension = [
        (".png", "image/png"),
        (".jpg", "image/jpeg"),
        (".jpeg", "image/jpeg"),
        (".webp", "image/webp"),
        (".gif", "image/gif"),
    ]
    .into_iter()
    .find(|(ext, _)| path.ends_with(ext))
    .map(|(_, mime)| mime);

    by_extension.unwrap_or(FALLBACK_MEDIA_TYPE).to_string()
}
