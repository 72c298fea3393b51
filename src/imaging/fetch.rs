use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
use reqwest::Client;
use tracing::{debug, warn};

use crate::imaging::isolate::isolate_subject;
use crate::utils::http::build_http_client;
use crate::utils::text::truncate_for_log;

pub const PLACEHOLDER_SIZE: u32 = 400;
pub const PLACEHOLDER_COLOR: Rgb<u8> = Rgb([240, 240, 240]);

const ERROR_BODY_LIMIT: usize = 300;

#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>>;
}

/// Plain GET with the client-wide timeout. No retries, no auth.
pub struct HttpImageFetcher {
    client: Client,
}

impl HttpImageFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(HttpImageFetcher {
            client: build_http_client(timeout)?,
        })
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await.map_err(|err| {
            anyhow!(
                "Failed to fetch image {url}: {err} (timeout={}, connect={})",
                err.is_timeout(),
                err.is_connect()
            )
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "Image download failed for {url} with status {}: {}",
                status,
                truncate_for_log(&body, ERROR_BODY_LIMIT)
            ));
        }

        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("Failed to read image bytes from {url}"))?;
        Ok(bytes.to_vec())
    }
}

pub fn placeholder_image() -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(
        PLACEHOLDER_SIZE,
        PLACEHOLDER_SIZE,
        PLACEHOLDER_COLOR,
    ))
}

/// Downloads and decodes an image, optionally isolating the garment. Errors
/// are returned so callers can pick their own degradation.
pub async fn try_fetch_image(
    fetcher: &dyn ImageFetcher,
    url: &str,
    isolate: bool,
) -> Result<DynamicImage> {
    let bytes = fetcher.fetch_bytes(url).await?;
    let image = image::load_from_memory(&bytes)
        .with_context(|| format!("Failed to decode image from {url}"))?;
    let (width, height) = image.dimensions();
    debug!(url = %url, width, height, isolate, "Image fetched");

    if isolate {
        Ok(isolate_subject(&image))
    } else {
        Ok(DynamicImage::ImageRgb8(image.to_rgb8()))
    }
}

/// Like [`try_fetch_image`] but never fails: a broken download becomes the
/// neutral placeholder.
pub async fn fetch_image(fetcher: &dyn ImageFetcher, url: &str, isolate: bool) -> DynamicImage {
    match try_fetch_image(fetcher, url, isolate).await {
        Ok(image) => image,
        Err(err) => {
            warn!("Using placeholder image for {}: {:#}", url, err);
            placeholder_image()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{png_bytes, solid_image, StaticFetcher};

    #[tokio::test]
    async fn broken_download_yields_placeholder() {
        let fetcher = StaticFetcher::default().fail("https://img/timeout.jpg", "operation timed out");
        let image = fetch_image(&fetcher, "https://img/timeout.jpg", false).await;
        assert_eq!(image.dimensions(), (PLACEHOLDER_SIZE, PLACEHOLDER_SIZE));
        assert_eq!(image.to_rgb8().get_pixel(10, 10), &PLACEHOLDER_COLOR);
    }

    #[tokio::test]
    async fn undecodable_bytes_yield_placeholder() {
        let fetcher = StaticFetcher::default().serve("https://img/html", b"<html>".to_vec());
        let image = fetch_image(&fetcher, "https://img/html", true).await;
        assert_eq!(image.dimensions(), (PLACEHOLDER_SIZE, PLACEHOLDER_SIZE));
        assert!(try_fetch_image(&fetcher, "https://img/html", false).await.is_err());
    }

    #[tokio::test]
    async fn plain_fetch_flattens_to_rgb() {
        let fetcher = StaticFetcher::default().serve(
            "https://img/red.png",
            png_bytes(&solid_image(6, 4, [200, 0, 0, 255])),
        );
        let image = fetch_image(&fetcher, "https://img/red.png", false).await;
        assert!(matches!(image, DynamicImage::ImageRgb8(_)));
        assert_eq!(image.dimensions(), (6, 4));
    }
}
