//! The injectable external collaborators: image-info loading, tile
//! fetching, and per-back-end image decoding. The core only depends on
//! these traits; `reqwest-fetcher` and `image-decode` are optional, bundled
//! default implementations so the crate is runnable end-to-end without an
//! embedding project.

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::tile_grid::ImageInfo;

#[async_trait]
pub trait ImageInfoLoader: Send + Sync {
    async fn load(&self, resource_id: &str) -> Result<ImageInfo, Error>;
}

#[async_trait]
pub trait TileFetcher: Send + Sync {
    async fn fetch(&self, url: &str, cancel: CancellationToken) -> Result<Bytes, Error>;
}

/// Decoded pixel data, always normalized to RGBA8 regardless of the source
/// codec — the crate's own internal representation, not a codec's native one.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

pub trait TileDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedImage, Error>;
}

/// A finished render, in one of the forms a caller may want. The int-array
/// back-end produces `IntArray`; under `image-decode` it can also be
/// converted to `Bitmap`. `RawRgba` is always available and is what
/// `IntArray` is built from.
#[derive(Debug, Clone)]
pub enum RenderOutput {
    RawRgba { width: u32, height: u32, pixels: Vec<u8> },
    IntArray { width: u32, height: u32, pixels: Vec<u32> },
    #[cfg(feature = "image-decode")]
    Bitmap(image::RgbaImage),
}

impl RenderOutput {
    pub fn width(&self) -> u32 {
        match self {
            RenderOutput::RawRgba { width, .. } => *width,
            RenderOutput::IntArray { width, .. } => *width,
            #[cfg(feature = "image-decode")]
            RenderOutput::Bitmap(image) => image.width(),
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            RenderOutput::RawRgba { height, .. } => *height,
            RenderOutput::IntArray { height, .. } => *height,
            #[cfg(feature = "image-decode")]
            RenderOutput::Bitmap(image) => image.height(),
        }
    }

    #[cfg(feature = "image-decode")]
    pub fn into_bitmap(self) -> image::RgbaImage {
        match self {
            RenderOutput::Bitmap(image) => image,
            RenderOutput::RawRgba { width, height, pixels } => {
                image::RgbaImage::from_raw(width, height, pixels)
                    .expect("pixel buffer length must match width*height*4")
            }
            RenderOutput::IntArray { width, height, pixels } => {
                let mut raw = Vec::with_capacity(pixels.len() * 4);
                for px in pixels {
                    raw.extend_from_slice(&px.to_le_bytes());
                }
                image::RgbaImage::from_raw(width, height, raw)
                    .expect("pixel buffer length must match width*height*4")
            }
        }
    }
}

/// Builds the IIIF Image API (v2/v3) tile URL for a resource region:
/// `{baseId}/{region}/{size}/0/default.jpg`, size expressed width-based
/// (`w,`).
pub fn iiif_tile_url(base_id: &str, x: u32, y: u32, w: u32, h: u32, out_width: u32) -> String {
    format!("{}/{},{},{},{}/{},/0/default.jpg", base_id.trim_end_matches('/'), x, y, w, h, out_width)
}

#[cfg(feature = "reqwest-fetcher")]
pub struct ReqwestTileFetcher {
    client: reqwest::Client,
    headers: Vec<(String, String)>,
}

#[cfg(feature = "reqwest-fetcher")]
impl ReqwestTileFetcher {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new(), headers: Vec::new() }
    }

    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }
}

#[cfg(feature = "reqwest-fetcher")]
impl Default for ReqwestTileFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "reqwest-fetcher")]
#[async_trait]
impl TileFetcher for ReqwestTileFetcher {
    async fn fetch(&self, url: &str, cancel: CancellationToken) -> Result<Bytes, Error> {
        let mut request = self.client.get(url);
        for (key, value) in &self.headers {
            request = request.header(key, value);
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::TileFetch {
                url: url.to_string(),
                source: Box::new(std::io::Error::new(std::io::ErrorKind::Interrupted, "fetch cancelled")),
            }),
            result = request.send() => {
                let response = result.map_err(|e| Error::TileFetch { url: url.to_string(), source: Box::new(e) })?;
                let response = response.error_for_status().map_err(|e| Error::TileFetch { url: url.to_string(), source: Box::new(e) })?;
                response.bytes().await.map_err(|e| Error::TileFetch { url: url.to_string(), source: Box::new(e) })
            }
        }
    }
}

#[cfg(feature = "image-decode")]
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCrateDecoder;

#[cfg(feature = "image-decode")]
impl TileDecoder for ImageCrateDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedImage, Error> {
        let image = image::load_from_memory(bytes)
            .map_err(|e| Error::TileFetch { url: String::new(), source: Box::new(e) })?
            .to_rgba8();
        Ok(DecodedImage { width: image.width(), height: image.height(), pixels: image.into_raw() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_iiif_level1_tile_url() {
        let url = iiif_tile_url("https://example.org/iiif/map1", 0, 0, 256, 256, 256);
        assert_eq!(url, "https://example.org/iiif/map1/0,0,256,256/256,/0/default.jpg");
    }
}
