use serde::Deserialize;
use tracing::{debug, error, warn};

use crate::client::LarkClient;

/// Fetched bytes at or below this size are treated as placeholder images
/// and never uploaded.
pub const MIN_IMAGE_BYTES: usize = 1024;

/// Pixel dimensions read from an image header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// An image uploaded to the platform, with the locally sniffed dimensions
/// attached to the server's reference.
#[derive(Debug, Clone)]
pub struct ImageAsset {
    pub image_key: String,
    pub width: u32,
    pub height: u32,
    pub size_bytes: usize,
}

/// Reads width and height from the header bytes of a PNG, JPEG, GIF or WebP
/// image without decoding the pixel data.
pub fn sniff_dimensions(data: &[u8]) -> Option<Dimensions> {
    if data.len() >= 24 && data.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some(Dimensions {
            width: u32::from_be_bytes([data[16], data[17], data[18], data[19]]),
            height: u32::from_be_bytes([data[20], data[21], data[22], data[23]]),
        });
    }
    if data.len() >= 10 && data.starts_with(b"GIF8") {
        return Some(Dimensions {
            width: u16::from_le_bytes([data[6], data[7]]) as u32,
            height: u16::from_le_bytes([data[8], data[9]]) as u32,
        });
    }
    if data.starts_with(&[0xFF, 0xD8]) {
        return jpeg_dimensions(data);
    }
    if data.len() >= 30 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
        return webp_dimensions(data);
    }
    None
}

/// Walks JPEG segments until a start-of-frame marker carries the frame size.
fn jpeg_dimensions(data: &[u8]) -> Option<Dimensions> {
    let mut pos = 2;
    while pos + 9 <= data.len() {
        if data[pos] != 0xFF {
            return None;
        }
        let marker = data[pos + 1];
        // Fill byte before the real marker.
        if marker == 0xFF {
            pos += 1;
            continue;
        }
        // RSTn / SOI / EOI carry no length field.
        if (0xD0..=0xD9).contains(&marker) {
            pos += 2;
            continue;
        }
        let len = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        match marker {
            0xC0..=0xC3 | 0xC5..=0xC7 | 0xC9..=0xCB | 0xCD..=0xCF => {
                return Some(Dimensions {
                    width: u16::from_be_bytes([data[pos + 7], data[pos + 8]]) as u32,
                    height: u16::from_be_bytes([data[pos + 5], data[pos + 6]]) as u32,
                });
            }
            _ => pos += 2 + len,
        }
    }
    None
}

fn webp_dimensions(data: &[u8]) -> Option<Dimensions> {
    match &data[12..16] {
        b"VP8X" => Some(Dimensions {
            width: 1 + u32::from_le_bytes([data[24], data[25], data[26], 0]),
            height: 1 + u32::from_le_bytes([data[27], data[28], data[29], 0]),
        }),
        b"VP8 " if data[23..26] == [0x9D, 0x01, 0x2A] => Some(Dimensions {
            width: (u16::from_le_bytes([data[26], data[27]]) & 0x3FFF) as u32,
            height: (u16::from_le_bytes([data[28], data[29]]) & 0x3FFF) as u32,
        }),
        b"VP8L" if data[20] == 0x2F => {
            let bits = u32::from_le_bytes([data[21], data[22], data[23], data[24]]);
            Some(Dimensions {
                width: (bits & 0x3FFF) + 1,
                height: ((bits >> 14) & 0x3FFF) + 1,
            })
        }
        _ => None,
    }
}

impl LarkClient {
    /// Fetches an image from `url` and re-uploads it to the platform,
    /// returning the platform image reference with the sniffed dimensions
    /// attached.
    ///
    /// Returns `None` when the fetch fails, the body is [`MIN_IMAGE_BYTES`]
    /// or smaller, the header format is not recognized, or the upload is
    /// rejected; the failure is logged and nothing propagates.
    pub async fn upload_image_from_url(
        &self,
        url: &str,
        file_name: Option<&str>,
    ) -> Option<ImageAsset> {
        let response = match self.http.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, url, "image fetch failed");
                return None;
            }
        };
        if !response.status().is_success() {
            error!(status = %response.status(), url, "image fetch rejected");
            return None;
        }
        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(error = %e, url, "image fetch body read failed");
                return None;
            }
        };

        if bytes.len() <= MIN_IMAGE_BYTES {
            warn!(size = bytes.len(), url, "image skipped: too small");
            return None;
        }

        let dimensions = match sniff_dimensions(&bytes) {
            Some(dimensions) => dimensions,
            None => {
                warn!(url, "image skipped: unrecognized header format");
                return None;
            }
        };

        let token = match self.tenant_access_token().await {
            Ok(Some(token)) => token,
            Ok(None) => {
                warn!("upload aborted: no access token");
                return None;
            }
            Err(e) => {
                error!(error = %e, "upload aborted: token fetch failed");
                return None;
            }
        };

        let size_bytes = bytes.len();
        let part = match reqwest::multipart::Part::bytes(bytes.to_vec())
            .file_name(file_name.unwrap_or("unnamed").to_string())
            .mime_str("image/webp")
        {
            Ok(part) => part,
            Err(e) => {
                error!(error = %e, "image part build failed");
                return None;
            }
        };
        let form = reqwest::multipart::Form::new()
            .part("image", part)
            .text("image_type", "message");

        let upload_url = format!("{}/im/v1/images", self.config.base_url);
        let response = match self
            .http
            .post(&upload_url)
            .header("Authorization", format!("Bearer {token}"))
            .multipart(form)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "image upload failed");
                return None;
            }
        };

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            error!(%status, body = %text, "image upload rejected");
            return None;
        }

        #[derive(Deserialize)]
        struct UploadEnvelope {
            #[serde(default)]
            code: i64,
            #[serde(default)]
            msg: String,
            data: Option<UploadData>,
        }

        #[derive(Deserialize)]
        struct UploadData {
            image_key: String,
        }

        let envelope: UploadEnvelope = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!(error = %e, body = %text, "image upload response decode failed");
                return None;
            }
        };
        if envelope.code != 0 {
            error!(code = envelope.code, msg = %envelope.msg, "image upload returned error");
            return None;
        }
        let data = match envelope.data {
            Some(data) => data,
            None => {
                error!("image upload response carried no data");
                return None;
            }
        };

        debug!(image_key = %data.image_key, size = size_bytes, "image uploaded");
        Some(ImageAsset {
            image_key: data.image_key,
            width: dimensions.width,
            height: dimensions.height,
            size_bytes,
        })
    }
}
