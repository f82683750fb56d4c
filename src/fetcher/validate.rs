//! Candidate hygiene: URL cleanup before download, image checks after

use crate::error::DownloadError;
use image::DynamicImage;
use std::collections::HashSet;
use url::Url;

/// Keep absolute http(s) URLs, drop repeats (first occurrence wins) and
/// cap the list at `max`. Returns the kept URLs and how many were discarded.
pub fn prepare_urls<I>(raw: I, max: usize) -> (Vec<String>, usize)
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    let mut kept = Vec::new();
    let mut dropped = 0;

    for candidate in raw {
        let parsed = match Url::parse(candidate.trim()) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => url,
            _ => {
                dropped += 1;
                continue;
            }
        };
        let url = String::from(parsed);
        if !seen.insert(url.clone()) {
            dropped += 1;
            continue;
        }
        if kept.len() == max {
            dropped += 1;
            continue;
        }
        kept.push(url);
    }
    (kept, dropped)
}

/// Reject a declared content type that is clearly not an image.
///
/// A missing header, or the generic `application/octet-stream` many CDNs
/// use, is left for the decoder to judge.
pub fn check_content_type(content_type: Option<&str>) -> Result<(), DownloadError> {
    let Some(raw) = content_type else {
        return Ok(());
    };
    let mime = raw.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    if mime.starts_with("image/") || mime == "application/octet-stream" {
        Ok(())
    } else {
        Err(DownloadError::NotAnImage {
            content_type: raw.to_string(),
        })
    }
}

/// Decode `bytes` and enforce the minimum width/height.
pub fn decode_image(bytes: &[u8], min_dimension: u32) -> Result<DynamicImage, DownloadError> {
    let image =
        image::load_from_memory(bytes).map_err(|e| DownloadError::Undecodable(e.to_string()))?;
    let (width, height) = (image.width(), image.height());
    if width < min_dimension || height < min_dimension {
        return Err(DownloadError::TooSmall {
            width,
            height,
            min: min_dimension,
        });
    }
    Ok(image)
}
