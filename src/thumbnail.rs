use std::collections::HashMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use eframe::egui;

use crate::api::{ApiClient, ApiError};
use crate::history::{GenerationResult, ResultId};
use crate::task::{self, Pending, TaskState};

#[derive(Debug, thiserror::Error)]
pub enum ThumbnailError {
    #[error("malformed data URL")]
    DataUrl,
    #[error("thumbnail is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("thumbnail could not be decoded: {0}")]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Fetch(#[from] ApiError),
}

/// Where a thumbnail's pixels come from.
#[derive(Debug, Clone, PartialEq)]
pub enum ThumbnailSource {
    Inline { mime: String, bytes: Vec<u8> },
    Remote(String),
}

/// Splits a thumbnail URL into inline bytes or a remote location.
///
/// Only base64 `data:` URLs are inlined; anything else is fetched.
pub fn parse_source(url: &str) -> Result<ThumbnailSource, ThumbnailError> {
    let Some(rest) = url.strip_prefix("data:") else {
        return Ok(ThumbnailSource::Remote(url.to_owned()));
    };
    let (meta, payload) = rest.split_once(',').ok_or(ThumbnailError::DataUrl)?;
    let mime = meta.strip_suffix(";base64").ok_or(ThumbnailError::DataUrl)?;
    let mime = if mime.is_empty() { "application/octet-stream" } else { mime };
    let payload: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    Ok(ThumbnailSource::Inline {
        mime: mime.to_owned(),
        bytes: STANDARD.decode(payload)?,
    })
}

pub fn decode_image(bytes: &[u8]) -> Result<egui::ColorImage, ThumbnailError> {
    let image = image::load_from_memory(bytes)?.to_rgba8();
    let size = [image.width() as usize, image.height() as usize];
    Ok(egui::ColorImage::from_rgba_unmultiplied(size, image.as_raw()))
}

/// File extension for a raster MIME type.
pub fn extension_for(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        other => mime_guess::get_mime_extensions_str(other)
            .and_then(|exts| exts.first().copied())
            .unwrap_or("png"),
    }
}

enum Slot {
    Ready(egui::TextureHandle),
    Fetching(Pending<Result<Vec<u8>, ApiError>>),
    Failed,
}

/// Textures for every result shown so far, keyed by result identity.
#[derive(Default)]
pub struct ThumbnailCache {
    slots: HashMap<ResultId, Slot>,
}

impl ThumbnailCache {
    /// The texture for `result`, or `None` while it is still on its way (or broken).
    pub fn texture(
        &mut self,
        ctx: &egui::Context,
        api: &ApiClient,
        result: &GenerationResult,
    ) -> Option<&egui::TextureHandle> {
        let id = result.id();
        let slot = match self.slots.remove(&id) {
            Some(Slot::Fetching(mut pending)) => match pending.poll() {
                TaskState::Running => {
                    ctx.request_repaint_after(std::time::Duration::from_millis(100));
                    Slot::Fetching(pending)
                }
                TaskState::Ready(Ok(bytes)) => upload(ctx, id, &bytes),
                TaskState::Ready(Err(err)) => {
                    log::warn!("thumbnail fetch for {id:?} failed: {err}");
                    Slot::Failed
                }
                TaskState::Lost => Slot::Failed,
            },
            Some(slot) => slot,
            None => match parse_source(&result.thumbnail_url) {
                Ok(ThumbnailSource::Inline { bytes, .. }) => upload(ctx, id, &bytes),
                Ok(ThumbnailSource::Remote(url)) => {
                    let api = api.clone();
                    Slot::Fetching(task::spawn(async move { api.fetch_bytes(&url).await }))
                }
                Err(err) => {
                    log::warn!("thumbnail of {id:?} is unusable: {err}");
                    Slot::Failed
                }
            },
        };
        self.slots.insert(id, slot);

        match self.slots.get(&id) {
            Some(Slot::Ready(texture)) => Some(texture),
            _ => None,
        }
    }
}

fn upload(ctx: &egui::Context, id: ResultId, bytes: &[u8]) -> Slot {
    match decode_image(bytes) {
        Ok(image) => Slot::Ready(ctx.load_texture(
            format!("thumbnail-{}", id.0),
            image,
            egui::TextureOptions::LINEAR,
        )),
        Err(err) => {
            log::warn!("thumbnail of {id:?} could not be decoded: {err}");
            Slot::Failed
        }
    }
}
