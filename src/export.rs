use eframe::egui;

use crate::thumbnail::{self, ThumbnailError, ThumbnailSource};

pub const MODEL_FILE_NAME: &str = "model.glb";

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("browser refused the download: {0}")]
    Browser(String),
    #[error(transparent)]
    Thumbnail(#[from] ThumbnailError),
}

/// Suggested file name for a thumbnail.
pub fn thumbnail_file_name(source: &ThumbnailSource) -> String {
    match source {
        ThumbnailSource::Inline { mime, .. } => {
            format!("thumbnail.{}", thumbnail::extension_for(mime))
        }
        ThumbnailSource::Remote(url) => url
            .split(['?', '#'])
            .next()
            .and_then(|path| path.rsplit('/').next())
            .filter(|name| name.contains('.'))
            .map_or_else(|| "thumbnail.png".to_owned(), str::to_owned),
    }
}

#[cfg(target_arch = "wasm32")]
mod platform {
    use wasm_bindgen::JsCast;
    use wasm_bindgen::closure::Closure;

    use super::*;
    use crate::viewer::asset::GLB_MIME;

    const REVOKE_DELAY_MS: i32 = 1000;

    fn browser_err(what: &str) -> ExportError {
        ExportError::Browser(what.to_owned())
    }

    pub(crate) fn blob_from_bytes(data: &[u8], mime: &str) -> Result<web_sys::Blob, ExportError> {
        let bytes = js_sys::Uint8Array::new_with_length(data.len() as u32);
        bytes.copy_from(data);
        let parts = js_sys::Array::new();
        parts.push(&bytes.buffer());

        let options = web_sys::BlobPropertyBag::new();
        options.set_type(mime);
        web_sys::Blob::new_with_u8_array_sequence_and_options(&parts, &options)
            .map_err(|_| browser_err("could not create blob"))
    }

    fn click_link(href: &str, file_name: &str) -> Result<(), ExportError> {
        let document = web_sys::window()
            .and_then(|w| w.document())
            .ok_or_else(|| browser_err("no document"))?;
        let anchor = document
            .create_element("a")
            .map_err(|_| browser_err("could not create anchor"))?
            .dyn_into::<web_sys::HtmlAnchorElement>()
            .map_err(|_| browser_err("element is not an anchor"))?;
        anchor.set_href(href);
        anchor.set_download(file_name);
        anchor.click();
        Ok(())
    }

    /// Browsers may start the download after `click()` returns, so the URL
    /// has to outlive the current task.
    fn revoke_later(url: String) {
        let revoke = Closure::once_into_js(move || {
            let _ = web_sys::Url::revoke_object_url(&url);
        });
        let scheduled = web_sys::window().map(|w| {
            w.set_timeout_with_callback_and_timeout_and_arguments_0(revoke.unchecked_ref(), REVOKE_DELAY_MS)
        });
        if !matches!(scheduled, Some(Ok(_))) {
            log::warn!("could not schedule object URL cleanup");
        }
    }

    pub fn download_model(bytes: &[u8]) -> Result<(), ExportError> {
        let blob = blob_from_bytes(bytes, GLB_MIME)?;
        let url = web_sys::Url::create_object_url_with_blob(&blob)
            .map_err(|_| browser_err("could not create object URL"))?;
        let clicked = click_link(&url, MODEL_FILE_NAME);
        revoke_later(url);
        clicked?;
        log::info!("model downloaded as {MODEL_FILE_NAME}");
        Ok(())
    }

    pub fn download_thumbnail(_ctx: &egui::Context, url: &str) -> Result<(), ExportError> {
        let name = thumbnail_file_name(&thumbnail::parse_source(url)?);
        click_link(url, &name)
    }
}

#[cfg(not(target_arch = "wasm32"))]
mod platform {
    use std::path::PathBuf;

    use anyhow::Context as _;

    use super::*;
    use crate::task;

    async fn save(file_name: String, data: Vec<u8>) -> anyhow::Result<Option<PathBuf>> {
        let Some(handle) = rfd::AsyncFileDialog::new()
            .set_file_name(&file_name)
            .save_file()
            .await
        else {
            return Ok(None);
        };
        let path = handle.path().to_path_buf();
        handle
            .write(&data)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(Some(path))
    }

    fn save_in_background(file_name: String, data: Vec<u8>) {
        task::execute(async move {
            match save(file_name, data).await {
                Ok(Some(path)) => log::info!("saved {}", path.display()),
                Ok(None) => log::debug!("save cancelled"),
                Err(err) => log::error!("save failed: {err:#}"),
            }
        });
    }

    pub fn download_model(bytes: &[u8]) -> Result<(), ExportError> {
        save_in_background(MODEL_FILE_NAME.to_owned(), bytes.to_vec());
        Ok(())
    }

    pub fn download_thumbnail(ctx: &egui::Context, url: &str) -> Result<(), ExportError> {
        let source = thumbnail::parse_source(url)?;
        let name = thumbnail_file_name(&source);
        match source {
            ThumbnailSource::Inline { bytes, .. } => save_in_background(name, bytes),
            ThumbnailSource::Remote(url) => ctx.open_url(egui::OpenUrl::new_tab(url)),
        }
        Ok(())
    }
}

#[cfg(target_arch = "wasm32")]
pub(crate) use platform::blob_from_bytes;
pub use platform::{download_model, download_thumbnail};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_thumbnail_name_uses_mime_extension() {
        let source = ThumbnailSource::Inline {
            mime: "image/jpeg".into(),
            bytes: vec![],
        };
        assert_eq!(thumbnail_file_name(&source), "thumbnail.jpg");
    }

    #[test]
    fn remote_thumbnail_keeps_its_file_name() {
        let named = ThumbnailSource::Remote("https://cdn.example.com/previews/chair.webp?v=2".into());
        assert_eq!(thumbnail_file_name(&named), "chair.webp");

        let bare = ThumbnailSource::Remote("https://cdn.example.com/previews/".into());
        assert_eq!(thumbnail_file_name(&bare), "thumbnail.png");
    }

    #[test]
    fn malformed_thumbnail_url_is_reported() {
        let ctx = egui::Context::default();
        assert!(matches!(
            download_thumbnail(&ctx, "data:image/png;base64,@@@"),
            Err(ExportError::Thumbnail(_))
        ));
    }
}
