use std::sync::Arc;

/// A file the user dropped or picked, already read into memory.
#[derive(Debug, Clone, PartialEq)]
pub struct PickedFile {
    pub name: String,
    /// Best-known MIME type; guessed from the file name when the host gave none.
    pub mime: String,
    pub data: Arc<[u8]>,
}

impl PickedFile {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        let name = name.into();
        let mut mime = mime.into();
        if mime.is_empty() {
            mime = mime_guess::from_path(&name)
                .first_or_octet_stream()
                .essence_str()
                .to_owned();
        }
        Self {
            name,
            mime,
            data: data.into(),
        }
    }
}

/// The generation form: text, image, or nothing. Never both.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum FormInput {
    #[default]
    Empty,
    Text(String),
    Image(PickedFile),
}

impl FormInput {
    /// Replaces the input with `text`; any attached image is dropped.
    /// Clearing the text leaves the form empty.
    pub fn set_text(&mut self, text: String) {
        *self = if text.is_empty() {
            match std::mem::take(self) {
                image @ Self::Image(_) => image,
                _ => Self::Empty,
            }
        } else {
            Self::Text(text)
        };
    }

    pub fn set_image(&mut self, file: PickedFile) {
        *self = Self::Image(file);
    }

    /// Detaches the image, if any. Text is left alone.
    pub fn remove_image(&mut self) {
        if matches!(self, Self::Image(_)) {
            *self = Self::Empty;
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Text(text) => text,
            _ => "",
        }
    }

    pub fn image(&self) -> Option<&PickedFile> {
        match self {
            Self::Image(file) => Some(file),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png() -> PickedFile {
        PickedFile::new("chair.png", "", vec![1u8, 2, 3])
    }

    #[test]
    fn mime_is_guessed_from_name() {
        assert_eq!(png().mime, "image/png");
        assert_eq!(PickedFile::new("x.bin", "image/jpeg", Vec::<u8>::new()).mime, "image/jpeg");
    }

    #[test]
    fn image_clears_text_and_text_clears_image() {
        let mut form = FormInput::default();
        form.set_text("a red chair".into());
        assert_eq!(form.text(), "a red chair");

        form.set_image(png());
        assert_eq!(form.text(), "");
        assert!(form.image().is_some());

        form.set_text("a lamp".into());
        assert!(form.image().is_none());
        assert_eq!(form.text(), "a lamp");
    }

    #[test]
    fn clearing_text_does_not_touch_an_image() {
        let mut form = FormInput::Image(png());
        form.set_text(String::new());
        assert!(form.image().is_some());

        let mut form = FormInput::Text("x".into());
        form.set_text(String::new());
        assert!(form.is_empty());
    }

    #[test]
    fn remove_image_only_affects_images() {
        let mut form = FormInput::Text("keep".into());
        form.remove_image();
        assert_eq!(form.text(), "keep");

        let mut form = FormInput::Image(png());
        form.remove_image();
        assert!(form.is_empty());
    }
}
