use std::sync::Arc;

use crate::api::{ApiError, GenerationRequest, GenerationResponse};
use crate::config::Config;
use crate::form::{FormInput, PickedFile};
use crate::history::{Clock, GenerationResult, History, ResultId};
use crate::notification::Notification;

pub const NO_INPUT_MESSAGE: &str = "Please enter text or upload an image.";
pub const REQUEST_FAILED_MESSAGE: &str = "An error occurred while processing your request.";

#[derive(Debug)]
pub struct Shell {
    form: FormInput,
    history: History,
    current: Option<ResultId>,
    busy: bool,
    clock: Clock,
    notification: Notification,
}

impl Shell {
    pub fn new(config: &Config) -> Self {
        Self {
            form: FormInput::default(),
            history: History::default(),
            current: None,
            busy: false,
            clock: Clock::default(),
            notification: Notification::with_duration(std::time::Duration::from_millis(
                config.notification_duration_ms,
            )),
        }
    }

    pub fn form(&self) -> &FormInput {
        &self.form
    }

    pub fn set_text(&mut self, text: String) {
        self.form.set_text(text);
    }

    pub fn set_image(&mut self, file: PickedFile) {
        log::info!("image selected: {} ({}, {} bytes)", file.name, file.mime, file.data.len());
        self.form.set_image(file);
    }

    pub fn remove_image(&mut self) {
        self.form.remove_image();
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn current_id(&self) -> Option<ResultId> {
        self.current
    }

    pub fn current(&self) -> Option<&Arc<GenerationResult>> {
        self.current.and_then(|id| self.history.get(id))
    }

    pub fn notification(&self) -> &Notification {
        &self.notification
    }

    pub fn notification_mut(&mut self) -> &mut Notification {
        &mut self.notification
    }

    /// Validates the form and marks the shell busy.
    ///
    /// Returns the request to send, or `None` when nothing should be sent:
    /// either a request is already in flight, or the form is empty (which also
    /// raises a notification).
    pub fn begin_submit(&mut self, now: f64) -> Option<GenerationRequest> {
        if self.busy {
            log::debug!("submit ignored, a request is already in flight");
            return None;
        }
        let request = match &self.form {
            FormInput::Text(text) => GenerationRequest::Text(text.clone()),
            FormInput::Image(file) => GenerationRequest::Image(file.clone()),
            FormInput::Empty => {
                log::warn!("submit rejected: no text or image");
                self.notification.show(NO_INPUT_MESSAGE, now);
                return None;
            }
        };
        log::info!("submitting to {}", request.path());
        self.busy = true;
        Some(request)
    }

    /// Applies the outcome of the request issued by [`Shell::begin_submit`].
    ///
    /// On success the new result is appended and selected. On failure nothing
    /// but the notification changes.
    pub fn finish_submit(
        &mut self,
        outcome: Result<GenerationResponse, ApiError>,
        now: f64,
    ) -> Option<ResultId> {
        self.busy = false;
        match outcome {
            Ok(response) => {
                if let Some(message) = &response.message {
                    log::info!("generation succeeded: {message}");
                }
                let id = self.append(response);
                self.current = Some(id);
                Some(id)
            }
            Err(err) => {
                log::error!("generation failed: {err}");
                let message = match &err {
                    ApiError::Status {
                        message: Some(detail),
                        ..
                    } => format!("{REQUEST_FAILED_MESSAGE} ({detail})"),
                    _ => REQUEST_FAILED_MESSAGE.to_owned(),
                };
                self.notification.show(message, now);
                None
            }
        }
    }

    /// Applies the startup example fetch. Failures are only logged.
    ///
    /// The example only seeds an empty session; if the user already has a
    /// result by the time it arrives it is discarded.
    pub fn finish_example(&mut self, outcome: Result<GenerationResponse, ApiError>) -> Option<ResultId> {
        match outcome {
            Ok(_) if !self.history.is_empty() => {
                log::info!("example model arrived after a generation, discarding it");
                None
            }
            Ok(response) => {
                let id = self.append(response);
                self.current = Some(id);
                log::info!("example model loaded");
                Some(id)
            }
            Err(err) => {
                log::error!("failed to load example model: {err}");
                None
            }
        }
    }

    /// Shows a previous result. No request is made and history is untouched.
    pub fn select(&mut self, id: ResultId) -> bool {
        if self.history.get(id).is_none() {
            log::warn!("selected unknown result {id:?}");
            return false;
        }
        self.current = Some(id);
        true
    }

    fn append(&mut self, response: GenerationResponse) -> ResultId {
        let result = GenerationResult {
            encoded_asset: Arc::from(response.model),
            thumbnail_url: Arc::from(response.thumbnail),
            created_at: self.clock.now(),
        };
        let id = result.id();
        self.history.push(Arc::new(result));
        id
    }
}
