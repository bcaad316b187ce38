use serde::Deserialize;

use crate::config::Config;
use crate::form::PickedFile;

pub const EXAMPLE_PATH: &str = "/api/get-example-model";
pub const TEXT_PATH: &str = "/api/generate-from-text";
pub const IMAGE_PATH: &str = "/api/generate-from-image";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("server answered {status}{}", suffix(.message))]
    Status { status: u16, message: Option<String> },
    #[error("unexpected response body: {0}")]
    Body(String),
}

fn suffix(message: &Option<String>) -> String {
    message.as_deref().map(|m| format!(": {m}")).unwrap_or_default()
}

impl ApiError {
    /// Builds a status error, lifting the `error` field out of a JSON body when present.
    pub fn from_status(status: u16, body: &str) -> Self {
        #[derive(Deserialize)]
        struct ErrorBody {
            error: String,
        }

        let message = serde_json::from_str::<ErrorBody>(body).ok().map(|b| b.error);
        Self::Status { status, message }
    }
}

/// Payload returned by every endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GenerationResponse {
    /// Base64 of a binary glTF file.
    pub model: String,
    /// URL of a raster preview; usually a `data:` URL.
    pub thumbnail: String,
    #[serde(default)]
    pub message: Option<String>,
}

pub fn parse_response(body: &str) -> Result<GenerationResponse, ApiError> {
    serde_json::from_str(body).map_err(|e| ApiError::Body(e.to_string()))
}

/// What gets posted for one generation.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationRequest {
    Text(String),
    Image(PickedFile),
}

impl GenerationRequest {
    pub fn path(&self) -> &'static str {
        match self {
            Self::Text(_) => TEXT_PATH,
            Self::Image(_) => IMAGE_PATH,
        }
    }

    /// Name of the multipart field carrying the input.
    pub fn field(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Image(_) => "image",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    config: Config,
}

impl ApiClient {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        self.config.endpoint(path)
    }
}

#[cfg(target_arch = "wasm32")]
mod transport {
    use gloo_net::http::{Request, Response};

    use super::*;

    fn transport_err<E: std::fmt::Display>(e: E) -> ApiError {
        ApiError::Transport(e.to_string())
    }

    fn js_err(e: wasm_bindgen::JsValue) -> ApiError {
        ApiError::Transport(format!("{e:?}"))
    }

    async fn read_generation(response: Response) -> Result<GenerationResponse, ApiError> {
        let status = response.status();
        let body = response.text().await.map_err(transport_err)?;
        if !(200..300).contains(&status) {
            return Err(ApiError::from_status(status, &body));
        }
        parse_response(&body)
    }

    impl ApiClient {
        pub async fn fetch_example(&self) -> Result<GenerationResponse, ApiError> {
            let response = Request::get(&self.url(EXAMPLE_PATH))
                .send()
                .await
                .map_err(transport_err)?;
            read_generation(response).await
        }

        pub async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, ApiError> {
            let form = web_sys::FormData::new().map_err(js_err)?;
            match &request {
                GenerationRequest::Text(text) => form.append_with_str(request.field(), text),
                GenerationRequest::Image(file) => {
                    let blob = crate::export::blob_from_bytes(&file.data, &file.mime)
                        .map_err(|e| ApiError::Transport(e.to_string()))?;
                    form.append_with_blob_and_filename(request.field(), &blob, &file.name)
                }
            }
            .map_err(js_err)?;

            let response = Request::post(&self.url(request.path()))
                .body(form)
                .map_err(transport_err)?
                .send()
                .await
                .map_err(transport_err)?;
            read_generation(response).await
        }

        /// Raw bytes behind a URL (used for remote thumbnails).
        pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, ApiError> {
            let response = Request::get(url).send().await.map_err(transport_err)?;
            if !response.ok() {
                let body = response.text().await.unwrap_or_default();
                return Err(ApiError::from_status(response.status(), &body));
            }
            response.binary().await.map_err(transport_err)
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
mod transport {
    use reqwest::blocking::{Client, Response, multipart};

    use super::*;

    fn transport_err<E: std::fmt::Display>(e: E) -> ApiError {
        ApiError::Transport(e.to_string())
    }

    fn read_generation(response: Response) -> Result<GenerationResponse, ApiError> {
        let status = response.status();
        let body = response.text().map_err(transport_err)?;
        if !status.is_success() {
            return Err(ApiError::from_status(status.as_u16(), &body));
        }
        parse_response(&body)
    }

    impl ApiClient {
        pub async fn fetch_example(&self) -> Result<GenerationResponse, ApiError> {
            let response = Client::new()
                .get(self.url(EXAMPLE_PATH))
                .send()
                .map_err(transport_err)?;
            read_generation(response)
        }

        pub async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, ApiError> {
            let url = self.url(request.path());
            let field = request.field();
            let form = match request {
                GenerationRequest::Text(text) => multipart::Form::new().text(field, text),
                GenerationRequest::Image(file) => {
                    let part = multipart::Part::bytes(file.data.to_vec())
                        .file_name(file.name)
                        .mime_str(&file.mime)
                        .map_err(transport_err)?;
                    multipart::Form::new().part(field, part)
                }
            };

            let response = Client::new()
                .post(url)
                .multipart(form)
                .send()
                .map_err(transport_err)?;
            read_generation(response)
        }

        pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, ApiError> {
            let response = Client::new().get(url).send().map_err(transport_err)?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().unwrap_or_default();
                return Err(ApiError::from_status(status.as_u16(), &body));
            }
            let bytes = response.bytes().map_err(transport_err)?;
            Ok(bytes.to_vec())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_routes_to_matching_endpoint() {
        let text = GenerationRequest::Text("a red chair".into());
        assert_eq!(text.path(), TEXT_PATH);
        assert_eq!(text.field(), "text");

        let image = GenerationRequest::Image(PickedFile::new("a.png", "", vec![0u8]));
        assert_eq!(image.path(), IMAGE_PATH);
        assert_eq!(image.field(), "image");
    }

    #[test]
    fn parses_success_body() {
        let body = r#"{"message":"Processing text: chair","model_path":"x.glb","model":"Z2xURg==","thumbnail":"data:image/png;base64,AA=="}"#;
        let response = parse_response(body).unwrap();
        assert_eq!(response.model, "Z2xURg==");
        assert_eq!(response.thumbnail, "data:image/png;base64,AA==");
        assert_eq!(response.message.as_deref(), Some("Processing text: chair"));
    }

    #[test]
    fn missing_model_is_a_body_error() {
        let err = parse_response(r#"{"thumbnail":"x"}"#).unwrap_err();
        assert!(matches!(err, ApiError::Body(_)));
    }

    #[test]
    fn status_error_carries_server_message() {
        let err = ApiError::from_status(500, r#"{"error":"Failed to generate 3D model"}"#);
        assert_eq!(err.to_string(), "server answered 500: Failed to generate 3D model");

        let err = ApiError::from_status(502, "<html>bad gateway</html>");
        assert_eq!(err.to_string(), "server answered 502");
    }

    #[test]
    fn client_builds_urls_from_config() {
        let config = Config {
            api_base_url: "http://gen.local:5000".into(),
            ..Config::default()
        };
        let client = ApiClient::new(&config);
        assert_eq!(client.url(EXAMPLE_PATH), "http://gen.local:5000/api/get-example-model");
    }
}
