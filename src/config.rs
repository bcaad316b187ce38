use serde::Deserialize;

pub const API_URL_VAR: &str = "PRISM_API_URL";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub notification_duration_ms: u64,
    /// Radians added to the model spin per rendered frame while idle.
    pub auto_rotate_step: f32,
    pub drag_grace_ms: u64,
    /// Largest dimension of a model after normalisation, in world units.
    pub target_size: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: default_base_url().to_owned(),
            notification_duration_ms: 4000,
            auto_rotate_step: 0.005,
            drag_grace_ms: 150,
            target_size: 3.0,
        }
    }
}

#[cfg(target_arch = "wasm32")]
fn default_base_url() -> &'static str {
    match option_env!("PRISM_API_URL") {
        Some(url) => url,
        None => "",
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn default_base_url() -> &'static str {
    "http://localhost:5000"
}

impl Config {
    /// Defaults, with the base URL overridden from the environment when set.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var(API_URL_VAR) {
            if !url.trim().is_empty() {
                config.api_base_url = url.trim().to_owned();
            }
        }
        config
    }

    #[cfg(target_arch = "wasm32")]
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Joins the base URL and an absolute API path without doubling slashes.
    pub fn endpoint(&self, path: &str) -> String {
        let base = self.api_base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{base}/{path}")
    }

    pub fn drag_grace_secs(&self) -> f64 {
        self.drag_grace_ms as f64 / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_without_double_slash() {
        let config = Config {
            api_base_url: "http://localhost:5000/".into(),
            ..Config::default()
        };
        assert_eq!(
            config.endpoint("/api/generate-from-text"),
            "http://localhost:5000/api/generate-from-text"
        );
    }

    #[test]
    fn empty_base_yields_same_origin_path() {
        let config = Config {
            api_base_url: String::new(),
            ..Config::default()
        };
        assert_eq!(config.endpoint("/api/get-example-model"), "/api/get-example-model");
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: Config = serde_json::from_str(r#"{ "drag_grace_ms": 300 }"#).unwrap();
        assert_eq!(config.drag_grace_ms, 300);
        assert_eq!(config.notification_duration_ms, 4000);
        assert_eq!(config.target_size, 3.0);
    }
}
