use axum::http::{HeaderValue, Method};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

use crate::{artifacts, error::ConfigError, target::Target};

pub const CONFIG_ENV: &str = "PREDICTOR_CONFIG";
pub const PORT_ENV: &str = "PORT";
pub const MODEL_DIR_ENV: &str = "MODEL_DIR";

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub model_dir: PathBuf,
    pub targets: Vec<Target>,
    pub cors: CorsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            model_dir: PathBuf::from("output"),
            targets: Target::SERVED.to_vec(),
            cors: CorsConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Ok(artifacts::read_json(path)?)
    }

    /// File named by `PREDICTOR_CONFIG` (defaults otherwise), then
    /// `PORT` and `MODEL_DIR` overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(Path::new(&path))?,
            None => Self::default(),
        };
        base.with_overrides(|key| std::env::var(key).ok())
    }

    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(port) = lookup(PORT_ENV) {
            self.port = port.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                var: PORT_ENV,
                value: port.clone(),
            })?;
        }
        if let Some(dir) = lookup(MODEL_DIR_ENV) {
            self.model_dir = PathBuf::from(dir);
        }
        Ok(self)
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CorsOrigins {
    Any,
    List(Vec<String>),
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Options,
}

impl From<HttpMethod> for Method {
    fn from(m: HttpMethod) -> Self {
        match m {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Delete => Method::DELETE,
            HttpMethod::Options => Method::OPTIONS,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct CorsConfig {
    pub origins: CorsOrigins,
    pub methods: Vec<HttpMethod>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            origins: CorsOrigins::Any,
            methods: vec![HttpMethod::Get, HttpMethod::Post, HttpMethod::Options],
        }
    }
}

impl CorsConfig {
    pub fn layer(&self) -> Result<CorsLayer, ConfigError> {
        let origins = match &self.origins {
            CorsOrigins::Any => AllowOrigin::any(),
            CorsOrigins::List(list) => AllowOrigin::list(
                list.iter()
                    .map(|o| {
                        HeaderValue::from_str(o).map_err(|_| ConfigError::InvalidOrigin(o.clone()))
                    })
                    .collect::<Result<Vec<_>, _>>()?,
            ),
        };
        Ok(CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(AllowMethods::list(self.methods.iter().map(|m| Method::from(*m))))
            .allow_headers(AllowHeaders::any()))
    }
}
