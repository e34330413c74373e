use axum::http::HeaderValue;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(deserialize_with = "deserialize_log_level")]
    pub log_level: LogLevel,
    pub model: ModelConfig,
    #[serde(default)]
    pub cors: CorsConfig,
}

fn deserialize_log_level<'de, D>(deserializer: D) -> Result<LogLevel, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.try_into().map_err(serde::de::Error::custom)
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

impl ServerConfig {
    pub fn get_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    pub model_dir: PathBuf,
    pub onnx_file: String,
    pub output_name: String,
    #[serde(default = "default_model_instances")]
    pub num_instances: usize,
    #[serde(default = "default_input_size")]
    pub input_height: u32,
    #[serde(default = "default_input_size")]
    pub input_width: u32,
    /// Scale pixel values into `[0, 1]` before inference. Leave off for
    /// models that carry their own rescaling layer.
    #[serde(default)]
    pub normalize: bool,
    #[serde(default = "default_class_labels")]
    pub class_labels: Vec<String>,
}

fn default_model_instances() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_input_size() -> u32 {
    256
}

fn default_class_labels() -> Vec<String> {
    vec![
        "Early Blight".to_string(),
        "Late Blight".to_string(),
        "Healthy".to_string(),
    ]
}

impl ModelConfig {
    pub fn get_path(&self) -> PathBuf {
        self.model_dir.join(&self.onnx_file)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.get_path().exists() {
            return Err(format!("Model file not found: {:?}", self.get_path()));
        }
        self.validate_shape()
    }

    fn validate_shape(&self) -> Result<(), String> {
        if self.num_instances == 0 {
            return Err("model.num_instances must be at least 1".to_string());
        }
        if self.input_height == 0 || self.input_width == 0 {
            return Err(format!(
                "Invalid model input size {}x{}",
                self.input_width, self.input_height
            ));
        }
        if self.class_labels.is_empty() {
            return Err("model.class_labels must not be empty".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorsConfig {
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    #[serde(default = "default_allow_credentials")]
    pub allow_credentials: bool,
}

fn default_allow_credentials() -> bool {
    true
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: Vec::new(),
            allow_credentials: default_allow_credentials(),
        }
    }
}

impl CorsConfig {
    pub fn is_enabled(&self) -> bool {
        !self.allowed_origins.is_empty()
    }

    pub fn origin_header_values(&self) -> Result<Vec<HeaderValue>, String> {
        self.allowed_origins
            .iter()
            .map(|origin| {
                if origin == "*" {
                    return Err(
                        "Wildcard CORS origin is not allowed, list origins explicitly".to_string(),
                    );
                }
                HeaderValue::from_str(origin)
                    .map_err(|e| format!("Invalid CORS origin {:?}: {}", origin, e))
            })
            .collect()
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), String> {
        self.model.validate()?;
        self.cors.origin_header_values()?;
        Ok(())
    }
}

#[derive(Debug)]
pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `local` or `production`.",
                other
            )),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub enum LogLevel {
    Debug,
    Info,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            other => Err(format!(
                "{} is not a supported minimum log level. Use either `debug` or `info`.",
                other
            )),
        }
    }
}

pub fn get_configuration() -> Result<Config, config::ConfigError> {
    let base_path = std::env::current_dir().map_err(|e| {
        config::ConfigError::Message(format!("Failed to determine the current directory: {}", e))
    })?;
    let configuration_directory = base_path.join("configuration");

    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(config::ConfigError::Message)?;

    let config = load_configuration(&configuration_directory, &environment)?;
    validated(config)
}

// Runs before the subscriber is installed, so failures are returned rather than logged.
fn validated(config: Config) -> Result<Config, config::ConfigError> {
    config.validate().map_err(|e| {
        config::ConfigError::Message(format!("Configuration validation failed: {}", e))
    })?;
    Ok(config)
}

fn load_configuration(
    configuration_directory: &Path,
    environment: &Environment,
) -> Result<Config, config::ConfigError> {
    let config = config::Config::builder()
        .add_source(config::File::from(
            configuration_directory.join("base.yaml"),
        ))
        .add_source(
            config::File::from(
                configuration_directory.join(format!("{}.yaml", environment.as_str())),
            )
            .required(false),
        )
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("cors.allowed_origins")
                .try_parsing(true),
        )
        .build()?;

    config.try_deserialize::<Config>()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> Result<Config, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(yaml, config::FileFormat::Yaml))
            .build()?
            .try_deserialize::<Config>()
    }

    const MINIMAL: &str = r#"
log_level: info
server:
  host: localhost
  port: 8000
model:
  model_dir: ./models
  onnx_file: v1.onnx
  output_name: dense_1
"#;

    #[test]
    fn test_defaults_are_applied() {
        let config = parse(MINIMAL).unwrap();

        assert_eq!(config.server.get_address(), "localhost:8000");
        assert_eq!(config.server.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(config.model.input_height, 256);
        assert_eq!(config.model.input_width, 256);
        assert!(!config.model.normalize);
        assert!(config.model.num_instances >= 1);
        assert_eq!(
            config.model.class_labels,
            vec!["Early Blight", "Late Blight", "Healthy"]
        );
        assert!(!config.cors.is_enabled());
        assert!(config.cors.allow_credentials);
        assert_eq!(
            config.model.get_path(),
            PathBuf::from("./models").join("v1.onnx")
        );
    }

    #[test]
    fn test_cors_origins_are_parsed() {
        let yaml = format!(
            "{}cors:\n  allowed_origins:\n    - http://localhost\n    - http://localhost:5173\n",
            MINIMAL
        );
        let config = parse(&yaml).unwrap();

        assert!(config.cors.is_enabled());
        assert_eq!(config.cors.origin_header_values().unwrap().len(), 2);
    }

    #[test]
    fn test_invalid_log_level_is_rejected() {
        let yaml = MINIMAL.replace("log_level: info", "log_level: trace");
        assert!(parse(&yaml).is_err());
    }

    #[test]
    fn test_missing_model_file_fails_validation() {
        let mut config = parse(MINIMAL).unwrap();
        config.model.model_dir = PathBuf::from("./does/not/exist");

        let err = config.validate().unwrap_err();
        assert!(err.contains("Model file not found"));

        let err = validated(config).unwrap_err().to_string();
        assert!(err.contains("Configuration validation failed"));
        assert!(err.contains("Model file not found"));
    }

    #[test]
    fn test_shape_validation() {
        let mut config = parse(MINIMAL).unwrap();
        assert!(config.model.validate_shape().is_ok());

        config.model.class_labels.clear();
        assert!(config.model.validate_shape().is_err());

        config.model.class_labels = default_class_labels();
        config.model.input_width = 0;
        assert!(config.model.validate_shape().is_err());

        config.model.input_width = 256;
        config.model.num_instances = 0;
        assert!(config.model.validate_shape().is_err());
    }

    #[test]
    fn test_invalid_cors_origin_is_rejected() {
        let cors = CorsConfig {
            allowed_origins: vec!["http://bad\norigin".to_string()],
            allow_credentials: true,
        };
        assert!(cors.origin_header_values().is_err());

        let cors = CorsConfig {
            allowed_origins: vec!["*".to_string()],
            allow_credentials: false,
        };
        assert!(cors.origin_header_values().is_err());
    }

    #[test]
    fn test_environment_parsing() {
        let env: Environment = "Production".to_string().try_into().unwrap();
        assert_eq!(env.as_str(), "production");
        assert!(Environment::try_from("staging".to_string()).is_err());
    }
}
