use std::time::Duration;

use serde::Deserialize;

use crate::Error;

pub const DEFAULT_PATH: &str = "/etc/mailpost/mailpost.toml";
const ENV_PREFIX: &str = "EMAIL";

/// Runtime configuration for a single pipeline invocation.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Config {
    /// Endpoint that receives the parsed email as JSON.
    /// Set through `EMAIL_API_URL`.
    #[serde(default)]
    pub api_url: String,

    /// Optional request timeout, in seconds
    #[serde(default)]
    pub request_timeout: Option<u64>,
}

impl Config {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            ..Default::default()
        }
    }

    /// Returns the trimmed endpoint URL.
    ///
    /// Fails if the URL is blank or is not an absolute URL.
    pub fn api_url(&self) -> Result<&str, Error> {
        let url = self.api_url.trim();

        if url.is_empty() {
            return Err(Error::Config(
                "EMAIL_API_URL environment variable is not set".to_string(),
            ));
        }

        url::Url::parse(url)?;

        Ok(url)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout.map(Duration::from_secs)
    }
}

/// Loads config from the filesystem and merges it with any
/// environment variables prefixed with EMAIL_.
///
/// A missing config file is not an error.
pub fn load_config(path: Option<&str>) -> Result<Config, Error> {
    let builder = config::Config::builder()
        .add_source(config::File::with_name(path.unwrap_or(DEFAULT_PATH)).required(false))
        .add_source(config::Environment::with_prefix(ENV_PREFIX));

    from_builder(builder)
}

fn from_builder(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
) -> Result<Config, Error> {
    let settings = builder.build()?;
    Ok(settings.try_deserialize::<Config>()?)
}
