use std::{path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, Subcommand};
use clap_handler::Handler;
use fake_user_agent::get_chrome_rua;
use mpdplan::{HttpClient, HttpLoader, PlayerConfig};
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Client,
};
use url::Url;

mod fetch;
mod plan;

#[derive(Subcommand, Clone, Handler)]
pub enum MpdPlayCommand {
    Plan(plan::PlanCommand),
    Fetch(fetch::FetchCommand),
}

#[derive(Args, Clone, Debug)]
pub struct HttpOptions {
    /// Additional HTTP headers, as `Name: value`
    #[clap(short = 'H', long = "header")]
    pub headers: Vec<String>,

    /// HTTP timeout, in seconds
    #[clap(short, long, default_value = "10")]
    pub timeout: u64,
}

impl HttpOptions {
    pub fn into_loader(self) -> anyhow::Result<HttpLoader> {
        let mut headers = HeaderMap::new();

        for header in &self.headers {
            let (key, value) = header
                .split_once(':')
                .ok_or_else(|| anyhow::anyhow!("Invalid header: {header}"))?;
            headers.insert(
                HeaderName::from_str(key.trim())?,
                HeaderValue::from_str(value.trim())?,
            );
        }

        let builder = Client::builder()
            .default_headers(headers)
            .user_agent(get_chrome_rua())
            .timeout(Duration::from_secs(self.timeout));
        Ok(HttpLoader::new(HttpClient::new(builder)?))
    }
}

#[derive(Args, Clone, Debug)]
pub struct PlayerOptions {
    /// TOML file with player settings, overridden by the flags below
    #[clap(short, long)]
    pub config: Option<PathBuf>,

    /// Video representation to load, e.g. `1920x1080`
    #[clap(long)]
    pub video_key: Option<String>,

    /// Audio representation to load, e.g. `48000`
    #[clap(long)]
    pub audio_key: Option<String>,

    /// Segments per representation when the manifest does not tell
    #[clap(long)]
    pub segment_count: Option<usize>,

    /// Retry limit for each segment
    #[clap(long)]
    pub retries: Option<u32>,
}

impl PlayerOptions {
    pub fn into_config(self) -> anyhow::Result<PlayerConfig> {
        let mut config = crate::config::load(self.config.as_deref())?;

        if let Some(key) = self.video_key {
            config.preferred_video_key = key;
        }
        if let Some(key) = self.audio_key {
            config.preferred_audio_key = key;
        }
        if let Some(count) = self.segment_count {
            config.segment_count = Some(count);
        }
        if let Some(retries) = self.retries {
            config.retries = retries;
        }
        Ok(config)
    }
}

/// Accepts URLs as well as local paths.
pub fn parse_source(source: &str) -> anyhow::Result<Url> {
    if let Ok(url) = Url::parse(source) {
        return Ok(url);
    }

    let path = std::fs::canonicalize(source)?;
    Url::from_file_path(&path).map_err(|_| anyhow::anyhow!("Invalid source: {source}"))
}
