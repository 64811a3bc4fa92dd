//! Stock footage search and download

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use crate::error::{Error, Result};
use crate::http;
use crate::style::Orientation;

#[async_trait]
pub trait FootageSource: Send + Sync {
    /// Download the best match for `query` into `dest`
    async fn fetch(&self, query: &str, orientation: Orientation, dest: &Path) -> Result<()>;
}

#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub videos: Vec<Video>,
}

#[derive(Debug, Deserialize)]
pub struct Video {
    #[serde(default)]
    pub video_files: Vec<VideoFile>,
}

#[derive(Debug, Deserialize)]
pub struct VideoFile {
    pub link: String,
}

impl SearchResponse {
    /// First file of the first result; the provider lists files by priority
    #[must_use]
    pub fn first_link(&self) -> Option<&str> {
        self.videos
            .first()
            .and_then(|video| video.video_files.first())
            .map(|file| file.link.as_str())
    }
}

pub struct PexelsFootage {
    http: reqwest::Client,
    base: String,
    api_key: Option<String>,
}

impl PexelsFootage {
    pub fn new(http: reqwest::Client, base: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http,
            base: base.into(),
            api_key,
        }
    }

    async fn search(&self, query: &str, orientation: Orientation) -> Result<SearchResponse> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| Error::Config("no stock footage API key configured".to_string()))?;

        let response = self
            .http
            .get(&self.base)
            .header(reqwest::header::AUTHORIZATION, key)
            .query(&[
                ("query", query),
                ("orientation", orientation.as_str()),
                ("per_page", "1"),
            ])
            .send()
            .await?;
        let response = http::check_status("pexels", response)?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl FootageSource for PexelsFootage {
    async fn fetch(&self, query: &str, orientation: Orientation, dest: &Path) -> Result<()> {
        let results = self.search(query, orientation).await?;
        let link = results
            .first_link()
            .ok_or_else(|| Error::NoFootage(query.to_string()))?;
        let bytes = http::download(&self.http, link, dest).await?;
        info!("Downloaded stock footage ({bytes} bytes)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_first_file_of_first_video() {
        let body = r#"{
            "page": 1,
            "videos": [
                {"id": 1, "video_files": [
                    {"link": "https://cdn.example/hd.mp4", "width": 1080, "height": 1920, "quality": "hd"},
                    {"link": "https://cdn.example/sd.mp4", "width": 540, "height": 960}
                ]},
                {"id": 2, "video_files": [{"link": "https://cdn.example/other.mp4"}]}
            ]
        }"#;
        let parsed: SearchResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.first_link(), Some("https://cdn.example/hd.mp4"));
    }

    #[test]
    fn empty_results_have_no_link() {
        let parsed: SearchResponse = serde_json::from_str(r#"{"videos": []}"#).unwrap();
        assert_eq!(parsed.first_link(), None);

        let parsed: SearchResponse = serde_json::from_str(r#"{"total_results": 0}"#).unwrap();
        assert_eq!(parsed.first_link(), None);
    }

    #[tokio::test]
    async fn missing_key_is_reported_before_any_request() {
        let source = PexelsFootage::new(reqwest::Client::new(), "http://127.0.0.1:9", None);
        let dir = tempfile::tempdir().unwrap();
        let err = source
            .fetch("ocean", Orientation::Portrait, &dir.path().join("bg.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
