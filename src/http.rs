use std::path::Path;

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{Error, Result};

const USER_AGENT: &str = concat!("videofactory/", env!("CARGO_PKG_VERSION"));

/// Shared client for every HTTP-backed capability
pub fn client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder().user_agent(USER_AGENT).build()?)
}

/// Map a non-success status to [`Error::Status`]
pub fn check_status(service: &'static str, response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(Error::Status {
            service,
            status: status.as_u16(),
        })
    }
}

/// Stream `url` into `dest` chunk by chunk. An empty body or a broken
/// transfer leaves no file behind.
pub async fn download(client: &reqwest::Client, url: &str, dest: &Path) -> Result<u64> {
    debug!("Downloading {url} -> {}", dest.display());
    let response = check_status("download", client.get(url).send().await?)?;
    let result = write_body(response, dest).await;
    if result.is_err() {
        let _ = fs::remove_file(dest).await;
    }
    result
}

async fn write_body(mut response: reqwest::Response, dest: &Path) -> Result<u64> {
    let mut file = fs::File::create(dest).await?;
    let mut written = 0;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    if written == 0 {
        return Err(Error::EmptyOutput(dest.to_path_buf()));
    }
    Ok(written)
}
