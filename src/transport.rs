//! Byte transport for metadata and packages
//!
//! Addresses are local paths, `file://` URLs, or `http(s)://` URLs.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, UpdateError};

/// Fetches raw bytes for an address
pub trait Transport: Send + Sync {
    /// Read the whole resource into memory
    fn get(&self, address: &str) -> Result<Vec<u8>>;

    /// Stream the resource into `dest`, returning the number of bytes written
    ///
    /// Default implementation buffers through `get()`.
    fn copy_to(&self, address: &str, dest: &Path) -> Result<u64> {
        let bytes = self.get(address)?;
        std::fs::write(dest, &bytes)?;
        Ok(bytes.len() as u64)
    }
}

/// Where an address points
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Local(PathBuf),
    Remote(String),
}

impl Location {
    /// Classify an address; `None` if it is neither local nor http(s)
    pub fn classify(address: &str) -> Option<Location> {
        let address = address.trim();
        if address.is_empty() {
            return None;
        }
        let lower = address.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return Some(Location::Remote(address.to_string()));
        }
        if lower.starts_with("file://") {
            let rest = &address["file://".len()..];
            // file:///C:/x on Windows
            let rest = if cfg!(windows) {
                rest.strip_prefix('/').unwrap_or(rest)
            } else {
                rest
            };
            return Some(Location::Local(PathBuf::from(rest)));
        }
        if address.contains("://") {
            return None;
        }
        Some(Location::Local(PathBuf::from(address)))
    }
}

/// Local filesystem + blocking HTTP transport
pub struct DefaultTransport {
    client: reqwest::blocking::Client,
}

impl DefaultTransport {
    /// Build a transport; `timeout` of `None` waits indefinitely.
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("a3s-autoupdate/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    fn request(&self, url: &str) -> Result<reqwest::blocking::Response> {
        Ok(self.client.get(url).send()?.error_for_status()?)
    }
}

impl Transport for DefaultTransport {
    fn get(&self, address: &str) -> Result<Vec<u8>> {
        match Location::classify(address) {
            Some(Location::Local(path)) => {
                tracing::debug!(path = %path.display(), "Reading local resource");
                Ok(std::fs::read(&path)?)
            }
            Some(Location::Remote(url)) => {
                tracing::debug!(url = %url, "Fetching remote resource");
                Ok(self.request(&url)?.bytes()?.to_vec())
            }
            None => Err(UpdateError::UnsupportedAddress(address.to_string())),
        }
    }

    fn copy_to(&self, address: &str, dest: &Path) -> Result<u64> {
        match Location::classify(address) {
            Some(Location::Local(path)) => Ok(std::fs::copy(&path, dest)?),
            Some(Location::Remote(url)) => {
                let mut response = self.request(&url)?;
                let mut writer = BufWriter::new(File::create(dest)?);
                let written = response.copy_to(&mut writer)?;
                writer.flush()?;
                tracing::debug!(url = %url, bytes = written, "Downloaded remote resource");
                Ok(written)
            }
            None => Err(UpdateError::UnsupportedAddress(address.to_string())),
        }
    }
}
