//! Google Drive shared-folder client.
//!
//! Public folders are listed through the embedded folder view, which
//! renders one `flip-entry` block per child without requiring an API key.
//! Files are downloaded from the user-content host with `confirm=t`, which
//! skips the interstitial page Drive shows for large files.

use std::{sync::LazyLock, time::Duration};

use bytes::Bytes;
use regex::Regex;
use snafu::prelude::*;
use url::Url;

use super::{
    ClientBuildSnafu, EntryKind, FetchResult, HttpSnafu, InvalidFolderUrlSnafu, RemoteEntry,
    RemoteFolder,
};

/// Embedded folder view used for listings.
pub const DRIVE_LIST_URL: &str = "https://drive.google.com/embeddedfolderview";

/// Direct download endpoint.
pub const DRIVE_DOWNLOAD_URL: &str = "https://drive.usercontent.google.com/download";

const USER_AGENT: &str = concat!("sales-etl/", env!("CARGO_PKG_VERSION"));

static ENTRY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?s)<div class="flip-entry" id="entry-([A-Za-z0-9_-]+)"[^>]*>.*?<a href="([^"]*)".*?<div class="flip-entry-title">(.*?)</div>"#,
    )
    .expect("entry pattern is valid")
});

static ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{10,}$").expect("id pattern is valid"));

/// Shared-folder client for Google Drive.
#[derive(Debug, Clone)]
pub struct GoogleDriveFolder {
    client: reqwest::Client,
    list_url: String,
    download_url: String,
}

impl GoogleDriveFolder {
    /// Client pointed at the public Google Drive endpoints.
    pub fn new() -> FetchResult<Self> {
        Self::with_endpoints(DRIVE_LIST_URL, DRIVE_DOWNLOAD_URL)
    }

    /// Client pointed at custom listing/download endpoints (mirrors, proxies).
    pub fn with_endpoints(
        list_url: impl Into<String>,
        download_url: impl Into<String>,
    ) -> FetchResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .user_agent(USER_AGENT)
            .build()
            .context(ClientBuildSnafu)?;

        Ok(Self {
            client,
            list_url: list_url.into(),
            download_url: download_url.into(),
        })
    }

    /// Extract the folder id from a shared-folder URL.
    ///
    /// Accepts `https://drive.google.com/drive/folders/<id>` (with or without
    /// a `/u/<n>` account segment and trailing query), `...?id=<id>`, and a
    /// bare folder id.
    pub fn folder_id(input: &str) -> FetchResult<String> {
        let trimmed = input.trim();
        let invalid = || InvalidFolderUrlSnafu { url: input }.build();

        let url = match Url::parse(trimmed) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) if ID_RE.is_match(trimmed) => {
                return Ok(trimmed.to_string());
            }
            Err(_) => return Err(invalid()),
        };

        let host = url.host_str().unwrap_or_default();
        if !(host == "google.com" || host.ends_with(".google.com")) {
            return Err(invalid());
        }

        let segments: Vec<&str> = url.path_segments().map(|s| s.collect()).unwrap_or_default();
        let from_path = segments
            .iter()
            .position(|s| *s == "folders")
            .and_then(|i| segments.get(i + 1))
            .map(|s| s.to_string());
        let from_query = || {
            url.query_pairs()
                .find(|(k, _)| k == "id")
                .map(|(_, v)| v.into_owned())
        };

        from_path
            .or_else(from_query)
            .filter(|id| ID_RE.is_match(id))
            .ok_or_else(invalid)
    }

    async fn get(&self, url: &str, query: &[(&str, &str)]) -> FetchResult<reqwest::Response> {
        self.client
            .get(url)
            .query(query)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .context(HttpSnafu { url })
    }
}

#[async_trait::async_trait]
impl RemoteFolder for GoogleDriveFolder {
    async fn list(&self, folder_id: &str) -> FetchResult<Vec<RemoteEntry>> {
        let url = self.list_url.as_str();
        let html = self
            .get(url, &[("id", folder_id)])
            .await?
            .text()
            .await
            .context(HttpSnafu { url })?;

        let entries = parse_listing(&html);
        log::debug!("folder {folder_id}: {} entries", entries.len());
        Ok(entries)
    }

    async fn download(&self, file: &RemoteEntry) -> FetchResult<Bytes> {
        let url = self.download_url.as_str();
        self.get(
            url,
            &[("id", file.id.as_str()), ("export", "download"), ("confirm", "t")],
        )
        .await?
        .bytes()
        .await
        .context(HttpSnafu { url })
    }
}

/// Parse the embedded folder view into entries, in page order.
pub(crate) fn parse_listing(html: &str) -> Vec<RemoteEntry> {
    ENTRY_RE
        .captures_iter(html)
        .map(|caps| {
            let kind = if caps[2].contains("/folders/") {
                EntryKind::Folder
            } else {
                EntryKind::File
            };
            RemoteEntry {
                id: caps[1].to_string(),
                name: decode_entities(caps[3].trim()),
                kind,
            }
        })
        .collect()
}

fn decode_entities(raw: &str) -> String {
    raw.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
}
