//! Content source queries.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Deserialize;
use tracing::debug;

use crate::{Error, Result};

/// A recently published item reported by a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceItem {
    pub id: String,
    pub title: String,
    pub published_at: DateTime<Utc>,
    /// Canonical locator handed to the resolver.
    pub locator: String,
}

/// Query API for a content source.
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// List the most recent items of `source_id`, newest first.
    async fn list_recent_items(&self, credential: &str, source_id: &str)
    -> Result<Vec<SourceItem>>;
}

/// Canonical watch locator for a video id.
pub fn watch_locator(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", video_id)
}

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelItem {
    content_details: ChannelContentDetails,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelContentDetails {
    related_playlists: RelatedPlaylists,
}

#[derive(Debug, Deserialize)]
struct RelatedPlaylists {
    uploads: String,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    snippet: PlaylistSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistSnippet {
    title: String,
    published_at: DateTime<Utc>,
    resource_id: ResourceId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceId {
    video_id: String,
}

fn parse_uploads_playlist(body: &str, channel_id: &str) -> Result<String> {
    let response: ListResponse<ChannelItem> = serde_json::from_str(body)?;
    response
        .items
        .into_iter()
        .next()
        .map(|item| item.content_details.related_playlists.uploads)
        .ok_or_else(|| Error::Source(format!("channel {} not found", channel_id)))
}

fn parse_playlist_items(body: &str) -> Result<Vec<SourceItem>> {
    let response: ListResponse<PlaylistItem> = serde_json::from_str(body)?;
    Ok(response
        .items
        .into_iter()
        .map(|item| {
            let snippet = item.snippet;
            SourceItem {
                locator: watch_locator(&snippet.resource_id.video_id),
                id: snippet.resource_id.video_id,
                title: snippet.title,
                published_at: snippet.published_at,
            }
        })
        .collect())
}

/// YouTube Data API v3 source.
///
/// A channel's uploads playlist id never changes, so it is looked up once per
/// channel and cached.
pub struct YoutubeSource {
    client: reqwest::Client,
    api_base: String,
    page_size: u32,
    uploads: Mutex<HashMap<String, String>>,
}

impl YoutubeSource {
    pub fn new(client: reqwest::Client, api_base: impl Into<String>, page_size: u32) -> Self {
        Self {
            client,
            api_base: api_base.into(),
            page_size,
            uploads: Mutex::new(HashMap::new()),
        }
    }

    async fn get_text(&self, url: &str, query: &[(&str, &str)]) -> Result<String> {
        let response = self.client.get(url).query(query).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::Source(format!(
                "{} returned {}: {}",
                url,
                status,
                body.chars().take(200).collect::<String>()
            )));
        }
        Ok(body)
    }

    async fn uploads_playlist(&self, credential: &str, channel_id: &str) -> Result<String> {
        if let Some(id) = self.uploads.lock().get(channel_id) {
            return Ok(id.clone());
        }

        let url = format!("{}/channels", self.api_base);
        let body = self
            .get_text(
                &url,
                &[
                    ("part", "contentDetails"),
                    ("id", channel_id),
                    ("key", credential),
                ],
            )
            .await?;
        let playlist_id = parse_uploads_playlist(&body, channel_id)?;
        debug!(channel = %channel_id, playlist = %playlist_id, "Resolved uploads playlist");

        self.uploads
            .lock()
            .insert(channel_id.to_string(), playlist_id.clone());
        Ok(playlist_id)
    }
}

#[async_trait]
impl SourceClient for YoutubeSource {
    async fn list_recent_items(
        &self,
        credential: &str,
        source_id: &str,
    ) -> Result<Vec<SourceItem>> {
        let playlist_id = self.uploads_playlist(credential, source_id).await?;

        let url = format!("{}/playlistItems", self.api_base);
        let max_results = self.page_size.to_string();
        let body = self
            .get_text(
                &url,
                &[
                    ("part", "snippet"),
                    ("playlistId", playlist_id.as_str()),
                    ("maxResults", max_results.as_str()),
                    ("key", credential),
                ],
            )
            .await?;

        parse_playlist_items(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_uploads_playlist() {
        let body = r#"{"items":[{"id":"UC1","contentDetails":{"relatedPlaylists":{"likes":"","uploads":"UU1"}}}]}"#;
        assert_eq!(parse_uploads_playlist(body, "UC1").unwrap(), "UU1");
    }

    #[test]
    fn test_unknown_channel_is_source_error() {
        let err = parse_uploads_playlist(r#"{"kind":"youtube#channelListResponse"}"#, "UCx")
            .unwrap_err();
        assert!(matches!(err, Error::Source(ref m) if m.contains("UCx")));
    }

    #[test]
    fn test_parse_playlist_items() {
        let body = r#"{
            "items": [
                {"snippet": {
                    "title": "First",
                    "publishedAt": "2026-03-01T10:00:00Z",
                    "resourceId": {"kind": "youtube#video", "videoId": "abc123"}
                }},
                {"snippet": {
                    "title": "Second",
                    "publishedAt": "2026-02-28T09:30:00Z",
                    "resourceId": {"kind": "youtube#video", "videoId": "def456"}
                }}
            ]
        }"#;

        let items = parse_playlist_items(body).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, "abc123");
        assert_eq!(items[0].locator, "https://www.youtube.com/watch?v=abc123");
        assert_eq!(items[1].title, "Second");
        assert!(items[0].published_at > items[1].published_at);
    }
}
