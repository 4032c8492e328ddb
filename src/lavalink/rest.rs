use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::json;
use serenity::model::id::GuildId;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{AudioBackend, LavalinkError, LoadResult, LoadedTrack};
use crate::config::Config;

/// Id de sesión que el nodo asigna durante el handshake del WebSocket.
/// Lo escribe el lector de eventos y lo leen las llamadas REST.
pub type SharedSessionId = Arc<RwLock<Option<String>>>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadTracksResponse {
    load_type: String,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct PlaylistData {
    info: PlaylistInfo,
    tracks: Vec<LoadedTrack>,
}

#[derive(Debug, Deserialize)]
struct PlaylistInfo {
    name: String,
}

#[derive(Debug, Deserialize)]
struct LoadErrorData {
    message: Option<String>,
}

/// Cliente REST del API v4 de Lavalink.
pub struct LavalinkRest {
    base_url: String,
    password: String,
    session_id: SharedSessionId,
    client: reqwest::Client,
}

impl LavalinkRest {
    pub fn new(config: &Config, session_id: SharedSessionId) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: config.lavalink_rest_url(),
            password: config.lavalink_password.clone(),
            session_id,
            client,
        }
    }

    fn player_url(&self, guild_id: GuildId) -> Result<String> {
        let session = self.session_id.read().clone().ok_or(LavalinkError::NoSession)?;

        Ok(format!(
            "{}/v4/sessions/{}/players/{}",
            self.base_url, session, guild_id
        ))
    }

    async fn update_player(&self, guild_id: GuildId, body: serde_json::Value) -> Result<()> {
        let url = self.player_url(guild_id)?;

        let response = self
            .client
            .patch(&url)
            .query(&[("noReplace", "false")])
            .header("Authorization", &self.password)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LavalinkError::BadStatus { status, body }.into());
        }

        Ok(())
    }
}

#[async_trait]
impl AudioBackend for LavalinkRest {
    async fn load(&self, identifier: &str) -> Result<LoadResult> {
        debug!("🔍 loadtracks: {}", identifier);

        let url = format!("{}/v4/loadtracks", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("identifier", identifier)])
            .header("Authorization", &self.password)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LavalinkError::BadStatus { status, body }.into());
        }

        let parsed: LoadTracksResponse = response.json().await?;
        classify(parsed)
    }

    async fn play(&self, guild_id: GuildId, encoded: &str) -> Result<()> {
        self.update_player(guild_id, json!({ "track": { "encoded": encoded }, "paused": false }))
            .await
    }

    async fn set_paused(&self, guild_id: GuildId, paused: bool) -> Result<()> {
        self.update_player(guild_id, json!({ "paused": paused })).await
    }

    async fn stop(&self, guild_id: GuildId) -> Result<()> {
        self.update_player(guild_id, json!({ "track": { "encoded": null } }))
            .await
    }

    async fn destroy(&self, guild_id: GuildId) -> Result<()> {
        let url = self.player_url(guild_id)?;

        let response = self
            .client
            .delete(&url)
            .header("Authorization", &self.password)
            .send()
            .await?;

        // 404 cuenta como destruido: el nodo ya no conoce ese player
        if !response.status().is_success() && response.status() != reqwest::StatusCode::NOT_FOUND {
            return Err(LavalinkError::BadStatus {
                status: response.status(),
                body: String::new(),
            }
            .into());
        }

        Ok(())
    }
}

/// Clasifica la respuesta de `/v4/loadtracks` según su `loadType`.
fn classify(response: LoadTracksResponse) -> Result<LoadResult> {
    match response.load_type.as_str() {
        "track" => {
            let track: LoadedTrack = serde_json::from_value(response.data)?;
            Ok(LoadResult::Track(track))
        }
        "playlist" => {
            let playlist: PlaylistData = serde_json::from_value(response.data)?;
            Ok(LoadResult::Playlist {
                name: playlist.info.name,
                tracks: playlist.tracks,
            })
        }
        "search" => {
            let tracks: Vec<LoadedTrack> = serde_json::from_value(response.data)?;
            Ok(LoadResult::Search(tracks))
        }
        "empty" => Ok(LoadResult::Empty),
        "error" => {
            let error: LoadErrorData = serde_json::from_value(response.data).unwrap_or(LoadErrorData { message: None });
            Ok(LoadResult::Error(
                error.message.unwrap_or_else(|| "error desconocido".to_string()),
            ))
        }
        other => anyhow::bail!("loadType desconocido: {}", other),
    }
}
