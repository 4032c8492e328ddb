use serenity::model::id::UserId;
use std::time::Duration;

use crate::lavalink::LoadedTrack;

/// Metadatos inmutables de un track encolado.
///
/// Se construye una vez al resolver la consulta y después solo se mueve
/// entre la cola, el slot actual y el historial.
#[derive(Debug, Clone)]
pub struct TrackInfo {
    pub title: String,
    pub author: String,
    #[allow(dead_code)]
    pub uri: Option<String>,
    pub duration_ms: u64,
    #[allow(dead_code)]
    pub requester_id: UserId,
    pub requester_name: String,
    /// Handle codificado del backend, suficiente para volver a reproducirlo
    pub encoded: String,
}

impl TrackInfo {
    pub fn from_loaded(track: &LoadedTrack, requester_id: UserId, requester_name: &str) -> Self {
        Self {
            title: track.info.title.clone(),
            author: track.info.author.clone(),
            uri: track.info.uri.clone(),
            duration_ms: track.info.length,
            requester_id,
            requester_name: requester_name.to_string(),
            encoded: track.encoded.clone(),
        }
    }

    /// Duración legible, p. ej. "3m 21s".
    pub fn duration_text(&self) -> String {
        humantime::format_duration(Duration::from_secs(self.duration_ms / 1000)).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lavalink::LoadedTrackInfo;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_from_loaded_copies_metadata() {
        let loaded = LoadedTrack {
            encoded: "QAAA".to_string(),
            info: LoadedTrackInfo {
                title: "Song".to_string(),
                author: "Artist".to_string(),
                uri: Some("https://example.com/v".to_string()),
                length: 201_000,
            },
        };

        let track = TrackInfo::from_loaded(&loaded, UserId::new(7), "ana");

        assert_eq!(track.title, "Song");
        assert_eq!(track.encoded, "QAAA");
        assert_eq!(track.requester_name, "ana");
        assert_eq!(track.duration_text(), "3m 21s");
    }
}
