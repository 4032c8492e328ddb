pub mod events;
pub mod rest;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serenity::model::id::GuildId;

pub use rest::LavalinkRest;

/// Errores del cliente del nodo.
#[derive(Debug, thiserror::Error)]
pub enum LavalinkError {
    /// Todavía no hubo handshake de WebSocket con el nodo
    #[error("el nodo Lavalink todavía no asignó una sesión")]
    NoSession,
    #[error("el nodo Lavalink respondió {status}: {body}")]
    BadStatus {
        status: reqwest::StatusCode,
        body: String,
    },
}

/// Metadatos de un track tal como los devuelve el nodo Lavalink.
#[derive(Debug, Clone, Deserialize)]
pub struct LoadedTrack {
    /// Representación codificada del track, usada para reproducirlo
    pub encoded: String,
    pub info: LoadedTrackInfo,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadedTrackInfo {
    pub title: String,
    pub author: String,
    pub uri: Option<String>,
    /// Duración en milisegundos
    pub length: u64,
}

/// Resultado clasificado de resolver una consulta de reproducción.
#[derive(Debug, Clone)]
pub enum LoadResult {
    /// Un solo track resuelto desde una URL directa
    Track(LoadedTrack),
    /// Playlist completa, en orden
    Playlist { name: String, tracks: Vec<LoadedTrack> },
    /// Resultados de búsqueda (solo se usa el primero)
    Search(Vec<LoadedTrack>),
    /// Sin resultados
    Empty,
    /// El nodo no pudo cargar la consulta
    Error(String),
}

/// Motivo con el que terminó un track, según el nodo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackEndReason {
    Finished,
    LoadFailed,
    Stopped,
    Replaced,
    Cleanup,
}

impl TrackEndReason {
    /// Indica si el scheduler puede avanzar al siguiente track.
    /// `Stopped` y `Replaced` significan que alguien ya emitió otra orden.
    pub fn may_start_next(self) -> bool {
        matches!(self, TrackEndReason::Finished | TrackEndReason::LoadFailed)
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "loadFailed" => TrackEndReason::LoadFailed,
            "stopped" => TrackEndReason::Stopped,
            "replaced" => TrackEndReason::Replaced,
            "cleanup" => TrackEndReason::Cleanup,
            _ => TrackEndReason::Finished,
        }
    }
}

/// Evento del ciclo de vida de un track, emitido por el nodo y
/// consumido por el `TrackScheduler`.
#[derive(Debug, Clone)]
pub struct AudioEvent {
    pub guild_id: GuildId,
    pub kind: AudioEventKind,
}

#[derive(Debug, Clone)]
pub enum AudioEventKind {
    TrackStart { title: String },
    TrackEnd { reason: TrackEndReason },
    TrackException { message: String },
    TrackStuck { threshold_ms: u64 },
}

/// Superficie de control del backend de audio, por guild.
///
/// La implementación real es [`LavalinkRest`]; los tests usan el mock
/// generado por `mockall`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AudioBackend: Send + Sync {
    /// Resuelve una consulta (URL o `ytsearch:...`) en un [`LoadResult`].
    async fn load(&self, identifier: &str) -> Result<LoadResult>;

    /// Reproduce el track codificado en el player de la guild.
    async fn play(&self, guild_id: GuildId, encoded: &str) -> Result<()>;

    /// Pausa o reanuda el player de la guild.
    async fn set_paused(&self, guild_id: GuildId, paused: bool) -> Result<()>;

    /// Detiene el track actual sin destruir el player.
    async fn stop(&self, guild_id: GuildId) -> Result<()>;

    /// Destruye el player de la guild y libera sus recursos en el nodo.
    async fn destroy(&self, guild_id: GuildId) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_reason_may_start_next() {
        assert!(TrackEndReason::Finished.may_start_next());
        assert!(TrackEndReason::LoadFailed.may_start_next());
        assert!(!TrackEndReason::Stopped.may_start_next());
        assert!(!TrackEndReason::Replaced.may_start_next());
        assert!(!TrackEndReason::Cleanup.may_start_next());
    }

    #[test]
    fn test_end_reason_parse() {
        assert_eq!(TrackEndReason::parse("finished"), TrackEndReason::Finished);
        assert_eq!(TrackEndReason::parse("loadFailed"), TrackEndReason::LoadFailed);
        assert_eq!(TrackEndReason::parse("stopped"), TrackEndReason::Stopped);
        assert_eq!(TrackEndReason::parse("replaced"), TrackEndReason::Replaced);
        // Motivos desconocidos se tratan como fin normal
        assert_eq!(TrackEndReason::parse("whatever"), TrackEndReason::Finished);
    }
}
