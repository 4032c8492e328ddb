use serenity::model::id::GuildId;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{error, info, warn};

use super::manager::GuildMusicManager;
use super::track::TrackInfo;
use crate::lavalink::{AudioEvent, AudioEventKind};

/// Consume los eventos del nodo y avanza la cola de cada guild.
///
/// Las excepciones y los atascos se tratan igual que un fin normal: se
/// fuerza el avance al siguiente track, nunca se reintenta el mismo.
pub struct TrackScheduler {
    manager: Arc<GuildMusicManager>,
}

impl TrackScheduler {
    pub fn new(manager: Arc<GuildMusicManager>) -> Self {
        Self { manager }
    }

    /// Bucle de consumo. Corre en su propia task hasta que el canal cierre.
    pub async fn run(self: Arc<Self>, mut rx: UnboundedReceiver<AudioEvent>) {
        while let Some(event) = rx.recv().await {
            self.handle(event).await;
        }
    }

    pub async fn handle(&self, event: AudioEvent) {
        let guild_id = event.guild_id;

        match event.kind {
            AudioEventKind::TrackStart { title } => {
                // Solo observacional: la cola ya mutó donde se emitió el play
                info!("▶️ Track iniciado en guild {guild_id}: {title}");
            }
            AudioEventKind::TrackEnd { reason } => {
                if reason.may_start_next() {
                    self.play_next(guild_id).await;
                }
            }
            AudioEventKind::TrackException { message } => {
                error!("❌ Excepción de track en guild {guild_id}: {message}");
                self.play_next(guild_id).await;
            }
            AudioEventKind::TrackStuck { threshold_ms } => {
                warn!("⏳ Track atascado en guild {guild_id} (umbral {threshold_ms}ms)");
                self.play_next(guild_id).await;
            }
        }
    }

    /// Avanza al siguiente track pendiente y devuelve el nuevo actual,
    /// o `None` si la cola quedó vacía y la guild pasó a inactiva.
    pub async fn play_next(&self, guild_id: GuildId) -> Option<TrackInfo> {
        let queue = self.manager.queue(guild_id);

        let next = {
            let mut queue = queue.lock();
            let next = queue.dequeue();
            queue.set_current(next.clone());
            next
        };

        match next {
            Some(track) => {
                // El estado ya considera el track como actual; si el nodo
                // falla solo se registra, el nodo es quien manda en el audio
                if let Err(e) = self.manager.backend().play(guild_id, &track.encoded).await {
                    error!("No se pudo reproducir el siguiente track en guild {guild_id}: {e:#}");
                } else {
                    info!(
                        "🎵 Reproduciendo en guild {guild_id}: {} (pedida por {})",
                        track.title, track.requester_name
                    );
                }
                Some(track)
            }
            None => {
                info!("📭 Cola vacía en guild {guild_id}, reproducción detenida");
                None
            }
        }
    }
}
