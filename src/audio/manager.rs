use dashmap::DashMap;
use parking_lot::Mutex;
use serenity::model::id::GuildId;
use std::sync::Arc;
use tracing::{info, warn};

use super::queue::GuildMusicQueue;
use crate::lavalink::AudioBackend;

/// Registro de estado musical por guild.
///
/// Se construye una sola vez en el arranque y se inyecta en todos los
/// componentes que lo necesitan. La creación perezosa por guild usa el
/// entry de `DashMap`, así dos primeros accesos concurrentes observan
/// exactamente una instancia.
pub struct GuildMusicManager {
    queues: DashMap<GuildId, Arc<Mutex<GuildMusicQueue>>>,
    backend: Arc<dyn AudioBackend>,
    max_history: usize,
}

impl GuildMusicManager {
    pub fn new(backend: Arc<dyn AudioBackend>, max_history: usize) -> Self {
        Self {
            queues: DashMap::new(),
            backend,
            max_history,
        }
    }

    /// Devuelve el estado de la guild, creándolo en el primer acceso.
    pub fn queue(&self, guild_id: GuildId) -> Arc<Mutex<GuildMusicQueue>> {
        self.queues
            .entry(guild_id)
            .or_insert_with(|| Arc::new(Mutex::new(GuildMusicQueue::new(self.max_history))))
            .clone()
    }

    pub fn backend(&self) -> Arc<dyn AudioBackend> {
        self.backend.clone()
    }

    /// Limpia el estado de la guild cuando el bot se desconecta de voz.
    /// Seguro de llamar aunque la guild no tenga estado.
    pub async fn cleanup(&self, guild_id: GuildId) {
        if let Some((_, queue)) = self.queues.remove(&guild_id) {
            let mut queue = queue.lock();
            queue.clear();
            queue.set_current(None);
        }

        if let Err(e) = self.backend.destroy(guild_id).await {
            warn!("No se pudo destruir el player de la guild {guild_id}: {e:#}");
        }

        info!("🧹 Estado musical limpiado para guild {guild_id}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lavalink::MockAudioBackend;

    fn manager_with_backend(backend: MockAudioBackend) -> Arc<GuildMusicManager> {
        Arc::new(GuildMusicManager::new(Arc::new(backend), 50))
    }

    #[tokio::test]
    async fn test_queue_is_created_once_per_guild() {
        let manager = manager_with_backend(MockAudioBackend::new());
        let guild = GuildId::new(1);

        let first = manager.queue(guild);
        let second = manager.queue(guild);

        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_concurrent_first_access_observes_one_state() {
        let manager = manager_with_backend(MockAudioBackend::new());
        let guild = GuildId::new(1);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let manager = manager.clone();
            handles.push(tokio::spawn(async move { manager.queue(guild) }));
        }

        let mut queues = Vec::new();
        for handle in handles {
            queues.push(handle.await.unwrap());
        }

        for queue in &queues[1..] {
            assert!(Arc::ptr_eq(&queues[0], queue));
        }
    }

    #[tokio::test]
    async fn test_cleanup_removes_state_and_destroys_player() {
        let mut backend = MockAudioBackend::new();
        backend.expect_destroy().times(2).returning(|_| Ok(()));
        let manager = manager_with_backend(backend);
        let guild = GuildId::new(1);

        let queue = manager.queue(guild);
        queue.lock().set_current(Some(crate::audio::track::TrackInfo {
            title: "t".to_string(),
            author: "a".to_string(),
            uri: None,
            duration_ms: 0,
            requester_id: serenity::model::id::UserId::new(1),
            requester_name: "u".to_string(),
            encoded: "e".to_string(),
        }));

        manager.cleanup(guild).await;

        // El siguiente acceso crea un estado nuevo y vacío
        let fresh = manager.queue(guild);
        assert!(!Arc::ptr_eq(&queue, &fresh));
        assert!(fresh.lock().current().is_none());

        // Una segunda limpieza sin estado es un no-op seguro
        manager.cleanup(guild).await;
    }
}
