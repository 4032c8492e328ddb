use serenity::model::id::{GuildId, UserId};
use std::sync::Arc;
use tracing::{error, info, warn};
use url::Url;

use super::manager::GuildMusicManager;
use super::scheduler::TrackScheduler;
use super::track::TrackInfo;
use crate::gateway::VoiceGateway;
use crate::lavalink::{LoadResult, LoadedTrack};

/// Identidad del miembro que originó la operación.
#[derive(Debug, Clone)]
pub struct Requester {
    pub user_id: UserId,
    pub display_name: String,
}

/// Orquesta las operaciones de música de cara al usuario.
///
/// Cada operación es total: las violaciones de precondición y los fallos
/// del nodo se devuelven como texto para el usuario, nunca como panic.
pub struct MusicPlayer {
    manager: Arc<GuildMusicManager>,
    scheduler: Arc<TrackScheduler>,
    gateway: Arc<dyn VoiceGateway>,
    max_queue_size: usize,
}

impl MusicPlayer {
    pub fn new(
        manager: Arc<GuildMusicManager>,
        scheduler: Arc<TrackScheduler>,
        gateway: Arc<dyn VoiceGateway>,
        max_queue_size: usize,
    ) -> Self {
        Self {
            manager,
            scheduler,
            gateway,
            max_queue_size,
        }
    }

    /// Resuelve la consulta y la reproduce o la encola.
    pub async fn play(&self, guild_id: GuildId, requester: &Requester, query: &str) -> String {
        let Some(channel_id) = self.gateway.voice_channel_of(guild_id, requester.user_id) else {
            return "❌ Debes estar en un canal de voz para usar este comando.".to_string();
        };

        if let Err(e) = self.gateway.connect_voice(guild_id, channel_id).await {
            warn!("No se pudo conectar a voz en guild {guild_id}: {e:#}");
        }

        let identifier = classify_query(query);

        let result = match self.manager.backend().load(&identifier).await {
            Ok(result) => result,
            Err(e) => {
                error!("Error cargando '{identifier}' en guild {guild_id}: {e:#}");
                return "❌ Error al cargar el track. Intenta de nuevo.".to_string();
            }
        };

        self.handle_load_result(guild_id, requester, result).await
    }

    async fn handle_load_result(
        &self,
        guild_id: GuildId,
        requester: &Requester,
        result: LoadResult,
    ) -> String {
        match result {
            LoadResult::Track(loaded) => self.start_or_enqueue(guild_id, requester, &loaded).await,
            LoadResult::Search(tracks) => match tracks.first() {
                // Solo se usa el primer resultado de la búsqueda
                Some(loaded) => self.start_or_enqueue(guild_id, requester, loaded).await,
                None => "❌ Sin resultados para tu búsqueda.".to_string(),
            },
            LoadResult::Playlist { name, tracks } => {
                self.load_playlist(guild_id, requester, name, tracks).await
            }
            LoadResult::Empty => "❌ Sin resultados.".to_string(),
            LoadResult::Error(message) => format!("❌ Error al cargar: {message}"),
        }
    }

    async fn start_or_enqueue(
        &self,
        guild_id: GuildId,
        requester: &Requester,
        loaded: &LoadedTrack,
    ) -> String {
        let track = TrackInfo::from_loaded(loaded, requester.user_id, &requester.display_name);
        let queue = self.manager.queue(guild_id);

        let idle = queue.lock().current().is_none();

        if idle {
            queue.lock().set_current(Some(track.clone()));
            if let Err(e) = self.manager.backend().play(guild_id, &track.encoded).await {
                error!("No se pudo iniciar la reproducción en guild {guild_id}: {e:#}");
            }
            format!(
                "🎵 Reproduciendo: **{}** de {} [{}]",
                track.title,
                track.author,
                track.duration_text()
            )
        } else {
            let position = {
                let mut queue = queue.lock();
                if queue.len() >= self.max_queue_size {
                    return format!("❌ La cola está llena (máximo {} pistas).", self.max_queue_size);
                }
                queue.enqueue(track.clone());
                queue.len()
            };
            format!("➕ Agregado a la cola: **{}** | Posición: {}", track.title, position)
        }
    }

    /// Carga una playlist pista por pista: la primera arranca si la guild
    /// estaba inactiva, el resto se encola en orden.
    async fn load_playlist(
        &self,
        guild_id: GuildId,
        requester: &Requester,
        name: String,
        tracks: Vec<LoadedTrack>,
    ) -> String {
        if tracks.is_empty() {
            return "❌ La playlist está vacía.".to_string();
        }

        let total = tracks.len();
        let queue = self.manager.queue(guild_id);
        let mut started = false;
        let mut dropped = 0usize;

        for loaded in &tracks {
            let track = TrackInfo::from_loaded(loaded, requester.user_id, &requester.display_name);

            if !started && queue.lock().current().is_none() {
                queue.lock().set_current(Some(track.clone()));
                if let Err(e) = self.manager.backend().play(guild_id, &track.encoded).await {
                    error!("No se pudo iniciar la playlist en guild {guild_id}: {e:#}");
                }
                started = true;
            } else {
                let mut queue = queue.lock();
                if queue.len() >= self.max_queue_size {
                    dropped += 1;
                    continue;
                }
                queue.enqueue(track);
            }
        }

        if dropped > 0 {
            warn!("Playlist truncada en guild {guild_id}: {dropped} pistas descartadas por cola llena");
        }

        info!("📋 Playlist '{name}' cargada en guild {guild_id} ({total} pistas)");
        format!("📋 Playlist cargada: **{name}** con {total} pistas")
    }

    /// Detiene todo: vacía la cola, corta el nodo, desconecta la voz y
    /// elimina el estado de la guild.
    pub async fn stop(&self, guild_id: GuildId) -> String {
        let queue = self.manager.queue(guild_id);
        {
            let mut queue = queue.lock();
            queue.clear();
            queue.set_current(None);
        }

        if let Err(e) = self.manager.backend().stop(guild_id).await {
            error!("No se pudo detener el player en guild {guild_id}: {e:#}");
        }

        if let Err(e) = self.gateway.disconnect_voice(guild_id).await {
            warn!("No se pudo desconectar de voz en guild {guild_id}: {e:#}");
        }

        self.manager.cleanup(guild_id).await;

        "⏹️ Reproducción detenida y cola vaciada.".to_string()
    }

    /// Fuerza el avance al siguiente track.
    pub async fn next(&self, guild_id: GuildId) -> String {
        match self.scheduler.play_next(guild_id).await {
            Some(track) => format!("⏭️ Saltado. Reproduciendo: **{}**", track.title),
            None => {
                if let Err(e) = self.manager.backend().stop(guild_id).await {
                    error!("No se pudo detener el player en guild {guild_id}: {e:#}");
                }
                "⏭️ No quedan pistas en la cola. Reproducción detenida.".to_string()
            }
        }
    }

    /// Reproduce el track reemplazado más recientemente.
    pub async fn previous(&self, guild_id: GuildId) -> String {
        let queue = self.manager.queue(guild_id);

        let previous = queue.lock().pop_history();
        let Some(previous) = previous else {
            return "⏮️ No hay pistas anteriores en el historial.".to_string();
        };

        // El actual desplazado vuelve al historial
        queue.lock().set_current(Some(previous.clone()));

        if let Err(e) = self.manager.backend().play(guild_id, &previous.encoded).await {
            error!("No se pudo reproducir el track anterior en guild {guild_id}: {e:#}");
        }

        format!("⏮️ Reproduciendo anterior: **{}**", previous.title)
    }

    pub async fn pause(&self, guild_id: GuildId) -> String {
        let queue = self.manager.queue(guild_id);

        let title = {
            let mut queue = queue.lock();
            let Some(current) = queue.current() else {
                return "❌ No hay nada reproduciéndose.".to_string();
            };
            if queue.is_paused() {
                return "⏸️ Ya está pausado.".to_string();
            }
            let title = current.title.clone();
            queue.set_paused(true);
            title
        };

        if let Err(e) = self.manager.backend().set_paused(guild_id, true).await {
            error!("No se pudo pausar el player en guild {guild_id}: {e:#}");
        }

        format!("⏸️ Pausado: **{title}**")
    }

    pub async fn resume(&self, guild_id: GuildId) -> String {
        let queue = self.manager.queue(guild_id);

        let title = {
            let mut queue = queue.lock();
            let Some(current) = queue.current() else {
                return "❌ No hay nada reproduciéndose.".to_string();
            };
            if !queue.is_paused() {
                return "▶️ Ya está reproduciéndose.".to_string();
            }
            let title = current.title.clone();
            queue.set_paused(false);
            title
        };

        if let Err(e) = self.manager.backend().set_paused(guild_id, false).await {
            error!("No se pudo reanudar el player en guild {guild_id}: {e:#}");
        }

        format!("▶️ Reanudado: **{title}**")
    }
}

/// Una URL http(s) se pasa tal cual al nodo; cualquier otra cosa se
/// convierte en una búsqueda de YouTube.
fn classify_query(query: &str) -> String {
    match Url::parse(query) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => query.to_string(),
        _ => format!("ytsearch:{query}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MockVoiceGateway;
    use crate::lavalink::{LoadedTrackInfo, MockAudioBackend};
    use pretty_assertions::assert_eq;
    use serenity::model::id::ChannelId;

    fn loaded(title: &str) -> LoadedTrack {
        LoadedTrack {
            encoded: format!("enc-{title}"),
            info: LoadedTrackInfo {
                title: title.to_string(),
                author: "Artista".to_string(),
                uri: None,
                length: 180_000,
            },
        }
    }

    fn requester() -> Requester {
        Requester {
            user_id: UserId::new(7),
            display_name: "ana".to_string(),
        }
    }

    fn in_voice_gateway() -> MockVoiceGateway {
        let mut gateway = MockVoiceGateway::new();
        gateway
            .expect_voice_channel_of()
            .returning(|_, _| Some(ChannelId::new(100)));
        gateway.expect_connect_voice().returning(|_, _| Ok(()));
        gateway
    }

    fn player_with(backend: MockAudioBackend, gateway: MockVoiceGateway) -> MusicPlayer {
        let manager = Arc::new(GuildMusicManager::new(Arc::new(backend), 50));
        let scheduler = Arc::new(TrackScheduler::new(manager.clone()));
        MusicPlayer::new(manager, scheduler, Arc::new(gateway), 1000)
    }

    #[test]
    fn test_classify_query() {
        assert_eq!(
            classify_query("https://youtu.be/abc"),
            "https://youtu.be/abc"
        );
        assert_eq!(classify_query("foo bar"), "ytsearch:foo bar");
        // Las URL sin esquema http también van a búsqueda
        assert_eq!(classify_query("ftp://host/file"), "ytsearch:ftp://host/file");
    }

    #[tokio::test]
    async fn test_play_on_idle_guild_starts_immediately() {
        let mut backend = MockAudioBackend::new();
        backend
            .expect_load()
            .withf(|identifier| identifier == "ytsearch:foo")
            .times(1)
            .returning(|_| Ok(LoadResult::Track(loaded("T1"))));
        backend
            .expect_play()
            .withf(|_, encoded| encoded == "enc-T1")
            .times(1)
            .returning(|_, _| Ok(()));

        let player = player_with(backend, in_voice_gateway());
        let guild = GuildId::new(1);

        let reply = player.play(guild, &requester(), "foo").await;

        assert!(reply.contains("Reproduciendo"), "reply: {reply}");
        assert!(reply.contains("T1"));
        let queue = player.manager.queue(guild);
        assert_eq!(queue.lock().current().unwrap().title, "T1");
    }

    #[tokio::test]
    async fn test_play_while_playing_enqueues_at_position_one() {
        let mut backend = MockAudioBackend::new();
        backend
            .expect_load()
            .times(1)
            .returning(|_| Ok(LoadResult::Track(loaded("T2"))));

        let player = player_with(backend, in_voice_gateway());
        let guild = GuildId::new(1);
        player
            .manager
            .queue(guild)
            .lock()
            .set_current(Some(TrackInfo::from_loaded(&loaded("T1"), UserId::new(7), "ana")));

        let reply = player.play(guild, &requester(), "https://example.com/t2").await;

        assert!(reply.contains("Posición: 1"), "reply: {reply}");
        let queue = player.manager.queue(guild);
        let queue = queue.lock();
        assert_eq!(queue.current().unwrap().title, "T1");
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn test_play_rejects_member_outside_voice() {
        let mut gateway = MockVoiceGateway::new();
        gateway.expect_voice_channel_of().returning(|_, _| None);

        // Sin expectativas: ninguna llamada al nodo debe ocurrir
        let player = player_with(MockAudioBackend::new(), gateway);
        let guild = GuildId::new(1);

        let reply = player.play(guild, &requester(), "foo").await;

        assert!(reply.contains("canal de voz"), "reply: {reply}");
        assert!(player.manager.queue(guild).lock().current().is_none());
    }

    #[tokio::test]
    async fn test_play_load_failure_leaves_state_untouched() {
        let mut backend = MockAudioBackend::new();
        backend
            .expect_load()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("nodo caído")));

        let player = player_with(backend, in_voice_gateway());
        let guild = GuildId::new(1);

        let reply = player.play(guild, &requester(), "foo").await;

        assert!(reply.contains("Error"), "reply: {reply}");
        let queue = player.manager.queue(guild);
        assert!(queue.lock().current().is_none());
        assert!(queue.lock().is_empty());
    }

    #[tokio::test]
    async fn test_search_uses_first_hit_only() {
        let mut backend = MockAudioBackend::new();
        backend
            .expect_load()
            .times(1)
            .returning(|_| Ok(LoadResult::Search(vec![loaded("Hit"), loaded("Otro")])));
        backend
            .expect_play()
            .withf(|_, encoded| encoded == "enc-Hit")
            .times(1)
            .returning(|_, _| Ok(()));

        let player = player_with(backend, in_voice_gateway());
        let guild = GuildId::new(1);

        let reply = player.play(guild, &requester(), "hit song").await;

        assert!(reply.contains("Hit"), "reply: {reply}");
        assert!(player.manager.queue(guild).lock().is_empty());
    }

    #[tokio::test]
    async fn test_playlist_starts_first_and_enqueues_rest() {
        let mut backend = MockAudioBackend::new();
        backend.expect_load().times(1).returning(|_| {
            Ok(LoadResult::Playlist {
                name: "Mix".to_string(),
                tracks: vec![loaded("P1"), loaded("P2"), loaded("P3")],
            })
        });
        backend
            .expect_play()
            .withf(|_, encoded| encoded == "enc-P1")
            .times(1)
            .returning(|_, _| Ok(()));

        let player = player_with(backend, in_voice_gateway());
        let guild = GuildId::new(1);

        let reply = player.play(guild, &requester(), "https://example.com/mix").await;

        assert!(reply.contains("Mix"), "reply: {reply}");
        assert!(reply.contains("3 pistas"));
        let queue = player.manager.queue(guild);
        let queue = queue.lock();
        assert_eq!(queue.current().unwrap().title, "P1");
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn test_previous_after_next_round_trips() {
        let mut backend = MockAudioBackend::new();
        backend.expect_play().times(2).returning(|_, _| Ok(()));

        let player = player_with(backend, MockVoiceGateway::new());
        let guild = GuildId::new(1);
        let queue = player.manager.queue(guild);
        {
            let mut queue = queue.lock();
            queue.set_current(Some(TrackInfo::from_loaded(&loaded("A"), UserId::new(7), "ana")));
            queue.set_current(Some(TrackInfo::from_loaded(&loaded("B"), UserId::new(7), "ana")));
            queue.enqueue(TrackInfo::from_loaded(&loaded("C"), UserId::new(7), "ana"));
        }

        let reply = player.next(guild).await;
        assert!(reply.contains("C"), "reply: {reply}");

        let reply = player.previous(guild).await;
        assert!(reply.contains("B"), "reply: {reply}");

        let queue = queue.lock();
        assert_eq!(queue.current().unwrap().title, "B");
    }

    #[tokio::test]
    async fn test_previous_with_empty_history() {
        let player = player_with(MockAudioBackend::new(), MockVoiceGateway::new());

        let reply = player.previous(GuildId::new(1)).await;

        assert!(reply.contains("historial"), "reply: {reply}");
    }

    #[tokio::test]
    async fn test_pause_and_resume_preconditions() {
        let mut backend = MockAudioBackend::new();
        backend.expect_set_paused().times(2).returning(|_, _| Ok(()));

        let player = player_with(backend, MockVoiceGateway::new());
        let guild = GuildId::new(1);

        // Nada reproduciéndose todavía
        assert!(player.pause(guild).await.contains("No hay nada"));
        assert!(player.resume(guild).await.contains("No hay nada"));

        player
            .manager
            .queue(guild)
            .lock()
            .set_current(Some(TrackInfo::from_loaded(&loaded("T"), UserId::new(7), "ana")));

        assert!(player.resume(guild).await.contains("Ya está"));
        assert!(player.pause(guild).await.contains("Pausado"));
        assert!(player.pause(guild).await.contains("Ya está"));
        assert!(player.resume(guild).await.contains("Reanudado"));
    }

    #[tokio::test]
    async fn test_stop_clears_state_and_disconnects() {
        let mut backend = MockAudioBackend::new();
        backend.expect_stop().times(1).returning(|_| Ok(()));
        backend.expect_destroy().times(1).returning(|_| Ok(()));
        let mut gateway = MockVoiceGateway::new();
        gateway.expect_disconnect_voice().times(1).returning(|_| Ok(()));

        let player = player_with(backend, gateway);
        let guild = GuildId::new(1);
        {
            let queue = player.manager.queue(guild);
            let mut queue = queue.lock();
            queue.set_current(Some(TrackInfo::from_loaded(&loaded("T"), UserId::new(7), "ana")));
            queue.enqueue(TrackInfo::from_loaded(&loaded("U"), UserId::new(7), "ana"));
        }

        let reply = player.stop(guild).await;

        assert!(reply.contains("detenida"), "reply: {reply}");
        let queue = player.manager.queue(guild);
        assert!(queue.lock().current().is_none());
        assert!(queue.lock().is_empty());
    }
}
