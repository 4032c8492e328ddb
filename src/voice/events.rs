use serenity::model::id::{ChannelId, GuildId, UserId};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::autovoice::AutoVoiceManager;
use crate::audio::GuildMusicManager;
use crate::gateway::VoiceGateway;

/// Cambio de estado de voz reducido a lo que el núcleo necesita.
#[derive(Debug, Clone)]
pub struct VoiceUpdate {
    pub guild_id: GuildId,
    pub user_id: UserId,
    pub display_name: String,
    pub is_bot: bool,
    pub left: Option<ChannelId>,
    pub joined: Option<ChannelId>,
}

/// Enruta los cambios de estado de voz: entradas a canales disparadores,
/// salidas de canales temporales y la limpieza del estado musical
/// cuando el bot queda solo.
pub struct VoiceEventRouter {
    autovoice: Arc<AutoVoiceManager>,
    music: Arc<GuildMusicManager>,
    gateway: Arc<dyn VoiceGateway>,
}

impl VoiceEventRouter {
    pub fn new(
        autovoice: Arc<AutoVoiceManager>,
        music: Arc<GuildMusicManager>,
        gateway: Arc<dyn VoiceGateway>,
    ) -> Self {
        Self {
            autovoice,
            music,
            gateway,
        }
    }

    pub async fn handle(&self, update: VoiceUpdate) {
        if let Some(left) = update.left {
            self.handle_leave(update.guild_id, left).await;
        }

        if let Some(joined) = update.joined {
            if !update.is_bot {
                self.handle_join(&update, joined).await;
            }
        }
    }

    /// Entrada a un canal: si es un disparador o el canal de creación
    /// compartido, crear el canal correspondiente y mover al usuario.
    async fn handle_join(&self, update: &VoiceUpdate, channel: ChannelId) {
        if self.autovoice.is_create_channel(update.guild_id, channel) {
            self.handle_create_channel_join(update).await;
            return;
        }

        if !self.autovoice.is_trigger_channel(update.guild_id, channel).await {
            return;
        }

        // Chequeos consultivos que ahorran trabajo; el lock de creación
        // los repite de forma autoritativa
        if self.autovoice.is_on_cooldown(update.user_id) {
            debug!("Usuario {} en cooldown, se ignora el disparador", update.user_id);
            return;
        }

        if self
            .autovoice
            .owner_has_temp_channel(update.guild_id, update.user_id)
            .await
        {
            debug!("Usuario {} ya tiene canal temporal", update.user_id);
            return;
        }

        info!(
            "👋 {} entró al canal disparador {} en guild {}",
            update.display_name, channel, update.guild_id
        );

        let Some(record) = self
            .autovoice
            .create_temp_channel(update.guild_id, update.user_id, &update.display_name, channel)
            .await
        else {
            // Perdió la carrera de creación o falló la plataforma
            return;
        };

        if let Err(e) = self
            .gateway
            .move_member(update.guild_id, update.user_id, ChannelId::new(record.channel_id))
            .await
        {
            error!(
                "No se pudo mover a {} a su canal temporal: {e:#}",
                update.display_name
            );
        }
    }

    /// Flujo del canal de creación compartido: canal personal con
    /// propiedad solo en memoria.
    async fn handle_create_channel_join(&self, update: &VoiceUpdate) {
        let Some(channel_id) = self
            .autovoice
            .create_ephemeral_channel(update.guild_id, update.user_id, &update.display_name)
            .await
        else {
            return;
        };

        if let Err(e) = self
            .gateway
            .move_member(update.guild_id, update.user_id, channel_id)
            .await
        {
            error!(
                "No se pudo mover a {} a su canal personal: {e:#}",
                update.display_name
            );
        }
    }

    /// Salida de un canal: borrado con gracia de canales temporales y
    /// auto-desconexión cuando el bot queda solo en su canal.
    async fn handle_leave(&self, guild_id: GuildId, channel: ChannelId) {
        self.autovoice.clone().handle_temp_channel_leave(guild_id, channel).await;

        if self.gateway.bot_voice_channel(guild_id) == Some(channel)
            && self.gateway.human_member_count(guild_id, channel) == Some(0)
        {
            info!("🔌 Bot solo en el canal de voz de guild {guild_id}, desconectando...");

            if let Err(e) = self.gateway.disconnect_voice(guild_id).await {
                warn!("No se pudo desconectar de voz en guild {guild_id}: {e:#}");
            }

            self.music.cleanup(guild_id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MockVoiceGateway;
    use crate::lavalink::MockAudioBackend;
    use crate::storage::AutoVoiceStore;
    use std::time::Duration;
    use tokio::sync::Mutex as TokioMutex;

    const GUILD: GuildId = GuildId::new(1);
    const TRIGGER: ChannelId = ChannelId::new(10);

    fn update(user: u64, joined: Option<ChannelId>, left: Option<ChannelId>, is_bot: bool) -> VoiceUpdate {
        VoiceUpdate {
            guild_id: GUILD,
            user_id: UserId::new(user),
            display_name: "ana".to_string(),
            is_bot,
            left,
            joined,
        }
    }

    async fn router_with(
        gateway: MockVoiceGateway,
        backend: MockAudioBackend,
    ) -> (VoiceEventRouter, Arc<AutoVoiceManager>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = AutoVoiceStore::new(dir.path().to_path_buf()).await.unwrap();
        let gateway: Arc<dyn VoiceGateway> = Arc::new(gateway);

        let autovoice = Arc::new(AutoVoiceManager::new(
            Arc::new(TokioMutex::new(store)),
            gateway.clone(),
            Duration::from_millis(5000),
            Duration::from_millis(30),
        ));
        let music = Arc::new(GuildMusicManager::new(Arc::new(backend), 50));

        let router = VoiceEventRouter::new(autovoice.clone(), music, gateway);
        (router, autovoice, dir)
    }

    #[tokio::test]
    async fn test_trigger_join_creates_channel_and_moves_member() {
        let mut gateway = MockVoiceGateway::new();
        gateway.expect_voice_channel_exists().returning(|_, _| true);
        gateway
            .expect_create_voice_channel()
            .times(1)
            .returning(|_, _, _, _| Ok(ChannelId::new(100)));
        gateway
            .expect_move_member()
            .withf(|_, user, channel| *user == UserId::new(7) && *channel == ChannelId::new(100))
            .times(1)
            .returning(|_, _, _| Ok(()));

        let (router, autovoice, _dir) = router_with(gateway, MockAudioBackend::new()).await;
        autovoice.configure_trigger(GUILD, TRIGGER, None, None).await.unwrap();

        router.handle(update(7, Some(TRIGGER), None, false)).await;

        assert!(autovoice.is_temporary_channel(GUILD, ChannelId::new(100)).await);
    }

    #[tokio::test]
    async fn test_create_channel_join_uses_ephemeral_flow() {
        let mut gateway = MockVoiceGateway::new();
        gateway
            .expect_create_voice_channel()
            .times(1)
            .returning(|_, _, _, _| Ok(ChannelId::new(200)));
        gateway
            .expect_move_member()
            .times(1)
            .returning(|_, _, _| Ok(()));

        let (router, autovoice, _dir) = router_with(gateway, MockAudioBackend::new()).await;
        autovoice.set_create_channel(GUILD, ChannelId::new(20));

        router.handle(update(7, Some(ChannelId::new(20)), None, false)).await;

        assert!(autovoice.is_temporary_channel(GUILD, ChannelId::new(200)).await);
        assert!(
            autovoice
                .is_member_channel_owner(GUILD, ChannelId::new(200), UserId::new(7))
                .await
        );
    }

    #[tokio::test]
    async fn test_bot_join_is_ignored() {
        let mut gateway = MockVoiceGateway::new();
        gateway.expect_voice_channel_exists().returning(|_, _| true);
        // Sin expectativa de creación: un bot no dispara nada

        let (router, autovoice, _dir) = router_with(gateway, MockAudioBackend::new()).await;
        autovoice.configure_trigger(GUILD, TRIGGER, None, None).await.unwrap();

        router.handle(update(7, Some(TRIGGER), None, true)).await;

        assert_eq!(autovoice.active_temp_channel_count(GUILD).await, 0);
    }

    #[tokio::test]
    async fn test_join_to_regular_channel_does_nothing() {
        let (router, autovoice, _dir) =
            router_with(MockVoiceGateway::new(), MockAudioBackend::new()).await;

        router.handle(update(7, Some(ChannelId::new(999)), None, false)).await;

        assert_eq!(autovoice.active_temp_channel_count(GUILD).await, 0);
    }

    #[tokio::test]
    async fn test_bot_alone_disconnects_and_cleans_music_state() {
        let bot_channel = ChannelId::new(500);

        let mut gateway = MockVoiceGateway::new();
        gateway
            .expect_bot_voice_channel()
            .returning(move |_| Some(bot_channel));
        gateway
            .expect_human_member_count()
            .returning(|_, _| Some(0));
        gateway.expect_disconnect_voice().times(1).returning(|_| Ok(()));

        let mut backend = MockAudioBackend::new();
        backend.expect_destroy().times(1).returning(|_| Ok(()));

        let (router, _autovoice, _dir) = router_with(gateway, backend).await;

        router.handle(update(7, None, Some(bot_channel), false)).await;
    }

    #[tokio::test]
    async fn test_leave_with_humans_remaining_keeps_connection() {
        let bot_channel = ChannelId::new(500);

        let mut gateway = MockVoiceGateway::new();
        gateway
            .expect_bot_voice_channel()
            .returning(move |_| Some(bot_channel));
        gateway.expect_human_member_count().returning(|_, _| Some(2));
        // disconnect_voice sin expectativa: llamarlo rompería el mock

        let (router, _autovoice, _dir) = router_with(gateway, MockAudioBackend::new()).await;

        router.handle(update(7, None, Some(bot_channel), false)).await;
    }
}
