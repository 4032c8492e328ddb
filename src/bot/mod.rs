//! # Bot Module
//!
//! Main Discord event handler for Tempo Bot.
//!
//! The bot is built around the [`TempoBot`] struct which implements
//! Serenity's [`EventHandler`] trait. It wires together:
//!
//! - Music playback through [`MusicPlayer`] and the Lavalink node
//! - Temporary voice channels through [`AutoVoiceManager`]
//! - Voice state routing through [`VoiceEventRouter`]
//!
//! Every shared component is constructed once at startup and injected
//! here; nothing is looked up through globals.

use serenity::{
    all::{Context, EventHandler, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{error, info, warn};

pub mod commands;
pub mod handlers;

use crate::audio::{GuildMusicManager, MusicPlayer};
use crate::config::Config;
use crate::gateway::{SerenityGateway, VoiceGateway};
use crate::voice::{AutoVoiceManager, VoiceEventRouter, VoiceUpdate};

/// Main Discord event handler.
///
/// ## Thread safety
///
/// All fields are [`Arc`]-shared; the per-guild state inside them is
/// guarded by its own locks, so event callbacks can run concurrently.
pub struct TempoBot {
    config: Arc<Config>,
    pub player: Arc<MusicPlayer>,
    pub autovoice: Arc<AutoVoiceManager>,
    pub gateway: Arc<SerenityGateway>,
    router: VoiceEventRouter,
}

impl TempoBot {
    pub fn new(
        config: Config,
        player: Arc<MusicPlayer>,
        autovoice: Arc<AutoVoiceManager>,
        music: Arc<GuildMusicManager>,
        gateway: Arc<SerenityGateway>,
    ) -> Self {
        let gateway_dyn: Arc<dyn VoiceGateway> = gateway.clone();
        let router = VoiceEventRouter::new(autovoice.clone(), music, gateway_dyn);

        Self {
            config: Arc::new(config),
            player,
            autovoice,
            gateway,
            router,
        }
    }

    async fn register_commands(&self, ctx: &Context) {
        info!("📝 Registrando comandos slash...");

        let result = match self.config.guild_id {
            Some(guild_id) => {
                info!("🏠 Registrando comandos para guild de desarrollo: {guild_id}");
                commands::register_guild_commands(ctx, guild_id.into()).await
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await
            }
        };

        match result {
            Ok(()) => info!("✅ Comandos registrados"),
            Err(e) => error!("❌ Error registrando comandos: {e:#}"),
        }
    }
}

#[async_trait]
impl EventHandler for TempoBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        // El resto del bot recién puede hablar con Discord desde acá
        self.gateway.bind(ctx.clone());

        self.register_commands(&ctx).await;

        // Mantenimiento periódico: registros de canales que ya no existen
        let autovoice = self.autovoice.clone();
        let ctx = ctx.clone();
        tokio::spawn(async move {
            maintenance_tasks(ctx, autovoice).await;
        });
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command, self).await {
                error!("Error manejando comando: {e:#}");
            }
        }
    }

    async fn voice_state_update(&self, _ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id else { return };

        let left = old.as_ref().and_then(|state| state.channel_id);
        let joined = new.channel_id;

        // Mute, deafen y demás cambios dentro del mismo canal no interesan
        if left == joined {
            return;
        }

        let is_bot = new
            .member
            .as_ref()
            .map(|member| member.user.bot)
            .unwrap_or(false);
        let display_name = new
            .member
            .as_ref()
            .map(|member| member.display_name().to_string())
            .unwrap_or_else(|| new.user_id.to_string());

        self.router
            .handle(VoiceUpdate {
                guild_id,
                user_id: new.user_id,
                display_name,
                is_bot,
                left,
                joined,
            })
            .await;
    }
}

/// Limpieza horaria de registros huérfanos en todas las guilds.
async fn maintenance_tasks(ctx: Context, autovoice: Arc<AutoVoiceManager>) {
    let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(3600));

    loop {
        interval.tick().await;

        let mut cleaned = 0;
        for guild_id in ctx.cache.guilds() {
            cleaned += autovoice.cleanup_orphaned(guild_id).await;
        }

        if cleaned > 0 {
            warn!("🧹 Mantenimiento: {cleaned} registros huérfanos eliminados");
        } else {
            info!("🧹 Tareas de mantenimiento completadas");
        }
    }
}
