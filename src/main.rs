use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, model::id::ApplicationId, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

mod audio;
mod bot;
mod config;
mod gateway;
mod lavalink;
mod storage;
mod voice;

use crate::audio::{GuildMusicManager, MusicPlayer, TrackScheduler};
use crate::bot::TempoBot;
use crate::config::Config;
use crate::gateway::{SerenityGateway, VoiceGateway};
use crate::lavalink::rest::SharedSessionId;
use crate::lavalink::{AudioBackend, LavalinkRest};
use crate::storage::AutoVoiceStore;
use crate::voice::AutoVoiceManager;

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tempo_bot=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Tempo Bot v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&config).await;
    }

    // Storage de auto-voice
    let store = Arc::new(tokio::sync::Mutex::new(
        AutoVoiceStore::new(config.data_dir.clone()).await?,
    ));

    // Gateway de voz: se enlaza al contexto de serenity en el evento ready
    let songbird = Songbird::serenity();
    let gateway = Arc::new(SerenityGateway::new(songbird.clone()));
    let gateway_dyn: Arc<dyn VoiceGateway> = gateway.clone();

    // Backend Lavalink: el WebSocket comparte la sesión con el REST
    let session_id: SharedSessionId = Arc::new(parking_lot::RwLock::new(None));
    let backend: Arc<dyn AudioBackend> = Arc::new(LavalinkRest::new(&config, session_id.clone()));

    // Núcleo musical
    let manager = Arc::new(GuildMusicManager::new(backend, config.max_history_size));
    let scheduler = Arc::new(TrackScheduler::new(manager.clone()));
    let player = Arc::new(MusicPlayer::new(
        manager.clone(),
        scheduler.clone(),
        gateway_dyn.clone(),
        config.max_queue_size,
    ));

    // Canal de eventos del nodo → scheduler
    let (event_tx, event_rx) = tokio::sync::mpsc::unbounded_channel();
    tokio::spawn(scheduler.clone().run(event_rx));

    // AutoVoice
    let autovoice = Arc::new(AutoVoiceManager::new(
        store,
        gateway_dyn.clone(),
        Duration::from_millis(config.creation_cooldown_ms),
        Duration::from_millis(config.delete_grace_ms),
    ));

    // Handler del bot
    let handler = TempoBot::new(
        config.clone(),
        player,
        autovoice,
        manager,
        gateway.clone(),
    );

    // Intents mínimos: guilds y estados de voz
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let mut client = Client::builder(&config.discord_token, intents)
        .application_id(ApplicationId::new(config.application_id))
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // Lector de eventos del nodo Lavalink
    let user_id = client.http.get_current_user().await?.id;
    tokio::spawn(lavalink::events::run_event_socket(
        config.clone(),
        user_id,
        session_id,
        event_tx,
    ));

    // Manejar shutdown graceful
    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Error al registrar Ctrl+C");
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        std::process::exit(0);
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {why:?}");
    }

    Ok(())
}

/// Verifica que el nodo Lavalink esté accesible.
async fn health_check(config: &Config) -> Result<()> {
    let client = reqwest::Client::new();
    let response = client
        .get(format!("{}/version", config.lavalink_rest_url()))
        .header("Authorization", &config.lavalink_password)
        .send()
        .await?;

    if response.status().is_success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Lavalink no disponible: {}", response.status())
    }
}
