use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::fs;
use tracing::{info, warn};

/// Configuración de un canal disparador de auto-voice.
/// Única por (guild, canal disparador).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    pub guild_id: u64,
    pub trigger_channel_id: u64,
    pub category_id: Option<u64>,
    /// 0 = sin límite
    pub max_user_limit: u32,
    pub enabled: bool,
}

/// Registro persistido de un canal de voz temporal.
/// Único por id de canal; se consulta por (guild, dueño) para los
/// chequeos de existencia.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TempChannelRecord {
    pub guild_id: u64,
    pub channel_id: u64,
    pub owner_id: u64,
    pub trigger_channel_id: u64,
    pub channel_name: String,
    pub user_limit: u32,
    pub locked: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct GuildAutoVoice {
    triggers: Vec<TriggerConfig>,
    temp_channels: Vec<TempChannelRecord>,
}

/// Almacenamiento JSON de la configuración de auto-voice, con un
/// archivo por guild bajo `data_dir/autovoice/`.
pub struct AutoVoiceStore {
    data_dir: PathBuf,
    guilds: HashMap<u64, GuildAutoVoice>,
}

impl AutoVoiceStore {
    pub async fn new(data_dir: PathBuf) -> Result<Self> {
        let autovoice_dir = data_dir.join("autovoice");
        fs::create_dir_all(&autovoice_dir).await?;

        info!("📁 Storage de auto-voice en: {}", autovoice_dir.display());

        let mut store = Self {
            data_dir,
            guilds: HashMap::new(),
        };

        store.load_all().await?;

        Ok(store)
    }

    // --- Triggers ---

    pub fn find_trigger(&self, guild_id: GuildId, channel_id: ChannelId) -> Option<TriggerConfig> {
        self.guilds
            .get(&guild_id.get())?
            .triggers
            .iter()
            .find(|trigger| trigger.trigger_channel_id == channel_id.get())
            .cloned()
    }

    pub fn is_trigger_enabled(&self, guild_id: GuildId, channel_id: ChannelId) -> bool {
        self.find_trigger(guild_id, channel_id)
            .map(|trigger| trigger.enabled)
            .unwrap_or(false)
    }

    pub fn list_triggers(&self, guild_id: GuildId) -> Vec<TriggerConfig> {
        self.guilds
            .get(&guild_id.get())
            .map(|guild| guild.triggers.clone())
            .unwrap_or_default()
    }

    /// Inserta o actualiza la configuración de un trigger.
    pub async fn save_trigger(&mut self, config: TriggerConfig) -> Result<()> {
        let guild_id = config.guild_id;
        let guild = self.guilds.entry(guild_id).or_default();

        match guild
            .triggers
            .iter_mut()
            .find(|trigger| trigger.trigger_channel_id == config.trigger_channel_id)
        {
            Some(existing) => *existing = config,
            None => guild.triggers.push(config),
        }

        self.persist_guild(guild_id).await
    }

    pub async fn remove_trigger(&mut self, guild_id: GuildId, channel_id: ChannelId) -> Result<bool> {
        let Some(guild) = self.guilds.get_mut(&guild_id.get()) else {
            return Ok(false);
        };

        let before = guild.triggers.len();
        guild
            .triggers
            .retain(|trigger| trigger.trigger_channel_id != channel_id.get());
        let removed = guild.triggers.len() != before;

        if removed {
            self.persist_guild(guild_id.get()).await?;
        }

        Ok(removed)
    }

    // --- Canales temporales ---

    pub fn find_temp(&self, guild_id: GuildId, channel_id: ChannelId) -> Option<TempChannelRecord> {
        self.guilds
            .get(&guild_id.get())?
            .temp_channels
            .iter()
            .find(|record| record.channel_id == channel_id.get())
            .cloned()
    }

    pub fn find_temp_by_owner(&self, guild_id: GuildId, owner_id: UserId) -> Option<TempChannelRecord> {
        self.guilds
            .get(&guild_id.get())?
            .temp_channels
            .iter()
            .find(|record| record.owner_id == owner_id.get())
            .cloned()
    }

    pub fn owner_has_temp(&self, guild_id: GuildId, owner_id: UserId) -> bool {
        self.find_temp_by_owner(guild_id, owner_id).is_some()
    }

    pub fn count_temp(&self, guild_id: GuildId) -> usize {
        self.guilds
            .get(&guild_id.get())
            .map(|guild| guild.temp_channels.len())
            .unwrap_or(0)
    }

    pub fn list_temp(&self, guild_id: GuildId) -> Vec<TempChannelRecord> {
        self.guilds
            .get(&guild_id.get())
            .map(|guild| guild.temp_channels.clone())
            .unwrap_or_default()
    }

    /// Inserta o actualiza un registro por id de canal.
    pub async fn save_temp(&mut self, record: TempChannelRecord) -> Result<()> {
        let guild_id = record.guild_id;
        let guild = self.guilds.entry(guild_id).or_default();

        match guild
            .temp_channels
            .iter_mut()
            .find(|existing| existing.channel_id == record.channel_id)
        {
            Some(existing) => *existing = record,
            None => guild.temp_channels.push(record),
        }

        self.persist_guild(guild_id).await
    }

    pub async fn remove_temp(&mut self, guild_id: GuildId, channel_id: ChannelId) -> Result<bool> {
        let Some(guild) = self.guilds.get_mut(&guild_id.get()) else {
            return Ok(false);
        };

        let before = guild.temp_channels.len();
        guild
            .temp_channels
            .retain(|record| record.channel_id != channel_id.get());
        let removed = guild.temp_channels.len() != before;

        if removed {
            self.persist_guild(guild_id.get()).await?;
        }

        Ok(removed)
    }

    /// Aplica una mutación a un registro existente y lo persiste.
    /// Devuelve false si el registro no existe.
    pub async fn update_temp<F>(&mut self, guild_id: GuildId, channel_id: ChannelId, mutate: F) -> Result<bool>
    where
        F: FnOnce(&mut TempChannelRecord),
    {
        let Some(guild) = self.guilds.get_mut(&guild_id.get()) else {
            return Ok(false);
        };

        let Some(record) = guild
            .temp_channels
            .iter_mut()
            .find(|record| record.channel_id == channel_id.get())
        else {
            return Ok(false);
        };

        mutate(record);
        self.persist_guild(guild_id.get()).await?;

        Ok(true)
    }

    // --- Privados ---

    async fn persist_guild(&self, guild_id: u64) -> Result<()> {
        let path = self.guild_file_path(guild_id);

        match self.guilds.get(&guild_id) {
            Some(guild) => {
                let content = serde_json::to_string_pretty(guild)?;
                fs::write(&path, content).await?;
            }
            None => {
                let _ = fs::remove_file(&path).await;
            }
        }

        Ok(())
    }

    async fn load_all(&mut self) -> Result<()> {
        let autovoice_dir = self.data_dir.join("autovoice");
        let mut files = fs::read_dir(&autovoice_dir).await?;
        let mut loaded_count = 0;

        while let Some(entry) = files.next_entry().await? {
            let path = entry.path();

            if !path.extension().is_some_and(|ext| ext == "json") {
                continue;
            }

            let Some(guild_id) = path
                .file_stem()
                .and_then(|name| name.to_str())
                .and_then(|name| name.strip_prefix("guild_"))
                .and_then(|raw| raw.parse::<u64>().ok())
            else {
                continue;
            };

            match fs::read_to_string(&path).await {
                Ok(content) => match serde_json::from_str::<GuildAutoVoice>(&content) {
                    Ok(guild) => {
                        self.guilds.insert(guild_id, guild);
                        loaded_count += 1;
                    }
                    Err(e) => warn!("Archivo de auto-voice corrupto para guild {guild_id}: {e}"),
                },
                Err(e) => warn!("Error leyendo configuración de guild {guild_id}: {e}"),
            }
        }

        if loaded_count > 0 {
            info!("📂 Cargadas {loaded_count} configuraciones de auto-voice");
        }

        Ok(())
    }

    fn guild_file_path(&self, guild_id: u64) -> PathBuf {
        self.data_dir
            .join("autovoice")
            .join(format!("guild_{guild_id}.json"))
    }
}
