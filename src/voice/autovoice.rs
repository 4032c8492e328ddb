use anyhow::Result;
use chrono::Utc;
use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex as TokioMutex;
use tracing::{debug, error, info, warn};

use crate::gateway::VoiceGateway;
use crate::storage::{AutoVoiceStore, TempChannelRecord, TriggerConfig};

/// Procedencia de la propiedad de un canal temporal: registro persistido
/// (flujo disparador → categoría) o solo el mapa en memoria (flujo del
/// canal de creación compartido). Cualquiera de las dos es autoritativa.
#[derive(Debug, Clone)]
pub enum ChannelOwnership {
    Persisted(TempChannelRecord),
    Ephemeral { owner_id: UserId },
}

impl ChannelOwnership {
    pub fn owner_id(&self) -> UserId {
        match self {
            ChannelOwnership::Persisted(record) => UserId::new(record.owner_id),
            ChannelOwnership::Ephemeral { owner_id } => *owner_id,
        }
    }

    pub fn record(&self) -> Option<&TempChannelRecord> {
        match self {
            ChannelOwnership::Persisted(record) => Some(record),
            ChannelOwnership::Ephemeral { .. } => None,
        }
    }
}

/// Gestiona los canales de voz temporales de todas las guilds.
///
/// La creación se serializa por (guild, usuario) con un lock consultivo
/// de vida corta: los chequeos previos son solo orientativos y se
/// repiten dentro del lock, que es donde valen de verdad. Los cooldowns
/// y la propiedad en memoria viven en mapas concurrentes compartidos.
pub struct AutoVoiceManager {
    store: Arc<TokioMutex<AutoVoiceStore>>,
    gateway: Arc<dyn VoiceGateway>,
    creation_locks: DashMap<(GuildId, UserId), Arc<TokioMutex<()>>>,
    creation_cooldowns: DashMap<UserId, Instant>,
    ephemeral_owners: DashMap<ChannelId, UserId>,
    create_channels: DashMap<GuildId, ChannelId>,
    cooldown: Duration,
    delete_grace: Duration,
}

impl AutoVoiceManager {
    pub fn new(
        store: Arc<TokioMutex<AutoVoiceStore>>,
        gateway: Arc<dyn VoiceGateway>,
        cooldown: Duration,
        delete_grace: Duration,
    ) -> Self {
        Self {
            store,
            gateway,
            creation_locks: DashMap::new(),
            creation_cooldowns: DashMap::new(),
            ephemeral_owners: DashMap::new(),
            create_channels: DashMap::new(),
            cooldown,
            delete_grace,
        }
    }

    // --- Configuración de triggers ---

    pub async fn is_trigger_channel(&self, guild_id: GuildId, channel_id: ChannelId) -> bool {
        self.store.lock().await.is_trigger_enabled(guild_id, channel_id)
    }

    /// Configura (o actualiza) un canal disparador. Valida que el canal
    /// y la categoría existan antes de persistir nada.
    pub async fn configure_trigger(
        &self,
        guild_id: GuildId,
        trigger_channel: ChannelId,
        category: Option<ChannelId>,
        max_user_limit: Option<u32>,
    ) -> Result<TriggerConfig> {
        if !self.gateway.voice_channel_exists(guild_id, trigger_channel) {
            anyhow::bail!("el canal disparador no existe o no es de voz");
        }

        if let Some(category) = category {
            if !self.gateway.category_exists(guild_id, category) {
                anyhow::bail!("la categoría indicada no existe");
            }
        }

        let mut store = self.store.lock().await;

        let mut config = store
            .find_trigger(guild_id, trigger_channel)
            .unwrap_or(TriggerConfig {
                guild_id: guild_id.get(),
                trigger_channel_id: trigger_channel.get(),
                category_id: None,
                max_user_limit: 0,
                enabled: true,
            });

        if let Some(category) = category {
            config.category_id = Some(category.get());
        }
        if let Some(limit) = max_user_limit {
            config.max_user_limit = limit;
        }
        config.enabled = true;

        store.save_trigger(config.clone()).await?;

        info!(
            "⚙️ Trigger de auto-voice configurado: guild={guild_id} canal={trigger_channel}"
        );

        Ok(config)
    }

    pub async fn remove_trigger(&self, guild_id: GuildId, trigger_channel: ChannelId) -> Result<bool> {
        let removed = self
            .store
            .lock()
            .await
            .remove_trigger(guild_id, trigger_channel)
            .await?;

        if removed {
            info!("🗑️ Trigger eliminado: guild={guild_id} canal={trigger_channel}");
        }

        Ok(removed)
    }

    pub async fn list_triggers(&self, guild_id: GuildId) -> Vec<TriggerConfig> {
        self.store.lock().await.list_triggers(guild_id)
    }

    pub async fn active_temp_channel_count(&self, guild_id: GuildId) -> usize {
        self.store.lock().await.count_temp(guild_id)
    }

    // --- Propiedad y consultas ---

    /// Busca la propiedad de un canal en ambas procedencias.
    pub async fn ownership_of(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Option<ChannelOwnership> {
        if let Some(record) = self.store.lock().await.find_temp(guild_id, channel_id) {
            return Some(ChannelOwnership::Persisted(record));
        }

        self.ephemeral_owners
            .get(&channel_id)
            .map(|owner| ChannelOwnership::Ephemeral { owner_id: *owner })
    }

    pub async fn is_temporary_channel(&self, guild_id: GuildId, channel_id: ChannelId) -> bool {
        self.ownership_of(guild_id, channel_id).await.is_some()
    }

    pub async fn is_member_channel_owner(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        user_id: UserId,
    ) -> bool {
        self.ownership_of(guild_id, channel_id)
            .await
            .map(|ownership| ownership.owner_id() == user_id)
            .unwrap_or(false)
    }

    pub async fn temp_channel_by_owner(
        &self,
        guild_id: GuildId,
        owner_id: UserId,
    ) -> Option<TempChannelRecord> {
        self.store.lock().await.find_temp_by_owner(guild_id, owner_id)
    }

    pub fn is_on_cooldown(&self, user_id: UserId) -> bool {
        self.creation_cooldowns
            .get(&user_id)
            .map(|stamp| stamp.elapsed() < self.cooldown)
            .unwrap_or(false)
    }

    pub async fn owner_has_temp_channel(&self, guild_id: GuildId, owner_id: UserId) -> bool {
        self.store.lock().await.owner_has_temp(guild_id, owner_id)
    }

    /// Registra la propiedad en memoria de un canal creado por el flujo
    /// del canal de creación compartido.
    pub fn register_ephemeral_owner(&self, channel_id: ChannelId, owner_id: UserId) {
        self.ephemeral_owners.insert(channel_id, owner_id);
        debug!("Propietario efímero registrado: canal={channel_id} dueño={owner_id}");
    }

    pub fn unregister_ephemeral_owner(&self, channel_id: ChannelId) {
        self.ephemeral_owners.remove(&channel_id);
        debug!("Propietario efímero eliminado: canal={channel_id}");
    }

    // --- Canal de creación compartido ---

    /// Define el canal de creación compartido de la guild: entrar a él
    /// crea un canal personal cuyo dueño se registra solo en memoria.
    pub fn set_create_channel(&self, guild_id: GuildId, channel_id: ChannelId) {
        self.create_channels.insert(guild_id, channel_id);
        info!("⚙️ Canal de creación de guild {guild_id}: {channel_id}");
    }

    pub fn is_create_channel(&self, guild_id: GuildId, channel_id: ChannelId) -> bool {
        self.create_channels
            .get(&guild_id)
            .map(|configured| *configured == channel_id)
            .unwrap_or(false)
    }

    /// Crea el canal personal del flujo simple. Mismas guardas que el
    /// flujo persistido (lock por usuario y cooldown), pero la propiedad
    /// queda únicamente en el mapa en memoria.
    pub async fn create_ephemeral_channel(
        &self,
        guild_id: GuildId,
        owner_id: UserId,
        owner_name: &str,
    ) -> Option<ChannelId> {
        if self.user_owns_ephemeral(owner_id) || self.is_on_cooldown(owner_id) {
            return None;
        }

        let key = (guild_id, owner_id);
        let lock = self
            .creation_locks
            .entry(key)
            .or_insert_with(|| Arc::new(TokioMutex::new(())))
            .clone();

        let result = {
            let _guard = lock.lock().await;

            if self.user_owns_ephemeral(owner_id) || self.is_on_cooldown(owner_id) {
                None
            } else {
                let channel_name = format!("Sala de {owner_name}");
                match self
                    .gateway
                    .create_voice_channel(guild_id, &channel_name, None, None)
                    .await
                {
                    Ok(channel_id) => {
                        self.register_ephemeral_owner(channel_id, owner_id);
                        self.creation_cooldowns.insert(owner_id, Instant::now());
                        info!("🏠 Canal personal {channel_id} creado para {owner_id}");
                        Some(channel_id)
                    }
                    Err(e) => {
                        error!("No se pudo crear el canal personal para {owner_id}: {e:#}");
                        None
                    }
                }
            }
        };

        self.creation_locks.remove(&key);

        result
    }

    fn user_owns_ephemeral(&self, owner_id: UserId) -> bool {
        self.ephemeral_owners
            .iter()
            .any(|entry| *entry.value() == owner_id)
    }

    // --- Creación ---

    /// Crea un canal temporal para el usuario. Devuelve `None` ante
    /// cualquier precondición fallida o error de plataforma: el llamador
    /// no debe hacer nada en ese caso, no es un fallo reintentable.
    pub async fn create_temp_channel(
        &self,
        guild_id: GuildId,
        owner_id: UserId,
        owner_name: &str,
        trigger_channel: ChannelId,
    ) -> Option<TempChannelRecord> {
        // Chequeos consultivos fuera del lock
        if self.owner_has_temp_channel(guild_id, owner_id).await {
            debug!("El usuario {owner_id} ya tiene un canal temporal en {guild_id}");
            return None;
        }

        if self.is_on_cooldown(owner_id) {
            debug!("El usuario {owner_id} está en cooldown de creación");
            return None;
        }

        let key = (guild_id, owner_id);
        let lock = self
            .creation_locks
            .entry(key)
            .or_insert_with(|| Arc::new(TokioMutex::new(())))
            .clone();

        let result = {
            let _guard = lock.lock().await;
            self.try_create(guild_id, owner_id, owner_name, trigger_channel).await
        };

        self.creation_locks.remove(&key);

        result
    }

    /// Intento de creación dentro del lock por (guild, usuario): acá los
    /// rechequeos sí son autoritativos.
    async fn try_create(
        &self,
        guild_id: GuildId,
        owner_id: UserId,
        owner_name: &str,
        trigger_channel: ChannelId,
    ) -> Option<TempChannelRecord> {
        if self.owner_has_temp_channel(guild_id, owner_id).await {
            debug!("Carrera perdida: {owner_id} ya tiene canal en {guild_id}");
            return None;
        }

        if self.is_on_cooldown(owner_id) {
            debug!("Carrera perdida: {owner_id} entró en cooldown");
            return None;
        }

        let (category, user_limit) = {
            let store = self.store.lock().await;
            match store.find_trigger(guild_id, trigger_channel) {
                Some(config) => (
                    config.category_id.map(ChannelId::new),
                    (config.max_user_limit > 0).then_some(config.max_user_limit),
                ),
                None => (None, None),
            }
        };

        let channel_name = format!("Sala de {owner_name}");

        let channel_id = match self
            .gateway
            .create_voice_channel(guild_id, &channel_name, category, user_limit)
            .await
        {
            Ok(channel_id) => channel_id,
            Err(e) => {
                error!("No se pudo crear el canal temporal para {owner_id}: {e:#}");
                return None;
            }
        };

        let record = TempChannelRecord {
            guild_id: guild_id.get(),
            channel_id: channel_id.get(),
            owner_id: owner_id.get(),
            trigger_channel_id: trigger_channel.get(),
            channel_name,
            user_limit: user_limit.unwrap_or(0),
            locked: false,
            created_at: Utc::now(),
        };

        if let Err(e) = self.store.lock().await.save_temp(record.clone()).await {
            error!("No se pudo persistir el canal temporal {channel_id}: {e:#}");
            return None;
        }

        self.creation_cooldowns.insert(owner_id, Instant::now());

        info!(
            "🏠 Canal temporal {channel_id} creado para {owner_id} en guild {guild_id}"
        );

        Some(record)
    }

    // --- Borrado ---

    /// Borra un canal temporal y su registro. Idempotente: sin registro
    /// (en ninguna procedencia) no hace nada.
    pub async fn delete_temp_channel(&self, guild_id: GuildId, channel_id: ChannelId) {
        let removed = match self.store.lock().await.remove_temp(guild_id, channel_id).await {
            Ok(removed) => removed,
            Err(e) => {
                error!("No se pudo eliminar el registro del canal {channel_id}: {e:#}");
                false
            }
        };

        let was_ephemeral = self.ephemeral_owners.contains_key(&channel_id);
        if was_ephemeral {
            self.unregister_ephemeral_owner(channel_id);
        }

        if !removed && !was_ephemeral {
            debug!("Sin registro temporal para el canal {channel_id}");
            return;
        }

        // Mejor esfuerzo: el canal puede haber sido borrado externamente
        if let Err(e) = self.gateway.delete_channel(channel_id).await {
            warn!("No se pudo borrar el canal {channel_id} en Discord: {e:#}");
        }

        info!("🗑️ Canal temporal {channel_id} eliminado en guild {guild_id}");
    }

    /// Un canal debe borrarse cuando no le quedan miembros humanos.
    pub fn should_delete_channel(&self, guild_id: GuildId, channel_id: ChannelId) -> bool {
        self.gateway.human_member_count(guild_id, channel_id) == Some(0)
    }

    /// Reacciona a la salida de un miembro de un canal temporal. El
    /// borrado no es inmediato: una task re-muestrea la membresía tras
    /// la ventana de gracia, sin retener ningún lock mientras espera,
    /// para que una reconexión breve no destruya el canal.
    pub async fn handle_temp_channel_leave(self: Arc<Self>, guild_id: GuildId, channel_id: ChannelId) {
        if !self.is_temporary_channel(guild_id, channel_id).await {
            return;
        }

        // El canal ya no existe: solo queda limpiar el registro
        if self.gateway.human_member_count(guild_id, channel_id).is_none() {
            self.delete_temp_channel(guild_id, channel_id).await;
            return;
        }

        // Primer muestreo, solo orientativo
        if !self.should_delete_channel(guild_id, channel_id) {
            return;
        }

        info!("📉 Canal temporal {channel_id} vacío, programando borrado");

        let manager = Arc::clone(&self);
        tokio::spawn(async move {
            tokio::time::sleep(manager.delete_grace).await;

            // Segundo muestreo, el que decide
            match manager.gateway.human_member_count(guild_id, channel_id) {
                Some(0) | None => manager.delete_temp_channel(guild_id, channel_id).await,
                Some(_) => debug!("El canal {channel_id} volvió a tener miembros, sobrevive"),
            }
        });
    }

    /// Elimina registros cuyos canales ya no existen en Discord.
    pub async fn cleanup_orphaned(&self, guild_id: GuildId) -> usize {
        let records = self.store.lock().await.list_temp(guild_id);
        let mut cleaned = 0;

        for record in records {
            let channel_id = ChannelId::new(record.channel_id);
            if !self.gateway.voice_channel_exists(guild_id, channel_id) {
                match self.store.lock().await.remove_temp(guild_id, channel_id).await {
                    Ok(true) => {
                        cleaned += 1;
                        info!("🧹 Registro huérfano eliminado: canal {channel_id}");
                    }
                    Ok(false) => {}
                    Err(e) => error!("No se pudo limpiar el registro {channel_id}: {e:#}"),
                }
            }
        }

        cleaned
    }

    // --- Mutaciones del dueño ---

    /// Bloquea el canal para que solo el dueño pueda conectarse.
    pub async fn lock_channel(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        requester: UserId,
    ) -> bool {
        self.set_channel_locked(guild_id, channel_id, requester, true).await
    }

    pub async fn unlock_channel(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        requester: UserId,
    ) -> bool {
        self.set_channel_locked(guild_id, channel_id, requester, false).await
    }

    async fn set_channel_locked(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        requester: UserId,
        locked: bool,
    ) -> bool {
        let Some(ownership) = self.ownership_of(guild_id, channel_id).await else {
            return false;
        };

        if ownership.owner_id() != requester {
            debug!("{requester} intentó cambiar el bloqueo del canal {channel_id} ajeno");
            return false;
        }

        if let Err(e) = self
            .gateway
            .set_locked(guild_id, channel_id, ownership.owner_id(), locked)
            .await
        {
            error!("No se pudo cambiar el bloqueo del canal {channel_id}: {e:#}");
            return false;
        }

        if ownership.record().is_some() {
            if let Err(e) = self
                .store
                .lock()
                .await
                .update_temp(guild_id, channel_id, |record| record.locked = locked)
                .await
            {
                error!("No se pudo persistir el bloqueo del canal {channel_id}: {e:#}");
            }
        }

        info!(
            "{} Canal {channel_id} {} por su dueño",
            if locked { "🔒" } else { "🔓" },
            if locked { "bloqueado" } else { "desbloqueado" }
        );

        true
    }

    /// Renombra el canal. Solo el dueño puede hacerlo.
    pub async fn rename_channel(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        new_name: &str,
        requester: UserId,
    ) -> bool {
        let Some(ownership) = self.ownership_of(guild_id, channel_id).await else {
            return false;
        };

        if ownership.owner_id() != requester {
            debug!("{requester} intentó renombrar el canal {channel_id} ajeno");
            return false;
        }

        if let Err(e) = self.gateway.rename_channel(channel_id, new_name).await {
            error!("No se pudo renombrar el canal {channel_id}: {e:#}");
            return false;
        }

        if ownership.record().is_some() {
            let new_name = new_name.to_string();
            if let Err(e) = self
                .store
                .lock()
                .await
                .update_temp(guild_id, channel_id, move |record| {
                    record.channel_name = new_name;
                })
                .await
            {
                error!("No se pudo persistir el nombre del canal {channel_id}: {e:#}");
            }
        }

        info!("✏️ Canal {channel_id} renombrado");
        true
    }

    /// Cambia el límite de usuarios. Solo el dueño puede hacerlo.
    pub async fn set_user_limit(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        limit: u32,
        requester: UserId,
    ) -> bool {
        let Some(ownership) = self.ownership_of(guild_id, channel_id).await else {
            return false;
        };

        if ownership.owner_id() != requester {
            return false;
        }

        if let Err(e) = self.gateway.set_user_limit(channel_id, limit).await {
            error!("No se pudo cambiar el límite del canal {channel_id}: {e:#}");
            return false;
        }

        if ownership.record().is_some() {
            if let Err(e) = self
                .store
                .lock()
                .await
                .update_temp(guild_id, channel_id, |record| record.user_limit = limit)
                .await
            {
                error!("No se pudo persistir el límite del canal {channel_id}: {e:#}");
            }
        }

        info!("👥 Límite del canal {channel_id} fijado en {limit}");
        true
    }

    /// Transfiere la propiedad del canal a otro usuario.
    pub async fn transfer_ownership(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        new_owner: UserId,
    ) -> bool {
        let Some(ownership) = self.ownership_of(guild_id, channel_id).await else {
            return false;
        };

        match ownership {
            ChannelOwnership::Persisted(_) => {
                match self
                    .store
                    .lock()
                    .await
                    .update_temp(guild_id, channel_id, |record| {
                        record.owner_id = new_owner.get();
                    })
                    .await
                {
                    Ok(true) => {
                        info!("🤝 Canal {channel_id} transferido a {new_owner}");
                        true
                    }
                    Ok(false) => false,
                    Err(e) => {
                        error!("No se pudo transferir el canal {channel_id}: {e:#}");
                        false
                    }
                }
            }
            ChannelOwnership::Ephemeral { .. } => {
                self.ephemeral_owners.insert(channel_id, new_owner);
                info!("🤝 Canal {channel_id} transferido a {new_owner}");
                true
            }
        }
    }
}
