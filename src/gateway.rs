use anyhow::{Context as AnyhowContext, Result};
use async_trait::async_trait;
use serenity::all::{
    ChannelType, CreateChannel, EditChannel, EditMember, PermissionOverwrite,
    PermissionOverwriteType, Permissions,
};
use serenity::model::id::{ChannelId, GuildId, RoleId, UserId};
use serenity::prelude::Context;
use songbird::Songbird;
use std::sync::{Arc, OnceLock};
use tracing::info;

/// Superficie del gateway de Discord que necesita el núcleo: estado de
/// voz, gestión de canales y overrides de permisos. Los tests usan el
/// mock generado por `mockall`; en producción la implementa
/// [`SerenityGateway`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VoiceGateway: Send + Sync {
    /// Canal de voz que ocupa el usuario, según la caché.
    fn voice_channel_of(&self, guild_id: GuildId, user_id: UserId) -> Option<ChannelId>;

    /// Canal de voz que ocupa el propio bot, si está conectado.
    fn bot_voice_channel(&self, guild_id: GuildId) -> Option<ChannelId>;

    /// Cantidad de miembros humanos en un canal de voz. `None` si el
    /// canal ya no existe en la caché.
    fn human_member_count(&self, guild_id: GuildId, channel_id: ChannelId) -> Option<usize>;

    fn voice_channel_exists(&self, guild_id: GuildId, channel_id: ChannelId) -> bool;

    fn category_exists(&self, guild_id: GuildId, channel_id: ChannelId) -> bool;

    async fn connect_voice(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<()>;

    async fn disconnect_voice(&self, guild_id: GuildId) -> Result<()>;

    async fn create_voice_channel(
        &self,
        guild_id: GuildId,
        name: &str,
        category: Option<ChannelId>,
        user_limit: Option<u32>,
    ) -> Result<ChannelId>;

    async fn delete_channel(&self, channel_id: ChannelId) -> Result<()>;

    async fn rename_channel(&self, channel_id: ChannelId, name: &str) -> Result<()>;

    async fn set_user_limit(&self, channel_id: ChannelId, limit: u32) -> Result<()>;

    async fn move_member(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        channel_id: ChannelId,
    ) -> Result<()>;

    /// Bloquea o desbloquea la conexión al canal: al bloquear, @everyone
    /// pierde CONNECT y el dueño lo conserva; al desbloquear se restaura.
    async fn set_locked(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        owner_id: UserId,
        locked: bool,
    ) -> Result<()>;
}

/// Implementación real sobre serenity + songbird.
///
/// El `Context` de serenity recién existe cuando llega el evento
/// `ready`, así que se enlaza en ese momento con [`SerenityGateway::bind`].
pub struct SerenityGateway {
    songbird: Arc<Songbird>,
    ctx: OnceLock<Context>,
}

impl SerenityGateway {
    pub fn new(songbird: Arc<Songbird>) -> Self {
        Self {
            songbird,
            ctx: OnceLock::new(),
        }
    }

    /// Enlaza el contexto de serenity. Se llama una vez desde `ready`.
    pub fn bind(&self, ctx: Context) {
        if self.ctx.set(ctx).is_ok() {
            info!("🔗 Gateway de Discord enlazado");
        }
    }

    fn context(&self) -> Result<&Context> {
        self.ctx
            .get()
            .context("el gateway todavía no recibió el evento ready")
    }
}

#[async_trait]
impl VoiceGateway for SerenityGateway {
    fn voice_channel_of(&self, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
        let ctx = self.ctx.get()?;
        let guild = ctx.cache.guild(guild_id)?;
        guild
            .voice_states
            .get(&user_id)
            .and_then(|state| state.channel_id)
    }

    fn bot_voice_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        let ctx = self.ctx.get()?;
        let bot_id = ctx.cache.current_user().id;
        let guild = ctx.cache.guild(guild_id)?;
        guild
            .voice_states
            .get(&bot_id)
            .and_then(|state| state.channel_id)
    }

    fn human_member_count(&self, guild_id: GuildId, channel_id: ChannelId) -> Option<usize> {
        let ctx = self.ctx.get()?;
        let guild = ctx.cache.guild(guild_id)?;

        guild.channels.get(&channel_id)?;

        let humans = guild
            .voice_states
            .values()
            .filter(|state| state.channel_id == Some(channel_id))
            .filter(|state| {
                state
                    .member
                    .as_ref()
                    .map(|member| !member.user.bot)
                    .unwrap_or(true)
            })
            .count();

        Some(humans)
    }

    fn voice_channel_exists(&self, guild_id: GuildId, channel_id: ChannelId) -> bool {
        let Some(ctx) = self.ctx.get() else { return false };
        ctx.cache
            .guild(guild_id)
            .and_then(|guild| {
                guild
                    .channels
                    .get(&channel_id)
                    .map(|channel| channel.kind == ChannelType::Voice)
            })
            .unwrap_or(false)
    }

    fn category_exists(&self, guild_id: GuildId, channel_id: ChannelId) -> bool {
        let Some(ctx) = self.ctx.get() else { return false };
        ctx.cache
            .guild(guild_id)
            .and_then(|guild| {
                guild
                    .channels
                    .get(&channel_id)
                    .map(|channel| channel.kind == ChannelType::Category)
            })
            .unwrap_or(false)
    }

    async fn connect_voice(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<()> {
        self.songbird
            .join_gateway(guild_id, channel_id)
            .await
            .map(|_| ())
            .context("no se pudo unir al canal de voz")
    }

    async fn disconnect_voice(&self, guild_id: GuildId) -> Result<()> {
        self.songbird
            .remove(guild_id)
            .await
            .context("no se pudo abandonar el canal de voz")
    }

    async fn create_voice_channel(
        &self,
        guild_id: GuildId,
        name: &str,
        category: Option<ChannelId>,
        user_limit: Option<u32>,
    ) -> Result<ChannelId> {
        let ctx = self.context()?;

        let mut builder = CreateChannel::new(name).kind(ChannelType::Voice);
        if let Some(category) = category {
            builder = builder.category(category);
        }
        if let Some(limit) = user_limit {
            builder = builder.user_limit(limit);
        }

        let channel = guild_id.create_channel(&ctx.http, builder).await?;
        Ok(channel.id)
    }

    async fn delete_channel(&self, channel_id: ChannelId) -> Result<()> {
        let ctx = self.context()?;
        channel_id.delete(&ctx.http).await?;
        Ok(())
    }

    async fn rename_channel(&self, channel_id: ChannelId, name: &str) -> Result<()> {
        let ctx = self.context()?;
        channel_id.edit(&ctx.http, EditChannel::new().name(name)).await?;
        Ok(())
    }

    async fn set_user_limit(&self, channel_id: ChannelId, limit: u32) -> Result<()> {
        let ctx = self.context()?;
        channel_id
            .edit(&ctx.http, EditChannel::new().user_limit(limit))
            .await?;
        Ok(())
    }

    async fn move_member(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        channel_id: ChannelId,
    ) -> Result<()> {
        let ctx = self.context()?;
        guild_id
            .edit_member(&ctx.http, user_id, EditMember::new().voice_channel(channel_id))
            .await?;
        Ok(())
    }

    async fn set_locked(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        owner_id: UserId,
        locked: bool,
    ) -> Result<()> {
        let ctx = self.context()?;
        // El rol @everyone comparte id con la guild
        let everyone = RoleId::new(guild_id.get());

        if locked {
            channel_id
                .create_permission(
                    &ctx.http,
                    PermissionOverwrite {
                        allow: Permissions::empty(),
                        deny: Permissions::CONNECT,
                        kind: PermissionOverwriteType::Role(everyone),
                    },
                )
                .await?;

            channel_id
                .create_permission(
                    &ctx.http,
                    PermissionOverwrite {
                        allow: Permissions::CONNECT | Permissions::VIEW_CHANNEL,
                        deny: Permissions::empty(),
                        kind: PermissionOverwriteType::Member(owner_id),
                    },
                )
                .await?;
        } else {
            channel_id
                .create_permission(
                    &ctx.http,
                    PermissionOverwrite {
                        allow: Permissions::CONNECT | Permissions::VIEW_CHANNEL,
                        deny: Permissions::empty(),
                        kind: PermissionOverwriteType::Role(everyone),
                    },
                )
                .await?;
        }

        Ok(())
    }
}
