use anyhow::Result;
use serenity::{
    builder::{
        CreateInteractionResponse, CreateInteractionResponseMessage, EditInteractionResponse,
    },
    model::application::{CommandDataOption, CommandDataOptionValue, CommandInteraction},
    model::id::{ChannelId, GuildId},
    prelude::Context,
};
use tracing::info;

use crate::audio::Requester;
use crate::bot::TempoBot;
use crate::gateway::VoiceGateway;
use crate::voice::ChannelOwnership;

/// Subcomandos de /autovoice. El conjunto es cerrado: cada variante se
/// despacha exhaustivamente en `handle_autovoice`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AutoVoiceAction {
    Setup,
    Remove,
    List,
    Lock,
    Unlock,
    Rename,
    Limit,
    Info,
}

impl AutoVoiceAction {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "setup" => Some(Self::Setup),
            "remove" => Some(Self::Remove),
            "list" => Some(Self::List),
            "lock" => Some(Self::Lock),
            "unlock" => Some(Self::Unlock),
            "rename" => Some(Self::Rename),
            "limit" => Some(Self::Limit),
            "info" => Some(Self::Info),
            _ => None,
        }
    }
}

/// Maneja comandos slash.
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &TempoBot,
) -> Result<()> {
    let Some(guild_id) = command.guild_id else {
        return respond_ephemeral(ctx, &command, "❌ Este comando solo funciona en un servidor.")
            .await;
    };

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "play" => handle_play(ctx, command, bot, guild_id).await,
        "stop" => {
            let reply = bot.player.stop(guild_id).await;
            respond(ctx, &command, reply).await
        }
        "next" => {
            let reply = bot.player.next(guild_id).await;
            respond(ctx, &command, reply).await
        }
        "previous" => {
            let reply = bot.player.previous(guild_id).await;
            respond(ctx, &command, reply).await
        }
        "pause" => {
            let reply = bot.player.pause(guild_id).await;
            respond(ctx, &command, reply).await
        }
        "resume" => {
            let reply = bot.player.resume(guild_id).await;
            respond(ctx, &command, reply).await
        }
        "set-create-channel" => handle_set_create_channel(ctx, command, bot, guild_id).await,
        "autovoice" => handle_autovoice(ctx, command, bot, guild_id).await,
        _ => respond_ephemeral(ctx, &command, "❌ Comando no reconocido").await,
    }
}

async fn handle_set_create_channel(
    ctx: &Context,
    command: CommandInteraction,
    bot: &TempoBot,
    guild_id: GuildId,
) -> Result<()> {
    if !is_admin(&command) {
        return respond_ephemeral(
            ctx,
            &command,
            "❌ Necesitas permiso de Administrador para usar este comando.",
        )
        .await;
    }

    let Some(channel_id) = command
        .data
        .options
        .iter()
        .find(|option| option.name == "channel")
        .and_then(|option| option.value.as_channel_id())
    else {
        return respond_ephemeral(ctx, &command, "❌ Selecciona un canal de voz.").await;
    };

    if !bot.gateway.voice_channel_exists(guild_id, channel_id) {
        return respond_ephemeral(ctx, &command, "❌ Selecciona un canal de voz.").await;
    }

    bot.autovoice.set_create_channel(guild_id, channel_id);

    respond_ephemeral(
        ctx,
        &command,
        &format!("✅ Canal de creación configurado: <#{channel_id}>"),
    )
    .await
}

async fn handle_play(
    ctx: &Context,
    command: CommandInteraction,
    bot: &TempoBot,
    guild_id: GuildId,
) -> Result<()> {
    let query = command
        .data
        .options
        .iter()
        .find(|option| option.name == "query")
        .and_then(|option| option.value.as_str())
        .ok_or_else(|| anyhow::anyhow!("query no proporcionado"))?
        .to_string();

    // Defer: resolver la consulta contra el nodo puede tomar tiempo
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let requester = Requester {
        user_id: command.user.id,
        display_name: display_name(&command),
    };

    let reply = bot.player.play(guild_id, &requester, &query).await;

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().content(reply))
        .await?;

    Ok(())
}

async fn handle_autovoice(
    ctx: &Context,
    command: CommandInteraction,
    bot: &TempoBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some((name, options)) = subcommand(&command) else {
        return respond_ephemeral(ctx, &command, "❌ Subcomando inválido.").await;
    };

    let Some(action) = AutoVoiceAction::parse(name) else {
        return respond_ephemeral(ctx, &command, "❌ Subcomando desconocido.").await;
    };

    let options = options.to_vec();
    match action {
        AutoVoiceAction::Setup => handle_setup(ctx, command, bot, guild_id, options).await,
        AutoVoiceAction::Remove => handle_remove(ctx, command, bot, guild_id, options).await,
        AutoVoiceAction::List => handle_list(ctx, command, bot, guild_id).await,
        AutoVoiceAction::Lock => handle_lock(ctx, command, bot, guild_id, true).await,
        AutoVoiceAction::Unlock => handle_lock(ctx, command, bot, guild_id, false).await,
        AutoVoiceAction::Rename => handle_rename(ctx, command, bot, guild_id, options).await,
        AutoVoiceAction::Limit => handle_limit(ctx, command, bot, guild_id, options).await,
        AutoVoiceAction::Info => handle_info(ctx, command, bot, guild_id).await,
    }
}

async fn handle_setup(
    ctx: &Context,
    command: CommandInteraction,
    bot: &TempoBot,
    guild_id: GuildId,
    options: Vec<CommandDataOption>,
) -> Result<()> {
    if !is_admin(&command) {
        return respond_ephemeral(
            ctx,
            &command,
            "❌ Necesitas permiso de Administrador para usar este comando.",
        )
        .await;
    }

    let Some(trigger) = channel_option(&options, "trigger") else {
        return respond_ephemeral(ctx, &command, "❌ Indica el canal disparador.").await;
    };
    let category = channel_option(&options, "category");
    let max_users = integer_option(&options, "maxusers").map(|value| value.clamp(0, 99) as u32);

    match bot
        .autovoice
        .configure_trigger(guild_id, trigger, category, max_users)
        .await
    {
        Ok(config) => {
            let mut reply = format!(
                "✅ **Disparador de auto-voice configurado**\n\n**Canal:** <#{trigger}>\n"
            );
            if let Some(category) = config.category_id {
                reply.push_str(&format!("**Categoría:** <#{category}>\n"));
            }
            let limit_text = if config.max_user_limit > 0 {
                config.max_user_limit.to_string()
            } else {
                "Sin límite".to_string()
            };
            reply.push_str(&format!(
                "**Máximo de usuarios:** {limit_text}\n\nCuando alguien entre al canal disparador se le creará un canal temporal."
            ));
            respond(ctx, &command, reply).await
        }
        Err(e) => respond_ephemeral(ctx, &command, &format!("❌ {e}")).await,
    }
}

async fn handle_remove(
    ctx: &Context,
    command: CommandInteraction,
    bot: &TempoBot,
    guild_id: GuildId,
    options: Vec<CommandDataOption>,
) -> Result<()> {
    if !is_admin(&command) {
        return respond_ephemeral(
            ctx,
            &command,
            "❌ Necesitas permiso de Administrador para usar este comando.",
        )
        .await;
    }

    let Some(trigger) = channel_option(&options, "trigger") else {
        return respond_ephemeral(ctx, &command, "❌ Indica el canal disparador.").await;
    };

    match bot.autovoice.remove_trigger(guild_id, trigger).await {
        Ok(true) => {
            respond(ctx, &command, format!("✅ Configuración eliminada para <#{trigger}>")).await
        }
        Ok(false) => {
            respond_ephemeral(ctx, &command, "❌ Ese canal no está configurado como disparador.")
                .await
        }
        Err(e) => respond_ephemeral(ctx, &command, &format!("❌ {e}")).await,
    }
}

async fn handle_list(
    ctx: &Context,
    command: CommandInteraction,
    bot: &TempoBot,
    guild_id: GuildId,
) -> Result<()> {
    let triggers = bot.autovoice.list_triggers(guild_id).await;
    let active = bot.autovoice.active_temp_channel_count(guild_id).await;

    if triggers.is_empty() {
        return respond_ephemeral(
            ctx,
            &command,
            "📋 No hay canales disparadores configurados.\n\nUsa `/autovoice setup` para configurar uno.",
        )
        .await;
    }

    let mut reply = format!(
        "📋 **Configuración de auto-voice**\n\n**Canales temporales activos:** {active}\n\n**Disparadores:**\n"
    );

    for trigger in triggers {
        reply.push_str(&format!("• <#{}>", trigger.trigger_channel_id));
        if let Some(category) = trigger.category_id {
            reply.push_str(&format!(" → Categoría: <#{category}>"));
        }
        if trigger.max_user_limit > 0 {
            reply.push_str(&format!(" | Máx: {}", trigger.max_user_limit));
        }
        reply.push_str(if trigger.enabled { " ✅" } else { " ⚠️ Deshabilitado" });
        reply.push('\n');
    }

    respond(ctx, &command, reply).await
}

async fn handle_lock(
    ctx: &Context,
    command: CommandInteraction,
    bot: &TempoBot,
    guild_id: GuildId,
    lock: bool,
) -> Result<()> {
    let Some(channel_id) = member_voice_channel(bot, guild_id, &command) else {
        return respond_ephemeral(
            ctx,
            &command,
            "❌ Debes estar en un canal de voz para usar este comando.",
        )
        .await;
    };

    let Some(ownership) = bot.autovoice.ownership_of(guild_id, channel_id).await else {
        return respond_ephemeral(ctx, &command, "❌ Este no es un canal de voz temporal.").await;
    };

    if ownership.owner_id() != command.user.id {
        let verb = if lock { "bloquear" } else { "desbloquear" };
        return respond_ephemeral(
            ctx,
            &command,
            &format!("❌ Solo el dueño puede {verb} este canal."),
        )
        .await;
    }

    if let ChannelOwnership::Persisted(record) = &ownership {
        if record.locked == lock {
            let state = if lock { "bloqueado" } else { "desbloqueado" };
            return respond_ephemeral(ctx, &command, &format!("⚠️ El canal ya está {state}.")).await;
        }
    }

    let success = if lock {
        bot.autovoice.lock_channel(guild_id, channel_id, command.user.id).await
    } else {
        bot.autovoice.unlock_channel(guild_id, channel_id, command.user.id).await
    };

    if success {
        let reply = if lock {
            "🔒 Tu canal quedó bloqueado. Solo tú puedes entrar ahora."
        } else {
            "🔓 Tu canal quedó desbloqueado. Cualquiera puede entrar."
        };
        respond(ctx, &command, reply.to_string()).await
    } else {
        respond_ephemeral(ctx, &command, "❌ No se pudo cambiar el bloqueo del canal.").await
    }
}

async fn handle_rename(
    ctx: &Context,
    command: CommandInteraction,
    bot: &TempoBot,
    guild_id: GuildId,
    options: Vec<CommandDataOption>,
) -> Result<()> {
    let Some(new_name) = string_option(&options, "name") else {
        return respond_ephemeral(ctx, &command, "❌ Indica el nuevo nombre del canal.").await;
    };

    if new_name.len() > 100 {
        return respond_ephemeral(
            ctx,
            &command,
            "❌ El nombre debe tener 100 caracteres o menos.",
        )
        .await;
    }

    let Some(channel_id) = member_voice_channel(bot, guild_id, &command) else {
        return respond_ephemeral(
            ctx,
            &command,
            "❌ Debes estar en un canal de voz para usar este comando.",
        )
        .await;
    };

    if !bot.autovoice.is_temporary_channel(guild_id, channel_id).await {
        return respond_ephemeral(ctx, &command, "❌ Este no es un canal de voz temporal.").await;
    }

    if !bot
        .autovoice
        .is_member_channel_owner(guild_id, channel_id, command.user.id)
        .await
    {
        return respond_ephemeral(ctx, &command, "❌ Solo el dueño puede renombrar este canal.")
            .await;
    }

    if bot
        .autovoice
        .rename_channel(guild_id, channel_id, &new_name, command.user.id)
        .await
    {
        respond(ctx, &command, format!("✏️ Canal renombrado a **{new_name}**")).await
    } else {
        respond_ephemeral(ctx, &command, "❌ No se pudo renombrar el canal.").await
    }
}

async fn handle_limit(
    ctx: &Context,
    command: CommandInteraction,
    bot: &TempoBot,
    guild_id: GuildId,
    options: Vec<CommandDataOption>,
) -> Result<()> {
    let Some(limit) = integer_option(&options, "max") else {
        return respond_ephemeral(ctx, &command, "❌ Indica el máximo de usuarios.").await;
    };

    if !(0..=99).contains(&limit) {
        return respond_ephemeral(ctx, &command, "❌ El límite debe estar entre 0 y 99.").await;
    }
    let limit = limit as u32;

    let Some(channel_id) = member_voice_channel(bot, guild_id, &command) else {
        return respond_ephemeral(
            ctx,
            &command,
            "❌ Debes estar en un canal de voz para usar este comando.",
        )
        .await;
    };

    if !bot.autovoice.is_temporary_channel(guild_id, channel_id).await {
        return respond_ephemeral(ctx, &command, "❌ Este no es un canal de voz temporal.").await;
    }

    if !bot
        .autovoice
        .is_member_channel_owner(guild_id, channel_id, command.user.id)
        .await
    {
        return respond_ephemeral(ctx, &command, "❌ Solo el dueño puede cambiar el límite.").await;
    }

    if bot
        .autovoice
        .set_user_limit(guild_id, channel_id, limit, command.user.id)
        .await
    {
        let limit_text = if limit > 0 {
            limit.to_string()
        } else {
            "sin límite".to_string()
        };
        respond(ctx, &command, format!("👥 Límite de usuarios: **{limit_text}**")).await
    } else {
        respond_ephemeral(ctx, &command, "❌ No se pudo cambiar el límite de usuarios.").await
    }
}

async fn handle_info(
    ctx: &Context,
    command: CommandInteraction,
    bot: &TempoBot,
    guild_id: GuildId,
) -> Result<()> {
    // Primero el canal que ocupa; si no está en voz, su canal registrado
    if let Some(channel_id) = member_voice_channel(bot, guild_id, &command) {
        if let Some(ownership) = bot.autovoice.ownership_of(guild_id, channel_id).await {
            if ownership.owner_id() != command.user.id {
                return respond_ephemeral(ctx, &command, "❌ No eres el dueño de este canal.")
                    .await;
            }

            return respond_ephemeral(ctx, &command, &info_reply(&ownership, channel_id)).await;
        }
    }

    match bot.autovoice.temp_channel_by_owner(guild_id, command.user.id).await {
        Some(record) => {
            let channel_id = ChannelId::new(record.channel_id);
            let ownership = ChannelOwnership::Persisted(record);
            respond_ephemeral(ctx, &command, &info_reply(&ownership, channel_id)).await
        }
        None => {
            respond_ephemeral(
                ctx,
                &command,
                "📋 No tienes un canal de voz temporal.\n\nEntra a un canal disparador para crear uno.",
            )
            .await
        }
    }
}

fn info_reply(ownership: &ChannelOwnership, channel_id: ChannelId) -> String {
    let mut reply = format!("📋 **Tu canal de voz temporal**\n\n**Canal:** <#{channel_id}>\n");

    match ownership {
        ChannelOwnership::Persisted(record) => {
            reply.push_str(&format!("**Nombre:** {}\n", record.channel_name));
            reply.push_str(&format!(
                "**Bloqueado:** {}\n",
                if record.locked { "Sí 🔒" } else { "No" }
            ));
            let limit_text = if record.user_limit > 0 {
                record.user_limit.to_string()
            } else {
                "Sin límite".to_string()
            };
            reply.push_str(&format!("**Límite de usuarios:** {limit_text}\n"));
            reply.push_str(&format!("**Creado:** <t:{}:R>\n\n", record.created_at.timestamp()));
        }
        ChannelOwnership::Ephemeral { .. } => {
            reply.push_str("**Tipo:** Canal temporal (creado automáticamente)\n");
            reply.push_str("**Info:** Se borrará solo cuando quede vacío.\n\n");
        }
    }

    reply.push_str(
        "**Comandos:**\n\
         • `/autovoice lock` - Bloquea tu canal\n\
         • `/autovoice unlock` - Desbloquea tu canal\n\
         • `/autovoice rename` - Renombra tu canal\n\
         • `/autovoice limit` - Cambia el límite de usuarios",
    );

    reply
}

// Helpers de extracción de opciones

fn subcommand(command: &CommandInteraction) -> Option<(&str, &[CommandDataOption])> {
    let option = command.data.options.first()?;
    match &option.value {
        CommandDataOptionValue::SubCommand(options) => Some((option.name.as_str(), options)),
        _ => None,
    }
}

fn channel_option(options: &[CommandDataOption], name: &str) -> Option<ChannelId> {
    options
        .iter()
        .find(|option| option.name == name)
        .and_then(|option| option.value.as_channel_id())
}

fn integer_option(options: &[CommandDataOption], name: &str) -> Option<i64> {
    options
        .iter()
        .find(|option| option.name == name)
        .and_then(|option| option.value.as_i64())
}

fn string_option(options: &[CommandDataOption], name: &str) -> Option<String> {
    options
        .iter()
        .find(|option| option.name == name)
        .and_then(|option| option.value.as_str())
        .map(|value| value.to_string())
}

fn is_admin(command: &CommandInteraction) -> bool {
    command
        .member
        .as_ref()
        .and_then(|member| member.permissions)
        .map(|permissions| permissions.administrator())
        .unwrap_or(false)
}

fn display_name(command: &CommandInteraction) -> String {
    command
        .member
        .as_ref()
        .map(|member| member.display_name().to_string())
        .unwrap_or_else(|| command.user.name.clone())
}

fn member_voice_channel(
    bot: &TempoBot,
    guild_id: GuildId,
    command: &CommandInteraction,
) -> Option<ChannelId> {
    bot.gateway.voice_channel_of(guild_id, command.user.id)
}

// Helpers de respuesta

async fn respond(ctx: &Context, command: &CommandInteraction, content: String) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new().content(content),
            ),
        )
        .await?;
    Ok(())
}

async fn respond_ephemeral(ctx: &Context, command: &CommandInteraction, content: &str) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(content)
                    .ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_autovoice_action_parse_covers_all_subcommands() {
        assert_eq!(AutoVoiceAction::parse("setup"), Some(AutoVoiceAction::Setup));
        assert_eq!(AutoVoiceAction::parse("remove"), Some(AutoVoiceAction::Remove));
        assert_eq!(AutoVoiceAction::parse("list"), Some(AutoVoiceAction::List));
        assert_eq!(AutoVoiceAction::parse("lock"), Some(AutoVoiceAction::Lock));
        assert_eq!(AutoVoiceAction::parse("unlock"), Some(AutoVoiceAction::Unlock));
        assert_eq!(AutoVoiceAction::parse("rename"), Some(AutoVoiceAction::Rename));
        assert_eq!(AutoVoiceAction::parse("limit"), Some(AutoVoiceAction::Limit));
        assert_eq!(AutoVoiceAction::parse("info"), Some(AutoVoiceAction::Info));
        assert_eq!(AutoVoiceAction::parse("otro"), None);
    }
}
