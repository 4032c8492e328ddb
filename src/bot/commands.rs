use anyhow::Result;
use serenity::all::{
    Command, CommandOptionType, Context, CreateCommand, CreateCommandOption, GuildId,
};

/// Definición de todos los comandos slash del bot.
pub fn all_commands() -> Vec<CreateCommand> {
    vec![
        CreateCommand::new("play")
            .description("Reproduce una canción o la agrega a la cola")
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::String,
                    "query",
                    "URL o términos de búsqueda",
                )
                .required(true),
            ),
        CreateCommand::new("stop").description("Detiene la reproducción y vacía la cola"),
        CreateCommand::new("next").description("Salta a la siguiente canción"),
        CreateCommand::new("previous").description("Reproduce la canción anterior del historial"),
        CreateCommand::new("pause").description("Pausa la reproducción actual"),
        CreateCommand::new("resume").description("Reanuda la reproducción"),
        CreateCommand::new("set-create-channel")
            .description("Define el canal de voz para crear canales propios (admin)")
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::Channel,
                    "channel",
                    "Canal de voz donde los usuarios crean su propio canal",
                )
                .required(true),
            ),
        autovoice_command(),
    ]
}

fn autovoice_command() -> CreateCommand {
    CreateCommand::new("autovoice")
        .description("Gestiona los canales de voz automáticos")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::SubCommand,
                "setup",
                "Configura un canal disparador (admin)",
            )
            .add_sub_option(
                CreateCommandOption::new(
                    CommandOptionType::Channel,
                    "trigger",
                    "Canal de voz que dispara la creación",
                )
                .required(true),
            )
            .add_sub_option(CreateCommandOption::new(
                CommandOptionType::Channel,
                "category",
                "Categoría donde crear los canales temporales",
            ))
            .add_sub_option(CreateCommandOption::new(
                CommandOptionType::Integer,
                "maxusers",
                "Máximo de usuarios por canal (0 = sin límite)",
            )),
        )
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::SubCommand,
                "remove",
                "Elimina la configuración de un disparador (admin)",
            )
            .add_sub_option(
                CreateCommandOption::new(
                    CommandOptionType::Channel,
                    "trigger",
                    "Canal disparador a eliminar",
                )
                .required(true),
            ),
        )
        .add_option(CreateCommandOption::new(
            CommandOptionType::SubCommand,
            "list",
            "Lista los canales disparadores configurados",
        ))
        .add_option(CreateCommandOption::new(
            CommandOptionType::SubCommand,
            "lock",
            "Bloquea tu canal temporal (solo dueño)",
        ))
        .add_option(CreateCommandOption::new(
            CommandOptionType::SubCommand,
            "unlock",
            "Desbloquea tu canal temporal (solo dueño)",
        ))
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::SubCommand,
                "rename",
                "Renombra tu canal temporal (solo dueño)",
            )
            .add_sub_option(
                CreateCommandOption::new(
                    CommandOptionType::String,
                    "name",
                    "Nuevo nombre para tu canal",
                )
                .required(true),
            ),
        )
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::SubCommand,
                "limit",
                "Cambia el límite de usuarios de tu canal (solo dueño)",
            )
            .add_sub_option(
                CreateCommandOption::new(
                    CommandOptionType::Integer,
                    "max",
                    "Máximo de usuarios (0 = sin límite)",
                )
                .required(true),
            ),
        )
        .add_option(CreateCommandOption::new(
            CommandOptionType::SubCommand,
            "info",
            "Muestra la información de tu canal temporal",
        ))
}

pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    Command::set_global_commands(&ctx.http, all_commands()).await?;
    Ok(())
}

pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;
    Ok(())
}
