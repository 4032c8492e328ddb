use futures::StreamExt;
use serde::Deserialize;
use serenity::model::id::{GuildId, UserId};
use tokio::sync::mpsc::UnboundedSender;
use tokio_tungstenite::{connect_async, tungstenite::client::IntoClientRequest, tungstenite::Message};
use tracing::{debug, error, info, warn};

use super::rest::SharedSessionId;
use super::{AudioEvent, AudioEventKind, TrackEndReason};
use crate::config::Config;

const RECONNECT_DELAY_SECS: u64 = 5;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SocketMessage {
    op: String,
    session_id: Option<String>,
    #[serde(rename = "type")]
    event_type: Option<String>,
    guild_id: Option<String>,
    track: Option<EventTrack>,
    reason: Option<String>,
    exception: Option<EventException>,
    threshold_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct EventTrack {
    info: EventTrackInfo,
}

#[derive(Debug, Deserialize)]
struct EventTrackInfo {
    title: String,
}

#[derive(Debug, Deserialize)]
struct EventException {
    message: Option<String>,
}

/// Acción derivada de un mensaje del WebSocket del nodo.
#[derive(Debug)]
enum SocketAction {
    Ready(String),
    Event(AudioEvent),
    Ignore,
}

/// Mantiene el WebSocket de eventos contra el nodo Lavalink.
///
/// Publica los eventos de tracks en `tx` para que el `TrackScheduler`
/// los consuma, y expone el `sessionId` del handshake a las llamadas
/// REST. Reintenta la conexión indefinidamente con una pausa fija.
pub async fn run_event_socket(
    config: Config,
    user_id: UserId,
    session_id: SharedSessionId,
    tx: UnboundedSender<AudioEvent>,
) {
    loop {
        if let Err(e) = connect_and_listen(&config, user_id, &session_id, &tx).await {
            warn!("🔌 WebSocket de Lavalink caído: {e:#}");
        }

        // La sesión deja de ser válida hasta el próximo handshake
        *session_id.write() = None;

        info!(
            "🔄 Reintentando conexión a Lavalink en {}s...",
            RECONNECT_DELAY_SECS
        );
        tokio::time::sleep(std::time::Duration::from_secs(RECONNECT_DELAY_SECS)).await;
    }
}

async fn connect_and_listen(
    config: &Config,
    user_id: UserId,
    session_id: &SharedSessionId,
    tx: &UnboundedSender<AudioEvent>,
) -> anyhow::Result<()> {
    let mut request = config.lavalink_ws_url().into_client_request()?;
    let headers = request.headers_mut();
    headers.insert("Authorization", config.lavalink_password.parse()?);
    headers.insert("User-Id", user_id.to_string().parse()?);
    headers.insert(
        "Client-Name",
        format!("tempo-bot/{}", env!("CARGO_PKG_VERSION")).parse()?,
    );

    info!("🎼 Conectando al nodo Lavalink en {}", config.lavalink_ws_url());
    let (mut ws_stream, _) = connect_async(request).await?;

    while let Some(message) = ws_stream.next().await {
        let message = message?;

        if let Message::Text(text) = message {
            match parse_message(text.as_str()) {
                SocketAction::Ready(session) => {
                    info!("✅ Sesión Lavalink establecida: {}", session);
                    *session_id.write() = Some(session);
                }
                SocketAction::Event(event) => {
                    debug!("🎵 Evento de nodo: {:?}", event.kind);
                    if tx.send(event).is_err() {
                        // El scheduler terminó; no tiene sentido seguir leyendo
                        return Ok(());
                    }
                }
                SocketAction::Ignore => {}
            }
        }
    }

    Ok(())
}

/// Interpreta un mensaje de texto del nodo. Los ops `playerUpdate` y
/// `stats` no afectan al estado y se ignoran.
fn parse_message(raw: &str) -> SocketAction {
    let message: SocketMessage = match serde_json::from_str(raw) {
        Ok(message) => message,
        Err(e) => {
            error!("Mensaje de Lavalink no parseable: {e}");
            return SocketAction::Ignore;
        }
    };

    match message.op.as_str() {
        "ready" => match message.session_id {
            Some(session) => SocketAction::Ready(session),
            None => SocketAction::Ignore,
        },
        "event" => match build_event(message) {
            Some(event) => SocketAction::Event(event),
            None => SocketAction::Ignore,
        },
        _ => SocketAction::Ignore,
    }
}

fn build_event(message: SocketMessage) -> Option<AudioEvent> {
    let guild_id = message
        .guild_id
        .as_deref()
        .and_then(|raw| raw.parse::<u64>().ok())
        .map(GuildId::new)?;

    let kind = match message.event_type.as_deref()? {
        "TrackStartEvent" => AudioEventKind::TrackStart {
            title: message
                .track
                .map(|track| track.info.title)
                .unwrap_or_else(|| "?".to_string()),
        },
        "TrackEndEvent" => AudioEventKind::TrackEnd {
            reason: TrackEndReason::parse(message.reason.as_deref().unwrap_or("finished")),
        },
        "TrackExceptionEvent" => AudioEventKind::TrackException {
            message: message
                .exception
                .and_then(|exception| exception.message)
                .unwrap_or_else(|| "sin detalle".to_string()),
        },
        "TrackStuckEvent" => AudioEventKind::TrackStuck {
            threshold_ms: message.threshold_ms.unwrap_or(0),
        },
        _ => return None,
    };

    Some(AudioEvent { guild_id, kind })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ready_message() {
        let action = parse_message(r#"{"op":"ready","resumed":false,"sessionId":"abc123"}"#);
        assert!(matches!(action, SocketAction::Ready(session) if session == "abc123"));
    }

    #[test]
    fn test_parse_track_end_event() {
        let action = parse_message(
            r#"{
                "op": "event",
                "type": "TrackEndEvent",
                "guildId": "42",
                "track": { "info": { "title": "Song" } },
                "reason": "finished"
            }"#,
        );

        match action {
            SocketAction::Event(event) => {
                assert_eq!(event.guild_id, GuildId::new(42));
                assert!(matches!(
                    event.kind,
                    AudioEventKind::TrackEnd { reason: TrackEndReason::Finished }
                ));
            }
            other => panic!("esperaba Event, obtuve {:?}", other),
        }
    }

    #[test]
    fn test_parse_exception_and_stuck_events() {
        let action = parse_message(
            r#"{
                "op": "event",
                "type": "TrackExceptionEvent",
                "guildId": "42",
                "exception": { "message": "boom" }
            }"#,
        );
        assert!(matches!(
            action,
            SocketAction::Event(AudioEvent { kind: AudioEventKind::TrackException { message }, .. })
                if message == "boom"
        ));

        let action = parse_message(
            r#"{
                "op": "event",
                "type": "TrackStuckEvent",
                "guildId": "42",
                "thresholdMs": 10000
            }"#,
        );
        assert!(matches!(
            action,
            SocketAction::Event(AudioEvent { kind: AudioEventKind::TrackStuck { threshold_ms: 10000 }, .. })
        ));
    }

    #[test]
    fn test_stats_and_player_update_ignored() {
        assert!(matches!(
            parse_message(r#"{"op":"stats","players":0}"#),
            SocketAction::Ignore
        ));
        assert!(matches!(
            parse_message(r#"{"op":"playerUpdate","guildId":"42","state":{}}"#),
            SocketAction::Ignore
        ));
    }
}
