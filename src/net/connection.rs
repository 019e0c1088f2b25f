//! WebSocket session plumbing.
//!
//! Each connection runs a read task (text frames -> engine mailbox) and a
//! write task (engine replies -> text frames). Frames are JSON: either a
//! structured command envelope or a raw natural-language sentence; the
//! engine decides which.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::info;

use crate::game::{EngineTx, SessionMessage, SessionReply};

/// Run a single WebSocket connection until either side closes.
pub async fn handle_connection(
    ws_stream: WebSocketStream<TcpStream>,
    conn_id: u64,
    engine_tx: EngineTx,
    mut rx: mpsc::UnboundedReceiver<SessionReply>,
) {
    let (mut ws_write, mut ws_read) = ws_stream.split();

    // Read task: WS text frames -> engine loop.
    let engine_tx_read = engine_tx.clone();
    let read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_read.next().await {
            match msg {
                Message::Text(text) => {
                    let _ = engine_tx_read.send(SessionMessage::Line {
                        conn_id,
                        text: text.to_string(),
                    });
                }
                Message::Close(_) => break,
                _ => {} // binary, ping, pong: the wire is text-only
            }
        }
    });

    // Write task: engine replies -> WS.
    let write_task = tokio::spawn(async move {
        while let Some(reply) = rx.recv().await {
            if ws_write.send(Message::Text(reply.data.into())).await.is_err() {
                break;
            }
        }
    });

    // Either task finishing means the client is gone.
    tokio::select! {
        _ = read_task => {}
        _ = write_task => {}
    }

    let _ = engine_tx.send(SessionMessage::Closed { conn_id });
    info!("Connection {conn_id} closed");
}
