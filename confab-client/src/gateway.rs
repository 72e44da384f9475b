use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use log::warn;
use tokio::{net::TcpStream, sync::mpsc, task::JoinHandle};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};

use confab_chat::protocol::{ClientEvent, ServerEvent};

use crate::ClientError;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// The WebSocket half of the client: one live connection to the gateway.
pub struct Gateway {
    sink: SplitSink<Socket, WsMessage>,
    events: mpsc::UnboundedReceiver<ServerEvent>,
    reader: JoinHandle<()>,
}

impl Gateway {
    /// Opens the connection and starts reading events. The reader is
    /// attached before any room is joined, so no event can slip past it.
    pub async fn connect(url: &str, token: &str) -> Result<Self, ClientError> {
        let (socket, _) = connect_async(format!("{url}/gateway?token={token}")).await?;

        let (sink, mut stream) = socket.split();
        let (tx, events) = mpsc::unbounded_channel();

        let reader = tokio::spawn(async move {
            while let Some(Ok(message)) = stream.next().await {
                let WsMessage::Text(text) = message else {
                    continue;
                };

                match serde_json::from_str::<ServerEvent>(&text) {
                    Ok(event) => {
                        if tx.send(event).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Discarding malformed gateway event: {e}"),
                }
            }
        });

        Ok(Self {
            sink,
            events,
            reader,
        })
    }

    pub async fn send(&mut self, event: &ClientEvent) -> Result<(), ClientError> {
        let text = serde_json::to_string(event).expect("client events serialize");
        self.sink.send(WsMessage::Text(text)).await?;

        Ok(())
    }

    /// The next event pushed by the server, None once the connection closed
    pub async fn next_event(&mut self) -> Option<ServerEvent> {
        self.events.recv().await
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        self.reader.abort()
    }
}
