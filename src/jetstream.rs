//! Jetstream connection handling.
//!
//! [`JetStream::connect`] dials the feed once; there is no reconnect. The
//! connection is then split: the read half feeds [`read_loop`], the write half
//! stays with the lifecycle controller so it can send the close handshake.

use std::fmt::Display;

use futures::stream::{SplitSink, SplitStream};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async_tls_with_config, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::TlsConfig;
use crate::dispatch::{Dispatcher, Outcome};
use crate::error::{JetstreamError, Result};
use crate::event::Event;
use crate::reporter::{MessageCounter, Reporter};
use crate::tls;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub type WsSink = SplitSink<WsStream, Message>;
pub type WsSource = SplitStream<WsStream>;

// -----------------------------------------------------------------------------
// Connection
// -----------------------------------------------------------------------------

pub struct JetStream {
    url: Url,
    ws: WsStream,
}

impl JetStream {
    pub async fn connect(url: &Url, tls_config: &TlsConfig) -> Result<Self> {
        let connector = if url.scheme() == "wss" {
            Some(tls::connector(tls_config)?)
        } else {
            None
        };

        info!("Connecting to {}", url);
        let (ws, response) = connect_async_tls_with_config(url.as_str(), None, false, connector)
            .await
            .map_err(|source| JetstreamError::Connect {
                url: url.to_string(),
                source,
            })?;
        debug!(status = %response.status(), "websocket handshake complete");

        Ok(Self {
            url: url.clone(),
            ws,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn split(self) -> (WsSink, WsSource) {
        self.ws.split()
    }
}

/// Best-effort close handshake. Failures are logged and swallowed.
pub async fn send_close<Si>(sink: &mut Si, reason: &str) -> bool
where
    Si: Sink<Message> + Unpin,
    Si::Error: Display,
{
    let frame = CloseFrame {
        code: CloseCode::Normal,
        reason: String::from(reason).into(),
    };
    match sink.send(Message::Close(Some(frame))).await {
        Ok(()) => true,
        Err(e) => {
            warn!("write close: {}", e);
            false
        }
    }
}

// -----------------------------------------------------------------------------
// Read loop
// -----------------------------------------------------------------------------

/// Why the read loop stopped.
#[derive(Debug)]
pub enum StreamEnd {
    /// The peer sent a close frame.
    Closed(Option<CloseFrame>),
    /// The transport failed.
    Failed(tungstenite::Error),
    /// The stream ended without a close frame.
    Exhausted,
}

/// Consumes messages until the connection ends, dispatching each one in arrival order.
///
/// Bad messages are logged and skipped; only the end of the stream stops the loop.
pub async fn read_loop<S, R>(
    mut stream: S,
    mut dispatcher: Dispatcher<R>,
    counter: MessageCounter,
) -> StreamEnd
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
    R: Reporter,
{
    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => handle_payload(text.as_bytes(), &mut dispatcher, &counter),
            Ok(Message::Binary(data)) => handle_payload(&data, &mut dispatcher, &counter),
            Ok(Message::Close(frame)) => {
                info!("JetStream feed closed: {:?}", frame);
                return StreamEnd::Closed(frame);
            }
            Ok(_) => {} // ping/pong/raw frames
            Err(e) => {
                warn!("read: {}", e);
                return StreamEnd::Failed(e);
            }
        }
    }

    info!("JetStream feed ended");
    StreamEnd::Exhausted
}

fn handle_payload<R: Reporter>(payload: &[u8], dispatcher: &mut Dispatcher<R>, counter: &MessageCounter) {
    let event = match Event::decode(payload) {
        Ok(event) => event,
        Err(e) => {
            warn!("{}", e);
            return;
        }
    };
    counter.increment();

    let did = event.did.clone();
    let kind = event.kind().to_string();
    match dispatcher.dispatch(event) {
        Ok(Outcome::Reported) => {}
        Ok(Outcome::Ignored) => debug!(%did, %kind, "event ignored"),
        Err(e) if e.is_per_message() => warn!(%did, %kind, "{}", e),
        Err(e) => error!(%did, %kind, "{}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::CommitPolicy;
    use crate::reporter::Report;
    use futures::channel::mpsc;
    use futures::stream;
    use std::io;

    const ACCOUNT: &str = r#"{"did":"abc","time_us":1000,"kind":"account","account":{"active":false,"seq":5,"time":"2024-01-01T00:00:00Z"}}"#;
    const POST: &str = r#"{"did":"abc","time_us":2000,"kind":"commit","commit":{"operation":"create","collection":"app.bsky.feed.post","record":{"text":"hello","createdAt":"2024-01-01T00:00:00Z"}}}"#;
    const BAD_RECORD: &str = r#"{"did":"bad","time_us":3000,"kind":"commit","commit":{"operation":"create","collection":"app.bsky.feed.post","record":{"text":1}}}"#;

    fn text(s: &str) -> Result<Message, tungstenite::Error> {
        Ok(Message::text(s.to_string()))
    }

    async fn run(messages: Vec<Result<Message, tungstenite::Error>>) -> (StreamEnd, Vec<Report>, u64) {
        // Collect reports through a channel so the dispatcher can move into the loop.
        struct Forward(std::sync::mpsc::Sender<Report>);
        impl Reporter for Forward {
            fn report(&mut self, report: &Report) {
                let _ = self.0.send(report.clone());
            }
        }

        let (tx, rx) = std::sync::mpsc::channel();
        let counter = MessageCounter::new();
        let dispatcher = Dispatcher::new(CommitPolicy::CreateOnly, Forward(tx));
        let end = read_loop(stream::iter(messages), dispatcher, counter.clone()).await;
        (end, rx.try_iter().collect(), counter.load())
    }

    #[tokio::test]
    async fn reports_in_arrival_order() {
        let (end, reports, count) = run(vec![text(ACCOUNT), text(POST)]).await;

        assert!(matches!(end, StreamEnd::Exhausted));
        assert_eq!(count, 2);
        assert_eq!(reports.len(), 2);
        assert!(matches!(reports[0], Report::Account { .. }));
        assert!(matches!(&reports[1], Report::Post { text, did, .. } if text == "hello" && did == "abc"));
    }

    #[tokio::test]
    async fn malformed_messages_do_not_stop_the_loop() {
        let (end, reports, count) = run(vec![
            text("{not json"),
            text(BAD_RECORD),
            Ok(Message::Ping(Vec::new().into())),
            Ok(Message::binary(POST.as_bytes().to_vec())),
        ])
        .await;

        assert!(matches!(end, StreamEnd::Exhausted));
        // The malformed top-level message is not counted; the bad record is.
        assert_eq!(count, 2);
        assert_eq!(reports.len(), 1);
        assert!(matches!(reports[0], Report::Post { .. }));
    }

    #[tokio::test]
    async fn close_frame_ends_the_loop() {
        let (end, reports, count) = run(vec![
            text(ACCOUNT),
            Ok(Message::Close(None)),
            text(POST),
        ])
        .await;

        assert!(matches!(end, StreamEnd::Closed(None)));
        assert_eq!(count, 1);
        assert_eq!(reports.len(), 1);
    }

    #[tokio::test]
    async fn read_error_ends_the_loop() {
        let (end, reports, _) = run(vec![
            Err(tungstenite::Error::Io(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))),
            text(ACCOUNT),
        ])
        .await;

        assert!(matches!(end, StreamEnd::Failed(_)));
        assert!(reports.is_empty());
    }

    #[tokio::test]
    async fn send_close_writes_a_normal_close_frame() {
        let (mut tx, mut rx) = mpsc::unbounded::<Message>();
        assert!(send_close(&mut tx, "bye").await);

        match rx.next().await {
            Some(Message::Close(Some(frame))) => {
                assert_eq!(frame.code, CloseCode::Normal);
                assert_eq!(frame.reason.as_str(), "bye");
            }
            other => panic!("expected close frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn send_close_failure_is_swallowed() {
        let (mut tx, rx) = mpsc::unbounded::<Message>();
        drop(rx);
        assert!(!send_close(&mut tx, "").await);
    }

    #[tokio::test]
    async fn connect_failure_is_reported() {
        let url = Url::parse("ws://127.0.0.1:1/subscribe").unwrap();
        let tls = TlsConfig {
            native_roots: false,
            ca_file: None,
        };
        let err = JetStream::connect(&url, &tls).await.err().unwrap();
        assert!(matches!(err, JetstreamError::Connect { .. }));
        assert!(!err.is_per_message());
    }
}
