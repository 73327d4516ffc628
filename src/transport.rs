//! # Media-Stream Channel Client
//!
//! A WebSocket client speaking the media envelope protocol. It owns the
//! connection and nothing else: framing lives in `media`, scripting in
//! `scenarios`.
//!
//! ## Connection Flow:
//! 1. `connect` opens the socket and splits it into a write half and a read half
//! 2. `send` / `stream_audio` write envelopes
//! 3. Either `next_frame` reads inbound envelopes one at a time, or
//!    `spawn_listener` moves the read half into a background task that collects
//!    every media payload while the caller keeps sending
//! 4. `close` sends a close frame
//!
//! Transport failures are surfaced as `AppError::TransportFailure` and never
//! retried.

use crate::error::{AppError, AppResult};
use crate::media::call::chunk_frames;
use crate::media::envelope::{self, EventKind, InboundFrame, MediaEnvelope};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connected media-stream client.
pub struct MediaStreamClient {
    sink: SplitSink<WsStream, Message>,
    /// `None` once the read half has been handed to a listener
    stream: Option<SplitStream<WsStream>>,
    frames_sent: usize,
    bytes_sent: usize,
}

impl MediaStreamClient {
    /// Open a WebSocket connection to `url` (`ws://` or `wss://`).
    pub async fn connect(url: &str) -> AppResult<Self> {
        info!(url, "Connecting to media stream");

        let (socket, response) = connect_async(url).await.map_err(|e| {
            AppError::TransportFailure(format!("cannot connect to {}: {}", url, e))
        })?;

        debug!(status = %response.status(), "WebSocket handshake complete");

        let (sink, stream) = socket.split();
        Ok(Self {
            sink,
            stream: Some(stream),
            frames_sent: 0,
            bytes_sent: 0,
        })
    }

    /// Envelopes written so far.
    pub fn frames_sent(&self) -> usize {
        self.frames_sent
    }

    /// μ-law payload bytes written so far (media envelopes only).
    pub fn bytes_sent(&self) -> usize {
        self.bytes_sent
    }

    /// Serialize an envelope and send it as one text message.
    pub async fn send(&mut self, envelope: &MediaEnvelope) -> AppResult<()> {
        let json = envelope.to_json()?;
        self.sink.send(Message::Text(json.into())).await?;

        self.frames_sent += 1;
        if let Some(bytes) = envelope.payload_bytes()? {
            self.bytes_sent += bytes.len();
        }

        debug!(event = %envelope.kind(), "Envelope sent");
        Ok(())
    }

    /// Send μ-law audio as consecutive media envelopes of `chunk_bytes`,
    /// sleeping `pacing` after each one. Returns the number of frames sent.
    pub async fn stream_audio(
        &mut self,
        stream_sid: &str,
        mulaw: &[u8],
        chunk_bytes: usize,
        pacing: Duration,
    ) -> AppResult<usize> {
        let frames = chunk_frames(stream_sid, mulaw, chunk_bytes);
        self.stream_frames(&frames, pacing).await
    }

    /// Send prepared envelopes with a fixed delay after each one.
    pub async fn stream_frames(&mut self, frames: &[MediaEnvelope], pacing: Duration) -> AppResult<usize> {
        let bytes_before = self.bytes_sent;

        for frame in frames {
            self.send(frame).await?;
            if !pacing.is_zero() {
                tokio::time::sleep(pacing).await;
            }
        }

        debug!(
            frames = frames.len(),
            bytes = self.bytes_sent - bytes_before,
            "Audio streamed"
        );
        Ok(frames.len())
    }

    /// Wait up to `wait` for the next inbound envelope.
    ///
    /// ## Returns:
    /// - `Ok(Some(frame))` for a well-formed envelope
    /// - `Ok(None)` when nothing arrived in time
    /// - `Err(TransportFailure)` when the peer closed the channel
    ///
    /// Malformed messages are logged and skipped; they do not reset the wait.
    pub async fn next_frame(&mut self, wait: Duration) -> AppResult<Option<InboundFrame>> {
        let stream = self.stream.as_mut().ok_or_else(|| {
            AppError::Internal("read half was handed to a response listener".to_string())
        })?;

        let deadline = Instant::now() + wait;

        loop {
            let message = match tokio::time::timeout_at(deadline, stream.next()).await {
                Err(_) => return Ok(None),
                Ok(None) => {
                    return Err(AppError::TransportFailure("channel closed".to_string()))
                }
                Ok(Some(Err(e))) => return Err(e.into()),
                Ok(Some(Ok(message))) => message,
            };

            match message {
                Message::Text(text) => match envelope::deserialize(text.as_str()) {
                    Ok(frame) => return Ok(Some(frame)),
                    Err(err) if err.is_recoverable() => {
                        warn!(error = %err, "Skipping inbound message");
                    }
                    Err(err) => return Err(err),
                },
                Message::Close(frame) => {
                    return Err(AppError::TransportFailure(format!(
                        "channel closed by peer ({:?})",
                        frame.map(|f| f.code)
                    )));
                }
                other => {
                    debug!(kind = ?message_kind(&other), "Ignoring non-text message");
                }
            }
        }
    }

    /// Move the read half into a background task that collects every
    /// inbound media payload until the channel closes.
    pub fn spawn_listener(&mut self) -> AppResult<ResponseListener> {
        let stream = self.stream.take().ok_or_else(|| {
            AppError::Internal("a response listener is already running".to_string())
        })?;

        let received = Arc::new(Mutex::new(ReceivedAudio::default()));
        let handle = tokio::spawn(listen(stream, Arc::clone(&received)));

        Ok(ResponseListener { received, handle })
    }

    /// Send a close frame. A channel the peer already closed counts as closed.
    pub async fn close(mut self) {
        if let Err(e) = self.sink.close().await {
            match e {
                tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {}
                other => debug!(error = %other, "Close handshake incomplete"),
            }
        }

        info!(
            frames_sent = self.frames_sent,
            bytes_sent = self.bytes_sent,
            "Media stream closed"
        );
    }
}

/// Audio collected by a [`ResponseListener`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReceivedAudio {
    /// Media envelopes that carried a payload
    pub responses: usize,
    /// Concatenated μ-law payloads, in arrival order
    pub mulaw: Vec<u8>,
    /// Inbound messages skipped as malformed
    pub malformed: usize,
}

/// Handle on a background task reading the channel.
pub struct ResponseListener {
    received: Arc<Mutex<ReceivedAudio>>,
    handle: JoinHandle<()>,
}

impl ResponseListener {
    /// Wait up to `wait` for the peer to close the channel, then stop the
    /// task and return everything collected.
    pub async fn finish(mut self, wait: Duration) -> ReceivedAudio {
        if tokio::time::timeout(wait, &mut self.handle).await.is_err() {
            debug!("Listener still running, stopping it");
            self.handle.abort();
        }
        std::mem::take(&mut *self.received.lock().await)
    }
}

async fn listen(mut stream: SplitStream<WsStream>, received: Arc<Mutex<ReceivedAudio>>) {
    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => match envelope::deserialize(text.as_str()) {
                Ok(frame) => {
                    if frame.kind != EventKind::Media {
                        debug!(event = %frame.kind, "Non-media envelope received");
                        continue;
                    }
                    if let Some(payload) = frame.payload {
                        let mut received = received.lock().await;
                        received.responses += 1;
                        received.mulaw.extend_from_slice(&payload);
                        info!(
                            response = received.responses,
                            bytes = payload.len(),
                            "Received AI response"
                        );
                    }
                }
                Err(err) if err.is_recoverable() => {
                    warn!(error = %err, "Skipping inbound message");
                    received.lock().await.malformed += 1;
                }
                Err(err) => {
                    warn!(error = %err, "Stopping listener");
                    break;
                }
            },
            Ok(Message::Close(_)) => {
                debug!("Peer closed the channel");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "Media stream read failed");
                break;
            }
        }
    }
}

fn message_kind(message: &Message) -> &'static str {
    match message {
        Message::Text(_) => "text",
        Message::Binary(_) => "binary",
        Message::Ping(_) => "ping",
        Message::Pong(_) => "pong",
        Message::Close(_) => "close",
        Message::Frame(_) => "frame",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use tokio::net::TcpListener;

    /// Accept one connection on a local port and hand it to `handler`.
    async fn serve_once<F, Fut>(handler: F) -> String
    where
        F: FnOnce(WebSocketStream<TcpStream>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let socket = tokio_tungstenite::accept_async(tcp).await.unwrap();
            handler(socket).await;
        });
        format!("ws://{}", addr)
    }

    fn media_text(payload: &[u8]) -> Message {
        Message::Text(MediaEnvelope::media("MZ1", payload).to_json().unwrap().into())
    }

    #[tokio::test]
    async fn test_greeting_after_start() {
        let url = serve_once(|mut socket| async move {
            // Wait for start, answer with one media frame
            let first = socket.next().await.unwrap().unwrap();
            let frame = envelope::deserialize(first.to_text().unwrap()).unwrap();
            assert_eq!(frame.kind, EventKind::Start);
            socket.send(media_text(&[0xFF; 200])).await.unwrap();
            // Keep the socket open until the client goes away
            while let Some(Ok(_)) = socket.next().await {}
        })
        .await;

        let mut client = MediaStreamClient::connect(&url).await.unwrap();
        client
            .send(&MediaEnvelope::start("MZ1", Default::default()))
            .await
            .unwrap();

        let frame = client.next_frame(Duration::from_secs(5)).await.unwrap().unwrap();
        assert_eq!(frame.kind, EventKind::Media);
        assert_eq!(frame.payload.unwrap().len(), 200);
        assert_eq!(client.frames_sent(), 1);
        client.close().await;
    }

    #[tokio::test]
    async fn test_malformed_messages_are_skipped() {
        let url = serve_once(|mut socket| async move {
            socket.send(Message::Text("not json".to_string().into())).await.unwrap();
            socket
                .send(Message::Text(r#"{"streamSid":"MZ1"}"#.to_string().into()))
                .await
                .unwrap();
            socket.send(media_text(&[1, 2, 3])).await.unwrap();
            while let Some(Ok(_)) = socket.next().await {}
        })
        .await;

        let mut client = MediaStreamClient::connect(&url).await.unwrap();
        let frame = client.next_frame(Duration::from_secs(5)).await.unwrap().unwrap();
        assert_eq!(frame.payload, Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn test_timeout_returns_none() {
        let url = serve_once(|mut socket| async move {
            while let Some(Ok(_)) = socket.next().await {}
        })
        .await;

        let mut client = MediaStreamClient::connect(&url).await.unwrap();
        let frame = client.next_frame(Duration::from_millis(100)).await.unwrap();
        assert!(frame.is_none());
    }

    #[tokio::test]
    async fn test_peer_close_is_transport_failure() {
        let url = serve_once(|mut socket| async move {
            socket.close(None).await.unwrap();
        })
        .await;

        let mut client = MediaStreamClient::connect(&url).await.unwrap();
        let err = client.next_frame(Duration::from_secs(5)).await.unwrap_err();
        assert_eq!(err.kind(), "transport_failure");
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = MediaStreamClient::connect(&format!("ws://{}", addr))
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), "transport_failure");
    }

    #[tokio::test]
    async fn test_stream_audio_chunks() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let url = serve_once(|mut socket| async move {
            let mut sizes = Vec::new();
            while let Some(Ok(message)) = socket.next().await {
                if let Message::Text(text) = message {
                    let frame = envelope::deserialize(text.as_str()).unwrap();
                    sizes.push(frame.payload.map(|p| p.len()).unwrap_or(0));
                }
            }
            let _ = tx.send(sizes);
        })
        .await;

        let mut client = MediaStreamClient::connect(&url).await.unwrap();
        let sent = client
            .stream_audio("MZ1", &[0xFF; 400], 160, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(sent, 3);
        assert_eq!(client.bytes_sent(), 400);
        client.close().await;

        assert_eq!(rx.await.unwrap(), vec![160, 160, 80]);
    }

    #[tokio::test]
    async fn test_listener_collects_payloads() {
        let url = serve_once(|mut socket| async move {
            socket.send(media_text(&[9; 10])).await.unwrap();
            socket.send(Message::Text("garbage".to_string().into())).await.unwrap();
            socket.send(media_text(&[8; 5])).await.unwrap();
            socket.close(None).await.unwrap();
        })
        .await;

        let mut client = MediaStreamClient::connect(&url).await.unwrap();
        let listener = client.spawn_listener().unwrap();
        assert!(client.spawn_listener().is_err());
        assert!(client.next_frame(Duration::from_millis(10)).await.is_err());

        let received = listener.finish(Duration::from_secs(5)).await;
        assert_eq!(received.responses, 2);
        assert_eq!(received.malformed, 1);
        assert_eq!(received.mulaw.len(), 15);
    }
}
