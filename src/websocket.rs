//! # Media-Stream WebSocket Handler
//!
//! The agent side of a call: the provider (or one of our scripted scenarios)
//! connects to `/api/twilio/media-stream` and exchanges JSON media envelopes.
//!
//! ## Call Lifecycle:
//! 1. **start**: remember who is calling, play the greeting
//! 2. **media**: buffer the caller's μ-law audio; every processing interval,
//!    hand the buffer to the transcriber and speak the generated reply
//! 3. **stop**: transcribe what is left, wait for in-flight turns, close
//!
//! ## Actor Model:
//! Each connection is one Actix actor. Transcription and response generation
//! run in spawned tasks; their results come back to the actor as messages
//! (`TurnFinished`), so the actor never blocks on a collaborator.

use crate::audio::{codec, wav};
use crate::collaborators::{CallerContext, ResponseGenerator, Transcriber};
use crate::media::envelope::{self, EventKind, MediaEnvelope, StartMetadata};
use crate::state::AppState;

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// How often the idle timeout is checked.
const IDLE_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Transcripts shorter than this are treated as noise.
const MIN_TRANSCRIPT_CHARS: usize = 3;

/// What one processing round produced.
#[derive(Debug, Default)]
struct Turn {
    /// What the caller said, if anything usable
    caller: Option<String>,
    /// What the agent answered
    agent: Option<String>,
    /// The agent's answer as μ-law, ready to send
    mulaw: Vec<u8>,
}

/// One line of the call transcript kept for the end-of-call log.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Speaker {
    Caller,
    Agent,
}

/// WebSocket actor for one media-stream call.
pub struct MediaStreamSocket {
    state: web::Data<AppState>,

    /// Set by the start envelope; replies cannot be addressed without it
    stream_sid: Option<String>,
    call_sid: Option<String>,
    caller: CallerContext,

    /// μ-law received since the last processing round
    buffer: Vec<u8>,
    last_processed: Instant,
    /// Spawned greeting/turn tasks that have not reported back yet
    in_flight: usize,

    greeted: bool,
    stopping: bool,
    last_activity: Instant,
    conversation: Vec<(Speaker, String)>,
}

impl MediaStreamSocket {
    pub fn new(state: web::Data<AppState>) -> Self {
        Self {
            state,
            stream_sid: None,
            call_sid: None,
            caller: CallerContext::default(),
            buffer: Vec::new(),
            last_processed: Instant::now(),
            in_flight: 0,
            greeted: false,
            stopping: false,
            last_activity: Instant::now(),
            conversation: Vec::new(),
        }
    }

    fn call_label(&self) -> &str {
        self.call_sid.as_deref().unwrap_or("unknown")
    }

    fn handle_text(&mut self, text: &str, ctx: &mut ws::WebsocketContext<Self>) {
        let frame = match envelope::deserialize(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(call_sid = self.call_label(), error = %e, "Skipping malformed envelope");
                self.state.record_malformed_envelope();
                return;
            }
        };

        match frame.envelope {
            MediaEnvelope::Start { start, .. } => self.handle_start(frame.stream_id, start, ctx),
            MediaEnvelope::Media { .. } => {
                if let Some(payload) = frame.payload {
                    self.handle_media(payload, ctx);
                }
            }
            MediaEnvelope::Stop { .. } => self.handle_stop(ctx),
        }
    }

    fn handle_start(
        &mut self,
        stream_sid: Option<String>,
        start: StartMetadata,
        ctx: &mut ws::WebsocketContext<Self>,
    ) {
        let call_sid = start
            .call_sid
            .clone()
            .unwrap_or_else(|| format!("UNKNOWN_{}", chrono::Utc::now().timestamp()));
        let from = start
            .custom_parameters
            .get("From")
            .cloned()
            .or(start.from.clone());

        info!(
            call_sid = %call_sid,
            stream_sid = stream_sid.as_deref().unwrap_or("none"),
            from = from.as_deref().unwrap_or("unknown"),
            "Media stream started"
        );

        if self.call_sid.is_none() {
            self.state.call_started();
        }

        self.caller = CallerContext {
            call_sid: Some(call_sid.clone()),
            from,
            caller_email: start.custom_parameters.get("caller_email").cloned(),
        };
        self.call_sid = Some(call_sid);
        self.stream_sid = stream_sid;
        self.last_processed = Instant::now();

        if self.greeted || self.stream_sid.is_none() {
            return;
        }
        self.greeted = true;

        let responder = self.state.responder.clone();
        let caller = self.caller.clone();
        self.spawn_turn(ctx, "greeting", greet(responder, caller));
    }

    fn handle_media(&mut self, payload: Vec<u8>, ctx: &mut ws::WebsocketContext<Self>) {
        if self.stopping {
            return;
        }

        self.state.record_media_frame(payload.len());
        self.buffer.extend_from_slice(&payload);

        let settings = &self.state.config.server;
        let interval = Duration::from_millis(settings.processing_interval_ms);
        if self.in_flight > 0 || self.last_processed.elapsed() < interval {
            return;
        }

        self.last_processed = Instant::now();
        let mulaw = std::mem::take(&mut self.buffer);
        if mulaw.len() < settings.min_processing_bytes {
            debug!(call_sid = self.call_label(), bytes = mulaw.len(), "Skipping short audio");
            return;
        }

        debug!(call_sid = self.call_label(), bytes = mulaw.len(), "Processing caller audio");
        self.spawn_answer(mulaw, true, ctx);
    }

    fn handle_stop(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        info!(call_sid = self.call_label(), "Media stream stopped");
        self.stopping = true;

        let remaining = std::mem::take(&mut self.buffer);
        if remaining.len() > self.state.config.server.final_flush_bytes {
            debug!(call_sid = self.call_label(), bytes = remaining.len(), "Transcribing remaining audio");
            self.spawn_answer(remaining, false, ctx);
        }

        if self.in_flight == 0 {
            self.finish(ctx);
        }
    }

    /// Transcribe `mulaw` and, with `reply`, generate and speak an answer.
    fn spawn_answer(&mut self, mulaw: Vec<u8>, reply: bool, ctx: &mut ws::WebsocketContext<Self>) {
        let transcriber = self.state.transcriber.clone();
        let responder = self.state.responder.clone();
        let caller = self.caller.clone();
        let sample_rate = self.state.config.audio.sample_rate;

        self.spawn_turn(
            ctx,
            "answer",
            answer(transcriber, responder, caller, mulaw, sample_rate, reply),
        );
    }

    /// Run `work` off the actor and deliver its result as `TurnFinished`.
    ///
    /// ## Rust Concepts:
    /// - **ctx.address()**: a `Send` handle to this actor, usable from any task
    /// - **do_send**: fire-and-forget; silently dropped if the call already ended
    fn spawn_turn<F>(&mut self, ctx: &mut ws::WebsocketContext<Self>, label: &'static str, work: F)
    where
        F: Future<Output = anyhow::Result<Turn>> + Send + 'static,
    {
        self.in_flight += 1;
        let addr = ctx.address();
        let call_sid = self.call_label().to_string();

        tokio::spawn(async move {
            let turn = match work.await {
                Ok(turn) => turn,
                Err(e) => {
                    error!(call_sid = %call_sid, label, error = %e, "Collaborator failed");
                    Turn::default()
                }
            };
            addr.do_send(TurnFinished(turn));
        });
    }

    fn send_audio(&mut self, mulaw: &[u8], ctx: &mut ws::WebsocketContext<Self>) {
        let Some(stream_sid) = self.stream_sid.as_deref() else {
            warn!(call_sid = self.call_label(), "No stream id yet, dropping reply audio");
            return;
        };

        match envelope::serialize(EventKind::Media, stream_sid, Some(mulaw)) {
            Ok(json) => {
                ctx.text(json);
                self.state.record_response_sent();
                debug!(call_sid = self.call_label(), bytes = mulaw.len(), "Reply audio sent");
            }
            Err(e) => error!(call_sid = self.call_label(), error = %e, "Cannot build reply envelope"),
        }
    }

    /// Transcribe audio still buffered when the call ends without a stop
    /// envelope (idle timeout, caller close, protocol error).
    ///
    /// The actor is going away, so the result is recorded straight into the
    /// shared state instead of coming back as `TurnFinished`.
    fn flush_on_exit(&mut self) {
        let remaining = std::mem::take(&mut self.buffer);
        if remaining.len() <= self.state.config.server.final_flush_bytes {
            return;
        }

        debug!(call_sid = self.call_label(), bytes = remaining.len(), "Transcribing audio left at disconnect");
        let state = self.state.clone();
        let caller = self.caller.clone();
        let call_sid = self.call_label().to_string();

        tokio::spawn(async move {
            let turn = answer(
                state.transcriber.clone(),
                state.responder.clone(),
                caller,
                remaining,
                state.config.audio.sample_rate,
                false,
            )
            .await;

            match turn {
                Ok(Turn { caller: Some(text), .. }) => {
                    info!(call_sid = %call_sid, transcript = %text, "Caller said");
                    state.record_transcript();
                }
                Ok(_) => {}
                Err(e) => error!(call_sid = %call_sid, error = %e, "Collaborator failed"),
            }
        });
    }

    fn finish(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.close(Some(ws::CloseReason::from(ws::CloseCode::Normal)));
        ctx.stop();
    }

    fn log_conversation(&self) {
        if self.conversation.is_empty() {
            return;
        }

        let lines: Vec<String> = self
            .conversation
            .iter()
            .map(|(speaker, text)| match speaker {
                Speaker::Caller => format!("caller: {}", text),
                Speaker::Agent => format!("agent: {}", text),
            })
            .collect();
        info!(
            call_sid = self.call_label(),
            turns = self.conversation.len(),
            conversation = %lines.join(" | "),
            "Call summary"
        );
    }
}

async fn greet(responder: Arc<dyn ResponseGenerator>, caller: CallerContext) -> anyhow::Result<Turn> {
    let greeting = responder.greet(&caller).await?;
    Ok(Turn {
        caller: None,
        agent: Some(greeting.text),
        mulaw: codec::encode_samples(&greeting.pcm),
    })
}

/// Transcribe a buffer of caller audio and, with `reply`, generate an answer.
///
/// Empty and very short transcripts produce an empty [`Turn`].
async fn answer(
    transcriber: Arc<dyn Transcriber>,
    responder: Arc<dyn ResponseGenerator>,
    caller: CallerContext,
    mulaw: Vec<u8>,
    sample_rate: u32,
    reply: bool,
) -> anyhow::Result<Turn> {
    let wav = wav::encode_wav(&codec::decode(&mulaw), sample_rate)?;
    let transcript = transcriber.transcribe(&wav).await?;
    let transcript = transcript.trim();

    if transcript.chars().count() < MIN_TRANSCRIPT_CHARS {
        return Ok(Turn::default());
    }

    if !reply {
        return Ok(Turn {
            caller: Some(transcript.to_string()),
            ..Turn::default()
        });
    }

    let response = responder.respond(transcript, &caller).await?;
    Ok(Turn {
        caller: Some(transcript.to_string()),
        agent: Some(response.text),
        mulaw: codec::encode_samples(&response.pcm),
    })
}

/// Result of a spawned greeting or answer task.
#[derive(Message)]
#[rtype(result = "()")]
struct TurnFinished(Turn);

impl Actor for MediaStreamSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        debug!("Media-stream connection opened");

        let idle_timeout = Duration::from_secs(self.state.config.server.idle_timeout_secs);
        ctx.run_interval(IDLE_CHECK_INTERVAL, move |act, ctx| {
            if act.last_activity.elapsed() > idle_timeout {
                warn!(call_sid = act.call_label(), "No data from caller, closing stream");
                ctx.stop();
            }
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.flush_on_exit();
        if self.call_sid.is_some() {
            self.state.call_ended();
        }
        self.log_conversation();
        info!(call_sid = self.call_label(), "Media-stream connection closed");
    }
}

impl Handler<TurnFinished> for MediaStreamSocket {
    type Result = ();

    fn handle(&mut self, msg: TurnFinished, ctx: &mut Self::Context) {
        self.in_flight = self.in_flight.saturating_sub(1);
        let turn = msg.0;

        if let Some(text) = turn.caller {
            info!(call_sid = self.call_label(), transcript = %text, "Caller said");
            self.state.record_transcript();
            self.conversation.push((Speaker::Caller, text));
        }
        if let Some(text) = turn.agent {
            info!(call_sid = self.call_label(), response = %text, "Agent replied");
            self.conversation.push((Speaker::Agent, text));
        }
        if !turn.mulaw.is_empty() {
            self.send_audio(&turn.mulaw, ctx);
        }

        if self.stopping && self.in_flight == 0 {
            self.finish(ctx);
        }
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for MediaStreamSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        self.last_activity = Instant::now();

        match msg {
            Ok(ws::Message::Text(text)) => self.handle_text(&text, ctx),
            Ok(ws::Message::Binary(data)) => {
                debug!(bytes = data.len(), "Ignoring binary frame");
            }
            Ok(ws::Message::Ping(data)) => ctx.pong(&data),
            Ok(ws::Message::Pong(_)) => {}
            Ok(ws::Message::Close(reason)) => {
                debug!(?reason, "Caller closed the stream");
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!("Received unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                error!(error = %err, "WebSocket protocol error");
                ctx.stop();
            }
        }
    }
}

/// `GET /api/twilio/media-stream`: upgrade to a WebSocket and start the actor.
pub async fn media_stream(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    ws::start(MediaStreamSocket::new(state), &req, stream)
}
