//! Engine stdout messages
//!
//! Engines print one message per line as `<Kind>:<payload>`:
//!
//! - `Progress:<stage>:<done>:<total>`
//! - `Warning:<text>`
//! - `LayerCount:<n>`
//!
//! Which kinds are understood is up to the strategy that launched the
//! engine; it supplies a list of [`MessageHandler`]s. Lines no handler
//! claims are logged at `debug`.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;

use rotaslice_core::event_bus::EngineEvent;

/// Typed engine message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineMessage {
    /// Stage progress in `[0, 1]`
    Progress { stage: String, fraction: f64 },
    /// Non-fatal engine diagnostic
    Warning(String),
    /// Number of layers the engine will produce
    LayerCount(usize),
}

impl From<&EngineMessage> for EngineEvent {
    fn from(message: &EngineMessage) -> Self {
        match message {
            EngineMessage::Progress { stage, fraction } => EngineEvent::Progress {
                stage: stage.clone(),
                fraction: *fraction,
            },
            EngineMessage::Warning(text) => EngineEvent::Warning { text: text.clone() },
            EngineMessage::LayerCount(count) => EngineEvent::LayerCount { count: *count },
        }
    }
}

/// Decoder for one message kind
pub trait MessageHandler: Send + Sync {
    /// Message kind before the first `:`
    fn kind(&self) -> &str;

    /// Decode the payload after `<kind>:`
    fn handle(&self, payload: &str) -> Option<EngineMessage>;
}

/// `Progress:<stage>:<done>:<total>`
#[derive(Debug, Default, Clone, Copy)]
pub struct ProgressHandler;

impl MessageHandler for ProgressHandler {
    fn kind(&self) -> &str {
        "Progress"
    }

    fn handle(&self, payload: &str) -> Option<EngineMessage> {
        let mut parts = payload.rsplitn(3, ':');
        let total: f64 = parts.next()?.trim().parse().ok()?;
        let done: f64 = parts.next()?.trim().parse().ok()?;
        let stage = parts.next()?.trim();
        if total <= 0.0 || stage.is_empty() {
            return None;
        }
        Some(EngineMessage::Progress {
            stage: stage.to_string(),
            fraction: (done / total).clamp(0.0, 1.0),
        })
    }
}

/// `Warning:<text>`
#[derive(Debug, Default, Clone, Copy)]
pub struct WarningHandler;

impl MessageHandler for WarningHandler {
    fn kind(&self) -> &str {
        "Warning"
    }

    fn handle(&self, payload: &str) -> Option<EngineMessage> {
        let text = payload.trim();
        (!text.is_empty()).then(|| EngineMessage::Warning(text.to_string()))
    }
}

/// `LayerCount:<n>`
#[derive(Debug, Default, Clone, Copy)]
pub struct LayerCountHandler;

impl MessageHandler for LayerCountHandler {
    fn kind(&self) -> &str {
        "LayerCount"
    }

    fn handle(&self, payload: &str) -> Option<EngineMessage> {
        payload.trim().parse().ok().map(EngineMessage::LayerCount)
    }
}

/// Progress, warning and layer-count handlers
pub fn default_handlers() -> Vec<Arc<dyn MessageHandler>> {
    vec![
        Arc::new(ProgressHandler),
        Arc::new(WarningHandler),
        Arc::new(LayerCountHandler),
    ]
}

/// Routes stdout lines to the matching handler
#[derive(Clone, Default)]
pub struct MessageDispatcher {
    handlers: Vec<Arc<dyn MessageHandler>>,
}

impl std::fmt::Debug for MessageDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kinds: Vec<&str> = self.handlers.iter().map(|h| h.kind()).collect();
        f.debug_struct("MessageDispatcher")
            .field("kinds", &kinds)
            .finish()
    }
}

impl MessageDispatcher {
    pub fn new(handlers: Vec<Arc<dyn MessageHandler>>) -> Self {
        Self { handlers }
    }

    /// Decode one stdout line
    pub fn dispatch(&self, line: &str) -> Option<EngineMessage> {
        let line = line.trim_end();
        let Some((kind, payload)) = line.split_once(':') else {
            if !line.is_empty() {
                tracing::debug!("Engine: {}", line);
            }
            return None;
        };
        let message = self
            .handlers
            .iter()
            .find(|h| h.kind() == kind)
            .and_then(|h| h.handle(payload));
        if message.is_none() {
            tracing::debug!("Engine: unhandled line '{}'", line);
        }
        message
    }
}

/// Read `stdout` to the end, forwarding decoded messages
///
/// Returns the number of messages forwarded. A closed receiver does not
/// stop the read; the pipe is drained so the engine never blocks on it.
pub(crate) async fn pump<R>(
    stdout: R,
    dispatcher: MessageDispatcher,
    sender: Option<mpsc::UnboundedSender<EngineMessage>>,
) -> usize
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stdout).lines();
    let mut forwarded = 0;
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let Some(message) = dispatcher.dispatch(&line) else {
                    continue;
                };
                if let EngineMessage::Warning(text) = &message {
                    tracing::warn!("Engine warning: {}", text);
                }
                if let Some(tx) = &sender {
                    if tx.send(message).is_ok() {
                        forwarded += 1;
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("Engine stdout read failed: {}", e);
                break;
            }
        }
    }
    forwarded
}
