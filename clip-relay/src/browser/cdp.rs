//! Minimal Chrome DevTools Protocol client over a websocket.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, trace, warn};

use crate::{Error, Result};

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value>>>>>;

fn cdp_error(message: impl std::fmt::Display) -> Error {
    Error::Publish(format!("devtools: {}", message))
}

/// Route one incoming frame to the caller waiting on its id.
///
/// Events (frames without an id) are ignored.
fn dispatch(pending: &Pending, text: &str) {
    let frame: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "Unreadable devtools frame");
            return;
        }
    };

    let Some(id) = frame.get("id").and_then(Value::as_u64) else {
        trace!(method = ?frame.get("method"), "Devtools event");
        return;
    };

    let Some(reply) = pending.lock().remove(&id) else {
        return;
    };

    let result = match frame.get("error") {
        Some(err) => Err(cdp_error(
            err.get("message").and_then(Value::as_str).unwrap_or("unknown error"),
        )),
        None => Ok(frame.get("result").cloned().unwrap_or(Value::Null)),
    };
    let _ = reply.send(result);
}

/// A connected devtools session.
///
/// Requests are written by a background task; responses are matched to
/// callers by request id.
pub struct CdpClient {
    outgoing: mpsc::UnboundedSender<Message>,
    pending: Pending,
    next_id: AtomicU64,
    call_timeout: Duration,
    io_task: JoinHandle<()>,
}

impl CdpClient {
    pub async fn connect(endpoint: &str, call_timeout: Duration) -> Result<Self> {
        let (ws_stream, _) = connect_async(endpoint)
            .await
            .map_err(|e| cdp_error(format!("connect to {} failed: {}", endpoint, e)))?;
        let (mut write, mut read) = ws_stream.split();

        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<Message>();
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let reader_pending = pending.clone();

        let io_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    msg = outgoing_rx.recv() => match msg {
                        Some(msg) => {
                            if let Err(e) = write.send(msg).await {
                                warn!(error = %e, "Devtools send failed");
                                break;
                            }
                        }
                        None => {
                            let _ = write.close().await;
                            break;
                        }
                    },
                    frame = read.next() => match frame {
                        Some(Ok(Message::Text(text))) => dispatch(&reader_pending, text.as_str()),
                        Some(Ok(Message::Close(_))) | None => {
                            debug!("Devtools connection closed");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(error = %e, "Devtools connection error");
                            break;
                        }
                    },
                }
            }

            // Fail everything still waiting.
            for (_, reply) in reader_pending.lock().drain() {
                let _ = reply.send(Err(cdp_error("connection closed")));
            }
        });

        Ok(Self {
            outgoing,
            pending,
            next_id: AtomicU64::new(1),
            call_timeout,
            io_task,
        })
    }

    /// Send a command and wait for its result.
    pub async fn call(&self, method: &str, params: Value, session_id: Option<&str>) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut request = json!({ "id": id, "method": method, "params": params });
        if let Some(session_id) = session_id {
            request["sessionId"] = Value::String(session_id.to_string());
        }

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        if self
            .outgoing
            .send(Message::Text(request.to_string().into()))
            .is_err()
        {
            self.pending.lock().remove(&id);
            return Err(cdp_error("connection closed"));
        }

        match tokio::time::timeout(self.call_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(cdp_error("connection closed")),
            Err(_) => {
                self.pending.lock().remove(&id);
                Err(cdp_error(format!("{} timed out", method)))
            }
        }
    }
}

impl Drop for CdpClient {
    fn drop(&mut self) {
        self.io_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_with(id: u64) -> (Pending, oneshot::Receiver<Result<Value>>) {
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let (tx, rx) = oneshot::channel();
        pending.lock().insert(id, tx);
        (pending, rx)
    }

    #[tokio::test]
    async fn test_dispatch_result() {
        let (pending, rx) = pending_with(7);
        dispatch(&pending, r#"{"id":7,"result":{"frameId":"F1"}}"#);
        let value = rx.await.unwrap().unwrap();
        assert_eq!(value["frameId"], "F1");
        assert!(pending.lock().is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_error() {
        let (pending, rx) = pending_with(3);
        dispatch(
            &pending,
            r#"{"id":3,"error":{"code":-32000,"message":"Node is not a file input element"}}"#,
        );
        let err = rx.await.unwrap().unwrap_err();
        assert!(err.to_string().contains("Node is not a file input element"));
    }

    #[test]
    fn test_dispatch_ignores_events_and_unknown_ids() {
        let (pending, _rx) = pending_with(1);
        dispatch(&pending, r#"{"method":"Page.loadEventFired","params":{}}"#);
        dispatch(&pending, r#"{"id":99,"result":{}}"#);
        dispatch(&pending, "garbage");
        assert_eq!(pending.lock().len(), 1);
    }
}
