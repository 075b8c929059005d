//! Controller session over line-delimited JSON-RPC 2.0.
//!
//! One JSON object per line in each direction, strictly one reply per
//! request. The session is a small state machine:
//!
//! ```text
//! AwaitingRound --can_we_start_yet(round)--> RoundOpen
//! RoundOpen     --register_events---------> AwaitingRound
//! any           --can_we_start_yet(-1)----> Done
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf, WriteHalf,
};
use tokio::net::TcpStream;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::{EventRecord, RoundInfo};

/// Protocol errors. Every one of them ends the session.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("failed to connect to controller at {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("session is closed")]
    SessionClosed,

    #[error("{method} not allowed in state {state:?}")]
    OutOfOrder {
        method: &'static str,
        state: SessionState,
    },

    #[error("invalid RPC response: {0}")]
    InvalidResponse(String),

    #[error("controller returned an error: {0}")]
    Remote(String),

    #[error("controller closed the connection")]
    ConnectionClosed,

    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

pub type RpcResult<T> = std::result::Result<T, RpcError>;

/// Where the session is in the round protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Next call must be `can_we_start_yet`.
    AwaitingRound,
    /// A round was handed out and its events not yet registered.
    RoundOpen { round: i64 },
    /// The controller sent the terminal round.
    Done,
}

#[derive(Debug, Serialize)]
struct Request<'a, P: Serialize> {
    jsonrpc: &'static str,
    id: String,
    method: &'a str,
    params: P,
}

#[derive(Debug, Serialize)]
struct NoParams {}

#[derive(Debug, Serialize)]
struct RegisterEventsParams<'a> {
    events: &'a [EventRecord],
}

#[derive(Debug, Deserialize)]
struct Reply {
    jsonrpc: Option<String>,
    id: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    result: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    error: Option<Value>,
}

/// Keep a present-but-null member distinguishable from an absent one.
fn present<'de, D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Option<Value>, D::Error> {
    Value::deserialize(d).map(Some)
}

/// Client side of a controller session.
pub struct SessionClient<S> {
    reader: BufReader<ReadHalf<S>>,
    writer: WriteHalf<S>,
    state: SessionState,
}

impl<S> std::fmt::Debug for SessionClient<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionClient")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Open a TCP session to the controller at `host:port`.
pub async fn connect(addr: &str) -> RpcResult<SessionClient<TcpStream>> {
    let addr = addr.trim();
    info!(%addr, "connecting to controller");
    let stream = TcpStream::connect(addr).await.map_err(|source| RpcError::Connect {
        addr: addr.to_string(),
        source,
    })?;
    stream.set_nodelay(true)?;
    Ok(SessionClient::new(stream))
}

impl<S> SessionClient<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin,
{
    pub fn new(stream: S) -> Self {
        let (read, write) = tokio::io::split(stream);
        Self {
            reader: BufReader::new(read),
            writer: write,
            state: SessionState::AwaitingRound,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Ask the controller for the next round. A `cur_round` of -1 ends the
    /// session.
    pub async fn can_we_start_yet(&mut self) -> RpcResult<RoundInfo> {
        if self.state == SessionState::Done {
            return Err(RpcError::SessionClosed);
        }
        let round: RoundInfo = self.call("can_we_start_yet", NoParams {}).await?;
        self.state = if round.is_terminal() {
            SessionState::Done
        } else {
            SessionState::RoundOpen {
                round: round.cur_round,
            }
        };
        Ok(round)
    }

    /// Submit this round's events. Allowed once per open round.
    pub async fn register_events(&mut self, events: &[EventRecord]) -> RpcResult<()> {
        match self.state {
            SessionState::RoundOpen { .. } => {}
            SessionState::Done => return Err(RpcError::SessionClosed),
            state => {
                return Err(RpcError::OutOfOrder {
                    method: "register_events",
                    state,
                })
            }
        }
        let _: Value = self
            .call("register_events", RegisterEventsParams { events })
            .await?;
        self.state = SessionState::AwaitingRound;
        Ok(())
    }

    /// Shut down the write half; the controller sees EOF.
    pub async fn close(&mut self) -> RpcResult<()> {
        self.writer.shutdown().await?;
        Ok(())
    }

    #[instrument(skip(self, params))]
    async fn call<P, T>(&mut self, method: &str, params: P) -> RpcResult<T>
    where
        P: Serialize,
        T: DeserializeOwned,
    {
        let id = Uuid::new_v4().to_string();
        let request = Request {
            jsonrpc: "2.0",
            id: id.clone(),
            method,
            params,
        };
        let mut line = serde_json::to_string(&request)?;
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        debug!(%id, bytes = line.len(), "request sent");

        let mut buf = String::new();
        if self.reader.read_line(&mut buf).await? == 0 {
            return Err(RpcError::ConnectionClosed);
        }

        let reply: Reply = serde_json::from_str(buf.trim_end())
            .map_err(|e| RpcError::InvalidResponse(format!("{e}: {}", buf.trim_end())))?;

        if reply.jsonrpc.as_deref() != Some("2.0") {
            return Err(RpcError::InvalidResponse(buf.trim_end().to_string()));
        }
        if let Some(error) = reply.error {
            return Err(RpcError::Remote(error.to_string()));
        }
        if reply.id.as_ref().and_then(Value::as_str) != Some(id.as_str()) {
            warn!(sent = %id, received = ?reply.id, "reply id does not match request");
        }

        let result = reply
            .result
            .ok_or_else(|| RpcError::InvalidResponse("reply has no result".to_string()))?;
        serde_json::from_value(result).map_err(|e| RpcError::InvalidResponse(e.to_string()))
    }
}
