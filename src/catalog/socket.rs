//! Catalog client speaking newline-delimited JSON over a Unix or TCP socket.
//!
//! Requests are written by the caller and block until the matching reply shows
//! up. Replies are read by a single worker task on a private tokio runtime; it
//! is the only thing that touches the read half of the connection.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::runtime::Runtime;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use super::{CatalogClient, CatalogEntry, CatalogId};
use crate::core::event_loop::StopFlag;
use crate::error::CatalogError;

type Reader = Box<dyn AsyncRead + Send + Unpin>;
type Writer = Box<dyn AsyncWrite + Send + Unpin>;
type ReplySender = oneshot::Sender<Result<Value, CatalogError>>;

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Request<'a> {
    Hello { client: &'a str },
    Lookup { url: &'a str },
    Add { url: &'a str },
    Remove { id: CatalogId },
    Rehash { id: CatalogId },
    Move { id: CatalogId, url: &'a str },
    Query { prefix: &'a str },
}

#[derive(Debug, Serialize)]
struct Envelope<'a> {
    seq: u64,
    #[serde(flatten)]
    request: Request<'a>,
}

#[derive(Debug, Deserialize)]
struct Reply {
    seq: u64,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Default)]
struct PendingReplies {
    waiting: HashMap<u64, ReplySender>,
    closed: bool,
}

/// Connection to the catalog service.
pub struct SocketCatalog {
    runtime: Option<Runtime>,
    writer: Writer,
    pending: Arc<Mutex<PendingReplies>>,
    worker: Option<JoinHandle<()>>,
    next_seq: u64,
}

impl SocketCatalog {
    /// Connects to `address` (`unix:///path` or `tcp://host:port`) and says hello.
    ///
    /// `stop` is raised when the service closes the connection.
    pub fn connect(address: &str, client_name: &str, stop: StopFlag) -> Result<Self, CatalogError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("catalog-io")
            .enable_all()
            .build()?;

        let (reader, writer) = runtime.block_on(open(address))?;
        let pending = Arc::new(Mutex::new(PendingReplies::default()));
        let worker = runtime.spawn(pump_replies(reader, Arc::clone(&pending), stop));

        let mut catalog = Self {
            runtime: Some(runtime),
            writer,
            pending,
            worker: Some(worker),
            next_seq: 1,
        };
        catalog.request(Request::Hello {
            client: client_name,
        })?;
        info!("connected to catalog at {}", address);
        Ok(catalog)
    }

    fn request(&mut self, request: Request<'_>) -> Result<Value, CatalogError> {
        let seq = self.next_seq;
        self.next_seq += 1;

        let mut line = serde_json::to_vec(&Envelope { seq, request })?;
        line.push(b'\n');

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            if pending.closed {
                return Err(CatalogError::Disconnected);
            }
            pending.waiting.insert(seq, tx);
        }

        let runtime = self.runtime.as_ref().ok_or(CatalogError::Disconnected)?;
        let outcome = runtime.block_on(exchange(&mut self.writer, line, rx));
        if outcome.is_err() {
            self.pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .waiting
                .remove(&seq);
        }
        outcome
    }
}

impl CatalogClient for SocketCatalog {
    fn lookup_id(&mut self, url: &Url) -> Result<Option<CatalogId>, CatalogError> {
        let result = self.request(Request::Lookup { url: url.as_str() })?;
        Ok(serde_json::from_value(result)?)
    }

    fn add(&mut self, url: &Url) -> Result<(), CatalogError> {
        self.request(Request::Add { url: url.as_str() }).map(drop)
    }

    fn remove(&mut self, id: CatalogId) -> Result<(), CatalogError> {
        self.request(Request::Remove { id }).map(drop)
    }

    fn rehash(&mut self, id: CatalogId) -> Result<(), CatalogError> {
        self.request(Request::Rehash { id }).map(drop)
    }

    fn move_entry(&mut self, id: CatalogId, new_url: &Url) -> Result<(), CatalogError> {
        self.request(Request::Move {
            id,
            url: new_url.as_str(),
        })
        .map(drop)
    }

    fn query_by_prefix(&mut self, prefix: &Url) -> Result<Vec<CatalogEntry>, CatalogError> {
        let result = self.request(Request::Query {
            prefix: prefix.as_str(),
        })?;
        if result.is_null() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_value(result)?)
    }
}

impl Drop for SocketCatalog {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

async fn open(address: &str) -> Result<(Reader, Writer), CatalogError> {
    if let Some(path) = address.strip_prefix("unix://") {
        #[cfg(unix)]
        {
            let stream = tokio::net::UnixStream::connect(path)
                .await
                .map_err(|source| connect_error(address, source))?;
            let (reader, writer) = stream.into_split();
            return Ok((Box::new(reader), Box::new(writer)));
        }
        #[cfg(not(unix))]
        {
            let _ = path;
            return Err(CatalogError::UnsupportedAddress(address.to_string()));
        }
    }

    if let Some(host) = address.strip_prefix("tcp://") {
        let stream = tokio::net::TcpStream::connect(host)
            .await
            .map_err(|source| connect_error(address, source))?;
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();
        return Ok((Box::new(reader), Box::new(writer)));
    }

    Err(CatalogError::UnsupportedAddress(address.to_string()))
}

fn connect_error(address: &str, source: std::io::Error) -> CatalogError {
    CatalogError::Connect {
        address: address.to_string(),
        source,
    }
}

async fn exchange(
    writer: &mut Writer,
    line: Vec<u8>,
    reply: oneshot::Receiver<Result<Value, CatalogError>>,
) -> Result<Value, CatalogError> {
    writer.write_all(&line).await?;
    writer.flush().await?;
    match reply.await {
        Ok(result) => result,
        Err(_) => Err(CatalogError::Disconnected),
    }
}

async fn pump_replies(reader: Reader, pending: Arc<Mutex<PendingReplies>>, stop: StopFlag) {
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => match serde_json::from_str::<Reply>(&line) {
                Ok(reply) => deliver(&pending, reply),
                Err(err) => debug!("ignoring malformed catalog reply: {}", err),
            },
            Ok(None) => {
                info!("catalog closed the connection");
                break;
            }
            Err(err) => {
                warn!("catalog connection failed: {}", err);
                break;
            }
        }
    }

    // Dropping the senders fails every outstanding request.
    {
        let mut pending = pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.closed = true;
        pending.waiting.clear();
    }
    stop.request();
}

fn deliver(pending: &Mutex<PendingReplies>, reply: Reply) {
    let sender = pending
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .waiting
        .remove(&reply.seq);
    let Some(sender) = sender else {
        debug!("reply for unknown request {}", reply.seq);
        return;
    };
    let result = match reply.error {
        Some(message) => Err(CatalogError::Rejected(message)),
        None => Ok(reply.result),
    };
    let _ = sender.send(result);
}
