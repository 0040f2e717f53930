//! Framed TCP transport for the RouteGuide client
//!
//! A connection runs two background tasks: a writer draining queued
//! [`ClientFrame`]s and a reader routing [`ServerFrame`]s to the call they
//! belong to.

use crate::call::{RecordRouteCall, RequestSink, ResponseStream};
use dashmap::DashMap;
use futures::prelude::*;
use routeguide_rpc::{
    CallId, ClientFrame, DEFAULT_MAX_FRAME_SIZE, Message, Method, RpcClientCodec, ServerFrame,
    Status,
};
use routeguide_types::{Feature, Point, Rectangle, RouteNote, RouteSummary};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::codec::Framed;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Connection error: {0}")]
    Connection(#[from] std::io::Error),
    #[error("Server error: {0}")]
    Status(#[from] Status),
    #[error("Connection closed")]
    Disconnected,
    #[error("Call no longer accepts requests")]
    Closed,
    #[error("Unexpected response: {0}")]
    UnexpectedMessage(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Client connection settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub max_frame_size: usize,
    /// Response messages a streaming call may have in flight before the
    /// server waits for the consumer
    pub call_buffer: usize,
    /// Request frames buffered per connection
    pub outbound_buffer: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            call_buffer: 64,
            outbound_buffer: 256,
        }
    }
}

/// Reader-side state of one live call.
#[derive(Clone)]
pub(crate) struct CallRoute {
    pub(crate) tx: mpsc::Sender<ServerFrame>,
    /// Request messages the server still has room for
    pub(crate) send_window: Arc<Semaphore>,
    /// Set when the connection gives up on the call without a `Close`
    pub(crate) failure: Arc<OnceLock<Status>>,
}

impl CallRoute {
    fn fail(&self, status: Status) {
        let _ = self.failure.set(status);
        self.send_window.close();
    }
}

pub(crate) type CallMap = DashMap<CallId, CallRoute>;

pub(crate) struct Shared {
    /// Request messages and half-closes, in call order
    pub(crate) out_tx: mpsc::Sender<ClientFrame>,
    /// Opens, credit and cancels; never blocks and is written first
    pub(crate) control_tx: mpsc::UnboundedSender<ClientFrame>,
    pub(crate) calls: Arc<CallMap>,
    next_call_id: AtomicU64,
    call_buffer: usize,
}

impl Shared {
    pub(crate) async fn send(&self, frame: ClientFrame) -> Result<()> {
        self.out_tx
            .send(frame)
            .await
            .map_err(|_| ClientError::Disconnected)
    }

    pub(crate) fn send_control(&self, frame: ClientFrame) -> Result<()> {
        self.control_tx
            .send(frame)
            .map_err(|_| ClientError::Disconnected)
    }

    /// Forget a call the caller no longer reads.
    pub(crate) fn drop_call(&self, call_id: CallId) {
        if let Some((_, route)) = self.calls.remove(&call_id) {
            route.send_window.close();
        }
    }
}

/// Handle to one connection. Cheap to clone; all clones share the
/// connection and may run calls concurrently.
#[derive(Clone)]
pub struct RouteGuideClient {
    shared: Arc<Shared>,
}

impl RouteGuideClient {
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        Self::connect_with(addr, ClientConfig::default()).await
    }

    pub async fn connect_with(addr: SocketAddr, config: ClientConfig) -> Result<Self> {
        let socket = TcpStream::connect(addr).await?;
        socket.set_nodelay(true)?;
        let framed = Framed::new(socket, RpcClientCodec::new(config.max_frame_size));
        let (mut writer, mut reader) = framed.split();

        let (out_tx, mut out_rx) = mpsc::channel::<ClientFrame>(config.outbound_buffer);
        let (control_tx, mut control_rx) = mpsc::unbounded_channel::<ClientFrame>();
        let control = control_tx.downgrade();
        let calls = Arc::new(CallMap::new());
        let shared = Arc::new(Shared {
            out_tx,
            control_tx,
            calls: calls.clone(),
            next_call_id: AtomicU64::new(1),
            call_buffer: config.call_buffer.max(1),
        });

        tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    biased;
                    Some(frame) = control_rx.recv() => frame,
                    Some(frame) = out_rx.recv() => frame,
                    else => break,
                };
                if let Err(e) = writer.send(frame).await {
                    warn!("Failed to write frame to {}: {}", addr, e);
                    return;
                }
            }
            // Every handle is gone; let the server see end of stream.
            let _ = writer.close().await;
        });

        // Routing never waits on a call: each call's queue has room for its
        // whole response window plus the closing frame.
        tokio::spawn(async move {
            while let Some(frame) = reader.next().await {
                let frame = match frame {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!("Connection to {} failed: {}", addr, e);
                        break;
                    }
                };

                let call_id = frame.call_id();
                match frame {
                    ServerFrame::Credit { credit, .. } => {
                        if let Some(route) = calls.get(&call_id) {
                            let room = (u32::MAX as usize)
                                .saturating_sub(route.send_window.available_permits());
                            route.send_window.add_permits((credit as usize).min(room));
                        }
                    }
                    ServerFrame::Close { ref status, .. } => {
                        let Some((_, route)) = calls.remove(&call_id) else {
                            debug!("Close for unknown call {}", call_id);
                            continue;
                        };
                        route.send_window.close();
                        let status = status.clone();
                        if route.tx.try_send(frame).is_err() {
                            route.fail(if status.is_ok() {
                                Status::resource_exhausted("server exceeded the response window")
                            } else {
                                status
                            });
                        }
                    }
                    ServerFrame::Message { .. } => {
                        let Some(route) = calls.get(&call_id).map(|route| route.value().clone()) else {
                            debug!("Response for unknown call {}", call_id);
                            continue;
                        };
                        match route.tx.try_send(frame) {
                            Ok(()) => {}
                            Err(TrySendError::Full(_)) => {
                                warn!("Server sent past the response window of call {}", call_id);
                                calls.remove(&call_id);
                                route.fail(Status::resource_exhausted(
                                    "server exceeded the response window",
                                ));
                                if let Some(control) = control.upgrade() {
                                    let _ = control.send(ClientFrame::Cancel { call_id });
                                }
                            }
                            Err(TrySendError::Closed(_)) => {
                                debug!("Call {} dropped before its response arrived", call_id);
                            }
                        }
                    }
                }
            }
            // Pending calls observe the closed channel as a disconnect.
            for route in calls.iter() {
                route.send_window.close();
            }
            calls.clear();
            debug!("Reader for {} stopped", addr);
        });

        Ok(Self { shared })
    }

    fn open<Req, Resp>(
        &self,
        method: Method,
    ) -> Result<(RequestSink<Req>, ResponseStream<Resp>)>
    where
        Req: Into<Message>,
        Resp: TryFrom<Message, Error = Status>,
    {
        let call_id = self.shared.next_call_id.fetch_add(1, Ordering::Relaxed);
        let window = if method.server_streaming() {
            self.shared.call_buffer
        } else {
            1
        };
        let (tx, rx) = mpsc::channel(window + 1);
        let route = CallRoute {
            tx,
            send_window: Arc::new(Semaphore::new(0)),
            failure: Arc::new(OnceLock::new()),
        };
        self.shared.calls.insert(call_id, route.clone());

        let open = ClientFrame::Open {
            call_id,
            method,
            window: window as u32,
        };
        if let Err(e) = self.shared.send_control(open) {
            self.shared.drop_call(call_id);
            return Err(e);
        }

        // Credit is handed back in batches of half the window.
        let credit_batch = method.server_streaming().then(|| (window as u32 / 2).max(1));
        Ok((
            RequestSink::new(call_id, route.send_window, self.shared.clone()),
            ResponseStream::new(call_id, rx, route.failure, credit_batch, self.shared.clone()),
        ))
    }

    /// The feature at `point`; an unnamed feature if none is stored there.
    pub async fn get_feature(&self, point: Point) -> Result<Feature> {
        let (request, response) = self.open::<Point, Feature>(Method::GetFeature)?;
        send_one(request, point).await?;
        response.single().await
    }

    /// Stream every feature inside `rect`. Dropping the stream early cancels
    /// the call.
    pub async fn list_features(&self, rect: Rectangle) -> Result<ResponseStream<Feature>> {
        let (request, response) = self.open::<Rectangle, Feature>(Method::ListFeatures)?;
        send_one(request, rect).await?;
        Ok(response)
    }

    /// Start recording a route; send points then call
    /// [`RecordRouteCall::finish`].
    pub async fn record_route(&self) -> Result<RecordRouteCall> {
        let (request, response) = self.open::<Point, RouteSummary>(Method::RecordRoute)?;
        Ok(RecordRouteCall::new(request, response))
    }

    /// Open a chat. Each note sent is answered with every note recorded at
    /// its location so far.
    pub async fn route_chat(
        &self,
    ) -> Result<(RequestSink<RouteNote>, ResponseStream<RouteNote>)> {
        self.open::<RouteNote, RouteNote>(Method::RouteChat)
    }

    /// Number of calls still waiting for frames from the server.
    pub fn active_calls(&self) -> usize {
        self.shared.calls.len()
    }
}

/// Send the only request of a call and half-close it. A call that ended
/// before taking the request reports why through its response stream.
async fn send_one<T: Into<Message>>(mut request: RequestSink<T>, item: T) -> Result<()> {
    match request.send(item).await {
        Ok(()) => request.close().await,
        Err(ClientError::Closed) => Ok(()),
        Err(e) => Err(e),
    }
}
