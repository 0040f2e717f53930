//! Framed TCP transport for the RouteGuide server
//!
//! One task per connection reads frames and routes them to calls; one task
//! per connection writes response frames; one task per call runs the service
//! method.

use futures::prelude::*;
use routeguide::FeatureStore;
use routeguide_rpc::{CallId, ClientFrame, Message, Method, RpcServerCodec, ServerFrame, Status};
use routeguide_types::{Point, Rectangle};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::codec::Framed;
use tracing::{debug, error, info, warn};

use crate::config::TransportConfig;
use crate::handler::Handler;
use crate::protocol::{CallContext, ResponseSink, RouteGuide, Streaming};

/// Run the RouteGuide server with the default [`Handler`].
pub async fn run_server(
    listener: TcpListener,
    store: Arc<FeatureStore>,
    shutdown: impl Future<Output = ()> + Unpin + Send + 'static,
) -> anyhow::Result<()> {
    serve(
        listener,
        Handler::new(store),
        TransportConfig::default(),
        shutdown,
    )
    .await
}

/// Serve any [`RouteGuide`] implementation until `shutdown` resolves.
pub async fn serve<S: RouteGuide>(
    listener: TcpListener,
    service: S,
    config: TransportConfig,
    mut shutdown: impl Future<Output = ()> + Unpin + Send + 'static,
) -> anyhow::Result<()> {
    let service = Arc::new(service);
    let config = Arc::new(config);

    info!("RouteGuide server listening on {}", listener.local_addr()?);

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((socket, peer)) => {
                        let service = service.clone();
                        let config = config.clone();
                        tokio::spawn(async move {
                            debug!("Accepted connection from {}", peer);
                            if let Err(e) = serve_connection(socket, peer, service, &config).await {
                                warn!("Connection {} closed with error: {}", peer, e);
                            } else {
                                debug!("Connection {} closed", peer);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Accept error: {}", e);
                    }
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received, stopping server...");
                break;
            }
        }
    }

    Ok(())
}

struct ActiveCall {
    method: Method,
    inbound: Option<mpsc::Sender<Message>>,
    /// Response messages the client still has room for
    send_window: Arc<Semaphore>,
    ctx: CallContext,
}

/// Largest response window a client may build up with credit.
const MAX_WINDOW: usize = u32::MAX as usize;

async fn serve_connection<S: RouteGuide>(
    socket: TcpStream,
    peer: SocketAddr,
    service: Arc<S>,
    config: &TransportConfig,
) -> anyhow::Result<()> {
    let framed = Framed::new(socket, RpcServerCodec::new(config.max_frame_size));
    let (mut writer, mut reader) = framed.split();

    let (out_tx, mut out_rx) = mpsc::channel::<ServerFrame>(config.outbound_buffer);
    let write_task = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            if let Err(e) = writer.send(frame).await {
                warn!("Failed to write frame to {}: {}", peer, e);
                break;
            }
        }
    });

    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<CallId>();
    let mut calls: HashMap<CallId, ActiveCall> = HashMap::new();

    // Routing a frame never waits on a call, so one stalled call cannot hold
    // up the others on this connection.
    let outcome = loop {
        tokio::select! {
            frame = reader.next() => match frame {
                Some(Ok(frame)) => {
                    route_frame(frame, &mut calls, &service, config, &out_tx, &done_tx);
                }
                Some(Err(e)) => break Err(e),
                None => break Ok(()),
            },
            Some(call_id) = done_rx.recv() => {
                calls.remove(&call_id);
            }
        }
    };

    for (call_id, call) in calls.drain() {
        debug!("Aborting {} call {} on {}", call.method, call_id, peer);
        call.ctx.disconnect();
    }

    // The writer stops once every call task has dropped its sender.
    drop(out_tx);
    if let Err(e) = write_task.await {
        error!("Writer task for {} failed: {}", peer, e);
    }

    outcome
}

fn route_frame<S: RouteGuide>(
    frame: ClientFrame,
    calls: &mut HashMap<CallId, ActiveCall>,
    service: &Arc<S>,
    config: &TransportConfig,
    out_tx: &mpsc::Sender<ServerFrame>,
    done_tx: &mpsc::UnboundedSender<CallId>,
) {
    match frame {
        ClientFrame::Open {
            call_id,
            method,
            window,
        } => {
            if calls.contains_key(&call_id) {
                warn!("Ignoring open for call {} which is still active", call_id);
                return;
            }

            let (in_tx, in_rx) = mpsc::channel(config.call_buffer);
            let send_window = Arc::new(Semaphore::new(window as usize));
            let ctx = CallContext::new();
            calls.insert(
                call_id,
                ActiveCall {
                    method,
                    inbound: Some(in_tx),
                    send_window: send_window.clone(),
                    ctx: ctx.clone(),
                },
            );

            debug!("Starting {} call {}", method, call_id);
            let io = CallIo {
                call_id,
                method,
                inbound: in_rx,
                request_window: config.call_buffer as u32,
                send_window,
                ctx,
                out_tx: out_tx.clone(),
            };
            tokio::spawn(run_call(service.clone(), io, done_tx.clone()));
        }
        ClientFrame::Message { call_id, message } => {
            let Some(call) = calls.get_mut(&call_id) else {
                warn!("Dropping message for unknown call {}", call_id);
                return;
            };
            let Some(inbound) = &call.inbound else {
                debug!("Dropping message for call {} after half-close", call_id);
                return;
            };
            match inbound.try_send(message) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!("Call {} sent past its request window", call_id);
                    call.ctx.abort(Status::resource_exhausted(
                        "request sent without flow-control credit",
                    ));
                    call.inbound = None;
                }
                // The call already finished; its removal is pending.
                Err(TrySendError::Closed(_)) => call.inbound = None,
            }
        }
        ClientFrame::HalfClose { call_id } => {
            if let Some(call) = calls.get_mut(&call_id) {
                call.inbound = None;
            }
        }
        ClientFrame::Cancel { call_id } => {
            if let Some(call) = calls.get_mut(&call_id) {
                debug!("Client cancelled {} call {}", call.method, call_id);
                call.ctx.cancel();
                call.inbound = None;
            }
        }
        ClientFrame::Credit { call_id, credit } => {
            let Some(call) = calls.get(&call_id) else {
                debug!("Credit for finished call {}", call_id);
                return;
            };
            let available = call.send_window.available_permits();
            if available.saturating_add(credit as usize) > MAX_WINDOW {
                warn!("Call {} overflowed its response window", call_id);
                call.ctx
                    .abort(Status::invalid_argument("flow-control window overflow"));
                return;
            }
            call.send_window.add_permits(credit as usize);
        }
    }
}

/// Everything a call task needs to talk to its client.
struct CallIo {
    call_id: CallId,
    method: Method,
    inbound: mpsc::Receiver<Message>,
    request_window: u32,
    send_window: Arc<Semaphore>,
    ctx: CallContext,
    out_tx: mpsc::Sender<ServerFrame>,
}

impl CallIo {
    fn requests<T>(self) -> Streaming<T>
    where
        T: TryFrom<Message, Error = Status>,
    {
        let requests = Streaming::new(self.inbound, self.ctx);
        if self.method.client_streaming() {
            requests.with_credit(self.call_id, self.out_tx, (self.request_window / 2).max(1))
        } else {
            requests
        }
    }
}

async fn run_call<S: RouteGuide>(
    service: Arc<S>,
    io: CallIo,
    done_tx: mpsc::UnboundedSender<CallId>,
) {
    let call_id = io.call_id;
    let method = io.method;
    let ctx = io.ctx.clone();
    let out_tx = io.out_tx.clone();

    // Unary and server-streaming calls take exactly one request.
    let credit = if method.client_streaming() {
        io.request_window
    } else {
        1
    };
    let granted = out_tx.send(ServerFrame::Credit { call_id, credit }).await.is_ok();

    let result = if granted {
        dispatch(&*service, io).await
    } else {
        Err(Status::unavailable("connection closed"))
    };

    if ctx.reports_status() {
        let status = match result {
            _ if ctx.is_done() => ctx.status(),
            Ok(()) => Status::ok(),
            Err(status) => status,
        };
        if !status.is_ok() {
            debug!("{} call {} failed: {}", method, call_id, status);
        }
        if out_tx
            .send(ServerFrame::Close { call_id, status })
            .await
            .is_err()
        {
            debug!("Connection gone before {} call {} closed", method, call_id);
        }
    } else {
        // Nobody is waiting for a status on a cancelled or orphaned call.
        debug!("{} call {} ended: {}", method, call_id, ctx.status());
    }

    let _ = done_tx.send(call_id);
}

async fn dispatch<S: RouteGuide>(service: &S, io: CallIo) -> Result<(), Status> {
    let call_id = io.call_id;
    let method = io.method;
    let ctx = io.ctx.clone();
    let out_tx = io.out_tx.clone();
    let window = io.send_window.clone();
    macro_rules! responses {
        () => {
            ResponseSink::new(call_id, out_tx.clone(), ctx.clone()).with_window(window.clone())
        };
    }

    match method {
        Method::GetFeature => {
            let point: Point = single_request(io.requests()).await?;
            let feature = service.get_feature(point).await?;
            responses!().send(feature).await
        }
        Method::ListFeatures => {
            let rect: Rectangle = single_request(io.requests()).await?;
            service.list_features(rect, responses!()).await
        }
        Method::RecordRoute => {
            let summary = service.record_route(io.requests()).await?;
            responses!().send(summary).await
        }
        Method::RouteChat => service.route_chat(io.requests(), responses!()).await,
    }
}

/// The one request message of a unary or server-streaming call.
async fn single_request<T>(mut stream: Streaming<T>) -> Result<T, Status>
where
    T: TryFrom<Message, Error = Status>,
{
    stream
        .message()
        .await?
        .ok_or_else(|| Status::invalid_argument("missing request message"))
}
