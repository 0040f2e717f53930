//! Service contract for RouteGuide
//!
//! This module contains the service trait and the per-call stream types the
//! transport hands to it. Any type implementing [`RouteGuide`] can be served;
//! the transport owns framing, call ids and cancellation.

use routeguide_rpc::{CallId, Message, ServerFrame, Status};
use routeguide_types::{Feature, Point, Rectangle, RouteNote, RouteSummary};
use std::future::Future;
use std::marker::PhantomData;
use std::sync::{Arc, OnceLock};
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;

/// The four RouteGuide operations.
pub trait RouteGuide: Send + Sync + 'static {
    /// Unary: the feature at `point`, or an unnamed feature there.
    fn get_feature(&self, point: Point) -> impl Future<Output = Result<Feature, Status>> + Send;

    /// Server-streaming: every feature inside `rect`.
    fn list_features(
        &self,
        rect: Rectangle,
        sink: ResponseSink<Feature>,
    ) -> impl Future<Output = Result<(), Status>> + Send;

    /// Client-streaming: statistics over the received route.
    fn record_route(
        &self,
        points: Streaming<Point>,
    ) -> impl Future<Output = Result<RouteSummary, Status>> + Send;

    /// Bidirectional: record each note and reply with the history at its
    /// location.
    fn route_chat(
        &self,
        notes: Streaming<RouteNote>,
        sink: ResponseSink<RouteNote>,
    ) -> impl Future<Output = Result<(), Status>> + Send;
}

/// Cancellation state shared by everything belonging to one call.
///
/// The first reason recorded wins; later stops only re-trigger the token.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    token: CancellationToken,
    reason: Arc<OnceLock<Stop>>,
}

#[derive(Debug)]
struct Stop {
    status: Status,
    report: bool,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    fn stop(&self, status: Status, report: bool) {
        let _ = self.reason.set(Stop { status, report });
        self.token.cancel();
    }

    /// Stop the call and report `status` to the client.
    pub fn abort(&self, status: Status) {
        self.stop(status, true);
    }

    /// The client gave up on the call.
    pub fn cancel(&self) {
        self.stop(Status::cancelled("call cancelled by client"), false);
    }

    /// The connection is gone.
    pub fn disconnect(&self) {
        self.stop(Status::unavailable("connection closed"), false);
    }

    pub fn is_done(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Whether the client still expects a `Close` frame for this call.
    pub fn reports_status(&self) -> bool {
        self.reason.get().is_none_or(|stop| stop.report)
    }

    /// Why the call was stopped.
    pub fn status(&self) -> Status {
        self.reason
            .get()
            .map(|stop| stop.status.clone())
            .unwrap_or_else(|| Status::cancelled("call cancelled"))
    }

    /// Resolves once the call is stopped.
    pub async fn done(&self) {
        self.token.cancelled().await
    }
}

/// Hands request-window credit back to the client as messages are consumed.
#[derive(Debug)]
struct CreditReturn {
    call_id: CallId,
    tx: mpsc::Sender<ServerFrame>,
    batch: u32,
    consumed: u32,
}

impl CreditReturn {
    async fn consumed_one(&mut self) {
        self.consumed += 1;
        if self.consumed < self.batch {
            return;
        }
        let credit = std::mem::take(&mut self.consumed);
        let frame = ServerFrame::Credit {
            call_id: self.call_id,
            credit,
        };
        // A closed writer surfaces on the response side.
        let _ = self.tx.send(frame).await;
    }
}

/// Request messages of a client-streaming call.
#[derive(Debug)]
pub struct Streaming<T> {
    rx: mpsc::Receiver<Message>,
    ctx: CallContext,
    credit: Option<CreditReturn>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Streaming<T>
where
    T: TryFrom<Message, Error = Status>,
{
    pub fn new(rx: mpsc::Receiver<Message>, ctx: CallContext) -> Self {
        Self {
            rx,
            ctx,
            credit: None,
            _marker: PhantomData,
        }
    }

    /// Grant the client `batch` more request messages on `tx` each time that
    /// many have been read.
    pub fn with_credit(
        mut self,
        call_id: CallId,
        tx: mpsc::Sender<ServerFrame>,
        batch: u32,
    ) -> Self {
        self.credit = Some(CreditReturn {
            call_id,
            tx,
            batch: batch.max(1),
            consumed: 0,
        });
        self
    }

    /// Next request message, or `None` once the client half-closed.
    ///
    /// # Errors
    /// Returns the abort status if the call was cancelled or the connection
    /// was lost, and `InvalidArgument` for a message of the wrong type.
    pub async fn message(&mut self) -> Result<Option<T>, Status> {
        let next = tokio::select! {
            biased;
            _ = self.ctx.done() => return Err(self.ctx.status()),
            next = self.rx.recv() => next,
        };

        match next {
            Some(message) => {
                if let Some(credit) = &mut self.credit {
                    credit.consumed_one().await;
                }
                T::try_from(message).map(Some)
            }
            None => Ok(None),
        }
    }
}

/// Response side of a call.
#[derive(Debug, Clone)]
pub struct ResponseSink<T> {
    call_id: CallId,
    tx: mpsc::Sender<ServerFrame>,
    ctx: CallContext,
    window: Option<Arc<Semaphore>>,
    _marker: PhantomData<fn(T)>,
}

impl<T> ResponseSink<T>
where
    T: Into<Message>,
{
    pub fn new(call_id: CallId, tx: mpsc::Sender<ServerFrame>, ctx: CallContext) -> Self {
        Self {
            call_id,
            tx,
            ctx,
            window: None,
            _marker: PhantomData,
        }
    }

    /// Send only while `window` holds permits; the transport adds one per
    /// message of credit the client grants.
    pub fn with_window(mut self, window: Arc<Semaphore>) -> Self {
        self.window = Some(window);
        self
    }

    /// Queue one response message.
    ///
    /// # Errors
    /// Fails with the abort status once the call is cancelled, and with
    /// `Unavailable` if the connection writer is gone. Callers must stop
    /// sending after the first failure. Waiting for window credit does not
    /// hold up other calls.
    pub async fn send(&self, item: T) -> Result<(), Status> {
        if self.ctx.is_done() {
            return Err(self.ctx.status());
        }

        if let Some(window) = &self.window {
            tokio::select! {
                biased;
                _ = self.ctx.done() => return Err(self.ctx.status()),
                permit = window.acquire() => match permit {
                    Ok(permit) => permit.forget(),
                    Err(_) => return Err(Status::unavailable("connection closed")),
                },
            }
        }

        let frame = ServerFrame::Message {
            call_id: self.call_id,
            message: item.into(),
        };

        tokio::select! {
            biased;
            _ = self.ctx.done() => Err(self.ctx.status()),
            sent = self.tx.send(frame) => {
                sent.map_err(|_| Status::unavailable("connection closed"))
            }
        }
    }

    /// Queue `items` in order, stopping at the first failure.
    pub async fn send_all(&self, items: Vec<T>) -> Result<(), Status> {
        for item in items {
            self.send(item).await?;
        }
        Ok(())
    }

    pub fn is_cancelled(&self) -> bool {
        self.ctx.is_done()
    }
}
