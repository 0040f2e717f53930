//! Typed handles for in-flight calls

use crate::transport::rpc::{ClientError, Result, Shared};
use routeguide_rpc::{CallId, ClientFrame, Message, ServerFrame, Status};
use routeguide_types::{Point, RouteSummary};
use std::marker::PhantomData;
use std::sync::{Arc, OnceLock};
use tokio::sync::Semaphore;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

/// Response messages of one call.
///
/// Dropping the stream before the server closes the call cancels it.
pub struct ResponseStream<T> {
    call_id: CallId,
    rx: mpsc::Receiver<ServerFrame>,
    failure: Arc<OnceLock<Status>>,
    /// Messages read between two credit returns; `None` for calls with a
    /// single response
    credit_batch: Option<u32>,
    consumed: u32,
    shared: Arc<Shared>,
    finished: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ResponseStream<T>
where
    T: TryFrom<Message, Error = Status>,
{
    pub(crate) fn new(
        call_id: CallId,
        rx: mpsc::Receiver<ServerFrame>,
        failure: Arc<OnceLock<Status>>,
        credit_batch: Option<u32>,
        shared: Arc<Shared>,
    ) -> Self {
        Self {
            call_id,
            rx,
            failure,
            credit_batch,
            consumed: 0,
            shared,
            finished: false,
            _marker: PhantomData,
        }
    }

    /// Next response message; `None` once the server closed the call with an
    /// OK status.
    pub async fn message(&mut self) -> Result<Option<T>> {
        if self.finished {
            return Ok(None);
        }

        match self.rx.recv().await {
            Some(ServerFrame::Message { message, .. }) => {
                self.return_credit();
                T::try_from(message)
                    .map(Some)
                    .map_err(|status| ClientError::UnexpectedMessage(status.message))
            }
            Some(ServerFrame::Close { status, .. }) => {
                self.finished = true;
                if status.is_ok() {
                    Ok(None)
                } else {
                    Err(ClientError::Status(status))
                }
            }
            Some(ServerFrame::Credit { .. }) => Err(ClientError::UnexpectedMessage(
                "credit frame routed to a response stream".into(),
            )),
            None => {
                self.finished = true;
                match self.failure.get() {
                    Some(status) => Err(ClientError::Status(status.clone())),
                    None => Err(ClientError::Disconnected),
                }
            }
        }
    }

    fn return_credit(&mut self) {
        let Some(batch) = self.credit_batch else {
            return;
        };
        self.consumed += 1;
        if self.consumed >= batch {
            // A dead connection shows up as the end of the stream.
            let _ = self.shared.send_control(ClientFrame::Credit {
                call_id: self.call_id,
                credit: std::mem::take(&mut self.consumed),
            });
        }
    }

    /// Read every remaining message until the call closes.
    pub async fn collect_all(mut self) -> Result<Vec<T>> {
        let mut items = Vec::new();
        while let Some(item) = self.message().await? {
            items.push(item);
        }
        Ok(items)
    }

    /// Exactly one message followed by the close of the call.
    pub(crate) async fn single(mut self) -> Result<T> {
        let item = self
            .message()
            .await?
            .ok_or_else(|| ClientError::UnexpectedMessage("no response message".into()))?;
        match self.message().await? {
            None => Ok(item),
            Some(_) => Err(ClientError::UnexpectedMessage(
                "more than one response message".into(),
            )),
        }
    }

    pub fn call_id(&self) -> CallId {
        self.call_id
    }
}

impl<T> Drop for ResponseStream<T> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.shared.drop_call(self.call_id);
        if self
            .shared
            .send_control(ClientFrame::Cancel {
                call_id: self.call_id,
            })
            .is_err()
        {
            debug!("Connection gone before cancel of call {}", self.call_id);
        }
    }
}

/// Request side of a call.
///
/// Dropping the sink without calling [`RequestSink::close`] half-closes the
/// call.
pub struct RequestSink<T> {
    call_id: CallId,
    window: Arc<Semaphore>,
    shared: Arc<Shared>,
    closed: bool,
    _marker: PhantomData<fn(T)>,
}

impl<T> RequestSink<T>
where
    T: Into<Message>,
{
    pub(crate) fn new(call_id: CallId, window: Arc<Semaphore>, shared: Arc<Shared>) -> Self {
        Self {
            call_id,
            window,
            shared,
            closed: false,
            _marker: PhantomData,
        }
    }

    /// Send one request, waiting until the server has room for it.
    ///
    /// Fails with [`ClientError::Closed`] after [`RequestSink::close`], and
    /// once the call has ended or its response stream was dropped; the
    /// outcome of the call is then read from the response stream.
    pub async fn send(&mut self, item: T) -> Result<()> {
        if self.closed {
            return Err(ClientError::Closed);
        }
        match self.window.acquire().await {
            Ok(permit) => permit.forget(),
            Err(_) => return Err(ClientError::Closed),
        }
        self.shared
            .send(ClientFrame::Message {
                call_id: self.call_id,
                message: item.into(),
            })
            .await
    }

    /// Tell the server no more requests follow.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.shared
            .send(ClientFrame::HalfClose {
                call_id: self.call_id,
            })
            .await
    }
}

impl<T> Drop for RequestSink<T> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let half_close = ClientFrame::HalfClose {
            call_id: self.call_id,
        };
        // Stays on the request queue so it follows every message already sent.
        match self.shared.out_tx.try_send(half_close) {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(half_close)) => {
                match tokio::runtime::Handle::try_current() {
                    Ok(runtime) => {
                        let out_tx = self.shared.out_tx.clone();
                        runtime.spawn(async move {
                            let _ = out_tx.send(half_close).await;
                        });
                    }
                    Err(_) => debug!("No runtime to half-close call {}", self.call_id),
                }
            }
        }
    }
}

/// An open RecordRoute call.
pub struct RecordRouteCall {
    points: RequestSink<Point>,
    summary: ResponseStream<RouteSummary>,
}

impl RecordRouteCall {
    pub(crate) fn new(points: RequestSink<Point>, summary: ResponseStream<RouteSummary>) -> Self {
        Self { points, summary }
    }

    /// Send one point. When the server ended the call early this fails with
    /// the status it reported.
    pub async fn send(&mut self, point: Point) -> Result<()> {
        match self.points.send(point).await {
            Err(ClientError::Closed) if !self.points.closed => {
                self.points.closed = true;
                match self.summary.message().await {
                    Err(e) => Err(e),
                    Ok(_) => Err(ClientError::Closed),
                }
            }
            other => other,
        }
    }

    /// End the route and wait for its summary.
    pub async fn finish(mut self) -> Result<RouteSummary> {
        self.points.close().await?;
        self.summary.single().await
    }
}
