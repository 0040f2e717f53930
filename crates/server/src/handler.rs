//! Handler implementation for the RouteGuide service

use crate::protocol::{ResponseSink, RouteGuide, Streaming};
use routeguide::{FeatureStore, RouteNoteLog};
use routeguide_rpc::Status;
use routeguide_types::geo::distance;
use routeguide_types::{Feature, Point, Rectangle, RouteNote, RouteSummary};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::debug;

#[derive(Clone)]
pub struct Handler {
    store: Arc<FeatureStore>,
    notes: Arc<RouteNoteLog>,
}

impl Handler {
    pub fn new(store: Arc<FeatureStore>) -> Self {
        Self {
            store,
            notes: Arc::new(RouteNoteLog::new()),
        }
    }

    pub fn notes(&self) -> &RouteNoteLog {
        &self.notes
    }
}

/// A failed read or send ends the call. Cancellation is a normal way to end
/// it and is not reported as a failure.
fn end_call(method: &str, status: Status) -> Result<(), Status> {
    if status.is_cancelled() {
        debug!("{} stopped: {}", method, status);
        Ok(())
    } else {
        Err(status)
    }
}

impl RouteGuide for Handler {
    async fn get_feature(&self, point: Point) -> Result<Feature, Status> {
        let feature = self
            .store
            .find_at(&point)
            .cloned()
            .unwrap_or_else(|| Feature::unnamed(point));
        Ok(feature)
    }

    async fn list_features(
        &self,
        rect: Rectangle,
        sink: ResponseSink<Feature>,
    ) -> Result<(), Status> {
        let mut sent = 0usize;
        for feature in self.store.scan_in(&rect) {
            if let Err(status) = sink.send(feature.clone()).await {
                return end_call("ListFeatures", status);
            }
            sent += 1;
        }
        debug!("ListFeatures sent {} features", sent);
        Ok(())
    }

    async fn record_route(&self, mut points: Streaming<Point>) -> Result<RouteSummary, Status> {
        let start = Instant::now();
        let mut summary = RouteSummary::default();
        let mut last_point: Option<Point> = None;

        while let Some(point) = points.message().await? {
            summary.point_count += 1;
            summary.feature_count += self.store.count_at(&point) as i32;
            if let Some(prev) = last_point {
                summary.distance = summary.distance.saturating_add(distance(&prev, &point));
            }
            last_point = Some(point);
        }

        summary.elapsed_time = start.elapsed().as_secs() as i32;
        Ok(summary)
    }

    async fn route_chat(
        &self,
        mut notes: Streaming<RouteNote>,
        sink: ResponseSink<RouteNote>,
    ) -> Result<(), Status> {
        loop {
            let note = match notes.message().await {
                Ok(Some(note)) => note,
                Ok(None) => return Ok(()),
                Err(status) => return end_call("RouteChat", status),
            };

            // The snapshot is an owned copy; the log lock is already released.
            let history = self.notes.append(note);
            if let Err(status) = sink.send_all(history).await {
                return end_call("RouteChat", status);
            }
        }
    }
}
