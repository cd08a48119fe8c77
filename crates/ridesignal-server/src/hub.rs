use std::sync::Arc;
use std::time::Instant;

use ridesignal_settings::OverflowPolicy;
use ridesignal_telemetry::MetricsRecorder;
use serde::Serialize;

use crate::connection::ConnectionRegistry;
use crate::presence::PresenceRegistry;
use crate::rooms::RoomManager;

/// All shared signaling state, built once at startup and injected into the
/// router and the socket drivers.
pub struct Hub {
    pub presence: PresenceRegistry,
    pub rooms: RoomManager,
    pub connections: ConnectionRegistry,
    metrics: Arc<MetricsRecorder>,
    started_at: Instant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HubStats {
    pub connections: usize,
    pub online: usize,
    pub rooms: usize,
    pub uptime_secs: u64,
}

impl Hub {
    pub fn new(queue_capacity: usize, policy: OverflowPolicy) -> Self {
        Self::with_metrics(queue_capacity, policy, Arc::new(MetricsRecorder::new()))
    }

    pub fn with_metrics(
        queue_capacity: usize,
        policy: OverflowPolicy,
        metrics: Arc<MetricsRecorder>,
    ) -> Self {
        Self {
            presence: PresenceRegistry::new(),
            rooms: RoomManager::new(),
            connections: ConnectionRegistry::new(queue_capacity, policy, Arc::clone(&metrics)),
            metrics,
            started_at: Instant::now(),
        }
    }

    pub fn metrics(&self) -> &MetricsRecorder {
        &self.metrics
    }

    /// Re-read the open-connection and online-user gauges from the registries.
    pub fn refresh_gauges(&self) {
        let connections = i64::try_from(self.connections.count()).unwrap_or(i64::MAX);
        let online = i64::try_from(self.presence.len()).unwrap_or(i64::MAX);
        self.metrics.set_gauge("connections_open", &[], connections);
        self.metrics.set_gauge("users_online", &[], online);
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            connections: self.connections.count(),
            online: self.presence.len(),
            rooms: self.rooms.room_count(),
            uptime_secs: self.started_at.elapsed().as_secs(),
        }
    }
}
