//! Pending Correlation Tables (spec §4.2) — let an asynchronous controller
//! response find the client that originated the request.
//!
//! Each family is a [`PendingTable`] keyed by whatever the controller's
//! response correlates on (usually a plant id). Irrigation additionally
//! keeps a session-id-keyed table, because `IRRIGATION_DECISION` and its
//! progress frames carry a server- or client-generated session id instead
//! of (or alongside) the plant id; [`IrrigationPending::resolve`]
//! implements the session-id-wins tie-break from spec §4.2.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::channel::ChannelId;

/// Snapshot of the request context needed to route a controller response
/// back to its originator and to rebuild the client-facing payload.
#[derive(Debug, Clone)]
pub struct PendingContext {
    pub channel_id: ChannelId,
    pub email: String,
    pub snapshot: serde_json::Value,
    created_at: Instant,
}

impl PendingContext {
    pub fn new(channel_id: ChannelId, email: impl Into<String>, snapshot: serde_json::Value) -> Self {
        Self {
            channel_id,
            email: email.into(),
            snapshot,
            created_at: Instant::now(),
        }
    }
}

/// A single-family pending-correlation map, keyed on `K` (usually a plant id
/// or session id string), with a fixed idle ceiling.
pub struct PendingTable<K: Eq + Hash + Clone> {
    entries: Mutex<HashMap<K, PendingContext>>,
    ceiling: Duration,
}

impl<K: Eq + Hash + Clone> PendingTable<K> {
    pub fn new(ceiling: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ceiling,
        }
    }

    pub async fn register(&self, key: K, context: PendingContext) {
        self.entries.lock().await.insert(key, context);
    }

    pub async fn peek(&self, key: &K) -> Option<PendingContext> {
        self.entries.lock().await.get(key).cloned()
    }

    /// Atomically read and remove the correlation for `key`.
    pub async fn complete(&self, key: &K) -> Option<PendingContext> {
        self.entries.lock().await.remove(key)
    }

    /// Reset the liveness clock without otherwise touching the entry — used
    /// by `IRRIGATION_PROGRESS` frames to keep a long-running smart
    /// irrigation session from expiring mid-stream (spec §4.2).
    pub async fn touch(&self, key: &K) {
        if let Some(entry) = self.entries.lock().await.get_mut(key) {
            entry.created_at = Instant::now();
        }
    }

    /// Remove and return every entry older than this table's ceiling. Called
    /// by the Supervisor on its sweep tick (spec §4.7).
    pub async fn sweep_expired(&self) -> Vec<(K, PendingContext)> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let expired_keys: Vec<K> = entries
            .iter()
            .filter(|(_, ctx)| now.duration_since(ctx.created_at) > self.ceiling)
            .map(|(k, _)| k.clone())
            .collect();
        expired_keys
            .into_iter()
            .filter_map(|k| entries.remove(&k).map(|ctx| (k, ctx)))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

/// Irrigation family: correlates both by plant id and, when present, by a
/// session id minted for a single smart-irrigation attempt.
pub struct IrrigationPending {
    by_plant: PendingTable<i64>,
    by_session: PendingTable<String>,
}

impl IrrigationPending {
    pub fn new(ceiling: Duration) -> Self {
        Self {
            by_plant: PendingTable::new(ceiling),
            by_session: PendingTable::new(ceiling),
        }
    }

    pub async fn register_by_plant(&self, plant_id: i64, context: PendingContext) {
        self.by_plant.register(plant_id, context).await;
    }

    pub async fn register_by_session(&self, session_id: String, context: PendingContext) {
        self.by_session.register(session_id, context).await;
    }

    /// Tie-break per spec §4.2: if both a session-id and plant-id
    /// correlation exist, the session-id match wins.
    pub async fn resolve(&self, plant_id: Option<i64>, session_id: Option<&str>) -> Option<PendingContext> {
        if let Some(sid) = session_id {
            if let Some(ctx) = self.by_session.complete(&sid.to_string()).await {
                if let Some(pid) = plant_id {
                    self.by_plant.complete(&pid).await;
                }
                return Some(ctx);
            }
        }
        if let Some(pid) = plant_id {
            return self.by_plant.complete(&pid).await;
        }
        None
    }

    /// Same tie-break as [`resolve`](Self::resolve) but without consuming
    /// the entry — used to route a mid-stream frame to its originator while
    /// keeping the correlation alive for the terminal response.
    pub async fn peek(&self, plant_id: Option<i64>, session_id: Option<&str>) -> Option<PendingContext> {
        if let Some(sid) = session_id {
            if let Some(ctx) = self.by_session.peek(&sid.to_string()).await {
                return Some(ctx);
            }
        }
        if let Some(pid) = plant_id {
            return self.by_plant.peek(&pid).await;
        }
        None
    }

    pub async fn touch_session(&self, session_id: &str) {
        self.by_session.touch(&session_id.to_string()).await;
    }

    pub async fn sweep_expired(&self) -> Vec<PendingContext> {
        let mut expired: Vec<PendingContext> = self
            .by_plant
            .sweep_expired()
            .await
            .into_iter()
            .map(|(_, ctx)| ctx)
            .collect();
        expired.extend(
            self.by_session
                .sweep_expired()
                .await
                .into_iter()
                .map(|(_, ctx)| ctx),
        );
        expired
    }
}

/// Aggregate of every pending-correlation family the broker maintains.
pub struct PendingTables {
    pub irrigation: IrrigationPending,
    pub moisture: PendingTable<i64>,
    pub hardware_assignment: PendingTable<i64>,
    pub update: PendingTable<i64>,
    pub deletion: PendingTable<i64>,
}

impl PendingTables {
    pub fn new(deadlines: &crate::config::PendingDeadlinesConfig) -> Self {
        Self {
            irrigation: IrrigationPending::new(Duration::from_millis(deadlines.irrigation_ms)),
            moisture: PendingTable::new(Duration::from_millis(deadlines.moisture_ms)),
            hardware_assignment: PendingTable::new(Duration::from_millis(
                deadlines.hardware_assignment_ms,
            )),
            update: PendingTable::new(Duration::from_millis(deadlines.update_ms)),
            deletion: PendingTable::new(Duration::from_millis(deadlines.deletion_ms)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> PendingContext {
        PendingContext::new(ChannelId::next(), "u@example.com", serde_json::json!({}))
    }

    #[tokio::test]
    async fn register_peek_complete() {
        let table = PendingTable::new(Duration::from_secs(60));
        table.register(42, ctx()).await;
        assert!(table.peek(&42).await.is_some());
        assert!(table.complete(&42).await.is_some());
        assert!(table.complete(&42).await.is_none());
    }

    #[tokio::test]
    async fn sweep_expired_drops_old_entries_only() {
        let table = PendingTable::new(Duration::from_millis(10));
        table.register(1, ctx()).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        table.register(2, ctx()).await;

        let expired = table.sweep_expired().await;
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].0, 1);
        assert_eq!(table.len().await, 1);
    }

    #[tokio::test]
    async fn touch_resets_liveness() {
        let table = PendingTable::new(Duration::from_millis(30));
        table.register(1, ctx()).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        table.touch(&1).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        // Without the touch this would already have expired (40ms > 30ms).
        assert_eq!(table.sweep_expired().await.len(), 0);
    }

    #[tokio::test]
    async fn irrigation_resolve_prefers_session_over_plant() {
        let pending = IrrigationPending::new(Duration::from_secs(60));
        let plant_ctx = PendingContext::new(ChannelId::next(), "plant@x.com", serde_json::json!({"via": "plant"}));
        let session_ctx = PendingContext::new(ChannelId::next(), "session@x.com", serde_json::json!({"via": "session"}));
        pending.register_by_plant(42, plant_ctx).await;
        pending.register_by_session("s1".into(), session_ctx).await;

        let resolved = pending.resolve(Some(42), Some("s1")).await.unwrap();
        assert_eq!(resolved.snapshot["via"], "session");
        // Both entries consumed.
        assert!(pending.resolve(Some(42), Some("s1")).await.is_none());
    }

    #[tokio::test]
    async fn irrigation_resolve_falls_back_to_plant_when_no_session_match() {
        let pending = IrrigationPending::new(Duration::from_secs(60));
        pending.register_by_plant(42, ctx()).await;
        assert!(pending.resolve(Some(42), Some("missing")).await.is_some());
    }

    #[tokio::test]
    async fn irrigation_resolve_none_when_neither_present() {
        let pending = IrrigationPending::new(Duration::from_secs(60));
        assert!(pending.resolve(Some(1), None).await.is_none());
    }
}
