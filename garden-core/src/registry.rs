//! Session Registry (spec §4.1) — maps client identities (email) to open
//! channels, and garden-id to the one bound controller channel.
//!
//! Modeled after the teacher's per-key-state-behind-a-mutex shape
//! (`queue::GroupQueue`'s `Inner`): one `Mutex<HashMap<_, _>>` per direction
//! of each mapping, so readers (broadcaster fan-out, supervisor sweeps)
//! never block on a single global lock held across network I/O.

use std::collections::HashMap;
use std::time::Instant;

use tokio::sync::Mutex;
use tracing::info;

use crate::channel::{ChannelHandle, ChannelId, CloseReason};
use crate::domain::GardenId;

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

struct ControllerEntry {
    channel: ChannelHandle,
    last_seen: Instant,
}

/// Maps client emails and controller gardens to their open channels.
pub struct SessionRegistry {
    clients_by_email: Mutex<HashMap<String, ChannelHandle>>,
    email_by_channel: Mutex<HashMap<ChannelId, String>>,
    controllers_by_garden: Mutex<HashMap<GardenId, ControllerEntry>>,
    garden_by_channel: Mutex<HashMap<ChannelId, GardenId>>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            clients_by_email: Mutex::new(HashMap::new()),
            email_by_channel: Mutex::new(HashMap::new()),
            controllers_by_garden: Mutex::new(HashMap::new()),
            garden_by_channel: Mutex::new(HashMap::new()),
        }
    }

    /// Attach a client channel to an email. If a channel is already bound to
    /// this email, it is replaced and closed with [`CloseReason::Replaced`].
    pub async fn attach_client(&self, channel: ChannelHandle, email: &str) {
        let email = normalize_email(email);
        let mut by_email = self.clients_by_email.lock().await;
        let mut by_channel = self.email_by_channel.lock().await;

        if let Some(old) = by_email.insert(email.clone(), channel.clone()) {
            if old.id() != channel.id() {
                old.close(CloseReason::Replaced);
                by_channel.remove(&old.id());
                info!(email = %email, "replaced existing client channel");
            }
        }
        by_channel.insert(channel.id(), email);
    }

    /// Idempotent detach of a client channel, regardless of which side
    /// (client close, error, replacement) triggered it.
    pub async fn detach_client(&self, channel_id: ChannelId) {
        let mut by_channel = self.email_by_channel.lock().await;
        if let Some(email) = by_channel.remove(&channel_id) {
            let mut by_email = self.clients_by_email.lock().await;
            // Only remove the email entry if it still points at this channel
            // (a newer channel may already have replaced it).
            if by_email
                .get(&email)
                .is_some_and(|c| c.id() == channel_id)
            {
                by_email.remove(&email);
            }
        }
    }

    pub async fn channel_by_email(&self, email: &str) -> Option<ChannelHandle> {
        let email = normalize_email(email);
        let by_email = self.clients_by_email.lock().await;
        by_email.get(&email).filter(|c| c.is_open()).cloned()
    }

    pub async fn email_by_channel(&self, channel_id: ChannelId) -> Option<String> {
        self.email_by_channel.lock().await.get(&channel_id).cloned()
    }

    /// Bind a controller channel to a garden. If a different controller was
    /// previously bound, it is closed with [`CloseReason::Replaced`] first
    /// (spec §4.1 — at most one OPEN controller per garden).
    pub async fn bind_controller(&self, garden_id: GardenId, channel: ChannelHandle) {
        let mut by_garden = self.controllers_by_garden.lock().await;
        let mut by_channel = self.garden_by_channel.lock().await;

        if let Some(old) = by_garden.insert(
            garden_id,
            ControllerEntry {
                channel: channel.clone(),
                last_seen: Instant::now(),
            },
        ) {
            if old.channel.id() != channel.id() {
                old.channel.close(CloseReason::Replaced);
                by_channel.remove(&old.channel.id());
                info!(garden_id, "replaced existing controller channel");
            }
        }
        by_channel.insert(channel.id(), garden_id);
    }

    /// Returns the bound controller channel only if it is still open.
    pub async fn controller_by_garden(&self, garden_id: GardenId) -> Option<ChannelHandle> {
        let by_garden = self.controllers_by_garden.lock().await;
        by_garden
            .get(&garden_id)
            .filter(|e| e.channel.is_open())
            .map(|e| e.channel.clone())
    }

    /// The garden a controller channel is bound to, if any.
    pub async fn garden_by_channel(&self, channel_id: ChannelId) -> Option<GardenId> {
        self.garden_by_channel.lock().await.get(&channel_id).copied()
    }

    pub async fn heartbeat(&self, garden_id: GardenId) {
        let mut by_garden = self.controllers_by_garden.lock().await;
        if let Some(entry) = by_garden.get_mut(&garden_id) {
            entry.last_seen = Instant::now();
        }
    }

    pub async fn unbind_controller(&self, channel_id: ChannelId) {
        let mut by_channel = self.garden_by_channel.lock().await;
        if let Some(garden_id) = by_channel.remove(&channel_id) {
            let mut by_garden = self.controllers_by_garden.lock().await;
            if by_garden
                .get(&garden_id)
                .is_some_and(|e| e.channel.id() == channel_id)
            {
                by_garden.remove(&garden_id);
            }
        }
    }

    /// Controllers whose `last_seen` exceeds `threshold`, for the Supervisor's
    /// optional stale-controller eviction (spec §4.7, off by default).
    pub async fn stale_controllers(&self, threshold: std::time::Duration) -> Vec<(GardenId, ChannelHandle)> {
        let by_garden = self.controllers_by_garden.lock().await;
        let now = Instant::now();
        by_garden
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.last_seen) > threshold)
            .map(|(garden_id, entry)| (*garden_id, entry.channel.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> (ChannelHandle, tokio::sync::mpsc::UnboundedReceiver<crate::channel::OutgoingMessage>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (ChannelHandle::new(ChannelId::next(), tx), rx)
    }

    #[tokio::test]
    async fn attach_and_lookup_roundtrip() {
        let registry = SessionRegistry::new();
        let (h, _rx) = handle();
        registry.attach_client(h.clone(), "User@Example.com").await;

        let found = registry.channel_by_email("user@example.com").await;
        assert_eq!(found.unwrap().id(), h.id());
        assert_eq!(
            registry.email_by_channel(h.id()).await.unwrap(),
            "user@example.com"
        );
    }

    #[tokio::test]
    async fn attach_replaces_existing_channel_for_same_email() {
        let registry = SessionRegistry::new();
        let (h1, mut rx1) = handle();
        let (h2, _rx2) = handle();

        registry.attach_client(h1.clone(), "a@b.com").await;
        registry.attach_client(h2.clone(), "a@b.com").await;

        let found = registry.channel_by_email("a@b.com").await.unwrap();
        assert_eq!(found.id(), h2.id());
        // Old channel should have a replacement close queued.
        let msg = rx1.try_recv().unwrap();
        matches!(msg, crate::channel::OutgoingMessage::Close(CloseReason::Replaced));
        assert!(registry.email_by_channel(h1.id()).await.is_none());
    }

    #[tokio::test]
    async fn detach_is_idempotent() {
        let registry = SessionRegistry::new();
        let (h, _rx) = handle();
        registry.attach_client(h.clone(), "a@b.com").await;
        registry.detach_client(h.id()).await;
        registry.detach_client(h.id()).await;
        assert!(registry.channel_by_email("a@b.com").await.is_none());
    }

    #[tokio::test]
    async fn bind_controller_replaces_previous_for_same_garden() {
        let registry = SessionRegistry::new();
        let (h1, mut rx1) = handle();
        let (h2, _rx2) = handle();

        registry.bind_controller(1, h1.clone()).await;
        registry.bind_controller(1, h2.clone()).await;

        let found = registry.controller_by_garden(1).await.unwrap();
        assert_eq!(found.id(), h2.id());
        assert!(rx1.try_recv().is_ok());
    }

    #[tokio::test]
    async fn controller_by_garden_ignores_closed_channel() {
        let registry = SessionRegistry::new();
        let (h, rx) = handle();
        registry.bind_controller(7, h.clone()).await;
        drop(rx);
        assert!(registry.controller_by_garden(7).await.is_none());
    }

    #[tokio::test]
    async fn unbind_controller_by_channel_metadata() {
        let registry = SessionRegistry::new();
        let (h, _rx) = handle();
        registry.bind_controller(3, h.clone()).await;
        registry.unbind_controller(h.id()).await;
        assert!(registry.controller_by_garden(3).await.is_none());
    }

    #[tokio::test]
    async fn garden_by_channel_reports_bound_garden() {
        let registry = SessionRegistry::new();
        let (h, _rx) = handle();
        registry.bind_controller(5, h.clone()).await;
        assert_eq!(registry.garden_by_channel(h.id()).await, Some(5));
        registry.unbind_controller(h.id()).await;
        assert_eq!(registry.garden_by_channel(h.id()).await, None);
    }

    #[tokio::test]
    async fn stale_controllers_reports_past_threshold() {
        let registry = SessionRegistry::new();
        let (h, _rx) = handle();
        registry.bind_controller(9, h).await;
        let stale = registry.stale_controllers(std::time::Duration::from_secs(0)).await;
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].0, 9);
    }
}
