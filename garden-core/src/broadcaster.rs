//! Garden Broadcaster (spec §4.3) — fans a single JSON frame out to every
//! member of a garden, optionally skipping one initiating channel.
//!
//! Membership resolution is left to the caller (it requires a database
//! round trip); the broadcaster's job starts once it has the list of
//! member emails. It serializes the payload once and reuses the `Value`
//! for every send, matching the teacher's `queue::GroupQueue::broadcast`
//! shape of "resolve recipients, then best-effort write to each".

use serde_json::Value;
use tracing::debug;

use crate::channel::ChannelId;
use crate::registry::SessionRegistry;

pub struct GardenBroadcaster<'a> {
    registry: &'a SessionRegistry,
}

impl<'a> GardenBroadcaster<'a> {
    pub fn new(registry: &'a SessionRegistry) -> Self {
        Self { registry }
    }

    /// Send `frame` to every member in `member_emails`, skipping
    /// `exclude_channel` if given (the initiator of the action that
    /// triggered this broadcast, per spec §4.3).
    ///
    /// Delivery is best-effort: a member with no open channel, or whose
    /// send fails because its writer task already exited, is silently
    /// skipped. Returns the number of channels the frame was actually
    /// queued on.
    pub async fn broadcast(
        &self,
        member_emails: &[String],
        frame: Value,
        exclude_channel: Option<ChannelId>,
    ) -> usize {
        let mut sent = 0;
        for email in member_emails {
            let Some(channel) = self.registry.channel_by_email(email).await else {
                continue;
            };
            if exclude_channel == Some(channel.id()) {
                continue;
            }
            if channel.send(frame.clone()) {
                sent += 1;
            } else {
                debug!(email = %email, "broadcast send failed, channel already closing");
            }
        }
        sent
    }

    /// Send `frame` to the one controller bound to `garden_id`, if any.
    /// Returns whether delivery was attempted successfully.
    pub async fn send_to_controller(&self, garden_id: crate::domain::GardenId, frame: Value) -> bool {
        match self.registry.controller_by_garden(garden_id).await {
            Some(channel) => channel.send(frame),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelHandle;
    use tokio::sync::mpsc;

    fn handle() -> (ChannelHandle, mpsc::UnboundedReceiver<crate::channel::OutgoingMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChannelHandle::new(ChannelId::next(), tx), rx)
    }

    #[tokio::test]
    async fn broadcast_skips_missing_and_excluded_channels() {
        let registry = SessionRegistry::new();
        let (h1, mut rx1) = handle();
        let (h2, mut rx2) = handle();
        registry.attach_client(h1.clone(), "a@x.com").await;
        registry.attach_client(h2.clone(), "b@x.com").await;

        let broadcaster = GardenBroadcaster::new(&registry);
        let sent = broadcaster
            .broadcast(
                &["a@x.com".into(), "b@x.com".into(), "c@x.com".into()],
                serde_json::json!({"type": "PLANT_UPDATED"}),
                Some(h1.id()),
            )
            .await;

        assert_eq!(sent, 1);
        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn send_to_controller_reports_false_when_unbound() {
        let registry = SessionRegistry::new();
        let broadcaster = GardenBroadcaster::new(&registry);
        assert!(!broadcaster
            .send_to_controller(1, serde_json::json!({"type": "IRRIGATE_PLANT"}))
            .await);
    }
}
