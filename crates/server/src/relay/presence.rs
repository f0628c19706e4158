//! Presence fan-out
//!
//! Online state is never stored: an identity is online exactly when its
//! channel exists in the [`RoomRegistry`]. This module only tells contacts
//! about transitions.

use crate::directory::{DirectoryError, DirectoryService};
use crate::relay::events::ServerEvent;
use crate::relay::identity::Identity;
use crate::relay::keys::KeyStore;
use crate::relay::registry::{Outbound, RoomRegistry};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// How many contacts an announcement concerned and how many were reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Fanout {
    pub contacts: usize,
    pub delivered: usize,
}

pub struct PresenceBroadcaster {
    registry: Arc<RoomRegistry>,
    keys: Arc<KeyStore>,
    directory: Arc<dyn DirectoryService>,
}

impl PresenceBroadcaster {
    pub fn new(
        registry: Arc<RoomRegistry>,
        keys: Arc<KeyStore>,
        directory: Arc<dyn DirectoryService>,
    ) -> Self {
        Self {
            registry,
            keys,
            directory,
        }
    }

    /// Send `online(identity)` once to every connected contact.
    pub async fn announce_online(&self, identity: &Identity) -> Result<Fanout, DirectoryError> {
        let contacts = self.contacts_of(identity).await?;
        let fanout = self
            .fan_out(
                contacts,
                ServerEvent::Online {
                    username: identity.clone(),
                },
            )
            .await;
        info!(
            "{} online, notified {}/{} contacts",
            identity, fanout.delivered, fanout.contacts
        );
        Ok(fanout)
    }

    /// Revoke the identity's public key and send `offline(identity)` to
    /// every connected contact.
    ///
    /// Contacts are skipped once the identity has reconnected.
    pub async fn announce_offline(&self, identity: &Identity) -> Result<Fanout, DirectoryError> {
        self.keys.revoke_if_offline(identity, &self.registry);

        let contacts = self.contacts_of(identity).await?;
        let fanout = self
            .fan_out(
                contacts,
                ServerEvent::Offline {
                    username: identity.clone(),
                },
            )
            .await;
        info!(
            "{} offline, notified {}/{} contacts",
            identity, fanout.delivered, fanout.contacts
        );
        Ok(fanout)
    }

    /// Tell `reply` (the asking connection only) which contacts are online.
    pub async fn snapshot(&self, requester: &Identity, reply: &Outbound) -> Result<Fanout, DirectoryError> {
        let contacts = self.contacts_of(requester).await?;
        let mut fanout = Fanout {
            contacts: contacts.len(),
            delivered: 0,
        };
        for contact in contacts {
            if self.registry.is_online(&contact)
                && reply.send(ServerEvent::Online { username: contact }).is_ok()
            {
                fanout.delivered += 1;
            }
        }
        debug!(
            "Presence snapshot for {}: {}/{} online",
            requester, fanout.delivered, fanout.contacts
        );
        Ok(fanout)
    }

    async fn contacts_of(&self, identity: &Identity) -> Result<HashSet<Identity>, DirectoryError> {
        let mut contacts = self.directory.lookup_contacts(identity).await?;
        contacts.remove(identity);
        Ok(contacts)
    }

    /// One delivery task per contact; completion order is irrelevant.
    ///
    /// An `offline` is dropped at delivery time if its subject has rejoined,
    /// so contacts never see it after the fresh `online`.
    async fn fan_out(&self, contacts: HashSet<Identity>, event: ServerEvent) -> Fanout {
        let total = contacts.len();
        let mut deliveries = JoinSet::new();
        for contact in contacts {
            let registry = self.registry.clone();
            let event = event.clone();
            deliveries.spawn(async move {
                let reached = match &event {
                    ServerEvent::Offline { username } => {
                        registry.deliver_while_offline(&contact, username, &event)
                    }
                    _ => registry.deliver(&contact, &event),
                };
                reached > 0
            });
        }

        let mut delivered = 0;
        while let Some(result) = deliveries.join_next().await {
            match result {
                Ok(true) => delivered += 1,
                Ok(false) => {}
                Err(e) => warn!("Presence delivery task failed: {}", e),
            }
        }
        Fanout {
            contacts: total,
            delivered,
        }
    }
}
