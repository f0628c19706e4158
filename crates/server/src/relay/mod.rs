//! Presence-aware relay
//!
//! [`RelayHub`] is built once at startup and shared by every connection. It
//! owns the room registry and key store and routes client events to the
//! presence broadcaster and message relay.

pub mod binder;
pub mod channel;
pub mod events;
pub mod identity;
pub mod keys;
pub mod message;
pub mod presence;
pub mod registry;

use crate::directory::DirectoryService;
use binder::{Binding, IdentityBinder, SessionContext};
use channel::ChannelSecret;
use events::{ClientEvent, ServerEvent};
use identity::Identity;
use keys::{KeyError, KeyStore};
use message::MessageRelay;
use presence::PresenceBroadcaster;
use registry::{Arrival, ConnectionId, Departure, Outbound, RoomRegistry};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// A connection that passed identity binding and joined its channel.
#[derive(Clone)]
pub struct Session {
    pub identity: Identity,
    pub id: ConnectionId,
    pub outbound: Outbound,
    pub arrival: Arrival,
}

pub struct RelayHub {
    binder: IdentityBinder,
    registry: Arc<RoomRegistry>,
    keys: Arc<KeyStore>,
    presence: PresenceBroadcaster,
    relay: MessageRelay,
}

impl RelayHub {
    pub fn new(
        secret: ChannelSecret,
        directory: Arc<dyn DirectoryService>,
        binder: IdentityBinder,
        max_key_bytes: usize,
    ) -> Self {
        let registry = Arc::new(RoomRegistry::new(secret));
        let keys = Arc::new(KeyStore::new(max_key_bytes));
        Self {
            binder,
            presence: PresenceBroadcaster::new(registry.clone(), keys.clone(), directory.clone()),
            relay: MessageRelay::new(registry.clone(), directory),
            registry,
            keys,
        }
    }

    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    pub fn keys(&self) -> &KeyStore {
        &self.keys
    }

    pub fn presence(&self) -> &PresenceBroadcaster {
        &self.presence
    }

    pub fn relay(&self) -> &MessageRelay {
        &self.relay
    }

    /// Publish `identity`'s public key. Only accepted while the identity has
    /// a live connection.
    pub fn publish_key(&self, identity: &Identity, key: &str) -> Result<bool, KeyError> {
        self.keys.publish(identity, key, &self.registry)
    }

    /// Bind a new connection and join it to its channel.
    ///
    /// Returns `None` for unauthenticated connections; `outbound` has then
    /// received exactly one [`ServerEvent::Expired`] and the caller must close
    /// the transport.
    pub async fn connect(&self, context: &SessionContext, outbound: Outbound) -> Option<Session> {
        match self.binder.bind(context).await {
            Binding::Bound(identity) => Some(self.attach(identity, outbound)),
            Binding::Unauthenticated => {
                info!("Unauthenticated connection, sending expired");
                let _ = outbound.send(ServerEvent::Expired);
                None
            }
        }
    }

    /// Join an already-bound identity.
    pub fn attach(&self, identity: Identity, outbound: Outbound) -> Session {
        let id = ConnectionId::next();
        let arrival = self.registry.join(&identity, id, outbound.clone());
        info!("{} connected as {} ({:?})", id, identity, arrival);
        Session {
            identity,
            id,
            outbound,
            arrival,
        }
    }

    /// Process one client event to completion.
    pub async fn handle(&self, session: &Session, event: ClientEvent) {
        match event {
            ClientEvent::Loaded => {
                if !self.registry.claim_announcement(&session.identity) {
                    debug!("{} already announced, ignoring loaded from {}", session.identity, session.id);
                    return;
                }
                if let Err(e) = self.presence.announce_online(&session.identity).await {
                    warn!("Online broadcast for {} abandoned: {}", session.identity, e);
                }
            }
            ClientEvent::Send { message, recipient } => {
                let outcome = self
                    .relay
                    .relay(&session.identity, &recipient, &message)
                    .await;
                debug!("{} send -> {}: {:?}", session.id, recipient, outcome);
            }
            ClientEvent::Check => {
                if let Err(e) = self
                    .presence
                    .snapshot(&session.identity, &session.outbound)
                    .await
                {
                    warn!("Presence check for {} abandoned: {}", session.identity, e);
                }
            }
        }
    }

    /// Handle a connection's events in arrival order until its queue closes.
    pub async fn dispatch(self: Arc<Self>, session: Session, mut events: mpsc::UnboundedReceiver<ClientEvent>) {
        while let Some(event) = events.recv().await {
            self.handle(&session, event).await;
        }
    }

    /// Remove the connection from its channel; the last one out triggers
    /// key revocation and the offline broadcast.
    pub async fn disconnect(&self, session: &Session) -> Departure {
        let departure = self.registry.leave(&session.identity, session.id);
        info!("{} ({}) disconnected: {:?}", session.id, session.identity, departure);
        if departure == Departure::Last {
            if let Err(e) = self.presence.announce_offline(&session.identity).await {
                warn!("Offline broadcast for {} abandoned: {}", session.identity, e);
            }
        }
        departure
    }
}
