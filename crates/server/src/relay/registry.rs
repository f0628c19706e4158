//! Room registry: identity -> personal channel, alive while it has members.

use crate::relay::channel::{channel_name, ChannelName, ChannelSecret};
use crate::relay::events::ServerEvent;
use crate::relay::identity::Identity;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Outbound queue of a single connection, drained by its writer task.
pub type Outbound = mpsc::UnboundedSender<ServerEvent>;

/// Process-unique connection identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Result of [`RoomRegistry::join`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    /// The channel was created by this join (0 -> 1 members).
    First,
    /// The channel already had members.
    Additional,
}

/// Result of [`RoomRegistry::leave`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Departure {
    /// Membership reached zero and the channel is gone.
    Last,
    Remaining(usize),
    /// The connection was not a member.
    NotMember,
}

struct Channel {
    members: HashMap<ConnectionId, Outbound>,
    /// Contacts have been told about this channel incarnation.
    announced: bool,
}

/// Membership of a channel at the moment it was resolved.
#[derive(Clone)]
pub struct ChannelHandle {
    name: ChannelName,
    members: Vec<Outbound>,
}

impl ChannelHandle {
    pub fn name(&self) -> &ChannelName {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Push `event` to every member. Closed queues are skipped.
    pub fn deliver(&self, event: &ServerEvent) -> usize {
        self.members
            .iter()
            .filter(|tx| tx.send(event.clone()).is_ok())
            .count()
    }
}

/// Maps identities to their personal channels.
///
/// Channels are keyed by their HMAC name; a channel exists exactly as long as
/// at least one connection is a member of it.
pub struct RoomRegistry {
    secret: ChannelSecret,
    channels: Mutex<HashMap<ChannelName, Channel>>,
}

impl RoomRegistry {
    pub fn new(secret: ChannelSecret) -> Self {
        Self {
            secret,
            channels: Mutex::new(HashMap::new()),
        }
    }

    pub fn channel_name(&self, identity: &Identity) -> ChannelName {
        channel_name(&self.secret, identity)
    }

    /// Add `connection` to the identity's channel, creating it if needed.
    ///
    /// Joining twice with the same connection replaces its queue and is never
    /// reported as [`Arrival::First`].
    pub fn join(&self, identity: &Identity, connection: ConnectionId, outbound: Outbound) -> Arrival {
        let name = self.channel_name(identity);
        let mut channels = self.channels.lock();
        match channels.get_mut(&name) {
            Some(channel) => {
                channel.members.insert(connection, outbound);
                debug!(
                    "{} joined channel of {} ({} members)",
                    connection,
                    identity,
                    channel.members.len()
                );
                Arrival::Additional
            }
            None => {
                let mut members = HashMap::new();
                members.insert(connection, outbound);
                channels.insert(
                    name.clone(),
                    Channel {
                        members,
                        announced: false,
                    },
                );
                info!("Channel created for {}: {}", identity, name);
                Arrival::First
            }
        }
    }

    /// Remove `connection` from the identity's channel.
    pub fn leave(&self, identity: &Identity, connection: ConnectionId) -> Departure {
        let name = self.channel_name(identity);
        let mut channels = self.channels.lock();
        let Some(channel) = channels.get_mut(&name) else {
            return Departure::NotMember;
        };
        if channel.members.remove(&connection).is_none() {
            return Departure::NotMember;
        }
        if channel.members.is_empty() {
            channels.remove(&name);
            info!("Channel removed for {}", identity);
            Departure::Last
        } else {
            Departure::Remaining(channel.members.len())
        }
    }

    /// The identity's channel, or `None` when it has no connections.
    pub fn resolve(&self, identity: &Identity) -> Option<ChannelHandle> {
        let name = self.channel_name(identity);
        let channels = self.channels.lock();
        channels.get(&name).map(|channel| ChannelHandle {
            name: name.clone(),
            members: channel.members.values().cloned().collect(),
        })
    }

    /// Deliver to every connection of `identity`. Returns connections reached.
    pub fn deliver(&self, identity: &Identity, event: &ServerEvent) -> usize {
        self.resolve(identity)
            .map(|channel| channel.deliver(event))
            .unwrap_or(0)
    }

    /// Deliver to `recipient` only while `subject` has no channel.
    ///
    /// Both lookups happen under the registry lock, so a later join by
    /// `subject` (and anything it announces) is ordered after this event.
    pub fn deliver_while_offline(&self, recipient: &Identity, subject: &Identity, event: &ServerEvent) -> usize {
        let recipient_name = self.channel_name(recipient);
        let subject_name = self.channel_name(subject);
        let channels = self.channels.lock();
        if channels.contains_key(&subject_name) {
            return 0;
        }
        channels
            .get(&recipient_name)
            .map(|channel| {
                channel
                    .members
                    .values()
                    .filter(|tx| tx.send(event.clone()).is_ok())
                    .count()
            })
            .unwrap_or(0)
    }

    /// Mark the identity's channel as announced to contacts.
    ///
    /// Returns `true` only for the first caller since the channel was
    /// created, so extra devices signalling readiness stay silent.
    pub fn claim_announcement(&self, identity: &Identity) -> bool {
        let name = self.channel_name(identity);
        let mut channels = self.channels.lock();
        match channels.get_mut(&name) {
            Some(channel) if !channel.announced => {
                channel.announced = true;
                true
            }
            _ => false,
        }
    }

    pub fn is_online(&self, identity: &Identity) -> bool {
        let name = self.channel_name(identity);
        self.channels.lock().contains_key(&name)
    }

    /// Number of identities with at least one connection
    pub fn online_count(&self) -> usize {
        self.channels.lock().len()
    }
}
