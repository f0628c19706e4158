//! Contact-gated message relay.
//!
//! Payloads are ciphertext produced in the browser. The relay never
//! interprets them beyond escaping markup, and never tells the sender what
//! happened to a message, so probing cannot reveal who has whom as a contact.

use crate::directory::DirectoryService;
use crate::relay::events::ServerEvent;
use crate::relay::identity::Identity;
use crate::relay::registry::RoomRegistry;
use std::sync::Arc;
use tracing::{debug, warn};

/// What happened to a relayed payload. Never reported to the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Delivered to this many connections of the recipient.
    Delivered(usize),
    Empty,
    /// Sender is not in the recipient's contact list.
    Denied,
    /// Recipient has no live connection (or is not a valid identity).
    Unreachable,
    DirectoryUnavailable,
}

/// Escape markup-significant characters and strip control characters.
pub fn sanitize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            '{' => out.push_str("&#123;"),
            '}' => out.push_str("&#125;"),
            '\n' => out.push_str("<br>"),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    out
}

pub struct MessageRelay {
    registry: Arc<RoomRegistry>,
    directory: Arc<dyn DirectoryService>,
}

impl MessageRelay {
    pub fn new(registry: Arc<RoomRegistry>, directory: Arc<dyn DirectoryService>) -> Self {
        Self {
            registry,
            directory,
        }
    }

    /// Forward `payload` to `recipient` if `sender` is one of their contacts
    /// and they are online. At most once, no acknowledgement.
    pub async fn relay(&self, sender: &Identity, recipient: &str, payload: &str) -> RelayOutcome {
        // Control characters are stripped, so check what would be delivered
        let message = sanitize(payload);
        if message.is_empty() {
            return RelayOutcome::Empty;
        }
        let Ok(recipient) = Identity::parse(recipient) else {
            debug!("Dropped message from {}: invalid recipient", sender);
            return RelayOutcome::Unreachable;
        };

        match self.directory.is_contact(&recipient, sender).await {
            Ok(true) => {}
            Ok(false) => {
                debug!("Dropped message {} -> {}: not a contact", sender, recipient);
                return RelayOutcome::Denied;
            }
            Err(e) => {
                warn!("Dropped message {} -> {}: {}", sender, recipient, e);
                return RelayOutcome::DirectoryUnavailable;
            }
        }

        let Some(channel) = self.registry.resolve(&recipient) else {
            debug!("Dropped message {} -> {}: recipient offline", sender, recipient);
            return RelayOutcome::Unreachable;
        };
        let reached = channel.deliver(&ServerEvent::Receive {
            message,
            sender: sender.clone(),
        });
        if reached == 0 {
            return RelayOutcome::Unreachable;
        }
        debug!("Relayed {} -> {} ({} connections)", sender, recipient, reached);
        RelayOutcome::Delivered(reached)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::StaticDirectory;
    use crate::relay::channel::ChannelSecret;
    use crate::relay::registry::ConnectionId;
    use tokio::sync::mpsc;

    fn id(name: &str) -> Identity {
        Identity::parse(name).unwrap()
    }

    fn setup() -> (Arc<RoomRegistry>, Arc<StaticDirectory>, MessageRelay) {
        let registry = Arc::new(RoomRegistry::new(ChannelSecret::new(b"relay".to_vec())));
        let directory = Arc::new(StaticDirectory::new());
        let relay = MessageRelay::new(registry.clone(), directory.clone());
        (registry, directory, relay)
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(
            sanitize("<b>\"hi\" 'x' {y}</b>\nnext"),
            "&lt;b&gt;&quot;hi&quot; &#039;x&#039; &#123;y&#125;&lt;/b&gt;<br>next"
        );
        assert_eq!(sanitize("a\u{7}b\u{1b}[2Jc\r"), "ab[2Jc");
        assert_eq!(sanitize("U2FsdGVkX1+/abc=="), "U2FsdGVkX1+/abc==");
    }

    #[tokio::test]
    async fn test_delivers_when_sender_is_contact() {
        let (registry, directory, relay) = setup();
        let (alice, bobby) = (id("alice"), id("bobby"));
        // Only bobby has alice; the reverse edge is not needed.
        directory.add_edge(&bobby, &alice);
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.join(&bobby, ConnectionId::next(), tx);

        let outcome = relay.relay(&alice, "bobby", "ciphertext").await;
        assert_eq!(outcome, RelayOutcome::Delivered(1));
        assert_eq!(
            rx.try_recv().unwrap(),
            ServerEvent::Receive {
                message: "ciphertext".into(),
                sender: alice
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_denied_without_contact_edge() {
        let (registry, directory, relay) = setup();
        let (alice, bobby) = (id("alice"), id("bobby"));
        directory.add_edge(&alice, &bobby);
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.join(&bobby, ConnectionId::next(), tx);

        for payload in ["hello", "<script>", "x"] {
            assert_eq!(relay.relay(&alice, "bobby", payload).await, RelayOutcome::Denied);
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unreachable_and_empty() {
        let (_registry, directory, relay) = setup();
        let (alice, bobby) = (id("alice"), id("bobby"));
        directory.add_edge(&bobby, &alice);

        assert_eq!(relay.relay(&alice, "bobby", "hi").await, RelayOutcome::Unreachable);
        assert_eq!(relay.relay(&alice, "bobby", "").await, RelayOutcome::Empty);
        assert_eq!(relay.relay(&alice, "b", "hi").await, RelayOutcome::Unreachable);
    }

    #[tokio::test]
    async fn test_control_only_payload_is_empty() {
        let (registry, directory, relay) = setup();
        let (alice, bobby) = (id("alice"), id("bobby"));
        directory.add_edge(&bobby, &alice);
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.join(&bobby, ConnectionId::next(), tx);

        assert_eq!(relay.relay(&alice, "bobby", "\u{7}").await, RelayOutcome::Empty);
        assert_eq!(relay.relay(&alice, "bobby", "\r\u{0}\t").await, RelayOutcome::Empty);
        assert!(rx.try_recv().is_err());

        // A lone newline still carries a visible line break
        assert_eq!(relay.relay(&alice, "bobby", "\n").await, RelayOutcome::Delivered(1));
    }

    #[tokio::test]
    async fn test_reaches_every_device_of_recipient() {
        let (registry, directory, relay) = setup();
        let (alice, bobby) = (id("alice"), id("bobby"));
        directory.add_edge(&bobby, &alice);
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        registry.join(&bobby, ConnectionId::next(), tx1);
        registry.join(&bobby, ConnectionId::next(), tx2);

        assert_eq!(relay.relay(&alice, "bobby", "m").await, RelayOutcome::Delivered(2));
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }
}
