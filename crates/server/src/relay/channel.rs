//! Deterministic channel naming.
//!
//! A channel name is `HMAC-SHA256(secret, username)` rendered as lowercase
//! hex. Without the process secret a client cannot derive another user's
//! channel, and the same user always lands on the same channel.

use crate::relay::identity::Identity;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

/// Process-wide key for channel naming.
#[derive(Clone)]
pub struct ChannelSecret(Vec<u8>);

impl ChannelSecret {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Fresh 32 random bytes. Names are then only stable for this process.
    pub fn random() -> Self {
        use rand::RngCore;
        let mut bytes = vec![0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for ChannelSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ChannelSecret(..)")
    }
}

/// Name of an identity's personal channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelName(String);

impl ChannelName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Channel name for `identity` under `secret`.
pub fn channel_name(secret: &ChannelSecret, identity: &Identity) -> ChannelName {
    // HMAC accepts keys of any length, so this cannot fail.
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC-SHA256 takes any key length"));
    mac.update(identity.as_str().as_bytes());
    ChannelName(hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(name: &str) -> Identity {
        Identity::parse(name).unwrap()
    }

    #[test]
    fn test_name_is_stable() {
        let secret = ChannelSecret::new(b"server-secret".to_vec());
        let a = channel_name(&secret, &id("alice"));
        let b = channel_name(&secret, &id("alice"));
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_distinct_identities_distinct_names() {
        let secret = ChannelSecret::new(b"server-secret".to_vec());
        assert_ne!(
            channel_name(&secret, &id("alice")),
            channel_name(&secret, &id("alicf"))
        );
    }

    #[test]
    fn test_name_depends_on_secret() {
        let alice = id("alice");
        assert_ne!(
            channel_name(&ChannelSecret::new(b"one".to_vec()), &alice),
            channel_name(&ChannelSecret::new(b"two".to_vec()), &alice)
        );
    }

    #[test]
    fn test_matches_reference_hmac() {
        let secret = ChannelSecret::new(b"Jefe".to_vec());
        let name = channel_name(&secret, &id("what_do_ya_want"));
        let mut mac = <HmacSha256 as Mac>::new_from_slice(b"Jefe").unwrap();
        mac.update(b"what_do_ya_want");
        assert_eq!(name.as_str(), hex::encode(mac.finalize().into_bytes()));
    }

    #[test]
    fn test_debug_hides_secret() {
        let secret = ChannelSecret::new(b"hunter2".to_vec());
        assert!(!format!("{:?}", secret).contains("hunter2"));
    }
}
