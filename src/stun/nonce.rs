/**
 * Per-client nonce minting, encoding and validation for long-term
 * authentication.
 *
 * A nonce is 29 bytes on the wire: a 9-byte cookie literal, 4 base64
 * characters carrying a 3-byte security-feature record, then the id and the
 * validity deadline as little-endian u64 values (microseconds since the Unix
 * epoch).
 */
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

/// fixed prefix distinguishing our nonces from foreign ones
pub(crate) const NONCE_COOKIE: &[u8; 9] = b"stunward:";

/// full encoded nonce length: cookie + features + id + validity
pub(crate) const NONCE_LENGTH: usize = 29;

/// how long a freshly minted nonce stays valid
const NONCE_VALIDITY_MICROS: u64 = 60_000_000;

#[derive(Error, Debug)]
pub(crate) enum NonceError {
    #[error("nonce is too short")]
    InvalidNonce,
    #[error("nonce does not start with the expected cookie")]
    InvalidCookieStart,
}

/**
 * The security-feature record: 3 bytes, bit 23 flags password-algorithms
 * support, bit 22 username anonymity, the rest reserved zero.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct SecurityFeatures {
    pub password_algorithms: bool,
    pub username_anonymity: bool,
}

impl SecurityFeatures {
    fn to_bytes(self) -> [u8; 3] {
        let mut bytes = [0u8; 3];
        if self.password_algorithms {
            bytes[0] |= 0x80;
        }
        if self.username_anonymity {
            bytes[0] |= 0x40;
        }
        bytes
    }

    fn from_bytes(bytes: [u8; 3]) -> Self {
        SecurityFeatures {
            password_algorithms: bytes[0] & 0x80 != 0,
            username_anonymity: bytes[0] & 0x40 != 0,
        }
    }
}

/**
 * A parsed nonce. `validity` is the expiry deadline in microseconds since the
 * Unix epoch; `id` is reserved and always zero in minted nonces.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Nonce {
    pub id: u64,
    pub validity: u64,
    pub features: SecurityFeatures,
}

impl Nonce {
    /**
     * Encode to the 29-byte wire form.
     */
    pub fn encode(&self) -> [u8; NONCE_LENGTH] {
        let mut bytes = [0u8; NONCE_LENGTH];
        bytes[..9].copy_from_slice(NONCE_COOKIE);
        bytes[9..13].copy_from_slice(base64::encode(self.features.to_bytes()).as_bytes());
        bytes[13..21].copy_from_slice(&self.id.to_le_bytes());
        bytes[21..29].copy_from_slice(&self.validity.to_le_bytes());
        bytes
    }

    /**
     * Parse a nonce from its wire form.
     *
     * @return `InvalidNonce` when shorter than 29 bytes or the feature block
     *         is not base64, `InvalidCookieStart` when the prefix literal
     *         does not match
     */
    pub fn parse(bytes: &[u8]) -> Result<Nonce, NonceError> {
        if bytes.len() < NONCE_LENGTH {
            return Err(NonceError::InvalidNonce);
        }
        if &bytes[..9] != NONCE_COOKIE {
            return Err(NonceError::InvalidCookieStart);
        }
        let feature_bytes: [u8; 3] = base64::decode(&bytes[9..13])
            .map_err(|_| NonceError::InvalidNonce)?
            .try_into()
            .map_err(|_| NonceError::InvalidNonce)?;

        let mut id = [0u8; 8];
        id.copy_from_slice(&bytes[13..21]);
        let mut validity = [0u8; 8];
        validity.copy_from_slice(&bytes[21..29]);

        Ok(Nonce {
            id: u64::from_le_bytes(id),
            validity: u64::from_le_bytes(validity),
            features: SecurityFeatures::from_bytes(feature_bytes),
        })
    }
}

/**
 * Source of wall-clock microseconds. Injected so tests can pin time and the
 * server never reads ambient clocks directly.
 */
pub(crate) trait Clock: Send {
    fn now_micros(&self) -> u64;
}

/**
 * The default clock, reading `SystemTime` against the Unix epoch.
 */
#[derive(Debug, Default)]
pub(crate) struct SystemClock;

impl Clock for SystemClock {
    fn now_micros(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0)
    }
}

/// per-client state, currently just the active nonce
#[derive(Debug, Clone)]
struct ClientData {
    nonce: Nonce,
}

/**
 * Tracks the currently valid nonce per client address. Entries are created on
 * the first response that needs a nonce and replaced only when the stored one
 * expired or its security features no longer match what the response needs.
 */
#[derive(Debug, Default)]
pub(crate) struct NonceManager {
    clients: HashMap<SocketAddr, ClientData>,
}

impl NonceManager {
    pub fn new() -> Self {
        NonceManager::default()
    }

    /**
     * Return the client's current nonce, minting or replacing it as needed.
     *
     * @param source The client's transport address
     * @param features The security features the pending response advertises
     * @param now Current time in microseconds since the Unix epoch
     */
    pub fn get_or_update(
        &mut self,
        source: SocketAddr,
        features: SecurityFeatures,
        now: u64,
    ) -> Nonce {
        match self.clients.get_mut(&source) {
            Some(client) => {
                if now > client.nonce.validity || client.nonce.features != features {
                    client.nonce = Self::mint(features, now);
                }
                client.nonce
            }
            None => {
                let nonce = Self::mint(features, now);
                self.clients.insert(source, ClientData { nonce });
                nonce
            }
        }
    }

    fn mint(features: SecurityFeatures, now: u64) -> Nonce {
        Nonce {
            id: 0,
            validity: now + NONCE_VALIDITY_MICROS,
            features,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(password_algorithms: bool, username_anonymity: bool) -> SecurityFeatures {
        SecurityFeatures {
            password_algorithms,
            username_anonymity,
        }
    }

    #[test]
    fn test_encode_parse_roundtrip() {
        let nonce = Nonce {
            id: 0,
            validity: 1_700_000_123_456_789,
            features: features(true, false),
        };
        let bytes = nonce.encode();
        assert_eq!(bytes.len(), NONCE_LENGTH);
        assert_eq!(Nonce::parse(&bytes).unwrap(), nonce);
    }

    #[test]
    fn test_feature_bits_encoding() {
        assert_eq!(&features(true, false).to_bytes(), &[0x80, 0, 0]);
        assert_eq!(&features(false, true).to_bytes(), &[0x40, 0, 0]);
        assert_eq!(&features(true, true).to_bytes(), &[0xC0, 0, 0]);

        // 3 feature bytes become exactly 4 base64 characters
        let bytes = Nonce {
            id: 0,
            validity: 0,
            features: features(true, false),
        }
        .encode();
        assert_eq!(&bytes[9..13], b"gAAA");
    }

    #[test]
    fn test_parse_too_short() {
        assert!(matches!(
            Nonce::parse(&[0u8; NONCE_LENGTH - 1]),
            Err(NonceError::InvalidNonce)
        ));
    }

    #[test]
    fn test_parse_wrong_cookie() {
        let mut bytes = Nonce {
            id: 0,
            validity: 0,
            features: SecurityFeatures::default(),
        }
        .encode();
        bytes[0] = b'x';
        assert!(matches!(
            Nonce::parse(&bytes),
            Err(NonceError::InvalidCookieStart)
        ));
    }

    #[test]
    fn test_parse_bad_feature_block() {
        let mut bytes = Nonce {
            id: 0,
            validity: 0,
            features: SecurityFeatures::default(),
        }
        .encode();
        bytes[9] = 0xFF;
        assert!(matches!(Nonce::parse(&bytes), Err(NonceError::InvalidNonce)));
    }

    #[test]
    fn test_get_or_update_mints_once() {
        let mut manager = NonceManager::new();
        let source: SocketAddr = "192.0.2.1:1234".parse().unwrap();
        let wanted = features(true, false);

        let first = manager.get_or_update(source, wanted, 1_000);
        assert_eq!(first.id, 0);
        assert_eq!(first.validity, 1_000 + 60_000_000);
        assert_eq!(first.features, wanted);

        // still valid and same features: unchanged
        let second = manager.get_or_update(source, wanted, 2_000);
        assert_eq!(second, first);
    }

    #[test]
    fn test_get_or_update_replaces_expired() {
        let mut manager = NonceManager::new();
        let source: SocketAddr = "192.0.2.1:1234".parse().unwrap();
        let wanted = features(false, false);

        let first = manager.get_or_update(source, wanted, 0);
        let later = first.validity + 1;
        let second = manager.get_or_update(source, wanted, later);
        assert_ne!(second, first);
        assert_eq!(second.validity, later + 60_000_000);
    }

    #[test]
    fn test_get_or_update_replaces_on_feature_change() {
        let mut manager = NonceManager::new();
        let source: SocketAddr = "192.0.2.1:1234".parse().unwrap();

        let first = manager.get_or_update(source, features(false, false), 0);
        let second = manager.get_or_update(source, features(true, false), 1);
        assert_ne!(second.features, first.features);
        assert!(second.features.password_algorithms);
    }

    #[test]
    fn test_clients_are_tracked_independently() {
        let mut manager = NonceManager::new();
        let a: SocketAddr = "192.0.2.1:1234".parse().unwrap();
        let b: SocketAddr = "192.0.2.1:1235".parse().unwrap();
        let wanted = features(true, false);

        let nonce_a = manager.get_or_update(a, wanted, 0);
        let nonce_b = manager.get_or_update(b, features(false, false), 0);
        assert_ne!(nonce_a.features, nonce_b.features);
        assert_eq!(manager.get_or_update(a, wanted, 1), nonce_a);
    }
}
