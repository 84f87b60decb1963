/**
 * Credential records and key derivation for STUN authentication.
 * See RFC 8489 Sections 9.1 and 9.2 for details
 * https://datatracker.ietf.org/doc/html/rfc8489#section-9
 */
use md5::{Digest, Md5};

/**
 * Which authentication branch the server runs for incoming requests.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum AuthenticationType {
    #[default]
    None,
    ShortTerm,
    LongTerm,
}

/**
 * A registered credential. Owned by the server's user registry; callers keep
 * their own copies.
 *
 * Passwords pass through the OpaqueString profile before use. This
 * implementation restricts credentials to ASCII, for which the profile is the
 * identity mapping.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Credential {
    None,
    ShortTerm {
        password: String,
    },
    LongTerm {
        username: String,
        realm: String,
        password: String,
    },
}

impl Credential {
    /**
     * Size in bytes of the key `write_key` produces for this record.
     */
    pub fn key_len(&self) -> usize {
        match self {
            Credential::None => 0,
            Credential::ShortTerm { password } => password.len(),
            Credential::LongTerm { .. } => 16,
        }
    }

    /**
     * Derive the HMAC key into a caller-provided buffer.
     *
     * @param buffer Destination, at least `key_len` bytes
     * @return The number of bytes written
     */
    pub fn write_key(&self, buffer: &mut [u8]) -> usize {
        match self {
            Credential::None => 0,
            Credential::ShortTerm { password } => {
                buffer[..password.len()].copy_from_slice(password.as_bytes());
                password.len()
            }
            Credential::LongTerm {
                username,
                realm,
                password,
            } => {
                let mut hasher = Md5::new();
                hasher.update(username.as_bytes());
                hasher.update(b":");
                hasher.update(realm.as_bytes());
                hasher.update(b":");
                hasher.update(password.as_bytes());
                buffer[..16].copy_from_slice(&hasher.finalize());
                16
            }
        }
    }

    /**
     * Derive the HMAC key as an owned buffer of exactly `key_len` bytes.
     * A pure function of the record: the same credential always yields the
     * same key.
     */
    pub fn compute_key(&self) -> Vec<u8> {
        let mut key = vec![0u8; self.key_len()];
        self.write_key(&mut key);
        key
    }
}
