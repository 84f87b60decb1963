/**
 * The STUN-specific module, this file contains various constant definitions
 */

pub mod attributes;
pub mod auth;
pub mod builder;
pub mod message;
pub mod nonce;
pub mod processor;
pub mod server;

/// length of a STUN header is 20 bytes
pub(crate) const HEADER_LENGTH: u16 = 20;

/// This value is included in STUN messages to help differentiate them from other types of network traffic and to
/// ensure that the messages are processed correctly by STUN servers and clients. The Magic Cookie value is 0x2112A442
pub(crate) const MAGIC_COOKIE: u32 = 0x2112A442;

/// The FINGERPRINT attribute value is the CRC32 of the message prefix XORed with this constant
/// (the ASCII representation of "STUN").
pub(crate) const FINGERPRINT_XOR: u32 = 0x5354554E;

/// Default value of the SOFTWARE attribute added to responses.
pub(crate) const SOFTWARE: &str = concat!("stunward v", env!("CARGO_PKG_VERSION"));

/*
   Comprehension-required range (0x0000-0x7FFF):
     0x0000: (Reserved)
     0x0001: MAPPED-ADDRESS
     0x0006: USERNAME
     0x0008: MESSAGE-INTEGRITY
     0x0009: ERROR-CODE
     0x000A: UNKNOWN-ATTRIBUTES
     0x0014: REALM
     0x0015: NONCE
     0x001C: MESSAGE-INTEGRITY-SHA256
     0x001D: PASSWORD-ALGORITHM
     0x001E: USERHASH
     0x0020: XOR-MAPPED-ADDRESS

   Comprehension-optional range (0x8000-0xFFFF)
     0x8002: PASSWORD-ALGORITHMS
     0x8003: ALTERNATE-DOMAIN
     0x8022: SOFTWARE
     0x8023: ALTERNATE-SERVER
     0x8028: FINGERPRINT
*/

// Attribute Types
#[allow(dead_code)]
pub(crate) mod attribute_type {
    /// This attribute specifies an IP address and port as observed by the server. It represents the
    /// public IP address and port of the STUN client, accessible from the internet.
    pub const ATTR_MAPPED_ADDRESS: u16 = 0x0001;

    /// The USERNAME attribute carries the credential identity used to authenticate the client to the
    /// server. For long-term credentials it names a (username, realm) pair in the server's registry.
    pub const ATTR_USERNAME: u16 = 0x0006;

    /// This attribute contains the HMAC-SHA1 of the STUN message prefix and authenticates both
    /// requests and responses.
    pub const ATTR_MESSAGE_INTEGRITY: u16 = 0x0008;

    /// This attribute is present in error responses only. It contains a numerical error code in the
    /// range 300 to 699 together with a UTF-8 reason phrase intended for the client.
    pub const ATTR_ERROR_CODE: u16 = 0x0009;

    /// This attribute appears in error responses with code 420. It lists the comprehension-required
    /// attributes of the request that the server did not understand.
    pub const ATTR_UNKNOWN_ATTRIBUTES: u16 = 0x000A;

    /// The REALM attribute names the domain within which the long-term username and password are
    /// valid. Its presence in a request signals the wish to use long-term credentials.
    pub const ATTR_REALM: u16 = 0x0014;

    /// The NONCE attribute is a server-issued, time-bounded token that clients echo back during
    /// long-term authentication. It bounds replay of a captured request.
    pub const ATTR_NONCE: u16 = 0x0015;

    /// This attribute contains the HMAC-SHA256 of the STUN message prefix. When both integrity
    /// attributes are present it takes precedence over MESSAGE-INTEGRITY.
    pub const ATTR_MESSAGE_INTEGRITY_SHA256: u16 = 0x001C;

    /// The password algorithm the client selected from the server's PASSWORD-ALGORITHMS offer.
    pub const ATTR_PASSWORD_ALGORITHM: u16 = 0x001D;

    /// This attribute carries SHA-256(username ":" realm) in place of USERNAME for clients that
    /// want username anonymity.
    pub const ATTR_USERHASH: u16 = 0x001E;

    /// This attribute reveals the public IP address and port of the STUN client as observed by the
    /// server, obfuscated by XORing with the magic cookie (and transaction id for IPv6) so that
    /// NATs rewriting literal addresses in payloads do not corrupt it.
    pub const ATTR_XOR_MAPPED_ADDRESS: u16 = 0x0020;

    /// The list of password algorithms the server can use to derive long-term keys, in preference
    /// order.
    pub const ATTR_PASSWORD_ALGORITHMS: u16 = 0x8002;

    /// This attribute redirects the client to a different server domain for subsequent requests.
    pub const ATTR_ALTERNATE_DOMAIN: u16 = 0x8003;

    /// This attribute provides a human-readable description of the software, including its name and
    /// version. Useful for debugging, diagnostics, or compatibility checks.
    pub const ATTR_SOFTWARE: u16 = 0x8022;

    /// This attribute redirects the client to a different STUN server for subsequent requests.
    pub const ATTR_ALTERNATE_SERVER: u16 = 0x8023;

    /// This attribute provides a CRC32 checksum of the STUN message, ensuring that the message has
    /// not been altered in transit. The CRC32 value is XORed with the constant 0x5354554E.
    pub const ATTR_FINGERPRINT: u16 = 0x8028;
}

// Error Codes
#[allow(dead_code)]
pub(crate) mod error_code {
    /// Bad Request (400)
    pub const ERROR_CODE_BAD_REQUEST: u16 = 400;

    /// Unauthenticated (401)
    pub const ERROR_CODE_UNAUTHENTICATED: u16 = 401;

    /// Unknown Attribute (420)
    pub const ERROR_CODE_UNKNOWN_ATTRIBUTE: u16 = 420;

    /// Stale Nonce (438)
    pub const ERROR_CODE_STALE_NONCE: u16 = 438;

    /// Server Error (500)
    pub const ERROR_CODE_SERVER_ERROR: u16 = 500;
}
