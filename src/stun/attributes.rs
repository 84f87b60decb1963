/**
 * STUN attribute codec.
 *
 * Attributes travel on the wire as `type(2) || length(2) || value(length) || padding`,
 * where the value is padded to a 4-byte boundary but the length field excludes the
 * padding. `Attribute` is that opaque form; the typed views below parse and build
 * the value buffer per attribute type.
 * See RFC 8489 Section 14 for details
 * https://datatracker.ietf.org/doc/html/rfc8489#section-14
 */
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use crate::stun::attribute_type::*;
use crate::stun::message::DecodeError;
use crate::stun::MAGIC_COOKIE;

/// address family value for IPv4 in (XOR-)MAPPED-ADDRESS and ALTERNATE-SERVER
const FAMILY_IPV4: u8 = 0x01;
/// address family value for IPv6
const FAMILY_IPV6: u8 = 0x02;

/// Password algorithm number for MD5 key derivation.
pub(crate) const ALGORITHM_MD5: u16 = 0x0001;
/// Password algorithm number for SHA-256 key derivation.
pub(crate) const ALGORITHM_SHA256: u16 = 0x0002;

/**
 * An attribute in its on-wire form: a 16-bit type tag and the raw value buffer.
 * Unrecognized types round-trip through the codec unchanged.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Attribute {
    pub typ: u16,
    pub data: Vec<u8>,
}

impl Attribute {
    pub fn new(typ: u16, data: Vec<u8>) -> Self {
        Attribute { typ, data }
    }

    /**
     * Size of this attribute on the wire: 4 bytes of header plus the value
     * padded to the next 4-byte boundary.
     */
    pub fn wire_size(&self) -> usize {
        4 + (self.data.len() + 3) / 4 * 4
    }
}

/**
 * Whether the attribute type falls in the comprehension-required range.
 * Unknown attributes in that range must be answered with error 420.
 */
pub(crate) fn is_comprehension_required(typ: u16) -> bool {
    typ < 0x8000
}

/**
 * Whether this server recognizes the attribute type.
 */
pub(crate) fn is_known(typ: u16) -> bool {
    matches!(
        typ,
        ATTR_MAPPED_ADDRESS
            | ATTR_USERNAME
            | ATTR_MESSAGE_INTEGRITY
            | ATTR_ERROR_CODE
            | ATTR_UNKNOWN_ATTRIBUTES
            | ATTR_REALM
            | ATTR_NONCE
            | ATTR_MESSAGE_INTEGRITY_SHA256
            | ATTR_PASSWORD_ALGORITHM
            | ATTR_USERHASH
            | ATTR_XOR_MAPPED_ADDRESS
            | ATTR_PASSWORD_ALGORITHMS
            | ATTR_ALTERNATE_DOMAIN
            | ATTR_SOFTWARE
            | ATTR_ALTERNATE_SERVER
            | ATTR_FINGERPRINT
    )
}

/**
 * Encode a socket address into the 8-byte (IPv4) or 20-byte (IPv6) address value.
 *
 * When `xor_transaction_id` is given, the port is XORed with the 16 most significant
 * bits of the magic cookie, an IPv4 address with the full magic cookie, and an IPv6
 * address with the magic cookie concatenated with the transaction id.
 */
fn encode_address(addr: &SocketAddr, xor_transaction_id: Option<&[u8; 12]>) -> Vec<u8> {
    let magic_bytes = MAGIC_COOKIE.to_be_bytes();
    let port = match xor_transaction_id {
        Some(_) => addr.port() ^ ((MAGIC_COOKIE >> 16) as u16),
        None => addr.port(),
    };

    match addr.ip() {
        IpAddr::V4(ipv4) => {
            let mut value = vec![0u8; 8];
            value[1] = FAMILY_IPV4;
            value[2..4].copy_from_slice(&port.to_be_bytes());
            let octets = ipv4.octets();
            for i in 0..4 {
                value[4 + i] = match xor_transaction_id {
                    Some(_) => octets[i] ^ magic_bytes[i],
                    None => octets[i],
                };
            }
            value
        }
        IpAddr::V6(ipv6) => {
            let mut value = vec![0u8; 20];
            value[1] = FAMILY_IPV6;
            value[2..4].copy_from_slice(&port.to_be_bytes());
            let octets = ipv6.octets();
            match xor_transaction_id {
                Some(transaction_id) => {
                    for i in 0..4 {
                        value[4 + i] = octets[i] ^ magic_bytes[i];
                    }
                    for i in 0..12 {
                        value[8 + i] = octets[4 + i] ^ transaction_id[i];
                    }
                }
                None => value[4..20].copy_from_slice(&octets),
            }
            value
        }
    }
}

/**
 * Decode an 8-byte or 20-byte address value, undoing the XOR obfuscation when
 * `xor_transaction_id` is given.
 */
fn decode_address(
    data: &[u8],
    xor_transaction_id: Option<&[u8; 12]>,
) -> Result<SocketAddr, DecodeError> {
    if data.len() < 4 {
        return Err(DecodeError::InvalidAttributeFormat("address"));
    }
    let magic_bytes = MAGIC_COOKIE.to_be_bytes();
    let raw_port = u16::from_be_bytes([data[2], data[3]]);
    let port = match xor_transaction_id {
        Some(_) => raw_port ^ ((MAGIC_COOKIE >> 16) as u16),
        None => raw_port,
    };

    match data[1] {
        FAMILY_IPV4 if data.len() == 8 => {
            let mut octets = [0u8; 4];
            for i in 0..4 {
                octets[i] = match xor_transaction_id {
                    Some(_) => data[4 + i] ^ magic_bytes[i],
                    None => data[4 + i],
                };
            }
            Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::from(octets)), port))
        }
        FAMILY_IPV6 if data.len() == 20 => {
            let mut octets = [0u8; 16];
            match xor_transaction_id {
                Some(transaction_id) => {
                    for i in 0..4 {
                        octets[i] = data[4 + i] ^ magic_bytes[i];
                    }
                    for i in 0..12 {
                        octets[4 + i] = data[8 + i] ^ transaction_id[i];
                    }
                }
                None => octets.copy_from_slice(&data[4..20]),
            }
            Ok(SocketAddr::new(IpAddr::V6(Ipv6Addr::from(octets)), port))
        }
        _ => Err(DecodeError::InvalidAttributeFormat("address")),
    }
}

/**
 * XOR-MAPPED-ADDRESS: the client's reflexive transport address, obfuscated.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct XorMappedAddress(pub SocketAddr);

impl XorMappedAddress {
    pub fn into_attribute(self, transaction_id: &[u8; 12]) -> Attribute {
        Attribute::new(
            ATTR_XOR_MAPPED_ADDRESS,
            encode_address(&self.0, Some(transaction_id)),
        )
    }

    pub fn decode(attribute: &Attribute, transaction_id: &[u8; 12]) -> Result<Self, DecodeError> {
        expect_type(attribute, ATTR_XOR_MAPPED_ADDRESS)?;
        Ok(XorMappedAddress(decode_address(
            &attribute.data,
            Some(transaction_id),
        )?))
    }
}

/**
 * MAPPED-ADDRESS: the client's reflexive transport address in the clear.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MappedAddress(pub SocketAddr);

impl MappedAddress {
    pub fn into_attribute(self) -> Attribute {
        Attribute::new(ATTR_MAPPED_ADDRESS, encode_address(&self.0, None))
    }

    pub fn decode(attribute: &Attribute) -> Result<Self, DecodeError> {
        expect_type(attribute, ATTR_MAPPED_ADDRESS)?;
        Ok(MappedAddress(decode_address(&attribute.data, None)?))
    }
}

/**
 * ALTERNATE-SERVER: a different server the client should use, same value
 * format as MAPPED-ADDRESS.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct AlternateServer(pub SocketAddr);

impl AlternateServer {
    pub fn into_attribute(self) -> Attribute {
        Attribute::new(ATTR_ALTERNATE_SERVER, encode_address(&self.0, None))
    }

    pub fn decode(attribute: &Attribute) -> Result<Self, DecodeError> {
        expect_type(attribute, ATTR_ALTERNATE_SERVER)?;
        Ok(AlternateServer(decode_address(&attribute.data, None)?))
    }
}

/**
 * USERNAME: the identity to authenticate, UTF-8.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Username(pub String);

impl Username {
    pub fn into_attribute(self) -> Attribute {
        Attribute::new(ATTR_USERNAME, self.0.into_bytes())
    }

    pub fn decode(attribute: &Attribute) -> Result<Self, DecodeError> {
        expect_type(attribute, ATTR_USERNAME)?;
        Ok(Username(decode_utf8(&attribute.data, "USERNAME")?))
    }
}

/**
 * REALM: the authentication domain, UTF-8.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Realm(pub String);

impl Realm {
    pub fn into_attribute(self) -> Attribute {
        Attribute::new(ATTR_REALM, self.0.into_bytes())
    }

    pub fn decode(attribute: &Attribute) -> Result<Self, DecodeError> {
        expect_type(attribute, ATTR_REALM)?;
        Ok(Realm(decode_utf8(&attribute.data, "REALM")?))
    }
}

/**
 * SOFTWARE: free-form description of the sending agent.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Software(pub String);

impl Software {
    pub fn into_attribute(self) -> Attribute {
        Attribute::new(ATTR_SOFTWARE, self.0.into_bytes())
    }

    pub fn decode(attribute: &Attribute) -> Result<Self, DecodeError> {
        expect_type(attribute, ATTR_SOFTWARE)?;
        Ok(Software(decode_utf8(&attribute.data, "SOFTWARE")?))
    }
}

/**
 * ALTERNATE-DOMAIN: domain name to validate against the alternate server's
 * certificate.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AlternateDomain(pub String);

impl AlternateDomain {
    pub fn into_attribute(self) -> Attribute {
        Attribute::new(ATTR_ALTERNATE_DOMAIN, self.0.into_bytes())
    }

    pub fn decode(attribute: &Attribute) -> Result<Self, DecodeError> {
        expect_type(attribute, ATTR_ALTERNATE_DOMAIN)?;
        Ok(AlternateDomain(decode_utf8(&attribute.data, "ALTERNATE-DOMAIN")?))
    }
}

fn decode_utf8(data: &[u8], label: &'static str) -> Result<String, DecodeError> {
    let value = std::str::from_utf8(data).map_err(|_| DecodeError::InvalidAttributeFormat(label))?;
    Ok(value.to_string())
}

/**
 * USERHASH: SHA-256 of "username:realm", fixed 32 bytes.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Userhash(pub [u8; 32]);

impl Userhash {
    pub fn into_attribute(self) -> Attribute {
        Attribute::new(ATTR_USERHASH, self.0.to_vec())
    }

    pub fn decode(attribute: &Attribute) -> Result<Self, DecodeError> {
        expect_type(attribute, ATTR_USERHASH)?;
        let hash: [u8; 32] = attribute
            .data
            .as_slice()
            .try_into()
            .map_err(|_| DecodeError::InvalidAttributeFormat("USERHASH"))?;
        Ok(Userhash(hash))
    }
}

/**
 * ERROR-CODE: a numeric code split into hundreds class and remainder, plus a
 * UTF-8 reason phrase.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ErrorCode {
    pub code: u16,
    pub reason: String,
}

impl ErrorCode {
    pub fn new(code: u16, reason: &str) -> Self {
        ErrorCode {
            code,
            reason: reason.to_string(),
        }
    }

    pub fn into_attribute(self) -> Attribute {
        let mut data = Vec::with_capacity(4 + self.reason.len());
        data.extend_from_slice(&[0, 0, (self.code / 100) as u8, (self.code % 100) as u8]);
        data.extend_from_slice(self.reason.as_bytes());
        Attribute::new(ATTR_ERROR_CODE, data)
    }

    pub fn decode(attribute: &Attribute) -> Result<Self, DecodeError> {
        expect_type(attribute, ATTR_ERROR_CODE)?;
        if attribute.data.len() < 4 {
            return Err(DecodeError::InvalidAttributeFormat("ERROR-CODE"));
        }
        let class = (attribute.data[2] & 0x07) as u16;
        let number = attribute.data[3] as u16;
        let reason = std::str::from_utf8(&attribute.data[4..])
            .map_err(|_| DecodeError::InvalidAttributeFormat("ERROR-CODE"))?;
        Ok(ErrorCode {
            code: class * 100 + number,
            reason: reason.to_string(),
        })
    }
}

/**
 * UNKNOWN-ATTRIBUTES: the list of 16-bit attribute types the server did not
 * understand, two bytes each.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct UnknownAttributes(pub Vec<u16>);

impl UnknownAttributes {
    pub fn into_attribute(self) -> Attribute {
        let mut data = Vec::with_capacity(self.0.len() * 2);
        for typ in &self.0 {
            data.extend_from_slice(&typ.to_be_bytes());
        }
        Attribute::new(ATTR_UNKNOWN_ATTRIBUTES, data)
    }

    pub fn decode(attribute: &Attribute) -> Result<Self, DecodeError> {
        expect_type(attribute, ATTR_UNKNOWN_ATTRIBUTES)?;
        if attribute.data.len() % 2 != 0 {
            return Err(DecodeError::InvalidAttributeFormat("UNKNOWN-ATTRIBUTES"));
        }
        let types = attribute
            .data
            .chunks_exact(2)
            .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
            .collect();
        Ok(UnknownAttributes(types))
    }
}

/**
 * PASSWORD-ALGORITHM / entries of PASSWORD-ALGORITHMS: a 16-bit algorithm
 * number and its parameters, padded to a 4-byte boundary inside the list.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PasswordAlgorithmParams {
    pub algorithm: u16,
    pub parameters: Vec<u8>,
}

impl PasswordAlgorithmParams {
    pub fn new(algorithm: u16) -> Self {
        PasswordAlgorithmParams {
            algorithm,
            parameters: Vec::new(),
        }
    }

    fn write_to(&self, data: &mut Vec<u8>) {
        data.extend_from_slice(&self.algorithm.to_be_bytes());
        data.extend_from_slice(&(self.parameters.len() as u16).to_be_bytes());
        data.extend_from_slice(&self.parameters);
        let padding = (4 - self.parameters.len() % 4) % 4;
        data.extend_from_slice(&[0u8; 3][..padding]);
    }

    fn read_from(data: &[u8]) -> Result<(Self, usize), DecodeError> {
        if data.len() < 4 {
            return Err(DecodeError::InvalidAttributeFormat("PASSWORD-ALGORITHM"));
        }
        let algorithm = u16::from_be_bytes([data[0], data[1]]);
        let param_len = u16::from_be_bytes([data[2], data[3]]) as usize;
        let padded = (param_len + 3) / 4 * 4;
        if data.len() < 4 + padded {
            return Err(DecodeError::InvalidAttributeFormat("PASSWORD-ALGORITHM"));
        }
        Ok((
            PasswordAlgorithmParams {
                algorithm,
                parameters: data[4..4 + param_len].to_vec(),
            },
            4 + padded,
        ))
    }

    pub fn into_attribute(self) -> Attribute {
        let mut data = Vec::new();
        self.write_to(&mut data);
        Attribute::new(ATTR_PASSWORD_ALGORITHM, data)
    }

    pub fn decode(attribute: &Attribute) -> Result<Self, DecodeError> {
        expect_type(attribute, ATTR_PASSWORD_ALGORITHM)?;
        let (params, consumed) = Self::read_from(&attribute.data)?;
        if consumed != attribute.data.len() {
            return Err(DecodeError::InvalidAttributeFormat("PASSWORD-ALGORITHM"));
        }
        Ok(params)
    }
}

/**
 * PASSWORD-ALGORITHMS: the server's offered algorithm list, in preference order.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PasswordAlgorithms(pub Vec<PasswordAlgorithmParams>);

impl PasswordAlgorithms {
    pub fn into_attribute(self) -> Attribute {
        let mut data = Vec::new();
        for params in &self.0 {
            params.write_to(&mut data);
        }
        Attribute::new(ATTR_PASSWORD_ALGORITHMS, data)
    }

    pub fn decode(attribute: &Attribute) -> Result<Self, DecodeError> {
        expect_type(attribute, ATTR_PASSWORD_ALGORITHMS)?;
        let mut algorithms = Vec::new();
        let mut offset = 0;
        while offset < attribute.data.len() {
            let (params, consumed) = PasswordAlgorithmParams::read_from(&attribute.data[offset..])?;
            algorithms.push(params);
            offset += consumed;
        }
        Ok(PasswordAlgorithms(algorithms))
    }
}

/**
 * NONCE: the raw server-issued token bytes. The structured form lives in the
 * nonce module; at the attribute layer the value is opaque.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NonceAttribute(pub Vec<u8>);

impl NonceAttribute {
    pub fn into_attribute(self) -> Attribute {
        Attribute::new(ATTR_NONCE, self.0)
    }

    pub fn decode(attribute: &Attribute) -> Result<Self, DecodeError> {
        expect_type(attribute, ATTR_NONCE)?;
        Ok(NonceAttribute(attribute.data.clone()))
    }
}

/**
 * FINGERPRINT: CRC32 of the message prefix XORed with 0x5354554E, 4 bytes.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Fingerprint(pub u32);

impl Fingerprint {
    pub fn into_attribute(self) -> Attribute {
        Attribute::new(ATTR_FINGERPRINT, self.0.to_be_bytes().to_vec())
    }

    pub fn decode(attribute: &Attribute) -> Result<Self, DecodeError> {
        expect_type(attribute, ATTR_FINGERPRINT)?;
        let value: [u8; 4] = attribute
            .data
            .as_slice()
            .try_into()
            .map_err(|_| DecodeError::InvalidAttributeFormat("FINGERPRINT"))?;
        Ok(Fingerprint(u32::from_be_bytes(value)))
    }
}

/**
 * MESSAGE-INTEGRITY: HMAC-SHA1 over the message prefix, 20 bytes.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MessageIntegrity(pub [u8; 20]);

impl MessageIntegrity {
    pub fn into_attribute(self) -> Attribute {
        Attribute::new(ATTR_MESSAGE_INTEGRITY, self.0.to_vec())
    }

    pub fn decode(attribute: &Attribute) -> Result<Self, DecodeError> {
        expect_type(attribute, ATTR_MESSAGE_INTEGRITY)?;
        let value: [u8; 20] = attribute
            .data
            .as_slice()
            .try_into()
            .map_err(|_| DecodeError::InvalidAttributeFormat("MESSAGE-INTEGRITY"))?;
        Ok(MessageIntegrity(value))
    }
}

/**
 * MESSAGE-INTEGRITY-SHA256: HMAC-SHA256 over the message prefix, 32 bytes.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MessageIntegritySha256(pub [u8; 32]);

impl MessageIntegritySha256 {
    pub fn into_attribute(self) -> Attribute {
        Attribute::new(ATTR_MESSAGE_INTEGRITY_SHA256, self.0.to_vec())
    }

    pub fn decode(attribute: &Attribute) -> Result<Self, DecodeError> {
        expect_type(attribute, ATTR_MESSAGE_INTEGRITY_SHA256)?;
        let value: [u8; 32] = attribute
            .data
            .as_slice()
            .try_into()
            .map_err(|_| DecodeError::InvalidAttributeFormat("MESSAGE-INTEGRITY-SHA256"))?;
        Ok(MessageIntegritySha256(value))
    }
}

fn expect_type(attribute: &Attribute, typ: u16) -> Result<(), DecodeError> {
    if attribute.typ != typ {
        return Err(DecodeError::UnknownAttribute(attribute.typ));
    }
    Ok(())
}
