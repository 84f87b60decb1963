/**
 * The STUN message codec: header framing, attribute list, fingerprint and
 * message-integrity computation.
 * See RFC 8489 Section 5 for details
 * https://datatracker.ietf.org/doc/html/rfc8489#section-5
 */
use std::io::{self, Read, Write};

use crc32fast::Hasher;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha256;
use thiserror::Error;

use crate::stun::attributes::{Attribute, Fingerprint};
use crate::stun::{attribute_type, FINGERPRINT_XOR, MAGIC_COOKIE};

/**
 * Errors surfaced while decoding a STUN message from the wire. The server
 * never sees a partially decoded message; these go to the caller of `read`.
 */
#[derive(Error, Debug)]
pub(crate) enum DecodeError {
    #[error("unexpected end of stream")]
    EndOfStream,
    #[error("top two bits of the message type are not zero")]
    NonZeroStartingBits,
    #[error("wrong magic cookie")]
    WrongMagicCookie,
    #[error("unsupported method 0x{0:03X}")]
    UnsupportedMethod(u16),
    #[error("unknown attribute 0x{0:04X}")]
    UnknownAttribute(u16),
    #[error("invalid {0} attribute")]
    InvalidAttributeFormat(&'static str),
    #[error(transparent)]
    Io(io::Error),
}

/**
 * Raised when an HMAC computation over the synthetic message prefix cannot be
 * carried out. The server translates this into a silent discard.
 */
#[derive(Error, Debug)]
#[error("message integrity computation failed")]
pub(crate) struct IntegrityError;

/**
 * The class of a STUN message, the two bits spliced into the message type.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MessageClass {
    Request,
    Indication,
    SuccessResponse,
    ErrorResponse,
}

impl MessageClass {
    fn from_bits(bits: u16) -> Self {
        match bits & 0x3 {
            0b00 => MessageClass::Request,
            0b01 => MessageClass::Indication,
            0b10 => MessageClass::SuccessResponse,
            _ => MessageClass::ErrorResponse,
        }
    }

    fn bits(self) -> u16 {
        match self {
            MessageClass::Request => 0b00,
            MessageClass::Indication => 0b01,
            MessageClass::SuccessResponse => 0b10,
            MessageClass::ErrorResponse => 0b11,
        }
    }
}

/**
 * The 12-bit method code. Only binding is recognized; any other method is a
 * decode error.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Method {
    Binding,
}

impl Method {
    fn from_code(code: u16) -> Result<Self, DecodeError> {
        match code {
            0x001 => Ok(Method::Binding),
            other => Err(DecodeError::UnsupportedMethod(other)),
        }
    }

    fn code(self) -> u16 {
        match self {
            Method::Binding => 0x001,
        }
    }
}

/**
 * Splice class and method into the 14-bit wire message type per RFC 8489
 * Section 5: method bits M0-M3 occupy positions 0-3, M4-M6 positions 5-7,
 * M7-M11 positions 9-13; class bit C0 sits at position 4 and C1 at position 8.
 */
fn join_message_type(class: MessageClass, method: Method) -> u16 {
    let m = method.code();
    let c = class.bits();
    (m & 0x000F) | ((m & 0x0070) << 1) | ((m & 0x0F80) << 2) | ((c & 0x1) << 4) | ((c & 0x2) << 7)
}

/**
 * Undo the splicing, returning (class, method code).
 */
fn split_message_type(message_type: u16) -> (MessageClass, u16) {
    let class = ((message_type >> 4) & 0x1) | ((message_type >> 7) & 0x2);
    let method =
        (message_type & 0x000F) | ((message_type >> 1) & 0x0070) | ((message_type >> 2) & 0x0F80);
    (MessageClass::from_bits(class), method)
}

/**
 * Which HMAC protects the message prefix.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IntegrityKind {
    Sha1,
    Sha256,
}

impl IntegrityKind {
    /// total wire size of the integrity attribute: 4 bytes of header plus the HMAC
    pub fn attribute_size(self) -> usize {
        match self {
            IntegrityKind::Sha1 => 4 + 20,
            IntegrityKind::Sha256 => 4 + 32,
        }
    }
}

/**
 * A STUN message: class, method, transaction id and the ordered attribute
 * list. The length field of the wire header is derived from the attributes
 * when writing and validated when reading.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Message {
    pub class: MessageClass,
    pub method: Method,
    pub transaction_id: [u8; 12],
    pub attributes: Vec<Attribute>,
}

impl Message {
    /**
     * Byte length of the serialized attribute section, padding included.
     */
    pub fn attributes_size(&self) -> usize {
        self.attributes.iter().map(Attribute::wire_size).sum()
    }

    /**
     * Read a STUN message from a byte stream.
     *
     * The attribute region is read in full before parsing, so a length field
     * larger than the available bytes surfaces as `EndOfStream` and a short
     * attribute inside the region can never read past it.
     *
     * @param reader The byte source positioned at the start of the header
     * @return The decoded message, or the first decode error encountered
     */
    pub fn read<R: Read>(reader: &mut R) -> Result<Message, DecodeError> {
        let message_type = read_u16(reader)?;
        if message_type & 0xC000 != 0 {
            return Err(DecodeError::NonZeroStartingBits);
        }
        let (class, method_code) = split_message_type(message_type);
        let method = Method::from_code(method_code)?;

        let length = read_u16(reader)?;
        let magic_cookie = read_u32(reader)?;
        if magic_cookie != MAGIC_COOKIE {
            return Err(DecodeError::WrongMagicCookie);
        }
        let mut transaction_id = [0u8; 12];
        read_exact(reader, &mut transaction_id)?;

        let mut region = vec![0u8; length as usize];
        read_exact(reader, &mut region)?;

        let mut attributes = Vec::new();
        let mut offset = 0;
        while offset < region.len() {
            if offset + 4 > region.len() {
                return Err(DecodeError::EndOfStream);
            }
            let typ = u16::from_be_bytes([region[offset], region[offset + 1]]);
            let value_length =
                u16::from_be_bytes([region[offset + 2], region[offset + 3]]) as usize;
            let padded = (value_length + 3) / 4 * 4;
            if offset + 4 + padded > region.len() {
                return Err(DecodeError::EndOfStream);
            }
            let data = region[offset + 4..offset + 4 + value_length].to_vec();
            attributes.push(Attribute::new(typ, data));
            offset += 4 + padded;
        }

        Ok(Message {
            class,
            method,
            transaction_id,
            attributes,
        })
    }

    /**
     * Serialize the message: 20-byte header followed by the attributes in
     * list order, each padded to a 4-byte boundary.
     */
    pub fn write<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.write_prefix(writer, self.attributes.len(), self.attributes_size() as u16)
    }

    /**
     * Serialize the header and the first `upto` attributes with an overridden
     * length field.
     *
     * Integrity and fingerprint values are computed over the message as it
     * will be once the attribute is appended, before it is actually
     * serialized; the override lets callers pre-inflate the length to account
     * for the not-yet-present attribute.
     */
    pub fn write_prefix<W: Write>(
        &self,
        writer: &mut W,
        upto: usize,
        length_override: u16,
    ) -> io::Result<()> {
        writer.write_all(&join_message_type(self.class, self.method).to_be_bytes())?;
        writer.write_all(&length_override.to_be_bytes())?;
        writer.write_all(&MAGIC_COOKIE.to_be_bytes())?;
        writer.write_all(&self.transaction_id)?;

        for attribute in &self.attributes[..upto] {
            writer.write_all(&attribute.typ.to_be_bytes())?;
            writer.write_all(&(attribute.data.len() as u16).to_be_bytes())?;
            writer.write_all(&attribute.data)?;
            let padding = (4 - attribute.data.len() % 4) % 4;
            writer.write_all(&[0u8; 3][..padding])?;
        }
        Ok(())
    }

    fn prefix_bytes(&self, upto: usize, trailer_size: usize) -> Vec<u8> {
        let length = self.attributes[..upto]
            .iter()
            .map(Attribute::wire_size)
            .sum::<usize>()
            + trailer_size;
        let mut scratch = Vec::with_capacity(20 + length);
        // writing into a Vec cannot fail
        let _ = self.write_prefix(&mut scratch, upto, length as u16);
        scratch
    }

    /**
     * Compute the FINGERPRINT value as if the 8-byte fingerprint attribute
     * were appended after the first `upto` attributes.
     */
    pub fn compute_fingerprint(&self, upto: usize) -> u32 {
        let mut hasher = Hasher::new();
        hasher.update(&self.prefix_bytes(upto, 8));
        hasher.finalize() ^ FINGERPRINT_XOR
    }

    /**
     * Verify the FINGERPRINT attribute, if any, against the covered prefix.
     *
     * @return true when no fingerprint is present or when it matches
     */
    pub fn check_fingerprint(&self) -> bool {
        let index = self
            .attributes
            .iter()
            .position(|a| a.typ == attribute_type::ATTR_FINGERPRINT);
        match index {
            Some(index) => match Fingerprint::decode(&self.attributes[index]) {
                Ok(fingerprint) => fingerprint.0 == self.compute_fingerprint(index),
                Err(_) => false,
            },
            None => true,
        }
    }

    /**
     * Compute the HMAC over the message as if the integrity attribute were
     * appended after the first `upto` attributes (length pre-inflated by 24
     * bytes for HMAC-SHA1, 36 for HMAC-SHA256).
     */
    pub fn compute_message_integrity(
        &self,
        kind: IntegrityKind,
        upto: usize,
        key: &[u8],
    ) -> Result<Vec<u8>, IntegrityError> {
        let prefix = self.prefix_bytes(upto, kind.attribute_size());
        match kind {
            IntegrityKind::Sha1 => {
                let mut mac = Hmac::<Sha1>::new_from_slice(key).map_err(|_| IntegrityError)?;
                mac.update(&prefix);
                Ok(mac.finalize().into_bytes().to_vec())
            }
            IntegrityKind::Sha256 => {
                let mut mac = Hmac::<Sha256>::new_from_slice(key).map_err(|_| IntegrityError)?;
                mac.update(&prefix);
                Ok(mac.finalize().into_bytes().to_vec())
            }
        }
    }

    /**
     * Verify the integrity attribute at `attr_index` against the prefix it
     * covers, using a constant-time comparison.
     */
    pub fn check_message_integrity(
        &self,
        kind: IntegrityKind,
        attr_index: usize,
        key: &[u8],
    ) -> Result<bool, IntegrityError> {
        let computed = self.compute_message_integrity(kind, attr_index, key)?;
        Ok(constant_time_eq(
            &computed,
            &self.attributes[attr_index].data,
        ))
    }
}

/**
 * Constant-time equality comparison, so HMAC verification does not leak a
 * matching prefix length through timing.
 */
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<(), DecodeError> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => DecodeError::EndOfStream,
        _ => DecodeError::Io(e),
    })
}

fn read_u16<R: Read>(reader: &mut R) -> Result<u16, DecodeError> {
    let mut buf = [0u8; 2];
    read_exact(reader, &mut buf)?;
    Ok(u16::from_be_bytes(buf))
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32, DecodeError> {
    let mut buf = [0u8; 4];
    read_exact(reader, &mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stun::attributes::{Software, Username};
    use std::io::Cursor;

    const TRANSACTION_ID: [u8; 12] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11];

    #[test]
    fn test_message_type_splicing() {
        assert_eq!(
            join_message_type(MessageClass::Request, Method::Binding),
            0x0001
        );
        assert_eq!(
            join_message_type(MessageClass::Indication, Method::Binding),
            0x0011
        );
        assert_eq!(
            join_message_type(MessageClass::SuccessResponse, Method::Binding),
            0x0101
        );
        assert_eq!(
            join_message_type(MessageClass::ErrorResponse, Method::Binding),
            0x0111
        );

        for message_type in [0x0001u16, 0x0011, 0x0101, 0x0111] {
            let (class, method) = split_message_type(message_type);
            assert_eq!(join_message_type(class, Method::Binding), message_type);
            assert_eq!(method, 0x001);
        }
    }

    #[test]
    fn test_read_rejects_nonzero_starting_bits() {
        let bytes = [0xC0u8, 0x01, 0x00, 0x00];
        assert!(matches!(
            Message::read(&mut Cursor::new(&bytes[..])),
            Err(DecodeError::NonZeroStartingBits)
        ));
    }

    #[test]
    fn test_read_rejects_wrong_magic_cookie() {
        let mut bytes = vec![0x00, 0x01, 0x00, 0x00, 0xDE, 0xAD, 0xBE, 0xEF];
        bytes.extend_from_slice(&TRANSACTION_ID);
        assert!(matches!(
            Message::read(&mut Cursor::new(&bytes[..])),
            Err(DecodeError::WrongMagicCookie)
        ));
    }

    #[test]
    fn test_read_rejects_unknown_method() {
        // method 0x002 with request class
        let mut bytes = vec![0x00, 0x02, 0x00, 0x00];
        bytes.extend_from_slice(&MAGIC_COOKIE.to_be_bytes());
        bytes.extend_from_slice(&TRANSACTION_ID);
        assert!(matches!(
            Message::read(&mut Cursor::new(&bytes[..])),
            Err(DecodeError::UnsupportedMethod(0x002))
        ));
    }

    #[test]
    fn test_read_short_attribute_region() {
        // header promises 8 bytes of attributes but only 4 follow
        let mut bytes = vec![0x00, 0x01, 0x00, 0x08];
        bytes.extend_from_slice(&MAGIC_COOKIE.to_be_bytes());
        bytes.extend_from_slice(&TRANSACTION_ID);
        bytes.extend_from_slice(&[0x80, 0x28, 0x00, 0x04]);
        assert!(matches!(
            Message::read(&mut Cursor::new(&bytes[..])),
            Err(DecodeError::EndOfStream)
        ));
    }

    #[test]
    fn test_read_attribute_overrunning_region() {
        // attribute claims 8 value bytes inside a 8-byte region
        let mut bytes = vec![0x00, 0x01, 0x00, 0x08];
        bytes.extend_from_slice(&MAGIC_COOKIE.to_be_bytes());
        bytes.extend_from_slice(&TRANSACTION_ID);
        bytes.extend_from_slice(&[0x80, 0x22, 0x00, 0x08, 0x61, 0x62, 0x63, 0x64]);
        assert!(matches!(
            Message::read(&mut Cursor::new(&bytes[..])),
            Err(DecodeError::EndOfStream)
        ));
    }

    #[test]
    fn test_deserialize_captured_request() {
        let bytes: [u8; 56] = [
            0x00, 0x01, 0x00, 0x24, 0x21, 0x12, 0xA4, 0x42, 0x00, 0x01, 0x02, 0x03, 0x04, 0x05,
            0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x00, 0x06, 0x00, 0x08, 0x63, 0x6F, 0x72, 0x65,
            0x6E, 0x64, 0x6F, 0x73, 0x00, 0x08, 0x00, 0x14, 0xAE, 0x76, 0xEA, 0x66, 0xF1, 0x89,
            0xA0, 0xFB, 0x01, 0xE6, 0x3B, 0xA6, 0x19, 0xDA, 0x01, 0xAE, 0x51, 0xE8, 0x49, 0x03,
        ];

        let message = Message::read(&mut Cursor::new(&bytes[..])).unwrap();
        assert_eq!(message.class, MessageClass::Request);
        assert_eq!(message.method, Method::Binding);
        assert_eq!(message.transaction_id, TRANSACTION_ID);
        assert_eq!(message.attributes.len(), 2);
        assert_eq!(
            Username::decode(&message.attributes[0]).unwrap().0,
            "corendos"
        );
        assert_eq!(message.attributes[1].data.len(), 20);

        // HMAC-SHA1 over the prefix with the pre-inflated length, key "password"
        assert!(message
            .check_message_integrity(IntegrityKind::Sha1, 1, b"password")
            .unwrap());
        assert!(!message
            .check_message_integrity(IntegrityKind::Sha1, 1, b"passwore")
            .unwrap());
    }

    #[test]
    fn test_write_read_roundtrip() {
        let message = Message {
            class: MessageClass::Request,
            method: Method::Binding,
            transaction_id: TRANSACTION_ID,
            attributes: vec![
                Username("corendos".to_string()).into_attribute(),
                Software("stunward v0.1.0".to_string()).into_attribute(),
            ],
        };

        let mut buffer = Vec::new();
        message.write(&mut buffer).unwrap();
        assert_eq!(buffer.len(), 20 + message.attributes_size());
        // length field reflects padded attribute sizes
        assert_eq!(
            u16::from_be_bytes([buffer[2], buffer[3]]) as usize,
            message.attributes_size()
        );

        let decoded = Message::read(&mut Cursor::new(&buffer[..])).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_fingerprint_anchor() {
        // empty binding request, fingerprint computed as if appended
        let message = Message {
            class: MessageClass::Request,
            method: Method::Binding,
            transaction_id: TRANSACTION_ID,
            attributes: Vec::new(),
        };
        assert_eq!(message.compute_fingerprint(0), 0x5B0FF6FC);
    }

    #[test]
    fn test_check_fingerprint_detects_corruption() {
        let mut message = Message {
            class: MessageClass::Request,
            method: Method::Binding,
            transaction_id: TRANSACTION_ID,
            attributes: vec![Software("test".to_string()).into_attribute()],
        };
        let crc = message.compute_fingerprint(1);
        message
            .attributes
            .push(Fingerprint(crc).into_attribute());
        assert!(message.check_fingerprint());

        // flip one bit of a covered byte
        message.attributes[0].data[0] ^= 0x01;
        assert!(!message.check_fingerprint());
    }

    #[test]
    fn test_check_fingerprint_without_fingerprint() {
        let message = Message {
            class: MessageClass::Request,
            method: Method::Binding,
            transaction_id: TRANSACTION_ID,
            attributes: Vec::new(),
        };
        assert!(message.check_fingerprint());
    }

    #[test]
    fn test_message_integrity_sha256_roundtrip() {
        let mut message = Message {
            class: MessageClass::Request,
            method: Method::Binding,
            transaction_id: TRANSACTION_ID,
            attributes: vec![Username("corendos".to_string()).into_attribute()],
        };
        let mac = message
            .compute_message_integrity(IntegrityKind::Sha256, 1, b"password")
            .unwrap();
        assert_eq!(
            mac,
            vec![
                0x12, 0x90, 0xC4, 0x6E, 0xCC, 0x2D, 0x28, 0xE6, 0xA4, 0x51, 0xB0, 0xAE, 0xF9,
                0xE3, 0x6E, 0xCA, 0x1D, 0x8B, 0x88, 0xB1, 0xF2, 0xDF, 0xB8, 0x2F, 0x69, 0x1B,
                0x2E, 0x27, 0x15, 0x45, 0x14, 0x89,
            ]
        );
        message
            .attributes
            .push(Attribute::new(attribute_type::ATTR_MESSAGE_INTEGRITY_SHA256, mac));

        assert!(message
            .check_message_integrity(IntegrityKind::Sha256, 1, b"password")
            .unwrap());
        assert!(!message
            .check_message_integrity(IntegrityKind::Sha256, 1, b"password2")
            .unwrap());
    }
}
