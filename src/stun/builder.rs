/**
 * Staged construction of STUN messages.
 *
 * Integrity and fingerprint attributes cover everything appended before them,
 * so the builder defers them to `build` and appends in the mandatory order:
 * MESSAGE-INTEGRITY, then MESSAGE-INTEGRITY-SHA256, then FINGERPRINT.
 */
use rand::Rng;
use thiserror::Error;

use crate::stun::attributes::{Attribute, Fingerprint, MessageIntegrity, MessageIntegritySha256};
use crate::stun::message::{IntegrityError, IntegrityKind, Message, MessageClass, Method};

#[derive(Error, Debug)]
pub(crate) enum BuildError {
    /// class, method, or transaction id were not set before `build`
    #[error("class, method and transaction id must be set")]
    InvalidMessage,
    #[error(transparent)]
    Integrity(#[from] IntegrityError),
}

#[derive(Debug, Default)]
pub(crate) struct MessageBuilder {
    class: Option<MessageClass>,
    method: Option<Method>,
    transaction_id: Option<[u8; 12]>,
    attributes: Vec<Attribute>,
    integrity_key: Option<Vec<u8>>,
    integrity_sha256_key: Option<Vec<u8>>,
    fingerprint: bool,
}

impl MessageBuilder {
    pub fn new() -> Self {
        MessageBuilder::default()
    }

    pub fn set_class(&mut self, class: MessageClass) -> &mut Self {
        self.class = Some(class);
        self
    }

    pub fn set_method(&mut self, method: Method) -> &mut Self {
        self.method = Some(method);
        self
    }

    pub fn set_transaction_id(&mut self, transaction_id: [u8; 12]) -> &mut Self {
        self.transaction_id = Some(transaction_id);
        self
    }

    /**
     * Pick a fresh random 96-bit transaction id.
     */
    pub fn random_transaction_id(&mut self) -> &mut Self {
        let mut transaction_id = [0u8; 12];
        rand::thread_rng().fill(&mut transaction_id);
        self.transaction_id = Some(transaction_id);
        self
    }

    pub fn add_attribute(&mut self, attribute: Attribute) -> &mut Self {
        self.attributes.push(attribute);
        self
    }

    /**
     * Request a MESSAGE-INTEGRITY attribute keyed with `key`, appended at
     * build time.
     */
    pub fn add_message_integrity(&mut self, key: &[u8]) -> &mut Self {
        self.integrity_key = Some(key.to_vec());
        self
    }

    /**
     * Request a MESSAGE-INTEGRITY-SHA256 attribute keyed with `key`, appended
     * at build time after the classic integrity attribute.
     */
    pub fn add_message_integrity_sha256(&mut self, key: &[u8]) -> &mut Self {
        self.integrity_sha256_key = Some(key.to_vec());
        self
    }

    /**
     * Request a FINGERPRINT attribute, appended last at build time.
     */
    pub fn add_fingerprint(&mut self) -> &mut Self {
        self.fingerprint = true;
        self
    }

    /**
     * Assemble the message, appending the requested trailer attributes in
     * the mandatory order. Each trailer covers everything before it.
     */
    pub fn build(self) -> Result<Message, BuildError> {
        let (class, method, transaction_id) =
            match (self.class, self.method, self.transaction_id) {
                (Some(class), Some(method), Some(transaction_id)) => {
                    (class, method, transaction_id)
                }
                _ => return Err(BuildError::InvalidMessage),
            };

        let mut message = Message {
            class,
            method,
            transaction_id,
            attributes: self.attributes,
        };

        if let Some(key) = self.integrity_key {
            let upto = message.attributes.len();
            let mac = message.compute_message_integrity(IntegrityKind::Sha1, upto, &key)?;
            let mut value = [0u8; 20];
            value.copy_from_slice(&mac);
            message
                .attributes
                .push(MessageIntegrity(value).into_attribute());
        }

        if let Some(key) = self.integrity_sha256_key {
            let upto = message.attributes.len();
            let mac = message.compute_message_integrity(IntegrityKind::Sha256, upto, &key)?;
            let mut value = [0u8; 32];
            value.copy_from_slice(&mac);
            message
                .attributes
                .push(MessageIntegritySha256(value).into_attribute());
        }

        if self.fingerprint {
            let upto = message.attributes.len();
            let crc = message.compute_fingerprint(upto);
            message.attributes.push(Fingerprint(crc).into_attribute());
        }

        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stun::attributes::{Software, XorMappedAddress};
    use crate::stun::attribute_type::*;
    use crate::stun::message::IntegrityKind;
    use std::io::Cursor;

    const TRANSACTION_ID: [u8; 12] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11];

    #[test]
    fn test_build_requires_header_fields() {
        let mut builder = MessageBuilder::new();
        builder.set_class(MessageClass::Request);
        builder.set_method(Method::Binding);
        assert!(matches!(builder.build(), Err(BuildError::InvalidMessage)));
    }

    #[test]
    fn test_random_transaction_id_completes_message() {
        let mut builder = MessageBuilder::new();
        builder
            .set_class(MessageClass::Request)
            .set_method(Method::Binding)
            .random_transaction_id();
        assert!(builder.build().is_ok());
    }

    #[test]
    fn test_trailer_ordering() {
        let mut builder = MessageBuilder::new();
        builder
            .set_class(MessageClass::Request)
            .set_method(Method::Binding)
            .set_transaction_id(TRANSACTION_ID)
            .add_attribute(Software("test".to_string()).into_attribute())
            .add_fingerprint()
            .add_message_integrity_sha256(b"password")
            .add_message_integrity(b"password");

        let message = builder.build().unwrap();
        let types: Vec<u16> = message.attributes.iter().map(|a| a.typ).collect();
        assert_eq!(
            types,
            vec![
                ATTR_SOFTWARE,
                ATTR_MESSAGE_INTEGRITY,
                ATTR_MESSAGE_INTEGRITY_SHA256,
                ATTR_FINGERPRINT
            ]
        );

        // every trailer verifies over the attributes before it
        assert!(message
            .check_message_integrity(IntegrityKind::Sha1, 1, b"password")
            .unwrap());
        assert!(message
            .check_message_integrity(IntegrityKind::Sha256, 2, b"password")
            .unwrap());
        assert!(message.check_fingerprint());
    }

    #[test]
    fn test_integrity_soundness_against_wrong_key() {
        let mut builder = MessageBuilder::new();
        builder
            .set_class(MessageClass::Request)
            .set_method(Method::Binding)
            .set_transaction_id(TRANSACTION_ID)
            .add_message_integrity(b"password");
        let message = builder.build().unwrap();

        assert!(message
            .check_message_integrity(IntegrityKind::Sha1, 0, b"password")
            .unwrap());
        let mut wrong_key = b"password".to_vec();
        wrong_key[0] ^= 1;
        assert!(!message
            .check_message_integrity(IntegrityKind::Sha1, 0, &wrong_key)
            .unwrap());
    }

    #[test]
    fn test_builder_roundtrip_through_codec() {
        let mut builder = MessageBuilder::new();
        builder
            .set_class(MessageClass::SuccessResponse)
            .set_method(Method::Binding)
            .set_transaction_id(TRANSACTION_ID)
            .add_attribute(
                XorMappedAddress("192.0.2.1:32853".parse().unwrap())
                    .into_attribute(&TRANSACTION_ID),
            )
            .add_attribute(Software("stunward v0.1.0".to_string()).into_attribute())
            .add_fingerprint();
        let message = builder.build().unwrap();

        let mut buffer = Vec::new();
        message.write(&mut buffer).unwrap();
        let decoded = Message::read(&mut Cursor::new(&buffer[..])).unwrap();
        assert_eq!(decoded, message);
        assert!(decoded.check_fingerprint());
    }

    #[test]
    fn test_serialized_success_response_bytes() {
        let expected: [u8; 60] = [
            0x01, 0x01, 0x00, 0x28, 0x21, 0x12, 0xA4, 0x42, 0x00, 0x01, 0x02, 0x03, 0x04, 0x05,
            0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x00, 0x20, 0x00, 0x08, 0x00, 0x01, 0xA1, 0x47,
            0xE1, 0x12, 0xA6, 0x43, 0x80, 0x22, 0x00, 0x0F, 0x73, 0x74, 0x75, 0x6E, 0x77, 0x61,
            0x72, 0x64, 0x20, 0x76, 0x30, 0x2E, 0x31, 0x2E, 0x30, 0x00, 0x80, 0x28, 0x00, 0x04,
            0x42, 0x81, 0xD0, 0x3C,
        ];

        let mut builder = MessageBuilder::new();
        builder
            .set_class(MessageClass::SuccessResponse)
            .set_method(Method::Binding)
            .set_transaction_id(TRANSACTION_ID)
            .add_attribute(
                XorMappedAddress("192.0.2.1:32853".parse().unwrap())
                    .into_attribute(&TRANSACTION_ID),
            )
            .add_attribute(Software("stunward v0.1.0".to_string()).into_attribute())
            .add_fingerprint();
        let message = builder.build().unwrap();

        let mut buffer = Vec::new();
        message.write(&mut buffer).unwrap();
        assert_eq!(buffer.as_slice(), expected);
    }
}
