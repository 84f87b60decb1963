/**
 * The STUN server state machine.
 *
 * `handle_message` runs the pre-authentication checks, dispatches by message
 * class, walks the authentication branch configured for the server, and
 * produces either a response message, a silent success, or a discard signal.
 * Semantic failures never surface as errors to the caller; they become STUN
 * error responses or discards.
 */
use std::collections::HashMap;
use std::net::SocketAddr;

use slog::{debug, o, Logger};

use crate::stun::attributes::{
    is_comprehension_required, is_known, Attribute, ErrorCode, NonceAttribute,
    PasswordAlgorithmParams, PasswordAlgorithms, Realm, Software, UnknownAttributes, Username,
    XorMappedAddress, ALGORITHM_MD5, ALGORITHM_SHA256,
};
use crate::stun::auth::{AuthenticationType, Credential};
use crate::stun::builder::MessageBuilder;
use crate::stun::error_code::*;
use crate::stun::message::{IntegrityKind, Message, MessageClass, Method};
use crate::stun::nonce::{Clock, Nonce, NonceManager, SecurityFeatures, SystemClock};
use crate::stun::{attribute_type, SOFTWARE};

/**
 * Outcome of `handle_message`: drop the message silently, accept it without
 * a reply, or send the returned message back to the source.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MessageResult {
    Discard,
    Ok,
    Response(Message),
}

/**
 * Server construction knobs. `algorithms` is the PASSWORD-ALGORITHMS offer
 * for long-term authentication, in preference order.
 */
pub(crate) struct ServerOptions {
    pub authentication_type: AuthenticationType,
    pub realm: String,
    pub algorithms: Vec<PasswordAlgorithmParams>,
    pub software_name: String,
    pub logger: Logger,
    pub clock: Box<dyn Clock>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        ServerOptions {
            authentication_type: AuthenticationType::None,
            realm: "default".to_string(),
            algorithms: vec![
                PasswordAlgorithmParams::new(ALGORITHM_MD5),
                PasswordAlgorithmParams::new(ALGORITHM_SHA256),
            ],
            software_name: SOFTWARE.to_string(),
            logger: Logger::root(slog::Discard, o!()),
            clock: Box::new(SystemClock),
        }
    }
}

/// security features advertised by challenges that carry the algorithm offer
const CHALLENGE_FEATURES: SecurityFeatures = SecurityFeatures {
    password_algorithms: true,
    username_anonymity: false,
};

/// how an authentication branch cut the request short
enum Rejection {
    Respond(Message),
    Discard,
}

/// positions of the authentication-relevant attributes, recorded in one scan
#[derive(Default)]
struct AttributeIndices {
    username: Option<usize>,
    userhash: Option<usize>,
    realm: Option<usize>,
    nonce: Option<usize>,
    password_algorithm: Option<usize>,
    password_algorithms: Option<usize>,
    message_integrity: Option<usize>,
    message_integrity_sha256: Option<usize>,
}

impl AttributeIndices {
    fn scan(message: &Message) -> Self {
        let mut indices = AttributeIndices::default();
        for (index, attribute) in message.attributes.iter().enumerate() {
            let slot = match attribute.typ {
                attribute_type::ATTR_USERNAME => &mut indices.username,
                attribute_type::ATTR_USERHASH => &mut indices.userhash,
                attribute_type::ATTR_REALM => &mut indices.realm,
                attribute_type::ATTR_NONCE => &mut indices.nonce,
                attribute_type::ATTR_PASSWORD_ALGORITHM => &mut indices.password_algorithm,
                attribute_type::ATTR_PASSWORD_ALGORITHMS => &mut indices.password_algorithms,
                attribute_type::ATTR_MESSAGE_INTEGRITY => &mut indices.message_integrity,
                attribute_type::ATTR_MESSAGE_INTEGRITY_SHA256 => {
                    &mut indices.message_integrity_sha256
                }
                _ => continue,
            };
            slot.get_or_insert(index);
        }
        indices
    }

    /// the strongest integrity attribute present, and its position
    fn integrity(&self) -> Option<(IntegrityKind, usize)> {
        match (self.message_integrity_sha256, self.message_integrity) {
            (Some(index), _) => Some((IntegrityKind::Sha256, index)),
            (None, Some(index)) => Some((IntegrityKind::Sha1, index)),
            (None, None) => None,
        }
    }
}

/**
 * Binding is the only method this server speaks, and it is legal in every
 * class. Anything else is dropped before authentication.
 */
fn is_method_allowed_for_class(method: Method, class: MessageClass) -> bool {
    match (method, class) {
        (Method::Binding, _) => true,
    }
}

pub(crate) struct Server {
    authentication_type: AuthenticationType,
    realm: String,
    algorithms: Vec<PasswordAlgorithmParams>,
    software_name: String,
    logger: Logger,
    clock: Box<dyn Clock>,
    users: HashMap<String, Credential>,
    nonces: NonceManager,
}

impl Server {
    pub fn new(options: ServerOptions) -> Self {
        Server {
            authentication_type: options.authentication_type,
            realm: options.realm,
            algorithms: options.algorithms,
            software_name: options.software_name,
            logger: options.logger,
            clock: options.clock,
            users: HashMap::new(),
            nonces: NonceManager::new(),
        }
    }

    /**
     * Register a credential for `username`, replacing and dropping any prior
     * record. The credential is stored by value; callers keep their copies.
     */
    pub fn register_user(&mut self, username: &str, credential: Credential) {
        self.users.insert(username.to_string(), credential);
    }

    /**
     * Process one decoded message from `source`.
     */
    pub fn handle_message(&mut self, message: &Message, source: SocketAddr) -> MessageResult {
        if !is_method_allowed_for_class(message.method, message.class) {
            debug!(
                self.logger,
                "[{}] method {:?} not allowed for class {:?}, discarding",
                hex::encode(message.transaction_id),
                message.method,
                message.class
            );
            return MessageResult::Discard;
        }

        if !message.check_fingerprint() {
            debug!(
                self.logger,
                "[{}] fingerprint mismatch from {}, discarding",
                hex::encode(message.transaction_id),
                source
            );
            return MessageResult::Discard;
        }

        match message.class {
            MessageClass::Request => self.handle_request(message, source),
            MessageClass::Indication => self.handle_indication(message, source),
            MessageClass::SuccessResponse | MessageClass::ErrorResponse => MessageResult::Discard,
        }
    }

    fn handle_request(&mut self, message: &Message, source: SocketAddr) -> MessageResult {
        let unknown: Vec<u16> = message
            .attributes
            .iter()
            .filter(|a| is_comprehension_required(a.typ) && !is_known(a.typ))
            .map(|a| a.typ)
            .collect();
        if !unknown.is_empty() {
            debug!(
                self.logger,
                "[{}] {} unknown comprehension-required attributes from {}",
                hex::encode(message.transaction_id),
                unknown.len(),
                source
            );
            let extra = vec![UnknownAttributes(unknown).into_attribute()];
            return self.respond_error(
                message,
                ERROR_CODE_UNKNOWN_ATTRIBUTE,
                "Unknown comprehension-required attributes",
                extra,
            );
        }

        let indices = AttributeIndices::scan(message);

        let credentials = match self.authentication_type {
            AuthenticationType::None => None,
            AuthenticationType::ShortTerm => {
                match self.authenticate_short_term(message, &indices) {
                    Ok(credentials) => Some(credentials),
                    Err(Rejection::Respond(response)) => return MessageResult::Response(response),
                    Err(Rejection::Discard) => return MessageResult::Discard,
                }
            }
            AuthenticationType::LongTerm => {
                match self.authenticate_long_term(message, &indices, source) {
                    Ok(credentials) => Some(credentials),
                    Err(Rejection::Respond(response)) => return MessageResult::Response(response),
                    Err(Rejection::Discard) => return MessageResult::Discard,
                }
            }
        };

        let mut builder = MessageBuilder::new();
        builder
            .set_class(MessageClass::SuccessResponse)
            .set_method(Method::Binding)
            .set_transaction_id(message.transaction_id)
            .add_attribute(XorMappedAddress(source).into_attribute(&message.transaction_id))
            .add_attribute(Software(self.software_name.clone()).into_attribute());
        if let Some((key, kind)) = credentials {
            match kind {
                IntegrityKind::Sha1 => builder.add_message_integrity(&key),
                IntegrityKind::Sha256 => builder.add_message_integrity_sha256(&key),
            };
        }
        builder.add_fingerprint();

        match builder.build() {
            Ok(response) => {
                debug!(
                    self.logger,
                    "[{}] binding success for {}",
                    hex::encode(message.transaction_id),
                    source
                );
                MessageResult::Response(response)
            }
            Err(_) => MessageResult::Discard,
        }
    }

    /**
     * Indications are recognized and fingerprint-checked like any other
     * message, but the binding indication carries no obligations for a
     * server. Hook for transports that want keepalive accounting.
     */
    fn handle_indication(&mut self, message: &Message, source: SocketAddr) -> MessageResult {
        debug!(
            self.logger,
            "[{}] indication from {}",
            hex::encode(message.transaction_id),
            source
        );
        MessageResult::Ok
    }

    /**
     * Short-term branch: the request must carry USERNAME and an integrity
     * attribute keyed with the registered password.
     */
    fn authenticate_short_term(
        &mut self,
        message: &Message,
        indices: &AttributeIndices,
    ) -> Result<(Vec<u8>, IntegrityKind), Rejection> {
        let (kind, integrity_index) = match indices.integrity() {
            Some(integrity) => integrity,
            None => return Err(self.reject(message, ERROR_CODE_BAD_REQUEST, "Bad Request", vec![])),
        };

        let username_index = match indices.username {
            Some(index) => index,
            None => return Err(self.reject(message, ERROR_CODE_BAD_REQUEST, "Bad Request", vec![])),
        };
        let username = match Username::decode(&message.attributes[username_index]) {
            Ok(username) => username,
            Err(_) => return Err(self.reject(message, ERROR_CODE_BAD_REQUEST, "Bad Request", vec![])),
        };

        let credential = match self.users.get(&username.0) {
            Some(credential) => credential.clone(),
            None => {
                debug!(
                    self.logger,
                    "[{}] unknown user {:?}",
                    hex::encode(message.transaction_id),
                    username.0
                );
                return Err(self.reject(
                    message,
                    ERROR_CODE_UNAUTHENTICATED,
                    "Unauthenticated",
                    vec![],
                ));
            }
        };

        let key = credential.compute_key();
        match message.check_message_integrity(kind, integrity_index, &key) {
            Ok(true) => Ok((key, kind)),
            Ok(false) => Err(self.reject(
                message,
                ERROR_CODE_UNAUTHENTICATED,
                "Unauthenticated",
                vec![],
            )),
            Err(_) => Err(Rejection::Discard),
        }
    }

    /**
     * Long-term branch: challenge-response with REALM and NONCE, optional
     * password-algorithm negotiation gated by the nonce's security features.
     */
    fn authenticate_long_term(
        &mut self,
        message: &Message,
        indices: &AttributeIndices,
        source: SocketAddr,
    ) -> Result<(Vec<u8>, IntegrityKind), Rejection> {
        let (kind, integrity_index) = match indices.integrity() {
            Some(integrity) => integrity,
            None => {
                // first contact: challenge with a nonce carrying no feature bits
                let extra = self.challenge_attributes(source, SecurityFeatures::default());
                return Err(self.reject(
                    message,
                    ERROR_CODE_UNAUTHENTICATED,
                    "Unauthenticated",
                    extra,
                ));
            }
        };

        if (indices.username.is_none() && indices.userhash.is_none())
            || indices.realm.is_none()
            || indices.nonce.is_none()
        {
            return Err(self.reject(message, ERROR_CODE_BAD_REQUEST, "Bad Request", vec![]));
        }
        // USERHASH in place of USERNAME is recognized but not accepted
        let username_index = match indices.username {
            Some(index) => index,
            None => return Err(self.reject(message, ERROR_CODE_BAD_REQUEST, "Bad Request", vec![])),
        };
        let nonce_index = match indices.nonce {
            Some(index) => index,
            None => return Err(self.reject(message, ERROR_CODE_BAD_REQUEST, "Bad Request", vec![])),
        };

        let nonce = match Nonce::parse(&message.attributes[nonce_index].data) {
            Ok(nonce) => nonce,
            Err(_) => return Err(self.reject_stale(message, source)),
        };

        // a nonce that advertised algorithm negotiation requires the client to
        // echo both PASSWORD-ALGORITHMS and its PASSWORD-ALGORITHM choice, or neither
        let has_algorithm = indices.password_algorithm.is_some();
        let has_algorithms = indices.password_algorithms.is_some();
        if nonce.features.password_algorithms && has_algorithm != has_algorithms {
            return Err(self.reject(message, ERROR_CODE_BAD_REQUEST, "Bad Request", vec![]));
        }

        if let Some(index) = indices.password_algorithms {
            let offered = match PasswordAlgorithms::decode(&message.attributes[index]) {
                Ok(offered) => offered,
                Err(_) => {
                    return Err(self.reject(message, ERROR_CODE_BAD_REQUEST, "Bad Request", vec![]))
                }
            };
            if offered.0 != self.algorithms {
                return Err(self.reject(message, ERROR_CODE_BAD_REQUEST, "Bad Request", vec![]));
            }
        }

        if let Some(index) = indices.password_algorithm {
            let chosen = match PasswordAlgorithmParams::decode(&message.attributes[index]) {
                Ok(chosen) => chosen,
                Err(_) => {
                    return Err(self.reject(message, ERROR_CODE_BAD_REQUEST, "Bad Request", vec![]))
                }
            };
            if !self.algorithms.contains(&chosen) {
                return Err(self.reject(message, ERROR_CODE_BAD_REQUEST, "Bad Request", vec![]));
            }
        }

        let username = match Username::decode(&message.attributes[username_index]) {
            Ok(username) => username,
            Err(_) => return Err(self.reject(message, ERROR_CODE_BAD_REQUEST, "Bad Request", vec![])),
        };
        let credential = match self.users.get(&username.0) {
            Some(credential) => credential.clone(),
            None => {
                debug!(
                    self.logger,
                    "[{}] unknown user {:?}",
                    hex::encode(message.transaction_id),
                    username.0
                );
                let mut extra = self.challenge_attributes(source, CHALLENGE_FEATURES);
                extra.push(PasswordAlgorithms(self.algorithms.clone()).into_attribute());
                return Err(self.reject(
                    message,
                    ERROR_CODE_UNAUTHENTICATED,
                    "Unauthenticated",
                    extra,
                ));
            }
        };

        // the key stays MD5-derived regardless of the negotiated algorithm;
        // negotiation gates the request shape only
        let key = credential.compute_key();
        match message.check_message_integrity(kind, integrity_index, &key) {
            Ok(true) => {}
            Ok(false) => {
                let extra = self.challenge_attributes(source, SecurityFeatures::default());
                return Err(self.reject(
                    message,
                    ERROR_CODE_UNAUTHENTICATED,
                    "Unauthenticated",
                    extra,
                ));
            }
            Err(_) => return Err(Rejection::Discard),
        }

        // a nonce is valid only while unexpired and matching the feature bits
        // the server currently emits for authenticated long-term requests
        let now = self.clock.now_micros();
        if nonce.validity < now || nonce.features != CHALLENGE_FEATURES {
            return Err(self.reject_stale(message, source));
        }

        Ok((key, kind))
    }

    /// REALM plus the client's current nonce, minted or refreshed as needed
    fn challenge_attributes(
        &mut self,
        source: SocketAddr,
        features: SecurityFeatures,
    ) -> Vec<Attribute> {
        let now = self.clock.now_micros();
        let nonce = self.nonces.get_or_update(source, features, now);
        vec![
            Realm(self.realm.clone()).into_attribute(),
            NonceAttribute(nonce.encode().to_vec()).into_attribute(),
        ]
    }

    fn reject_stale(&mut self, message: &Message, source: SocketAddr) -> Rejection {
        let mut extra = self.challenge_attributes(source, CHALLENGE_FEATURES);
        extra.push(PasswordAlgorithms(self.algorithms.clone()).into_attribute());
        self.reject(message, ERROR_CODE_STALE_NONCE, "Stale Nonce", extra)
    }

    fn reject(
        &self,
        message: &Message,
        code: u16,
        reason: &str,
        extra: Vec<Attribute>,
    ) -> Rejection {
        match self.error_message(message, code, reason, extra) {
            Some(response) => Rejection::Respond(response),
            None => Rejection::Discard,
        }
    }

    fn respond_error(
        &self,
        message: &Message,
        code: u16,
        reason: &str,
        extra: Vec<Attribute>,
    ) -> MessageResult {
        match self.error_message(message, code, reason, extra) {
            Some(response) => MessageResult::Response(response),
            None => MessageResult::Discard,
        }
    }

    fn error_message(
        &self,
        message: &Message,
        code: u16,
        reason: &str,
        extra: Vec<Attribute>,
    ) -> Option<Message> {
        let mut builder = MessageBuilder::new();
        builder
            .set_class(MessageClass::ErrorResponse)
            .set_method(Method::Binding)
            .set_transaction_id(message.transaction_id)
            .add_attribute(ErrorCode::new(code, reason).into_attribute());
        for attribute in extra {
            builder.add_attribute(attribute);
        }
        builder.add_attribute(Software(self.software_name.clone()).into_attribute());
        builder.build().ok()
    }
}
