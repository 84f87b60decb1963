/**
 * A message processor bridging raw datagrams and the STUN core.
 *
 * The network layer hands in bytes; the processor decodes them with the
 * message codec, runs the server state machine, and serializes any response.
 * Messages that fail to decode are logged and dropped here, so the server
 * only ever sees fully decoded messages.
 */
use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use slog::{debug, trace};

use crate::stun::message::Message;
use crate::stun::server::{MessageResult, Server};
use crate::{utils, Context};

/**
 * This trait defines an asynchronous method for processing STUN messages and
 * generating responses.
 */
#[async_trait]
pub trait MessageProcessor {
    async fn process_message(
        &self,
        input: &[u8],
        client_addr: Option<SocketAddr>,
        output: &mut [u8],
    ) -> Result<usize, Box<dyn std::error::Error>>;
}

/**
 * Implement the `MessageProcessor` trait for handling STUN messages.
 *
 * The server holds per-client nonce state, so it sits behind a mutex shared
 * by the TCP and UDP listener tasks.
 */
#[derive(Clone)]
pub(crate) struct StunMessageProcessor {
    context: Arc<Context>,
    server: Arc<Mutex<Server>>,
}

impl StunMessageProcessor {
    /**
     * Creates a new `StunMessageProcessor` instance.
     *
     * @param context The server context containing configuration and logger.
     * @param server The shared STUN server state machine.
     * @return A new `StunMessageProcessor` instance.
     */
    pub fn new(context: &Arc<Context>, server: Arc<Mutex<Server>>) -> Self {
        Self {
            context: Arc::clone(context),
            server,
        }
    }
}

#[async_trait]
impl MessageProcessor for StunMessageProcessor {
    /**
     * Processes a STUN message and generates a response.
     *
     * @param input The input byte slice containing the STUN message.
     * @param client_addr The optional client address (present for UDP, may be None for TCP).
     * @param output The buffer to write the response into.
     * @return A `Result` containing the number of bytes written to the output buffer, or an error.
     *         Zero bytes means no response should be sent.
     */
    async fn process_message(
        &self,
        input: &[u8],
        client_addr: Option<SocketAddr>,
        output: &mut [u8],
    ) -> Result<usize, Box<dyn std::error::Error>> {
        let message = match Message::read(&mut Cursor::new(input)) {
            Ok(message) => message,
            Err(e) => {
                debug!(self.context.logger, "Failed to decode message: {}", e);
                return Ok(0);
            }
        };

        trace!(
            self.context.logger,
            "-->-- [{}]: {}",
            hex::encode(message.transaction_id),
            utils::hex_encode_delimited(input)
        );

        let client_addr = match client_addr {
            Some(addr) => addr,
            None => {
                debug!(
                    self.context.logger,
                    "Cannot determine client address, dropping message"
                );
                return Ok(0);
            }
        };

        let result = {
            let mut server = self.server.lock().unwrap();
            server.handle_message(&message, client_addr)
        };

        match result {
            MessageResult::Response(response) => {
                let mut cursor = Cursor::new(output);
                response.write(&mut cursor)?;
                let count = cursor.position() as usize;
                trace!(
                    self.context.logger,
                    "--<-- [{}]: {}",
                    hex::encode(response.transaction_id),
                    utils::hex_encode_delimited(&cursor.get_ref()[..count])
                );
                Ok(count)
            }
            MessageResult::Ok | MessageResult::Discard => Ok(0),
        }
    }
}
