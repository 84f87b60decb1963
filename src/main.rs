use config::environment_type::EnvironmentType;
/**
 * This module defines the main entry point for the stunward server and the server implementation.
 */
use slog::{info, Logger};
use std::sync::{Arc, Mutex};
use stun::auth::{AuthenticationType, Credential};
use stun::processor::StunMessageProcessor;
use stun::server::{Server, ServerOptions};

mod config;
mod logging;
mod net;
mod stun;
mod utils;

/**
 * Represents the context for the stunward server.
 *
 * Fields:
 * - `config`: The server configuration settings.
 * - `logger`: The server logger instance.
 */
#[derive(Debug)]
pub(crate) struct Context {
    pub(crate) config: config::Settings,
    pub(crate) logger: Logger,
}

pub struct StunwardServer {
    context: Arc<Context>,
}

impl StunwardServer {
    /**
     * Creates a new `StunwardServer` instance.
     *
     * This function initializes the server configuration and logger, and creates
     * a new `StunwardServer` instance with the initialized context.
     *
     * @return An `Arc` containing the new `StunwardServer` instance.
     */
    pub fn new() -> Arc<Self> {
        let cfg = config::Settings::new().expect("Failed to load configuration");

        let context = Context {
            config: cfg.clone(),
            logger: logging::init_logger(&cfg),
        };

        Arc::new(Self {
            context: Arc::new(context),
        })
    }

    /**
     * Build the STUN state machine from the configuration.
     *
     * In the development environment a demo user is registered so the server
     * can be exercised without provisioning credentials; production
     * deployments embed the crate and register real users.
     */
    fn build_stun_server(&self) -> Server {
        let cfg = &self.context.config;
        let mut server = Server::new(ServerOptions {
            authentication_type: cfg.auth,
            realm: cfg.realm.clone(),
            software_name: cfg.software_name.clone(),
            logger: self.context.logger.clone(),
            ..ServerOptions::default()
        });

        if cfg.environment == EnvironmentType::development {
            match cfg.auth {
                AuthenticationType::ShortTerm => server.register_user(
                    "user",
                    Credential::ShortTerm {
                        password: "demo".to_string(),
                    },
                ),
                AuthenticationType::LongTerm => server.register_user(
                    "user",
                    Credential::LongTerm {
                        username: "user".to_string(),
                        realm: cfg.realm.clone(),
                        password: "demo".to_string(),
                    },
                ),
                AuthenticationType::None => {}
            }
        }

        server
    }

    /**
     * Run the stunward server.
     *
     * This function sets up the TCP and UDP listeners based on the configuration,
     * and starts the server to handle incoming connections. It blocks until
     * terminated or both threads exit
     *
     * @return A `Result` indicating success or failure.
     */
    pub async fn run(self: Arc<Self>) -> Result<(), Box<dyn std::error::Error>> {
        let mut handles = vec![];

        info!(self.context.logger, "Starting STUN server");

        let stun_server = Arc::new(Mutex::new(self.build_stun_server()));
        let stun_processor = StunMessageProcessor::new(&self.context, stun_server);
        let network_server = net::NetworkServer::new(&self.context, stun_processor);

        if !self.context.config.disable_tcp {
            let tcp_handle = network_server.setup_tcp_listener()?;
            handles.push(tcp_handle);
        }

        if !self.context.config.disable_udp {
            let udp_handle = network_server.setup_udp_listener()?;
            handles.push(udp_handle);
        }

        // Join handles
        for handle in handles {
            handle.await.unwrap();
        }
        Ok(())
    }
}

/**
 * The main entry point for the application, it creates
 * the server object and passes control to it.
 */
#[tokio::main]
async fn main() {
    let server = StunwardServer::new();
    _ = server.run().await;
}
