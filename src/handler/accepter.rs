//! Accepter implementation for the Kapacitor UDF socket server.
//!
//! Every accepted Unix socket connection gets its own agent running a fresh
//! [`MacdHandler`].

use async_std::{
    os::unix::net::UnixStream,
    sync::{Arc, Mutex},
    task,
};
use async_trait::async_trait;
use kapacitor_udf::{agent::Agent, traits::AccepterTrait};
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::{debug, error, info};

use crate::handler::{config::MacdOptions, macd_handler::MacdHandler};

/// An accepter for new UDF connections.
#[derive(Debug)]
pub struct Accepter {
    /// Counter for the number of connections accepted.
    count: Arc<AtomicI64>,
    /// Options each new handler starts with until Kapacitor sends an init.
    defaults: MacdOptions,
}

impl Accepter {
    /// Creates a new `Accepter`.
    ///
    /// # Arguments
    ///
    /// * `defaults` - Options every new handler starts from. Kapacitor's
    ///   `InitRequest` only overrides the options the TICKscript sets.
    ///
    /// # Returns
    ///
    /// An `Accepter` with the connection count initialized to 0.
    pub fn new(defaults: MacdOptions) -> Self {
        Accepter {
            count: Arc::new(AtomicI64::new(0)),
            defaults,
        }
    }

    /// Number of connections accepted so far.
    pub fn connections(&self) -> i64 {
        self.count.load(Ordering::SeqCst)
    }
}

impl Default for Accepter {
    fn default() -> Self {
        Self::new(MacdOptions::default())
    }
}

#[async_trait]
impl AccepterTrait for Accepter {
    /// Sets up an agent with a [`MacdHandler`] for `stream` and spawns it.
    ///
    /// # Arguments
    ///
    /// * `stream` - The Unix stream for the new connection.
    fn accept(&self, stream: UnixStream) {
        let count = self.count.fetch_add(1, Ordering::SeqCst);
        debug!("Accept() called, connection count: {}", count);

        let mut agent = Agent::new(Box::new(stream.clone()), Box::new(stream));
        let responses = agent.responses().clone();

        let handler = Box::new(MacdHandler::new(responses, self.defaults.clone()));
        agent.set_handler(Some(handler));

        let agent = Arc::new(Mutex::new(agent));

        info!("Starting agent for connection {}", count);

        task::spawn(async move {
            if let Err(e) = agent.lock().await.start() {
                error!("Agent for connection {} finished with error: {}", count, e);
                std::process::exit(1);
            }
            info!("Agent for connection {} finished", count);
        });
    }
}
