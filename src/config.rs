use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// Tunables for one test system client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Budget for the engine to connect back (out-of-process only)
    pub handshake_timeout: Duration,
    /// Delay before watching for an early process exit
    pub early_termination_debounce: Duration,
    /// How often `start()` checks the handshake outcome
    pub poll_interval: Duration,
    /// Address the acceptor binds to
    pub bind_address: IpAddr,
    /// Host name handed to the engine as its first launch argument
    pub advertised_host: String,
    /// How long a connected engine may take to announce its ticket
    pub ticket_read_timeout: Duration,
    /// How long `kill()` waits for a killed process to be reaped
    pub kill_grace: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let bind_address = IpAddr::V4(Ipv4Addr::LOCALHOST);
        Self {
            handshake_timeout: Duration::from_secs(60),
            early_termination_debounce: Duration::from_millis(1000),
            poll_interval: Duration::from_millis(100),
            bind_address,
            advertised_host: bind_address.to_string(),
            ticket_read_timeout: Duration::from_secs(10),
            kill_grace: Duration::from_secs(5),
        }
    }
}

impl ClientConfig {
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_early_termination_debounce(mut self, debounce: Duration) -> Self {
        self.early_termination_debounce = debounce;
        self
    }

    /// Binds to `address` and advertises it to the engine.
    pub fn with_bind_address(mut self, address: IpAddr) -> Self {
        self.bind_address = address;
        self.advertised_host = address.to_string();
        self
    }
}
