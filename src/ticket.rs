use std::fmt;

use rand::Rng;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::debug;

/// Query parameter accepted in request-line style announcements.
const TICKET_PARAM: &str = "ticket=";

/// Correlation token binding a launched engine to the client that launched it.
///
/// Checked by plain equality on the first line the engine sends after
/// connecting. It is not a secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket(u32);

impl Ticket {
    pub fn new(value: u32) -> Self {
        Self(value)
    }

    /// Generates a fresh ticket in `1..=0xFFFF`.
    pub fn generate() -> Self {
        Self(rand::thread_rng().gen_range(1..=0xFFFF))
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    /// Parses an engine announcement.
    ///
    /// Accepts either a bare decimal (`3863`) or a line carrying a
    /// `ticket=<n>` parameter, such as `GET /?responder=socketCatcher&ticket=3863 HTTP/1.1`.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if let Ok(value) = line.parse::<u32>() {
            return Some(Self(value));
        }

        let start = line.find(TICKET_PARAM)? + TICKET_PARAM.len();
        let digits: String = line[start..]
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        digits.parse().ok().map(Self)
    }

    /// The line an engine writes right after connecting.
    pub fn announcement(&self) -> String {
        format!("{}\n", self.0)
    }
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Engine side of the handshake: connect to the launching client and announce
/// the ticket. The returned stream carries the session payload afterwards.
pub async fn announce(host: &str, port: u16, ticket: Ticket) -> std::io::Result<TcpStream> {
    let mut stream = TcpStream::connect((host, port)).await?;
    stream.write_all(ticket.announcement().as_bytes()).await?;
    stream.flush().await?;
    debug!(host, port, %ticket, "announced ticket to test system client");
    Ok(stream)
}
