use std::fmt;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::Result;

/// Test table dialect an engine speaks once connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    Fit,
    Slim,
}

impl Dialect {
    /// Registry identifier for the out-of-process flavour.
    pub fn identifier(self) -> &'static str {
        match self {
            Dialect::Fit => "fit",
            Dialect::Slim => "slim",
        }
    }

    pub fn adapter(self) -> Box<dyn ProtocolAdapter> {
        match self {
            Dialect::Fit => Box::new(FitAdapter::default()),
            Dialect::Slim => Box::new(SlimAdapter::default()),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identifier())
    }
}

/// Owns the accepted channel on behalf of the dialect's protocol layer.
///
/// The session payload itself is opaque here; an adapter only knows how to
/// take the channel over and how to tell the engine the session is over.
#[async_trait]
pub trait ProtocolAdapter: Send {
    fn dialect(&self) -> Dialect;

    fn attach(&mut self, channel: TcpStream);

    fn channel(&mut self) -> Option<&mut TcpStream>;

    /// Sends the dialect's end-of-session marker and shuts down the write
    /// half. Does nothing if no channel was attached.
    async fn finish(&mut self) -> Result<()>;
}

async fn send_closing(channel: Option<TcpStream>, marker: &[u8], dialect: Dialect) -> Result<()> {
    let Some(mut channel) = channel else {
        return Ok(());
    };
    channel.write_all(marker).await?;
    channel.flush().await?;
    channel.shutdown().await?;
    debug!(%dialect, "end of session sent to engine");
    Ok(())
}

/// FIT: documents are length-prefixed; a zero length ends the session.
#[derive(Debug, Default)]
pub struct FitAdapter {
    channel: Option<TcpStream>,
}

impl FitAdapter {
    pub const END_OF_DOCUMENTS: &'static [u8] = b"0000000000";
}

#[async_trait]
impl ProtocolAdapter for FitAdapter {
    fn dialect(&self) -> Dialect {
        Dialect::Fit
    }

    fn attach(&mut self, channel: TcpStream) {
        self.channel = Some(channel);
    }

    fn channel(&mut self) -> Option<&mut TcpStream> {
        self.channel.as_mut()
    }

    async fn finish(&mut self) -> Result<()> {
        send_closing(self.channel.take(), Self::END_OF_DOCUMENTS, Dialect::Fit).await
    }
}

/// Slim: length-prefixed instructions; `bye` ends the session.
#[derive(Debug, Default)]
pub struct SlimAdapter {
    channel: Option<TcpStream>,
}

impl SlimAdapter {
    pub const BYE: &'static [u8] = b"000003:bye";
}

#[async_trait]
impl ProtocolAdapter for SlimAdapter {
    fn dialect(&self) -> Dialect {
        Dialect::Slim
    }

    fn attach(&mut self, channel: TcpStream) {
        self.channel = Some(channel);
    }

    fn channel(&mut self) -> Option<&mut TcpStream> {
        self.channel.as_mut()
    }

    async fn finish(&mut self) -> Result<()> {
        send_closing(self.channel.take(), Self::BYE, Dialect::Slim).await
    }
}
