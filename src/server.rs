//! SMTP Gateway Server
//!
//! Accepts SMTP connections and runs one [`Session`] per connection.

use crate::config::GatewayConfig;
use crate::proto::LineCodec;
use crate::session::{Session, Step};
use crate::store::EnvelopeStore;
use futures_util::{SinkExt, StreamExt};
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_util::codec::Framed;
use tracing::{Instrument, debug, info, info_span, trace, warn};

/// Pause after a failed accept before trying again
pub const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Gateway state shared by every connection task
#[derive(Clone)]
pub struct Gateway {
    config: GatewayConfig,
    store: Arc<dyn EnvelopeStore>,
}

impl Gateway {
    /// Create a new gateway handing envelopes to `store`
    pub fn new(config: GatewayConfig, store: Arc<dyn EnvelopeStore>) -> Self {
        Self { config, store }
    }

    /// Bind the configured address and serve forever
    pub async fn run(&self) -> anyhow::Result<()> {
        let addr = self.config.bind_addr()?;
        let listener = TcpListener::bind(&addr).await?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> anyhow::Result<()> {
        info!("SMTP Gateway listening on {}", listener.local_addr()?);
        info!("Server name: {}", self.config.server_name);

        loop {
            let Some((stream, addr)) = accept_or_back_off(listener.accept()).await else {
                continue;
            };

            let session = self.new_session();
            let span = info_span!("connection", id = %ulid::Ulid::new(), peer = %addr);

            tokio::spawn(
                async move {
                    info!("Connection established");
                    match handle_connection(stream, session).await {
                        Ok(()) => info!("Connection closed"),
                        Err(e) => debug!("Connection error: {:#}", e),
                    }
                }
                .instrument(span),
            );
        }
    }

    /// A fresh session sharing this gateway's store
    pub fn new_session(&self) -> Session {
        Session::new(self.config.server_name.clone(), Arc::clone(&self.store))
    }
}

/// Await one accept. On failure, log it and wait [`ACCEPT_RETRY_DELAY`]
/// so persistent errors (descriptor exhaustion) don't spin the loop.
async fn accept_or_back_off<T>(accept: impl Future<Output = io::Result<T>>) -> Option<T> {
    match accept.await {
        Ok(accepted) => Some(accepted),
        Err(e) => {
            warn!("Accept failed: {}", e);
            tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
            None
        }
    }
}

/// Drive one session over a byte stream until QUIT or end of stream.
///
/// Each response is flushed before the next line is read, so replies leave
/// in the same order as the commands that caused them.
pub async fn handle_connection<S>(stream: S, mut session: Session) -> anyhow::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut framed = Framed::new(stream, LineCodec::new());
    framed.send(session.banner()).await?;

    while let Some(line) = framed.next().await {
        let line = line?;
        trace!("Client: {}", line);

        match session.handle_line(&line) {
            Step::Reply(response) => framed.send(response).await?,
            Step::ReplyAndClose(response) => {
                framed.send(response).await?;
                framed.close().await?;
                debug!("Closed after QUIT");
                return Ok(());
            }
            Step::Silent => {}
        }
    }

    debug!("Client disconnected");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn exchange(input: &[u8]) -> (String, MemoryStore) {
        let store = MemoryStore::new();
        let gateway = Gateway::new(GatewayConfig::default(), Arc::new(store.clone()));

        let (mut client, server) = tokio::io::duplex(4096);
        let task = tokio::spawn(handle_connection(server, gateway.new_session()));

        client.write_all(input).await.unwrap();
        let mut output = String::new();
        client.read_to_string(&mut output).await.unwrap();
        task.await.unwrap().unwrap();

        (output, store)
    }

    #[tokio::test]
    async fn test_pipelined_commands_answered_in_order() {
        let (output, store) = exchange(
            b"HELO\r\nMAIL FROM:<a@x>\r\nRCPT TO:<b@y>\r\nDATA\r\nhi\r\n.\r\nNOOP\r\nQUIT\r\n",
        )
        .await;

        let codes: Vec<&str> = output.lines().map(|l| &l[..3]).collect();
        assert_eq!(codes, ["220", "250", "250", "250", "354", "250", "250", "221"]);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_quit_stops_reading() {
        let (output, _) = exchange(b"QUIT\r\nNOOP\r\n").await;
        assert_eq!(output, "220 localhost ready\r\n221 Bye\r\n");
    }

    #[tokio::test]
    async fn test_failed_accept_waits_before_retry() {
        let started = tokio::time::Instant::now();
        let accepted = accept_or_back_off(async {
            Err::<(), _>(io::Error::other("too many open files"))
        })
        .await;

        assert!(accepted.is_none());
        assert!(started.elapsed() >= ACCEPT_RETRY_DELAY);
    }

    #[tokio::test]
    async fn test_successful_accept_does_not_wait() {
        let started = tokio::time::Instant::now();
        let accepted = accept_or_back_off(async { Ok::<_, io::Error>(7) }).await;

        assert_eq!(accepted, Some(7));
        assert!(started.elapsed() < ACCEPT_RETRY_DELAY);
    }
}
