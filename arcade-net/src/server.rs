use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use log::{error, info};
use tokio::net::{TcpListener, TcpSocket};
use tokio::task::JoinSet;
use tokio::time::sleep;

use crate::{config::ServerConfig, error::Error, network::Connection, Hook, HookNoop};

/// Unclassified accept failures in a row before the listening socket is
/// declared dead. Per-accept conditions never count toward this.
const MAX_CONSECUTIVE_ACCEPT_FAILURES: u32 = 64;

/// What an accept loop does after a failed accept.
#[derive(Debug, PartialEq, Eq)]
enum AcceptFailure {
    /// A single bad connection; keep accepting immediately.
    Transient,
    /// Unclassified failure; back off briefly, the listener may recover.
    Retry,
    /// The listening socket itself is unusable; stop and surface the error.
    Fatal,
}

fn classify_accept_failure(e: &io::Error, consecutive_failures: u32) -> AcceptFailure {
    // conditions one remote peer can cause on its own, e.g. aborting the
    // connection while it sits in the backlog
    let per_accept = matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    );
    if per_accept {
        AcceptFailure::Transient
    } else if consecutive_failures < MAX_CONSECUTIVE_ACCEPT_FAILURES {
        AcceptFailure::Retry
    } else {
        AcceptFailure::Fatal
    }
}

/// Front door of the engine: binds the listening socket and keeps the
/// configured number of accepts outstanding at all times.
pub struct Server {
    cfg: ServerConfig,
}

impl Server {
    pub fn new(cfg: ServerConfig) -> Self {
        Self { cfg }
    }

    pub async fn start(&self) -> Result<(), Error> {
        self.start_with_hook(Arc::new(HookNoop)).await
    }

    /// Runs until the listening socket fails; per-accept and per-connection
    /// errors are handled inside and never end the server.
    pub async fn start_with_hook<H: Hook>(&self, hook: Arc<H>) -> Result<(), Error> {
        let addr: SocketAddr = self.cfg.listen_addr.parse()?;
        let socket = match addr {
            SocketAddr::V4(_) => TcpSocket::new_v4()?,
            SocketAddr::V6(_) => TcpSocket::new_v6()?,
        };
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        let listener = Arc::new(socket.listen(self.cfg.backlog.max(100))?);
        info!("server listening on {}", addr);

        let mut acceptors = JoinSet::new();
        for _ in 0..self.cfg.accept_parallelism.max(1) {
            acceptors.spawn(accept_loop(listener.clone(), hook.clone()));
        }
        // a dead listener surfaces here; dropping the set stops the
        // remaining acceptors with it
        while let Some(joined) = acceptors.join_next().await {
            if let Ok(Err(e)) = joined {
                return Err(e);
            }
        }
        Ok(())
    }
}

/// One of the concurrently outstanding accepts. A failed accept is logged and
/// the loop keeps going at full parallelism; only a listening socket that
/// yields nothing but errors ends it.
async fn accept_loop<H: Hook>(listener: Arc<TcpListener>, hook: Arc<H>) -> Result<(), Error> {
    let mut consecutive_failures = 0u32;
    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                consecutive_failures += 1;
                match classify_accept_failure(&e, consecutive_failures) {
                    AcceptFailure::Transient => {
                        error!("accept error: {}", e);
                        continue;
                    }
                    AcceptFailure::Retry => {
                        // descriptor exhaustion lands here too; back off
                        error!("accept error: {}", e);
                        sleep(Duration::from_millis(10)).await;
                        continue;
                    }
                    AcceptFailure::Fatal => {
                        error!("listening socket failed: {}", e);
                        return Err(Error::Io(e));
                    }
                }
            }
        };
        consecutive_failures = 0;
        info!("accepted connection from {}", peer_addr);

        let hook = hook.clone();
        tokio::spawn(async move {
            let conn = Connection::new(stream, peer_addr, hook);
            let handle = conn.handle();
            if let Err(e) = conn.start().await {
                error!("connection {} exited: {}", handle.id(), e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn start_rejects_an_unparseable_listen_addr() {
        let server = Server::new(ServerConfig::new("not-an-address"));
        assert!(matches!(server.start().await, Err(Error::ListenAddr(_))));
    }

    #[test]
    fn per_accept_failures_never_end_the_loop() {
        let aborted = io::Error::from(io::ErrorKind::ConnectionAborted);
        assert_eq!(
            classify_accept_failure(&aborted, MAX_CONSECUTIVE_ACCEPT_FAILURES + 1),
            AcceptFailure::Transient
        );

        let interrupted = io::Error::from(io::ErrorKind::Interrupted);
        assert_eq!(
            classify_accept_failure(&interrupted, 1),
            AcceptFailure::Transient
        );
    }

    #[test]
    fn one_unclassified_failure_retries_with_backoff() {
        let unknown = io::Error::new(io::ErrorKind::Other, "transient glitch");
        assert_eq!(classify_accept_failure(&unknown, 1), AcceptFailure::Retry);
        assert_eq!(
            classify_accept_failure(&unknown, MAX_CONSECUTIVE_ACCEPT_FAILURES - 1),
            AcceptFailure::Retry
        );
    }

    #[test]
    fn a_listener_that_only_errors_becomes_fatal() {
        let broken = io::Error::new(io::ErrorKind::Other, "bad file descriptor");
        assert_eq!(
            classify_accept_failure(&broken, MAX_CONSECUTIVE_ACCEPT_FAILURES),
            AcceptFailure::Fatal
        );
    }
}
