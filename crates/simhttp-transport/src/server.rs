use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use simhttp_core::{HandlerRegistry, HttpError, Result, ServerBuilder, ServerConfig};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;

use crate::connection::{serve_connection, ConnectionSettings};
use crate::dispatcher::RequestDispatcher;
use crate::poll::PollWorkerPool;
use crate::tls::load_acceptor;

const LISTEN_BACKLOG: i32 = 1024;

struct Running {
    local_addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    accept_task: JoinHandle<()>,
    pool: Arc<PollWorkerPool>,
}

/// The listening side of the region HTTP server.
///
/// Owns the socket, the poll pool and the accept loop. Handlers live in the
/// shared [`HandlerRegistry`] and can be added or removed while it runs.
pub struct HttpServer {
    config: ServerConfig,
    registry: Arc<HandlerRegistry>,
    running: Mutex<Option<Running>>,
}

impl HttpServer {
    pub fn new(config: ServerConfig, registry: Arc<HandlerRegistry>) -> Self {
        Self {
            config,
            registry,
            running: Mutex::new(None),
        }
    }

    pub fn from_builder(builder: ServerBuilder) -> Self {
        Self::new(builder.config, builder.registry)
    }

    /// Binds the listener and starts serving. Returns the bound address.
    ///
    /// Calling `start` on a running server returns the existing address.
    /// Concurrent callers are serialized on the state lock, so only one of
    /// them binds.
    pub async fn start(&self) -> Result<SocketAddr> {
        let mut slot = self.running.lock();
        if let Some(running) = slot.as_ref() {
            return Ok(running.local_addr);
        }
        let running = self.launch()?;
        let local_addr = running.local_addr;
        *slot = Some(running);
        tracing::info!("Listening on {}", local_addr);
        Ok(local_addr)
    }

    /// Validates, binds and spawns the accept loop. Runs under the state lock
    /// and must not await.
    fn launch(&self) -> Result<Running> {
        self.config.validate()?;

        let scheme = if self.config.secure { "HTTPS" } else { "HTTP" };
        tracing::info!("Starting {} server on port {}", scheme, self.config.port);

        let acceptor = match self.config.tls.as_ref().filter(|_| self.config.secure) {
            Some(tls) => Some(load_acceptor(tls).map_err(|e| {
                tracing::error!("Failed to set up TLS for port {}: {}", self.config.port, e);
                e
            })?),
            None => None,
        };

        let listener = self.bind()?;
        let local_addr = listener.local_addr()?;

        let pool = Arc::new(PollWorkerPool::new(&self.config));
        pool.start();

        let dispatcher = Arc::new(RequestDispatcher::new(
            self.registry.clone(),
            pool.clone(),
            &self.config,
        ));
        let settings = Arc::new(ConnectionSettings {
            dispatcher,
            keepalive_timeout: self.config.keepalive_timeout(),
            max_body_bytes: self.config.max_body_bytes,
            secure: self.config.secure,
        });

        let (shutdown, shutdown_rx) = oneshot::channel();
        let accept_task = tokio::spawn(accept_loop(listener, acceptor, settings, shutdown_rx));

        Ok(Running {
            local_addr,
            shutdown,
            accept_task,
            pool,
        })
    }

    fn bind(&self) -> Result<TcpListener> {
        let port = self.config.port;
        let addr: SocketAddr = format!("{}:{}", self.config.listen_address, port)
            .parse()
            .map_err(|e| HttpError::Config(format!("invalid listen address: {e}")))?;

        let bind = || -> std::io::Result<std::net::TcpListener> {
            let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
            socket.set_reuse_address(true)?;
            socket.set_nonblocking(true)?;
            socket.bind(&addr.into())?;
            socket.listen(LISTEN_BACKLOG)?;
            Ok(socket.into())
        };

        let std_listener = bind().map_err(|source| {
            tracing::error!("Failed to listen on port {}: {}", port, source);
            tracing::error!(
                "Tip: ports below 1024 need elevated privileges; pick a higher port or grant the binary permission to bind it"
            );
            HttpError::Bind { port, source }
        })?;
        Ok(TcpListener::from_std(std_listener)?)
    }

    /// Stops accepting and answers every outstanding poll. Safe to call at
    /// any time, including before `start`.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().take() else {
            tracing::warn!("Stop requested for port {} but the server is not running", self.config.port);
            return;
        };

        tracing::info!("Stopping server on {}", running.local_addr);
        let _ = running.shutdown.send(());
        if let Err(e) = running.accept_task.await {
            tracing::error!("Accept loop ended abnormally: {}", e);
        }
        running.pool.stop().await;
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().as_ref().map(|r| r.local_addr)
    }

    /// The bound port while running, the configured one otherwise.
    pub fn port(&self) -> u16 {
        self.local_addr().map(|a| a.port()).unwrap_or(self.config.port)
    }

    pub fn is_secure(&self) -> bool {
        self.config.secure
    }

    pub fn full_host_name(&self) -> String {
        self.config.full_host_name()
    }

    pub fn server_uri(&self) -> String {
        format!("{}{}:{}", self.config.scheme(), self.config.hostname, self.port())
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

async fn accept_loop(
    listener: TcpListener,
    acceptor: Option<TlsAcceptor>,
    settings: Arc<ConnectionSettings>,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let _ = stream.set_nodelay(true);
                    let settings = settings.clone();
                    match acceptor.clone() {
                        None => {
                            tokio::spawn(serve_connection(stream, peer, settings));
                        }
                        Some(acceptor) => {
                            tokio::spawn(async move {
                                match acceptor.accept(stream).await {
                                    Ok(tls) => serve_connection(tls, peer, settings).await,
                                    Err(e) => tracing::debug!("TLS handshake with {} failed: {}", peer, e),
                                }
                            });
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("Accept failed: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }
    tracing::debug!("Accept loop stopped");
}
