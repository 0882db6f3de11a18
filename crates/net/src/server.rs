//! TCP server for the booking protocol
//!
//! One task per connection. Requests on a connection are answered in order;
//! each is dispatched on the blocking pool because storage is synchronous.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::io::WriteHalf;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use roombook_core::Storage;

use crate::error::{Error, Result};
use crate::frame::{read_frame, write_frame};
use crate::handler::Handler;
use crate::protocol::{ErrorBody, Request, Response, ResponseBody};

/// Maximum number of open connections
pub const MAX_CONNECTIONS: usize = 256;

/// Booking server handle
pub struct Server {
    addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
    connections: Arc<AtomicUsize>,
}

impl Server {
    /// Bind `addr` and start serving `handler`
    pub async fn start<A, S>(addr: A, handler: Arc<Handler<S>>) -> Result<Self>
    where
        A: ToSocketAddrs,
        S: Storage + ?Sized + 'static,
    {
        let listener = TcpListener::bind(addr).await?;
        let bound_addr = listener.local_addr()?;

        info!(addr = %bound_addr, "Server started");

        let (shutdown_tx, _) = broadcast::channel(1);
        let connections = Arc::new(AtomicUsize::new(0));

        // Spawn accept loop
        tokio::spawn(accept_loop(
            listener,
            handler,
            connections.clone(),
            shutdown_tx.clone(),
        ));

        Ok(Server {
            addr: bound_addr,
            shutdown_tx,
            connections,
        })
    }

    /// Get the server's bound address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Number of open connections
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Stop accepting and close every connection
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        info!("Server shutdown initiated");
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// Decrements the open-connection count when a connection task ends
struct ConnectionSlot(Arc<AtomicUsize>);

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Accept incoming connections
async fn accept_loop<S>(
    listener: TcpListener,
    handler: Arc<Handler<S>>,
    connections: Arc<AtomicUsize>,
    shutdown_tx: broadcast::Sender<()>,
) where
    S: Storage + ?Sized + 'static,
{
    let mut shutdown_rx = shutdown_tx.subscribe();

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        if connections.fetch_add(1, Ordering::SeqCst) >= MAX_CONNECTIONS {
                            connections.fetch_sub(1, Ordering::SeqCst);
                            warn!(addr = %addr, "Connection limit reached, rejecting");
                            tokio::spawn(reject(stream));
                            continue;
                        }

                        debug!(addr = %addr, "New connection");
                        let slot = ConnectionSlot(connections.clone());
                        tokio::spawn(handle_connection(
                            stream,
                            addr,
                            handler.clone(),
                            slot,
                            shutdown_tx.subscribe(),
                        ));
                    }
                    Err(e) => {
                        error!(error = %e, "Accept failed");
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Accept loop shutting down");
                break;
            }
        }
    }
}

/// Tell an over-limit client why it is being dropped
async fn reject(stream: TcpStream) {
    let (_, mut writer) = tokio::io::split(stream);
    let response = Response {
        id: 0,
        body: ResponseBody::Error(ErrorBody::new(
            "SERVER_FULL",
            "infrastructure",
            503,
            "Too many connections",
        )),
    };
    let _ = write_frame(&mut writer, &response).await;
}

/// Handle a single client connection
async fn handle_connection<S>(
    stream: TcpStream,
    addr: SocketAddr,
    handler: Arc<Handler<S>>,
    _slot: ConnectionSlot,
    mut shutdown_rx: broadcast::Receiver<()>,
) where
    S: Storage + ?Sized + 'static,
{
    let (mut reader, mut writer) = tokio::io::split(stream);

    loop {
        tokio::select! {
            result = read_frame::<_, Request>(&mut reader) => {
                match serve_one(result, &handler, &mut writer).await {
                    Ok(()) => {}
                    Err(Error::ConnectionClosed) => {
                        debug!(addr = %addr, "Connection closed");
                        break;
                    }
                    Err(e) => {
                        warn!(addr = %addr, error = %e, "Dropping connection");
                        break;
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                debug!(addr = %addr, "Closing connection for shutdown");
                break;
            }
        }
    }

    info!(addr = %addr, "Client disconnected");
}

/// Answer one frame. Errors end the connection.
async fn serve_one<S>(
    frame: Result<Request>,
    handler: &Arc<Handler<S>>,
    writer: &mut WriteHalf<TcpStream>,
) -> Result<()>
where
    S: Storage + ?Sized + 'static,
{
    let response = match frame {
        Ok(request) => dispatch(request, handler).await,
        Err(Error::Malformed(reason)) => {
            warn!(reason = %reason, "Malformed request");
            Response {
                id: 0,
                body: ResponseBody::Error(ErrorBody::new(
                    "MALFORMED_REQUEST",
                    "validation",
                    400,
                    reason,
                )),
            }
        }
        Err(e) => return Err(e),
    };

    write_frame(writer, &response).await
}

async fn dispatch<S>(request: Request, handler: &Arc<Handler<S>>) -> Response
where
    S: Storage + ?Sized + 'static,
{
    let id = request.id;
    let name = request.body.name();
    let handler = handler.clone();

    match tokio::task::spawn_blocking(move || handler.handle(request)).await {
        Ok(response) => {
            if let ResponseBody::Error(e) = &response.body {
                warn!(request = name, code = %e.code, "Request rejected");
            } else {
                debug!(request = name, "Request served");
            }
            response
        }
        Err(e) => {
            error!(request = name, error = %e, "Request handler failed");
            Response {
                id,
                body: ResponseBody::Error(ErrorBody::new(
                    "INTERNAL_ERROR",
                    "infrastructure",
                    500,
                    "Request handler failed",
                )),
            }
        }
    }
}
