//! Server network layer handling TCP connections and the session loop

use crate::bus::outbound_channel;
use crate::codec::{read_frame, write_packet};
use crate::config::GameConfig;
use crate::registry::ConnectionRegistry;
use arena_shared::{decode_body, Packet};
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::interval;

/// How often idle connections are swept
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Messages sent from connection tasks to the session loop
#[derive(Debug)]
pub enum ServerMessage {
    Connected {
        addr: SocketAddr,
        sender: mpsc::Sender<Packet>,
        reply: oneshot::Sender<Option<String>>,
    },
    PacketReceived {
        id: String,
        packet: Packet,
    },
    Malformed {
        id: String,
        reason: String,
    },
    Closed {
        id: String,
    },
    Shutdown,
}

/// Cloneable handle for stopping a running server
#[derive(Debug, Clone)]
pub struct ServerHandle {
    server_tx: mpsc::UnboundedSender<ServerMessage>,
}

impl ServerHandle {
    pub fn shutdown(&self) {
        if self.server_tx.send(ServerMessage::Shutdown).is_err() {
            debug!("Server already stopped");
        }
    }
}

/// Main server owning the session and the listening socket
pub struct Server {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    registry: ConnectionRegistry,
    client_timeout: Duration,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    /// Flipped when the session loop exits so the acceptor releases the port
    stopped_tx: watch::Sender<bool>,
}

impl Server {
    pub async fn bind(
        addr: &str,
        game: &GameConfig,
        max_clients: usize,
        client_timeout: Duration,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        game.validate()?;

        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!("Server listening on {}", local_addr);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (stopped_tx, _) = watch::channel(false);

        Ok(Server {
            listener: Some(listener),
            local_addr,
            registry: ConnectionRegistry::new(game, max_clients),
            client_timeout,
            server_tx,
            server_rx,
            stopped_tx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            server_tx: self.server_tx.clone(),
        }
    }

    /// Spawns task that accepts connections and starts a task per client
    fn spawn_acceptor(&mut self) {
        let Some(listener) = self.listener.take() else {
            warn!("Acceptor already running");
            return;
        };
        let server_tx = self.server_tx.clone();
        let mut stopped = self.stopped_tx.subscribe();

        tokio::spawn(async move {
            loop {
                let accepted = tokio::select! {
                    accepted = listener.accept() => accepted,
                    _ = stopped.changed() => break,
                };

                match accepted {
                    Ok((stream, addr)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            debug!("Could not disable Nagle for {}: {}", addr, e);
                        }
                        tokio::spawn(handle_connection(stream, addr, server_tx.clone()));
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
                if server_tx.is_closed() {
                    break;
                }
            }
            debug!("Acceptor stopped");
        });
    }

    fn handle_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::Connected {
                addr,
                sender,
                reply,
            } => {
                let id = self.registry.connect(addr, sender);
                if reply.send(id.clone()).is_err() {
                    if let Some(id) = id {
                        self.registry.disconnect(&id);
                    }
                }
            }
            ServerMessage::PacketReceived { id, packet } => {
                let name = packet.name();
                if let Err(rejection) = self.registry.handle_packet(&id, packet) {
                    debug!("Dropped {} from {}: {}", name, id, rejection);
                }
            }
            ServerMessage::Malformed { id, reason } => {
                warn!("Dropped malformed frame from {}: {}", id, reason);
                self.registry.touch(&id);
            }
            ServerMessage::Closed { id } => {
                self.registry.disconnect(&id);
            }
            ServerMessage::Shutdown => {}
        }

        self.registry.evict_lagging();
    }

    /// Main server loop. All session state is touched only from here.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_acceptor();

        let mut sweep_interval = interval(SWEEP_INTERVAL);
        let mut sweeps: u64 = 0;

        info!("Server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                        Some(message) => self.handle_message(message),
                    }
                },

                _ = sweep_interval.tick() => {
                    self.registry.sweep_timeouts(self.client_timeout);
                    self.registry.evict_lagging();

                    sweeps += 1;
                    if sweeps % 60 == 0 && self.registry.connection_count() > 0 {
                        debug!(
                            "{} connections, {} players, active collectible {}",
                            self.registry.connection_count(),
                            self.registry.directory().len(),
                            self.registry.active_collectible().id
                        );
                    }
                },
            }
        }

        let _ = self.stopped_tx.send(true);
        Ok(())
    }
}

/// Drives one client connection from handshake to close
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    server_tx: mpsc::UnboundedSender<ServerMessage>,
) {
    let (reader, writer) = stream.into_split();
    let (sender, outbound) = outbound_channel();
    let mut writer_task = tokio::spawn(write_loop(writer, outbound, addr));

    let (reply, assigned) = oneshot::channel();
    if server_tx
        .send(ServerMessage::Connected {
            addr,
            sender,
            reply,
        })
        .is_err()
    {
        return;
    }

    let id = match assigned.await {
        Ok(Some(id)) => id,
        _ => {
            // Refused: let the writer flush the reason, then close
            let _ = writer_task.await;
            return;
        }
    };

    tokio::select! {
        _ = read_loop(reader, &id, &server_tx) => {
            debug!("Reader for {} finished", id);
        }
        _ = &mut writer_task => {
            debug!("Writer for {} finished", id);
        }
    }

    let _ = server_tx.send(ServerMessage::Closed { id });
}

async fn read_loop(
    mut reader: OwnedReadHalf,
    id: &str,
    server_tx: &mpsc::UnboundedSender<ServerMessage>,
) {
    loop {
        let message = match read_frame(&mut reader).await {
            Ok(Some(body)) => match decode_body(&body) {
                Ok(packet) if packet.is_client_bound() => ServerMessage::PacketReceived {
                    id: id.to_string(),
                    packet,
                },
                Ok(packet) => ServerMessage::Malformed {
                    id: id.to_string(),
                    reason: format!("server packet {} sent by client", packet.name()),
                },
                Err(e) => ServerMessage::Malformed {
                    id: id.to_string(),
                    reason: e.to_string(),
                },
            },
            Ok(None) => break,
            Err(e) => {
                warn!("Closing {}: {}", id, e);
                break;
            }
        };

        if server_tx.send(message).is_err() {
            break;
        }
    }
}

/// Drains the connection's outbound queue until the session drops it
async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::Receiver<Packet>,
    addr: SocketAddr,
) {
    while let Some(packet) = outbound.recv().await {
        if let Err(e) = write_packet(&mut writer, &packet).await {
            error!("Failed to send {} to {}: {}", packet.name(), addr, e);
            break;
        }
    }

    let _ = writer.shutdown().await;
}
