//! Server network layer: TCP accept loop, JOIN handshake, per-connection
//! tasks and the fixed-rate game loop

use crate::broadcast::broadcast_state;
use crate::client_manager::{ClientManager, ConnectionState, Frame};
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::game::GameState;
use crate::utils::{generate_color, sanitize_name};
use crate::world::InputSnapshot;
use log::{debug, error, info, warn};
use shared::{read_message, write_frame, write_message, ClientMessage, ServerMessage};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch, RwLock};
use tokio::time::{interval, timeout, MissedTickBehavior};

/// Membership changes sent from connection tasks to the game loop.
/// Applied at the start of the next tick, never mid-tick.
#[derive(Debug)]
pub enum GameCommand {
    AddPlayer {
        id: u32,
        name: String,
        input: watch::Receiver<InputSnapshot>,
    },
    RemovePlayer {
        id: u32,
    },
}

/// A connection that completed the handshake and received its JOIN_ACK
#[derive(Debug)]
pub struct JoinedConnection {
    pub id: u32,
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
    outbox: mpsc::Receiver<Frame>,
    input: watch::Sender<InputSnapshot>,
}

/// Shared handle used by connection tasks and the broadcaster
#[derive(Clone)]
pub struct ConnectionManager {
    clients: Arc<RwLock<ClientManager>>,
    commands: mpsc::UnboundedSender<GameCommand>,
    config: Arc<ServerConfig>,
}

impl ConnectionManager {
    pub fn new(config: Arc<ServerConfig>, commands: mpsc::UnboundedSender<GameCommand>) -> Self {
        Self {
            clients: Arc::new(RwLock::new(ClientManager::new(config.max_players))),
            commands,
            config,
        }
    }

    pub fn clients(&self) -> &Arc<RwLock<ClientManager>> {
        &self.clients
    }

    /// Runs the JOIN handshake on a freshly accepted stream
    ///
    /// The client has `handshake_timeout` to send JOIN. On success the player
    /// is registered, queued for insertion into the world and acknowledged;
    /// STATE frames only start flowing after the JOIN_ACK is written.
    pub async fn accept(
        &self,
        stream: TcpStream,
        addr: SocketAddr,
    ) -> Result<JoinedConnection, ServerError> {
        let (mut reader, mut writer) = stream.into_split();
        let max_len = self.config.max_frame_len;

        let first = timeout(
            self.config.handshake_timeout,
            read_message::<_, ClientMessage>(&mut reader, max_len),
        )
        .await
        .map_err(|_| ServerError::HandshakeTimeout)??;

        let requested = match first {
            Some(ClientMessage::Join { name }) => name,
            Some(ClientMessage::Input(_)) => return Err(ServerError::UnexpectedMessage("INPUT")),
            Some(ClientMessage::Leave) => return Err(ServerError::UnexpectedMessage("LEAVE")),
            None => return Err(ServerError::ConnectionClosed),
        };

        let name = match sanitize_name(requested.as_deref()) {
            Ok(name) => name,
            Err(e) => {
                self.reject(&mut writer, "invalid name").await;
                return Err(e);
            }
        };

        let (outbox_tx, outbox_rx) = mpsc::channel(self.config.outbound_queue);
        let Some(id) = self.register(addr, outbox_tx).await else {
            self.reject(&mut writer, "server full").await;
            return Err(ServerError::ServerFull(self.config.max_players));
        };

        let name = name.unwrap_or_else(|| format!("player_{}", id));
        let (input_tx, input_rx) = watch::channel(InputSnapshot::default());
        let add = GameCommand::AddPlayer {
            id,
            name,
            input: input_rx,
        };
        if self.commands.send(add).is_err() {
            self.clients.write().await.remove_client(id);
            return Err(ServerError::GameLoopStopped);
        }

        let game = &self.config.game;
        let ack = ServerMessage::JoinAck {
            player_id: id,
            arena_width: game.arena_width,
            arena_height: game.arena_height,
            tick_rate: game.tick_rate,
            color: generate_color(id),
        };
        if let Err(e) = write_message(&mut writer, &ack).await {
            self.remove_player(id).await;
            return Err(e.into());
        }

        self.clients
            .write()
            .await
            .set_state(id, ConnectionState::Joined);
        info!("Player {} joined from {}", id, addr);

        Ok(JoinedConnection {
            id,
            reader,
            writer,
            outbox: outbox_rx,
            input: input_tx,
        })
    }

    /// Pumps a joined connection until it leaves, errors or falls behind
    ///
    /// Reading and writing run concurrently; whichever finishes first ends
    /// the connection, and the player is removed either way.
    pub async fn serve(&self, conn: JoinedConnection) -> Result<(), ServerError> {
        let JoinedConnection {
            id,
            mut reader,
            mut writer,
            mut outbox,
            input,
        } = conn;

        let result = tokio::select! {
            result = self.read_loop(id, &mut reader, &input) => result,
            result = write_loop(&mut writer, &mut outbox) => result,
        };

        self.remove_player(id).await;
        if let Err(e) = writer.shutdown().await {
            debug!("Shutdown of player {} socket failed: {}", id, e);
        }
        result
    }

    /// Removes a player from the registry and the world. Idempotent.
    pub async fn remove_player(&self, id: u32) -> bool {
        let removed = self.clients.write().await.remove_client(id).is_some();
        if removed && self.commands.send(GameCommand::RemovePlayer { id }).is_err() {
            debug!("Game loop gone while removing player {}", id);
        }
        removed
    }

    pub(crate) async fn register(
        &self,
        addr: SocketAddr,
        outbox: mpsc::Sender<Frame>,
    ) -> Option<u32> {
        self.clients.write().await.add_client(addr, outbox)
    }

    async fn handle_connection(self, stream: TcpStream, addr: SocketAddr) {
        let conn = match self.accept(stream, addr).await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("Handshake with {} failed: {}", addr, e);
                return;
            }
        };

        let id = conn.id;
        match self.serve(conn).await {
            Ok(()) => info!("Player {} disconnected", id),
            Err(e) => warn!("Player {} dropped: {}", id, e),
        }
    }

    async fn read_loop(
        &self,
        id: u32,
        reader: &mut OwnedReadHalf,
        input: &watch::Sender<InputSnapshot>,
    ) -> Result<(), ServerError> {
        let max_len = self.config.max_frame_len;
        loop {
            match read_message::<_, ClientMessage>(reader, max_len).await? {
                Some(ClientMessage::Input(msg)) => {
                    input.send_replace(InputSnapshot::from(&msg));
                }
                Some(ClientMessage::Leave) => {
                    self.clients
                        .write()
                        .await
                        .set_state(id, ConnectionState::Leaving);
                    info!("Player {} left", id);
                    return Ok(());
                }
                Some(ClientMessage::Join { .. }) => {
                    return Err(ServerError::UnexpectedMessage("JOIN"));
                }
                None => return Ok(()),
            }
        }
    }

    async fn reject(&self, writer: &mut OwnedWriteHalf, reason: &str) {
        let reject = ServerMessage::JoinReject {
            reason: reason.to_string(),
        };
        if let Err(e) = write_message(writer, &reject).await {
            debug!("Failed to send JOIN_REJECT: {}", e);
        }
        if let Err(e) = writer.shutdown().await {
            debug!("Failed to close rejected connection: {}", e);
        }
    }
}

async fn write_loop(
    writer: &mut OwnedWriteHalf,
    outbox: &mut mpsc::Receiver<Frame>,
) -> Result<(), ServerError> {
    // Ends when the client is unregistered and its sender dropped
    while let Some(frame) = outbox.recv().await {
        write_frame(writer, &frame).await?;
    }
    Ok(())
}

/// Main server tying the listener to the game loop
pub struct Server {
    listener: TcpListener,
    connections: ConnectionManager,
    game: GameState,
    commands: mpsc::UnboundedReceiver<GameCommand>,
    config: Arc<ServerConfig>,
}

impl Server {
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        config.validate()?;

        let listener =
            TcpListener::bind(&config.bind_addr)
                .await
                .map_err(|source| ServerError::Bind {
                    addr: config.bind_addr.clone(),
                    source,
                })?;
        info!("Server listening on {}", listener.local_addr()?);

        let config = Arc::new(config);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener,
            connections: ConnectionManager::new(Arc::clone(&config), commands_tx),
            game: GameState::new(config.game.clone()),
            commands: commands_rx,
            config,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Runs the accept loop and the game loop until the game loop stops
    pub async fn run(self) -> Result<(), ServerError> {
        let Server {
            listener,
            connections,
            game,
            commands,
            config,
        } = self;

        let tick_duration = config.game.tick_duration();
        let mut game_loop = tokio::spawn(run_game_loop(
            game,
            commands,
            connections.clone(),
            tick_duration,
        ));

        info!(
            "Server started: {} Hz, up to {} players",
            config.game.tick_rate, config.max_players
        );

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        debug!("Accepted connection from {}", addr);
                        if let Err(e) = stream.set_nodelay(true) {
                            debug!("Failed to set TCP_NODELAY for {}: {}", addr, e);
                        }
                        tokio::spawn(connections.clone().handle_connection(stream, addr));
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                },
                result = &mut game_loop => {
                    if let Err(e) = result {
                        error!("Game loop task panicked: {}", e);
                    }
                    return Err(ServerError::GameLoopStopped);
                }
            }
        }
    }
}

/// Drives the simulation at a fixed rate and broadcasts every tick
///
/// Late ticks are skipped rather than bunched up, so simulated time may
/// fall behind wall time under load but never runs with a variable step.
pub async fn run_game_loop(
    mut game: GameState,
    mut commands: mpsc::UnboundedReceiver<GameCommand>,
    connections: ConnectionManager,
    tick_duration: Duration,
) {
    let mut interval_timer = interval(tick_duration);
    interval_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut inputs: HashMap<u32, watch::Receiver<InputSnapshot>> = HashMap::new();
    let mut snapshots: HashMap<u32, InputSnapshot> = HashMap::new();
    let mut last_report = Instant::now();
    let mut slow_ticks = 0u32;
    let mut hits = 0usize;

    loop {
        interval_timer.tick().await;
        let started = Instant::now();

        while let Ok(command) = commands.try_recv() {
            apply_command(&mut game, &mut inputs, command);
        }

        snapshots.clear();
        snapshots.extend(inputs.iter().map(|(id, rx)| (*id, *rx.borrow())));

        let state = game.tick(&snapshots);
        for hit in game.last_hits() {
            debug!(
                "Tick {}: bullet {} from player {} hit player {}",
                state.tick, hit.bullet, hit.shooter, hit.victim
            );
        }
        hits += game.last_hits().len();
        broadcast_state(&connections, state).await;

        if started.elapsed() > tick_duration {
            slow_ticks += 1;
        }
        if last_report.elapsed() >= Duration::from_secs(10) {
            debug!(
                "Tick {}: {} players, {} bullets, {} hits, {} slow ticks",
                game.tick_count(),
                game.player_count(),
                game.bullets().count(),
                hits,
                slow_ticks
            );
            last_report = Instant::now();
            slow_ticks = 0;
            hits = 0;
        }
    }
}

fn apply_command(
    game: &mut GameState,
    inputs: &mut HashMap<u32, watch::Receiver<InputSnapshot>>,
    command: GameCommand,
) {
    match command {
        GameCommand::AddPlayer { id, name, input } => {
            if game.add_player(id, name) {
                inputs.insert(id, input);
            }
        }
        GameCommand::RemovePlayer { id } => {
            game.remove_player(id);
            inputs.remove(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{decode, read_frame, InputMessage};

    fn test_manager(
        config: ServerConfig,
    ) -> (ConnectionManager, mpsc::UnboundedReceiver<GameCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ConnectionManager::new(Arc::new(config), tx), rx)
    }

    async fn socket_pair() -> (TcpStream, SocketAddr, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap())
            .await
            .unwrap();
        let (server, addr) = listener.accept().await.unwrap();
        (server, addr, client)
    }

    async fn recv_server_message(client: &mut TcpStream) -> Option<ServerMessage> {
        read_message(client, shared::DEFAULT_MAX_FRAME_LEN)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_handshake_assigns_id_and_acks() {
        let (manager, mut commands) = test_manager(ServerConfig::default());
        let (server, addr, mut client) = socket_pair().await;

        write_message(&mut client, &ClientMessage::Join { name: Some("ada".into()) })
            .await
            .unwrap();
        let conn = manager.accept(server, addr).await.unwrap();
        assert_eq!(conn.id, 1);

        match recv_server_message(&mut client).await {
            Some(ServerMessage::JoinAck {
                player_id, color, ..
            }) => {
                assert_eq!(player_id, 1);
                assert_eq!(color, "blue");
            }
            other => panic!("expected JOIN_ACK, got {:?}", other),
        }

        match commands.try_recv().unwrap() {
            GameCommand::AddPlayer { id, name, .. } => {
                assert_eq!(id, 1);
                assert_eq!(name, "ada");
            }
            other => panic!("expected AddPlayer, got {:?}", other),
        }
        assert_eq!(
            manager.clients().read().await.get(1).map(|c| c.state),
            Some(ConnectionState::Joined)
        );
    }

    #[tokio::test]
    async fn test_default_name_uses_player_id() {
        let (manager, mut commands) = test_manager(ServerConfig::default());
        let (server, addr, mut client) = socket_pair().await;

        write_message(&mut client, &ClientMessage::Join { name: None })
            .await
            .unwrap();
        manager.accept(server, addr).await.unwrap();

        match commands.try_recv().unwrap() {
            GameCommand::AddPlayer { name, .. } => assert_eq!(name, "player_1"),
            other => panic!("expected AddPlayer, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_input_before_join_is_rejected() {
        let (manager, mut commands) = test_manager(ServerConfig::default());
        let (server, addr, mut client) = socket_pair().await;

        let input = ClientMessage::Input(InputMessage::default());
        write_message(&mut client, &input).await.unwrap();

        let result = manager.accept(server, addr).await;
        assert!(matches!(result, Err(ServerError::UnexpectedMessage("INPUT"))));
        assert!(commands.try_recv().is_err());
        assert!(manager.clients().read().await.is_empty());
    }

    #[tokio::test]
    async fn test_handshake_times_out() {
        let config = ServerConfig {
            handshake_timeout: Duration::from_millis(50),
            ..ServerConfig::default()
        };
        let (manager, _commands) = test_manager(config);
        let (server, addr, _client) = socket_pair().await;

        let result = manager.accept(server, addr).await;
        assert!(matches!(result, Err(ServerError::HandshakeTimeout)));
    }

    #[tokio::test]
    async fn test_malformed_handshake_is_rejected() {
        let (manager, _commands) = test_manager(ServerConfig::default());
        let (server, addr, mut client) = socket_pair().await;

        client.write_all(&[0, 0, 0, 3]).await.unwrap();
        client.write_all(b"{x}").await.unwrap();

        let result = manager.accept(server, addr).await;
        assert!(matches!(result, Err(ServerError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_invalid_name_sends_join_reject() {
        let (manager, mut commands) = test_manager(ServerConfig::default());
        let (server, addr, mut client) = socket_pair().await;

        let join = ClientMessage::Join {
            name: Some("bad\nname".to_string()),
        };
        write_message(&mut client, &join).await.unwrap();

        let result = manager.accept(server, addr).await;
        assert!(matches!(result, Err(ServerError::InvalidName)));
        match recv_server_message(&mut client).await {
            Some(ServerMessage::JoinReject { reason }) => assert_eq!(reason, "invalid name"),
            other => panic!("expected JOIN_REJECT, got {:?}", other),
        }
        assert!(recv_server_message(&mut client).await.is_none());
        assert!(manager.clients().read().await.is_empty());
        assert!(commands.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_full_server_sends_join_reject() {
        let config = ServerConfig {
            max_players: 1,
            ..ServerConfig::default()
        };
        let (manager, _commands) = test_manager(config);
        let (tx, _rx) = mpsc::channel(1);
        manager
            .register("127.0.0.1:1".parse().unwrap(), tx)
            .await
            .unwrap();

        let (server, addr, mut client) = socket_pair().await;
        write_message(&mut client, &ClientMessage::Join { name: None })
            .await
            .unwrap();

        let result = manager.accept(server, addr).await;
        assert!(matches!(result, Err(ServerError::ServerFull(1))));
        assert!(matches!(
            recv_server_message(&mut client).await,
            Some(ServerMessage::JoinReject { .. })
        ));
        assert!(recv_server_message(&mut client).await.is_none());
    }

    #[tokio::test]
    async fn test_serve_applies_input_and_handles_leave() {
        let (manager, mut commands) = test_manager(ServerConfig::default());
        let (server, addr, mut client) = socket_pair().await;

        write_message(&mut client, &ClientMessage::Join { name: None })
            .await
            .unwrap();
        let conn = manager.accept(server, addr).await.unwrap();
        let _ack = recv_server_message(&mut client).await.unwrap();

        let mut input_rx = match commands.try_recv().unwrap() {
            GameCommand::AddPlayer { input, .. } => input,
            other => panic!("expected AddPlayer, got {:?}", other),
        };

        let serving = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.serve(conn).await })
        };

        let input = InputMessage {
            movement: Some([1.0, 0.0]),
            fire: true,
            ..InputMessage::default()
        };
        write_message(&mut client, &ClientMessage::Input(input))
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(2), input_rx.changed())
            .await
            .unwrap()
            .unwrap();
        let snapshot = *input_rx.borrow();
        assert_eq!(snapshot.movement, crate::physics::Vector2::new(1.0, 0.0));
        assert!(snapshot.fire);

        write_message(&mut client, &ClientMessage::Leave).await.unwrap();
        let result = tokio::time::timeout(Duration::from_secs(2), serving)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());

        assert!(matches!(
            commands.try_recv().unwrap(),
            GameCommand::RemovePlayer { id: 1 }
        ));
        assert!(read_frame(&mut client, 1024).await.unwrap().is_none());
        assert!(manager.clients().read().await.is_empty());
    }

    #[tokio::test]
    async fn test_second_join_disconnects() {
        let (manager, _commands) = test_manager(ServerConfig::default());
        let (server, addr, mut client) = socket_pair().await;

        write_message(&mut client, &ClientMessage::Join { name: None })
            .await
            .unwrap();
        let conn = manager.accept(server, addr).await.unwrap();
        write_message(&mut client, &ClientMessage::Join { name: None })
            .await
            .unwrap();

        let result = manager.serve(conn).await;
        assert!(matches!(result, Err(ServerError::UnexpectedMessage("JOIN"))));
    }

    #[tokio::test]
    async fn test_remove_player_is_idempotent() {
        let (manager, mut commands) = test_manager(ServerConfig::default());
        let (tx, _rx) = mpsc::channel(1);
        let id = manager
            .register("127.0.0.1:1".parse().unwrap(), tx)
            .await
            .unwrap();

        assert!(manager.remove_player(id).await);
        assert!(!manager.remove_player(id).await);
        assert!(matches!(
            commands.try_recv().unwrap(),
            GameCommand::RemovePlayer { .. }
        ));
        assert!(commands.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_written_frames_decode() {
        let (manager, _commands) = test_manager(ServerConfig::default());
        let (server, addr, mut client) = socket_pair().await;

        write_message(&mut client, &ClientMessage::Join { name: None })
            .await
            .unwrap();
        manager.accept(server, addr).await.unwrap();

        let payload = read_frame(&mut client, 1024).await.unwrap().unwrap();
        let message: ServerMessage = decode(&payload).unwrap();
        assert!(matches!(message, ServerMessage::JoinAck { player_id: 1, .. }));
    }
}
