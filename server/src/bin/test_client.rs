use clap::Parser;
use shared::{
    read_message, write_message, ClientMessage, InputMessage, ServerMessage, DEFAULT_MAX_FRAME_LEN,
    DEFAULT_PORT,
};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::interval;

/// Scripted bot that joins, runs in circles while shooting, then leaves
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    #[clap(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,
    #[clap(short, long, default_value = "bot")]
    name: String,
    /// Number of STATE messages to read before leaving
    #[clap(short, long, default_value_t = 150)]
    states: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let server_addr = format!("{}:{}", args.host, args.port);

    let stream = TcpStream::connect(&server_addr).await?;
    stream.set_nodelay(true)?;
    println!("Connected to {}", server_addr);
    let (mut reader, mut writer) = stream.into_split();

    let join = ClientMessage::Join {
        name: Some(args.name.clone()),
    };
    write_message(&mut writer, &join).await?;

    let player_id = match read_message(&mut reader, DEFAULT_MAX_FRAME_LEN).await? {
        Some(ServerMessage::JoinAck {
            player_id,
            arena_width,
            arena_height,
            tick_rate,
            color,
        }) => {
            println!(
                "Joined as player {} ({}) in a {}x{} arena at {} Hz",
                player_id, color, arena_width, arena_height, tick_rate
            );
            player_id
        }
        Some(ServerMessage::JoinReject { reason }) => {
            println!("Join rejected: {}", reason);
            return Ok(());
        }
        other => {
            println!("Unexpected handshake reply: {:?}", other);
            return Ok(());
        }
    };

    // Frames are read on their own task; a half-read frame must never be
    // abandoned by select!
    let (state_tx, mut state_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        loop {
            let message = read_message::<_, ServerMessage>(&mut reader, DEFAULT_MAX_FRAME_LEN).await;
            let done = !matches!(message, Ok(Some(_)));
            if state_tx.send(message).is_err() || done {
                break;
            }
        }
    });

    let mut input_timer = interval(Duration::from_millis(100));
    let mut angle: f32 = 0.0;
    let mut received = 0;

    while received < args.states {
        tokio::select! {
            _ = input_timer.tick() => {
                angle += 0.3;
                let input = InputMessage {
                    movement: Some([angle.cos(), angle.sin()]),
                    aim: Some(-angle),
                    fire: true,
                    ..InputMessage::default()
                };
                write_message(&mut writer, &ClientMessage::Input(input)).await?;
            }
            message = state_rx.recv() => {
                match message.transpose()? {
                    Some(Some(ServerMessage::State(state))) => {
                        received += 1;
                        if state.tick % 30 == 0 {
                            if let Some(me) = state.players.iter().find(|p| p.id == player_id) {
                                println!(
                                    "tick {}: at ({:.0}, {:.0}) alive={} score={} ammo={} | {} players, {} bullets",
                                    state.tick, me.x, me.y, me.alive, me.score, me.ammo,
                                    state.players.len(), state.bullets.len()
                                );
                            }
                        }
                    }
                    Some(Some(other)) => println!("Unexpected message: {:?}", other),
                    Some(None) | None => {
                        println!("Server closed the connection");
                        return Ok(());
                    }
                }
            }
        }
    }

    write_message(&mut writer, &ClientMessage::Leave).await?;
    println!("Left after {} states", received);
    Ok(())
}
