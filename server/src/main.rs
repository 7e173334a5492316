use clap::Parser;
use env_logger::Env;
use log::{error, info};
use server::config::{GameConfig, ServerConfig, SpawnMode};
use server::network::Server;
use shared::DEFAULT_PORT;

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about = "Authoritative arena shooter server")]
struct Args {
    /// Address to bind to
    #[clap(short = 'H', long, default_value = "0.0.0.0")]
    host: String,
    /// Port to listen on
    #[clap(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,
    /// Simulation ticks per second
    #[clap(short, long, default_value_t = 30)]
    tick_rate: u32,
    /// Maximum concurrent players
    #[clap(short, long, default_value_t = 16)]
    max_players: usize,
    /// Bullets per life
    #[clap(long, default_value_t = 10)]
    max_ammo: u32,
    /// Ticks a player sits out after each shot
    #[clap(long, default_value_t = 0)]
    fire_cooldown: u32,
    /// Spawn at random positions instead of the arena center
    #[clap(long)]
    random_spawn: bool,
    /// Seed for spawn randomization
    #[clap(long)]
    seed: Option<u64>,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        let defaults = GameConfig::default();
        let spawn_mode = if self.random_spawn {
            SpawnMode::Random
        } else {
            defaults.spawn_mode
        };

        ServerConfig {
            bind_addr: format!("{}:{}", self.host, self.port),
            max_players: self.max_players,
            game: GameConfig {
                tick_rate: self.tick_rate,
                max_ammo: self.max_ammo,
                fire_cooldown_ticks: self.fire_cooldown,
                spawn_mode,
                seed: self.seed,
                ..defaults
            },
            ..ServerConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = Args::parse().into_config();
    let server = Server::bind(config).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped: {}", e);
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
