//! diceroyale server entry point.

use clap::Parser;
use diceroyale_core::config::ContestConfig;
use diceroyale_server::{run, ServerConfig};
use log::error;

#[derive(Parser, Debug)]
struct Cli {
    /// Server listening address.
    #[arg(long, short, default_value = "127.0.0.1")]
    address: String,
    /// Server listening port.
    #[arg(long, short, default_value_t = 9890)]
    port: u16,
    /// Registrations required before a contest can start.
    #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u8).range(2..=16))]
    min_players: u8,
    /// Registrations accepted per contest.
    #[arg(long, default_value_t = 8, value_parser = clap::value_parser!(u8).range(2..=16))]
    max_players: u8,
    /// Scoring rounds per contest.
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u8).range(1..=50))]
    rounds: u8,
    /// Seconds a contestant has to roll each round.
    #[arg(long, default_value_t = 15, value_parser = clap::value_parser!(u16).range(3..=120))]
    round_deadline_secs: u16,
    /// Seconds the leaderboard stays up between rounds.
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u16).range(1..=60))]
    display_secs: u16,
    /// Countdown seconds before each round.
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u16).range(1..=30))]
    countdown_secs: u16,
    /// House commission rate in [0, 1).
    #[arg(long, default_value_t = 0.10)]
    commission_rate: f64,
}

#[tokio::main]
async fn main() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    let config = ServerConfig {
        address: cli.address,
        port: cli.port,
        contest: ContestConfig {
            min_players: cli.min_players as usize,
            max_players: cli.max_players as usize,
            total_rounds: cli.rounds as usize,
            round_deadline_secs: cli.round_deadline_secs as u64,
            inter_round_display_secs: cli.display_secs as u64,
            countdown_secs: cli.countdown_secs as u64,
            commission_rate: cli.commission_rate,
        },
    };

    if let Err(e) = run(config).await {
        error!("{e}");
    }
}
