use arena_server::config::Config;
use arena_server::network::Server;
use clap::Parser;
use log::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let config = Config::parse();
    let game = config.game_config()?;

    info!(
        "Play field {}x{} (HUD {}), win score {}, value policy {:?}",
        game.field.width, game.field.height, game.field.top, game.win_score, game.value_policy
    );

    let mut server = Server::bind(
        &config.address(),
        &game,
        config.max_clients,
        config.client_timeout(),
    )
    .await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
