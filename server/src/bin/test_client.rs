use arena_server::codec::{read_packet, write_packet};
use arena_shared::{check_collision, Collectible, Facing, Packet, Player, SpriteState};
use clap::Parser;
use log::{debug, info, warn};
use rand::Rng;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::interval;

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless bot that chases collectibles", long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Pixels moved per step
    #[arg(long, default_value = "8")]
    speed: f32,

    /// Milliseconds between steps
    #[arg(long, default_value = "33")]
    step_ms: u64,

    /// Give up after this many steps
    #[arg(long, default_value = "5000")]
    max_steps: u32,
}

// Get current timestamp in milliseconds
fn get_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

fn facing_towards(dx: f32, dy: f32) -> Facing {
    if dx.abs() >= dy.abs() {
        if dx < 0.0 {
            Facing::Left
        } else {
            Facing::Right
        }
    } else if dy < 0.0 {
        Facing::Up
    } else {
        Facing::Down
    }
}

/// Moves `me` up to `speed` pixels toward the target.
fn step_towards(me: &mut Player, target: (f32, f32), speed: f32, frame: u8) {
    let dx = target.0 - me.x;
    let dy = target.1 - me.y;
    let distance = (dx * dx + dy * dy).sqrt();

    if distance > 0.001 {
        let step = speed.min(distance);
        me.x += dx / distance * step;
        me.y += dy / distance * step;
    }

    me.sprite_state = Some(SpriteState {
        facing: facing_towards(dx, dy),
        moving: distance > 0.001,
        frame,
    });
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::init();

    let args = Args::parse();
    let stream = TcpStream::connect(&args.server).await?;
    info!("Connected to {}", args.server);

    let (mut reader, mut writer) = stream.into_split();

    // Forward packets through a channel so the step timer can't cut a frame in half
    let (inbound_tx, mut inbound) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        loop {
            match read_packet(&mut reader).await {
                Ok(Some(packet)) => {
                    if inbound_tx.send(packet).is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Failed to read packet: {}", e);
                    break;
                }
            }
        }
    });

    let mut rng = rand::thread_rng();
    let mut me = Player::new("", rng.gen_range(50.0..590.0), rng.gen_range(100.0..430.0));
    let mut target: Option<Collectible> = None;
    let mut claim_sent = false;

    write_packet(
        &mut writer,
        &Packet::Join {
            id: None,
            x: me.x,
            y: me.y,
            sprite_state: None,
        },
    )
    .await?;

    let mut step_timer = interval(Duration::from_millis(args.step_ms));
    let mut steps = 0u32;

    loop {
        tokio::select! {
            packet = inbound.recv() => {
                let Some(packet) = packet else {
                    info!("Server closed the connection");
                    break;
                };
                debug!("Received {:?}", packet);

                match packet {
                    Packet::Connected { player_id } => {
                        info!("Assigned id {}", player_id);
                        me.id = player_id;
                    }
                    Packet::Collectible { collectible } => {
                        info!(
                            "Collectible {} worth {} at ({}, {})",
                            collectible.id, collectible.value, collectible.x, collectible.y
                        );
                        target = Some(collectible);
                        claim_sent = false;
                    }
                    Packet::Scored { score } => {
                        me.score = score;
                        info!("Scored! Total {}", score);
                    }
                    Packet::EndGame { result } => {
                        info!("Game over: {:?} with score {}", result, me.score);
                        break;
                    }
                    Packet::Disconnected { reason } => {
                        warn!("Disconnected: {}", reason);
                        break;
                    }
                    _ => {}
                }
            }

            _ = step_timer.tick() => {
                steps += 1;
                if steps > args.max_steps {
                    info!("Step budget exhausted with score {}", me.score);
                    break;
                }

                let Some(coin) = &target else { continue };
                if me.id.is_empty() || claim_sent {
                    continue;
                }

                step_towards(&mut me, coin.position(), args.speed, (steps % 4) as u8);
                write_packet(
                    &mut writer,
                    &Packet::StateChange {
                        x: me.x,
                        y: me.y,
                        sprite_state: me.sprite_state,
                    },
                )
                .await?;

                if check_collision(&me, coin) {
                    write_packet(
                        &mut writer,
                        &Packet::Collide {
                            player_id: me.id.clone(),
                            collectible_id: coin.id.clone(),
                        },
                    )
                    .await?;
                    claim_sent = true;
                }

                if steps % 100 == 0 {
                    write_packet(&mut writer, &Packet::Ping { timestamp: get_timestamp() }).await?;
                }
            }
        }
    }

    write_packet(&mut writer, &Packet::Disconnect).await?;
    info!("Test client finished");
    Ok(())
}
