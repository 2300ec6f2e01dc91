//! Two stateless actors trading one volley
//!
//! `ping` opens with `Hello`, `pong` answers `Ack` to whoever sent it and
//! the exchange ends there.
//!
//! Run with `RUST_LOG=actor_runtime=debug` to watch the scheduler.

use actor_runtime::{ActorSystem, Context, Envelope, RuntimeConfig};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
enum Volley {
    Hello,
    Ack,
}

async fn volley(env: Envelope<Volley>, ctx: Context) -> anyhow::Result<()> {
    let from = env.sender.as_ref().map(|s| s.name().to_string());
    println!("{:>5} <- {:?} (from {})", ctx.name(), env.payload, from.as_deref().unwrap_or("outside"));

    match env.payload {
        Volley::Hello => ctx.reply(Volley::Ack)?,
        Volley::Ack => println!("{:>5}: round trip complete", ctx.name()),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = RuntimeConfig::load(None)?;
    let system = ActorSystem::new(config)?;

    let ping = system.spawn_stateless("ping", volley)?;
    let pong = system.spawn_stateless("pong", volley)?;

    system.send_from(&ping, &pong, Volley::Hello)?;

    tokio::time::sleep(Duration::from_millis(100)).await;
    let stats = system.metrics().get_stats();
    println!("{}", serde_json::to_string_pretty(&stats)?);

    system.shutdown().await?;
    Ok(())
}
