//! Greeter that remembers who it has met
//!
//! State is the list of names seen so far. A name greeted twice takes the
//! "Hello Again" branch and leaves the list untouched.

use actor_runtime::{ActorSystem, Context, Envelope, RuntimeConfig};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

enum GreeterMsg {
    Greet { name: String },
    Seen,
}

async fn greet(mut seen: Vec<String>, env: Envelope<GreeterMsg>, ctx: Context) -> anyhow::Result<Vec<String>> {
    match env.payload {
        GreeterMsg::Greet { name } => {
            if seen.contains(&name) {
                println!("Hello Again {}", name);
            } else {
                println!("Good to meet you, {}. I am the {} service!", name, ctx.name());
                seen.push(name);
            }
        }
        GreeterMsg::Seen => ctx.reply(seen.clone())?,
    }
    Ok(seen)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let system = ActorSystem::new(RuntimeConfig::load(None)?)?;
    let greeter = system.spawn("stateful-greeter", Vec::<String>::new(), greet)?;

    for name in ["Alice", "Bob", "Alice"] {
        system.send(&greeter, GreeterMsg::Greet { name: name.to_string() })?;
    }

    let seen: Vec<String> = system
        .query(&greeter, Duration::from_secs(1), |_| GreeterMsg::Seen)
        .await?;
    info!(seen = ?seen, "Greeter state");

    system.shutdown().await?;
    Ok(())
}
