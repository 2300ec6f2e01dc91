//! Ordering and Exclusion Tests
//!
//! Properties that must hold regardless of worker count and throughput:
//! - per-actor FIFO delivery
//! - one message at a time per actor under concurrent senders
//! - stateless actors answer the same input with the same output

use actor_runtime::{ActorSystem, Context, Envelope, RuntimeConfig};
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const QUERY_TIMEOUT: Duration = Duration::from_secs(5);

enum Recorder {
    Push(u32),
    Tagged { sender: usize, seq: u32 },
    Dump,
    DumpTagged,
}

#[derive(Clone, Default)]
struct Recorded {
    plain: Vec<u32>,
    tagged: Vec<(usize, u32)>,
}

async fn record(mut seen: Recorded, env: Envelope<Recorder>, ctx: Context) -> anyhow::Result<Recorded> {
    match env.payload {
        Recorder::Push(value) => seen.plain.push(value),
        Recorder::Tagged { sender, seq } => seen.tagged.push((sender, seq)),
        Recorder::Dump => ctx.reply(seen.plain.clone())?,
        Recorder::DumpTagged => ctx.reply(seen.tagged.clone())?,
    }
    Ok(seen)
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_single_sender_order_is_preserved(
        values in prop::collection::vec(any::<u32>(), 1..200),
        workers in 1usize..5,
        throughput in 1usize..9,
    ) {
        let received = runtime().block_on(async {
            let config = RuntimeConfig::default()
                .with_workers(workers)
                .with_throughput(throughput);
            let system = ActorSystem::new(config).unwrap();
            let recorder = system.spawn("recorder", Recorded::default(), record).unwrap();

            for value in &values {
                system.send(&recorder, Recorder::Push(*value)).unwrap();
            }
            let received: Vec<u32> = system
                .query(&recorder, QUERY_TIMEOUT, |_| Recorder::Dump)
                .await
                .unwrap();

            system.shutdown().await.unwrap();
            received
        });

        prop_assert_eq!(received, values);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_senders_keep_their_own_order() {
    const SENDERS: usize = 6;
    const PER_SENDER: u32 = 200;

    let system = ActorSystem::new(RuntimeConfig::default().with_workers(4)).unwrap();
    let recorder = system.spawn("recorder", Recorded::default(), record).unwrap();

    let tasks: Vec<_> = (0..SENDERS)
        .map(|sender| {
            let system = system.clone();
            let recorder = recorder.clone();
            tokio::spawn(async move {
                for seq in 0..PER_SENDER {
                    system
                        .send(&recorder, Recorder::Tagged { sender, seq })
                        .unwrap();
                    if seq % 16 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    let tagged: Vec<(usize, u32)> = system
        .query(&recorder, QUERY_TIMEOUT, |_| Recorder::DumpTagged)
        .await
        .unwrap();
    assert_eq!(tagged.len(), SENDERS * PER_SENDER as usize);

    for sender in 0..SENDERS {
        let sequence: Vec<u32> = tagged
            .iter()
            .filter(|(s, _)| *s == sender)
            .map(|(_, seq)| *seq)
            .collect();
        assert_eq!(sequence, (0..PER_SENDER).collect::<Vec<_>>(), "sender {}", sender);
    }

    system.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_actor_never_processes_two_messages_at_once() {
    const SENDERS: usize = 8;
    const PER_SENDER: usize = 50;

    let system = ActorSystem::new(
        RuntimeConfig::default()
            .with_workers(4)
            .with_throughput(3),
    )
    .unwrap();

    let in_flight = Arc::new(AtomicUsize::new(0));
    let max_in_flight = Arc::new(AtomicUsize::new(0));
    let handled = Arc::new(AtomicUsize::new(0));

    let (in_flight_c, max_c, handled_c) = (
        Arc::clone(&in_flight),
        Arc::clone(&max_in_flight),
        Arc::clone(&handled),
    );
    let exclusive = system
        .spawn_stateless("exclusive", move |_env: Envelope<usize>, _ctx: Context| {
            let in_flight = Arc::clone(&in_flight_c);
            let max_in_flight = Arc::clone(&max_c);
            let handled = Arc::clone(&handled_c);
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_in_flight.fetch_max(now, Ordering::SeqCst);
                tokio::task::yield_now().await;
                tokio::time::sleep(Duration::from_micros(200)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                handled.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .unwrap();

    let tasks: Vec<_> = (0..SENDERS)
        .map(|sender| {
            let system = system.clone();
            let exclusive = exclusive.clone();
            tokio::spawn(async move {
                for i in 0..PER_SENDER {
                    system.send(&exclusive, sender * PER_SENDER + i).unwrap();
                }
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    let done = tokio::time::timeout(Duration::from_secs(10), async {
        while handled.load(Ordering::SeqCst) < SENDERS * PER_SENDER {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(done.is_ok(), "only {} messages handled", handled.load(Ordering::SeqCst));
    assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);

    system.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stateless_output_depends_only_on_input() {
    let system = ActorSystem::new(RuntimeConfig::default().with_workers(4)).unwrap();
    let square = system
        .spawn_stateless("square", |env: Envelope<u64>, ctx: Context| async move {
            ctx.reply(env.payload * env.payload)?;
            Ok(())
        })
        .unwrap();

    let queries: Vec<_> = (0..64u64)
        .map(|i| {
            let system = system.clone();
            let square = square.clone();
            // Every input shows up twice, from different tasks.
            let input = i % 32;
            tokio::spawn(async move {
                let output: u64 = system
                    .query(&square, QUERY_TIMEOUT, move |_| input)
                    .await
                    .unwrap();
                (input, output)
            })
        })
        .collect();

    for query in queries {
        let (input, output) = query.await.unwrap();
        assert_eq!(output, input * input);
    }
    assert_eq!(system.metrics().get_stats().messages_processed, 64);

    system.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_actors_on_one_worker_interleave_fairly() {
    let system = ActorSystem::new(
        RuntimeConfig::default()
            .with_workers(1)
            .with_throughput(1),
    )
    .unwrap();

    let a = system.spawn("a", Recorded::default(), record).unwrap();
    let b = system.spawn("b", Recorded::default(), record).unwrap();
    for value in 0..100 {
        system.send(&a, Recorder::Push(value)).unwrap();
        system.send(&b, Recorder::Push(value)).unwrap();
    }

    let from_a: Vec<u32> = system.query(&a, QUERY_TIMEOUT, |_| Recorder::Dump).await.unwrap();
    let from_b: Vec<u32> = system.query(&b, QUERY_TIMEOUT, |_| Recorder::Dump).await.unwrap();
    assert_eq!(from_a, (0..100).collect::<Vec<_>>());
    assert_eq!(from_b, (0..100).collect::<Vec<_>>());

    system.shutdown().await.unwrap();
}
