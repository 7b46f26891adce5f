//! Load test for the block relay.
//!
//! Spawns multiple fake WebSocket clients that:
//! - Connect to the relay
//! - Echo every heartbeat
//! - Send random MOTION frames at a fixed rate
//! - Count USERS, PHYSICS_BUFFER and CONTACT frames
//!
//! Usage: cargo run --bin loadtest -- [OPTIONS]
//!
//! Options:
//!   --clients N      Number of clients to spawn (default: 50)
//!   --duration S     Test duration in seconds (default: 30)
//!   --motion-rate R  MOTION frames per second per client (default: 20)
//!   --url URL        Relay URL (default: ws://127.0.0.1:3000/)

use blocks_shared::protocol::{ClientMsg, ServerMsg};
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message};

// === Metrics ===

#[derive(Default)]
struct Metrics {
    connected: AtomicU64,
    frames_received: AtomicU64,
    buffers_received: AtomicU64,
    users_received: AtomicU64,
    contacts_received: AtomicU64,
    heartbeats_echoed: AtomicU64,
    motions_sent: AtomicU64,
    errors: AtomicU64,
    connect_latency_sum_ms: AtomicU64,
}

impl Metrics {
    fn count(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

// === Client task ===

async fn run_client(
    client_id: u32,
    url: String,
    motion_rate: f64,
    duration: Duration,
    metrics: Arc<Metrics>,
) {
    let connect_start = Instant::now();
    let mut ws = match connect_async(&url).await {
        Ok((ws, _)) => ws,
        Err(e) => {
            if client_id < 5 {
                eprintln!("Client {} failed to connect: {}", client_id, e);
            }
            Metrics::count(&metrics.errors);
            return;
        }
    };
    metrics
        .connect_latency_sum_ms
        .fetch_add(connect_start.elapsed().as_millis() as u64, Ordering::Relaxed);
    Metrics::count(&metrics.connected);

    let motion_interval = if motion_rate > 0.0 {
        Duration::from_secs_f64(1.0 / motion_rate)
    } else {
        Duration::from_secs(3600) // Effectively never
    };
    let mut motion_timer = tokio::time::interval(motion_interval);
    motion_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let test_end = tokio::time::Instant::now() + duration;
    let mut slot = 0u8;

    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(test_end) => break,

            _ = motion_timer.tick() => {
                let frame = {
                    let mut rng = rand::thread_rng();
                    ClientMsg::Motion {
                        slot,
                        pressed: rng.gen_bool(0.3),
                        point: [
                            rng.gen_range(-2.5..2.5),
                            rng.gen_range(0.0..4.0),
                            rng.gen_range(-1.5..1.5),
                        ],
                    }
                    .encode()
                };
                if ws.send(Message::Binary(frame.into())).await.is_err() {
                    Metrics::count(&metrics.errors);
                    break;
                }
                Metrics::count(&metrics.motions_sent);
            }

            msg = ws.next() => {
                let data = match msg {
                    Some(Ok(Message::Binary(data))) => data,
                    Some(Ok(Message::Close(frame))) => {
                        if client_id < 3 {
                            eprintln!("Client {} got Close: {:?}", client_id, frame);
                        }
                        break;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        if client_id < 3 {
                            eprintln!("Client {} error: {}", client_id, e);
                        }
                        Metrics::count(&metrics.errors);
                        break;
                    }
                    None => break,
                };
                Metrics::count(&metrics.frames_received);

                match ServerMsg::decode(&data) {
                    Ok(ServerMsg::PhysicsBuffer(_)) => Metrics::count(&metrics.buffers_received),
                    Ok(ServerMsg::Users(_)) => Metrics::count(&metrics.users_received),
                    Ok(ServerMsg::Contact { .. }) => Metrics::count(&metrics.contacts_received),
                    Ok(ServerMsg::Heartbeat { slot: own, timestamp_ms }) => {
                        slot = own;
                        // Echo unchanged so the relay can measure latency.
                        let echo = ClientMsg::HeartbeatAck { slot: own, timestamp_ms }.encode();
                        if ws.send(Message::Binary(echo.into())).await.is_err() {
                            Metrics::count(&metrics.errors);
                            break;
                        }
                        Metrics::count(&metrics.heartbeats_echoed);
                    }
                    Err(e) => {
                        if client_id < 3 {
                            eprintln!("Client {} got bad frame: {}", client_id, e);
                        }
                        Metrics::count(&metrics.errors);
                    }
                }
            }
        }
    }

    let _ = ws.close(None).await;
    metrics.connected.fetch_sub(1, Ordering::Relaxed);
}

// === Main ===

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();

    let mut num_clients: u32 = 50;
    let mut duration_secs: u64 = 30;
    let mut motion_rate: f64 = 20.0;
    let mut url = "ws://127.0.0.1:3000/".to_string();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--clients" => {
                i += 1;
                num_clients = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(50);
            }
            "--duration" => {
                i += 1;
                duration_secs = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(30);
            }
            "--motion-rate" => {
                i += 1;
                motion_rate = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(20.0);
            }
            "--url" => {
                i += 1;
                url = args.get(i).cloned().unwrap_or(url);
            }
            _ => {}
        }
        i += 1;
    }

    println!("=== Block Relay Load Test ===");
    println!("Clients: {}", num_clients);
    println!("Duration: {}s", duration_secs);
    println!("Motion rate: {}/s per client", motion_rate);
    println!("URL: {}", url);
    println!();

    let metrics = Arc::new(Metrics::default());
    let duration = Duration::from_secs(duration_secs);

    let mut handles = Vec::with_capacity(num_clients as usize);
    let spawn_start = Instant::now();

    for client_id in 0..num_clients {
        let url = url.clone();
        let metrics = Arc::clone(&metrics);
        handles.push(tokio::spawn(run_client(
            client_id,
            url,
            motion_rate,
            duration,
            metrics,
        )));

        // Stagger spawns slightly to avoid thundering herd
        if client_id % 50 == 49 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    println!("All clients spawned in {:?}", spawn_start.elapsed());
    println!();

    let stats = Arc::clone(&metrics);
    let stats_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        let start = Instant::now();
        loop {
            interval.tick().await;
            println!(
                "[{:3}s] connected={}, frames={}, buffers={}, users={}, contacts={}, motions={}, errors={}",
                start.elapsed().as_secs(),
                stats.connected.load(Ordering::Relaxed),
                stats.frames_received.load(Ordering::Relaxed),
                stats.buffers_received.load(Ordering::Relaxed),
                stats.users_received.load(Ordering::Relaxed),
                stats.contacts_received.load(Ordering::Relaxed),
                stats.motions_sent.load(Ordering::Relaxed),
                stats.errors.load(Ordering::Relaxed),
            );
        }
    });

    for handle in handles {
        let _ = handle.await;
    }
    stats_handle.abort();

    println!();
    println!("=== Final Results ===");
    let buffers = metrics.buffers_received.load(Ordering::Relaxed);
    println!("Total frames received: {}", metrics.frames_received.load(Ordering::Relaxed));
    println!("Total physics buffers: {}", buffers);
    println!("Total USERS frames: {}", metrics.users_received.load(Ordering::Relaxed));
    println!("Total CONTACT frames: {}", metrics.contacts_received.load(Ordering::Relaxed));
    println!("Heartbeats echoed: {}", metrics.heartbeats_echoed.load(Ordering::Relaxed));
    println!("MOTION frames sent: {}", metrics.motions_sent.load(Ordering::Relaxed));
    println!("Total errors: {}", metrics.errors.load(Ordering::Relaxed));
    if num_clients > 0 {
        println!(
            "Average connect latency: {}ms",
            metrics.connect_latency_sum_ms.load(Ordering::Relaxed) / u64::from(num_clients)
        );
    }

    let per_client = buffers as f64 / f64::from(num_clients.max(1));
    let expected = duration_secs as f64 * 61.0;
    println!();
    println!("Buffers per client: {:.1} (expected ~{:.0})", per_client, expected);
    println!("Delivery rate: {:.1}%", per_client / expected * 100.0);
}
