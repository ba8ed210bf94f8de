//! Performance benchmarks for the hot paths: codec, buffer pool, registry

use rand::distributions::{Alphanumeric, DistString};
use rand::Rng;
use server::buffer_pool::BufferPool;
use server::client_manager::ClientManager;
use shared::{decode, encode, ConnectRequest, Envelope, Message, MessageKind, PlayerData, Vector3};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

fn addr(n: u32) -> SocketAddr {
    let [a, b, c, d] = n.to_be_bytes();
    SocketAddr::from(([10, b, c, d], 1000 + a as u16))
}

/// Benchmarks envelope encode + decode
#[test]
fn benchmark_envelope_codec() {
    let envelope = Message::Connect(ConnectRequest {
        player_name: "TestPlayer1".to_string(),
    })
    .into_envelope("Player_1")
    .unwrap();

    let iterations = 50_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let bytes = encode(&envelope).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.kind, MessageKind::Connect);
    }

    let duration = start.elapsed();
    println!(
        "Envelope codec: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // Should complete in under 2 seconds
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks the full message path with the largest payload type
#[test]
fn benchmark_player_leave_processing() {
    let mut rng = rand::thread_rng();
    let name_len = rng.gen_range(8..32);
    let player = PlayerData {
        player_id: "Player_4242".to_string(),
        player_name: Alphanumeric.sample_string(&mut rng, name_len),
        position: Vector3::new(rng.gen(), rng.gen(), rng.gen()),
        rotation: Vector3::ZERO,
        last_update: 1_700_000_000,
    };

    let iterations = 20_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let envelope = Message::PlayerLeave(player.clone())
            .into_envelope("Player_4242")
            .unwrap();
        let bytes = encode(&envelope).unwrap();
        let message = Message::from_envelope(&decode(&bytes).unwrap()).unwrap();
        assert_eq!(message.kind(), MessageKind::PlayerLeave);
    }

    let duration = start.elapsed();
    println!(
        "PlayerLeave processing: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 2000);
}

/// Benchmarks rejection of random garbage
#[test]
fn benchmark_malformed_rejection() {
    let mut rng = rand::thread_rng();
    let garbage: Vec<Vec<u8>> = (0..1000)
        .map(|_| {
            let len = rng.gen_range(1..512);
            (0..len).map(|_| rng.gen()).collect()
        })
        .collect();

    let start = Instant::now();
    let mut rejected = 0;
    for _ in 0..10 {
        for bytes in &garbage {
            if decode(bytes).is_err() {
                rejected += 1;
            }
        }
    }
    let duration = start.elapsed();

    println!("Rejected {} malformed datagrams in {:?}", rejected, duration);

    assert!(rejected > 9_000);
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks buffer rent/return churn
#[test]
fn benchmark_buffer_pool_churn() {
    let pool = BufferPool::new(shared::BUFFER_SIZE, 64);

    let iterations = 200_000;
    let start = Instant::now();

    for i in 0..iterations {
        let mut buffer = pool.rent(shared::BUFFER_SIZE);
        buffer[0] = i as u8;
    }

    let duration = start.elapsed();
    let stats = pool.stats();
    println!(
        "Buffer pool: {} rentals in {:?}, {} idle afterwards",
        iterations, duration, stats.idle
    );

    assert_eq!(stats.rented, iterations);
    assert_eq!(stats.returned, iterations);
    assert!(stats.idle <= 64);
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks buffer churn across threads
#[test]
fn stress_test_buffer_pool_threads() {
    let pool = BufferPool::new(shared::BUFFER_SIZE, 32);

    let start = Instant::now();
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let pool = pool.clone();
            std::thread::spawn(move || {
                let mut held = Vec::new();
                for i in 0..5_000 {
                    held.push(pool.rent(shared::BUFFER_SIZE));
                    if i % 4 == 0 {
                        held.clear();
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let duration = start.elapsed();
    let stats = pool.stats();
    println!("Threaded buffer churn: {:?}, {:?}", duration, stats);

    assert_eq!(stats.rented, 40_000);
    assert_eq!(stats.outstanding(), 0);
}

/// Benchmarks registry connect and lookup throughput
#[test]
fn benchmark_client_registry() {
    tokio_test::block_on(async {
        let clients = ClientManager::new();
        let count = 5_000;

        let start = Instant::now();
        for n in 0..count {
            clients.connect(addr(n), "Bench").await;
        }
        let connect_time = start.elapsed();

        let start = Instant::now();
        for n in 0..count {
            assert!(clients.find_player_id(addr(n)).await.is_some());
        }
        let lookup_time = start.elapsed();

        println!(
            "Registry: {} connects in {:?}, {} lookups in {:?}",
            count, connect_time, count, lookup_time
        );

        assert_eq!(clients.len().await, count as usize);
        assert_eq!(
            clients.find_player_id(addr(count - 1)).await.as_deref(),
            Some(format!("Player_{}", count).as_str())
        );
        assert!(connect_time.as_millis() < 1000);
        assert!(lookup_time.as_millis() < 1000);
    });
}

/// Stress tests concurrent connects and disconnects from many tasks
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stress_test_registry_churn() {
    let clients = Arc::new(ClientManager::new());

    let start = Instant::now();
    let tasks: Vec<_> = (0..8u32)
        .map(|t| {
            let clients = Arc::clone(&clients);
            tokio::spawn(async move {
                for i in 0..500u32 {
                    let a = addr(t * 1000 + i);
                    clients.connect(a, "Churn").await;
                    if i % 2 == 0 {
                        clients.disconnect(a).await;
                    }
                }
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap();
    }
    let duration = start.elapsed();

    println!("Registry churn: 4000 connects in {:?}", duration);

    assert_eq!(clients.len().await, 2000);
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks snapshotting a full registry, as every broadcast does
#[test]
fn benchmark_registry_snapshot() {
    tokio_test::block_on(async {
        let clients = ClientManager::new();
        for n in 0..1000 {
            clients.connect(addr(n), "Snap").await;
        }

        let iterations = 1000;
        let start = Instant::now();
        for _ in 0..iterations {
            assert_eq!(clients.snapshot().await.len(), 1000);
        }
        let duration = start.elapsed();

        println!("Registry snapshot: {} x 1000 sessions in {:?}", iterations, duration);

        assert!(duration.as_millis() < 5000);
    });
}

#[test]
fn envelope_timestamp_is_current() {
    let envelope = Envelope::new(MessageKind::Heartbeat, "", "");
    assert!((shared::unix_timestamp() - envelope.timestamp).abs() <= 1);
}
