//! Performance benchmarks for critical netcode systems

use client::reconciliation::Reconciler;
use shared::{
    EntityState, GameConfig, InputCommand, InputQueue, Packet, QueueBounds, ReconcileTuning,
    ReplicaSet, Simulation, SimulationRole,
};
use std::time::Instant;

/// Benchmarks authoritative stepping with a full room
#[test]
fn benchmark_simulation_step() {
    let config = GameConfig::default();
    let mut simulation = Simulation::from_config(SimulationRole::Authoritative, &config, 0);
    for id in 0..100 {
        simulation.spawn(id, 20.0 + (id as f32) * 7.0, 500.0);
    }

    let iterations = 1000;
    let start = Instant::now();

    for tick in 1..=iterations {
        for id in 0..100 {
            let command = InputCommand::new(id % 3 == 0, id % 3 == 1, tick % 40 == 0, tick);
            simulation.enqueue(id, command);
        }
        simulation.step();
    }

    let duration = start.elapsed();
    println!(
        "Simulation: {} entities × {} steps in {:?} ({:.2} μs/step)",
        simulation.len(),
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert_eq!(simulation.tick(), iterations);
    // Should complete in under 5 seconds
    assert!(duration.as_millis() < 5000);
}

/// Benchmarks snapshot encode and decode
#[test]
fn benchmark_snapshot_codec() {
    let entities: Vec<_> = (0..50)
        .map(|id| (id, EntityState::spawned((id as f32) * 10.0, 500.0, 12345)))
        .collect();
    let packet = Packet::Snapshot {
        tick: 12345,
        entities,
    };

    let iterations = 10_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let bytes = packet.encode().unwrap();
        let _decoded = Packet::decode(&bytes).unwrap();
    }

    let duration = start.elapsed();
    println!(
        "Snapshot codec: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // Should complete in under 2 seconds
    assert!(duration.as_millis() < 2000);
}

/// Stress tests the input queue with commands arriving out of order
#[test]
fn stress_test_queue_reordering() {
    let mut queue = InputQueue::new(QueueBounds {
        high_water: 10_000,
        retention: 50,
    });

    let start = Instant::now();

    // Interleave two halves so nearly every insert lands mid-queue
    for i in 0..2500u32 {
        queue.enqueue(InputCommand::idle(5000 - i));
        queue.enqueue(InputCommand::idle(i + 1));
    }
    let drained = queue.drain_up_to(u32::MAX);

    let duration = start.elapsed();
    println!("Queue: {} commands in {:?}", drained.len(), duration);

    assert_eq!(drained.len(), 5000);
    assert!(drained.windows(2).all(|pair| pair[0].tick < pair[1].tick));
    // Should complete in under 500ms
    assert!(duration.as_millis() < 500);
}

/// Benchmarks reconciliation with a deep pending mirror
#[test]
fn benchmark_reconciliation_replay() {
    let config = GameConfig::default();
    // The loop runs 60 ticks ahead of the authority
    let mut simulation = Simulation::from_config(SimulationRole::Predictive, &config, 60);
    simulation.spawn(1, 50.0, 500.0);
    let mut pending = InputQueue::new(config.predictive_queue);
    let mut reconciler = Reconciler::new(ReconcileTuning::default());

    let iterations = 500u32;
    let start = Instant::now();

    for acknowledged in 1..=iterations {
        simulation.step();
        // Keep 60 commands unacknowledged
        for tick in pending.newest_tick().unwrap_or(0) + 1..=acknowledged + 60 {
            pending.enqueue(InputCommand::new(false, true, false, tick));
        }

        let mut authoritative = EntityState::spawned(50.0 + acknowledged as f32, 500.0, acknowledged);
        authoritative.last_processed_tick = acknowledged;
        reconciler.reconcile(&mut simulation, &mut pending, 1, &authoritative);
    }

    let duration = start.elapsed();
    println!(
        "Reconciliation: {} corrections in {:?} ({:.2} μs/correction)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert_eq!(reconciler.watermark(), iterations);
    assert_eq!(pending.len(), 60);
    // Should complete in under 5 seconds
    assert!(duration.as_millis() < 5000);
}

/// Benchmarks snapshot diffing on the client
#[test]
fn benchmark_replica_diffing() {
    let mut replicas = ReplicaSet::new();

    let iterations = 5000u32;
    let start = Instant::now();
    let mut events = 0;

    for tick in 1..=iterations {
        // Every entity moves each snapshot; one slot churns
        let entities: Vec<_> = (0..50u32)
            .filter(|id| *id != tick % 50)
            .map(|id| (id, EntityState::spawned(id as f32 + tick as f32, 500.0, tick)))
            .collect();
        events += replicas.apply_snapshot(tick, &entities).len();
    }

    let duration = start.elapsed();
    println!(
        "Replica diffing: {} snapshots, {} events in {:?}",
        iterations, events, duration
    );

    assert!(events > 0);
    // Should complete in under 2 seconds
    assert!(duration.as_millis() < 2000);
}
