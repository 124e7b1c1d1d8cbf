//! Admission-path latency smoke bench. Run with `cargo bench`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ulid::Ulid;

use alloq::engine::Engine;
use alloq::model::{CapabilityMask, Span};
use alloq::notify::NotifyHub;

const HOUR: i64 = 3_600_000;

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies.last().unwrap().as_secs_f64() * 1000.0,
    );
}

#[tokio::main]
async fn main() {
    let dir = std::env::temp_dir().join("alloq_bench");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(format!("admit_{}.wal", Ulid::new()));

    let engine = Arc::new(Engine::new(path.clone(), Arc::new(NotifyHub::new())).unwrap());

    let capacities = [1u32, 1, 1, 1, 1, 5, 5, 5, 10, 10];
    let mut systems = Vec::new();
    for &cap in &capacities {
        let sid = Ulid::new();
        engine
            .register_system(sid, cap, CapabilityMask::new(0b111))
            .await
            .unwrap();
        systems.push(sid);
    }

    println!("alloq admission bench ({} systems)", systems.len());

    // Phase 1: non-conflicting entries, one per hour slot per system
    let mut latencies = Vec::with_capacity(2000);
    for i in 0..2000i64 {
        let sid = systems[(i as usize) % systems.len()];
        let start = (i / systems.len() as i64) * HOUR;
        let t = Instant::now();
        engine
            .admit_entry(
                Ulid::new(),
                sid,
                Span::new(start, start + HOUR / 2),
                CapabilityMask::new(0b001),
            )
            .await
            .unwrap();
        latencies.push(t.elapsed());
    }
    print_latency("admit_entry (clear slots)", &mut latencies);

    // Phase 2: conflict-heavy — everything aims at the same occupied hour
    let mut latencies = Vec::with_capacity(1000);
    let mut rejected = 0u32;
    for i in 0..1000i64 {
        let sid = systems[(i as usize) % systems.len()];
        let t = Instant::now();
        let result = engine
            .admit_entry(
                Ulid::new(),
                sid,
                Span::new(0, HOUR),
                CapabilityMask::new(0b001),
            )
            .await;
        latencies.push(t.elapsed());
        if result.is_err() {
            rejected += 1;
        }
    }
    print_latency("admit_entry (contended hour)", &mut latencies);
    println!("    rejected: {rejected}/1000");

    // Phase 3: concurrent admissions across tasks
    let mut handles = Vec::new();
    let t = Instant::now();
    for i in 0..1000i64 {
        let engine = engine.clone();
        let sid = systems[(i as usize) % systems.len()];
        let start = 10_000 * HOUR + i * HOUR;
        handles.push(tokio::spawn(async move {
            engine
                .admit_entry(
                    Ulid::new(),
                    sid,
                    Span::new(start, start + HOUR / 2),
                    CapabilityMask::new(0b010),
                )
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    let elapsed = t.elapsed();
    println!(
        "  concurrent admit: 1000 entries in {:.2}ms ({:.0}/s)",
        elapsed.as_secs_f64() * 1000.0,
        1000.0 / elapsed.as_secs_f64()
    );

    let _ = std::fs::remove_file(&path);
}
