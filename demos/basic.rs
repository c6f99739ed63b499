//! Basic usage examples for CorePool

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use esox_resourcepool::{BoxError, CorePool, NoopValidator, Pool, PoolConfig, PoolError};
use tracing_subscriber::EnvFilter;

struct Connection {
    id: u32,
}

fn connection_pool(config: PoolConfig) -> CorePool<Connection> {
    let next_id = Arc::new(AtomicU32::new(1));
    CorePool::new(
        config,
        Arc::new(move || {
            Ok::<_, BoxError>(Connection {
                id: next_id.fetch_add(1, Ordering::Relaxed),
            })
        }),
        Arc::new(NoopValidator),
    )
    .expect("valid configuration")
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== EsoxSolutions.ResourcePool - Basic Examples ===\n");

    // Example 1: Borrow and return
    borrow_and_return();

    // Example 2: Capacity limits
    capacity_limits();

    // Example 3: Background top-up
    ensure_min_idle();

    // Example 4: Metrics and health
    metrics_and_health();
}

fn borrow_and_return() {
    println!("1. Borrow and return:");
    let pool = connection_pool(PoolConfig::default());

    let entry = pool.borrow().unwrap().unwrap();
    println!("   Got connection {}", entry.id);
    pool.return_entry(Some(entry)).unwrap();

    let again = pool.borrow().unwrap().unwrap();
    println!("   Reused connection {}", again.id);
    pool.return_entry(Some(again)).unwrap();
    println!("   Idle after return: {}\n", pool.idle_count());
}

fn capacity_limits() {
    println!("2. Capacity limits:");
    let pool = connection_pool(PoolConfig::new().with_max_active_entries(2));

    let first = pool.borrow().unwrap().unwrap();
    let second = pool.borrow().unwrap().unwrap();
    println!("   Active: {}", pool.active_count());

    match pool.try_borrow() {
        Ok(None) => println!("   try_borrow: no capacity left"),
        other => println!("   try_borrow: unexpected {:?}", other.map(|e| e.is_some())),
    }

    match pool.borrow_entry(true, Duration::from_millis(50)) {
        Err(PoolError::Timeout(waited)) => println!("   borrow timed out after {:?}", waited),
        other => println!("   borrow: unexpected {:?}", other.map(|e| e.is_some())),
    }

    pool.return_entry(Some(first)).unwrap();
    pool.return_entry(Some(second)).unwrap();
    println!("   Free permits after return: {}\n", pool.available_permits());
}

fn ensure_min_idle() {
    println!("3. Background top-up:");
    let config = PoolConfig::new()
        .with_min_idle_entries(3)
        .with_ensure(2, Duration::from_millis(20));
    let pool = connection_pool(config);

    pool.schedule_ensure().unwrap();
    std::thread::sleep(Duration::from_millis(200));
    println!("   Idle after warm-up: {}", pool.idle_count());

    pool.close();
    println!("   Idle after close: {}\n", pool.idle_count());
}

fn metrics_and_health() {
    println!("4. Metrics and health:");
    let pool = connection_pool(PoolConfig::new().with_max_active_entries(4));

    let held: Vec<_> = (0..3).map(|_| pool.borrow().unwrap().unwrap()).collect();
    let metrics = pool.metrics();
    println!("   Borrowed: {}", metrics.total_borrowed);
    println!("   Created: {}", metrics.total_created);
    println!("   Utilization: {:.0}%", metrics.utilization * 100.0);

    let health = pool.health_status();
    println!("   Healthy: {}", health.is_healthy());
    for warning in &health.warnings {
        println!("   Warning: {}", warning);
    }

    for entry in held {
        pool.return_entry(Some(entry)).unwrap();
    }

    #[cfg(feature = "metrics")]
    {
        let output = esox_resourcepool::MetricsExporter::export_prometheus(
            &pool.metrics(),
            "connections",
            None,
        );
        println!("\n{}", output);
    }
}
