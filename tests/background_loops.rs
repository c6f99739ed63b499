mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use common::{SpyFactory, SpyObject, SpyValidator, spy_pool, warm_up};
use esox_resourcepool::{Pool, PoolConfig, PoolError, ValidatingPool, ValidationConfig};

fn ensure_config(min_idle: usize) -> PoolConfig {
    PoolConfig::new()
        .with_max_idle_entries(4)
        .with_min_idle_entries(min_idle)
        .with_ensure(2, Duration::from_millis(20))
}

#[test]
fn test_ensure_keeps_min_idle_under_load() {
    let factory = Arc::new(SpyFactory::default());
    let validator = Arc::new(SpyValidator::default());
    let pool = spy_pool(ensure_config(3), &factory, &validator);
    pool.schedule_ensure().unwrap();
    thread::sleep(Duration::from_millis(150));
    assert!(pool.idle_count() >= 3);

    let held: Vec<_> = (0..3).map(|_| pool.try_borrow_entry(false).unwrap().unwrap()).collect();
    thread::sleep(Duration::from_millis(150));

    assert!(pool.idle_count() >= 3);
    assert!(pool.idle_count() <= 4);
    drop(held);
}

#[test]
fn test_ensure_survives_factory_outage() {
    let factory = Arc::new(SpyFactory::default());
    let validator = Arc::new(SpyValidator::default());
    factory.fail.store(true, Ordering::SeqCst);
    let pool = spy_pool(ensure_config(2), &factory, &validator);

    pool.schedule_ensure().unwrap();
    thread::sleep(Duration::from_millis(100));
    assert_eq!(pool.idle_count(), 0);

    factory.fail.store(false, Ordering::SeqCst);
    thread::sleep(Duration::from_millis(150));
    assert!(pool.idle_count() >= 2);
}

#[test]
fn test_close_stops_ensure() {
    let factory = Arc::new(SpyFactory::default());
    let validator = Arc::new(SpyValidator::default());
    let pool = spy_pool(ensure_config(2), &factory, &validator);

    pool.schedule_ensure().unwrap();
    thread::sleep(Duration::from_millis(100));
    pool.close();
    thread::sleep(Duration::from_millis(50));

    let created = factory.created();
    thread::sleep(Duration::from_millis(100));
    assert_eq!(factory.created(), created);
    assert_eq!(pool.idle_count(), 0);
    assert!(matches!(pool.try_borrow(), Err(PoolError::Closed)));
}

fn swept_pool(
    validator: &Arc<SpyValidator>,
    max_age: Option<Duration>,
) -> ValidatingPool<SpyObject> {
    let factory = Arc::new(SpyFactory::default());
    let core: Arc<dyn Pool<SpyObject>> =
        spy_pool(PoolConfig::new().with_max_idle_entries(3), &factory, validator);
    let mut config = ValidationConfig::new().with_background_test(
        2,
        Duration::from_millis(30),
        Duration::from_millis(30),
    );
    config.max_age = max_age;
    ValidatingPool::new(core, config).unwrap()
}

#[test]
fn test_sweep_removes_broken_idle_entries() {
    let validator = Arc::new(SpyValidator::default());
    let pool = swept_pool(&validator, None);
    warm_up(&pool, 3);

    validator.force_invalid.store(true, Ordering::SeqCst);
    thread::sleep(Duration::from_millis(200));

    assert_eq!(pool.idle_count(), 0);
    assert_eq!(pool.available_permits(), 8);
    assert!(pool.metrics().validation_failures >= 3);
}

#[test]
fn test_sweep_keeps_healthy_entries_and_terminates() {
    let validator = Arc::new(SpyValidator::default());
    let pool = swept_pool(&validator, None);
    warm_up(&pool, 3);

    thread::sleep(Duration::from_millis(200));

    // several sweeps ran, each one lap over the three idle entries
    assert!(validator.validated() >= 6);
    assert_eq!(pool.idle_count(), 3);
    assert_eq!(pool.available_permits(), 8);
}

#[test]
fn test_sweep_expires_old_entries() {
    let validator = Arc::new(SpyValidator::default());
    let pool = swept_pool(&validator, Some(Duration::from_millis(50)));
    warm_up(&pool, 3);

    thread::sleep(Duration::from_millis(250));

    assert_eq!(pool.idle_count(), 0);
    assert_eq!(validator.invalidated(), 3);
    assert_eq!(pool.metrics().expired_entries, 3);
}

#[test]
fn test_sweep_runs_alongside_borrowers() {
    let validator = Arc::new(SpyValidator::default());
    let pool = Arc::new(swept_pool(&validator, None));
    warm_up(&*pool, 3);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                for _ in 0..50 {
                    if let Some(entry) = pool.borrow_entry(true, Duration::from_secs(2)).unwrap() {
                        thread::sleep(Duration::from_millis(1));
                        pool.return_entry(Some(entry)).unwrap();
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    thread::sleep(Duration::from_millis(100));

    assert_eq!(pool.available_permits(), 8);
    assert!(pool.idle_count() <= 3);
    assert_eq!(validator.invalidated(), 0);
}
