//! Validation and async usage examples

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use esox_resourcepool::{
    AsyncPoolExt, BoxError, CorePool, ObjectValidator, Pool, PoolConfig, ValidatingPool,
    ValidationConfig,
};
use tracing_subscriber::EnvFilter;

struct Session {
    id: u32,
    broken: AtomicBool,
}

struct SessionValidator;

impl ObjectValidator<Session> for SessionValidator {
    fn validate(&self, session: &Session) -> Result<bool, BoxError> {
        Ok(!session.broken.load(Ordering::Relaxed))
    }

    fn invalidate(&self, session: &Session) -> Result<(), BoxError> {
        println!("   Closing session {}", session.id);
        Ok(())
    }
}

fn session_pool(validation: ValidationConfig) -> Arc<ValidatingPool<Session>> {
    let next_id = Arc::new(AtomicU32::new(1));
    let core: Arc<dyn Pool<Session>> = Arc::new(
        CorePool::new(
            PoolConfig::new().with_max_active_entries(4),
            Arc::new(move || {
                Ok::<_, BoxError>(Session {
                    id: next_id.fetch_add(1, Ordering::Relaxed),
                    broken: AtomicBool::new(false),
                })
            }),
            Arc::new(SessionValidator),
        )
        .expect("valid configuration"),
    );

    Arc::new(ValidatingPool::new(core, validation).expect("valid validation configuration"))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== EsoxSolutions.ResourcePool - Validation Examples ===\n");

    // Example 1: Test on return
    test_on_return();

    // Example 2: Maximum age
    max_age();

    // Example 3: Background sweep
    background_sweep();

    // Example 4: Async borrowing
    async_borrow().await;
}

fn test_on_return() {
    println!("1. Test on return:");
    let pool = session_pool(ValidationConfig::new().with_test_on_return(true));

    let session = pool.borrow().unwrap().unwrap();
    session.broken.store(true, Ordering::Relaxed);
    pool.return_entry(Some(session)).unwrap();
    println!("   Idle after returning a broken session: {}\n", pool.idle_count());
}

fn max_age() {
    println!("2. Maximum age:");
    let pool = session_pool(ValidationConfig::new().with_max_age(Duration::from_millis(50)));

    let session = pool.borrow().unwrap().unwrap();
    let first_id = session.id;
    pool.return_entry(Some(session)).unwrap();
    std::thread::sleep(Duration::from_millis(80));

    let session = pool.borrow().unwrap().unwrap();
    println!("   Session {} expired, got session {}", first_id, session.id);
    pool.return_entry(Some(session)).unwrap();
    println!();
}

fn background_sweep() {
    println!("3. Background sweep:");
    let config = ValidationConfig::new().with_background_test(
        1,
        Duration::from_millis(50),
        Duration::from_millis(50),
    );
    let pool = session_pool(config);

    let sessions: Vec<_> = (0..3).map(|_| pool.borrow().unwrap().unwrap()).collect();
    sessions[1].broken.store(true, Ordering::Relaxed);
    for session in sessions {
        pool.return_entry(Some(session)).unwrap();
    }

    std::thread::sleep(Duration::from_millis(200));
    println!("   Idle after sweep: {}", pool.idle_count());
    println!("   Validation failures: {}\n", pool.metrics().validation_failures);
}

async fn async_borrow() {
    println!("4. Async borrowing:");
    let pool = session_pool(ValidationConfig::new().with_test_on_borrow(true));

    let tasks: Vec<_> = (0..8)
        .map(|task| {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move {
                let session = pool
                    .borrow_async(true, Duration::from_secs(1))
                    .await
                    .unwrap()
                    .unwrap();
                tokio::time::sleep(Duration::from_millis(10)).await;
                println!("   Task {} used session {}", task, session.id);
                pool.return_entry(Some(session)).unwrap();
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap();
    }
    println!("   Created in total: {}", pool.metrics().total_created);
}
