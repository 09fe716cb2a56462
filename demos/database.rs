//! Ten threads concurrently acquire a single, slowly established database
//! connection.
//!
//! Run with `RUST_LOG=trace` to also see the events emitted by the singleton.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;

use guarded_once::{Acquisition, Singleton};

const CALLERS: usize = 10;

/// A placeholder for a real database connection.
#[derive(Debug)]
struct Database {
    id: u32,
}

impl Database {
    fn connect() -> Self {
        info!("creating database connection");
        thread::sleep(Duration::from_secs(2));
        Database { id: 1 }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_thread_names(true)
        .init();

    let db: Arc<Singleton<Database>> = Arc::new(Singleton::new(Database::connect));

    let handles: Vec<_> = (0..CALLERS)
        .map(|caller| {
            let db = Arc::clone(&db);
            thread::Builder::new()
                .name(format!("caller-{}", caller))
                .spawn(move || match db.acquire_with_outcome() {
                    (conn, Acquisition::Constructed) => info!(id = conn.id, "database connection created"),
                    (conn, Acquisition::AlreadyReady) => info!(id = conn.id, "database already created"),
                })
                .expect("failed to spawn caller thread")
        })
        .collect();

    for handle in handles {
        handle.join().expect("caller thread panicked");
    }
}
