//! # Example: exclusive_refresh
//!
//! Demonstrates per-key exclusive loaders.
//!
//! Shows how to:
//! - Launch loaders through a [`ResourceManager`] so a newer refresh for the
//!   same key cancels and waits for the older one.
//! - Observe the [`Outcome`] cell through a `watch` receiver.
//! - Route loader failures to an [`ErrorReporter`] closure.
//!
//! ## Flow
//! ```text
//! refresh(42) #1 ──► Progress ──► slow load … cancelled ──► cleanup
//! refresh(42) #2 ────────────────── waits for #1 ─────────► Progress ──► Success
//! refresh(7)     ──► Progress ──► Err ──► reporter + Outcome::Error { data kept }
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example exclusive_refresh
//! ```

use std::sync::Arc;
use std::time::Duration;

use relayvisor::{
    ErrorReporter, Outcome, Report, Resource, ResourceManager, Supervisor, SupervisorConfig,
    TaskError,
};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let reporter: Arc<dyn ErrorReporter> = Arc::new(|r: Report| {
        println!("[reporter] {} key={:?}: {}", r.source, r.key, r.failure);
    });
    let manager = ResourceManager::new(
        Supervisor::<u32>::new(SupervisorConfig {
            name: "articles".into(),
        }),
        reporter,
    );

    let article = Resource::new(Outcome::Success("cached article".to_string()));
    let mut watcher = article.subscribe();
    tokio::spawn(async move {
        while watcher.changed().await.is_ok() {
            println!("[watch] {:?}", *watcher.borrow_and_update());
        }
    });

    let first = manager.launch_resource_task(42, &article, |control| async move {
        tokio::select! {
            _ = control.cancelled() => {
                println!("[load #1] cancelled, cleaning up");
                tokio::time::sleep(Duration::from_millis(50)).await;
                Err(TaskError::Canceled)
            }
            _ = tokio::time::sleep(Duration::from_secs(5)) => {
                control.set(Outcome::Success("slow article".to_string()));
                Ok(())
            }
        }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    let second = manager.launch_resource_task(42, &article, |control| async move {
        println!("[load #2] started");
        control.set(Outcome::Success("fresh article".to_string()));
        Ok(())
    });

    println!("[main] #1 ended: {:?}", first.await);
    println!("[main] #2 ended: {:?}", second.await);

    let other = Resource::new(Outcome::Success("old".to_string()));
    let failing = manager.launch_resource_task(7, &other, |_control| async {
        Err(TaskError::fail("backend unavailable"))
    });
    println!("[main] #3 ended: {:?}", failing.await);
    println!("[main] resource 7: {:?}", other.get());
}
