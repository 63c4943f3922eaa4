//! Background job: remove expired requests.
//!
//! Reads already treat expired requests as absent; this job reclaims them
//! from memory and from the snapshot.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time;

use crate::redact::mask_id;
use crate::registry::Registry;

/// Spawn the sweep task. It stops when `shutdown` flips.
pub fn spawn(
    registry: Arc<Registry>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = time::interval(every);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => sweep_once(&registry).await,
                _ = shutdown.changed() => break,
            }
        }
        tracing::debug!("sweep job stopped");
    })
}

pub async fn sweep_once(registry: &Registry) {
    match registry.sweep_expired().await {
        Ok(expired) if expired.is_empty() => {}
        Ok(expired) => {
            for id in &expired {
                tracing::info!(request = %mask_id(id), "expired request removed");
            }
            tracing::info!(count = expired.len(), "sweep removed expired requests");
        }
        Err(e) => tracing::error!("sweep job failed: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::application::NewApplication;
    use crate::models::request::NewRequest;
    use crate::store::memory::MemoryStateStore;

    #[tokio::test]
    async fn test_spawned_job_removes_expired_requests() {
        let registry = Arc::new(Registry::new(Arc::new(MemoryStateStore::new()), 86_400));
        registry
            .register_app(NewApplication {
                name: "acme".into(),
                callback_url: "https://acme.test/hook".into(),
                authorized_approvers: vec!["alice@x.com".into()],
            })
            .await
            .unwrap();
        let short = registry
            .create_request(NewRequest {
                app_name: "acme".into(),
                valid_emojis: vec!["check".into()],
                expire: Some(1),
                ..Default::default()
            })
            .await
            .unwrap();

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = spawn(registry.clone(), Duration::from_millis(50), stop_rx);

        time::sleep(Duration::from_millis(1300)).await;
        assert!(registry.snapshot().await.requests.is_empty(), "{}", short.id);

        stop_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
