//! Periodic node maintenance
//!
//! One background task runs [`Node::maintain`] right away and then once per
//! interval. [`Maintenance::wake`] cuts the current wait short and
//! [`Maintenance::shutdown`] stops the task and waits for it to finish.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::node::Node;

pub struct Maintenance {
    stop: watch::Sender<bool>,
    wake: Arc<Notify>,
    task: JoinHandle<()>,
}

impl Maintenance {
    pub fn spawn(node: Arc<Node>, interval: Duration) -> Self {
        let (stop, mut stop_rx) = watch::channel(false);
        let wake = Arc::new(Notify::new());
        let notified = wake.clone();

        let task = tokio::spawn(async move {
            info!("Maintenance started (interval: {:?})", interval);
            loop {
                if *stop_rx.borrow() {
                    break;
                }

                let pass = node.clone();
                match tokio::task::spawn_blocking(move || pass.maintain()).await {
                    Ok(Ok(())) => debug!("Maintenance pass complete"),
                    Ok(Err(e)) => debug!("Maintenance pass failed: {}", e),
                    Err(e) => error!("Maintenance pass panicked: {}", e),
                }

                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = notified.notified() => {
                        debug!("Maintenance woken early");
                    }
                    result = stop_rx.changed() => {
                        if result.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("Maintenance stopped");
        });

        Self { stop, wake, task }
    }

    /// Run the next pass now instead of at the end of the interval
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn shutdown(self) -> Result<(), tokio::task::JoinError> {
        let _ = self.stop.send(true);
        self.wake.notify_one();
        self.task.await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::node::NodeState;
    use crate::transport::QueueTransport;
    use carma_crypto::{PUBLIC_KEY_SIZE, SECRET_KEY_SIZE};
    use carma_phonebook::{GlobalConfig, LocalConfig, MemStorage, PeerRecord, Storage};
    use carma_protocol::{Psn, Role};

    fn client_node(storage: Arc<MemStorage>) -> Arc<Node> {
        let record = PeerRecord::new(Psn::from("C"), Role::Client, vec![1; PUBLIC_KEY_SIZE]);
        let local = LocalConfig::new(record.clone(), vec![2; SECRET_KEY_SIZE]);
        let config = Config::new(storage, "c", GlobalConfig::default(), local).unwrap();
        config.phonebook().add_fast(record).unwrap();
        Arc::new(Node::new(config, Arc::new(QueueTransport::new())))
    }

    #[tokio::test]
    async fn test_first_pass_runs_immediately() {
        let storage = Arc::new(MemStorage::new());
        let node = client_node(storage.clone());
        let maintenance = Maintenance::spawn(node.clone(), Duration::from_secs(3600));

        for _ in 0..200 {
            if node.last_maintenance().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(node.state(), NodeState::Ready);
        assert!(storage.exists("c/local.json").unwrap());

        maintenance.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_wake_runs_another_pass() {
        let node = client_node(Arc::new(MemStorage::new()));
        let maintenance = Maintenance::spawn(node.clone(), Duration::from_secs(3600));

        let first = loop {
            if let Some(at) = node.last_maintenance() {
                break at;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        };

        tokio::time::sleep(Duration::from_millis(5)).await;
        maintenance.wake();
        let mut second = first;
        for _ in 0..200 {
            if let Some(at) = node.last_maintenance() {
                if at > first {
                    second = at;
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(second > first);

        maintenance.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_joins_task() {
        let node = client_node(Arc::new(MemStorage::new()));
        let maintenance = Maintenance::spawn(node, Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!maintenance.is_finished());
        maintenance.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_pass_keeps_task_running() {
        let record = PeerRecord::new(Psn::from("M"), Role::MbServer, vec![1; PUBLIC_KEY_SIZE]);
        let local = LocalConfig::new(record.clone(), vec![2; SECRET_KEY_SIZE]);
        let config = Config::new(
            Arc::new(MemStorage::new()),
            "m",
            GlobalConfig::default(),
            local,
        )
        .unwrap();
        config.phonebook().add_fast(record).unwrap();
        let node = Arc::new(Node::new(config, Arc::new(QueueTransport::new())));

        let maintenance = Maintenance::spawn(node.clone(), Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(node.state(), NodeState::Broken);
        assert!(!maintenance.is_finished());
        maintenance.shutdown().await.unwrap();
    }
}
