use std::sync::Arc;
use std::time::Duration;

use courier::{Broker, StartOffset, StorageConfig, StorageEngine, WalConfig};
use tempfile::TempDir;

fn open_broker(dir: &TempDir) -> Arc<Broker> {
    let wal_config = WalConfig {
        dir_path: dir.path().to_path_buf(),
        ..WalConfig::default()
    };
    let engine = StorageEngine::open(wal_config, StorageConfig::default()).unwrap();
    Broker::new(Arc::new(engine))
}

#[tokio::test]
async fn test_shutdown_with_no_sessions_returns_immediately() {
    let dir = TempDir::new().unwrap();
    let broker = open_broker(&dir);

    assert!(broker.shutdown(Duration::from_secs(1)).await);
}

#[tokio::test]
async fn test_shutdown_cancels_active_sessions() {
    let dir = TempDir::new().unwrap();
    let broker = open_broker(&dir);
    broker.create_channel("a").unwrap();

    let mut sub1 = broker
        .subscribe("a", StartOffset::Beginning, Duration::from_millis(5), "peer-1")
        .unwrap();
    let mut sub2 = broker
        .subscribe("a", StartOffset::Latest, Duration::from_millis(5), "peer-2")
        .unwrap();
    assert_eq!(broker.subscriber_count("a"), 2);

    let drained = broker.shutdown(Duration::from_secs(5)).await;
    assert!(drained);
    assert_eq!(broker.subscriber_count("a"), 0);

    // Both streams end once their queues drain.
    while sub1.recv().await.is_some() {}
    while sub2.recv().await.is_some() {}
}

#[tokio::test]
async fn test_shutdown_makes_unsynced_publishes_durable() {
    let dir = TempDir::new().unwrap();

    {
        let broker = open_broker(&dir);
        for i in 0..20u32 {
            broker.publish("a", i.to_le_bytes().to_vec()).unwrap();
        }
        // Default policy never fsynced; shutdown must.
        assert!(broker.shutdown(Duration::from_secs(5)).await);
    }

    let wal_config = WalConfig {
        dir_path: dir.path().to_path_buf(),
        ..WalConfig::default()
    };
    let engine = StorageEngine::open(wal_config, StorageConfig::default()).unwrap();
    assert_eq!(engine.channel_length("a"), Some(20));
}

#[tokio::test]
async fn test_shutdown_interrupts_a_wedged_session() {
    let dir = TempDir::new().unwrap();
    let broker = open_broker(&dir);
    broker.create_channel("a").unwrap();

    // Fill the session's outbound queue and never read it, wedging the pull
    // loop on enqueue.
    let subscription = broker
        .subscribe("a", StartOffset::Beginning, Duration::from_millis(1), "slow-peer")
        .unwrap();
    for i in 0..100u32 {
        broker.publish("a", i.to_le_bytes().to_vec()).unwrap();
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    let drained = broker.shutdown(Duration::from_secs(5)).await;
    assert!(drained);

    drop(subscription);
}
