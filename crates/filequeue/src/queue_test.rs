//! Tests for the durable file queue
//!
//! Covers FIFO order, transactional pop semantics, crash recovery, and the
//! stop path.

use serde_json::json;
use tempfile::TempDir;

use kaijs_protocol::FileQueueMessage;

use crate::queue::{FileQueue, FileQueueConfig};

fn envelope(n: u32) -> FileQueueMessage {
    FileQueueMessage {
        fq_msg_id: format!("0001640995200-{:05}", n),
        broker_msg_id: format!("msg-{}", n),
        broker_topic: "org.centos.prod.ci.koji-build.test.queued".into(),
        body: json!({"n": n}),
        broker_extra: json!({}),
        provider_name: "umb".into(),
        provider_timestamp: 1_640_995_200,
    }
}

fn open(dir: &TempDir) -> FileQueue {
    FileQueue::open(dir.path(), FileQueueConfig::default()).unwrap()
}

#[tokio::test]
async fn push_then_pop_is_fifo() {
    let dir = TempDir::new().unwrap();
    let queue = open(&dir);

    for n in 0..3 {
        queue.push(&envelope(n)).unwrap();
    }
    assert_eq!(queue.length().unwrap(), 3);

    for n in 0..3 {
        let popped = queue.tpop().await.unwrap().unwrap();
        assert_eq!(popped.message().broker_msg_id, format!("msg-{}", n));
        popped.commit().unwrap();
    }
    assert_eq!(queue.length().unwrap(), 0);
}

#[tokio::test]
async fn claimed_entry_is_hidden_until_settled() {
    let dir = TempDir::new().unwrap();
    let queue = open(&dir);
    queue.push(&envelope(0)).unwrap();

    let popped = queue.tpop().await.unwrap().unwrap();
    assert_eq!(queue.length().unwrap(), 0);

    popped.rollback().unwrap();
    assert_eq!(queue.length().unwrap(), 1);
}

#[tokio::test]
async fn rollback_returns_entry_to_head() {
    let dir = TempDir::new().unwrap();
    let queue = open(&dir);
    queue.push(&envelope(0)).unwrap();
    queue.push(&envelope(1)).unwrap();

    let first = queue.tpop().await.unwrap().unwrap();
    assert_eq!(first.message().broker_msg_id, "msg-0");
    first.rollback().unwrap();

    // The rolled-back entry is re-delivered before the newer one.
    let again = queue.tpop().await.unwrap().unwrap();
    assert_eq!(again.message().broker_msg_id, "msg-0");
    again.commit().unwrap();
}

#[tokio::test]
async fn dropped_claim_is_rolled_back() {
    let dir = TempDir::new().unwrap();
    let queue = open(&dir);
    queue.push(&envelope(0)).unwrap();

    {
        let _popped = queue.tpop().await.unwrap().unwrap();
        // dropped without commit or rollback
    }
    assert_eq!(queue.length().unwrap(), 1);
}

#[tokio::test]
async fn reopen_recovers_claimed_entries() {
    let dir = TempDir::new().unwrap();
    {
        let queue = open(&dir);
        queue.push(&envelope(0)).unwrap();
        let popped = queue.tpop().await.unwrap().unwrap();
        // Simulate a crash mid-processing: forget the claim so Drop does
        // not roll it back.
        std::mem::forget(popped);
        assert_eq!(queue.length().unwrap(), 0);
    }

    let queue = open(&dir);
    assert_eq!(queue.length().unwrap(), 1);
    let popped = queue.tpop().await.unwrap().unwrap();
    assert_eq!(popped.message().broker_msg_id, "msg-0");
    popped.commit().unwrap();
}

#[tokio::test]
async fn reopen_discards_tmp_leftovers() {
    let dir = TempDir::new().unwrap();
    {
        let _queue = open(&dir);
        // A crash mid-push leaves a partial file in tmp/.
        std::fs::write(dir.path().join("tmp/partial.json"), b"{\"trunc").unwrap();
    }
    let queue = open(&dir);
    assert_eq!(queue.length().unwrap(), 0);
    assert!(std::fs::read_dir(dir.path().join("tmp")).unwrap().next().is_none());
}

#[tokio::test]
async fn corrupt_entry_is_quarantined() {
    let dir = TempDir::new().unwrap();
    let queue = open(&dir);
    std::fs::write(
        dir.path().join("queue/0000000000001-00000.json"),
        b"not json",
    )
    .unwrap();
    queue.push(&envelope(5)).unwrap();

    // The corrupt head is skipped; the good entry still arrives.
    let popped = queue.tpop().await.unwrap().unwrap();
    assert_eq!(popped.message().broker_msg_id, "msg-5");
    popped.commit().unwrap();
    assert!(dir
        .path()
        .join("claimed/0000000000001-00000.corrupt")
        .exists());
}

#[tokio::test]
async fn stop_unblocks_pending_pop() {
    let dir = TempDir::new().unwrap();
    let queue = open(&dir);

    let waiter = {
        let queue = queue.clone();
        tokio::spawn(async move { queue.tpop().await.unwrap() })
    };
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    queue.stop();

    let result = waiter.await.unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn pop_wakes_on_push() {
    let dir = TempDir::new().unwrap();
    let queue = open(&dir);

    let waiter = {
        let queue = queue.clone();
        tokio::spawn(async move { queue.tpop().await.unwrap() })
    };
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    queue.push(&envelope(9)).unwrap();

    let popped = waiter.await.unwrap().unwrap();
    assert_eq!(popped.message().broker_msg_id, "msg-9");
    popped.commit().unwrap();
}

#[tokio::test]
async fn optimized_listing_preserves_fifo() {
    let dir = TempDir::new().unwrap();
    let queue = FileQueue::open(
        dir.path(),
        FileQueueConfig {
            optimize_list: true,
            ..FileQueueConfig::default()
        },
    )
    .unwrap();

    for n in 0..5 {
        queue.push(&envelope(n)).unwrap();
    }
    for n in 0..5 {
        let popped = queue.tpop().await.unwrap().unwrap();
        assert_eq!(popped.message().broker_msg_id, format!("msg-{}", n));
        popped.commit().unwrap();
    }
}

#[tokio::test]
async fn metrics_track_activity() {
    let dir = TempDir::new().unwrap();
    let queue = open(&dir);
    queue.push(&envelope(0)).unwrap();
    queue.push(&envelope(1)).unwrap();

    let a = queue.tpop().await.unwrap().unwrap();
    a.commit().unwrap();
    let b = queue.tpop().await.unwrap().unwrap();
    b.rollback().unwrap();

    let snap = queue.metrics();
    assert_eq!(snap.pushes, 2);
    assert_eq!(snap.pops, 2);
    assert_eq!(snap.commits, 1);
    assert_eq!(snap.rollbacks, 1);
}
