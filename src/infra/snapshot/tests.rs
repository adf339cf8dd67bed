use super::*;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

/// Deadline that has always already expired.
struct Expired;

impl GatewayTimer for Expired {
    async fn delay_ms(&mut self, _millis: u32) {}
}

type TestSnapshot = Snapshot<CriticalSectionRawMutex, u32>;

#[test]
fn test_publications_rotate_generations() {
    let snapshot = TestSnapshot::new();
    assert_eq!(snapshot.try_latest(), None);

    assert!(snapshot.try_publish(10));
    assert!(snapshot.try_publish(20));

    let generations = snapshot.try_read().unwrap();
    assert_eq!(generations.previous, Some(10));
    assert_eq!(generations.current, Some(20));
    assert_eq!(generations.sequence, 2);
    assert_eq!(snapshot.try_latest(), Some(20));
}

#[test]
fn test_busy_lock_rejects_non_blocking_calls() {
    let snapshot = TestSnapshot::new();
    assert!(snapshot.try_publish(1));

    let _held = snapshot.inner.try_lock().unwrap();
    assert!(!snapshot.try_publish(2));
    assert_eq!(snapshot.try_read(), None);
    assert_eq!(snapshot.try_latest(), None);
    assert!(!snapshot.try_clear());
}

#[tokio::test]
async fn test_bounded_publish_succeeds_when_uncontended() {
    let snapshot = TestSnapshot::new();
    let mut timer = Expired;

    assert!(snapshot.publish_within(7, &mut timer, 100).await);
    assert_eq!(snapshot.try_latest(), Some(7));
}

#[tokio::test]
async fn test_bounded_publish_gives_up_on_timeout() {
    let snapshot = TestSnapshot::new();
    let mut timer = Expired;
    assert!(snapshot.try_publish(1));

    {
        let _held = snapshot.inner.try_lock().unwrap();
        assert!(!snapshot.publish_within(2, &mut timer, 100).await);
        assert!(snapshot.read_within(&mut timer, 100).await.is_none());
    }

    // The skipped cycle left the previous value in place.
    let generations = snapshot.read_within(&mut timer, 100).await.unwrap();
    assert_eq!(generations.current, Some(1));
    assert_eq!(generations.sequence, 1);
}

#[test]
fn test_clear_forgets_everything() {
    let snapshot = TestSnapshot::new();
    snapshot.try_publish(3);
    snapshot.try_publish(4);

    assert!(snapshot.try_clear());
    assert_eq!(snapshot.try_read().unwrap(), Generations::empty());
}
