mod common;

use bridge_traits::SystemClock;
use common::*;
use core_playback::{
    BufferManager, BufferingDecision, DescriptorTable, EngineConfig, PlaybackError, RepairMode,
};
use core_runtime::events::{BufferEvent, CoreEvent, EventBus};
use std::sync::Arc;
use std::time::Duration;

fn manager(fetcher: Arc<SecondsFetcher>, config: EngineConfig) -> (BufferManager, EventBus) {
    let events = EventBus::new(256);
    let manager = BufferManager::new(
        fetcher,
        Arc::new(SecondsDecoder),
        Arc::new(SystemClock::new()),
        events.clone(),
        config,
    );
    (manager, events)
}

#[tokio::test]
async fn test_concurrent_requests_share_one_fetch() {
    let chunks = descriptors(&[60.0, 60.0, 45.0]);
    let fetcher =
        Arc::new(SecondsFetcher::new(&chunks).with_delay(Duration::from_millis(50)));
    let (buffer, _events) = manager(fetcher.clone(), EngineConfig::default());
    buffer.reset_session(DescriptorTable::new(chunks).unwrap());

    let (a, b, c) = tokio::join!(
        buffer.ensure_buffered(1),
        buffer.ensure_buffered(1),
        buffer.ensure_buffered(1)
    );

    assert_eq!(fetcher.calls("mem://1"), 1);
    let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());
    assert!(Arc::ptr_eq(&a.buffer, &b.buffer));
    assert!(Arc::ptr_eq(&b.buffer, &c.buffer));
    assert_eq!(buffer.in_flight_count(), 0);
    // one success, scored once
    assert!((buffer.score(1) - 0.9).abs() < 1e-9);
}

#[tokio::test]
async fn test_decoded_duration_is_authoritative() {
    let chunks = descriptors(&[60.0, 60.0, 45.0]);
    let fetcher = Arc::new(SecondsFetcher::new(&chunks).with_duration("mem://2", 44.5));
    let (buffer, events) = manager(fetcher, EngineConfig::default());
    let mut stream = events.subscribe();
    buffer.reset_session(DescriptorTable::new(chunks).unwrap());

    let chunk = buffer.ensure_buffered(2).await.unwrap();
    assert_eq!(chunk.decoded_duration, 44.5);
    assert_eq!(
        stream.recv().await.unwrap(),
        CoreEvent::Buffer(BufferEvent::ChunkBuffered {
            index: 2,
            decoded_duration_ms: 44_500
        })
    );
}

#[tokio::test]
async fn test_zero_length_decode_is_a_failure() {
    let chunks = descriptors(&[60.0, 60.0]);
    let fetcher = Arc::new(SecondsFetcher::new(&chunks).with_duration("mem://0", 0.0));
    let (buffer, _events) = manager(fetcher, EngineConfig::default());
    buffer.reset_session(DescriptorTable::new(chunks).unwrap());

    let err = buffer.ensure_buffered(0).await.unwrap_err();
    assert!(matches!(err, PlaybackError::Decode { index: 0, .. }));
    assert!(buffer.score(0) < 0.8);
}

#[tokio::test]
async fn test_slow_fetch_times_out() {
    let chunks = descriptors(&[60.0, 60.0]);
    let fetcher =
        Arc::new(SecondsFetcher::new(&chunks).with_delay(Duration::from_millis(200)));
    let config = EngineConfig {
        fetch_timeout_ms: 20,
        ..EngineConfig::default()
    };
    let (buffer, _events) = manager(fetcher, config);
    buffer.reset_session(DescriptorTable::new(chunks).unwrap());

    let err = buffer.ensure_buffered(0).await.unwrap_err();
    assert!(matches!(
        err,
        PlaybackError::Timeout {
            index: 0,
            timeout_ms: 20,
            ..
        }
    ));
    assert_eq!(buffer.recent_failures(), 1);
}

#[tokio::test]
async fn test_buffer_ahead_skips_unreliable_chunks() {
    let chunks = descriptors(&[60.0, 60.0, 60.0, 60.0]);
    let fetcher = Arc::new(SecondsFetcher::new(&chunks).failing("mem://2"));
    let (buffer, _events) = manager(fetcher.clone(), EngineConfig::default());
    buffer.reset_session(DescriptorTable::new(chunks).unwrap());

    // 0.8 -> 0.6 -> 0.4 -> 0.2
    for _ in 0..3 {
        let _ = buffer.ensure_buffered(2).await;
    }
    assert!(buffer.should_skip(2));
    let attempts = fetcher.calls("mem://2");

    buffer.buffer_ahead(&BufferingDecision {
        look_ahead_count: 3,
        priority_indices: vec![1, 2, 3],
        repair_mode: RepairMode::Immediate,
    });
    tokio::time::timeout(Duration::from_secs(5), async {
        while buffer.buffered_count() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("look-ahead did not finish");

    assert_eq!(buffer.buffered_indices(), vec![1, 3]);
    assert_eq!(fetcher.calls("mem://2"), attempts);
}

#[tokio::test]
async fn test_results_from_before_a_stop_are_discarded() {
    let chunks = descriptors(&[60.0, 60.0]);
    let fetcher =
        Arc::new(SecondsFetcher::new(&chunks).with_delay(Duration::from_millis(30)));
    let (buffer, _events) = manager(fetcher, EngineConfig::default());
    buffer.reset_session(DescriptorTable::new(chunks).unwrap());

    let pending = tokio::spawn({
        let buffer = buffer.clone();
        async move { buffer.ensure_buffered(0).await }
    });
    tokio::time::sleep(Duration::from_millis(5)).await;
    buffer.clear();

    // the caller still gets its chunk, but the buffer does not keep it
    assert!(pending.await.unwrap().is_ok());
    assert!(!buffer.is_buffered(0));
    assert_eq!(buffer.buffered_count(), 0);
}

#[tokio::test]
async fn test_load_finishes_after_its_caller_gives_up() {
    let chunks = descriptors(&[60.0, 60.0, 60.0]);
    let fetcher =
        Arc::new(SecondsFetcher::new(&chunks).with_delay(Duration::from_millis(50)));
    let (buffer, _events) = manager(fetcher.clone(), EngineConfig::default());
    buffer.reset_session(DescriptorTable::new(chunks).unwrap());

    let abandoned =
        tokio::time::timeout(Duration::from_millis(5), buffer.ensure_buffered(1)).await;
    assert!(abandoned.is_err());
    assert_eq!(buffer.in_flight_count(), 1);

    tokio::time::timeout(Duration::from_secs(5), async {
        while !buffer.is_buffered(1) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("load did not finish on its own");

    assert_eq!(buffer.in_flight_count(), 0);
    assert_eq!(fetcher.calls("mem://1"), 1);
    assert!(buffer.score(1) > 0.8);
}

#[tokio::test]
async fn test_late_chunk_behind_the_cursor_is_not_kept() {
    let chunks = descriptors(&[60.0; 8]);
    let fetcher =
        Arc::new(SecondsFetcher::new(&chunks).with_delay(Duration::from_millis(30)));
    let (buffer, _events) = manager(fetcher, EngineConfig::default());
    buffer.reset_session(DescriptorTable::new(chunks).unwrap());

    let pending = tokio::spawn({
        let buffer = buffer.clone();
        async move { buffer.ensure_buffered(1).await }
    });
    tokio::time::sleep(Duration::from_millis(5)).await;
    // cursor jumps to 6; window keeps 4 and 5
    buffer.evict(6);

    assert!(pending.await.unwrap().is_ok());
    assert!(!buffer.is_buffered(1));

    buffer.ensure_buffered(4).await.unwrap();
    assert_eq!(buffer.buffered_indices(), vec![4]);
}
