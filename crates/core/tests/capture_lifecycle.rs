//! Capture manager lifecycle against the synthetic backend

use std::sync::atomic::Ordering;
use std::sync::{Arc, Barrier};
use std::time::{Duration, Instant};

use homecam_core::capture::{
    CaptureManager, CaptureState, FrameFormat, StartOutcome, StopOutcome, SyntheticOpener,
};
use homecam_core::config::CameraConfig;
use homecam_core::metrics::Metrics;
use homecam_core::Error;

fn camera_config() -> CameraConfig {
    CameraConfig {
        width: 64,
        height: 48,
        fps: 30,
        ..Default::default()
    }
}

fn manager_with(opener: SyntheticOpener, metrics: Arc<Metrics>) -> CaptureManager {
    CaptureManager::new(camera_config(), Arc::new(opener)).with_metrics(metrics)
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

#[test]
fn acquire_falls_back_to_next_working_device() {
    let opener = SyntheticOpener::new().with_unopenable([0]);
    let manager = manager_with(opener, Arc::new(Metrics::new()));

    manager.acquire(0).unwrap();
    let status = manager.status();
    assert_eq!(status.device_id, 1);
    assert_eq!(status.state, CaptureState::Active);

    // A device that opens but cannot read is skipped too
    let opener = SyntheticOpener::new().with_unreadable([0]);
    let manager = manager_with(opener, Arc::new(Metrics::new()));
    manager.acquire(0).unwrap();
    assert_eq!(manager.status().device_id, 1);
}

#[test]
fn concurrent_starts_run_one_loop() {
    let metrics = Arc::new(Metrics::new());
    let manager = Arc::new(manager_with(SyntheticOpener::new(), metrics.clone()));
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let manager = manager.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                barrier.wait();
                manager.start_streaming().unwrap()
            })
        })
        .collect();

    let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let started = outcomes.iter().filter(|o| **o == StartOutcome::Started).count();

    assert_eq!(started, 1);
    assert_eq!(metrics.snapshot().capture_loop_starts, 1);
    assert_eq!(manager.status().state, CaptureState::Streaming);

    manager.stop_streaming();
}

#[test]
fn concurrent_stops_and_releases_end_one_session() {
    let opener = SyntheticOpener::new();
    let manager = Arc::new(manager_with(opener.clone(), Arc::new(Metrics::new())));
    manager.start_streaming().unwrap();

    let barrier = Arc::new(Barrier::new(8));
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let manager = manager.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                barrier.wait();
                if i % 2 == 0 {
                    manager.stop_streaming()
                } else {
                    manager.release()
                }
            })
        })
        .collect();

    let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let stopped = outcomes.iter().filter(|o| **o == StopOutcome::Stopped).count();

    assert_eq!(stopped, 1);
    let status = manager.status();
    assert_eq!(status.state, CaptureState::Released);
    assert!(!status.is_streaming);
    assert!(status.resolution.is_none());
    assert_eq!(opener.open_count(), 1);
}

#[test]
fn racing_starts_and_releases_stay_consistent() {
    let opener = SyntheticOpener::new();
    let metrics = Arc::new(Metrics::new());
    let manager = Arc::new(manager_with(opener.clone(), metrics.clone()));

    let barrier = Arc::new(Barrier::new(8));
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let manager = manager.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                barrier.wait();
                if i % 2 == 0 {
                    manager.start_streaming().unwrap() == StartOutcome::Started
                } else {
                    manager.release();
                    false
                }
            })
        })
        .collect();

    let started = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|started| *started)
        .count();

    // Every start that ran a loop opened the device once, since only releases close it
    assert!(started >= 1);
    assert_eq!(opener.open_count(), started);
    assert_eq!(metrics.snapshot().capture_loop_starts as usize, started);

    let expected = if manager.is_streaming() {
        StopOutcome::Stopped
    } else {
        StopOutcome::NotStreaming
    };
    assert_eq!(manager.release(), expected);
    let status = manager.status();
    assert_eq!(status.state, CaptureState::Released);
    assert!(!status.is_streaming);
    assert_eq!(manager.release(), StopOutcome::NotStreaming);
}

#[test]
fn snapshot_requires_streaming() {
    let manager = manager_with(SyntheticOpener::new(), Arc::new(Metrics::new()));

    match manager.snapshot(FrameFormat::Jpeg) {
        Err(Error::StreamingError(message)) => assert!(message.contains("start the stream")),
        other => panic!("expected StreamingError, got {:?}", other),
    }

    manager.start_streaming().unwrap();
    for format in [FrameFormat::Jpeg, FrameFormat::Webp, FrameFormat::Png] {
        let frame = manager.snapshot(format).unwrap();
        assert!(!frame.is_empty());
        assert_eq!(frame.format, format);
    }
    manager.release();
}

#[test]
fn release_then_restart_reacquires() {
    let opener = SyntheticOpener::new();
    let manager = manager_with(opener.clone(), Arc::new(Metrics::new()));

    manager.start_streaming().unwrap();
    manager.release();

    let status = manager.status();
    assert_eq!(status.state, CaptureState::Released);
    assert!(!status.is_streaming);
    assert!(status.frame_rate.is_none());
    assert!(status.resolution.is_none());

    // Releasing twice is harmless
    manager.release();
    assert_eq!(manager.status().state, CaptureState::Released);

    assert_eq!(manager.start_streaming().unwrap(), StartOutcome::Started);
    let status = manager.status();
    assert_eq!(status.state, CaptureState::Streaming);
    assert_eq!(status.resolution.as_deref(), Some("64x48"));
    assert_eq!(status.frame_rate, Some(30));
    assert_eq!(opener.open_count(), 2);

    manager.release();
}

#[test]
fn device_loss_ends_streaming() {
    let opener = SyntheticOpener::new();
    let disconnect = opener.disconnect_switch();
    let metrics = Arc::new(Metrics::new());
    let manager = manager_with(opener, metrics.clone());

    manager.start_streaming().unwrap();
    assert!(wait_until(|| manager.try_take_frame().is_some()));

    disconnect.store(true, Ordering::SeqCst);
    assert!(wait_until(|| !manager.is_streaming()));
    assert_eq!(manager.status().state, CaptureState::Error);
    assert!(metrics.snapshot().read_failures >= 2);

    // The device comes back and the next start re-acquires it
    disconnect.store(false, Ordering::SeqCst);
    assert_eq!(manager.start_streaming().unwrap(), StartOutcome::Started);
    assert_eq!(manager.status().state, CaptureState::Streaming);
    manager.release();
}

#[test]
fn stop_is_bounded_and_idempotent() {
    let opener = SyntheticOpener::new().with_read_delay(Duration::from_millis(20));
    let manager = manager_with(opener, Arc::new(Metrics::new()));

    manager.start_streaming().unwrap();
    let started = Instant::now();
    manager.stop_streaming();
    manager.stop_streaming();

    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(!manager.is_streaming());
    assert_eq!(manager.status().state, CaptureState::Active);
}
