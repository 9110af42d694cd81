//! End-to-end session scenarios: load, zones, series, invalidation, failure.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use stackscope_analysis::{AggregateKind, EntryState, ZoneShape};
use stackscope_core::{Rect, StackscopeError};
use stackscope_session::{AnalysisSession, SessionConfig, SessionUpdate};
use stackscope_source::{stack::write_npy, LoadOptions};

const WAIT: Duration = Duration::from_secs(30);

fn session() -> AnalysisSession {
    AnalysisSession::new(SessionConfig {
        compute_workers: 2,
        job_channel_capacity: 4,
        store: None,
    })
}

fn rect(x: f32, y: f32, w: f32, h: f32) -> ZoneShape {
    ZoneShape::Rect(Rect::new(x, y, w, h))
}

/// 100 zero frames of 10x10, except frame 50 carries a 3x3 block of nines
/// at rows/cols 3..6.
fn write_block_stack(dir: &std::path::Path) -> PathBuf {
    let path = dir.join("block.npy");
    let mut data = vec![0u8; 100 * 100];
    for y in 3..6 {
        for x in 3..6 {
            data[50 * 100 + y * 10 + x] = 9;
        }
    }
    write_npy(&path, "|u1", &[100, 10, 10], &data).unwrap();
    path
}

/// 10 frames of 4x4 where pixel (y, x) of frame f is `f*10 + y*4 + x`.
fn write_gradient_stack(dir: &std::path::Path) -> PathBuf {
    let path = dir.join("gradient.npy");
    let mut data = Vec::with_capacity(10 * 16);
    for f in 0..10u8 {
        for y in 0..4u8 {
            for x in 0..4u8 {
                data.push(f * 10 + y * 4 + x);
            }
        }
    }
    write_npy(&path, "|u1", &[10, 4, 4], &data).unwrap();
    path
}

#[test]
fn test_block_sum_series() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write_block_stack(tmp.path());

    let session = session();
    let frames = session
        .load_dataset(&[path], LoadOptions::default())
        .unwrap();
    assert_eq!(frames, 100);

    let zone = session.add_zone(rect(3.0, 3.0, 3.0, 3.0), "block");
    let series = session
        .request_series_blocking(zone, AggregateKind::Sum, WAIT)
        .unwrap();

    assert_eq!(series.len(), 100);
    for index in 0..100 {
        let value = series.value(index).expect("entry should be computed");
        let expected = if index == 50 { 81.0 } else { 0.0 };
        assert_eq!(value, expected, "sum at frame {index}");
    }
}

#[test]
fn test_update_never_surfaces_old_geometry() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write_gradient_stack(tmp.path());

    let session = session();
    session
        .load_dataset(&[path], LoadOptions::default())
        .unwrap();

    // Zone over pixel (0, 0): value f*10.
    let zone = session.add_zone(rect(0.0, 0.0, 1.0, 1.0), "probe");
    let before = session
        .request_series_blocking(zone, AggregateKind::Sum, WAIT)
        .unwrap();
    for f in 0..10 {
        assert_eq!(before.value(f), Some(f as f64 * 10.0));
    }

    // Move to pixel (1, 1): value f*10 + 5.
    session.update_zone(zone, rect(1.0, 1.0, 1.0, 1.0)).unwrap();

    // Immediately after the update is acknowledged, every visible entry
    // either reflects the new geometry or is not computed at all.
    let snapshot = session.series(zone, AggregateKind::Sum).unwrap();
    for f in 0..10 {
        if let Some(value) = snapshot.value(f) {
            assert_eq!(value, f as f64 * 10.0 + 5.0, "stale value at frame {f}");
        }
    }

    let after = session
        .request_series_blocking(zone, AggregateKind::Sum, WAIT)
        .unwrap();
    for f in 0..10 {
        assert_eq!(after.value(f), Some(f as f64 * 10.0 + 5.0));
    }
}

#[test]
fn test_two_zones_are_independent() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write_gradient_stack(tmp.path());

    let session = session();
    session
        .load_dataset(&[path], LoadOptions::default())
        .unwrap();

    let a = session.add_zone(rect(0.0, 0.0, 1.0, 1.0), "a");
    let b = session.add_zone(rect(2.0, 2.0, 1.0, 1.0), "b");

    session
        .request_series_blocking(a, AggregateKind::Mean, WAIT)
        .unwrap();
    let b_before = session
        .request_series_blocking(b, AggregateKind::Mean, WAIT)
        .unwrap();
    assert_eq!(b_before.computed_count(), 10);

    // Mutating one zone must not touch the other's validity bitmap.
    session.update_zone(a, rect(3.0, 3.0, 1.0, 1.0)).unwrap();
    let b_after = session.series(b, AggregateKind::Mean).unwrap();
    assert_eq!(b_after.computed_count(), 10);
    for f in 0..10 {
        assert_eq!(b_after.value(f), b_before.value(f));
    }
}

#[test]
fn test_frame_index_bounds() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write_gradient_stack(tmp.path());

    let session = session();
    let count = session
        .load_dataset(&[path], LoadOptions::default())
        .unwrap();

    assert!(session.frame(count - 1).is_ok());
    let err = session.frame(count).unwrap_err();
    assert!(matches!(
        err,
        StackscopeError::IndexOutOfRange { index, count: c } if index == count && c == count
    ));
}

#[test]
fn test_decode_failure_marks_entries_failed_and_retries() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write_gradient_stack(tmp.path());

    let session = session();
    session
        .load_dataset(&[path.clone()], LoadOptions::default())
        .unwrap();
    let zone = session.add_zone(rect(0.0, 0.0, 2.0, 2.0), "probe");

    // Pull the data out from under the session: every uncached read fails.
    let bytes = std::fs::read(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    let failed = session
        .request_series_blocking(zone, AggregateKind::Mean, WAIT)
        .unwrap();
    let failed_count = (0..failed.len())
        .filter(|&f| failed.state(f) == Some(EntryState::Failed))
        .count();
    assert!(failed_count > 0, "expected failed entries");

    // Failed entries stay failed until explicitly retried.
    let still = session.series(zone, AggregateKind::Mean).unwrap();
    assert_eq!(
        (0..still.len())
            .filter(|&f| still.state(f) == Some(EntryState::Failed))
            .count(),
        failed_count
    );

    // Restore the file and retry.
    std::fs::write(&path, bytes).unwrap();
    let retried = session.retry_failed(zone, AggregateKind::Mean).unwrap();
    assert_eq!(retried, failed_count);

    let recovered = session
        .request_series_blocking(zone, AggregateKind::Mean, WAIT)
        .unwrap();
    assert_eq!(recovered.computed_count(), recovered.len());
}

#[test]
fn test_visible_range_settles_first() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write_block_stack(tmp.path());

    let session = session();
    session
        .load_dataset(&[path], LoadOptions::default())
        .unwrap();
    session.set_visible_range(40..60).unwrap();

    let zone = session.add_zone(rect(3.0, 3.0, 3.0, 3.0), "block");
    let series = session
        .request_series_blocking(zone, AggregateKind::Sum, WAIT)
        .unwrap();

    // The blocking request targets the visible range.
    assert!(series.is_settled_over(40..60));
    assert_eq!(series.value(50), Some(81.0));
}

#[test]
fn test_subscription_reports_progress() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write_gradient_stack(tmp.path());

    let session = session();
    session
        .load_dataset(&[path], LoadOptions::default())
        .unwrap();
    let zone = session.add_zone(rect(0.0, 0.0, 4.0, 4.0), "all");

    let updates = session.subscribe();
    session.series(zone, AggregateKind::Sum).unwrap();

    let mut seen = std::collections::HashSet::new();
    let deadline = Instant::now() + WAIT;
    while seen.len() < 10 && Instant::now() < deadline {
        match updates.recv_timeout(Duration::from_millis(100)) {
            Ok(SessionUpdate::SeriesUpdated { zone: z, frames, .. }) if z == zone => {
                seen.extend(frames);
            }
            Ok(_) | Err(_) => {}
        }
    }
    assert_eq!(seen.len(), 10, "updates should cover every frame");
}

#[test]
fn test_dataset_swap_resets_series_and_keeps_zones() {
    let tmp = tempfile::tempdir().unwrap();
    let gradient = write_gradient_stack(tmp.path());
    let block = write_block_stack(tmp.path());

    let session = session();
    session
        .load_dataset(&[gradient], LoadOptions::default())
        .unwrap();
    let zone = session.add_zone(rect(3.0, 3.0, 3.0, 3.0), "block");
    session
        .request_series_blocking(zone, AggregateKind::Sum, WAIT)
        .unwrap();

    let frames = session
        .load_dataset(&[block], LoadOptions::default())
        .unwrap();
    assert_eq!(frames, 100);
    assert_eq!(session.list_zones().len(), 1);

    // Series restart from scratch at the new frame count.
    let series = session.series(zone, AggregateKind::Sum).unwrap();
    assert_eq!(series.len(), 100);

    let settled = session
        .request_series_blocking(zone, AggregateKind::Sum, WAIT)
        .unwrap();
    assert_eq!(settled.value(50), Some(81.0));
}

#[test]
fn test_reduce_frames_mean() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("pair.npy");
    let mut data = vec![10u8; 4];
    data.extend(vec![30u8; 4]);
    write_npy(&path, "|u1", &[2, 2, 2], &data).unwrap();

    let session = session();
    session
        .load_dataset(&[path], LoadOptions::default())
        .unwrap();

    let mean = session
        .reduce_frames(0..2, stackscope_analysis::ReduceOp::Mean)
        .unwrap();
    assert_eq!(mean.sample(0, 0, 0), 20.0);
    assert_eq!(mean.sample(1, 1, 0), 20.0);
}
