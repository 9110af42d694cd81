//! Saved-session round trips through a live session.

use std::time::Duration;

use stackscope_analysis::{AggregateKind, ZoneShape};
use stackscope_core::Rect;
use stackscope_session::{AnalysisSession, SessionConfig, SessionFile};
use stackscope_source::{stack::write_npy, LoadOptions};

fn session() -> AnalysisSession {
    AnalysisSession::new(SessionConfig {
        compute_workers: 2,
        job_channel_capacity: 4,
        store: None,
    })
}

#[test]
fn test_capture_restore_roundtrip() {
    let tmp = tempfile::tempdir().unwrap();
    let stack = tmp.path().join("data.npy");
    let data: Vec<u8> = (0..4 * 9).map(|i| i as u8).collect();
    write_npy(&stack, "|u1", &[4, 3, 3], &data).unwrap();

    let original = session();
    original
        .load_dataset(&[stack], LoadOptions::default())
        .unwrap();
    original.add_zone(ZoneShape::Rect(Rect::new(0.0, 0.0, 2.0, 2.0)), "first");
    original.add_zone(
        ZoneShape::Polygon {
            vertices: vec![[0.0, 0.0], [3.0, 0.0], [1.5, 2.5]],
        },
        "second",
    );

    let file = SessionFile::capture(&original);
    let path = tmp.path().join("session.json");
    file.save_to_file(&path).unwrap();
    drop(original);

    let loaded = SessionFile::load_from_file(&path).unwrap();
    let restored = session();
    let zone_ids = loaded.restore(&restored).unwrap();

    assert_eq!(restored.frame_count(), 4);
    let zones = restored.list_zones();
    assert_eq!(zones.len(), 2);
    assert_eq!(zones[0].label, "first");
    assert_eq!(zones[1].label, "second");
    assert_eq!(zones[0].id, zone_ids[0]);

    // Series are recomputed from the dataset, not restored.
    let series = restored
        .request_series_blocking(zone_ids[0], AggregateKind::Max, Duration::from_secs(30))
        .unwrap();
    assert_eq!(series.computed_count(), 4);
    // Frame f holds values f*9 .. f*9+8; the 2x2 zone maxes at f*9 + 4.
    assert_eq!(series.value(3), Some(3.0 * 9.0 + 4.0));
}

#[test]
fn test_capture_without_dataset() {
    let empty = session();
    empty.add_zone(ZoneShape::Rect(Rect::new(1.0, 1.0, 2.0, 2.0)), "zone");

    let file = SessionFile::capture(&empty);
    assert!(file.dataset_paths.is_empty());
    assert_eq!(file.zones.len(), 1);

    let restored = session();
    let ids = file.restore(&restored).unwrap();
    assert_eq!(ids.len(), 1);
    assert_eq!(restored.frame_count(), 0);
}
