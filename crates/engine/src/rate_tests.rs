// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::{Duration, Instant};

use super::RateWindow;

#[test]
fn admits_up_to_limit_then_rejects() {
    let mut window = RateWindow::new();
    let now = Instant::now();
    assert!(window.try_admit_at(now, 3));
    assert!(window.try_admit_at(now, 3));
    assert!(window.try_admit_at(now, 3));
    assert!(!window.try_admit_at(now, 3));
    assert_eq!(window.len(), 3);
}

#[test]
fn entries_expire_after_window() {
    let mut window = RateWindow::new();
    let start = Instant::now();
    assert!(window.try_admit_at(start, 1));
    assert!(!window.try_admit_at(start + Duration::from_secs(59), 1));
    // One second past the window the old entry is pruned.
    assert!(window.try_admit_at(start + Duration::from_secs(61), 1));
    assert_eq!(window.len(), 1);
}

#[test]
fn window_never_exceeds_limit_over_any_interval() {
    let mut window = RateWindow::new();
    let start = Instant::now();
    let mut admitted = 0u32;
    // Attempt an admission every 100ms for 2 simulated minutes.
    for tick in 0..1200u64 {
        let now = start + Duration::from_millis(tick * 100);
        if window.try_admit_at(now, 5) {
            admitted += 1;
        }
        assert!(window.len() <= 5, "window overflow at tick {tick}");
    }
    // 2 minutes at 5/minute can admit at most 11 given boundary pruning.
    assert!(admitted <= 11, "admitted {admitted}");
}

#[test]
fn limit_floor_of_one_still_admits() {
    let mut window = RateWindow::new();
    assert!(window.try_admit_at(Instant::now(), 1));
    assert!(!window.is_empty());
}

proptest::proptest! {
    #[test]
    fn arbitrary_schedules_never_overflow(
        mut offsets_ms in proptest::collection::vec(0u64..180_000, 1..200),
        limit in 1u32..12,
    ) {
        offsets_ms.sort_unstable();
        let mut window = RateWindow::new();
        let start = Instant::now();
        for off in offsets_ms {
            let _ = window.try_admit_at(start + Duration::from_millis(off), limit);
            proptest::prop_assert!(window.len() <= limit as usize);
        }
    }
}
