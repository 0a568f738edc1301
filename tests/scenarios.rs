// tests/scenarios.rs
//
// End-to-end runs through TestSession with synthetic sensor streams.

use motion_event_detection::analysis::measurement::EARTH_RADIUS_M;
use motion_event_detection::types::{
    BodyScaleConfig, LandmarkFrame, LandmarkId, Metric, PositionFix, Sample, TestEvent, TestKind,
};
use motion_event_detection::{start_session, Config};

fn landmarks(t: f64, heel_y: f64, toe_x: f64) -> Sample {
    Sample::Landmarks(
        LandmarkFrame::new(t)
            .with(LandmarkId::Nose, toe_x, 0.50)
            .with(LandmarkId::LeftHeel, toe_x - 0.03, heel_y)
            .with(LandmarkId::RightHeel, toe_x - 0.03, heel_y)
            .with(LandmarkId::LeftFootIndex, toe_x, heel_y + 0.01)
            .with(LandmarkId::RightFootIndex, toe_x, heel_y + 0.01),
    )
}

fn north(t: f64, metres: f64, heading: Option<f64>) -> Sample {
    Sample::Position(PositionFix {
        timestamp_ms: t,
        latitude: 28.6139 + (metres / EARTH_RADIUS_M).to_degrees(),
        longitude: 77.2090,
        accuracy_m: 4.0,
        heading_deg: heading,
    })
}

#[test]
fn test_horizontal_jump_end_to_end() {
    let mut config = Config::default();
    config.jump.body = BodyScaleConfig {
        frame_width_px: 1000.0,
        frame_height_px: 1000.0,
        athlete_height_cm: 170.0,
        ..BodyScaleConfig::default()
    };
    let mut session = start_session(TestKind::HorizontalJump, &config).unwrap();

    let mut t = 0.0;
    let mut events = Vec::new();
    // Standing: heel 0.80, nose 0.50 → 300px body
    for _ in 0..50 {
        events.extend(session.observe(&landmarks(t, 0.80, 0.40)));
        t += 33.0;
    }
    // Airborne for 20 frames, feet travelling forward
    for i in 0..20 {
        events.extend(session.observe(&landmarks(t, 0.55, 0.40 + i as f64 * 0.01)));
        t += 33.0;
    }
    // Back down, toes settled at 0.62
    for _ in 0..15 {
        events.extend(session.observe(&landmarks(t, 0.81, 0.62)));
        t += 33.0;
    }

    let takeoff = events
        .iter()
        .position(|e| matches!(e, TestEvent::Takeoff { .. }))
        .expect("takeoff event");
    let landing = events
        .iter()
        .position(|e| matches!(e, TestEvent::Landing { .. }))
        .expect("landing event");
    assert!(takeoff < landing);
    assert!(session.is_finished());

    let result = session.terminate();
    assert!(result.success, "{:?}", result.failure_reason);
    let Some(Metric::Jump { distance_cm, .. }) = result.metric else {
        panic!("expected jump metric, got {:?}", result.metric);
    };
    // (0.62 - 0.40) × 1000px × 170/300 cm/px
    assert!(distance_cm > 0.0);
    assert!((distance_cm - 220.0 * 170.0 / 300.0).abs() < 1e-6);
}

#[test]
fn test_shuttle_run_end_to_end() {
    let mut session = start_session(TestKind::ShuttleRun, &Config::default()).unwrap();
    let mut t = 0.0;
    let mut events = Vec::new();
    for _ in 0..3 {
        events.extend(session.observe(&north(t, 0.0, None)));
        t += 1000.0;
    }
    assert_eq!(session.state_label(), "tracking");

    let mut position = 0.0;
    for lap in 0..4 {
        let (direction, heading) = if lap % 2 == 0 {
            (1.0, 0.0)
        } else {
            (-1.0, 180.0)
        };
        for _ in 0..5 {
            position += direction * 2.0;
            events.extend(session.observe(&north(t, position, Some(heading))));
            t += 500.0;
        }
        if lap == 3 {
            break;
        }
        assert_eq!(session.state_label(), "waiting_for_direction_change");

        // Overrun past the line while still facing forward: paused
        for drift in [0.2, 0.4] {
            events.extend(session.observe(&north(t, position + direction * drift, Some(heading))));
            t += 500.0;
        }
        assert_eq!(session.state_label(), "waiting_for_direction_change");

        // 170° reversal resumes tracking
        let turned = (heading + 170.0) % 360.0;
        events.extend(session.observe(&north(t, position, Some(turned))));
        t += 500.0;
        assert_eq!(session.state_label(), "tracking");
    }

    assert_eq!(session.state_label(), "complete");
    let turns = events
        .iter()
        .filter(|e| matches!(e, TestEvent::DirectionChangeDetected { .. }))
        .count();
    assert_eq!(turns, 3);

    let result = session.terminate();
    let Some(Metric::ShuttleRun {
        run,
        laps_completed,
        direction_changes,
    }) = result.metric
    else {
        panic!("expected shuttle metric, got {:?}", result.failure_reason);
    };
    assert_eq!(laps_completed, 4);
    assert_eq!(direction_changes, 3);
    assert!((run.distance_m - 40.0).abs() < 1e-6);

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["metric"]["lapsCompleted"], 4);
}

#[test]
fn test_timed_run_end_to_end() {
    let mut config = Config::default();
    config.timed_run.target_distance_m = 30.0;
    config.timed_run.calibration_window_ms = 3000.0;
    let mut session = start_session(TestKind::TimedRun, &config).unwrap();

    // Settling: the runner shuffles 6m but none of it counts
    for (t, m) in [(0.0, 0.0), (1000.0, 2.0), (2000.0, 4.0), (3000.0, 6.0)] {
        session.observe(&north(t, m, None));
    }
    assert_eq!(session.state_label(), "tracking");

    let mut t = 3000.0;
    let mut position = 6.0;
    for _ in 0..7 {
        t += 1000.0;
        position += 4.0;
        session.observe(&north(t, position, None));
    }
    assert_eq!(session.state_label(), "tracking");

    t += 1000.0;
    let events = session.observe(&north(t, position + 5.0, None));
    assert!(matches!(events.last(), Some(TestEvent::TestComplete { .. })));
    assert!(session.is_finished());
    assert_eq!(session.teardown_deadline_ms(), Some(t + 1500.0));

    let result = session.terminate();
    let Some(Metric::TimedRun { run }) = result.metric else {
        panic!("expected timed run metric, got {:?}", result.failure_reason);
    };
    assert_eq!(run.distance_m, 30.0, "distance is capped at the target");
    assert_eq!(run.time_s, 8.0, "clock starts when the window closes");
}

#[test]
fn test_cancelled_session_reports_reason() {
    let mut session = start_session(TestKind::TimedRun, &Config::default()).unwrap();
    session.observe(&north(0.0, 0.0, None));
    session.observe(&north(3000.0, 0.0, None));
    session.observe(&north(4000.0, 10.0, None));

    let result = session.terminate();
    assert!(!result.success);
    assert_eq!(result.last_state, "tracking");
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["failureReason"], "target_not_reached");
}
