//! Full procedures driven by the simulated calibrator.

use stmp960::calibration::{CalibPlan, CalibrationEngine, Verdict};
use stmp960::monitor::MonitoringBuffer;
use stmp960::session::SessionEvent;
use stmp960::sim::{self, SimOptions};

async fn next_measurement(
    rx: &mut tokio::sync::mpsc::Receiver<SessionEvent>,
) -> stmp960::protocol::measurement::Measurement {
    loop {
        match rx.recv().await.expect("simulator stopped") {
            SessionEvent::Measurement(m) => return m,
            SessionEvent::Fault(err) => panic!("unexpected fault: {err}"),
        }
    }
}

#[tokio::test]
async fn ideal_transmitter_passes_a_full_calibration() {
    let mut rx = sim::spawn(SimOptions {
        sample_rate_hz: 500.0,
        low: 0.0,
        high: 10.0,
        ..SimOptions::default()
    });

    let plan = CalibPlan::build(0.0, 10.0, 5, true);
    assert_eq!(plan.len(), 9);
    let mut engine = CalibrationEngine::new(plan);

    while !engine.is_complete() {
        let m = next_measurement(&mut rx).await;
        // The simulator's transmitter is ideal, so even a loose tolerance
        // only has to absorb f32 rounding.
        engine.fix_point(&m, 0.1).unwrap();
    }

    assert_eq!(engine.points().len(), 9);
    assert_eq!(engine.overall_verdict(), Some(Verdict::Pass));
    for (i, point) in engine.points().iter().enumerate() {
        assert_eq!(point.index, i + 1);
        assert!(point.percent_error.unwrap() < 0.01);
    }
}

#[tokio::test]
async fn undo_reopens_the_run() {
    let mut rx = sim::spawn(SimOptions {
        sample_rate_hz: 500.0,
        ..SimOptions::default()
    });
    let mut engine = CalibrationEngine::new(CalibPlan::build(0.0, 10.0, 2, false));

    let m = next_measurement(&mut rx).await;
    engine.fix_point(&m, 0.1).unwrap();
    let m = next_measurement(&mut rx).await;
    engine.fix_point(&m, 0.1).unwrap();
    assert!(engine.is_complete());

    engine.undo_last().unwrap();
    assert!(!engine.is_complete());
    assert_eq!(engine.overall_verdict(), None);

    let m = next_measurement(&mut rx).await;
    engine.fix_point(&m, 0.1).unwrap();
    assert!(engine.is_complete());
}

#[tokio::test]
async fn monitoring_tracks_simulated_pressure_window() {
    let mut rx = sim::spawn(SimOptions {
        sample_rate_hz: 500.0,
        low: 2.0,
        high: 6.0,
        ..SimOptions::default()
    });

    let mut buffer = MonitoringBuffer::with_capacity(16);
    buffer.start();
    for _ in 0..40 {
        let m = next_measurement(&mut rx).await;
        assert!(buffer.record(&m));
    }

    assert_eq!(buffer.len(), 16);
    let stats = buffer.stats().unwrap();
    assert!(stats.min >= 1.999 && stats.max <= 6.001);
    assert!(stats.span >= 0.0);

    buffer.pause();
    let m = next_measurement(&mut rx).await;
    assert!(!buffer.record(&m));
    assert_eq!(buffer.len(), 16);
}
