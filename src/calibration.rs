//! Setpoint planning and the calibration procedure.
//!
//! A calibration run walks a plan of pressure setpoints; at each setpoint the
//! operator "fixes" the current live measurement, which records the reference
//! pressure, the electrical signal, the pressure the signal implies through
//! the ideal transfer function, and a pass/fail verdict against the allowed
//! error. Relay measurements carry no transfer function and always pass.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

use crate::error::{AppResult, CalError};
use crate::protocol::measurement::{Measurement, Mode};

/// An ordered plan of pressure setpoints over a calibrated span.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibPlan {
    low: f64,
    high: f64,
    targets: Vec<f64>,
}

impl CalibPlan {
    /// Builds a plan of `point_count` evenly spaced setpoints from `low` to
    /// `high`, rounded to six decimals. With `include_reverse` the plan walks
    /// back down without repeating the top point, for `2n - 1` setpoints.
    ///
    /// Degenerate input (`point_count < 2`, equal or non-finite bounds)
    /// yields an empty plan, which the engine refuses to fix points against.
    pub fn build(low: f64, high: f64, point_count: usize, include_reverse: bool) -> Self {
        if point_count < 2 || !low.is_finite() || !high.is_finite() || low == high {
            return Self {
                low,
                high,
                targets: Vec::new(),
            };
        }

        let step = (high - low) / (point_count - 1) as f64;
        let mut targets: Vec<f64> = (0..point_count)
            .map(|i| round6(low + i as f64 * step))
            .collect();
        if include_reverse {
            let reverse: Vec<f64> = targets.iter().rev().skip(1).copied().collect();
            targets.extend(reverse);
        }
        Self { low, high, targets }
    }

    /// Lower bound of the calibrated span.
    pub fn low(&self) -> f64 {
        self.low
    }

    /// Upper bound of the calibrated span.
    pub fn high(&self) -> f64 {
        self.high
    }

    /// The setpoints in fixation order.
    pub fn targets(&self) -> &[f64] {
        &self.targets
    }

    /// Number of setpoints.
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Whether the plan holds no setpoints.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Width of the calibrated span, guarded to 1.0 so transfer functions
    /// and error percentages never divide by zero.
    pub fn span(&self) -> f64 {
        let span = (self.high - self.low).abs();
        if span == 0.0 {
            1.0
        } else {
            span
        }
    }
}

fn round6(value: f64) -> f64 {
    (value * 1e6).round() / 1e6
}

/// Pass/fail outcome of a fixed point or a whole run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    /// Error within tolerance, or no calculated pressure to compare.
    Pass,
    /// Error above tolerance.
    Fail,
}

/// One fixed calibration point.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibPoint {
    /// 1-based position in the plan.
    pub index: usize,
    /// Wall-clock time of fixation.
    pub fixed_at: DateTime<Utc>,
    /// Seconds since the first fixed point of the run.
    pub elapsed_seconds: f64,
    /// The planned setpoint pressure.
    pub p_set: f64,
    /// Reference pressure from the instrument's internal sensor.
    pub p_reference: f64,
    /// Electrical signal of the device under test.
    pub signal: f64,
    /// Pressure implied by the signal through the ideal transfer function.
    /// `None` for relay measurements.
    pub p_calculated: Option<f64>,
    /// `|p_calculated - p_reference| / span * 100`; `None` for relay
    /// measurements.
    pub percent_error: Option<f64>,
    /// Per-point verdict against the allowed error.
    pub verdict: Verdict,
}

/// State machine for one calibration run.
pub struct CalibrationEngine {
    plan: CalibPlan,
    points: Vec<CalibPoint>,
    started: Option<Instant>,
}

impl CalibrationEngine {
    /// Creates an engine over `plan` with no points fixed.
    pub fn new(plan: CalibPlan) -> Self {
        Self {
            plan,
            points: Vec::new(),
            started: None,
        }
    }

    /// The plan this run walks.
    pub fn plan(&self) -> &CalibPlan {
        &self.plan
    }

    /// Points fixed so far, in fixation order.
    pub fn points(&self) -> &[CalibPoint] {
        &self.points
    }

    /// Fixes `measurement` against the next unfilled setpoint.
    ///
    /// The first fixation establishes the run's elapsed-time origin.
    /// `max_error_percent` is the inclusive tolerance: a point passes when
    /// its error does not exceed it, or when the measurement mode has no
    /// transfer function at all.
    pub fn fix_point(
        &mut self,
        measurement: &Measurement,
        max_error_percent: f64,
    ) -> AppResult<CalibPoint> {
        if self.plan.is_empty() {
            return Err(CalError::PlanEmpty);
        }
        if self.points.len() >= self.plan.len() {
            return Err(CalError::PlanExhausted);
        }

        let slot = self.points.len();
        let p_set = self.plan.targets()[slot];
        let low = self.plan.low();
        let span = self.plan.span();
        let signal = f64::from(measurement.signal);
        let p_reference = f64::from(measurement.pressure);

        let p_calculated = match measurement.mode {
            Mode::CurrentToPressure => Some(low + (signal - 4.0) * span / 16.0),
            Mode::VoltageToPressure => Some(low + signal * span / 10.0),
            Mode::Relay => None,
        };
        let percent_error = p_calculated.map(|p_calc| (p_calc - p_reference).abs() / span * 100.0);
        let verdict = match percent_error {
            Some(err) if err > max_error_percent => Verdict::Fail,
            _ => Verdict::Pass,
        };

        let started = *self.started.get_or_insert_with(Instant::now);
        let point = CalibPoint {
            index: slot + 1,
            fixed_at: Utc::now(),
            elapsed_seconds: started.elapsed().as_secs_f64(),
            p_set,
            p_reference,
            signal,
            p_calculated,
            percent_error,
            verdict,
        };
        debug!(
            index = point.index,
            p_set, p_reference, ?percent_error, "fixed calibration point"
        );
        self.points.push(point.clone());
        Ok(point)
    }

    /// Removes and returns the most recently fixed point, if any. When the
    /// run becomes empty again, the elapsed-time origin is cleared so the
    /// next fixation restarts the clock.
    pub fn undo_last(&mut self) -> Option<CalibPoint> {
        let point = self.points.pop();
        if self.points.is_empty() {
            self.started = None;
        }
        point
    }

    /// Whether every plan setpoint has been fixed.
    pub fn is_complete(&self) -> bool {
        !self.plan.is_empty() && self.points.len() == self.plan.len()
    }

    /// Overall verdict of the run: `Pass` only if every point passed.
    /// Undefined (`None`) until the run is complete.
    pub fn overall_verdict(&self) -> Option<Verdict> {
        if !self.is_complete() {
            return None;
        }
        let all_pass = self.points.iter().all(|p| p.verdict == Verdict::Pass);
        Some(if all_pass { Verdict::Pass } else { Verdict::Fail })
    }

    /// Discards all fixed points and installs a new plan.
    pub fn reset(&mut self, plan: CalibPlan) {
        self.plan = plan;
        self.points.clear();
        self.started = None;
    }
}
