use crate::numeric::{ComplexScalar, MpComplex, Vector, DOUBLE_PRECISION};
use num_complex::Complex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why tracking of a path stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackStatus {
    Success,
    MaxStepsExceeded,
    SingularJacobian,
    StepSizeTooSmall,
    PrecisionLimitReached,
    GoingToInfinity,
    EndgameDidNotConverge,
    NonFiniteValues,
}

impl TrackStatus {
    pub fn is_success(self) -> bool {
        self == TrackStatus::Success
    }
}

impl fmt::Display for TrackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TrackStatus::Success => "success",
            TrackStatus::MaxStepsExceeded => "maximum number of steps exceeded",
            TrackStatus::SingularJacobian => "singular Jacobian",
            TrackStatus::StepSizeTooSmall => "step size too small",
            TrackStatus::PrecisionLimitReached => "maximum precision reached",
            TrackStatus::GoingToInfinity => "path going to infinity",
            TrackStatus::EndgameDidNotConverge => "endgame did not converge",
            TrackStatus::NonFiniteValues => "non-finite values encountered",
        };
        f.write_str(text)
    }
}

/// Terminal point of a path at the precision it finished in.
#[derive(Debug, Clone, PartialEq)]
pub enum EndPoint {
    Double(Vec<Complex<f64>>),
    Multi(Vec<MpComplex>),
}

impl EndPoint {
    pub(crate) fn from_vector<T: ComplexScalar>(v: &Vector<T>) -> Self {
        let precision = v.precision();
        if precision <= DOUBLE_PRECISION {
            EndPoint::Double(v.to_c64())
        } else {
            EndPoint::Multi(v.iter().map(|z| MpComplex(z.to_mp(precision))).collect())
        }
    }

    pub fn to_c64(&self) -> Vec<Complex<f64>> {
        match self {
            EndPoint::Double(v) => v.clone(),
            EndPoint::Multi(v) => v.iter().map(|z| z.to_c64()).collect(),
        }
    }

    pub fn precision(&self) -> u32 {
        match self {
            EndPoint::Double(_) => DOUBLE_PRECISION,
            EndPoint::Multi(v) => v.first().map(|z| z.precision()).unwrap_or(DOUBLE_PRECISION),
        }
    }
}

/// Outcome of tracking a single path.
#[derive(Debug, Clone)]
pub struct EndgameResult {
    pub point: EndPoint,
    pub status: TrackStatus,
    /// Working precision when tracking stopped.
    pub precision: u32,
    /// Path parameter at which precision was first raised.
    pub precision_raised_at: Option<f64>,
    pub cycle_number: u32,
    /// Size of one Newton correction at the endpoint.
    pub newton_residual: f64,
    /// Norm of the homotopy at the endpoint.
    pub function_residual: f64,
    pub condition_number: f64,
    /// Path parameter at which tracking stopped (zero on success).
    pub final_parameter: f64,
    /// Point recorded when the path reached the endgame boundary.
    pub boundary_point: Option<Vec<Complex<f64>>>,
    pub steps: usize,
}

impl EndgameResult {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}
