//! Admission surface: HTTP submission endpoint and per-user rate ceiling

mod limiter;
mod routes;

pub use limiter::{RateDecision, RateLimiter};
pub use routes::{AdmissionState, router};
