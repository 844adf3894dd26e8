//! Promotion-effect learning and recommendation.
//!
//! Everything here is synchronous and free of I/O: undefined ratios, thin
//! evidence and missing profiles come back as `None`, never as errors.
//! Repository access and task fan-out live in [`crate::pipeline`].

pub mod aggregate;
pub mod decline;
pub mod elasticity;
pub mod learner;
pub mod recommend;
pub mod uplift;
