//! At-rest protection for secret values. [`envelope`] handles encryption,
//! [`signing`] the optional integrity tags layered on top.

pub mod envelope;
pub mod signing;
