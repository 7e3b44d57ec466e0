//! HTTP front end for the vidqueue conversion queue.

pub mod api;
pub mod metrics;
pub mod state;
