//! Scenario tests driving the coordinators against an in-memory server.
//!
//! Everything runs on `pollster` with a timer that only yields, so poll loops
//! interleave with in-flight calls the same way they do in the browser.

pub(crate) mod fixtures;
