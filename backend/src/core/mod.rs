//! Scheduling primitives

pub mod time;
