//! dockerboot daemon: configuration loading and the control API

pub mod api;
pub mod config;
