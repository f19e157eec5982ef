//! Terminal client for the Caatuu Chinese tutor.
//!
//! Keeps one WebSocket session to the tutor service, falls back to a local
//! simulator while the link is down, and routes replies to the surface that
//! asked for them.

pub mod audio_utils;
pub mod config;
pub mod repl;
pub mod simulator;
pub mod ws;
