//! Midimix GW - keeps an Akai MIDImix in sync with PulseAudio/PipeWire
//!
//! Library crate exposing the building blocks used by the `midimix-gw` binary.

pub mod audio;
pub mod config;
pub mod midi;
pub mod surface;
pub mod sync;
