//! Audio server backends
//!
//! Only the `pactl` command-line client is supported. It talks to both
//! PulseAudio and PipeWire (through pipewire-pulse).

pub mod pactl;

pub use pactl::PactlServer;
