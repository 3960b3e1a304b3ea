//! faderlink core
//!
//! Maps the physical controls of a MIDI surface to volume actions on a
//! desktop audio server. Everything that touches real hardware or sockets
//! lives in the `infra` and `web` crates; this crate only sees them through
//! the [`domain::target::AudioServer`] trait and decoded
//! [`domain::midi::ControlEvent`]s.

pub mod domain;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;
