#![cfg_attr(not(feature = "std"), no_std)]

// This mod MUST go first, so that the others see its macros.
#[macro_use]
pub(crate) mod fmt;

mod ppp;
pub mod pppos;
pub mod time;
mod wire;

pub use ppp::{Config, Handler, Ipv4Status, NullHandler, Phase, Status};
pub use pppos::{BufferFullError, PPPoS, PPPoSAction};
pub use time::{Duration, Instant};

/// The call was not valid for the current state of the link.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InvalidStateError;
