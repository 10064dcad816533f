#![cfg_attr(not(any(test, feature = "std")), no_std)]

// This must go FIRST so that all the other modules see its macros.
mod fmt;

pub mod config;
pub mod consts;
pub mod mac;
pub mod phy;
#[cfg(feature = "test_helpers")]
pub mod test_helpers;
pub mod time;
pub mod wire;
