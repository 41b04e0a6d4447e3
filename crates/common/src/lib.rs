//! Common types shared by the OAuth session crates

mod clock;
mod error;
mod secret;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use secret::Secret;
