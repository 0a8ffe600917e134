//! Core primitives.
//!
//! Digest helpers, the wall clock abstraction and session liveness tokens.
//! Nothing in here knows about payments or reveals.

pub mod clock;
pub mod hash;
pub mod liveness;
pub mod sync;

// Re-export core types
pub use clock::{Clock, SystemClock, TokioClock};
pub use hash::{Digest32, SeedHasher, DIGEST_HEX_LEN};
pub use liveness::{Liveness, LivenessGuard};
