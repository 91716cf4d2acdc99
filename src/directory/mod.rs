//! Player directory
//!
//! Registered players, their public indices and their current ratings.

pub mod index;
pub mod storage;

pub use index::{allocate_public_index, random_public_index};
pub use storage::{InMemoryPlayerDirectory, MockPlayerDirectory, PlayerDirectory};
