//! Player command surface
//!
//! Validates inbound commands, routes them to the ledger and renders the
//! replies players see.

pub mod replies;
pub mod router;

pub use router::CommandRouter;
