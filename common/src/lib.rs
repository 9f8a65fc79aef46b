//! Ratefeed Common Types
//!
//! Currency codes, currency pairs and the monetary amount type shared by the
//! loader, the rate engine and the command line front end.

pub mod error;
pub mod monetary;
pub mod time;

pub use error::*;
pub use monetary::*;
pub use time::*;
