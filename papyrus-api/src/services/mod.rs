//! Service Layer
//!
//! Business logic between the routes and the store. Services speak the
//! domain error type; routes turn it into HTTP responses.

mod account;
mod activation;

pub use account::*;
pub use activation::*;
