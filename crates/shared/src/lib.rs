//! Types shared between the feed client and anything that speaks its wire format.

pub mod domain;
pub mod error;
pub mod protocol;
