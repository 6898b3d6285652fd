//! Typed views of the Velero resources this webhook writes.
//!
//! Only the fields the webhook sets are modelled; Velero owns the rest.

pub mod backup;
pub mod schedule;
