//! Access-control core.
//!
//! Zone policy, access filtering, trust scoring, session lifecycle and the
//! audit ledger, composed around each inference call by [`pipeline`].

pub mod access;
pub mod audit;
pub mod locks;
pub mod pipeline;
pub mod policy;
pub mod session;
pub mod trust;
