//! PPP protocol wire formats
//!
//! Protocol numbers and the shared control-protocol packet layout used by
//! LCP and CCP.

pub mod cp;
pub mod ppp;
