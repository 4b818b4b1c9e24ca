//! ppplink - Userland PPP link engine
//!
//! Implements the PPP protocol core in userspace: HDLC framing over
//! asynchronous and synchronous lines, the RFC 1661 option-negotiation
//! state machine shared by LCP and CCP, the CCP compression plug-ins
//! (Predictor-1 and Deflate), and Van Jacobson TCP/IP header compression.

pub mod buffer;
pub mod compress;
pub mod config;
pub mod error;
pub mod fsm;
pub mod hdlc;
pub mod link;
pub mod protocol;
pub mod telemetry;
pub mod timer;
pub mod vj;

pub use error::{Error, Result};
