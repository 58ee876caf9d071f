//! Konica Minolta CL-200A chroma meter.
//!
//! Serial protocol per the CL-200A communication manual: 7 data bits,
//! even parity, one stop bit, every exchange framed by STX/ETX with a BCC.

pub mod codec;
pub mod session;

pub use codec::{Command, CommandCode, ResponseFault, ResponseFields};
pub use session::{Cl200aSession, SessionOptions, SessionState};
