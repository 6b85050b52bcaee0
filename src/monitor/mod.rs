//! Health checking: HTTP probes, retrying poll cycles, and the up/down
//! status state machine.

pub mod poller;
pub mod probe;
pub mod status;
