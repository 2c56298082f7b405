//! Liveness probes for the data store and the companion sampler

mod port;
mod process;

pub use port::{parse_services, PortReport, PortScanner, DEFAULT_CONNECT_TIMEOUT};
pub use process::{ProcessStatus, ProcessTable, SystemProcessTable};
