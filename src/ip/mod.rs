//! Network helpers: CIDR parsing, reachability probes and ping sweeps.

pub mod cidr;
pub mod probe;
pub mod sweep;

pub use cidr::CidrError;
pub use probe::{CancelToken, ProbeOutcome, ProbeResult, Prober, SystemPing};
pub use sweep::{sweep, SweepSummary};
