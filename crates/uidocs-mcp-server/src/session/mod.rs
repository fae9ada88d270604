//! Session bookkeeping: identifiers, the registry of live endpoints and the
//! idle reaper that evicts abandoned ones.

pub mod id;
pub mod reaper;
pub mod registry;

pub use id::SessionId;
pub use reaper::IdleReaper;
pub use registry::{RegistryClosed, SessionInfo, SessionRegistry, ShutdownReport};
