//! Engine-facing abstractions: the event sink and the collaborator seams.

pub mod event;
pub mod interlock;

pub use event::{EngineEvent, EventDispatcher};
pub use interlock::{Interlock, JobSource, OperatorAuthorizer, RelayActuator, RelayOutput};
