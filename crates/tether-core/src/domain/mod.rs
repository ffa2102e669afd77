//! Domain model (ids, deferred results, errors, status views).

pub mod deferred;
pub mod errors;
pub mod ids;
pub mod status;

pub use self::deferred::{Deferred, Promise};
pub use self::errors::{CallError, HostError};
pub use self::ids::TargetId;
pub use self::status::{HostStatus, TargetStats, TargetStatus};
