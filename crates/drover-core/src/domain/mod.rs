//! Domain model (task documents, queue state, processing errors).

pub mod errors;
pub mod ids;
pub mod state;
pub mod task;

pub use self::errors::ProcessError;
pub use self::ids::{Revision, TaskId};
pub use self::state::{TaskStatus, TokenReset};
pub use self::task::{Task, TaskErrorEntry};
