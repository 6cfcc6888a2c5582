//! Injectable capabilities: filesystem access and wall-clock time.

mod clock;
mod fs;

pub use clock::{Clock, ManualClock, SystemClock};
pub use fs::{Filesystem, MemoryFilesystem, OsFilesystem};
