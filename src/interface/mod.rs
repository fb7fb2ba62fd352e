// Module definitions for the bvisor kernel interface
// this layer limits raw kernel access from the rest of the crate to one
// module tree: seccomp, pidfd, process_vm and /proc parsing all live here.

mod comm;
pub mod errnos;
mod mem;
mod misc;
mod notify;
mod pidfd;
mod procfs;
mod seccomp;

pub use comm::*;
pub use errnos::*;
pub use mem::*;
pub use misc::*;
pub use notify::*;
pub use pidfd::*;
pub use procfs::*;
pub use seccomp::*;
