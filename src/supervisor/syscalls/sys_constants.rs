// System related constants

/// Clone flag: child gets a fresh PID namespace below the parent's.
pub const CLONE_NEWPID: u64 = libc::CLONE_NEWPID as u64;

/// Clone flag: child shares the parent's FD table instead of copying it.
pub const CLONE_FILES: u64 = libc::CLONE_FILES as u64;

/// The Name: field every synthesized /proc status reports.
pub const GUEST_COMM: &str = "bvisor";

/// A namespace's root process always sees itself as PID 1.
pub const NS_ROOT_PID: i32 = 1;
