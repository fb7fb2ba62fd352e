// File system related constants

/// Virtual FDs are allocated from here; 0-2 stay with the host stdio.
pub const STARTINGFD: i32 = 3;

/// On-disk base for every sandbox's overlay root.
pub const OVERLAY_BASE: &str = "/tmp/.bvisor/sb";

/// Largest buffer a read/write handler moves across address spaces per call.
pub const MAX_IO_BYTES: usize = 4096;

/// readv/writev process at most this many iovec entries per call.
pub const MAX_IOVCNT: usize = 16;

/// Synthesized /proc content is capped at this size.
pub const PROC_CONTENT_BYTES: usize = 256;
