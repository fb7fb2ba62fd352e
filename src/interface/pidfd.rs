// Process-descriptor primitives for the bootstrap handshake.
//
// pidfd_getfd needs ptrace-level access to the target; the guest is our
// direct fork child, so the default PTRACE_MODE_ATTACH check passes.

use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

/// Open a process descriptor referring to `pid`.
pub fn pidfd_open(pid: i32) -> Result<OwnedFd, nix::errno::Errno> {
    let ret = unsafe { libc::syscall(libc::SYS_pidfd_open, pid, 0u32) };
    if ret < 0 {
        return Err(nix::errno::Errno::last());
    }
    // SAFETY: the kernel just handed us this descriptor; nothing else owns it.
    Ok(unsafe { OwnedFd::from_raw_fd(ret as RawFd) })
}

/// Duplicate `target_fd` out of the descriptor table of the process behind
/// `pidfd` into our own table.
pub fn pidfd_getfd(pidfd: &OwnedFd, target_fd: RawFd) -> Result<OwnedFd, nix::errno::Errno> {
    let ret = unsafe {
        libc::syscall(
            libc::SYS_pidfd_getfd,
            pidfd.as_raw_fd(),
            target_fd,
            0u32,
        )
    };
    if ret < 0 {
        return Err(nix::errno::Errno::last());
    }
    // SAFETY: as above.
    Ok(unsafe { OwnedFd::from_raw_fd(ret as RawFd) })
}

/// What the kernel object behind a local FD is, per /proc/self/fd.
pub fn fd_object_name(fd: RawFd) -> std::io::Result<String> {
    let link = std::fs::read_link(format!("/proc/self/fd/{}", fd))?;
    Ok(link.to_string_lossy().into_owned())
}
