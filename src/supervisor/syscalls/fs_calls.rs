// File system related syscall handlers

use std::rc::Rc;

use crate::interface;
use crate::interface::errnos::{syscall_error, Errno};
use crate::interface::{MemError, Notification, Reply};

use crate::supervisor::filesystem::{CowFile, OpenFile, PassthroughFile, ProcFile, TmpFile};
use crate::supervisor::router::{self, Route};
use crate::supervisor::Supervisor;

use super::fs_constants::*;

// iovec as it sits in guest memory (x86-64)
#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct GuestIovec {
    base: u64,
    len: u64,
}

fn mem_errno(e: MemError) -> Errno {
    match e {
        MemError::Fault | MemError::Partial { .. } => Errno::EFAULT,
        MemError::Vanished => Errno::ESRCH,
        MemError::Os(_) => Errno::EIO,
    }
}

impl Supervisor {
    /// ### Description
    ///
    /// `openat_syscall` virtualizes open for the calling guest. The path is
    /// read from guest memory, normalized, and routed to a backend; the
    /// resulting open file lands in the caller's FD table and the reply is
    /// the virtual FD. The dirfd argument is ignored because only absolute
    /// paths are accepted in this revision.
    ///
    /// ### Returns
    ///
    /// The new virtual FD (>= 3) on success; EINVAL for relative paths,
    /// EACCES for paths the policy blocks, ENOENT for unregistered /proc
    /// PIDs, and the backend's errno otherwise.
    pub fn openat_syscall(&mut self, notif: &Notification) -> Reply {
        let flags = notif.args[2] as i32;
        let mode = notif.args[3] as u32;

        let path = match interface::read_cstring(notif.pid, notif.args[1]) {
            Ok(p) => p,
            Err(e) => return syscall_error(mem_errno(e), "openat", "bad path pointer"),
        };
        if !path.starts_with('/') {
            return syscall_error(Errno::EINVAL, "openat", "relative paths are not supported");
        }
        let path = router::normalize(&path);

        let file = match router::route(&path) {
            Route::Blocked => {
                return syscall_error(Errno::EACCES, "openat", "path blocked by policy")
            }
            Route::Passthrough => match PassthroughFile::open(&path, flags, mode) {
                Ok(f) => OpenFile::Passthrough(f),
                Err(e) => return syscall_error(e, "openat", "passthrough open failed"),
            },
            Route::Cow => match CowFile::open(&self.overlay, &path, flags, mode) {
                Ok(f) => OpenFile::Cow(f),
                Err(e) => return syscall_error(e, "openat", "cow open failed"),
            },
            Route::Tmp => match TmpFile::open(&self.overlay, &path, flags, mode) {
                Ok(f) => OpenFile::Tmp(f),
                Err(e) => return syscall_error(e, "openat", "tmp open failed"),
            },
            Route::Proc => {
                // register any guests we have not observed yet, then resolve
                self.processes.sync_new();
                match self.open_proc(notif.pid, &path) {
                    Ok(f) => OpenFile::Proc(f),
                    Err(e) => return syscall_error(e, "openat", "proc open failed"),
                }
            }
        };

        let fdtable = match self.processes.get(notif.pid) {
            Some(p) => Rc::clone(&p.fdtable),
            None => return syscall_error(Errno::ESRCH, "openat", "caller not registered"),
        };
        let result = match fdtable.borrow_mut().insert(file) {
            Ok(vfd) => Reply::Value(vfd as i64),
            Err(e) => syscall_error(e, "openat", "fd table exhausted"),
        };
        result
    }

    // /proc/self, /proc/self/status, /proc/<N>, /proc/<N>/status. Numeric
    // components resolve in the caller's namespace.
    fn open_proc(&self, caller: i32, path: &str) -> Result<ProcFile, Errno> {
        let rest = path.strip_prefix("/proc").unwrap_or(path);
        let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();

        let (target, want_status) = match segments.as_slice() {
            ["self"] => (caller, false),
            ["self", "status"] => (caller, true),
            [pid] => {
                let n: i32 = pid.parse().map_err(|_| Errno::ENOENT)?;
                (self.processes.resolve_for(caller, n).ok_or(Errno::ENOENT)?, false)
            }
            [pid, "status"] => {
                let n: i32 = pid.parse().map_err(|_| Errno::ENOENT)?;
                (self.processes.resolve_for(caller, n).ok_or(Errno::ENOENT)?, true)
            }
            _ => return Err(Errno::ENOENT),
        };

        if want_status {
            let content = self.processes.proc_status(target).ok_or(Errno::ENOENT)?;
            return Ok(ProcFile::new(content));
        }
        // the directory form renders the target's identity in its own namespace
        let ns_pid = self
            .processes
            .ns_pid_of(target, target)
            .ok_or(Errno::ENOENT)?;
        Ok(ProcFile::new(format!("{}\n", ns_pid).into_bytes()))
    }

    pub fn read_syscall(&mut self, notif: &Notification) -> Reply {
        let fd = notif.args[0] as i32;
        let count = notif.args[2] as usize;
        if fd < STARTINGFD {
            // host stdio stays native
            return Reply::Continue;
        }
        let fdtable = match self.processes.get(notif.pid) {
            Some(p) => Rc::clone(&p.fdtable),
            None => return syscall_error(Errno::ESRCH, "read", "caller not registered"),
        };

        let mut buf = vec![0u8; count.min(MAX_IO_BYTES)];
        let got = {
            let mut table = fdtable.borrow_mut();
            let file = match table.get_mut(fd) {
                Some(f) => f,
                None => return syscall_error(Errno::EBADF, "read", "no such virtual fd"),
            };
            match file.read(&mut buf) {
                Ok(n) => n,
                Err(e) => return syscall_error(e, "read", "backend read failed"),
            }
        };
        if let Err(e) = interface::write_bytes(notif.pid, notif.args[1], &buf[..got]) {
            return syscall_error(mem_errno(e), "read", "bad destination buffer");
        }
        Reply::Value(got as i64)
    }

    pub fn write_syscall(&mut self, notif: &Notification) -> Reply {
        let fd = notif.args[0] as i32;
        let count = notif.args[2] as usize;
        if fd < STARTINGFD {
            tracing::debug!(pid = notif.pid, fd, count, "stdio write passed through");
            return Reply::Continue;
        }
        let fdtable = match self.processes.get(notif.pid) {
            Some(p) => Rc::clone(&p.fdtable),
            None => return syscall_error(Errno::ESRCH, "write", "caller not registered"),
        };

        let data = match interface::read_slice(notif.pid, notif.args[1], count.min(MAX_IO_BYTES)) {
            Ok(d) => d,
            Err(e) => return syscall_error(mem_errno(e), "write", "bad source buffer"),
        };
        let mut table = fdtable.borrow_mut();
        let file = match table.get_mut(fd) {
            Some(f) => f,
            None => return syscall_error(Errno::EBADF, "write", "no such virtual fd"),
        };
        match file.write(&data) {
            Ok(n) => Reply::Value(n as i64),
            Err(e) => syscall_error(e, "write", "backend write failed"),
        }
    }

    pub fn readv_syscall(&mut self, notif: &Notification) -> Reply {
        let fd = notif.args[0] as i32;
        if fd < STARTINGFD {
            return Reply::Continue;
        }
        let iovs = match self.read_guest_iovecs(notif.pid, notif.args[1], notif.args[2] as usize) {
            Ok(v) => v,
            Err(e) => return syscall_error(mem_errno(e), "readv", "bad iovec array"),
        };
        let fdtable = match self.processes.get(notif.pid) {
            Some(p) => Rc::clone(&p.fdtable),
            None => return syscall_error(Errno::ESRCH, "readv", "caller not registered"),
        };
        let mut table = fdtable.borrow_mut();
        let file = match table.get_mut(fd) {
            Some(f) => f,
            None => return syscall_error(Errno::EBADF, "readv", "no such virtual fd"),
        };

        let mut budget = MAX_IO_BYTES;
        let mut total = 0usize;
        for iov in iovs {
            let want = (iov.len as usize).min(budget);
            if want == 0 {
                break;
            }
            let mut buf = vec![0u8; want];
            let got = match file.read(&mut buf) {
                Ok(n) => n,
                Err(e) => return syscall_error(e, "readv", "backend read failed"),
            };
            if got > 0 {
                if let Err(e) = interface::write_bytes(notif.pid, iov.base, &buf[..got]) {
                    return syscall_error(mem_errno(e), "readv", "bad destination buffer");
                }
            }
            total += got;
            budget -= got;
            if got < want {
                break;
            }
        }
        Reply::Value(total as i64)
    }

    pub fn writev_syscall(&mut self, notif: &Notification) -> Reply {
        let fd = notif.args[0] as i32;
        if fd < STARTINGFD {
            tracing::debug!(pid = notif.pid, fd, "stdio writev passed through");
            return Reply::Continue;
        }
        let iovs = match self.read_guest_iovecs(notif.pid, notif.args[1], notif.args[2] as usize) {
            Ok(v) => v,
            Err(e) => return syscall_error(mem_errno(e), "writev", "bad iovec array"),
        };
        let fdtable = match self.processes.get(notif.pid) {
            Some(p) => Rc::clone(&p.fdtable),
            None => return syscall_error(Errno::ESRCH, "writev", "caller not registered"),
        };
        let mut table = fdtable.borrow_mut();
        let file = match table.get_mut(fd) {
            Some(f) => f,
            None => return syscall_error(Errno::EBADF, "writev", "no such virtual fd"),
        };

        let mut budget = MAX_IO_BYTES;
        let mut total = 0usize;
        for iov in iovs {
            let want = (iov.len as usize).min(budget);
            if want == 0 {
                break;
            }
            let data = match interface::read_slice(notif.pid, iov.base, want) {
                Ok(d) => d,
                Err(e) => return syscall_error(mem_errno(e), "writev", "bad source buffer"),
            };
            let put = match file.write(&data) {
                Ok(n) => n,
                Err(e) => return syscall_error(e, "writev", "backend write failed"),
            };
            total += put;
            budget -= put;
            if put < want {
                break;
            }
        }
        Reply::Value(total as i64)
    }

    // Beyond MAX_IOVCNT entries only the first MAX_IOVCNT are processed.
    fn read_guest_iovecs(
        &self,
        pid: i32,
        addr: u64,
        iovcnt: usize,
    ) -> Result<Vec<GuestIovec>, MemError> {
        let cnt = iovcnt.min(MAX_IOVCNT);
        let mut iovs = Vec::with_capacity(cnt);
        for i in 0..cnt {
            let iov: GuestIovec =
                interface::read_value(pid, addr + (i * std::mem::size_of::<GuestIovec>()) as u64)?;
            iovs.push(iov);
        }
        Ok(iovs)
    }

    pub fn close_syscall(&mut self, notif: &Notification) -> Reply {
        let fd = notif.args[0] as i32;
        if fd < STARTINGFD {
            return Reply::Continue;
        }
        let fdtable = match self.processes.get(notif.pid) {
            Some(p) => Rc::clone(&p.fdtable),
            None => return syscall_error(Errno::ESRCH, "close", "caller not registered"),
        };
        let result = match fdtable.borrow_mut().remove(fd) {
            Some(file) => {
                file.close();
                Reply::Value(0)
            }
            None => syscall_error(Errno::EBADF, "close", "no such virtual fd"),
        };
        result
    }
}
