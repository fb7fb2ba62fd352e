// Notifier FD: one record per intercepted syscall, one reply per record.
//
// The structs mirror the kernel's seccomp user-notification ABI. They are
// declared here rather than pulled from a binding crate so the interface
// layer controls exactly what the rest of the crate can touch.

use std::os::fd::{AsRawFd, OwnedFd, RawFd};

use crate::interface::errnos::Errno;

const SECCOMP_IOC_MAGIC: u8 = b'!';
pub const SECCOMP_USER_NOTIF_FLAG_CONTINUE: u32 = 1;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct SeccompData {
    pub nr: i32,
    pub arch: u32,
    pub instruction_pointer: u64,
    pub args: [u64; 6],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct SeccompNotif {
    pub id: u64,
    pub pid: u32,
    pub flags: u32,
    pub data: SeccompData,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct SeccompNotifResp {
    pub id: u64,
    pub val: i64,
    pub error: i32,
    pub flags: u32,
}

nix::ioctl_readwrite!(seccomp_notif_recv, SECCOMP_IOC_MAGIC, 0, SeccompNotif);
nix::ioctl_readwrite!(seccomp_notif_send, SECCOMP_IOC_MAGIC, 1, SeccompNotifResp);

/// One intercepted syscall, as delivered by the kernel. Ephemeral: lives only
/// between receive and reply, and the reply must echo `id` exactly once.
#[derive(Debug, Clone, Copy)]
pub struct Notification {
    pub id: u64,
    pub pid: i32,
    pub syscall: i64,
    pub args: [u64; 6],
}

impl Notification {
    fn from_raw(raw: &SeccompNotif) -> Self {
        Notification {
            id: raw.id,
            pid: raw.pid as i32,
            syscall: raw.data.nr as i64,
            args: raw.data.args,
        }
    }
}

/// The supervisor's verdict for one notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// Let the kernel re-run the syscall natively.
    Continue,
    /// Synthesized success with this return value.
    Value(i64),
    /// Synthesized failure with this errno.
    Err(Errno),
}

pub fn encode_resp(id: u64, reply: Reply) -> SeccompNotifResp {
    match reply {
        Reply::Continue => SeccompNotifResp {
            id,
            val: 0,
            error: 0,
            flags: SECCOMP_USER_NOTIF_FLAG_CONTINUE,
        },
        Reply::Value(val) => SeccompNotifResp {
            id,
            val,
            error: 0,
            flags: 0,
        },
        Reply::Err(e) => SeccompNotifResp {
            id,
            val: 0,
            error: -(e as i32),
            flags: 0,
        },
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// No live task references the filter any more.
    #[error("guest vanished")]
    GuestGone,
    #[error("notifier ioctl failed: {0}")]
    Os(nix::errno::Errno),
}

/// Supervisor-owned handle to the kernel notifier.
#[derive(Debug)]
pub struct NotifyFd {
    fd: OwnedFd,
}

impl NotifyFd {
    pub fn from_owned(fd: OwnedFd) -> Self {
        NotifyFd { fd }
    }

    pub fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    /// Block until the next notification arrives.
    ///
    /// ENOENT from the recv ioctl is ambiguous: it is returned both when the
    /// target of a pending notification was killed mid-delivery (transient)
    /// and after every task using the filter has exited (terminal). A zero
    /// timeout poll disambiguates: POLLHUP means the filter is dead.
    pub fn recv(&self) -> Result<Notification, NotifyError> {
        loop {
            let mut raw = SeccompNotif::default();
            match unsafe { seccomp_notif_recv(self.fd.as_raw_fd(), &mut raw) } {
                Ok(_) => return Ok(Notification::from_raw(&raw)),
                Err(nix::errno::Errno::EINTR) => continue,
                Err(nix::errno::Errno::ENOENT) => {
                    if self.hung_up() {
                        return Err(NotifyError::GuestGone);
                    }
                    continue;
                }
                Err(e) => return Err(NotifyError::Os(e)),
            }
        }
    }

    /// Send the reply for notification `id`. ENOENT means the target died
    /// while the supervisor was handling its syscall; callers may ignore it.
    pub fn send(&self, id: u64, reply: Reply) -> Result<(), NotifyError> {
        let mut resp = encode_resp(id, reply);
        match unsafe { seccomp_notif_send(self.fd.as_raw_fd(), &mut resp) } {
            Ok(_) => Ok(()),
            Err(nix::errno::Errno::ENOENT) => Err(NotifyError::GuestGone),
            Err(e) => Err(NotifyError::Os(e)),
        }
    }

    fn hung_up(&self) -> bool {
        let mut pfd = libc::pollfd {
            fd: self.fd.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let ret = unsafe { libc::poll(&mut pfd, 1, 0) };
        ret > 0 && pfd.revents & (libc::POLLHUP | libc::POLLERR) != 0
    }
}
