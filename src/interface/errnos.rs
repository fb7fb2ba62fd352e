// Errno values and the errno-shaped reply helper.
//
// Every syscall handler failure funnels through syscall_error so that the
// guest always receives a well-formed errno and the supervisor log records
// which call produced it.

use crate::interface::notify::Reply;

/// Kernel errno values (x86-64 Linux discriminants).
#[repr(i32)]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Errno {
    EPERM = 1,
    ENOENT = 2,
    ESRCH = 3,
    EINTR = 4,
    EIO = 5,
    ENXIO = 6,
    E2BIG = 7,
    ENOEXEC = 8,
    EBADF = 9,
    ECHILD = 10,
    EAGAIN = 11,
    ENOMEM = 12,
    EACCES = 13,
    EFAULT = 14,
    EBUSY = 16,
    EEXIST = 17,
    EXDEV = 18,
    ENODEV = 19,
    ENOTDIR = 20,
    EISDIR = 21,
    EINVAL = 22,
    ENFILE = 23,
    EMFILE = 24,
    ENOTTY = 25,
    EFBIG = 27,
    ENOSPC = 28,
    ESPIPE = 29,
    EROFS = 30,
    EMLINK = 31,
    EPIPE = 32,
    ERANGE = 34,
    ENAMETOOLONG = 36,
    ENOSYS = 38,
    ENOTEMPTY = 39,
    ELOOP = 40,
}

impl Errno {
    pub fn from_discriminant(discriminant: i32) -> Result<Self, ()> {
        match discriminant {
            1 => Ok(Errno::EPERM),
            2 => Ok(Errno::ENOENT),
            3 => Ok(Errno::ESRCH),
            4 => Ok(Errno::EINTR),
            5 => Ok(Errno::EIO),
            6 => Ok(Errno::ENXIO),
            7 => Ok(Errno::E2BIG),
            8 => Ok(Errno::ENOEXEC),
            9 => Ok(Errno::EBADF),
            10 => Ok(Errno::ECHILD),
            11 => Ok(Errno::EAGAIN),
            12 => Ok(Errno::ENOMEM),
            13 => Ok(Errno::EACCES),
            14 => Ok(Errno::EFAULT),
            16 => Ok(Errno::EBUSY),
            17 => Ok(Errno::EEXIST),
            18 => Ok(Errno::EXDEV),
            19 => Ok(Errno::ENODEV),
            20 => Ok(Errno::ENOTDIR),
            21 => Ok(Errno::EISDIR),
            22 => Ok(Errno::EINVAL),
            23 => Ok(Errno::ENFILE),
            24 => Ok(Errno::EMFILE),
            25 => Ok(Errno::ENOTTY),
            27 => Ok(Errno::EFBIG),
            28 => Ok(Errno::ENOSPC),
            29 => Ok(Errno::ESPIPE),
            30 => Ok(Errno::EROFS),
            31 => Ok(Errno::EMLINK),
            32 => Ok(Errno::EPIPE),
            34 => Ok(Errno::ERANGE),
            36 => Ok(Errno::ENAMETOOLONG),
            38 => Ok(Errno::ENOSYS),
            39 => Ok(Errno::ENOTEMPTY),
            40 => Ok(Errno::ELOOP),
            _ => Err(()),
        }
    }
}

impl From<std::io::Error> for Errno {
    fn from(err: std::io::Error) -> Self {
        match err.raw_os_error().map(Errno::from_discriminant) {
            Some(Ok(e)) => e,
            // no raw errno (or one outside our table): report a plain I/O error
            _ => Errno::EIO,
        }
    }
}

/// Produce an errno reply, logging which syscall failed and why.
pub fn syscall_error(e: Errno, syscall: &str, message: &str) -> Reply {
    tracing::debug!(errno = ?e, syscall, message, "syscall error");
    Reply::Err(e)
}
