// Memory bridge: reads and writes bytes in the guest's address space.
//
// Built on process_vm_readv/process_vm_writev, which copy between two
// address spaces by PID without stopping the target. The guest thread that
// issued the intercepted syscall is suspended until we reply, so the ranges
// its registers point at are stable while a handler runs.

use std::io::{IoSlice, IoSliceMut};

use nix::sys::uio::{process_vm_readv, process_vm_writev, RemoteIoVec};
use nix::unistd::Pid;

/// Longest guest string (path) a handler will pull across, in bytes.
pub const MAX_GUEST_STR: usize = 256;

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum MemError {
    /// The guest address range is not mapped (or not accessible).
    #[error("invalid guest address")]
    Fault,
    /// The guest process no longer exists.
    #[error("guest process vanished")]
    Vanished,
    /// The transfer stopped short of the requested length.
    #[error("partial transfer: wanted {wanted} bytes, moved {moved}")]
    Partial { wanted: usize, moved: usize },
    #[error("process_vm transfer failed: {0}")]
    Os(nix::errno::Errno),
}

fn map_errno(e: nix::errno::Errno) -> MemError {
    match e {
        nix::errno::Errno::EFAULT | nix::errno::Errno::EIO => MemError::Fault,
        nix::errno::Errno::ESRCH => MemError::Vanished,
        other => MemError::Os(other),
    }
}

/// Read exactly `buf.len()` bytes at `addr` in the guest.
pub fn read_bytes(pid: i32, addr: u64, buf: &mut [u8]) -> Result<(), MemError> {
    if buf.is_empty() {
        return Ok(());
    }
    let wanted = buf.len();
    let mut local = [IoSliceMut::new(buf)];
    let remote = [RemoteIoVec {
        base: addr as usize,
        len: wanted,
    }];
    match process_vm_readv(Pid::from_raw(pid), &mut local, &remote) {
        Ok(moved) if moved == wanted => Ok(()),
        Ok(moved) => Err(MemError::Partial { wanted, moved }),
        Err(e) => Err(map_errno(e)),
    }
}

/// Write all of `data` at `addr` in the guest.
pub fn write_bytes(pid: i32, addr: u64, data: &[u8]) -> Result<(), MemError> {
    if data.is_empty() {
        return Ok(());
    }
    let local = [IoSlice::new(data)];
    let remote = [RemoteIoVec {
        base: addr as usize,
        len: data.len(),
    }];
    match process_vm_writev(Pid::from_raw(pid), &local, &remote) {
        Ok(n) if n == data.len() => Ok(()),
        Ok(n) => Err(MemError::Partial {
            wanted: data.len(),
            moved: n,
        }),
        Err(e) => Err(map_errno(e)),
    }
}

/// Read one fixed-size value at `addr` in the guest.
pub fn read_value<T: Copy>(pid: i32, addr: u64) -> Result<T, MemError> {
    let mut val = std::mem::MaybeUninit::<T>::uninit();
    // SAFETY: the slice covers exactly the uninitialized value, and
    // read_bytes only returns Ok after filling every byte of it.
    let buf = unsafe {
        std::slice::from_raw_parts_mut(val.as_mut_ptr() as *mut u8, std::mem::size_of::<T>())
    };
    read_bytes(pid, addr, buf)?;
    Ok(unsafe { val.assume_init() })
}

/// Write one fixed-size value at `addr` in the guest.
pub fn write_value<T: Copy>(pid: i32, addr: u64, val: &T) -> Result<(), MemError> {
    // SAFETY: T is Copy (plain data), so viewing it as bytes is sound.
    let buf = unsafe {
        std::slice::from_raw_parts(val as *const T as *const u8, std::mem::size_of::<T>())
    };
    write_bytes(pid, addr, buf)
}

/// Read `len` bytes at `addr` in the guest.
pub fn read_slice(pid: i32, addr: u64, len: usize) -> Result<Vec<u8>, MemError> {
    let mut buf = vec![0u8; len];
    read_bytes(pid, addr, &mut buf)?;
    Ok(buf)
}

const PAGE_BYTES: usize = 4096;

/// Read a null-terminated guest string, bounded at MAX_GUEST_STR bytes.
///
/// A missing terminator within the bound truncates to the bound. Transfers
/// go page by page: process_vm_readv never splits a single iovec, so one
/// 256-byte request spanning into an unmapped page would fault even when
/// the string's terminator sits in the mapped part. A string that really
/// does run off mapped memory before a terminator is a fault.
pub fn read_cstring(pid: i32, addr: u64) -> Result<String, MemError> {
    let mut out: Vec<u8> = Vec::with_capacity(64);
    let mut cur = addr;
    while out.len() < MAX_GUEST_STR {
        let page_left = PAGE_BYTES - (cur as usize & (PAGE_BYTES - 1));
        let want = page_left.min(MAX_GUEST_STR - out.len());
        let mut chunk = vec![0u8; want];
        read_bytes(pid, cur, &mut chunk)?;
        if let Some(nul) = chunk.iter().position(|&b| b == 0) {
            out.extend_from_slice(&chunk[..nul]);
            return Ok(String::from_utf8_lossy(&out).into_owned());
        }
        out.extend_from_slice(&chunk);
        cur += want as u64;
    }
    Ok(String::from_utf8_lossy(&out).into_owned())
}
