// Syscall-filter builder and guest-side installer.
//
// The filter is classic BPF over seccomp_data. Every terminal rule in the
// first-revision program returns the user-notification verdict; the
// selective builder lets a later revision pre-decide allow/deny in the
// kernel and notify only for syscalls that need emulation.
//
// Constants are declared locally: they are kernel ABI, fixed for the
// architecture this crate supports.

use std::os::fd::RawFd;

// seccomp(2)
const SECCOMP_SET_MODE_FILTER: libc::c_uint = 1;
const SECCOMP_FILTER_FLAG_NEW_LISTENER: libc::c_uint = 1 << 3;

// filter return verdicts
const SECCOMP_RET_KILL_PROCESS: u32 = 0x8000_0000;
const SECCOMP_RET_ERRNO: u32 = 0x0005_0000;
const SECCOMP_RET_USER_NOTIF: u32 = 0x7fc0_0000;
const SECCOMP_RET_ALLOW: u32 = 0x7fff_0000;

// BPF instruction classes and fields
const BPF_LD: u16 = 0x00;
const BPF_JMP: u16 = 0x05;
const BPF_RET: u16 = 0x06;
const BPF_W: u16 = 0x00;
const BPF_ABS: u16 = 0x20;
const BPF_JEQ: u16 = 0x10;
const BPF_K: u16 = 0x00;

const BPF_MAXINSNS: usize = 4096;

const AUDIT_ARCH_X86_64: u32 = 0xc000_003e;

// seccomp_data offsets (x86-64)
const OFFSET_SYSCALL_NR: u32 = 0;
const OFFSET_ARCH: u32 = 4;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SockFilter {
    pub code: u16,
    pub jt: u8,
    pub jf: u8,
    pub k: u32,
}

impl SockFilter {
    #[inline]
    pub const fn stmt(code: u16, k: u32) -> Self {
        Self {
            code,
            jt: 0,
            jf: 0,
            k,
        }
    }

    #[inline]
    pub const fn jump(code: u16, k: u32, jt: u8, jf: u8) -> Self {
        Self { code, jt, jf, k }
    }
}

#[repr(C)]
struct SockFprog {
    len: u16,
    filter: *const SockFilter,
}

/// Kernel-level verdict a filter rule pre-decides for one syscall.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterVerdict {
    /// Suspend the syscall and post a notification to the supervisor.
    Notify,
    /// Run natively, never reaching the supervisor.
    Allow,
    /// Fail with EPERM in the kernel, never reaching the supervisor.
    Deny,
}

fn verdict_ret(v: FilterVerdict) -> u32 {
    match v {
        FilterVerdict::Notify => SECCOMP_RET_USER_NOTIF,
        FilterVerdict::Allow => SECCOMP_RET_ALLOW,
        FilterVerdict::Deny => SECCOMP_RET_ERRNO | libc::EPERM as u32,
    }
}

/// Build a filter from per-syscall rules plus a default verdict.
///
/// Layout:
/// ```text
/// [0-2]        architecture check (x86-64, kill otherwise)
/// [3]          load syscall number
/// [4..4+2n]    per-rule: JEQ nr ? fallthrough-to-RET : skip-RET
/// [last]       RET default
/// ```
/// Each rule emits its own RET, so no jump offset ever exceeds 1 and the
/// rule count is bounded only by the kernel's program-size cap.
pub fn build_filter(rules: &[(i64, FilterVerdict)], default: FilterVerdict) -> Vec<SockFilter> {
    let mut filter = Vec::with_capacity(5 + rules.len() * 2);

    filter.push(SockFilter::stmt(BPF_LD | BPF_W | BPF_ABS, OFFSET_ARCH));
    filter.push(SockFilter::jump(
        BPF_JMP | BPF_JEQ | BPF_K,
        AUDIT_ARCH_X86_64,
        1,
        0,
    ));
    filter.push(SockFilter::stmt(BPF_RET | BPF_K, SECCOMP_RET_KILL_PROCESS));

    filter.push(SockFilter::stmt(
        BPF_LD | BPF_W | BPF_ABS,
        OFFSET_SYSCALL_NR,
    ));

    for &(nr, verdict) in rules {
        filter.push(SockFilter::jump(BPF_JMP | BPF_JEQ | BPF_K, nr as u32, 0, 1));
        filter.push(SockFilter::stmt(BPF_RET | BPF_K, verdict_ret(verdict)));
    }

    filter.push(SockFilter::stmt(BPF_RET | BPF_K, verdict_ret(default)));

    assert!(
        filter.len() <= BPF_MAXINSNS,
        "filter program too large: {} instructions",
        filter.len()
    );
    filter
}

/// The first-revision program: every syscall notifies the supervisor.
pub fn build_notify_all() -> Vec<SockFilter> {
    build_filter(&[], FilterVerdict::Notify)
}

/// Set the process-wide no-new-privileges bit. Required before an
/// unprivileged process may install a filter.
pub fn set_no_new_privs() -> Result<(), nix::errno::Errno> {
    let ret = unsafe { libc::prctl(libc::PR_SET_NO_NEW_PRIVS, 1, 0, 0, 0) };
    if ret != 0 {
        return Err(nix::errno::Errno::last());
    }
    Ok(())
}

/// Install `prog` on the calling process and return the notifier FD.
///
/// Runs in the guest. The caller must have set no-new-privileges first.
pub fn install_notify_listener(prog: &[SockFilter]) -> Result<RawFd, nix::errno::Errno> {
    let fprog = SockFprog {
        len: prog.len() as u16,
        filter: prog.as_ptr(),
    };
    let ret = unsafe {
        libc::syscall(
            libc::SYS_seccomp,
            SECCOMP_SET_MODE_FILTER,
            SECCOMP_FILTER_FLAG_NEW_LISTENER,
            &fprog as *const SockFprog,
        )
    };
    if ret < 0 {
        return Err(nix::errno::Errno::last());
    }
    Ok(ret as RawFd)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notify_all_shape() {
        let prog = build_notify_all();
        // 3 (arch) + 1 (load nr) + 1 (default ret)
        assert_eq!(prog.len(), 5);
        assert_eq!(
            prog[0],
            SockFilter::stmt(BPF_LD | BPF_W | BPF_ABS, OFFSET_ARCH)
        );
        assert_eq!(prog[1].k, AUDIT_ARCH_X86_64);
        assert_eq!(prog[2].k, SECCOMP_RET_KILL_PROCESS);
        assert_eq!(prog[4], SockFilter::stmt(BPF_RET | BPF_K, SECCOMP_RET_USER_NOTIF));
    }

    #[test]
    fn selective_rules_emit_paired_ret() {
        let prog = build_filter(
            &[
                (libc::SYS_getpid, FilterVerdict::Allow),
                (libc::SYS_openat, FilterVerdict::Notify),
                (libc::SYS_ptrace, FilterVerdict::Deny),
            ],
            FilterVerdict::Notify,
        );
        // 4 header + 3 * 2 rules + 1 default
        assert_eq!(prog.len(), 11);

        assert_eq!(prog[4].k, libc::SYS_getpid as u32);
        assert_eq!(prog[5].k, SECCOMP_RET_ALLOW);
        assert_eq!(prog[6].k, libc::SYS_openat as u32);
        assert_eq!(prog[7].k, SECCOMP_RET_USER_NOTIF);
        assert_eq!(prog[8].k, libc::SYS_ptrace as u32);
        assert_eq!(prog[9].k, SECCOMP_RET_ERRNO | libc::EPERM as u32);
        assert_eq!(prog[10].k, SECCOMP_RET_USER_NOTIF);
    }

    #[test]
    fn rule_jumps_never_exceed_one() {
        let rules: Vec<(i64, FilterVerdict)> =
            (0..300).map(|nr| (nr, FilterVerdict::Allow)).collect();
        let prog = build_filter(&rules, FilterVerdict::Notify);
        assert!(prog.iter().all(|insn| insn.jt <= 1 && insn.jf <= 1));
    }
}
