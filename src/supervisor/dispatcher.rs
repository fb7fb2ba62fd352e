// Dispatcher: receives notifications, routes them by syscall number, and
// sends exactly one reply per notification.

use crate::interface::errnos::{syscall_error, Errno};
use crate::interface::{Notification, NotifyError, NotifyFd, Reply};

use super::syscall_numbers::syscall_name;
use super::{Supervisor, SupervisorError};

/// What the routing table says about one syscall number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallRoute {
    /// A handler produces the reply.
    Handle,
    /// The kernel re-runs the syscall natively.
    Continue,
    /// Denied outright.
    Block,
    /// Virtualization is planned but not built yet.
    ToImplement,
    /// Nobody has decided what this syscall should do in a sandbox.
    Undecided,
}

pub fn route_syscall(nr: i64) -> SyscallRoute {
    match nr {
        libc::SYS_read
        | libc::SYS_write
        | libc::SYS_readv
        | libc::SYS_writev
        | libc::SYS_openat
        | libc::SYS_close
        | libc::SYS_getpid
        | libc::SYS_getppid
        | libc::SYS_kill
        | libc::SYS_exit_group => SyscallRoute::Handle,

        // the kernel performs the clone; the child is discovered lazily
        libc::SYS_clone | libc::SYS_fork | libc::SYS_vfork => SyscallRoute::Continue,

        // memory management, scheduling, signals-on-self and read-only
        // identity are safe to run natively
        libc::SYS_brk
        | libc::SYS_mmap
        | libc::SYS_munmap
        | libc::SYS_mprotect
        | libc::SYS_mremap
        | libc::SYS_madvise
        | libc::SYS_rt_sigaction
        | libc::SYS_rt_sigprocmask
        | libc::SYS_rt_sigreturn
        | libc::SYS_sigaltstack
        | libc::SYS_futex
        | libc::SYS_sched_yield
        | libc::SYS_sched_getaffinity
        | libc::SYS_exit
        | libc::SYS_set_tid_address
        | libc::SYS_set_robust_list
        | libc::SYS_rseq
        | libc::SYS_gettid
        | libc::SYS_getuid
        | libc::SYS_getgid
        | libc::SYS_geteuid
        | libc::SYS_getegid
        | libc::SYS_uname
        | libc::SYS_getrandom
        | libc::SYS_clock_gettime
        | libc::SYS_clock_getres
        | libc::SYS_clock_nanosleep
        | libc::SYS_nanosleep
        | libc::SYS_gettimeofday
        | libc::SYS_arch_prctl
        | libc::SYS_prlimit64
        | libc::SYS_getrusage => SyscallRoute::Continue,

        // introspection and configuration surfaces a sandbox must not reach
        libc::SYS_ptrace
        | libc::SYS_process_vm_readv
        | libc::SYS_process_vm_writev
        | libc::SYS_mount
        | libc::SYS_umount2
        | libc::SYS_pivot_root
        | libc::SYS_chroot
        | libc::SYS_setns
        | libc::SYS_unshare
        | libc::SYS_reboot
        | libc::SYS_init_module
        | libc::SYS_finit_module
        | libc::SYS_delete_module
        | libc::SYS_kexec_load
        | libc::SYS_bpf
        | libc::SYS_perf_event_open
        | libc::SYS_add_key
        | libc::SYS_request_key
        | libc::SYS_keyctl
        | libc::SYS_seccomp => SyscallRoute::Block,

        // next in line for virtualization
        libc::SYS_open
        | libc::SYS_creat
        | libc::SYS_stat
        | libc::SYS_fstat
        | libc::SYS_lstat
        | libc::SYS_newfstatat
        | libc::SYS_statx
        | libc::SYS_lseek
        | libc::SYS_dup
        | libc::SYS_dup2
        | libc::SYS_dup3
        | libc::SYS_fcntl
        | libc::SYS_pread64
        | libc::SYS_pwrite64
        | libc::SYS_access
        | libc::SYS_faccessat
        | libc::SYS_getdents64
        | libc::SYS_getcwd
        | libc::SYS_chdir
        | libc::SYS_mkdir
        | libc::SYS_mkdirat
        | libc::SYS_unlink
        | libc::SYS_unlinkat
        | libc::SYS_readlink
        | libc::SYS_readlinkat
        | libc::SYS_execve
        | libc::SYS_wait4
        | libc::SYS_pipe
        | libc::SYS_pipe2 => SyscallRoute::ToImplement,

        _ => SyscallRoute::Undecided,
    }
}

impl Supervisor {
    /// Produce the reply for one notification. Never absent: every internal
    /// failure maps to an errno, so the guest is never left suspended.
    pub fn dispatch(&mut self, notif: &Notification) -> Reply {
        if !self.processes.contains(notif.pid) {
            // a syscall from a PID we have never seen: discover it
            self.processes.sync_new();
            if !self.processes.contains(notif.pid) {
                // /proc inference failed (the parent chain is already gone);
                // adopt under the sandbox root rather than dropping the reply
                if let Some(root) = self.processes.root() {
                    tracing::warn!(
                        pid = notif.pid,
                        "caller unknown after sync; adopting under root"
                    );
                    let _ = self.processes.register_child(root, notif.pid, 0);
                }
            }
        }

        let reply = match route_syscall(notif.syscall) {
            SyscallRoute::Handle => self.handle(notif),
            SyscallRoute::Continue => Reply::Continue,
            SyscallRoute::Block => {
                syscall_error(Errno::EPERM, syscall_name(notif.syscall), "blocked in sandbox")
            }
            SyscallRoute::ToImplement | SyscallRoute::Undecided => syscall_error(
                Errno::ENOSYS,
                syscall_name(notif.syscall),
                "not implemented by the supervisor",
            ),
        };
        tracing::debug!(
            pid = notif.pid,
            syscall = syscall_name(notif.syscall),
            ?reply,
            "dispatched"
        );
        reply
    }

    fn handle(&mut self, notif: &Notification) -> Reply {
        match notif.syscall {
            libc::SYS_openat => self.openat_syscall(notif),
            libc::SYS_read => self.read_syscall(notif),
            libc::SYS_write => self.write_syscall(notif),
            libc::SYS_readv => self.readv_syscall(notif),
            libc::SYS_writev => self.writev_syscall(notif),
            libc::SYS_close => self.close_syscall(notif),
            libc::SYS_getpid => self.getpid_syscall(notif),
            libc::SYS_getppid => self.getppid_syscall(notif),
            libc::SYS_kill => self.kill_syscall(notif),
            libc::SYS_exit_group => self.exit_group_syscall(notif),
            nr => syscall_error(Errno::ENOSYS, syscall_name(nr), "routed to handle without one"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    Running,
    /// The guest vanished; no more receives.
    Draining,
    Terminated,
}

/// Owns the main loop: one notification handled to completion before the
/// next is received.
pub struct Dispatcher {
    supervisor: Supervisor,
    notifier: NotifyFd,
    state: DispatcherState,
}

impl Dispatcher {
    pub fn new(supervisor: Supervisor, notifier: NotifyFd) -> Dispatcher {
        Dispatcher {
            supervisor,
            notifier,
            state: DispatcherState::Running,
        }
    }

    pub fn state(&self) -> DispatcherState {
        self.state
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    pub fn run(&mut self) -> Result<(), SupervisorError> {
        loop {
            let notif = match self.notifier.recv() {
                Ok(n) => n,
                Err(NotifyError::GuestGone) => {
                    tracing::info!("guest gone; dispatcher draining");
                    self.state = DispatcherState::Draining;
                    break;
                }
                Err(NotifyError::Os(e)) => {
                    self.state = DispatcherState::Terminated;
                    return Err(SupervisorError::Transport(e));
                }
            };

            let reply = self.supervisor.dispatch(&notif);
            match self.notifier.send(notif.id, reply) {
                Ok(()) => {}
                // the caller died between receive and reply
                Err(NotifyError::GuestGone) => {
                    tracing::debug!(id = notif.id, "reply target vanished")
                }
                Err(NotifyError::Os(e)) => {
                    self.state = DispatcherState::Terminated;
                    return Err(SupervisorError::Transport(e));
                }
            }
        }

        // draining: tear down whatever virtual state is left
        if let Some(root) = self.supervisor.processes.root() {
            self.supervisor.processes.kill(root);
        }
        self.state = DispatcherState::Terminated;
        Ok(())
    }

    pub fn into_supervisor(self) -> Supervisor {
        self.supervisor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimum_handled_set() {
        for nr in [
            libc::SYS_read,
            libc::SYS_write,
            libc::SYS_readv,
            libc::SYS_writev,
            libc::SYS_openat,
            libc::SYS_close,
            libc::SYS_getpid,
            libc::SYS_getppid,
            libc::SYS_kill,
            libc::SYS_exit_group,
        ] {
            assert_eq!(route_syscall(nr), SyscallRoute::Handle);
        }
    }

    #[test]
    fn clone_family_continues_in_kernel() {
        assert_eq!(route_syscall(libc::SYS_clone), SyscallRoute::Continue);
        assert_eq!(route_syscall(libc::SYS_fork), SyscallRoute::Continue);
        assert_eq!(route_syscall(libc::SYS_vfork), SyscallRoute::Continue);
    }

    #[test]
    fn sandbox_escapes_are_blocked() {
        assert_eq!(route_syscall(libc::SYS_ptrace), SyscallRoute::Block);
        assert_eq!(route_syscall(libc::SYS_mount), SyscallRoute::Block);
        assert_eq!(route_syscall(libc::SYS_seccomp), SyscallRoute::Block);
        assert_eq!(
            route_syscall(libc::SYS_process_vm_readv),
            SyscallRoute::Block
        );
    }

    #[test]
    fn everything_else_is_decided_or_flagged() {
        assert_eq!(route_syscall(libc::SYS_statx), SyscallRoute::ToImplement);
        // an absurd number falls through to undecided
        assert_eq!(route_syscall(99_999), SyscallRoute::Undecided);
    }
}
