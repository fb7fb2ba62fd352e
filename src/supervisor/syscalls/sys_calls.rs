// Process related syscall handlers

use crate::interface::errnos::{syscall_error, Errno};
use crate::interface::{Notification, Reply};

use crate::supervisor::process::VirtualProcess;
use crate::supervisor::Supervisor;

impl Supervisor {
    // getpid/getppid cannot fail on Linux. A caller the dispatcher could not
    // register is a collapsed invariant, not an errno.
    fn must_get(&self, pid: i32, syscall: &str) -> &VirtualProcess {
        self.processes.get(pid).unwrap_or_else(|| {
            panic!(
                "{}: caller {} missing from the process table after lazy sync",
                syscall, pid
            )
        })
    }

    /// The caller's kernel PID. (Namespace-relative identity is presented
    /// through the virtualized /proc in this revision.)
    pub fn getpid_syscall(&mut self, notif: &Notification) -> Reply {
        let proc_ = self.must_get(notif.pid, "getpid");
        Reply::Value(proc_.pid as i64)
    }

    /// The parent's kernel PID when the parent is visible from the caller's
    /// namespace; 0 otherwise (the parent is outside the caller's world).
    pub fn getppid_syscall(&mut self, notif: &Notification) -> Reply {
        let proc_ = self.must_get(notif.pid, "getppid");
        match proc_.parent {
            Some(parent) if self.processes.can_see(notif.pid, parent) => {
                Reply::Value(parent as i64)
            }
            _ => Reply::Value(0),
        }
    }

    /// ### Description
    ///
    /// `kill_syscall` resolves the target the way the caller names it (its
    /// namespace-relative PID first, a visible kernel PID second), forwards
    /// the signal to the host kernel, and for SIGKILL also removes the
    /// target's virtual subtree so the registry never outlives the process
    /// tree it mirrors.
    ///
    /// ### Returns
    ///
    /// 0 on success; EINVAL for process-group targets (pid <= 0, not
    /// supported in this revision); ESRCH when the target is not visible
    /// from the caller's namespace.
    pub fn kill_syscall(&mut self, notif: &Notification) -> Reply {
        let target = notif.args[0] as i32;
        let signal = notif.args[1] as i32;

        if target <= 0 {
            return syscall_error(Errno::EINVAL, "kill", "process groups are not supported");
        }
        let kpid = match self.processes.resolve_for(notif.pid, target) {
            Some(k) => k,
            None => return syscall_error(Errno::ESRCH, "kill", "target not visible"),
        };

        let ret = unsafe { libc::kill(kpid, signal) };
        if ret != 0 {
            let e = Errno::from(std::io::Error::last_os_error());
            return syscall_error(e, "kill", "host kill failed");
        }
        if signal == libc::SIGKILL {
            self.processes.kill(kpid);
        }
        Reply::Value(0)
    }

    /// ### Description
    ///
    /// `exit_group_syscall` tears down the caller's virtual subtree: every
    /// descendant is unregistered from its namespaces and FD tables are
    /// drained (entries closed) when the last reference goes. The reply is
    /// continue-in-kernel so the real exit_group still runs and the process
    /// actually dies.
    pub fn exit_group_syscall(&mut self, notif: &Notification) -> Reply {
        let code = notif.args[0] as i32;
        tracing::debug!(pid = notif.pid, code, "guest exit_group");
        self.processes.kill(notif.pid);
        Reply::Continue
    }
}
