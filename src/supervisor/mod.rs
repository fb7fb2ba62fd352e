//! The supervisor: syscall interception and emulation for one sandbox.
//!
//! ## top-level features:
//!
//! - ### Bootstrap:
//!     - Forks the guest, predicts the notifier FD number across the fork,
//!       pulls the notifier into the supervisor with pidfd_getfd, and
//!       verifies the prediction. Everything that can go wrong here tears
//!       the sandbox down.
//!
//! - ### Dispatcher:
//!     - Receives one notification at a time, looks the syscall up in the
//!       routing table, calls the matching handler (or answers directly for
//!       continue/block/not-implemented routes), and sends exactly one reply
//!       per notification.
//!
//! - ### Virtual processes:
//!     - Each guest process maps to a virtual process carrying its FD table
//!       and PID-namespace reference. Processes appear via clone events or
//!       lazy /proc discovery and disappear on exit_group or subtree kills.
//!
//! - ### Overlay filesystem:
//!     - Absolute guest paths route to a backend (blocked, passthrough,
//!       copy-on-write, private tmp, synthesized /proc); open files live in
//!       per-process FD tables as a tagged variant per backend.
//!
//! All state is owned by the [`Supervisor`] instance; two sandboxes in one
//! host process share nothing but the host kernel.

pub mod bootstrap;
pub mod dispatcher;
pub mod fdtable;
pub mod filesystem;
pub mod namespace;
pub mod process;
pub mod router;
pub mod syscall_numbers;
pub mod syscalls;

use crate::interface;

use filesystem::Overlay;
use process::ProcessTable;

pub use bootstrap::Guest;
pub use dispatcher::{Dispatcher, DispatcherState};

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("fork failed: {0}")]
    Fork(nix::errno::Errno),
    #[error("bootstrap channel failed: {0}")]
    Channel(std::io::Error),
    #[error("pidfd_open on the guest failed: {0}")]
    PidfdOpen(nix::errno::Errno),
    #[error("guest exited during bootstrap")]
    GuestDied,
    #[error("notifier fetch exhausted after {attempts} attempts")]
    FetchExhausted { attempts: u32 },
    #[error("fetched descriptor is not a seccomp notifier (got {0:?})")]
    NotANotifier(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
    #[error("notification transport failed: {0}")]
    Transport(nix::errno::Errno),
}

/// All supervisor state for one sandbox.
#[derive(Debug)]
pub struct Supervisor {
    pub overlay: Overlay,
    pub processes: ProcessTable,
}

impl Supervisor {
    pub fn new(overlay: Overlay, root_pid: i32) -> Supervisor {
        let mut processes = ProcessTable::new();
        processes.register_root(root_pid);
        tracing::info!(
            root_pid,
            overlay = %overlay.root().display(),
            "supervisor ready"
        );
        Supervisor { overlay, processes }
    }
}

/// Front door: run a workload under a fresh sandbox and supervise it to
/// completion on the calling thread.
pub struct Sandbox;

impl Sandbox {
    /// Fork the guest, run `workload` inside the sandbox, supervise every
    /// syscall, and return the guest's exit code.
    pub fn run<F: FnOnce() -> i32>(workload: F) -> Result<i32, SupervisorError> {
        let overlay = Overlay::new(interface::sandbox_uid());
        let guest = bootstrap::launch(workload)?;
        let supervisor = Supervisor::new(overlay, guest.pid);

        let mut dispatcher = Dispatcher::new(supervisor, guest.notifier);
        let run_result = dispatcher.run();

        let code = wait_exit_code(guest.pid);
        dispatcher.into_supervisor().overlay.teardown();
        run_result?;
        tracing::info!(pid = guest.pid, code, "sandbox finished");
        Ok(code)
    }
}

fn wait_exit_code(pid: i32) -> i32 {
    use nix::sys::wait::{waitpid, WaitStatus};
    loop {
        match waitpid(nix::unistd::Pid::from_raw(pid), None) {
            Ok(WaitStatus::Exited(_, code)) => return code,
            Ok(WaitStatus::Signaled(_, sig, _)) => return 128 + sig as i32,
            Ok(_) => continue,
            Err(nix::errno::Errno::EINTR) => continue,
            // already reaped during bootstrap error handling
            Err(_) => return -1,
        }
    }
}
