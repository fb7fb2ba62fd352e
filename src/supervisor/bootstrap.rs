// Interception bootstrap: fork the guest, move the notifier FD across.
//
// The guest cannot simply send the notifier over a socket: once the filter
// is installed, the sending write would itself suspend on notification with
// nobody yet listening. So the guest *predicts* the FD number the listener
// will get, ships the prediction while its syscalls still run natively, and
// the supervisor pulls that descriptor out with pidfd_getfd afterwards.

use std::os::fd::AsRawFd;
use std::os::unix::net::UnixStream;
use std::time::Duration;

use nix::unistd::ForkResult;

use crate::interface;
use crate::interface::NotifyFd;

use super::BootstrapError;

const FETCH_ATTEMPTS: u32 = 100;
const FETCH_BACKOFF: Duration = Duration::from_millis(5);

/// What /proc/self/fd reports for a seccomp notifier.
const NOTIFIER_LINK: &str = "anon_inode:seccomp notify";

// Guest-side exit codes for bootstrap failures. The supervisor only ever
// observes these as "guest died during bootstrap".
const EXIT_BOOTSTRAP_FAILED: i32 = 112;
const EXIT_PREDICTION_MISMATCH: i32 = 113;

/// A supervised guest: its kernel PID and the notifier delivering its
/// intercepted syscalls.
pub struct Guest {
    pub pid: i32,
    pub notifier: NotifyFd,
}

/// Fork and supervise `workload`. Returns once the notifier is in hand; the
/// guest may already be executing (its syscalls queue on the listener).
pub fn launch<F: FnOnce() -> i32>(workload: F) -> Result<Guest, BootstrapError> {
    let (mut sup_sock, guest_sock) =
        interface::prediction_channel().map_err(BootstrapError::Channel)?;

    // SAFETY: the supervisor is single-threaded by design (see the
    // concurrency model); the child only runs async-signal-safe calls plus
    // our own allocation-free bootstrap before the workload takes over.
    match unsafe { nix::unistd::fork() }.map_err(BootstrapError::Fork)? {
        ForkResult::Child => {
            drop(sup_sock);
            guest_main(guest_sock, workload)
        }
        ForkResult::Parent { child } => {
            drop(guest_sock);
            supervise(&mut sup_sock, child.as_raw())
        }
    }
}

fn supervise(sup_sock: &mut UnixStream, guest_pid: i32) -> Result<Guest, BootstrapError> {
    let predicted = interface::recv_prediction(sup_sock).map_err(BootstrapError::Channel)?;
    tracing::debug!(guest_pid, predicted, "guest predicted its notifier fd");

    let pidfd = interface::pidfd_open(guest_pid).map_err(BootstrapError::PidfdOpen)?;

    // The guest installs the filter right after sending the prediction, but
    // we can race it: retry with a fixed backoff until the descriptor shows
    // up in its table.
    let mut fetched = None;
    for _ in 0..FETCH_ATTEMPTS {
        match interface::pidfd_getfd(&pidfd, predicted) {
            Ok(fd) => {
                fetched = Some(fd);
                break;
            }
            Err(_) => {
                if guest_exited(guest_pid) {
                    return Err(BootstrapError::GuestDied);
                }
                std::thread::sleep(FETCH_BACKOFF);
            }
        }
    }
    let fd = fetched.ok_or(BootstrapError::FetchExhausted {
        attempts: FETCH_ATTEMPTS,
    })?;

    // same kernel object check: the predicted number must name a notifier
    let link = interface::fd_object_name(fd.as_raw_fd()).unwrap_or_default();
    if link != NOTIFIER_LINK {
        unsafe { libc::kill(guest_pid, libc::SIGKILL) };
        return Err(BootstrapError::NotANotifier(link));
    }

    tracing::info!(guest_pid, "notifier acquired");
    Ok(Guest {
        pid: guest_pid,
        notifier: NotifyFd::from_owned(fd),
    })
}

// The forked guest. Failures here cannot be reported upward in-band; they
// exit with a distinctive code and the supervisor sees GuestDied.
fn guest_main<F: FnOnce() -> i32>(mut sock: UnixStream, workload: F) -> ! {
    // Predict the number the listener will receive: dup the lowest-numbered
    // descriptor and immediately release the duplicate. The next allocation
    // reuses that slot.
    let predicted = unsafe {
        let fd = libc::dup(0);
        if fd < 0 {
            libc::_exit(EXIT_BOOTSTRAP_FAILED);
        }
        libc::close(fd);
        fd
    };

    // the prediction must leave before the filter goes in; afterwards this
    // write would suspend on notification
    if interface::send_prediction(&mut sock, predicted).is_err() {
        unsafe { libc::_exit(EXIT_BOOTSTRAP_FAILED) };
    }

    if interface::set_no_new_privs().is_err() {
        unsafe { libc::_exit(EXIT_BOOTSTRAP_FAILED) };
    }
    let prog = interface::build_notify_all();
    let notify_fd = match interface::install_notify_listener(&prog) {
        Ok(fd) => fd,
        Err(_) => unsafe { libc::_exit(EXIT_BOOTSTRAP_FAILED) },
    };
    if notify_fd != predicted {
        unsafe { libc::_exit(EXIT_PREDICTION_MISMATCH) };
    }

    // every syscall from here on notifies the supervisor
    let code = workload();
    unsafe { libc::_exit(code) }
}

fn guest_exited(pid: i32) -> bool {
    use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
    !matches!(
        waitpid(nix::unistd::Pid::from_raw(pid), Some(WaitPidFlag::WNOHANG)),
        Ok(WaitStatus::StillAlive) | Err(nix::errno::Errno::EINTR)
    )
}
