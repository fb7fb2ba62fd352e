#[cfg(test)]
pub mod dispatch_tests {
    use crate::interface::errnos::Errno;
    use crate::interface::{NotifyFd, Reply};
    use crate::supervisor::{Dispatcher, DispatcherState};
    use crate::tests::*;

    #[test]
    pub fn ut_dispatch_blocked_syscalls_are_eperm() {
        init_test_logging();
        let mut sup = test_supervisor();
        for nr in [libc::SYS_ptrace, libc::SYS_mount, libc::SYS_seccomp] {
            assert_eq!(
                sup.dispatch(&notif(self_pid(), nr, [0; 6])),
                Reply::Err(Errno::EPERM)
            );
        }
        sup.overlay.teardown();
    }

    #[test]
    pub fn ut_dispatch_unimplemented_syscalls_are_enosys() {
        let mut sup = test_supervisor();
        assert_eq!(
            sup.dispatch(&notif(self_pid(), libc::SYS_statx, [0; 6])),
            Reply::Err(Errno::ENOSYS)
        );
        // undecided numbers get the same reply
        assert_eq!(
            sup.dispatch(&notif(self_pid(), 99_999, [0; 6])),
            Reply::Err(Errno::ENOSYS)
        );
        sup.overlay.teardown();
    }

    #[test]
    pub fn ut_dispatch_clone_continues_for_lazy_discovery() {
        let mut sup = test_supervisor();
        assert_eq!(
            sup.dispatch(&notif(self_pid(), libc::SYS_clone, [0; 6])),
            Reply::Continue
        );
        sup.overlay.teardown();
    }

    #[test]
    pub fn ut_dispatch_getpid_reports_the_kernel_pid() {
        let mut sup = test_supervisor();
        assert_eq!(
            sup.dispatch(&notif(self_pid(), libc::SYS_getpid, [0; 6])),
            Reply::Value(self_pid() as i64)
        );
        sup.overlay.teardown();
    }

    #[test]
    pub fn ut_dispatch_kill_rejects_invisible_and_group_targets() {
        let mut sup = test_supervisor();
        // a pid nothing in this sandbox can see
        let reply = sup.dispatch(&notif(
            self_pid(),
            libc::SYS_kill,
            [4_190_000, libc::SIGTERM as u64, 0, 0, 0, 0],
        ));
        assert_eq!(reply, Reply::Err(Errno::ESRCH));

        // process groups are out of scope in this revision
        let reply = sup.dispatch(&notif(
            self_pid(),
            libc::SYS_kill,
            [0, libc::SIGTERM as u64, 0, 0, 0, 0],
        ));
        assert_eq!(reply, Reply::Err(Errno::EINVAL));
        sup.overlay.teardown();
    }

    #[test]
    pub fn ut_dispatch_kill_signal_zero_probes_a_visible_target() {
        let mut sup = test_supervisor();
        // signal 0 delivers nothing; the root (our own process) is visible
        // to itself as ns-pid 1
        let reply = sup.dispatch(&notif(self_pid(), libc::SYS_kill, [1, 0, 0, 0, 0, 0]));
        assert_eq!(reply, Reply::Value(0));
        assert!(sup.processes.contains(self_pid()));
        sup.overlay.teardown();
    }

    #[test]
    pub fn ut_dispatch_exit_group_tears_down_the_subtree() {
        let mut sup = test_supervisor();
        let child = fake_pid(300);
        let grandchild = fake_pid(301);
        sup.processes.register_child(self_pid(), child, 0).unwrap();
        sup.processes.register_child(child, grandchild, 0).unwrap();

        let reply = sup.dispatch(&notif(child, libc::SYS_exit_group, [0, 0, 0, 0, 0, 0]));
        assert_eq!(reply, Reply::Continue);
        assert!(!sup.processes.contains(child));
        assert!(!sup.processes.contains(grandchild));
        assert!(sup.processes.contains(self_pid()));
        sup.overlay.teardown();
    }

    #[test]
    pub fn ut_dispatch_every_notification_gets_exactly_one_reply_value() {
        // dispatch returns a Reply by construction; what this guards is that
        // no handled syscall panics on empty arguments from a registered
        // caller (a handler must map its failures to errnos)
        let mut sup = test_supervisor();
        for nr in [
            libc::SYS_read,
            libc::SYS_write,
            libc::SYS_readv,
            libc::SYS_writev,
            libc::SYS_close,
            libc::SYS_getpid,
            libc::SYS_getppid,
            libc::SYS_kill,
        ] {
            let _ = sup.dispatch(&notif(self_pid(), nr, [0; 6]));
        }
        sup.overlay.teardown();
    }

    #[test]
    pub fn ut_dispatcher_starts_running_and_hands_back_state() {
        let sup = test_supervisor();
        let uid = sup.overlay.uid();
        // any descriptor will do to construct the handle; the loop is not run
        let devnull = std::fs::File::open("/dev/null").unwrap();
        let dispatcher = Dispatcher::new(sup, NotifyFd::from_owned(devnull.into()));
        assert_eq!(dispatcher.state(), DispatcherState::Running);

        let sup = dispatcher.into_supervisor();
        assert_eq!(sup.overlay.uid(), uid);
        sup.overlay.teardown();
    }
}
