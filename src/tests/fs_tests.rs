#[cfg(test)]
pub mod fs_tests {
    use std::ffi::CString;

    use crate::interface::errnos::Errno;
    use crate::interface::Reply;
    use crate::supervisor::Supervisor;
    use crate::tests::*;

    fn open_args(path: &CString, flags: i32, mode: u32) -> [u64; 6] {
        [
            libc::AT_FDCWD as u64,
            path.as_ptr() as u64,
            flags as u64,
            mode as u64,
            0,
            0,
        ]
    }

    fn dispatch_open(sup: &mut Supervisor, path: &str, flags: i32, mode: u32) -> Reply {
        let c = CString::new(path).unwrap();
        sup.dispatch(&notif(
            self_pid(),
            libc::SYS_openat,
            open_args(&c, flags, mode),
        ))
    }

    fn expect_fd(reply: Reply) -> i32 {
        match reply {
            Reply::Value(v) => v as i32,
            other => panic!("expected a virtual fd, got {:?}", other),
        }
    }

    #[test]
    pub fn ut_fs_tmp_write_read_roundtrip() {
        init_test_logging();
        let mut sup = test_supervisor();

        let fd = expect_fd(dispatch_open(
            &mut sup,
            "/tmp/test.txt",
            libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC,
            0o644,
        ));
        assert!(fd >= 3);

        let data = b"hello tmp";
        let reply = sup.dispatch(&notif(
            self_pid(),
            libc::SYS_write,
            [fd as u64, data.as_ptr() as u64, data.len() as u64, 0, 0, 0],
        ));
        assert_eq!(reply, Reply::Value(9));
        assert_eq!(
            sup.dispatch(&notif(self_pid(), libc::SYS_close, [fd as u64, 0, 0, 0, 0, 0])),
            Reply::Value(0)
        );

        let fd = expect_fd(dispatch_open(&mut sup, "/tmp/test.txt", libc::O_RDONLY, 0));
        let mut buf = [0u8; 64];
        let reply = sup.dispatch(&notif(
            self_pid(),
            libc::SYS_read,
            [fd as u64, buf.as_mut_ptr() as u64, buf.len() as u64, 0, 0, 0],
        ));
        assert_eq!(reply, Reply::Value(9));
        assert_eq!(&buf[..9], b"hello tmp");

        sup.overlay.teardown();
    }

    #[test]
    pub fn ut_fs_tmp_isolation_between_sandboxes() {
        let mut sup_a = test_supervisor();
        let mut sup_b = test_supervisor();
        assert_ne!(sup_a.overlay.uid(), sup_b.overlay.uid());

        for (sup, content) in [(&mut sup_a, b"aaaaaa"), (&mut sup_b, b"bbbbbb")] {
            let fd = expect_fd(dispatch_open(
                sup,
                "/tmp/test.txt",
                libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC,
                0o644,
            ));
            let reply = sup.dispatch(&notif(
                self_pid(),
                libc::SYS_write,
                [fd as u64, content.as_ptr() as u64, content.len() as u64, 0, 0, 0],
            ));
            assert_eq!(reply, Reply::Value(6));
        }

        // each sandbox reads back its own bytes
        for (sup, content) in [(&mut sup_a, b"aaaaaa"), (&mut sup_b, b"bbbbbb")] {
            let fd = expect_fd(dispatch_open(sup, "/tmp/test.txt", libc::O_RDONLY, 0));
            let mut buf = [0u8; 16];
            let reply = sup.dispatch(&notif(
                self_pid(),
                libc::SYS_read,
                [fd as u64, buf.as_mut_ptr() as u64, buf.len() as u64, 0, 0, 0],
            ));
            assert_eq!(reply, Reply::Value(6));
            assert_eq!(&buf[..6], content);
        }

        sup_a.overlay.teardown();
        sup_b.overlay.teardown();
    }

    #[test]
    pub fn ut_fs_stdout_write_continues_in_kernel() {
        let mut sup = test_supervisor();
        let data = b"hello";
        let reply = sup.dispatch(&notif(
            self_pid(),
            libc::SYS_write,
            [1, data.as_ptr() as u64, data.len() as u64, 0, 0, 0],
        ));
        assert_eq!(reply, Reply::Continue);
        sup.overlay.teardown();
    }

    #[test]
    pub fn ut_fs_blocked_path_leaves_no_fd_behind() {
        let mut sup = test_supervisor();
        let before = sup
            .processes
            .get(self_pid())
            .unwrap()
            .fdtable
            .borrow()
            .len();

        let reply = dispatch_open(&mut sup, "/sys/class/net", libc::O_RDONLY, 0);
        assert_eq!(reply, Reply::Err(Errno::EACCES));

        let after = sup
            .processes
            .get(self_pid())
            .unwrap()
            .fdtable
            .borrow()
            .len();
        assert_eq!(before, after);
        sup.overlay.teardown();
    }

    #[test]
    pub fn ut_fs_relative_path_is_invalid() {
        let mut sup = test_supervisor();
        let reply = dispatch_open(&mut sup, "test.txt", libc::O_RDONLY, 0);
        assert_eq!(reply, Reply::Err(Errno::EINVAL));
        sup.overlay.teardown();
    }

    #[test]
    pub fn ut_fs_bad_path_pointer_is_a_fault() {
        let mut sup = test_supervisor();
        let reply = sup.dispatch(&notif(
            self_pid(),
            libc::SYS_openat,
            [libc::AT_FDCWD as u64, 8, libc::O_RDONLY as u64, 0, 0, 0],
        ));
        assert_eq!(reply, Reply::Err(Errno::EFAULT));
        sup.overlay.teardown();
    }

    #[test]
    pub fn ut_fs_read_write_on_unknown_fd_is_ebadf() {
        let mut sup = test_supervisor();
        let mut buf = [0u8; 8];
        let reply = sup.dispatch(&notif(
            self_pid(),
            libc::SYS_read,
            [99, buf.as_mut_ptr() as u64, buf.len() as u64, 0, 0, 0],
        ));
        assert_eq!(reply, Reply::Err(Errno::EBADF));
        let reply = sup.dispatch(&notif(
            self_pid(),
            libc::SYS_close,
            [99, 0, 0, 0, 0, 0],
        ));
        assert_eq!(reply, Reply::Err(Errno::EBADF));
        sup.overlay.teardown();
    }

    #[test]
    pub fn ut_fs_writev_caps_at_sixteen_iovecs() {
        let mut sup = test_supervisor();
        let fd = expect_fd(dispatch_open(
            &mut sup,
            "/tmp/vec.txt",
            libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC,
            0o644,
        ));

        // twenty one-byte iovecs; only the first sixteen may land
        let chunks: Vec<Vec<u8>> = (0..20).map(|i| vec![b'a' + i as u8]).collect();
        #[repr(C)]
        struct Iov {
            base: u64,
            len: u64,
        }
        let iovs: Vec<Iov> = chunks
            .iter()
            .map(|c| Iov {
                base: c.as_ptr() as u64,
                len: c.len() as u64,
            })
            .collect();

        let reply = sup.dispatch(&notif(
            self_pid(),
            libc::SYS_writev,
            [fd as u64, iovs.as_ptr() as u64, iovs.len() as u64, 0, 0, 0],
        ));
        assert_eq!(reply, Reply::Value(16));

        let fd = expect_fd(dispatch_open(&mut sup, "/tmp/vec.txt", libc::O_RDONLY, 0));
        let mut buf = [0u8; 32];
        let reply = sup.dispatch(&notif(
            self_pid(),
            libc::SYS_read,
            [fd as u64, buf.as_mut_ptr() as u64, buf.len() as u64, 0, 0, 0],
        ));
        assert_eq!(reply, Reply::Value(16));
        assert_eq!(&buf[..16], b"abcdefghijklmnop");
        sup.overlay.teardown();
    }

    #[test]
    pub fn ut_fs_readv_scatters_into_guest_buffers() {
        let mut sup = test_supervisor();
        let fd = expect_fd(dispatch_open(
            &mut sup,
            "/tmp/scatter.txt",
            libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC,
            0o644,
        ));
        let data = b"0123456789";
        let reply = sup.dispatch(&notif(
            self_pid(),
            libc::SYS_write,
            [fd as u64, data.as_ptr() as u64, data.len() as u64, 0, 0, 0],
        ));
        assert_eq!(reply, Reply::Value(10));

        let fd = expect_fd(dispatch_open(&mut sup, "/tmp/scatter.txt", libc::O_RDONLY, 0));
        let mut first = [0u8; 4];
        let mut second = [0u8; 16];
        #[repr(C)]
        struct Iov {
            base: u64,
            len: u64,
        }
        let iovs = [
            Iov {
                base: first.as_mut_ptr() as u64,
                len: first.len() as u64,
            },
            Iov {
                base: second.as_mut_ptr() as u64,
                len: second.len() as u64,
            },
        ];
        let reply = sup.dispatch(&notif(
            self_pid(),
            libc::SYS_readv,
            [fd as u64, iovs.as_ptr() as u64, iovs.len() as u64, 0, 0, 0],
        ));
        assert_eq!(reply, Reply::Value(10));
        assert_eq!(&first, b"0123");
        assert_eq!(&second[..6], b"456789");
        sup.overlay.teardown();
    }

    #[test]
    pub fn ut_fs_cow_write_diverges_from_host() {
        let mut sup = test_supervisor();

        // /var/tmp routes to the cow backend (only /tmp itself is the
        // private tree); creating a file there must stage, never touch /var
        let guest_path = format!("/var/tmp/bvisor-cow-{:016x}", sup.overlay.uid() as u64);
        let staged = sup.overlay.cow_path(&guest_path);
        assert!(staged.starts_with(sup.overlay.root()));

        let fd = expect_fd(dispatch_open(
            &mut sup,
            &guest_path,
            libc::O_WRONLY | libc::O_CREAT,
            0o644,
        ));
        let data = b"guest";
        let reply = sup.dispatch(&notif(
            self_pid(),
            libc::SYS_write,
            [fd as u64, data.as_ptr() as u64, data.len() as u64, 0, 0, 0],
        ));
        assert_eq!(reply, Reply::Value(5));

        // the write landed in the staging tree, not on the host path
        assert_eq!(std::fs::read(&staged).unwrap(), b"guest");
        assert!(!std::path::Path::new(&guest_path).exists());
        sup.overlay.teardown();
    }
}
