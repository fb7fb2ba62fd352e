#![allow(dead_code)] //suppress warning for these helpers not being used in targets other than the tests

mod dispatch_tests;
mod fs_tests;

use crate::interface;
use crate::interface::Notification;
use crate::supervisor::filesystem::Overlay;
use crate::supervisor::Supervisor;

pub fn self_pid() -> i32 {
    std::process::id() as i32
}

/// Route supervisor logs through the test harness's captured output.
#[cfg(test)]
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// A supervisor whose root guest is the test process itself: handlers that
/// cross address spaces then read and write our own memory, so synthetic
/// notifications can carry real pointers.
pub fn test_supervisor() -> Supervisor {
    Supervisor::new(Overlay::new(interface::sandbox_uid()), self_pid())
}

pub fn notif(pid: i32, syscall: i64, args: [u64; 6]) -> Notification {
    Notification {
        id: 1,
        pid,
        syscall,
        args,
    }
}

/// Kernel-PID-shaped numbers for virtual processes that exist only in the
/// registry. High enough that no live host process answers to them.
pub fn fake_pid(n: i32) -> i32 {
    4_100_000 + n
}
