pub mod fs_calls;
pub mod fs_constants;
pub mod sys_calls;
pub mod sys_constants;
