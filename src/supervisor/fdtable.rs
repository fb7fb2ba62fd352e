// Per-process virtual FD table.
//
// Allocation is monotonic from STARTINGFD and never renumbers on remove.
// Tables are shared (clone-files) or deep-copied (plain clone) via Rc; a
// deep copy inherits the next-FD counter so diverging tables never issue
// overlapping FDs for their first post-clone allocation. That is acceptable
// because each table is per-process.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::interface::errnos::Errno;

use super::filesystem::OpenFile;
use super::syscalls::fs_constants::STARTINGFD;

pub type FdTableRef = Rc<RefCell<FdTable>>;

#[derive(Debug)]
pub struct FdTable {
    entries: HashMap<i32, OpenFile>,
    next_fd: i32,
}

impl FdTable {
    pub fn new() -> FdTable {
        FdTable {
            entries: HashMap::new(),
            next_fd: STARTINGFD,
        }
    }

    pub fn new_ref() -> FdTableRef {
        Rc::new(RefCell::new(FdTable::new()))
    }

    pub fn insert(&mut self, file: OpenFile) -> Result<i32, Errno> {
        if self.next_fd == i32::MAX {
            return Err(Errno::ENFILE);
        }
        let fd = self.next_fd;
        self.next_fd += 1;
        self.entries.insert(fd, file);
        Ok(fd)
    }

    pub fn get(&self, fd: i32) -> Option<&OpenFile> {
        self.entries.get(&fd)
    }

    pub fn get_mut(&mut self, fd: i32) -> Option<&mut OpenFile> {
        self.entries.get_mut(&fd)
    }

    /// Remove an entry, handing the file back. The table never closes on
    /// remove; callers own closure.
    pub fn remove(&mut self, fd: i32) -> Option<OpenFile> {
        self.entries.remove(&fd)
    }

    /// Deep copy for clone-without-CLONE_FILES: entries copied by value,
    /// next-FD counter inherited.
    pub fn deep_clone(&self) -> Result<FdTable, Errno> {
        let mut entries = HashMap::with_capacity(self.entries.len());
        for (&fd, file) in &self.entries {
            entries.insert(fd, file.duplicate()?);
        }
        Ok(FdTable {
            entries,
            next_fd: self.next_fd,
        })
    }

    /// Close every entry, in no particular order. Used on exit_group before
    /// the last table reference is released.
    pub fn close_all(&mut self) {
        for (_, file) in self.entries.drain() {
            file.close();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for FdTable {
    fn default() -> Self {
        FdTable::new()
    }
}
