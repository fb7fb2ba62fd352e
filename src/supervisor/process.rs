// Virtual process registry: kernel PID -> virtual process, parent/child
// tree, lazy discovery, lifecycle.

use std::collections::HashMap;
use std::rc::Rc;

use crate::interface;
use crate::interface::errnos::Errno;

use super::fdtable::{FdTable, FdTableRef};
use super::filesystem::ProcFile;
use super::namespace::{Namespace, NamespaceRef};
use super::syscalls::sys_constants::{CLONE_FILES, CLONE_NEWPID};

/// One guest process as the supervisor sees it. `pid` is the host kernel
/// PID; namespace-relative identities live on the namespace side.
#[derive(Debug)]
pub struct VirtualProcess {
    pub pid: i32,
    pub parent: Option<i32>,
    pub fdtable: FdTableRef,
    pub namespace: NamespaceRef,
}

#[derive(Debug)]
pub struct ProcessTable {
    procs: HashMap<i32, VirtualProcess>,
    root: Option<i32>,
}

impl ProcessTable {
    pub fn new() -> ProcessTable {
        ProcessTable {
            procs: HashMap::new(),
            root: None,
        }
    }

    pub fn root(&self) -> Option<i32> {
        self.root
    }

    pub fn len(&self) -> usize {
        self.procs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.procs.is_empty()
    }

    pub fn contains(&self, pid: i32) -> bool {
        self.procs.contains_key(&pid)
    }

    pub fn get(&self, pid: i32) -> Option<&VirtualProcess> {
        self.procs.get(&pid)
    }

    /// Register the sandbox's root guest. Called exactly once.
    pub fn register_root(&mut self, pid: i32) {
        assert!(
            self.root.is_none(),
            "register_root called twice (old root {:?}, new {})",
            self.root,
            pid
        );
        let namespace = Namespace::new_root();
        Namespace::register(&namespace, pid, true);
        self.procs.insert(
            pid,
            VirtualProcess {
                pid,
                parent: None,
                fdtable: FdTable::new_ref(),
                namespace,
            },
        );
        self.root = Some(pid);
    }

    /// Register a child under `parent`. CLONE_NEWPID puts the child at the
    /// root of a fresh descendant namespace; CLONE_FILES shares the parent's
    /// FD table instead of deep-copying it.
    pub fn register_child(&mut self, parent: i32, child: i32, flags: u64) -> Result<(), Errno> {
        if self.procs.contains_key(&child) {
            return Err(Errno::EEXIST);
        }
        let (parent_ns, parent_fdt) = {
            let p = self.procs.get(&parent).ok_or(Errno::ESRCH)?;
            (Rc::clone(&p.namespace), Rc::clone(&p.fdtable))
        };

        let namespace = if flags & CLONE_NEWPID != 0 {
            let ns = Namespace::new_child(&parent_ns);
            Namespace::register(&ns, child, true);
            ns
        } else {
            Namespace::register(&parent_ns, child, false);
            parent_ns
        };

        let fdtable = if flags & CLONE_FILES != 0 {
            parent_fdt
        } else {
            Rc::new(std::cell::RefCell::new(parent_fdt.borrow().deep_clone()?))
        };

        self.procs.insert(
            child,
            VirtualProcess {
                pid: child,
                parent: Some(parent),
                fdtable,
                namespace,
            },
        );
        Ok(())
    }

    /// `viewer` can see `target` iff the target is a member of the viewer's
    /// namespace (own or descendant membership).
    pub fn can_see(&self, viewer: i32, target: i32) -> bool {
        match self.procs.get(&viewer) {
            Some(v) => v.namespace.borrow().contains(target),
            None => false,
        }
    }

    /// The ns-pid under which `viewer`'s namespace knows `target`.
    pub fn ns_pid_of(&self, viewer: i32, target: i32) -> Option<i32> {
        self.procs.get(&viewer)?.namespace.borrow().ns_pid(target)
    }

    /// Resolve a numeric PID as the caller would: namespace-relative first,
    /// then a visible kernel PID.
    pub fn resolve_for(&self, caller: i32, pid: i32) -> Option<i32> {
        let ns = &self.procs.get(&caller)?.namespace;
        if let Some(kpid) = ns.borrow().resolve(pid) {
            return Some(kpid);
        }
        if ns.borrow().contains(pid) {
            return Some(pid);
        }
        None
    }

    /// Render the synthesized /proc status for `target`: its identity as its
    /// own namespace reports it, parent 0 when the parent is not visible.
    pub fn proc_status(&self, target: i32) -> Option<Vec<u8>> {
        let t = self.procs.get(&target)?;
        let ns = t.namespace.borrow();
        let ns_pid = ns.ns_pid(target)?;
        let ns_ppid = t.parent.and_then(|p| ns.ns_pid(p)).unwrap_or(0);
        Some(ProcFile::render_status(ns_pid, ns_ppid))
    }

    fn subtree(&self, pid: i32) -> Vec<i32> {
        let mut out = Vec::new();
        let mut stack = vec![pid];
        while let Some(cur) = stack.pop() {
            out.push(cur);
            for (&p, proc_) in &self.procs {
                if proc_.parent == Some(cur) {
                    stack.push(p);
                }
            }
        }
        out
    }

    /// Remove `pid` and its whole subtree: each victim is unregistered from
    /// every namespace it belongs to, FD tables are drained on their last
    /// reference, then the namespace reference is released.
    pub fn kill(&mut self, pid: i32) {
        for victim in self.subtree(pid) {
            if let Some(proc_) = self.procs.remove(&victim) {
                Namespace::unregister(&proc_.namespace, victim);
                if Rc::strong_count(&proc_.fdtable) == 1 {
                    proc_.fdtable.borrow_mut().close_all();
                }
                if self.root == Some(victim) {
                    self.root = None;
                }
                tracing::debug!(pid = victim, "virtual process removed");
            }
        }
    }

    /// Lazy discovery: adopt kernel processes the supervisor has not seen.
    ///
    /// Enumerates alive PIDs, and registers any unknown PID whose kernel
    /// parent is already registered, to a fixpoint (a whole chain of
    /// unobserved descendants registers in one call). A deepening NSpid
    /// chain means the kernel put the child in a new PID namespace, so the
    /// virtual tree mirrors it. Returns how many processes were adopted.
    pub fn sync_new(&mut self) -> usize {
        let alive = match interface::alive_pids() {
            Ok(pids) => pids,
            Err(e) => {
                tracing::warn!(error = %e, "could not enumerate /proc");
                return 0;
            }
        };
        let mut adopted = 0;
        loop {
            let mut progressed = false;
            for &pid in &alive {
                if self.procs.contains_key(&pid) {
                    continue;
                }
                let ppid = match interface::parent_pid(pid) {
                    Ok(p) => p,
                    // the candidate exited while we were scanning
                    Err(_) => continue,
                };
                if !self.procs.contains_key(&ppid) {
                    continue;
                }
                let flags = match (interface::nspid_chain(pid), interface::nspid_chain(ppid)) {
                    (Ok(child_chain), Ok(parent_chain))
                        if child_chain.len() > parent_chain.len() =>
                    {
                        CLONE_NEWPID
                    }
                    _ => 0,
                };
                if self.register_child(ppid, pid, flags).is_ok() {
                    tracing::debug!(pid, ppid, flags, "lazily discovered guest process");
                    adopted += 1;
                    progressed = true;
                }
            }
            if !progressed {
                break;
            }
        }
        adopted
    }
}

impl Default for ProcessTable {
    fn default() -> Self {
        ProcessTable::new()
    }
}
