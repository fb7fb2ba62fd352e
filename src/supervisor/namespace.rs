// Virtual PID namespaces.
//
// A namespace is a visibility set of {kernel PID -> namespace-relative PID}
// pairs, chained to an optional parent. Registering a process adds it to its
// own namespace and to every ancestor, each of which assigns an independent
// ns-pid; the member set of a namespace is therefore exactly the union of
// its own processes with those of all descendant namespaces. Parent
// back-references make the graph a strict tree; refcounts are plain Rc
// because all mutation happens on the supervisor thread.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::syscalls::sys_constants::NS_ROOT_PID;

pub type NamespaceRef = Rc<RefCell<Namespace>>;

#[derive(Debug)]
pub struct Namespace {
    parent: Option<NamespaceRef>,
    members: HashMap<i32, i32>,
    // monotonic child counter; starts at 1, root registration does not
    // consume it, reclaimed ns-pids are never reissued
    pid_counter: i32,
}

impl Namespace {
    pub fn new_root() -> NamespaceRef {
        Rc::new(RefCell::new(Namespace {
            parent: None,
            members: HashMap::new(),
            pid_counter: NS_ROOT_PID,
        }))
    }

    pub fn new_child(parent: &NamespaceRef) -> NamespaceRef {
        Rc::new(RefCell::new(Namespace {
            parent: Some(Rc::clone(parent)),
            members: HashMap::new(),
            pid_counter: NS_ROOT_PID,
        }))
    }

    fn assign_child_pid(&mut self) -> i32 {
        self.pid_counter += 1;
        self.pid_counter
    }

    /// Register `kpid` here and in every ancestor namespace. `is_ns_root`
    /// marks the root process of *this* namespace, which is always ns-pid 1;
    /// ancestors still see it as an ordinary child.
    pub fn register(ns: &NamespaceRef, kpid: i32, is_ns_root: bool) {
        {
            let mut n = ns.borrow_mut();
            let nspid = if is_ns_root {
                NS_ROOT_PID
            } else {
                n.assign_child_pid()
            };
            n.members.insert(kpid, nspid);
        }
        let mut cursor = ns.borrow().parent.clone();
        while let Some(ancestor) = cursor {
            {
                let mut n = ancestor.borrow_mut();
                let nspid = n.assign_child_pid();
                n.members.insert(kpid, nspid);
            }
            cursor = ancestor.borrow().parent.clone();
        }
    }

    /// Remove `kpid` from this namespace and every ancestor.
    pub fn unregister(ns: &NamespaceRef, kpid: i32) {
        ns.borrow_mut().members.remove(&kpid);
        let mut cursor = ns.borrow().parent.clone();
        while let Some(ancestor) = cursor {
            ancestor.borrow_mut().members.remove(&kpid);
            cursor = ancestor.borrow().parent.clone();
        }
    }

    pub fn contains(&self, kpid: i32) -> bool {
        self.members.contains_key(&kpid)
    }

    /// The ns-pid this namespace assigned to `kpid`, if visible here.
    pub fn ns_pid(&self, kpid: i32) -> Option<i32> {
        self.members.get(&kpid).copied()
    }

    /// Reverse lookup: which kernel PID does `nspid` name in this namespace?
    pub fn resolve(&self, nspid: i32) -> Option<i32> {
        self.members
            .iter()
            .find(|(_, &v)| v == nspid)
            .map(|(&k, _)| k)
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }
}
