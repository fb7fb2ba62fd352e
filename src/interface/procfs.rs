// /proc parsing for lazy process discovery: kernel parent PIDs, NSpid
// chains, and the set of currently-alive PIDs.

use std::io;

/// The kernel's reported parent of `pid`, from /proc/<pid>/stat.
pub fn parent_pid(pid: i32) -> io::Result<i32> {
    let stat = std::fs::read_to_string(format!("/proc/{}/stat", pid))?;
    parse_stat_ppid(&stat)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "malformed /proc stat"))
}

// The comm field is parenthesized and may itself contain spaces or parens,
// so fields are counted from the *last* ')'.
fn parse_stat_ppid(stat: &str) -> Option<i32> {
    let rest = &stat[stat.rfind(')')? + 1..];
    // rest = " <state> <ppid> ..."
    rest.split_whitespace().nth(1)?.parse().ok()
}

/// The NS-PID chain for `pid`: its PID in each nested PID namespace, from
/// the root namespace inward. Length 1 means no nesting.
pub fn nspid_chain(pid: i32) -> io::Result<Vec<i32>> {
    let status = std::fs::read_to_string(format!("/proc/{}/status", pid))?;
    let chain = parse_nspid_line(&status);
    if chain.is_empty() {
        // pre-NSpid kernels: the process is in the root namespace
        return Ok(vec![pid]);
    }
    Ok(chain)
}

fn parse_nspid_line(status: &str) -> Vec<i32> {
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("NSpid:") {
            return rest
                .split_whitespace()
                .filter_map(|f| f.parse().ok())
                .collect();
        }
    }
    Vec::new()
}

/// Every PID with a /proc entry right now.
pub fn alive_pids() -> io::Result<Vec<i32>> {
    let mut pids = Vec::new();
    for entry in std::fs::read_dir("/proc")? {
        let entry = entry?;
        if let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse().ok()) {
            pids.push(pid);
        }
    }
    Ok(pids)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stat_ppid_survives_hostile_comm() {
        let stat = "1234 (a) b) (c) R 77 1234 1234 0 -1 4194304";
        assert_eq!(parse_stat_ppid(stat), Some(77));
    }

    #[test]
    fn nspid_line_parses_nested_chain() {
        let status = "Name:\tguest\nNSpid:\t4021\t2\t1\nThreads:\t1\n";
        assert_eq!(parse_nspid_line(status), vec![4021, 2, 1]);
    }

    #[test]
    fn own_parent_and_chain_resolve() {
        let me = std::process::id() as i32;
        assert!(parent_pid(me).unwrap() >= 0);
        let chain = nspid_chain(me).unwrap();
        assert!(!chain.is_empty());
        assert_eq!(*chain.last().unwrap(), me);
    }

    #[test]
    fn alive_pids_contains_self() {
        let me = std::process::id() as i32;
        assert!(alive_pids().unwrap().contains(&me));
    }
}
