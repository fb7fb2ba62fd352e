// Overlay layout and the per-backend open file objects.
//
// An open file is a tagged variant with a small fixed set of backends; each
// backend's state is stored in-line and the variant never changes for the
// life of the open file.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use crate::interface::errnos::Errno;

use super::router::{self, Route};
use super::syscalls::fs_constants::*;
use super::syscalls::sys_constants::GUEST_COMM;

/// Per-sandbox on-disk staging area: `cow/` mirrors modified host paths,
/// `tmp/` holds the private /tmp tree. Subtrees appear lazily; two sandboxes
/// with different UIDs never share a path under OVERLAY_BASE.
#[derive(Debug)]
pub struct Overlay {
    uid: u128,
    root: PathBuf,
}

impl Overlay {
    pub fn new(uid: u128) -> Overlay {
        // the directory name derives from the low 64 bits of the UID
        let root = Path::new(OVERLAY_BASE).join(format!("{:016x}", uid as u64));
        Overlay { uid, root }
    }

    pub fn uid(&self) -> u128 {
        self.uid
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Staging location for a modified host path.
    pub fn cow_path(&self, guest_path: &str) -> PathBuf {
        self.root.join("cow").join(guest_path.trim_start_matches('/'))
    }

    /// Private-tree location for a guest /tmp path.
    pub fn tmp_path(&self, guest_path: &str) -> PathBuf {
        let suffix = guest_path
            .strip_prefix("/tmp")
            .unwrap_or(guest_path)
            .trim_start_matches('/');
        self.root.join("tmp").join(suffix)
    }

    /// Remove the staging tree. Best effort: teardown is recommended, not
    /// required for correctness.
    pub fn teardown(&self) {
        if let Err(e) = std::fs::remove_dir_all(&self.root) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::debug!(root = %self.root.display(), error = %e, "overlay teardown");
            }
        }
    }
}

fn wants_write(flags: i32) -> bool {
    let acc = flags & libc::O_ACCMODE;
    acc == libc::O_WRONLY || acc == libc::O_RDWR
}

// Translate guest open flags onto the host open. Flags outside this set are
// not forwarded in this revision.
fn host_open(path: &Path, flags: i32, mode: u32) -> Result<File, Errno> {
    let acc = flags & libc::O_ACCMODE;
    let mut opts = OpenOptions::new();
    opts.read(acc == libc::O_RDONLY || acc == libc::O_RDWR);
    opts.write(acc == libc::O_WRONLY || acc == libc::O_RDWR);
    if flags & libc::O_APPEND != 0 {
        opts.append(true);
    }
    if flags & libc::O_CREAT != 0 {
        if flags & libc::O_EXCL != 0 {
            opts.create_new(true);
        } else {
            opts.create(true);
        }
    }
    if flags & libc::O_TRUNC != 0 {
        opts.truncate(true);
    }
    opts.mode(mode & 0o7777);
    opts.open(path).map_err(Errno::from)
}

fn ensure_parent(path: &Path) -> Result<(), Errno> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(Errno::from)?;
    }
    Ok(())
}

/// Reads and writes delegate directly to the host kernel.
#[derive(Debug)]
pub struct PassthroughFile {
    file: File,
}

impl PassthroughFile {
    pub fn open(path: &str, flags: i32, mode: u32) -> Result<PassthroughFile, Errno> {
        // a blocked path must never reach a host open through this backend
        debug_assert!(matches!(router::route(path), Route::Passthrough));
        Ok(PassthroughFile {
            file: host_open(Path::new(path), flags, mode)?,
        })
    }
}

/// Copy-on-write view of a host path. Unmodified paths read straight from
/// the host; the first write-mode open stages a private copy under the
/// overlay and all later opens and I/O use the staged copy.
#[derive(Debug)]
pub struct CowFile {
    file: File,
    staged: bool,
}

impl CowFile {
    pub fn open(overlay: &Overlay, path: &str, flags: i32, mode: u32) -> Result<CowFile, Errno> {
        let staged_path = overlay.cow_path(path);
        let modifying = wants_write(flags) || flags & (libc::O_CREAT | libc::O_TRUNC) != 0;

        if modifying || staged_path.exists() {
            ensure_parent(&staged_path)?;
            if !staged_path.exists() && Path::new(path).exists() {
                std::fs::copy(path, &staged_path).map_err(Errno::from)?;
            }
            let file = host_open(&staged_path, flags, mode)?;
            return Ok(CowFile { file, staged: true });
        }

        // untouched path: read-only against the host
        let file = host_open(Path::new(path), flags, mode)?;
        Ok(CowFile {
            file,
            staged: false,
        })
    }
}

/// Guest /tmp maps into the overlay's private tree; no COW, no host /tmp.
#[derive(Debug)]
pub struct TmpFile {
    file: File,
}

impl TmpFile {
    pub fn open(overlay: &Overlay, path: &str, flags: i32, mode: u32) -> Result<TmpFile, Errno> {
        let host_path = overlay.tmp_path(path);
        ensure_parent(&host_path)?;
        Ok(TmpFile {
            file: host_open(&host_path, flags, mode)?,
        })
    }
}

/// Content synthesized at open time; reads advance a cursor, writes fail.
#[derive(Debug, Clone)]
pub struct ProcFile {
    content: Vec<u8>,
    cursor: usize,
}

impl ProcFile {
    pub fn new(mut content: Vec<u8>) -> ProcFile {
        content.truncate(PROC_CONTENT_BYTES);
        ProcFile { content, cursor: 0 }
    }

    pub fn render_status(ns_pid: i32, ns_ppid: i32) -> Vec<u8> {
        format!(
            "Name:\t{}\nPid:\t{}\nPPid:\t{}\n",
            GUEST_COMM, ns_pid, ns_ppid
        )
        .into_bytes()
    }
}

/// One open file, tagged by backend.
#[derive(Debug)]
pub enum OpenFile {
    Passthrough(PassthroughFile),
    Cow(CowFile),
    Tmp(TmpFile),
    Proc(ProcFile),
}

impl OpenFile {
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, Errno> {
        match self {
            OpenFile::Passthrough(f) => f.file.read(buf).map_err(Errno::from),
            OpenFile::Cow(f) => f.file.read(buf).map_err(Errno::from),
            OpenFile::Tmp(f) => f.file.read(buf).map_err(Errno::from),
            OpenFile::Proc(p) => {
                let remaining = p.content.len().saturating_sub(p.cursor);
                let n = remaining.min(buf.len());
                buf[..n].copy_from_slice(&p.content[p.cursor..p.cursor + n]);
                p.cursor += n;
                Ok(n)
            }
        }
    }

    pub fn write(&mut self, data: &[u8]) -> Result<usize, Errno> {
        match self {
            OpenFile::Passthrough(f) => f.file.write(data).map_err(Errno::from),
            OpenFile::Cow(f) if f.staged => f.file.write(data).map_err(Errno::from),
            // writing through a non-materialized COW open is a read-only error
            OpenFile::Cow(_) => Err(Errno::EBADF),
            OpenFile::Tmp(f) => f.file.write(data).map_err(Errno::from),
            OpenFile::Proc(_) => Err(Errno::EBADF),
        }
    }

    /// Copy this entry for an FD-table deep clone. Host-backed variants
    /// duplicate the descriptor (sharing the open file description, as a
    /// cloned table's entries do).
    pub fn duplicate(&self) -> Result<OpenFile, Errno> {
        Ok(match self {
            OpenFile::Passthrough(f) => OpenFile::Passthrough(PassthroughFile {
                file: f.file.try_clone().map_err(Errno::from)?,
            }),
            OpenFile::Cow(f) => OpenFile::Cow(CowFile {
                file: f.file.try_clone().map_err(Errno::from)?,
                staged: f.staged,
            }),
            OpenFile::Tmp(f) => OpenFile::Tmp(TmpFile {
                file: f.file.try_clone().map_err(Errno::from)?,
            }),
            OpenFile::Proc(p) => OpenFile::Proc(p.clone()),
        })
    }

    /// Closing is by consumption; host descriptors are released here.
    pub fn close(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::sandbox_uid;

    fn scratch_overlay() -> Overlay {
        Overlay::new(sandbox_uid())
    }

    #[test]
    fn overlay_paths_are_uid_scoped() {
        let a = Overlay::new(1);
        let b = Overlay::new(2);
        assert_ne!(a.root(), b.root());
        assert!(a.tmp_path("/tmp/x").starts_with(a.root()));
        assert!(a.cow_path("/etc/passwd").starts_with(a.root()));
        assert_eq!(
            a.tmp_path("/tmp/d/x"),
            a.root().join("tmp").join("d").join("x")
        );
    }

    #[test]
    fn tmp_backend_reads_back_what_it_wrote() {
        let overlay = scratch_overlay();
        let flags = libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC;
        let mut f = TmpFile::open(&overlay, "/tmp/test.txt", flags, 0o644).unwrap();
        f.file.write_all(b"hello tmp").unwrap();
        drop(f);

        let mut f = OpenFile::Tmp(TmpFile::open(&overlay, "/tmp/test.txt", libc::O_RDONLY, 0).unwrap());
        let mut buf = [0u8; 64];
        let n = f.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello tmp");
        overlay.teardown();
    }

    #[test]
    fn cow_read_only_open_is_not_materialized() {
        let overlay = scratch_overlay();
        let host = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(host.path(), b"host bytes").unwrap();
        let path = host.path().to_str().unwrap().to_string();

        let mut f = OpenFile::Cow(CowFile::open(&overlay, &path, libc::O_RDONLY, 0).unwrap());
        let mut buf = [0u8; 32];
        let n = f.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"host bytes");
        // nothing staged, and writes are refused read-only
        assert!(!overlay.cow_path(&path).exists());
        assert_eq!(f.write(b"x"), Err(Errno::EBADF));
        overlay.teardown();
    }

    #[test]
    fn cow_write_open_stages_and_diverges() {
        let overlay = scratch_overlay();
        let host = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(host.path(), b"original").unwrap();
        let path = host.path().to_str().unwrap().to_string();

        let mut f =
            OpenFile::Cow(CowFile::open(&overlay, &path, libc::O_WRONLY | libc::O_TRUNC, 0o644).unwrap());
        assert_eq!(f.write(b"modified"), Ok(8));
        drop(f);

        // the host file is untouched; the staged copy carries the change
        assert_eq!(std::fs::read(host.path()).unwrap(), b"original");
        assert_eq!(std::fs::read(overlay.cow_path(&path)).unwrap(), b"modified");

        // a later read-only open sees the staged copy
        let mut f = OpenFile::Cow(CowFile::open(&overlay, &path, libc::O_RDONLY, 0).unwrap());
        let mut buf = [0u8; 32];
        let n = f.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"modified");
        overlay.teardown();
    }

    #[test]
    fn proc_reads_advance_a_cursor_and_writes_fail() {
        let mut f = OpenFile::Proc(ProcFile::new(ProcFile::render_status(2, 1)));
        let mut buf = [0u8; 16];
        let n1 = f.read(&mut buf).unwrap();
        assert_eq!(&buf[..n1], &b"Name:\tbvisor\nPid"[..]);
        let mut rest = [0u8; PROC_CONTENT_BYTES];
        let n2 = f.read(&mut rest).unwrap();
        assert_eq!(
            String::from_utf8_lossy(&rest[..n2]),
            ":\t2\nPPid:\t1\n"
        );
        // exhausted
        assert_eq!(f.read(&mut buf).unwrap(), 0);
        assert_eq!(f.write(b"nope"), Err(Errno::EBADF));
    }

    #[test]
    fn proc_content_is_bounded() {
        let f = ProcFile::new(vec![b'x'; 1000]);
        assert_eq!(f.content.len(), PROC_CONTENT_BYTES);
    }

    #[test]
    fn teardown_removes_the_staging_tree() {
        let overlay = scratch_overlay();
        let flags = libc::O_WRONLY | libc::O_CREAT;
        TmpFile::open(&overlay, "/tmp/x", flags, 0o600).unwrap();
        assert!(overlay.root().exists());
        overlay.teardown();
        assert!(!overlay.root().exists());
    }
}
