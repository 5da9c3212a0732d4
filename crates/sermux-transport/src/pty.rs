use std::ffi::CStr;
use std::fs::File;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};
use crate::traits::Port;

const PTY_NAME_CAPACITY: usize = 256;

/// A pseudo-terminal standing in for one virtual serial port.
///
/// The engine reads and writes the master side; external programs open
/// the slave device by [`name`](Self::name) or through the optional alias
/// symlink. The alias is removed on drop, but only if it still points at
/// this pseudo-terminal.
pub struct PtyEndpoint {
    master: File,
    name: PathBuf,
    alias: Option<PathBuf>,
}

impl PtyEndpoint {
    /// Allocate a non-blocking pseudo-terminal and optionally alias it.
    ///
    /// If `alias` already exists it is replaced.
    pub fn open(alias: Option<&Path>) -> Result<Self> {
        // SAFETY: posix_openpt has no pointer arguments; the return value is checked.
        let fd = unsafe { libc::posix_openpt(libc::O_RDWR | libc::O_NOCTTY | libc::O_NONBLOCK) };
        if fd < 0 {
            return Err(TransportError::PtyAllocate(std::io::Error::last_os_error()));
        }
        // SAFETY: `fd` was just returned by posix_openpt and is owned by nothing else.
        let master = File::from(unsafe { OwnedFd::from_raw_fd(fd) });

        // SAFETY: `fd` is a valid pty master descriptor kept open by `master`.
        if unsafe { libc::grantpt(fd) } != 0 {
            return Err(TransportError::PtyAllocate(std::io::Error::last_os_error()));
        }
        // SAFETY: as above.
        if unsafe { libc::unlockpt(fd) } != 0 {
            return Err(TransportError::PtyAllocate(std::io::Error::last_os_error()));
        }

        let name = slave_name(fd).map_err(TransportError::PtyAllocate)?;

        let mut endpoint = Self {
            master,
            name,
            alias: None,
        };

        if let Some(alias) = alias {
            create_alias(&endpoint.name, alias)?;
            endpoint.alias = Some(alias.to_path_buf());
        }

        info!(name = ?endpoint.name, alias = ?endpoint.alias, "allocated pseudo-terminal");
        Ok(endpoint)
    }

    /// Device path of the slave side, assigned by the OS.
    pub fn name(&self) -> &Path {
        &self.name
    }

    /// Alias symlink created for this endpoint, if any.
    pub fn alias(&self) -> Option<&Path> {
        self.alias.as_deref()
    }
}

impl AsRawFd for PtyEndpoint {
    fn as_raw_fd(&self) -> RawFd {
        self.master.as_raw_fd()
    }
}

impl Port for PtyEndpoint {
    fn read_bytes(&self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.master.read_bytes(buf)
    }

    fn write_bytes(&self, buf: &[u8]) -> std::io::Result<usize> {
        self.master.write_bytes(buf)
    }
}

impl Drop for PtyEndpoint {
    fn drop(&mut self) {
        let Some(alias) = &self.alias else {
            return;
        };
        match std::fs::read_link(alias) {
            Ok(target) if target == self.name => {
                debug!(?alias, "removing pseudo-terminal alias");
                let _ = std::fs::remove_file(alias);
            }
            Ok(_) => debug!(?alias, "alias retargeted; skipping cleanup"),
            Err(err) => debug!(?alias, error = %err, "alias no longer a symlink; skipping cleanup"),
        }
    }
}

impl std::fmt::Debug for PtyEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PtyEndpoint")
            .field("name", &self.name)
            .field("alias", &self.alias)
            .finish()
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn slave_name(fd: RawFd) -> std::io::Result<PathBuf> {
    let mut buf = [0 as libc::c_char; PTY_NAME_CAPACITY];
    // SAFETY: `buf` is writable for PTY_NAME_CAPACITY bytes and ptsname_r
    // NUL-terminates on success.
    let rc = unsafe { libc::ptsname_r(fd, buf.as_mut_ptr(), buf.len()) };
    if rc != 0 {
        return Err(std::io::Error::from_raw_os_error(rc));
    }
    // SAFETY: ptsname_r succeeded, so `buf` holds a NUL-terminated string.
    let name = unsafe { CStr::from_ptr(buf.as_ptr()) };
    Ok(PathBuf::from(name.to_string_lossy().into_owned()))
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn slave_name(fd: RawFd) -> std::io::Result<PathBuf> {
    // SAFETY: ptsname returns a pointer to static storage or NULL; endpoints are
    // allocated sequentially during startup so the storage is not shared.
    let ptr = unsafe { libc::ptsname(fd) };
    if ptr.is_null() {
        return Err(std::io::Error::last_os_error());
    }
    // SAFETY: non-null result of ptsname is a NUL-terminated string.
    let name = unsafe { CStr::from_ptr(ptr) };
    let name = name.to_string_lossy().into_owned();
    debug_assert!(name.len() < PTY_NAME_CAPACITY);
    Ok(PathBuf::from(name))
}

fn create_alias(target: &Path, alias: &Path) -> Result<()> {
    match std::fs::remove_file(alias) {
        Ok(()) => warn!(?alias, "replaced existing path with pseudo-terminal alias"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(source) => {
            return Err(TransportError::Alias {
                path: alias.to_path_buf(),
                source,
            })
        }
    }
    std::os::unix::fs::symlink(target, alias).map_err(|source| TransportError::Alias {
        path: alias.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::{Duration, Instant};

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("sermux-pty-{tag}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn read_until(port: &dyn Port, want: usize) -> Vec<u8> {
        let mut got = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(2);
        while got.len() < want && Instant::now() < deadline {
            let mut buf = [0u8; 64];
            match port.read_bytes(&mut buf) {
                Ok(n) => got.extend_from_slice(&buf[..n]),
                Err(_) => std::thread::sleep(Duration::from_millis(5)),
            }
        }
        got
    }

    #[test]
    fn allocates_named_pty() {
        let pty = PtyEndpoint::open(None).unwrap();
        assert!(pty.name().exists());
        assert!(pty.alias().is_none());
    }

    #[test]
    fn slave_writes_reach_master() {
        let pty = PtyEndpoint::open(None).unwrap();
        let mut slave = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(pty.name())
            .unwrap();

        slave.write_all(b"abc").unwrap();
        assert_eq!(read_until(&pty, 3), b"abc");
    }

    #[test]
    fn alias_points_at_slave_and_is_removed_on_drop() {
        let dir = temp_dir("alias");
        let alias = dir.join("ptyA");

        let pty = PtyEndpoint::open(Some(&alias)).unwrap();
        assert_eq!(std::fs::read_link(&alias).unwrap(), pty.name());
        assert_eq!(pty.alias(), Some(alias.as_path()));

        drop(pty);
        assert!(std::fs::symlink_metadata(&alias).is_err());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn alias_replaces_existing_file() {
        let dir = temp_dir("replace");
        let alias = dir.join("ptyB");
        std::fs::write(&alias, b"stale").unwrap();

        let pty = PtyEndpoint::open(Some(&alias)).unwrap();
        assert_eq!(std::fs::read_link(&alias).unwrap(), pty.name());

        drop(pty);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn drop_keeps_retargeted_alias() {
        let dir = temp_dir("retarget");
        let alias = dir.join("ptyC");

        let pty = PtyEndpoint::open(Some(&alias)).unwrap();
        std::fs::remove_file(&alias).unwrap();
        std::os::unix::fs::symlink("/dev/null", &alias).unwrap();

        drop(pty);
        assert_eq!(std::fs::read_link(&alias).unwrap(), Path::new("/dev/null"));

        let _ = std::fs::remove_file(&alias);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn alias_in_missing_directory_fails() {
        let alias = Path::new("/nonexistent-sermux-dir/ptyD");
        let result = PtyEndpoint::open(Some(alias));
        assert!(matches!(result, Err(TransportError::Alias { .. })));
    }
}
