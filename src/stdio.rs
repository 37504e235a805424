//! Temporary silencing of output file descriptors.

use std::fs::File;
use std::io;
use std::io::Write as _;
use std::os::fd::AsRawFd as _;
use std::os::fd::FromRawFd as _;
use std::os::fd::OwnedFd;
use std::os::fd::RawFd;

use crate::log::error;
use crate::Error;
use crate::Result;


const DEV_NULL: &str = "/dev/null";


fn dup(fd: RawFd) -> io::Result<OwnedFd> {
    let rc = unsafe { libc::dup(fd) };
    if rc < 0 {
        return Err(io::Error::last_os_error())
    }
    // SAFETY: `dup` returned a new file descriptor that nobody else
    //         owns.
    Ok(unsafe { OwnedFd::from_raw_fd(rc) })
}

fn dup2(src: RawFd, dst: RawFd) -> io::Result<()> {
    let rc = unsafe { libc::dup2(src, dst) };
    if rc < 0 {
        return Err(io::Error::last_os_error())
    }
    Ok(())
}

fn flush(fd: RawFd) {
    let result = match fd {
        libc::STDOUT_FILENO => io::stdout().flush(),
        libc::STDERR_FILENO => io::stderr().flush(),
        _ => Ok(()),
    };
    if let Err(err) = result {
        error!("BUG: failed to flush file descriptor {fd}: {err}");
    }
}

/// Classify a setup failure: running out of file descriptors is a hard
/// error, anything else a defect that we merely log.
fn check_setup<T>(result: io::Result<T>, what: &str) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.raw_os_error() == Some(libc::EMFILE) => Err(Error::with_resource_limit(
            format!("failed to {what}: too many open files, please raise NOFILE"),
            err,
        )),
        Err(err) => {
            error!("BUG: failed to {what}: {err}");
            Ok(None)
        }
    }
}


/// A guard redirecting a file descriptor to `/dev/null` for as long as
/// it is alive.
///
/// The original file descriptor is restored when the guard is dropped.
#[derive(Debug)]
pub struct StdioSilencer {
    fd: RawFd,
    saved: Option<OwnedFd>,
}

impl StdioSilencer {
    /// Redirect `fd` to `/dev/null`.
    ///
    /// Running out of file descriptors is reported as an error of kind
    /// [`ErrorKind::ResourceLimit`][crate::ErrorKind::ResourceLimit].
    /// Any other failure leaves `fd` untouched and is only logged.
    pub fn silence(fd: RawFd) -> Result<Self> {
        let () = flush(fd);

        let Some(saved) = check_setup(dup(fd), "duplicate file descriptor")? else {
            return Ok(Self { fd, saved: None })
        };
        let Some(null) = check_setup(
            File::options().write(true).open(DEV_NULL),
            "open /dev/null",
        )?
        else {
            return Ok(Self { fd, saved: None })
        };

        if let Err(err) = dup2(null.as_raw_fd(), fd) {
            error!("BUG: failed to redirect file descriptor {fd}: {err}");
            return Ok(Self { fd, saved: None })
        }

        Ok(Self {
            fd,
            saved: Some(saved),
        })
    }

    /// Redirect standard output to `/dev/null`.
    pub fn stdout() -> Result<Self> {
        Self::silence(libc::STDOUT_FILENO)
    }

    /// Redirect standard error to `/dev/null`.
    pub fn stderr() -> Result<Self> {
        Self::silence(libc::STDERR_FILENO)
    }

    /// Check whether the file descriptor is actually silenced.
    pub fn is_active(&self) -> bool {
        self.saved.is_some()
    }
}

impl Drop for StdioSilencer {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            let () = flush(self.fd);
            if let Err(err) = dup2(saved.as_raw_fd(), self.fd) {
                error!("BUG: failed to restore file descriptor {}: {err}", self.fd);
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;
    use std::io::Write as _;
    use std::os::fd::AsRawFd as _;

    use tempfile::NamedTempFile;
    use test_log::test;


    /// Check that output is discarded while silenced and that the
    /// original destination is restored afterwards.
    #[test]
    fn silencing() {
        let mut file = NamedTempFile::new().unwrap();
        let fd = file.as_file().as_raw_fd();

        let () = file.write_all(b"before ").unwrap();
        {
            let silencer = StdioSilencer::silence(fd).unwrap();
            assert!(silencer.is_active());
            let () = file.write_all(b"during ").unwrap();
        }
        let () = file.write_all(b"after").unwrap();

        let content = fs::read_to_string(file.path()).unwrap();
        assert_eq!(content, "before after");
    }

    /// Silencing an invalid file descriptor is not an error.
    #[test]
    fn invalid_fd() {
        let silencer = StdioSilencer::silence(-1).unwrap();
        assert!(!silencer.is_active());
    }
}
