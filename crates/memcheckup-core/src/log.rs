//! Buffered log stream over a raw file descriptor.
//!
//! The log path must never allocate: opening a `std::fs::File` builds a
//! `CString` through the process allocator, the very allocator being
//! interposed. The stream therefore goes through `libc` with nul-terminated
//! path literals and keeps a fixed in-place buffer.

use core::fmt;

/// Log file written by the check-up, truncated at init.
pub const LOG_PATH: &str = "memory_check_up.txt";
const LOG_PATH_C: &[u8] = b"memory_check_up.txt\0";
const DEV_NULL_C: &[u8] = b"/dev/null\0";

/// Fixed stream buffer size in bytes.
pub const LOG_BUFFER_SIZE: usize = 512;

/// Where a check-up writes its log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    /// Truncate and write [`LOG_PATH`], falling back to standard output when
    /// the file cannot be opened.
    File,
    /// Standard output.
    Stdout,
    /// Discard everything; for harnesses that render the report elsewhere.
    Discard,
}

/// A write-only stream with a fixed buffer, flushed on overflow and drop.
pub struct LogStream {
    fd: libc::c_int,
    owns_fd: bool,
    len: usize,
    buf: [u8; LOG_BUFFER_SIZE],
}

impl LogStream {
    /// Open the requested target. The log file is opened close-on-exec so
    /// the descriptor never leaks into exec'd children.
    pub fn open(target: LogTarget) -> Self {
        let (fd, owns_fd) = match target {
            LogTarget::Stdout => (libc::STDOUT_FILENO, false),
            LogTarget::Discard => {
                // SAFETY: valid nul-terminated path literal.
                let fd = unsafe { libc::open(DEV_NULL_C.as_ptr().cast(), libc::O_WRONLY) };
                if fd < 0 {
                    (libc::STDOUT_FILENO, false)
                } else {
                    (fd, true)
                }
            }
            LogTarget::File => {
                // SAFETY: valid nul-terminated path literal.
                let fd = unsafe {
                    libc::open(
                        LOG_PATH_C.as_ptr().cast(),
                        libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC | libc::O_CLOEXEC,
                        0o644,
                    )
                };
                if fd < 0 {
                    raw_write(
                        libc::STDOUT_FILENO,
                        b"memcheckup: unable to open memory_check_up.txt, logging to stdout\n",
                    );
                    (libc::STDOUT_FILENO, false)
                } else {
                    (fd, true)
                }
            }
        };
        Self {
            fd,
            owns_fd,
            len: 0,
            buf: [0; LOG_BUFFER_SIZE],
        }
    }

    fn push(&mut self, mut bytes: &[u8]) {
        while !bytes.is_empty() {
            if self.len == self.buf.len() {
                self.flush();
            }
            let take = (self.buf.len() - self.len).min(bytes.len());
            self.buf[self.len..self.len + take].copy_from_slice(&bytes[..take]);
            self.len += take;
            bytes = &bytes[take..];
        }
    }

    /// Drain the buffer to the descriptor.
    pub fn flush(&mut self) {
        if self.len == 0 {
            return;
        }
        raw_write(self.fd, &self.buf[..self.len]);
        #[cfg(feature = "echo")]
        if self.owns_fd {
            raw_write(libc::STDOUT_FILENO, &self.buf[..self.len]);
        }
        self.len = 0;
    }
}

impl fmt::Write for LogStream {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.push(s.as_bytes());
        Ok(())
    }
}

impl Drop for LogStream {
    fn drop(&mut self) {
        self.flush();
        if self.owns_fd {
            // SAFETY: the descriptor was opened by us and not closed since.
            unsafe { libc::close(self.fd) };
        }
    }
}

/// Best-effort full write. Short writes are retried; errors are swallowed
/// because there is nowhere left to report a failing log.
fn raw_write(fd: libc::c_int, mut bytes: &[u8]) {
    while !bytes.is_empty() {
        // SAFETY: the buffer is valid for `bytes.len()` bytes.
        let written = unsafe { libc::write(fd, bytes.as_ptr().cast(), bytes.len()) };
        if written <= 0 {
            return;
        }
        bytes = &bytes[written as usize..];
    }
}
