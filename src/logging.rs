// src/logging.rs

//! Log sink selection for the helpers.
//!
//! Helpers are usually started by the kernel with no terminal attached, so
//! output goes to syslog unless stderr is a terminal.

use std::ffi::CString;
use std::io::{self, IsTerminal, Write};
use tracing::{Level, Metadata};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

/// Where log lines are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    Syslog,
}

impl LogTarget {
    /// Stderr when it is a terminal or syslog is disabled, syslog otherwise.
    pub fn detect(syslog_allowed: bool) -> Self {
        if io::stderr().is_terminal() || !syslog_allowed {
            LogTarget::Stderr
        } else {
            LogTarget::Syslog
        }
    }
}

/// Maps a tracing level onto a syslog priority.
pub fn syslog_priority(level: &Level) -> libc::c_int {
    match *level {
        Level::ERROR => libc::LOG_ERR,
        Level::WARN => libc::LOG_WARNING,
        Level::INFO => libc::LOG_INFO,
        Level::DEBUG | Level::TRACE => libc::LOG_DEBUG,
    }
}

/// A `MakeWriter` that sends each event to syslog at its level's priority.
#[derive(Debug, Clone, Copy)]
pub struct SyslogMakeWriter;

/// Buffers one formatted event and submits it on drop.
pub struct SyslogWriter {
    priority: libc::c_int,
    buf: Vec<u8>,
}

impl Write for SyslogWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for SyslogWriter {
    fn drop(&mut self) {
        while self.buf.last() == Some(&b'\n') {
            self.buf.pop();
        }
        self.buf.retain(|b| *b != 0);
        if self.buf.is_empty() {
            return;
        }
        if let Ok(line) = CString::new(std::mem::take(&mut self.buf)) {
            // SAFETY: both the format string and the message are NUL-terminated.
            unsafe { libc::syslog(self.priority, c"%s".as_ptr(), line.as_ptr()) };
        }
    }
}

impl<'a> MakeWriter<'a> for SyslogMakeWriter {
    type Writer = SyslogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        SyslogWriter {
            priority: libc::LOG_INFO,
            buf: Vec::new(),
        }
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        SyslogWriter {
            priority: syslog_priority(meta.level()),
            buf: Vec::new(),
        }
    }
}

/// Installs the global subscriber. `RUST_LOG` takes precedence over `level`.
///
/// `ident` must live for the whole process because syslog keeps the pointer.
pub fn init(target: LogTarget, ident: &'static std::ffi::CStr, facility: libc::c_int, level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match target {
        LogTarget::Stderr => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .compact()
                .with_ansi(io::stderr().is_terminal())
                .with_target(false)
                .init();
        }
        LogTarget::Syslog => {
            // SAFETY: `ident` is 'static, as openlog requires.
            unsafe { libc::openlog(ident.as_ptr(), libc::LOG_PID, facility) };
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(SyslogMakeWriter)
                .with_ansi(false)
                .without_time()
                .with_level(false)
                .with_target(false)
                .init();
        }
    }
}
