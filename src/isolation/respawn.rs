//! Respawn-mode isolation: start the current executable again
//!
//! The parent launches a fresh process with two environment variables set:
//! [`UNIT_ENV`] names the unit to run and [`CHANNEL_FD_ENV`] holds the
//! inherited socket descriptor. When that process reaches the same
//! [`IsolatedContext::run`] call it takes the child role: it reads the unit
//! state from the socket, runs it, writes back the outcome and exits.

use crate::errors::{IsolateError, Result};
use crate::execution::process::exit_code;
use crate::isolation::{Delivery, IsolatedContext, IsolatedUnit, channel, execute_unit};
use log::{debug, warn};
use std::env;
use std::io;
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};

/// Inherited socket descriptor of a respawned child
pub const CHANNEL_FD_ENV: &str = "ISOLATE_RS_CHANNEL_FD";
/// Name of the unit a respawned child must run
pub const UNIT_ENV: &str = "ISOLATE_RS_UNIT";

/// Channel descriptor if this process is the respawned child for `name`
pub(crate) fn child_channel(name: &str) -> Option<RawFd> {
    if env::var(UNIT_ENV).ok()? != name {
        return None;
    }
    env::var(CHANNEL_FD_ENV).ok()?.parse().ok()
}

/// Child side: run the unit sent by the parent, report, and exit
pub(crate) fn serve<U: IsolatedUnit>(fd: RawFd, name: &str) -> ! {
    // SAFETY: the descriptor was handed to us by the parent and nothing
    // else in this process owns it.
    let stream = unsafe { UnixStream::from_raw_fd(fd) };

    let code = match serve_unit::<U>(stream, name) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("isolated unit {} could not report: {}", name, e);
            1
        }
    };
    std::process::exit(code)
}

fn serve_unit<U: IsolatedUnit>(mut stream: UnixStream, name: &str) -> Result<()> {
    // Processes started by the unit must not keep the channel open.
    set_cloexec(stream.as_raw_fd(), true)?;

    let payload = channel::receive(&mut stream)?;
    let unit: U = serde_json::from_slice(&payload)?;

    let record = execute_unit(name, &unit);
    channel::send(&mut stream, &record.to_bytes()?)?;
    Ok(())
}

/// Parent side: launch the child, hand it the unit, collect its raw record
pub(crate) fn run_respawned<U: IsolatedUnit>(
    context: &IsolatedContext,
    unit: &U,
) -> Result<Delivery> {
    let payload = serde_json::to_vec(unit)?;
    let (mut parent_end, child_end) = channel::pair()?;
    let child_fd = child_end.as_raw_fd();

    let program = match &context.program {
        Some(program) => program.clone(),
        None => env::current_exe()?,
    };

    let mut command = Command::new(&program);
    command
        .args(context.child_args())
        .env(UNIT_ENV, context.name())
        .env(CHANNEL_FD_ENV, child_fd.to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::null());

    // SAFETY: only async-signal-safe fcntl calls run between fork and exec.
    unsafe {
        command.pre_exec(move || set_cloexec(child_fd, false));
    }

    let mut child = command.spawn().map_err(|source| IsolateError::Spawn {
        program: program.display().to_string(),
        source,
    })?;
    drop(child_end);
    debug!("respawned child {} for unit {}", child.id(), context.name());

    // A child that never takes the child role exits without reading; that
    // surfaces below as a missing record, not as an error here.
    if let Err(e) = channel::send(&mut parent_end, &payload) {
        warn!("sending unit to child {} failed: {}", child.id(), e);
    }

    let received = channel::receive(&mut parent_end).unwrap_or_else(|e| {
        warn!("reading from child {} failed: {}", child.id(), e);
        Vec::new()
    });
    let status = child.wait()?;

    Ok(Delivery {
        pid: child.id(),
        payload: received,
        exit_code: exit_code(status),
    })
}

/// Set or clear `FD_CLOEXEC` on `fd`
fn set_cloexec(fd: RawFd, enabled: bool) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    let flags = if enabled {
        flags | libc::FD_CLOEXEC
    } else {
        flags & !libc::FD_CLOEXEC
    };
    if unsafe { libc::fcntl(fd, libc::F_SETFD, flags) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cloexec(fd: RawFd) -> bool {
        unsafe { libc::fcntl(fd, libc::F_GETFD) & libc::FD_CLOEXEC != 0 }
    }

    #[test]
    fn cloexec_can_be_cleared_and_restored() {
        let (a, _b) = channel::pair().unwrap();
        let fd = a.as_raw_fd();
        assert!(cloexec(fd));

        set_cloexec(fd, false).unwrap();
        assert!(!cloexec(fd));

        set_cloexec(fd, true).unwrap();
        assert!(cloexec(fd));
    }

    #[test]
    fn set_cloexec_rejects_closed_descriptor() {
        assert!(set_cloexec(-1, false).is_err());
        assert!(set_cloexec(-1, true).is_err());
    }
}
