//! Duplicate-mode isolation: fork the current process image

use crate::errors::{IsolateError, Result};
use crate::isolation::{Delivery, IsolatedUnit, channel, check, execute_unit};
use log::{debug, warn};
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid, fork};

/// Fork, run `unit` in the child, and collect the child's raw record.
///
/// The child leaves through `_exit` so nothing inherited from the parent
/// (destructors, buffered output, atexit handlers) runs a second time.
pub(crate) fn run_forked<U: IsolatedUnit>(name: &str, unit: &U) -> Result<Delivery> {
    let (mut parent_end, mut child_end) = channel::pair()?;
    check::install_panic_hook();

    // SAFETY: the child only runs the unit, writes to its socket and exits.
    match unsafe { fork() } {
        Ok(ForkResult::Child) => {
            drop(parent_end);
            let record = execute_unit(name, unit);
            let code = match record
                .to_bytes()
                .and_then(|bytes| Ok(channel::send(&mut child_end, &bytes)?))
            {
                Ok(()) => 0,
                Err(_) => 1,
            };
            unsafe { libc::_exit(code) }
        }
        Ok(ForkResult::Parent { child }) => {
            drop(child_end);
            debug!("forked child {} for unit {}", child, name);

            let payload = channel::receive(&mut parent_end).unwrap_or_else(|e| {
                warn!("reading from child {} failed: {}", child, e);
                Vec::new()
            });
            let exit_code = wait_for_child(child)?;

            Ok(Delivery {
                pid: child.as_raw() as u32,
                payload,
                exit_code,
            })
        }
        Err(e) => Err(IsolateError::Syscall(format!("fork failed: {}", e))),
    }
}

/// Wait for child process and get exit status
pub(crate) fn wait_for_child(pid: Pid) -> Result<i32> {
    loop {
        match waitpid(pid, None) {
            Ok(WaitStatus::Exited(_, status)) => return Ok(status),
            Ok(WaitStatus::Signaled(_, signal, _)) => {
                return Ok(128 + signal as i32);
            }
            Ok(_) => continue,
            Err(nix::errno::Errno::EINTR) => continue,
            Err(e) => return Err(IsolateError::Syscall(format!("waitpid failed: {}", e))),
        }
    }
}
