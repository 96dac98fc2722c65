//! Process-group helpers so job timeouts can terminate a whole command tree
//! (the shell plus whatever it forked), not just the shell leader.

use std::io;

#[cfg(unix)]
/// Put the calling process into its own process group. Intended for use in
/// `pre_exec` so the spawned shell becomes the group leader.
pub fn set_process_group() -> io::Result<()> {
    if unsafe { libc::setpgid(0, 0) } == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

#[cfg(not(unix))]
pub fn set_process_group() -> io::Result<()> {
    Ok(())
}

#[cfg(unix)]
/// Send a signal to the process group led by `pid` (best-effort; a
/// `NotFound`/`ESRCH` result means the group is already gone).
fn signal_process_group(pid: u32, signal: libc::c_int) -> io::Result<()> {
    let pgid = pid as libc::pid_t;
    let result = unsafe { libc::killpg(pgid, signal) };
    if result == -1 {
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::NotFound {
            return Err(err);
        }
    }
    Ok(())
}

#[cfg(unix)]
pub fn terminate_process_group(pid: u32) -> io::Result<()> {
    signal_process_group(pid, libc::SIGTERM)
}

#[cfg(unix)]
pub fn kill_process_group(pid: u32) -> io::Result<()> {
    signal_process_group(pid, libc::SIGKILL)
}

#[cfg(not(unix))]
pub fn terminate_process_group(_pid: u32) -> io::Result<()> {
    Ok(())
}

#[cfg(not(unix))]
pub fn kill_process_group(_pid: u32) -> io::Result<()> {
    Ok(())
}

#[cfg(unix)]
/// Does a process with this pid exist? Used to decide liveness of a
/// recorded supervisor (or, transitively, a worker) without a PID file.
pub fn process_exists(pid: i64) -> bool {
    let result = unsafe { libc::kill(pid as libc::pid_t, 0) };
    if result == 0 {
        return true;
    }
    io::Error::last_os_error().raw_os_error() != Some(libc::ESRCH)
}

#[cfg(not(unix))]
pub fn process_exists(_pid: i64) -> bool {
    true
}
