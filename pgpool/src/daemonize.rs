//! Daemonization (spec §6, grounded on
//! `original_source/main.c::daemonize`): double-fork, `setsid`,
//! `chdir("/")`, redirect stdio to `/dev/null`.

use std::ffi::CString;

use crate::error::SupervisorError;

/// Detaches the process from its controlling terminal. Must be called
/// before any Tokio runtime is started: `fork()` after threads exist is
/// unsound, and the runtime's worker threads would not survive the fork.
#[cfg(unix)]
pub fn daemonize() -> Result<(), SupervisorError> {
    unsafe {
        match libc::fork() {
            -1 => return Err(SupervisorError::Daemonize(std::io::Error::last_os_error())),
            0 => {}                    // child continues below
            _ => std::process::exit(0), // parent exits
        }

        if libc::setsid() == -1 {
            return Err(SupervisorError::Daemonize(std::io::Error::last_os_error()));
        }

        match libc::fork() {
            -1 => return Err(SupervisorError::Daemonize(std::io::Error::last_os_error())),
            0 => {}
            _ => std::process::exit(0),
        }

        let root = CString::new("/").expect("constant contains no NUL");
        if libc::chdir(root.as_ptr()) == -1 {
            return Err(SupervisorError::Daemonize(std::io::Error::last_os_error()));
        }

        redirect_stdio_to_dev_null()?;
    }

    Ok(())
}

#[cfg(unix)]
unsafe fn redirect_stdio_to_dev_null() -> Result<(), SupervisorError> {
    let dev_null = CString::new("/dev/null").expect("constant contains no NUL");
    let fd = libc::open(dev_null.as_ptr(), libc::O_RDWR);
    if fd == -1 {
        return Err(SupervisorError::Daemonize(std::io::Error::last_os_error()));
    }

    for target in [libc::STDIN_FILENO, libc::STDOUT_FILENO, libc::STDERR_FILENO] {
        if libc::dup2(fd, target) == -1 {
            return Err(SupervisorError::Daemonize(std::io::Error::last_os_error()));
        }
    }

    if fd > libc::STDERR_FILENO {
        libc::close(fd);
    }

    Ok(())
}

#[cfg(not(unix))]
pub fn daemonize() -> Result<(), SupervisorError> {
    Ok(())
}
