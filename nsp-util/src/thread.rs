use std::ffi::CString;
use std::io::ErrorKind;
use std::sync::atomic::AtomicBool;

pub fn set_name(name: &str) {
    let cstr = CString::new(name).expect("not a cstring in set_name");

    unsafe {
        libc::pthread_setname_np(libc::pthread_self(), cstr.as_ptr());
    }
}

/// Raises the calling thread to `SCHED_FIFO` priority 80, best-effort. Used
/// by the transport receive thread so a burst of datagrams doesn't get
/// starved by the rest of the process.
pub fn set_realtime_priority() {
    let rc = unsafe {
        libc::sched_setscheduler(
            0,
            libc::SCHED_FIFO,
            &libc::sched_param { sched_priority: 80 },
        )
    };

    if rc < 0 {
        static WARNED: AtomicBool = AtomicBool::new(false);
        let warned = WARNED.swap(true, std::sync::atomic::Ordering::Relaxed);

        if !warned {
            let err = std::io::Error::last_os_error();
            log::warn!("failed to set realtime thread priority: {err}");

            if err.kind() == ErrorKind::PermissionDenied {
                log::warn!("fix by running: setcap cap_sys_nice=ep <binary>");
            }
        }
    }
}
