//! Best-effort request for the finest timer period the OS offers.
//!
//! Failure is logged and otherwise ignored: calibration measures whatever
//! sleep the platform actually delivers. Timer slack on Linux is per thread,
//! so the request belongs on the thread that will wait.

/// Outcome of asking the OS for a finer timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerRequest {
    /// No request was made (fixed strategy, no calibration).
    NotRequested,
    Granted,
    /// The platform has no such request.
    Unavailable,
    /// The OS refused; waits fall back to whatever granularity is measured.
    Failed,
}

/// Ask the OS for its finest timer period on the calling thread.
pub fn request_fine_timer() -> TimerRequest {
    let outcome = platform_request();
    match outcome {
        TimerRequest::Granted => tracing::debug!("fine timer period granted"),
        TimerRequest::Unavailable => tracing::debug!("no fine timer request on this platform"),
        TimerRequest::Failed | TimerRequest::NotRequested => {
            tracing::warn!("fine timer period request refused, continuing")
        }
    }
    outcome
}

/// Shrink this thread's timer slack so short sleeps are not coalesced.
#[cfg(target_os = "linux")]
fn platform_request() -> TimerRequest {
    // SAFETY: PR_SET_TIMERSLACK takes a single unsigned long and touches no memory.
    let result = unsafe { libc::prctl(libc::PR_SET_TIMERSLACK, 1 as libc::c_ulong) };
    if result == 0 {
        TimerRequest::Granted
    } else {
        tracing::debug!(
            error = %std::io::Error::last_os_error(),
            "prctl(PR_SET_TIMERSLACK) failed"
        );
        TimerRequest::Failed
    }
}

/// Raise the multimedia timer to its minimum period and opt the process out
/// of power throttling that would otherwise ignore it.
#[cfg(windows)]
fn platform_request() -> TimerRequest {
    use windows_sys::Win32::Media::{TIMECAPS, TIMERR_NOERROR, timeBeginPeriod, timeGetDevCaps};
    use windows_sys::Win32::System::Threading::{
        GetCurrentProcess, PROCESS_POWER_THROTTLING_CURRENT_VERSION,
        PROCESS_POWER_THROTTLING_EXECUTION_SPEED, PROCESS_POWER_THROTTLING_IGNORE_TIMER_RESOLUTION,
        PROCESS_POWER_THROTTLING_STATE, ProcessPowerThrottling, SetProcessInformation,
    };

    let mut caps = TIMECAPS {
        wPeriodMin: 0,
        wPeriodMax: 0,
    };
    // SAFETY: `caps` is a live, writable TIMECAPS and the size passed matches it.
    let caps_ok =
        unsafe { timeGetDevCaps(&mut caps, std::mem::size_of::<TIMECAPS>() as u32) } == TIMERR_NOERROR;
    let period = if caps_ok { caps.wPeriodMin.max(1) } else { 1 };

    // SAFETY: plain value call; the period stays raised for the process lifetime.
    if unsafe { timeBeginPeriod(period) } != TIMERR_NOERROR {
        tracing::debug!(period_ms = period, "timeBeginPeriod refused");
        return TimerRequest::Failed;
    }

    // Control both flags, enable neither: full speed, timer requests honoured.
    let state = PROCESS_POWER_THROTTLING_STATE {
        Version: PROCESS_POWER_THROTTLING_CURRENT_VERSION,
        ControlMask: PROCESS_POWER_THROTTLING_EXECUTION_SPEED
            | PROCESS_POWER_THROTTLING_IGNORE_TIMER_RESOLUTION,
        StateMask: 0,
    };
    // SAFETY: `state` outlives the call and the size passed matches its type.
    let throttling_off = unsafe {
        SetProcessInformation(
            GetCurrentProcess(),
            ProcessPowerThrottling,
            (&state as *const PROCESS_POWER_THROTTLING_STATE).cast(),
            std::mem::size_of::<PROCESS_POWER_THROTTLING_STATE>() as u32,
        )
    } != 0;
    tracing::debug!(period_ms = period, throttling_off, "timer period raised");
    TimerRequest::Granted
}

#[cfg(not(any(target_os = "linux", windows)))]
fn platform_request() -> TimerRequest {
    TimerRequest::Unavailable
}
