//! HRESULT classification for the audio-session API.
//!
//! Pure functions over raw status codes and enum values so that the policy
//! can be tested on any platform.

use focusmute_core::{DisconnectReason, SessionOwner, SessionState};

use crate::error::{Error, Result};

/// Success.
pub const S_OK: i32 = 0;
/// Success, with a negative answer.
pub const S_FALSE: i32 = 1;
/// The session spans more than one process.
pub const AUDCLNT_S_NO_SINGLE_PROCESS: i32 = 0x0889_000D;
/// The audio endpoint was removed or reconfigured.
pub const AUDCLNT_E_DEVICE_INVALIDATED: i32 = 0x8889_0004_u32 as i32;
/// The Windows audio service is not running.
pub const AUDCLNT_E_SERVICE_NOT_RUNNING: i32 = 0x8889_0010_u32 as i32;
/// Catastrophic failure.
pub const E_UNEXPECTED: i32 = 0x8000_FFFF_u32 as i32;
/// Unspecified failure.
pub const E_FAIL: i32 = 0x8000_4005_u32 as i32;
/// The thread was already initialized in a different apartment.
pub const RPC_E_CHANGED_MODE: i32 = 0x8001_0106_u32 as i32;

/// How a status code should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Plain success.
    Ok,
    /// Success with a "no" answer (e.g. not the system sounds session).
    False,
    /// Success, but the session has no single owning process.
    NoSingleProcess,
    /// Any other non-negative code.
    OtherSuccess(i32),
    /// A failure code.
    Failure(i32),
}

/// Classify a raw HRESULT.
pub fn classify(code: i32) -> Status {
    match code {
        S_OK => Status::Ok,
        S_FALSE => Status::False,
        AUDCLNT_S_NO_SINGLE_PROCESS => Status::NoSingleProcess,
        c if c >= 0 => Status::OtherSuccess(c),
        c => Status::Failure(c),
    }
}

/// Short description of codes this crate knows about.
pub fn describe(code: i32) -> &'static str {
    match code {
        S_OK => "success",
        S_FALSE => "success (false)",
        AUDCLNT_S_NO_SINGLE_PROCESS => "session spans more than one process",
        AUDCLNT_E_DEVICE_INVALIDATED => "audio device invalidated",
        AUDCLNT_E_SERVICE_NOT_RUNNING => "audio service not running",
        RPC_E_CHANGED_MODE => "thread already in a different COM apartment",
        E_UNEXPECTED => "unexpected failure",
        E_FAIL => "unspecified failure",
        c if c >= 0 => "success",
        _ => "failure",
    }
}

/// Decide who owns a session from the results of `GetProcessId` and
/// `IsSystemSoundsSession`.
///
/// System sounds, multi-process sessions, and sessions reporting process zero
/// are all shared. A failing `GetProcessId` is an error.
pub fn resolve_owner(pid_status: i32, pid: u32, system_status: i32) -> Result<SessionOwner> {
    if classify(system_status) == Status::Ok {
        return Ok(SessionOwner::Shared);
    }
    match classify(pid_status) {
        Status::Failure(code) => Err(Error::from_code("get_process_id", code)),
        Status::NoSingleProcess => Ok(SessionOwner::Shared),
        _ if pid == 0 => Ok(SessionOwner::Shared),
        _ => Ok(SessionOwner::Process(pid)),
    }
}

/// Map an `AudioSessionState` value.
pub fn session_state(raw: i32) -> Option<SessionState> {
    match raw {
        0 => Some(SessionState::Inactive),
        1 => Some(SessionState::Active),
        2 => Some(SessionState::Expired),
        _ => None,
    }
}

/// Map an `AudioSessionDisconnectReason` value.
pub fn disconnect_reason(raw: i32) -> DisconnectReason {
    match raw {
        0 => DisconnectReason::DeviceRemoval,
        1 => DisconnectReason::ServerShutdown,
        2 => DisconnectReason::FormatChanged,
        3 => DisconnectReason::SessionLogoff,
        4 => DisconnectReason::SessionDisconnected,
        5 => DisconnectReason::ExclusiveModeOverride,
        other => DisconnectReason::Other(other),
    }
}
