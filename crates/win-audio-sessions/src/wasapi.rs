//! WASAPI implementation of the audio-session capability.
//!
//! Sessions come from the default render endpoint's `IAudioSessionManager2`.
//! Creation and per-session notifications are delivered by the audio service
//! on its own threads; listeners forward them to sinks and never call back
//! into the audio API.

use std::{cell::RefCell, ffi::c_void, ptr, result::Result as StdResult};

use focusmute_core::{
    AudioSessions, CapabilityError, SessionControl, SessionCreatedSink, SessionDescriptor,
    SessionEvent, SessionEventSink, SessionIdentity,
};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};
use windows::{
    Win32::{
        Foundation::BOOL,
        Media::Audio::{
            AudioSessionDisconnectReason, AudioSessionState, IAudioSessionControl,
            IAudioSessionControl2, IAudioSessionEvents, IAudioSessionEvents_Impl,
            IAudioSessionManager2, IAudioSessionNotification, IAudioSessionNotification_Impl,
            IMMDeviceEnumerator, ISimpleAudioVolume, MMDeviceEnumerator, eConsole, eRender,
        },
        System::Com::{CLSCTX_ALL, CoCreateInstance, CoTaskMemFree},
    },
    core::{GUID, Interface, PCWSTR, PWSTR, Result as WinResult, implement},
};

use crate::{
    apartment::ComApartment,
    error::{Error, Result},
    status,
};

/// Audio sessions of the default render device.
///
/// Owns the thread's COM apartment membership, so it can only be used on the
/// thread that acquired it.
pub struct WasapiSessions {
    /// Session manager for the default render endpoint.
    manager: IAudioSessionManager2,
    /// Registered creation listener, kept for unregistration.
    created: RefCell<Option<IAudioSessionNotification>>,
    /// Dropped last, after every interface above is released.
    _com: ComApartment,
}

impl WasapiSessions {
    /// Initialize COM on the calling thread and open the session manager for
    /// the default render endpoint.
    pub fn acquire() -> Result<Self> {
        let com = ComApartment::enter()?;
        let enumerator: IMMDeviceEnumerator =
            unsafe { CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL) }
                .map_err(|e| Error::os("create_device_enumerator", &e))?;
        let device = unsafe { enumerator.GetDefaultAudioEndpoint(eRender, eConsole) }
            .map_err(|e| Error::os("get_default_audio_endpoint", &e))?;
        let manager = unsafe { device.Activate::<IAudioSessionManager2>(CLSCTX_ALL, None) }
            .map_err(|e| Error::os("activate_session_manager", &e))?;
        debug!("audio_session_manager_acquired");
        Ok(Self {
            manager,
            created: RefCell::new(None),
            _com: com,
        })
    }
}

impl AudioSessions for WasapiSessions {
    fn enumerate_sessions(&self) -> StdResult<Vec<SessionDescriptor>, CapabilityError> {
        let list = unsafe { self.manager.GetSessionEnumerator() }
            .map_err(|e| Error::os("get_session_enumerator", &e))?;
        let count = unsafe { list.GetCount() }.map_err(|e| Error::os("get_session_count", &e))?;
        let mut out = Vec::with_capacity(usize::try_from(count).unwrap_or_default());
        for i in 0..count {
            let control =
                unsafe { list.GetSession(i) }.map_err(|e| Error::os("get_session", &e))?;
            out.push(describe(&control)?);
        }
        Ok(out)
    }

    fn register_session_created(
        &self,
        sink: SessionCreatedSink,
    ) -> StdResult<(), CapabilityError> {
        let listener: IAudioSessionNotification = CreatedListener { sink }.into();
        unsafe { self.manager.RegisterSessionNotification(&listener) }
            .map_err(|e| Error::os("register_session_notification", &e))?;
        *self.created.borrow_mut() = Some(listener);
        Ok(())
    }

    fn unregister_session_created(&self) -> StdResult<(), CapabilityError> {
        let listener = self.created.borrow_mut().take();
        if let Some(listener) = listener {
            unsafe { self.manager.UnregisterSessionNotification(&listener) }
                .map_err(|e| Error::os("unregister_session_notification", &e))?;
        }
        Ok(())
    }
}

/// Build a descriptor for one session control.
fn describe(control: &IAudioSessionControl) -> Result<SessionDescriptor> {
    let control2: IAudioSessionControl2 = control
        .cast()
        .map_err(|e| Error::os("query_session_control2", &e))?;
    let volume: ISimpleAudioVolume = control
        .cast()
        .map_err(|e| Error::os("query_simple_audio_volume", &e))?;

    let (pid_status, pid) = unsafe { raw_process_id(&control2) };
    let system_status = unsafe { raw_is_system_sounds(&control2) };
    let owner = status::resolve_owner(pid_status, pid, system_status)?;
    let session_id = take_string("get_session_identifier", unsafe {
        control2.GetSessionIdentifier()
    })?;
    let instance_id = take_string("get_session_instance_identifier", unsafe {
        control2.GetSessionInstanceIdentifier()
    })?;
    let display_name =
        take_string("get_display_name", unsafe { control2.GetDisplayName() }).unwrap_or_default();

    trace!(%owner, session_id, display_name, "session_described");
    Ok(SessionDescriptor {
        identity: SessionIdentity::new(owner, session_id, instance_id),
        display_name,
        control: Box::new(WasapiSessionControl {
            control: control2,
            volume,
            listener: Mutex::new(None),
        }),
    })
}

/// `GetProcessId` through the vtable, keeping the HRESULT. The projected
/// method folds `AUDCLNT_S_NO_SINGLE_PROCESS` into plain success.
unsafe fn raw_process_id(control: &IAudioSessionControl2) -> (i32, u32) {
    let mut pid = 0u32;
    let hr = unsafe { (Interface::vtable(control).GetProcessId)(Interface::as_raw(control), &mut pid) };
    (hr.0, pid)
}

/// `IsSystemSoundsSession` through the vtable: `S_OK` means yes, `S_FALSE` no.
unsafe fn raw_is_system_sounds(control: &IAudioSessionControl2) -> i32 {
    unsafe { (Interface::vtable(control).IsSystemSoundsSession)(Interface::as_raw(control)) }.0
}

/// Copy and free a COM-allocated string.
fn take_string(op: &'static str, result: WinResult<PWSTR>) -> Result<String> {
    let raw = result.map_err(|e| Error::os(op, &e))?;
    if raw.is_null() {
        return Ok(String::new());
    }
    let s = unsafe { raw.to_string() };
    unsafe { CoTaskMemFree(Some(raw.0 as *const c_void)) };
    s.map_err(|_| Error::InvalidString { op })
}

/// Control object for one session.
struct WasapiSessionControl {
    /// Session control, used for notification registration.
    control: IAudioSessionControl2,
    /// Volume interface, used for mute.
    volume: ISimpleAudioVolume,
    /// Registered property listener, kept for unregistration.
    listener: Mutex<Option<IAudioSessionEvents>>,
}

// SAFETY: the interfaces were obtained in the multithreaded apartment, where
// interface pointers may be used from any thread in that apartment. The
// worker and the audio service's notification threads are all MTA threads.
unsafe impl Send for WasapiSessionControl {}
// SAFETY: see `Send` above; the only interior mutability is behind a mutex.
unsafe impl Sync for WasapiSessionControl {}

impl SessionControl for WasapiSessionControl {
    fn set_mute(&self, muted: bool) -> StdResult<(), CapabilityError> {
        unsafe { self.volume.SetMute(BOOL::from(muted), ptr::null()) }
            .map_err(|e| Error::os("set_mute", &e).into())
    }

    fn register_events(&self, sink: SessionEventSink) -> StdResult<(), CapabilityError> {
        let listener: IAudioSessionEvents = SessionListener { sink }.into();
        unsafe { self.control.RegisterAudioSessionNotification(&listener) }
            .map_err(|e| Error::os("register_audio_session_notification", &e))?;
        *self.listener.lock() = Some(listener);
        Ok(())
    }

    fn unregister_events(&self) -> StdResult<(), CapabilityError> {
        let listener = self.listener.lock().take();
        if let Some(listener) = listener {
            unsafe { self.control.UnregisterAudioSessionNotification(&listener) }
                .map_err(|e| Error::os("unregister_audio_session_notification", &e))?;
        }
        Ok(())
    }
}

/// Forwards session-created notifications.
#[implement(IAudioSessionNotification)]
struct CreatedListener {
    /// Receives one descriptor per new session.
    sink: SessionCreatedSink,
}

impl IAudioSessionNotification_Impl for CreatedListener_Impl {
    fn OnSessionCreated(&self, newsession: Option<&IAudioSessionControl>) -> WinResult<()> {
        let Some(control) = newsession else {
            return Ok(());
        };
        match describe(control) {
            Ok(descriptor) => (self.sink)(descriptor),
            Err(e) => warn!(error = %e, "session_created_describe_failed"),
        }
        Ok(())
    }
}

/// Forwards one session's property changes.
#[implement(IAudioSessionEvents)]
struct SessionListener {
    /// Closure bound to the session's identity.
    sink: SessionEventSink,
}

/// Copy a borrowed wide string, or empty if it is null or malformed.
fn wide(s: &PCWSTR) -> String {
    if s.is_null() {
        return String::new();
    }
    unsafe { s.to_string() }.unwrap_or_default()
}

impl IAudioSessionEvents_Impl for SessionListener_Impl {
    fn OnDisplayNameChanged(
        &self,
        newdisplayname: &PCWSTR,
        _eventcontext: *const GUID,
    ) -> WinResult<()> {
        (self.sink)(SessionEvent::DisplayNameChanged(wide(newdisplayname)));
        Ok(())
    }

    fn OnIconPathChanged(
        &self,
        newiconpath: &PCWSTR,
        _eventcontext: *const GUID,
    ) -> WinResult<()> {
        (self.sink)(SessionEvent::IconPathChanged(wide(newiconpath)));
        Ok(())
    }

    fn OnSimpleVolumeChanged(
        &self,
        newvolume: f32,
        newmute: BOOL,
        _eventcontext: *const GUID,
    ) -> WinResult<()> {
        (self.sink)(SessionEvent::SimpleVolumeChanged {
            volume: newvolume,
            muted: newmute.as_bool(),
        });
        Ok(())
    }

    fn OnChannelVolumeChanged(
        &self,
        channelcount: u32,
        _newchannelvolumearray: *const f32,
        changedchannel: u32,
        _eventcontext: *const GUID,
    ) -> WinResult<()> {
        (self.sink)(SessionEvent::ChannelVolumeChanged {
            channel_count: channelcount,
            changed_channel: changedchannel,
        });
        Ok(())
    }

    fn OnGroupingParamChanged(
        &self,
        _newgroupingparam: *const GUID,
        _eventcontext: *const GUID,
    ) -> WinResult<()> {
        (self.sink)(SessionEvent::GroupingParamChanged);
        Ok(())
    }

    fn OnStateChanged(&self, newstate: AudioSessionState) -> WinResult<()> {
        if let Some(state) = status::session_state(newstate.0) {
            (self.sink)(SessionEvent::StateChanged(state));
        }
        Ok(())
    }

    fn OnSessionDisconnected(
        &self,
        disconnectreason: AudioSessionDisconnectReason,
    ) -> WinResult<()> {
        (self.sink)(SessionEvent::Disconnected(status::disconnect_reason(
            disconnectreason.0,
        )));
        Ok(())
    }
}
