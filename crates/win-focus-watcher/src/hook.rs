//! Foreground WinEvent hook and the thread's message loop.
//!
//! The hook is out of context, so its callback runs on the installing thread
//! from inside `GetMessageW`. The callback resolves the window to a process id
//! and hands it to the installed handler. The handler is stored per thread and
//! cloned out before it is called, so a nested dispatch finds it unborrowed.

use std::{cell::RefCell, marker::PhantomData, rc::Rc};

use once_cell::sync::OnceCell;
use tracing::{debug, trace, warn};
use windows::{
    Win32::{
        Foundation::{BOOL, FALSE, HMODULE, HWND, LPARAM, TRUE, WPARAM},
        System::{Console::SetConsoleCtrlHandler, Threading::GetCurrentThreadId},
        UI::{
            Accessibility::{HWINEVENTHOOK, SetWinEventHook, UnhookWinEvent},
            WindowsAndMessaging::{
                DispatchMessageW, GetMessageW, GetWindowThreadProcessId, MSG, PM_NOREMOVE,
                PeekMessageW, PostThreadMessageW, TranslateMessage, WM_QUIT, WM_USER,
            },
        },
    },
    core::Error as WinError,
};

use crate::{
    error::{Error, Result},
    filter::{EVENT_SYSTEM_FOREGROUND, HookOptions, is_foreground_change},
};

thread_local! {
    /// Handler for the hook installed on this thread.
    static HANDLER: RefCell<Option<Rc<dyn Fn(u32)>>> = const { RefCell::new(None) };
}

/// Target of console control events.
static CONSOLE_QUIT: OnceCell<QuitHandle> = OnceCell::new();

/// An installed foreground hook. Removed on drop.
///
/// Bound to the thread that installed it: that thread must also run
/// [`FocusHook::run`] and drop the hook.
pub struct FocusHook {
    /// Hook handle from `SetWinEventHook`.
    hook: HWINEVENTHOOK,
    /// Thread that owns the hook and its message queue.
    thread_id: u32,
    /// Pins the hook to its thread.
    _thread: PhantomData<*const ()>,
}

impl FocusHook {
    /// Install the hook on the calling thread. `on_foreground` receives the
    /// owning process id of each new foreground window, or zero if it could
    /// not be resolved.
    pub fn install(options: HookOptions, on_foreground: impl Fn(u32) + 'static) -> Result<Self> {
        if HANDLER.with(|h| h.borrow().is_some()) {
            return Err(Error::AlreadyInstalled);
        }

        // Create the thread's message queue so a quit can be posted before the
        // loop starts.
        let mut msg = MSG::default();
        let _ = unsafe { PeekMessageW(&mut msg, HWND::default(), WM_USER, WM_USER, PM_NOREMOVE) };

        HANDLER.with(|h| *h.borrow_mut() = Some(Rc::new(on_foreground)));
        let hook = unsafe {
            SetWinEventHook(
                EVENT_SYSTEM_FOREGROUND,
                EVENT_SYSTEM_FOREGROUND,
                HMODULE::default(),
                Some(on_win_event),
                0,
                0,
                options.flags(),
            )
        };
        if hook.is_invalid() {
            HANDLER.with(|h| h.borrow_mut().take());
            let e = WinError::from_win32();
            return Err(Error::HookInstall {
                code: e.code().0,
                message: e.message().to_string(),
            });
        }

        let thread_id = unsafe { GetCurrentThreadId() };
        debug!(thread_id, flags = options.flags(), "foreground_hook_installed");
        Ok(Self {
            hook,
            thread_id,
            _thread: PhantomData,
        })
    }

    /// A handle that stops [`FocusHook::run`] from any thread.
    pub fn quit_handle(&self) -> QuitHandle {
        QuitHandle {
            thread_id: self.thread_id,
        }
    }

    /// Pump this thread's messages until a quit is posted.
    pub fn run(&self) -> Result<()> {
        let mut msg = MSG::default();
        loop {
            let r = unsafe { GetMessageW(&mut msg, HWND::default(), 0, 0) };
            match r.0 {
                0 => break,
                -1 => {
                    let e = WinError::from_win32();
                    return Err(Error::MessageLoop {
                        code: e.code().0,
                        message: e.message().to_string(),
                    });
                }
                _ => unsafe {
                    let _ = TranslateMessage(&msg);
                    DispatchMessageW(&msg);
                },
            }
        }
        debug!("message_loop_exited");
        Ok(())
    }
}

impl Drop for FocusHook {
    fn drop(&mut self) {
        if !unsafe { UnhookWinEvent(self.hook) }.as_bool() {
            warn!("foreground_hook_unhook_failed");
        }
        HANDLER.with(|h| h.borrow_mut().take());
        debug!("foreground_hook_removed");
    }
}

/// Posts a quit to the hook thread's message loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuitHandle {
    /// Thread running the loop.
    thread_id: u32,
}

impl QuitHandle {
    /// Ask the message loop to exit.
    pub fn quit(&self) -> Result<()> {
        unsafe { PostThreadMessageW(self.thread_id, WM_QUIT, WPARAM(0), LPARAM(0)) }.map_err(
            |e| Error::PostQuit {
                thread_id: self.thread_id,
                message: e.message().to_string(),
            },
        )
    }
}

/// Route Ctrl+C, Ctrl+Break, and console close to `handle`. Only the first
/// call installs a handler.
pub fn quit_on_console_ctrl(handle: QuitHandle) -> Result<()> {
    if CONSOLE_QUIT.set(handle).is_err() {
        debug!("console_handler_already_set");
        return Ok(());
    }
    unsafe { SetConsoleCtrlHandler(Some(on_console_ctrl), TRUE) }
        .map_err(|e| Error::ConsoleHandler(e.message().to_string()))
}

unsafe extern "system" fn on_console_ctrl(ctrl_type: u32) -> BOOL {
    let Some(handle) = CONSOLE_QUIT.get() else {
        return FALSE;
    };
    debug!(ctrl_type, "console_ctrl");
    match handle.quit() {
        Ok(()) => TRUE,
        Err(e) => {
            warn!(error = %e, "console_quit_failed");
            FALSE
        }
    }
}

unsafe extern "system" fn on_win_event(
    _hook: HWINEVENTHOOK,
    event: u32,
    hwnd: HWND,
    id_object: i32,
    id_child: i32,
    _event_thread: u32,
    _event_time: u32,
) {
    if !is_foreground_change(event, hwnd.0.is_null(), id_object, id_child) {
        return;
    }
    let mut pid = 0u32;
    unsafe { GetWindowThreadProcessId(hwnd, Some(&mut pid)) };
    trace!(pid, "foreground_changed");
    let handler = HANDLER.with(|h| h.borrow().clone());
    if let Some(handler) = handler {
        handler(pid);
    }
}
