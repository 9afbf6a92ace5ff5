//! Which WinEvents count as a foreground change, and how the hook is flagged.

/// `EVENT_SYSTEM_FOREGROUND`
pub const EVENT_SYSTEM_FOREGROUND: u32 = 0x0003;
/// `OBJID_WINDOW`
pub const OBJID_WINDOW: i32 = 0;
/// `CHILDID_SELF`
pub const CHILDID_SELF: i32 = 0;
/// `WINEVENT_OUTOFCONTEXT`
pub const WINEVENT_OUTOFCONTEXT: u32 = 0x0000;
/// `WINEVENT_SKIPOWNPROCESS`
pub const WINEVENT_SKIPOWNPROCESS: u32 = 0x0002;

/// Options for the foreground hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookOptions {
    /// Do not report windows that belong to this process.
    pub skip_own_process: bool,
}

impl Default for HookOptions {
    fn default() -> Self {
        Self {
            skip_own_process: true,
        }
    }
}

impl HookOptions {
    /// `dwFlags` for `SetWinEventHook`. The hook is always out of context.
    pub fn flags(self) -> u32 {
        if self.skip_own_process {
            WINEVENT_OUTOFCONTEXT | WINEVENT_SKIPOWNPROCESS
        } else {
            WINEVENT_OUTOFCONTEXT
        }
    }
}

/// True if a WinEvent reports a new foreground top-level window.
pub fn is_foreground_change(event: u32, hwnd_is_null: bool, id_object: i32, id_child: i32) -> bool {
    event == EVENT_SYSTEM_FOREGROUND
        && !hwnd_is_null
        && id_object == OBJID_WINDOW
        && id_child == CHILDID_SELF
}
