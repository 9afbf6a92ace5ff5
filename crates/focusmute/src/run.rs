//! Wire the worker, the foreground hook, and the console handler together.
//!
//! The calling thread becomes the detection context: it installs the hook and
//! pumps messages until Ctrl+C, console close, or a reentrancy abort posts a
//! quit. Audio work stays on the worker thread owned by [`Lifecycle`].

use std::{cell::Cell, process, rc::Rc};

use config::Config;
use focusmute_core::{CapabilityError, Detection, Error as CoreError, FocusDetector, Lifecycle};
use tracing::{error, info, warn};
use win_audio_sessions::WasapiSessions;
use win_focus_watcher::{FocusHook, HookOptions, QuitHandle, quit_on_console_ctrl};

use crate::{failure::Failure, settings::lifecycle_settings};

/// Run until asked to stop. Returns once the worker has been shut down.
pub fn run(cfg: &Config) -> Result<(), Failure> {
    let mut lifecycle = Lifecycle::start(
        || WasapiSessions::acquire().map_err(CapabilityError::from),
        lifecycle_settings(cfg),
    )?;

    let detector = FocusDetector::new(lifecycle.sender(), process::id(), cfg.reentrancy_limit);
    let quit: Rc<Cell<Option<QuitHandle>>> = Rc::new(Cell::new(None));
    let aborted: Rc<Cell<Option<u32>>> = Rc::new(Cell::new(None));

    let on_foreground = {
        let quit = Rc::clone(&quit);
        let aborted = Rc::clone(&aborted);
        move |pid: u32| {
            let Detection::Abort { depth } = detector.on_foreground(pid) else {
                return;
            };
            if aborted.get().is_none() {
                aborted.set(Some(depth));
            }
            if let Some(handle) = quit.get()
                && let Err(e) = handle.quit()
            {
                error!(error = %e, "abort_quit_failed");
            }
        }
    };

    let options = HookOptions {
        skip_own_process: cfg.ignore_own_process,
    };
    let hook = match FocusHook::install(options, on_foreground) {
        Ok(hook) => hook,
        Err(e) => {
            stop(&mut lifecycle);
            return Err(e.into());
        }
    };
    quit.set(Some(hook.quit_handle()));

    if let Err(e) = quit_on_console_ctrl(hook.quit_handle()) {
        drop(hook);
        stop(&mut lifecycle);
        return Err(e.into());
    }
    if let Err(e) = lifecycle.confirm_running() {
        drop(hook);
        stop(&mut lifecycle);
        return Err(e.into());
    }
    info!(sessions = lifecycle.registry().len(), "focusmute_running");

    let looped = hook.run();
    drop(hook);
    let stopped = lifecycle.shutdown();

    looped?;
    if let Some(depth) = aborted.get() {
        if let Err(e) = stopped {
            warn!(error = %e, "shutdown_after_abort_failed");
        }
        return Err(CoreError::Reentrancy {
            depth,
            limit: cfg.reentrancy_limit,
        }
        .into());
    }
    stopped?;
    info!("focusmute_stopped");
    Ok(())
}

/// Shut the worker down on an error path, logging any secondary failure.
fn stop(lifecycle: &mut Lifecycle) {
    if let Err(e) = lifecycle.shutdown() {
        warn!(error = %e, "shutdown_failed");
    }
}
