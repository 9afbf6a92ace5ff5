//! Per-thread COM initialization.

use std::marker::PhantomData;

use tracing::trace;
use windows::Win32::System::Com::{COINIT_MULTITHREADED, CoInitializeEx, CoUninitialize};

use crate::error::{Error, Result};

/// Membership of the current thread in the multithreaded apartment.
///
/// COM initialization is per thread, so the guard is neither `Send` nor
/// `Sync`: it is created, used, and dropped on the same thread.
pub struct ComApartment {
    /// Pins the guard to its thread.
    _thread: PhantomData<*const ()>,
}

impl ComApartment {
    /// Join the multithreaded apartment on the calling thread.
    pub fn enter() -> Result<Self> {
        unsafe { CoInitializeEx(None, COINIT_MULTITHREADED) }
            .ok()
            .map_err(|e| Error::os("co_initialize", &e))?;
        trace!("com_apartment_entered");
        Ok(Self {
            _thread: PhantomData,
        })
    }
}

impl Drop for ComApartment {
    fn drop(&mut self) {
        unsafe { CoUninitialize() };
        trace!("com_apartment_left");
    }
}
