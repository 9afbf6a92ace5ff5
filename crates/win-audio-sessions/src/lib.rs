//! Windows audio sessions for focusmute.
//!
//! [`WasapiSessions`] implements [`focusmute_core::AudioSessions`] over the
//! default render endpoint. It must be acquired on the thread that will use
//! it, typically inside the factory passed to
//! [`focusmute_core::Lifecycle::start`]. Per-session controls it hands out are
//! safe to use from any thread in the multithreaded apartment.
//!
//! HRESULT classification lives in [`status`] and is available on every
//! platform.

#[cfg(windows)]
mod apartment;
mod error;
pub mod status;
#[cfg(windows)]
mod wasapi;

#[cfg(windows)]
pub use apartment::ComApartment;
pub use error::{Error, Result};
#[cfg(windows)]
pub use wasapi::WasapiSessions;
