//! Signal handling for `cusync watch`: SIGTERM/SIGINT stop the synchronizer,
//! SIGHUP requests a full rescan, SIGUSR1 requests a view refresh.
//!
//! The watch loop polls the flags between UI pumps rather than blocking on
//! signals.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use signal_hook::consts::{SIGINT, SIGTERM};

/// Signal state shared between the OS handlers and the watch loop.
#[derive(Clone, Debug)]
pub struct SignalHandler {
    shutdown_flag: Arc<AtomicBool>,
    rescan_flag: Arc<AtomicBool>,
    refresh_flag: Arc<AtomicBool>,
}

impl SignalHandler {
    /// Create a handler and register OS signal hooks.
    ///
    /// Registration is best-effort; failures are reported on stderr.
    pub fn new() -> Self {
        let handler = Self::unregistered();
        handler.register_signals();
        handler
    }

    /// A handler driven only by the `request_*` methods.
    pub fn unregistered() -> Self {
        Self {
            shutdown_flag: Arc::new(AtomicBool::new(false)),
            rescan_flag: Arc::new(AtomicBool::new(false)),
            refresh_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn should_shutdown(&self) -> bool {
        self.shutdown_flag.load(Ordering::Relaxed)
    }

    /// Check (and clear) whether a rescan has been requested.
    pub fn should_rescan(&self) -> bool {
        self.rescan_flag.swap(false, Ordering::Relaxed)
    }

    /// Check (and clear) whether a refresh has been requested.
    pub fn should_refresh(&self) -> bool {
        self.refresh_flag.swap(false, Ordering::Relaxed)
    }

    pub fn request_shutdown(&self) {
        self.shutdown_flag.store(true, Ordering::Relaxed);
    }

    pub fn request_rescan(&self) {
        self.rescan_flag.store(true, Ordering::Relaxed);
    }

    pub fn request_refresh(&self) {
        self.refresh_flag.store(true, Ordering::Relaxed);
    }

    fn register_signals(&self) {
        if let Err(e) = signal_hook::flag::register(SIGTERM, Arc::clone(&self.shutdown_flag)) {
            eprintln!("[CUS-SIGNAL] failed to register SIGTERM: {e}");
        }
        if let Err(e) = signal_hook::flag::register(SIGINT, Arc::clone(&self.shutdown_flag)) {
            eprintln!("[CUS-SIGNAL] failed to register SIGINT: {e}");
        }

        #[cfg(unix)]
        {
            use signal_hook::consts::{SIGHUP, SIGUSR1};
            if let Err(e) = signal_hook::flag::register(SIGHUP, Arc::clone(&self.rescan_flag)) {
                eprintln!("[CUS-SIGNAL] failed to register SIGHUP: {e}");
            }
            if let Err(e) = signal_hook::flag::register(SIGUSR1, Arc::clone(&self.refresh_flag)) {
                eprintln!("[CUS-SIGNAL] failed to register SIGUSR1: {e}");
            }
        }
    }
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}
