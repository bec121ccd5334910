// src/system/signals.rs

//! Stop requests for a running project.
//!
//! A run waits on a [`StopListener`]. Anything holding the matching
//! [`StopHandle`] can interrupt it: the desktop bridge, a test, or the OS
//! signal forwarder installed with [`SignalForwarder::install`] for the
//! duration of a terminal run.

use std::io;
use std::sync::mpsc::{self, Receiver, Sender};

/// Why a [`StopListener`] woke up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopEvent {
    /// Ctrl-C, a termination request, or an explicit stop.
    Interrupt,
    /// Every command has exited on its own.
    Finished,
}

/// Sending half of a stop channel. Clone it freely.
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: Sender<StopEvent>,
}

impl StopHandle {
    /// Asks the run to stop every command.
    pub fn interrupt(&self) {
        // The listener is gone once the run has completed; nothing to stop then.
        let _ = self.tx.send(StopEvent::Interrupt);
    }

    pub(crate) fn finish(&self) {
        let _ = self.tx.send(StopEvent::Finished);
    }
}

/// Receiving half of a stop channel.
#[derive(Debug)]
pub struct StopListener {
    rx: Receiver<StopEvent>,
}

impl StopListener {
    /// Blocks until the next stop event.
    pub fn wait(&self) -> StopEvent {
        self.rx.recv().unwrap_or(StopEvent::Finished)
    }
}

/// A connected handle and listener.
pub fn stop_channel() -> (StopHandle, StopListener) {
    let (tx, rx) = mpsc::channel();
    (StopHandle { tx }, StopListener { rx })
}

/// Routes SIGINT and SIGTERM (Ctrl-C on Windows) into a [`StopHandle`] until dropped.
#[derive(Debug)]
pub struct SignalForwarder {
    inner: platform::Forwarder,
}

impl SignalForwarder {
    /// Starts forwarding. Fails if the OS handlers cannot be registered.
    pub fn install(stop: StopHandle) -> io::Result<Self> {
        Ok(Self {
            inner: platform::Forwarder::install(stop)?,
        })
    }
}

impl Drop for SignalForwarder {
    fn drop(&mut self) {
        self.inner.uninstall();
    }
}

#[cfg(unix)]
mod platform {
    use super::StopHandle;
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::{Handle, Signals};
    use std::io;
    use std::thread::{self, JoinHandle};

    pub(super) struct Forwarder {
        handle: Handle,
        thread: Option<JoinHandle<()>>,
    }

    impl std::fmt::Debug for Forwarder {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("Forwarder")
                .field("running", &self.thread.is_some())
                .finish()
        }
    }

    impl Forwarder {
        pub(super) fn install(stop: StopHandle) -> io::Result<Self> {
            let mut signals = Signals::new([SIGINT, SIGTERM])?;
            let handle = signals.handle();
            let thread = thread::Builder::new()
                .name("spinup-signals".into())
                .spawn(move || {
                    for signal in signals.forever() {
                        log::debug!("Received signal {}", signal);
                        stop.interrupt();
                    }
                })?;
            Ok(Self {
                handle,
                thread: Some(thread),
            })
        }

        pub(super) fn uninstall(&mut self) {
            self.handle.close();
            if let Some(thread) = self.thread.take() {
                let _ = thread.join();
            }
        }
    }
}

#[cfg(windows)]
mod platform {
    use super::StopHandle;
    use std::io;
    use std::sync::{Mutex, OnceLock, PoisonError};

    /// `ctrlc` allows one handler per process; it forwards to whichever run is active.
    static ACTIVE: OnceLock<Mutex<Option<StopHandle>>> = OnceLock::new();

    fn slot() -> &'static Mutex<Option<StopHandle>> {
        ACTIVE.get_or_init(|| Mutex::new(None))
    }

    #[derive(Debug)]
    pub(super) struct Forwarder;

    impl Forwarder {
        pub(super) fn install(stop: StopHandle) -> io::Result<Self> {
            match ctrlc::set_handler(|| {
                let active = slot().lock().unwrap_or_else(PoisonError::into_inner);
                if let Some(stop) = active.as_ref() {
                    log::debug!("Received Ctrl-C");
                    stop.interrupt();
                }
            }) {
                Ok(()) | Err(ctrlc::Error::MultipleHandlers) => {}
                Err(e) => return Err(io::Error::other(e.to_string())),
            }
            *slot().lock().unwrap_or_else(PoisonError::into_inner) = Some(stop);
            Ok(Self)
        }

        pub(super) fn uninstall(&mut self) {
            *slot().lock().unwrap_or_else(PoisonError::into_inner) = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupt_reaches_listener() {
        let (stop, listener) = stop_channel();
        let remote = stop.clone();

        std::thread::spawn(move || remote.interrupt());

        assert_eq!(listener.wait(), StopEvent::Interrupt);
    }

    #[test]
    fn test_dropped_handles_read_as_finished() {
        let (stop, listener) = stop_channel();
        drop(stop);
        assert_eq!(listener.wait(), StopEvent::Finished);
    }

    #[cfg(unix)]
    #[test]
    fn test_forwarder_installs_and_uninstalls() {
        let (stop, _listener) = stop_channel();
        let forwarder = SignalForwarder::install(stop).unwrap();
        drop(forwarder);
    }

    #[cfg(unix)]
    #[test]
    fn test_sigterm_becomes_interrupt() {
        use nix::sys::signal::{Signal, raise};

        let (stop, listener) = stop_channel();
        let _forwarder = SignalForwarder::install(stop).unwrap();

        raise(Signal::SIGTERM).unwrap();

        assert_eq!(listener.wait(), StopEvent::Interrupt);
    }
}
