//! Driver instance owning every reader module

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use nexum_sim_core::{Error, Notifier, PresenceState, RegisterBank, Result};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::SimConfig;
use crate::dispatch::{self, IrqReturn};
use crate::platform::{NullPlatform, Platform};
use crate::presence::{self, PresenceLine, PresenceSignal};
use crate::reader::Reader;
use crate::session::Session;

/// State shared between the driver handle, its sessions and presence threads
#[derive(Debug)]
pub(crate) struct Shared<B, P> {
    pub(crate) readers: Vec<Reader<B>>,
    pub(crate) lines: Vec<PresenceLine>,
    pub(crate) notifier: Notifier,
    pub(crate) platform: P,
    pub(crate) config: SimConfig,
    pub(crate) session_open: AtomicBool,
    pub(crate) shut_down: AtomicBool,
}

impl<B: RegisterBank, P: Platform> Shared<B, P> {
    pub(crate) fn reader(&self, index: usize) -> Result<&Reader<B>> {
        self.readers.get(index).ok_or(Error::InvalidReader(index))
    }

    pub(crate) fn line(&self, index: usize) -> Result<&PresenceLine> {
        self.lines.get(index).ok_or(Error::InvalidReader(index))
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }
}

/// SIM reader driver
///
/// Owns the register view and transaction state of every module, one
/// presence thread per module and the notification mask they all report
/// through. Interrupt entry points may be called from any thread; control
/// requests go through a [`Session`].
///
/// Dropping the driver shuts it down.
pub struct SimDriver<B: RegisterBank + 'static, P: Platform + 'static = NullPlatform> {
    shared: Arc<Shared<B, P>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<B: RegisterBank + 'static, P: Platform + 'static> fmt::Debug for SimDriver<B, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimDriver")
            .field("modules", &self.shared.readers.len())
            .field("session_open", &self.shared.session_open.load(Ordering::Relaxed))
            .field("shut_down", &self.shared.is_shut_down())
            .finish_non_exhaustive()
    }
}

impl<B: RegisterBank + 'static, P: Platform + 'static> SimDriver<B, P> {
    /// Build a driver over one register bank per configured module
    ///
    /// Spawns the presence thread of every module.
    pub fn new(config: SimConfig, banks: Vec<B>, platform: P) -> Result<Self> {
        config.validate()?;
        if banks.len() != config.modules {
            return Err(Error::config(format!(
                "{} register banks for {} modules",
                banks.len(),
                config.modules
            )));
        }

        let mut receivers = Vec::with_capacity(banks.len());
        let mut lines = Vec::with_capacity(banks.len());
        let readers: Vec<_> = banks
            .into_iter()
            .enumerate()
            .map(|(index, bank)| {
                let (line, rx) = PresenceLine::new();
                lines.push(line);
                receivers.push(rx);
                Reader::new(index, bank, config.limits, config.parity_policy)
            })
            .collect();

        let debounce = config.debounce;
        let shared = Arc::new(Shared {
            readers,
            lines,
            notifier: Notifier::new(),
            platform,
            config,
            session_open: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
        });
        let driver = Self {
            shared: Arc::clone(&shared),
            tasks: Mutex::new(Vec::new()),
        };

        for (index, signals) in receivers.into_iter().enumerate() {
            let reader = shared.reader(index)?;
            let initial = PresenceState::from_pin(reader.regs().presence_pin());
            let shared = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .name(format!("sim{index}-presence"))
                .spawn(move || {
                    if let (Ok(reader), Ok(line)) = (shared.reader(index), shared.line(index)) {
                        presence::run(
                            reader,
                            line,
                            &shared.notifier,
                            &signals,
                            initial,
                            debounce.samples,
                            debounce.poll_interval(),
                        );
                    }
                })
                .map_err(|e| Error::platform(format!("failed to spawn presence task: {e}")))?;
            driver.tasks.lock().push(handle);
        }

        info!(modules = shared.readers.len(), "SIM driver started");
        Ok(driver)
    }

    /// Configuration the driver was built with
    pub fn config(&self) -> &SimConfig {
        &self.shared.config
    }

    /// Number of reader modules
    pub fn modules(&self) -> usize {
        self.shared.readers.len()
    }

    /// Platform collaborator
    pub fn platform(&self) -> &P {
        &self.shared.platform
    }

    /// Whether [`Self::shutdown`] ran
    pub fn is_shut_down(&self) -> bool {
        self.shared.is_shut_down()
    }

    /// Open the control session
    ///
    /// Only one session may be open at a time; a second attempt fails with
    /// [`Error::SessionBusy`] and changes nothing. Opening claims every module
    /// from the platform and routes its pins.
    pub fn open(&self) -> Result<Session<'_, B, P>> {
        if self.shared.is_shut_down() {
            return Err(Error::Shutdown);
        }
        if self
            .shared
            .session_open
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("session open rejected, already open");
            return Err(Error::SessionBusy);
        }

        let platform = &self.shared.platform;
        for index in 0..self.modules() {
            let claimed = platform.claim(index).and_then(|()| {
                platform
                    .configure_pins(index)
                    .inspect_err(|_| platform.release(index))
            });
            if let Err(e) = claimed {
                (0..index).for_each(|i| platform.release(i));
                self.shared.session_open.store(false, Ordering::Release);
                warn!(reader = index, error = %e, "session open failed");
                return Err(e);
            }
        }

        info!("session opened");
        Ok(Session::new(&self.shared))
    }

    /// Data interrupt entry point of module `index`
    pub fn handle_data_irq(&self, index: usize) -> Result<IrqReturn> {
        let reader = self.shared.reader(index)?;
        if !reader.attached() {
            return Ok(IrqReturn::NotAttached);
        }
        self.shared.platform.io_activity(index);
        Ok(dispatch::data(reader, &self.shared.notifier))
    }

    /// General interrupt entry point of module `index`
    pub fn handle_general_irq(&self, index: usize) -> Result<IrqReturn> {
        let reader = self.shared.reader(index)?;
        if !reader.attached() {
            return Ok(IrqReturn::NotAttached);
        }
        self.shared.platform.io_activity(index);
        Ok(dispatch::general(
            reader,
            self.shared.line(index)?,
            &self.shared.notifier,
        ))
    }

    /// Detach interrupts, stop the presence threads and wait for them
    ///
    /// Idempotent. Blocking waits already in progress are not interrupted.
    pub fn shutdown(&self) {
        if self.shared.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        for reader in &self.shared.readers {
            reader.set_attached(false);
        }
        for line in &self.shared.lines {
            line.send(PresenceSignal::Shutdown);
        }
        for handle in self.tasks.lock().drain(..) {
            if handle.join().is_err() {
                warn!("presence task panicked");
            }
        }
        info!("SIM driver shut down");
    }
}

#[cfg(feature = "emulator")]
impl SimDriver<Arc<nexum_sim_core::EmulatedSim>, NullPlatform> {
    /// Build a driver over freshly created emulated register blocks
    ///
    /// Returns the blocks too, so the caller can play the card side.
    pub fn emulated(config: SimConfig) -> Result<(Self, Vec<Arc<nexum_sim_core::EmulatedSim>>)> {
        let sims: Vec<_> = (0..config.modules)
            .map(|_| Arc::new(nexum_sim_core::EmulatedSim::new(config.limits)))
            .collect();
        let driver = Self::new(config, sims.clone(), NullPlatform::new())?;
        Ok((driver, sims))
    }
}

impl<B: RegisterBank + 'static, P: Platform + 'static> Drop for SimDriver<B, P> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
