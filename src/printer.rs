//! The public driver handle.
//!
//! A [`Printer`] owns the state machine behind a mutex. In
//! [`RunMode::Background`] a worker thread drives it every
//! [`RUN_INTERVAL`]; in [`RunMode::Manual`] the application calls
//! [`Printer::run`] itself.
//!
//! ## Example
//! ```no_run
//! use psa66_driver::{Job, NullObserver, Printer, SerialTransport};
//!
//! let printer = Printer::new(Box::new(SerialTransport::new()));
//! printer.init("port=/dev/ttyUSB0", Box::new(NullObserver)).unwrap();
//! printer.resume().unwrap();
//! printer.print(&Job::new(0, vec!["JACKPOT".into()])).unwrap();
//! ```

use snafu::ResultExt;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::observer::Observer;
use crate::port::Transport;
use crate::state::{Machine, StateId};
use crate::types::{Error, Graphic, IoSnafu, Job, Region, Template};

/// Pause between two ticks of the worker.
pub const RUN_INTERVAL: Duration = Duration::from_millis(10);

/// Who drives the state machine.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RunMode {
    /// A worker thread started by `init` and stopped by `uninit`.
    Background,
    /// The application calls [`Printer::run`].
    Manual,
}

fn stopped(stop: &Mutex<bool>) -> bool {
    *stop.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Start the worker loop.
///
/// The worker only holds a weak reference, so dropping the [`Printer`] ends
/// it. A tick is skipped while an application call holds the machine.
pub(crate) fn spawn_worker(
    machine: Weak<Mutex<Machine>>,
    stop: Arc<Mutex<bool>>,
) -> Result<JoinHandle<()>, Error> {
    thread::Builder::new()
        .name("psa66-run".into())
        .spawn(move || {
            let mut last = Instant::now();
            while !stopped(&stop) {
                let machine = match machine.upgrade() {
                    Some(machine) => machine,
                    None => break,
                };
                let now = Instant::now();
                let elapsed = now.duration_since(last);
                last = now;

                match machine.try_lock() {
                    Ok(mut machine) => {
                        if let Err(e) = machine.run(elapsed) {
                            if e.is_recoverable() {
                                log::warn!("{}", e);
                            } else {
                                machine.report_failure(&e);
                                break;
                            }
                        }
                    }
                    Err(TryLockError::WouldBlock) => {}
                    Err(TryLockError::Poisoned(_)) => {
                        log::error!("state machine poisoned, run loop stopped");
                        break;
                    }
                }
                drop(machine);
                thread::sleep(RUN_INTERVAL);
            }
            log::debug!("run loop finished");
        })
        .context(IoSnafu { port: "run loop" })
}

/// Driver for one printer.
///
/// All operations are asynchronous: they start a command and return, and the
/// outcome is reported to the [`Observer`] given to [`Printer::init`].
/// Operations that don't apply to the current state are logged and ignored.
///
/// Observer callbacks run with the machine locked and must not call back into
/// the `Printer`.
pub struct Printer {
    machine: Arc<Mutex<Machine>>,
}

impl std::fmt::Debug for Printer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Printer")
            .field("state", &self.state())
            .finish()
    }
}

impl Printer {
    /// A printer run by a background worker.
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self::with_run_mode(transport, RunMode::Background)
    }

    pub fn with_run_mode(transport: Box<dyn Transport>, run_mode: RunMode) -> Self {
        let machine =
            Arc::new_cyclic(|this| Mutex::new(Machine::new(transport, run_mode, this.clone())));
        Self { machine }
    }

    fn lock(&self) -> MutexGuard<'_, Machine> {
        self.machine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open the port described by `params` and start talking to the printer.
    ///
    /// `params` is a `;` separated list of `key=value` pairs, see
    /// [`Config`](crate::Config).
    /// # Errors
    /// Returns [`Error::Config`] for a bad configuration string, or the
    /// port's error if it can't be opened.
    pub fn init(&self, params: &str, observer: Box<dyn Observer>) -> Result<(), Error> {
        self.lock().init(params, observer)
    }

    /// Stop the worker and close the port.
    pub fn uninit(&self) -> Result<(), Error> {
        self.lock().uninit()
    }

    /// Keep the printer from taking new jobs. A job in progress completes
    /// first.
    pub fn suspend(&self) -> Result<(), Error> {
        self.lock().suspend()
    }

    pub fn resume(&self) -> Result<(), Error> {
        self.lock().resume()
    }

    /// Print a test ticket. Only while suspended.
    pub fn self_test(&self) -> Result<(), Error> {
        self.lock().self_test()
    }

    /// Request the firmware identification, reported through
    /// [`Observer::on_gat_report_ready`]. Only while suspended.
    pub fn rq_gat_report(&self) -> Result<(), Error> {
        self.lock().rq_gat_report()
    }

    /// Request a CRC over the firmware, reported through
    /// [`Observer::on_crc_ready`]. Only while suspended.
    pub fn calculate_crc(&self, seed: u32) -> Result<(), Error> {
        self.lock().calculate_crc(seed)
    }

    /// # Errors
    /// Returns [`Error::InvalidId`] if the graphic id is out of range.
    pub fn define_graphic(&self, graphic: &Graphic) -> Result<(), Error> {
        self.lock().define_graphic(graphic)
    }

    /// # Errors
    /// Returns [`Error::InvalidId`] or [`Error::InvalidRegion`] if the region
    /// can't be sent.
    pub fn define_region(&self, region: &Region) -> Result<(), Error> {
        self.lock().define_region(region)
    }

    /// # Errors
    /// Returns [`Error::InvalidId`] if a template or region id is out of
    /// range.
    pub fn define_template(&self, template: &Template) -> Result<(), Error> {
        self.lock().define_template(template)
    }

    /// Print `job`. Empty fields are filled from the region defaults.
    /// # Errors
    /// Returns [`Error::InvalidId`] if the template id is out of range.
    pub fn print(&self, job: &Job) -> Result<(), Error> {
        self.lock().print(job)
    }

    pub fn form_feed(&self) -> Result<(), Error> {
        self.lock().form_feed()
    }

    /// Currency the firmware was built for.
    pub fn firmware_currency(&self) -> String {
        self.lock().firmware_currency()
    }

    pub fn state(&self) -> StateId {
        self.lock().current()
    }

    /// Advance the machine by `elapsed`. Only needed in
    /// [`RunMode::Manual`]. Does nothing if another call holds the machine.
    /// # Errors
    /// Returns errors the states couldn't handle.
    pub fn run(&self, elapsed: Duration) -> Result<(), Error> {
        match self.machine.try_lock() {
            Ok(mut machine) => machine.run(elapsed),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().run(elapsed),
            Err(TryLockError::WouldBlock) => Ok(()),
        }
    }
}

impl Drop for Printer {
    fn drop(&mut self) {
        if let Err(e) = self.lock().uninit() {
            log::error!("uninit on drop: {}", e);
        }
    }
}
