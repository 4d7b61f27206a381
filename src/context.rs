//! Data shared by all states of the machine.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use crate::config::Config;
use crate::filter::{firmware_currency, FilterRegistry, JobFilter};
use crate::message::Command;
use crate::observer::Observer;
use crate::port::{PrinterPort, Transport};
use crate::status::Status;
use crate::types::{Error, Graphic, Region, Template};

pub(crate) struct PrinterContext {
    pub port: PrinterPort,
    pub debug: bool,
    pub error_dump: bool,
    pub observer: Option<Box<dyn Observer>>,
    /// Frame of the last command sent with [`Self::send_and_update_last_cmd`].
    pub last_cmd: Vec<u8>,
    pub last_graphic: Graphic,
    pub last_region: Region,
    pub last_template: Template,
    pub software_version: String,
    pub status: Status,
    /// Default field data by device region byte.
    pub region_defaults: HashMap<u8, String>,
    /// Defined templates by device template byte.
    pub templates: HashMap<u8, Template>,
    /// Go to `Suspended` rather than `Idle` once the printer is ready.
    pub init_suspend: bool,
    pub cfg_version: Option<String>,
    pub cfg_currency: Option<String>,
    filters: FilterRegistry,
    job_filter: Option<Arc<dyn JobFilter>>,
    pub stop: Arc<Mutex<bool>>,
    pub worker: Option<JoinHandle<()>>,
}

impl fmt::Debug for PrinterContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrinterContext")
            .field("port", &self.port)
            .field("debug", &self.debug)
            .field("error_dump", &self.error_dump)
            .field("observer", &self.observer.is_some())
            .field("last_cmd", &String::from_utf8_lossy(&self.last_cmd))
            .field("last_graphic", &(self.last_graphic.id, self.last_graphic.size()))
            .field("last_region", &self.last_region)
            .field("last_template", &self.last_template)
            .field("software_version", &self.software_version)
            .field("status", &self.status)
            .field("region_defaults", &self.region_defaults)
            .field("templates", &self.templates)
            .field("init_suspend", &self.init_suspend)
            .field("filters", &self.filters)
            .field("stop", &self.is_stopped())
            .field("worker", &self.worker)
            .finish()
    }
}

impl PrinterContext {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            port: PrinterPort::new(transport),
            debug: false,
            error_dump: true,
            observer: None,
            last_cmd: Vec::new(),
            last_graphic: Graphic::default(),
            last_region: Region::default(),
            last_template: Template::default(),
            software_version: String::new(),
            status: Status::default(),
            region_defaults: HashMap::new(),
            templates: HashMap::new(),
            init_suspend: true,
            cfg_version: None,
            cfg_currency: None,
            filters: FilterRegistry::default(),
            job_filter: None,
            stop: Arc::new(Mutex::new(true)),
            worker: None,
        }
    }

    pub fn apply_config(&mut self, config: &Config) {
        self.debug = config.debug;
        self.error_dump = config.error_dump;
        self.cfg_version = config.version.clone();
        self.cfg_currency = config.currency.clone();
    }

    /// Debug level when the `debug` option is on, trace level otherwise.
    pub fn trace(&self, args: fmt::Arguments<'_>) {
        if self.debug {
            log::debug!("{}", args);
        } else {
            log::trace!("{}", args);
        }
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_stop(&self, stop: bool) {
        *self.stop.lock().unwrap_or_else(PoisonError::into_inner) = stop;
    }

    /// Send a command that won't be resent, like status polls.
    pub fn send(&mut self, cmd: &dyn Command) -> Result<(), Error> {
        let frame = cmd.to_bytes()?;
        self.trace(format_args!("send {}", String::from_utf8_lossy(&frame)));
        self.port.write(&frame)?;
        Ok(())
    }

    /// Send a command and keep its frame for resending.
    /// # Errors
    /// Encoding errors leave the last command unchanged.
    pub fn send_and_update_last_cmd(&mut self, cmd: &dyn Command) -> Result<(), Error> {
        self.last_cmd = cmd.to_bytes()?;
        self.trace(format_args!(
            "send {}",
            String::from_utf8_lossy(&self.last_cmd)
        ));
        self.port.write(&self.last_cmd)?;
        Ok(())
    }

    pub fn resend_last_cmd(&mut self) -> Result<(), Error> {
        self.trace(format_args!(
            "resend {}",
            String::from_utf8_lossy(&self.last_cmd)
        ));
        self.port.write(&self.last_cmd)?;
        Ok(())
    }

    pub fn notify(&self, event: impl FnOnce(&dyn Observer)) {
        if let Some(observer) = self.observer.as_deref() {
            event(observer);
        }
    }

    /// Store `status`, telling the observer about every condition that
    /// changed since the previous one.
    pub fn update_status_and_notify(&mut self, status: &Status) {
        let old = &self.status;
        if let Some(o) = self.observer.as_deref() {
            if status.ext_power_lost() && !old.ext_power_lost() {
                o.on_ext_power_lost();
            } else if !status.ext_power_lost() && old.ext_power_lost() {
                o.on_ext_power_resumed();
            }

            macro_rules! edge {
                ($cond:ident, $event:ident) => {
                    if status.$cond() != old.$cond() {
                        o.$event(status.$cond());
                    }
                };
            }
            edge!(firmware_err, on_firmware_err);
            edge!(nvm_err, on_nvm_err);
            edge!(print_head_err, on_print_head_err);
            edge!(temperature_err, on_temperature_err);
            edge!(general_err, on_general_err);
            edge!(print_head_opened, on_print_head_open);
            edge!(paper_jam, on_paper_jam);
            edge!(paper_empty, on_paper_empty);
            edge!(top_of_form, on_top_of_form);
            edge!(chassis_opened, on_chassis_open);
            edge!(paper_low, on_paper_low);
        }
        self.status = status.clone();
    }

    /// Report every condition that currently holds.
    pub fn announce_conditions(&self) {
        let status = &self.status;
        self.notify(|o| {
            if status.ext_power_lost() {
                o.on_ext_power_lost();
            }

            macro_rules! level {
                ($cond:ident, $event:ident) => {
                    if status.$cond() {
                        o.$event(true);
                    }
                };
            }
            level!(firmware_err, on_firmware_err);
            level!(nvm_err, on_nvm_err);
            level!(print_head_err, on_print_head_err);
            level!(temperature_err, on_temperature_err);
            level!(general_err, on_general_err);
            level!(print_head_opened, on_print_head_open);
            level!(paper_jam, on_paper_jam);
            level!(paper_empty, on_paper_empty);
            if !status.top_of_form() {
                o.on_top_of_form(true);
            }
            level!(chassis_opened, on_chassis_open);
            level!(paper_low, on_paper_low);
        });
    }

    /// Adopt the firmware version reported by the printer and pick the
    /// matching job filter.
    pub fn update_software_version(&mut self, version: &str) {
        if self.software_version != version || self.job_filter.is_none() {
            log::debug!("printer firmware {}", version);
            self.software_version = version.to_string();
            self.job_filter = Some(self.filters.lookup(version));
        }
    }

    pub fn job_filter(&self) -> Option<Arc<dyn JobFilter>> {
        self.job_filter.clone()
    }

    pub fn firmware_currency(&self) -> String {
        firmware_currency(
            &self.software_version,
            self.cfg_version.as_deref(),
            self.cfg_currency.as_deref(),
        )
    }
}
