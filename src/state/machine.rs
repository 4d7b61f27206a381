use std::sync::{Mutex, Weak};
use std::thread;
use std::time::Duration;

use crate::catalog::template_page;
use crate::config::Config;
use crate::context::PrinterContext;
use crate::message::{ClearError, FlashTransfer, ObtainCrc, Print, StatusRequest};
use crate::observer::Observer;
use crate::port::Transport;
use crate::printer::{spawn_worker, RunMode};
use crate::response::{CrcResponse, MessageType, StatusResponse};
use crate::status::Status;
use crate::types::{Error, Graphic, Job, Region, StateNotFoundSnafu, Template};

use super::{Poller, StateData, StateId, StateTree, MAX_RESEND_CNT};

/// Largest frame handed to the states.
const FRAME_BUFFER: usize = 512;

#[derive(Debug)]
pub(crate) struct Machine {
    pub(crate) ctx: PrinterContext,
    pub(crate) tree: StateTree,
    current: StateId,
    run_mode: RunMode,
    this: Weak<Mutex<Machine>>,
}

impl Machine {
    /// A machine in `UnInit`. `this` is handed to the run loop on `init`.
    pub fn new(
        transport: Box<dyn Transport>,
        run_mode: RunMode,
        this: Weak<Mutex<Machine>>,
    ) -> Self {
        let mut machine = Self {
            ctx: PrinterContext::new(transport),
            tree: StateTree::new(),
            current: StateId::Top,
            run_mode,
            this,
        };
        if let Err(e) = machine.transit(StateId::UnInit) {
            log::error!("{}", e);
        }
        machine
    }

    pub fn current(&self) -> StateId {
        self.current
    }

    /// Walk the tree from the current state to `target`.
    ///
    /// `on_enter` may transit again; the walk stops once the target has been
    /// entered either way.
    /// # Errors
    /// Returns [`Error::StateNotFound`] if `target` isn't reachable, or the
    /// first error raised by an enter hook.
    pub fn transit(&mut self, target: StateId) -> Result<(), Error> {
        loop {
            match self.tree.child_towards(self.current, target) {
                Some(next) => {
                    self.current = next;
                    let reached = next == target;
                    self.on_enter(next, reached)?;
                    if reached {
                        return Ok(());
                    }
                }
                None => {
                    self.on_leave(self.current);
                    match self.tree.node(self.current).parent {
                        Some(parent) => self.current = parent,
                        None => return StateNotFoundSnafu { target }.fail(),
                    }
                }
            }
            if self.current == target {
                return Ok(());
            }
        }
    }

    fn on_enter(&mut self, id: StateId, is_target: bool) -> Result<(), Error> {
        if is_target {
            self.ctx.trace(format_args!("enter {:?}", id));
        }
        {
            let node = self.tree.node_mut(id);
            node.resend_count = 0;
            if let Some(poller) = node.data.poller_mut() {
                poller.reset();
            }
        }

        match id {
            StateId::UnInit => self.enter_uninit(),
            StateId::Init => {
                // Silence here is caught by the alive timer.
                if let Err(e) = self.ctx.send(&StatusRequest) {
                    if !e.is_comm() {
                        return Err(e);
                    }
                    log::debug!("status request failed: {}", e);
                }
            }
            StateId::Disconnected => {
                if let StateData::Disconnected { poll } = &mut self.tree.node_mut(id).data {
                    poll.reset();
                }
                self.ctx.notify(|o| o.on_disconnected());
            }
            StateId::Ready if is_target => {
                if self.ctx.status.should_suspend() || self.ctx.init_suspend {
                    self.transit(StateId::Suspended)?;
                } else {
                    self.ctx.init_suspend = true;
                    self.transit(StateId::Idle)?;
                }
            }
            StateId::Printing => {
                if let StateData::Printing {
                    suspend_pending, ..
                } = &mut self.tree.node_mut(id).data
                {
                    *suspend_pending = false;
                }
                if is_target {
                    self.ctx.notify(|o| o.on_printing());
                }
            }
            StateId::FlashTransfer if is_target => {
                let page = template_page(self.ctx.last_template.id)?;
                self.ctx.send_and_update_last_cmd(&FlashTransfer { page })?;
                if let StateData::FlashTransfer { settle } = &mut self.tree.node_mut(id).data {
                    settle.reset();
                }
            }
            StateId::CompleteFlashTransfer if is_target => {
                if let StateData::CompleteFlashTransfer { poll, disconnect } =
                    &mut self.tree.node_mut(id).data
                {
                    poll.reset();
                    disconnect.reset();
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn on_leave(&mut self, id: StateId) {
        log::trace!("leave {:?}", id);
    }

    fn enter_uninit(&mut self) {
        self.ctx.set_stop(true);
        if let Some(worker) = self.ctx.worker.take() {
            if worker.thread().id() == thread::current().id() {
                log::error!("uninit called from the run loop");
            } else if worker.join().is_err() {
                log::error!("run loop panicked");
            }
        }
        self.ctx.port.close();
    }

    /// Log and report a run loop failure.
    pub fn report_failure(&self, error: &Error) {
        log::error!("run loop stopped: {}", error);
        self.ctx.notify(|o| o.on_general_err(true));
        if self.ctx.error_dump {
            log::error!("{:#?}", self);
        }
    }

    pub(super) fn poller(&self) -> Option<&Poller> {
        self.tree.node(self.current).data.poller()
    }

    pub(super) fn poller_mut(&mut self) -> Option<&mut Poller> {
        self.tree.node_mut(self.current).data.poller_mut()
    }

    pub(super) fn polled(&self) -> bool {
        self.poller().map_or(false, |p| p.polled)
    }

    pub(super) fn state_data_mut(&mut self) -> &mut StateData {
        &mut self.tree.node_mut(self.current).data
    }

    /// `Suspended` if the printer reports a blocking condition, `Idle`
    /// otherwise.
    pub(super) fn resting_state(status: &Status) -> StateId {
        if status.should_suspend() {
            StateId::Suspended
        } else {
            StateId::Idle
        }
    }

    pub(super) fn disconnect(&mut self, error: &Error) -> Result<(), Error> {
        log::warn!("{}, disconnecting", error);
        self.transit(StateId::Disconnected)
    }

    /// Communication errors take the machine to `Disconnected`, anything else
    /// is returned.
    pub(super) fn disconnect_on_comm_err(&mut self, result: Result<(), Error>) -> Result<(), Error> {
        match result {
            Err(e) if e.is_comm() => self.disconnect(&e),
            other => other,
        }
    }

    /// Resend the last command if the printer didn't understand it.
    ///
    /// Returns true if the status was consumed here. Gives up and disconnects
    /// after [`MAX_RESEND_CNT`] resends.
    pub(super) fn retry_on_cmd_err(&mut self, status: &Status) -> Result<bool, Error> {
        if !(self.polled() && status.cmd_err) {
            self.tree.node_mut(self.current).resend_count = 0;
            return Ok(false);
        }

        let count = self.tree.node(self.current).resend_count;
        if count < MAX_RESEND_CNT {
            self.tree.node_mut(self.current).resend_count = count + 1;
            log::debug!("command error, resend {} of {}", count + 1, MAX_RESEND_CNT);
            self.ctx.resend_last_cmd()?;
            if let Some(poller) = self.poller_mut() {
                poller.polled = false;
            }
        } else {
            log::warn!("command still rejected after {} resends", MAX_RESEND_CNT);
            self.transit(StateId::Disconnected)?;
        }
        Ok(true)
    }

    pub fn run(&mut self, elapsed: Duration) -> Result<(), Error> {
        match self.current {
            StateId::Disconnected => self.run_disconnected(elapsed),
            StateId::FlashTransfer => self.run_flash_transfer(elapsed),
            StateId::CompleteFlashTransfer => self.run_complete_flash_transfer(elapsed),
            _ if self.poller().is_some() => self.run_polling(elapsed),
            _ => Ok(()),
        }
    }

    fn receive(&mut self) -> Result<Option<Vec<u8>>, Error> {
        self.ctx.port.poll()?;
        let mut buf = [0u8; FRAME_BUFFER];
        let len = self.ctx.port.get_message(&mut buf);
        if len > 0 && len < FRAME_BUFFER {
            log::trace!("received {}", String::from_utf8_lossy(&buf[..len]));
            Ok(Some(buf[..len].to_vec()))
        } else {
            Ok(None)
        }
    }

    fn run_polling(&mut self, elapsed: Duration) -> Result<(), Error> {
        if let Some(poller) = self.poller_mut() {
            poller.advance(elapsed);
        }
        let result = self.poll_status();
        self.disconnect_on_comm_err(result)
    }

    fn poll_status(&mut self) -> Result<(), Error> {
        if let Some(frame) = self.receive()? {
            if let Some(poller) = self.poller_mut() {
                poller.alive.reset();
                poller.poll.reset();
            }
            self.handle_response(&frame)?;
            return Ok(());
        }

        let (alive_expired, poll_expired) = self
            .poller()
            .map_or((false, false), |p| (p.alive.is_expired(), p.poll.is_expired()));
        if alive_expired {
            log::warn!("printer stopped answering in {:?}", self.current);
            self.transit(StateId::Disconnected)?;
        } else if poll_expired {
            if let Some(poller) = self.poller_mut() {
                poller.poll.reset();
            }
            self.ctx.send(&StatusRequest)?;
            if let Some(poller) = self.poller_mut() {
                poller.polled = true;
            }
        }
        Ok(())
    }

    fn run_disconnected(&mut self, elapsed: Duration) -> Result<(), Error> {
        if let StateData::Disconnected { poll } = self.state_data_mut() {
            poll.advance(elapsed);
        }
        match self.try_reconnect() {
            Err(e) if e.is_comm() => Ok(()),
            other => other,
        }
    }

    fn try_reconnect(&mut self) -> Result<(), Error> {
        if let Some(frame) = self.receive()? {
            self.handle_response(&frame)?;
            if !self.ctx.status.cmd_err {
                log::info!("printer connected");
                self.ctx.notify(|o| o.on_connected());
                self.transit(StateId::Init)?;
            }
        } else {
            let expired = match self.state_data_mut() {
                StateData::Disconnected { poll } if poll.is_expired() => {
                    poll.reset();
                    true
                }
                _ => false,
            };
            if expired {
                self.ctx.send(&StatusRequest)?;
            }
        }
        Ok(())
    }

    fn run_flash_transfer(&mut self, elapsed: Duration) -> Result<(), Error> {
        let settled = match self.state_data_mut() {
            StateData::FlashTransfer { settle } => {
                settle.advance(elapsed);
                settle.is_expired()
            }
            _ => false,
        };
        if settled {
            self.transit(StateId::CompleteFlashTransfer)?;
        }
        Ok(())
    }

    fn run_complete_flash_transfer(&mut self, elapsed: Duration) -> Result<(), Error> {
        if let StateData::CompleteFlashTransfer { poll, disconnect } = self.state_data_mut() {
            poll.advance(elapsed);
            disconnect.advance(elapsed);
        }
        match self.await_flash_commit() {
            Err(e) if e.is_comm() => Ok(()),
            other => other,
        }
    }

    fn await_flash_commit(&mut self) -> Result<(), Error> {
        let handled = match self.receive()? {
            Some(frame) => self.handle_response(&frame)?,
            None => false,
        };
        if handled {
            return Ok(());
        }

        let mut request = false;
        let mut give_up = false;
        if let StateData::CompleteFlashTransfer { poll, disconnect } = self.state_data_mut() {
            if poll.is_expired() {
                if disconnect.is_expired() {
                    give_up = true;
                } else {
                    poll.reset();
                    request = true;
                }
            }
        }
        if give_up {
            log::warn!("no status after flash transfer");
            self.transit(StateId::Disconnected)?;
        } else if request {
            self.ctx.send(&StatusRequest)?;
        }
        Ok(())
    }

    /// Dispatch a response frame to the current state. Returns true if the
    /// state consumed it.
    pub(super) fn handle_response(&mut self, frame: &[u8]) -> Result<bool, Error> {
        match MessageType::of(frame) {
            MessageType::Crc => self.handle_crc(frame),
            MessageType::Status => self.handle_status(frame),
            other => {
                log::debug!(
                    "unexpected {:?} response {}",
                    other,
                    String::from_utf8_lossy(frame)
                );
                Ok(false)
            }
        }
    }

    fn handle_crc(&mut self, frame: &[u8]) -> Result<bool, Error> {
        if self.current != StateId::Crc {
            return Ok(false);
        }
        let resp = CrcResponse::parse(frame)?;
        log::debug!("CRC {:#06x}", resp.crc);
        self.ctx.notify(|o| o.on_crc_ready(resp.crc));
        self.transit(StateId::Suspended)?;
        Ok(true)
    }

    fn handle_status(&mut self, frame: &[u8]) -> Result<bool, Error> {
        let resp = StatusResponse::parse(frame)?;
        let result = match self.current {
            StateId::Init => self.init_status(&resp),
            StateId::Disconnected => {
                self.ctx.status = resp.status.clone();
                self.shared_status(&resp).map(drop)
            }
            StateId::Suspended | StateId::Crc => self.suspended_status(&resp),
            StateId::GatReport => self.gat_report_status(&resp),
            StateId::Idle => self.idle_status(&resp),
            StateId::DeleteGraphic => self.delete_graphic_status(&resp),
            StateId::AddGraphic => self.add_graphic_status(&resp),
            StateId::DeleteRegion => self.delete_region_status(&resp),
            StateId::AddRegion => self.add_region_status(&resp),
            StateId::DeleteTemplate => self.delete_template_status(&resp),
            StateId::AddTemplate => self.add_template_status(&resp),
            StateId::CompleteFlashTransfer => self.complete_flash_transfer_status(&resp),
            StateId::Printing => self.printing_status(&resp),
            StateId::FlashTransfer => return self.shared_status(&resp),
            StateId::Top
            | StateId::UnInit
            | StateId::Ready
            | StateId::DefineGraphic
            | StateId::DefineRegion
            | StateId::DefineTemplate => return Ok(false),
        };
        self.disconnect_on_comm_err(result)?;
        Ok(true)
    }

    /// Status handling common to every connected state: adopt the firmware
    /// version and acknowledge latched errors. Returns true if the status
    /// was consumed.
    pub(super) fn shared_status(&mut self, resp: &StatusResponse) -> Result<bool, Error> {
        self.ctx.update_software_version(&resp.software_version);
        if resp.status.need_clear_err() {
            if let Err(e) = self.ctx.send(&ClearError) {
                if !e.is_comm() {
                    return Err(e);
                }
                self.disconnect(&e)?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn init_status(&mut self, resp: &StatusResponse) -> Result<(), Error> {
        self.ctx.status = resp.status.clone();
        if self.shared_status(resp)? {
            return Ok(());
        }
        if resp.status.cmd_err {
            return self.transit(StateId::Disconnected);
        }
        self.ctx.announce_conditions();
        self.ctx.notify(|o| o.on_ready());
        self.transit(StateId::Ready)
    }

    fn suspended_status(&mut self, resp: &StatusResponse) -> Result<(), Error> {
        if !self.shared_status(resp)? {
            self.ctx.update_status_and_notify(&resp.status);
        }
        Ok(())
    }

    fn gat_report_status(&mut self, resp: &StatusResponse) -> Result<(), Error> {
        if self.shared_status(resp)? {
            return Ok(());
        }
        self.ctx.update_status_and_notify(&resp.status);
        self.ctx
            .notify(|o| o.on_gat_report_ready(&resp.software_version));
        self.transit(StateId::Suspended)
    }

    fn idle_status(&mut self, resp: &StatusResponse) -> Result<(), Error> {
        if self.shared_status(resp)? {
            return Ok(());
        }
        self.ctx.update_status_and_notify(&resp.status);
        if resp.status.should_suspend() {
            self.transit(StateId::Suspended)?;
        }
        Ok(())
    }

    fn ignored(&self, operation: &str) -> Result<(), Error> {
        log::debug!("{} ignored in {:?}", operation, self.current);
        Ok(())
    }

    /// Open the port and start running. Only `UnInit` accepts this.
    pub fn init(&mut self, params: &str, observer: Box<dyn Observer>) -> Result<(), Error> {
        if self.current != StateId::UnInit {
            return self.ignored("init");
        }

        let config = Config::parse(params)?;
        self.ctx.apply_config(&config);
        self.ctx.observer = Some(observer);
        log::debug!(
            "buffer_size {} is left to the serial driver",
            config.port.buffer_size
        );
        self.ctx.port.open(&config.port)?;

        self.ctx.set_stop(false);
        if self.run_mode == RunMode::Background {
            match spawn_worker(self.this.clone(), self.ctx.stop.clone()) {
                Ok(worker) => self.ctx.worker = Some(worker),
                Err(e) => {
                    self.ctx.set_stop(true);
                    self.ctx.port.close();
                    return Err(e);
                }
            }
        }
        self.transit(StateId::Init)
    }

    pub fn uninit(&mut self) -> Result<(), Error> {
        if self.current.is_initialized() {
            self.transit(StateId::UnInit)
        } else {
            self.ignored("uninit")
        }
    }

    pub fn suspend(&mut self) -> Result<(), Error> {
        match self.current {
            StateId::UnInit | StateId::Init => self.ctx.init_suspend = true,
            StateId::Idle => {
                self.transit(StateId::Suspended)?;
                self.ctx.notify(|o| o.on_suspended());
            }
            StateId::Suspended => self.ctx.notify(|o| o.on_suspended()),
            StateId::Printing => {
                if let StateData::Printing {
                    suspend_pending, ..
                } = self.state_data_mut()
                {
                    *suspend_pending = true;
                }
                self.ctx.notify(|o| o.on_suspended());
            }
            _ => return self.ignored("suspend"),
        }
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), Error> {
        match self.current {
            StateId::UnInit | StateId::Init => self.ctx.init_suspend = false,
            StateId::Suspended => {
                if self.ctx.status.should_suspend() {
                    self.ctx.notify(|o| o.on_suspended());
                } else {
                    self.ctx.notify(|o| o.on_resumed());
                    self.transit(StateId::Idle)?;
                }
            }
            StateId::Printing => {
                let was_pending = match self.state_data_mut() {
                    StateData::Printing {
                        suspend_pending, ..
                    } => std::mem::replace(suspend_pending, false),
                    _ => false,
                };
                if was_pending {
                    self.ctx.notify(|o| o.on_resumed());
                }
            }
            _ => return self.ignored("resume"),
        }
        Ok(())
    }

    /// Print a blank ticket on the built-in test template.
    pub fn self_test(&mut self) -> Result<(), Error> {
        if self.current != StateId::Suspended {
            return self.ignored("self test");
        }
        let job = Job::new(6, vec![String::new(); 7]);
        let result = self.ctx.send_and_update_last_cmd(&Print::new(&job));
        self.disconnect_on_comm_err(result)
    }

    pub fn rq_gat_report(&mut self) -> Result<(), Error> {
        if self.current != StateId::Suspended {
            return self.ignored("GAT report");
        }
        let result = self
            .ctx
            .send_and_update_last_cmd(&StatusRequest)
            .and_then(|_| self.transit(StateId::GatReport));
        self.disconnect_on_comm_err(result)
    }

    /// Only the low 16 bits of `seed` are sent.
    pub fn calculate_crc(&mut self, seed: u32) -> Result<(), Error> {
        if self.current != StateId::Suspended {
            return self.ignored("CRC");
        }
        let cmd = ObtainCrc {
            start_addr: 0,
            seed: (seed & 0xFFFF) as u16,
        };
        let result = self
            .ctx
            .send_and_update_last_cmd(&cmd)
            .and_then(|_| self.transit(StateId::Crc));
        self.disconnect_on_comm_err(result)
    }

    pub fn define_graphic(&mut self, graphic: &Graphic) -> Result<(), Error> {
        match self.current {
            StateId::Idle => self.start_define_graphic(graphic),
            _ => self.ignored("define graphic"),
        }
    }

    pub fn define_region(&mut self, region: &Region) -> Result<(), Error> {
        match self.current {
            StateId::Idle => self.start_define_region(region),
            _ => self.ignored("define region"),
        }
    }

    pub fn define_template(&mut self, template: &Template) -> Result<(), Error> {
        match self.current {
            StateId::Idle => self.start_define_template(template),
            _ => self.ignored("define template"),
        }
    }

    pub fn print(&mut self, job: &Job) -> Result<(), Error> {
        match self.current {
            StateId::Idle => self.start_print(job),
            _ => self.ignored("print"),
        }
    }

    pub fn form_feed(&mut self) -> Result<(), Error> {
        if self.current != StateId::Idle {
            return self.ignored("form feed");
        }
        let result = self
            .ctx
            .send_and_update_last_cmd(&crate::message::FormFeed);
        self.disconnect_on_comm_err(result)
    }

    pub fn firmware_currency(&self) -> String {
        self.ctx.firmware_currency()
    }
}
