//! Graphic, region and template definition.
//!
//! Every definition first deletes the object from the printer, then adds the
//! new one, and waits for a status without the busy flag after each step.
//! User templates are then moved to flash.

use crate::catalog::{is_user_defined_template, region_to_drv, template_to_drv};
use crate::message::{DefineRegion, DefineTemplate, LibManage};
use crate::observer::{GraphicError, RegionError, TemplateError};
use crate::response::StatusResponse;
use crate::types::{Error, Graphic, Region, Template};

use super::{Machine, StateId};

impl Machine {
    pub(super) fn start_define_graphic(&mut self, graphic: &Graphic) -> Result<(), Error> {
        self.ctx.last_graphic = graphic.clone();
        match self.ctx.send_and_update_last_cmd(&LibManage::delete(graphic)) {
            Ok(()) => self.transit(StateId::DeleteGraphic),
            Err(e) if e.is_comm() => self.disconnect(&e),
            Err(e) => {
                self.ctx.notify(|o| o.on_define_graphic_failed(GraphicError::Id));
                Err(e)
            }
        }
    }

    pub(super) fn start_define_region(&mut self, region: &Region) -> Result<(), Error> {
        self.ctx.last_region = region.clone();
        match self.ctx.send_and_update_last_cmd(&DefineRegion::delete(region)) {
            Ok(()) => self.transit(StateId::DeleteRegion),
            Err(e) if e.is_comm() => self.disconnect(&e),
            Err(e) => {
                self.ctx.notify(|o| o.on_define_region_failed(RegionError::Id));
                Err(e)
            }
        }
    }

    pub(super) fn start_define_template(&mut self, template: &Template) -> Result<(), Error> {
        self.ctx.last_template = template.clone();
        match self
            .ctx
            .send_and_update_last_cmd(&DefineTemplate::delete(template))
        {
            Ok(()) => self.transit(StateId::DeleteTemplate),
            Err(e) if e.is_comm() => self.disconnect(&e),
            Err(e) => {
                self.ctx
                    .notify(|o| o.on_define_template_failed(TemplateError::Id));
                Err(e)
            }
        }
    }

    /// Shared start of every delete/add status handler. Returns true if the
    /// status was consumed.
    fn definition_status(&mut self, resp: &StatusResponse) -> Result<bool, Error> {
        if self.shared_status(resp)? {
            return Ok(true);
        }
        self.ctx.update_status_and_notify(&resp.status);
        self.retry_on_cmd_err(&resp.status)
    }

    pub(super) fn delete_graphic_status(&mut self, resp: &StatusResponse) -> Result<(), Error> {
        if self.definition_status(resp)? || !self.polled() || resp.status.busy {
            return Ok(());
        }
        let graphic = self.ctx.last_graphic.clone();
        match self.ctx.send_and_update_last_cmd(&LibManage::define(&graphic)) {
            Ok(()) => self.transit(StateId::AddGraphic),
            Err(e) if e.is_recoverable() => {
                log::debug!("graphic rejected: {}", e);
                self.ctx.notify(|o| o.on_define_graphic_failed(GraphicError::Id));
                self.transit(Self::resting_state(&resp.status))
            }
            Err(e) => Err(e),
        }
    }

    pub(super) fn add_graphic_status(&mut self, resp: &StatusResponse) -> Result<(), Error> {
        if self.definition_status(resp)? || !self.polled() {
            return Ok(());
        }
        let status = &resp.status;
        let failure = if status.lib_ref_err {
            Some(GraphicError::Id)
        } else if status.load_lib_err {
            Some(GraphicError::Corrupt)
        } else if status.buffer_overflow {
            Some(GraphicError::Memory)
        } else {
            None
        };
        if let Some(error) = failure {
            self.ctx.notify(|o| o.on_define_graphic_failed(error));
            return self.transit(StateId::Idle);
        }
        if !status.busy {
            self.ctx.notify(|o| o.on_define_graphic_success());
            self.transit(Self::resting_state(status))?;
        }
        Ok(())
    }

    pub(super) fn delete_region_status(&mut self, resp: &StatusResponse) -> Result<(), Error> {
        if self.definition_status(resp)? || !self.polled() || resp.status.busy {
            return Ok(());
        }
        let region = self.ctx.last_region.clone();
        let result = region_to_drv(region.id).and_then(|region_byte| {
            self.ctx.region_defaults.remove(&region_byte);
            self.ctx
                .send_and_update_last_cmd(&DefineRegion::define(&region))
        });
        match result {
            Ok(()) => self.transit(StateId::AddRegion),
            Err(e) if e.is_recoverable() => {
                log::debug!("region rejected: {}", e);
                let error = match e {
                    Error::InvalidRegion { .. } => RegionError::DatatypeMismatch,
                    _ => RegionError::Id,
                };
                self.ctx.notify(|o| o.on_define_region_failed(error));
                self.transit(Self::resting_state(&resp.status))
            }
            Err(e) => Err(e),
        }
    }

    pub(super) fn add_region_status(&mut self, resp: &StatusResponse) -> Result<(), Error> {
        if self.definition_status(resp)? || !self.polled() {
            return Ok(());
        }
        let status = &resp.status;
        let failure = if status.lib_ref_err {
            Some(RegionError::UndefinedGraphic)
        } else if status.region_data_err {
            Some(RegionError::DatatypeMismatch)
        } else if status.buffer_overflow {
            Some(RegionError::Overflow)
        } else {
            None
        };
        if let Some(error) = failure {
            self.ctx.notify(|o| o.on_define_region_failed(error));
            return self.transit(StateId::Idle);
        }
        if !status.busy {
            let region = &self.ctx.last_region;
            if !region.default_data.is_empty() {
                let region_byte = region_to_drv(region.id)?;
                let data = region.default_data.clone();
                self.ctx.region_defaults.insert(region_byte, data);
            }
            self.ctx.notify(|o| o.on_define_region_success());
            self.transit(Self::resting_state(status))?;
        }
        Ok(())
    }

    pub(super) fn delete_template_status(&mut self, resp: &StatusResponse) -> Result<(), Error> {
        if self.definition_status(resp)? || !self.polled() || resp.status.busy {
            return Ok(());
        }
        let template = self.ctx.last_template.clone();
        let result = template_to_drv(template.id).and_then(|template_byte| {
            self.ctx.templates.remove(&template_byte);
            self.ctx
                .send_and_update_last_cmd(&DefineTemplate::define(&template))
        });
        match result {
            Ok(()) => self.transit(StateId::AddTemplate),
            Err(e) if e.is_recoverable() => {
                log::debug!("template rejected: {}", e);
                self.ctx
                    .notify(|o| o.on_define_template_failed(TemplateError::Id));
                self.transit(Self::resting_state(&resp.status))
            }
            Err(e) => Err(e),
        }
    }

    pub(super) fn add_template_status(&mut self, resp: &StatusResponse) -> Result<(), Error> {
        if self.definition_status(resp)? || !self.polled() {
            return Ok(());
        }
        let status = &resp.status;
        let failure = if status.lib_ref_err || status.region_data_err {
            Some(TemplateError::UndefinedRegion)
        } else if status.buffer_overflow {
            Some(TemplateError::Memory)
        } else {
            None
        };
        if let Some(error) = failure {
            self.ctx.notify(|o| o.on_define_template_failed(error));
            return self.transit(StateId::Idle);
        }
        if status.busy {
            return Ok(());
        }

        let id = self.ctx.last_template.id;
        if is_user_defined_template(id)? {
            return self.transit(StateId::FlashTransfer);
        }
        // Built-in templates are overwritten in place.
        self.commit_template()?;
        self.transit(Self::resting_state(status))
    }

    fn commit_template(&mut self) -> Result<(), Error> {
        let template = self.ctx.last_template.clone();
        self.ctx
            .templates
            .insert(template_to_drv(template.id)?, template);
        self.ctx.notify(|o| o.on_define_template_success());
        Ok(())
    }

    /// Any status after the flash transfer completes the definition.
    pub(super) fn complete_flash_transfer_status(
        &mut self,
        resp: &StatusResponse,
    ) -> Result<(), Error> {
        self.ctx.status = resp.status.clone();
        self.commit_template()?;
        self.transit(Self::resting_state(&resp.status))?;
        self.shared_status(resp)?;
        Ok(())
    }
}
