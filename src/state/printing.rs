use crate::catalog::{region_to_drv, template_to_drv};
use crate::message::Print;
use crate::observer::PrintError;
use crate::response::StatusResponse;
use crate::status::Status;
use crate::types::{Error, Job};

use super::{Machine, StateData, StateId};

impl Machine {
    /// Fill empty fields from the region defaults and apply the firmware's
    /// job filter.
    fn prepare_job(&self, job: &Job) -> Result<Job, Error> {
        let mut job = job.clone();
        if let Some(template) = self.ctx.templates.get(&template_to_drv(job.template_id)?) {
            for (field, &region) in job.fields.iter_mut().zip(&template.regions) {
                if !field.is_empty() {
                    continue;
                }
                if let Some(data) = self.ctx.region_defaults.get(&region_to_drv(region)?) {
                    *field = data.clone();
                }
            }
        }

        if let Some(filter) = self.ctx.job_filter() {
            if filter.need_transform(&job) {
                job = filter.transform(&job);
            }
        }
        Ok(job)
    }

    pub(super) fn start_print(&mut self, job: &Job) -> Result<(), Error> {
        let job = self.prepare_job(job)?;
        let result = self
            .ctx
            .send_and_update_last_cmd(&Print::new(&job))
            .and_then(|_| self.transit(StateId::Printing));
        self.disconnect_on_comm_err(result)
    }

    fn suspend_pending(&self) -> bool {
        match self.tree.node(StateId::Printing).data {
            StateData::Printing {
                suspend_pending, ..
            } => suspend_pending,
            _ => false,
        }
    }

    pub(super) fn printing_status(&mut self, resp: &StatusResponse) -> Result<(), Error> {
        if self.shared_status(resp)? {
            return Ok(());
        }
        let status = &resp.status;

        if fails_job(status) {
            self.ctx.notify(|o| {
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
                if !status.top_of_form() {
                    o.on_top_of_form(true);
                }
            });
            log::debug!("print aborted");
            self.ctx.status = status.clone();
            return self.transit(StateId::Suspended);
        }

        // Conditions the job survives.
        let old = self.ctx.status.clone();
        self.ctx.notify(|o| {
            macro_rules! edge {
                ($cond:ident, $event:ident) => {
                    if status.$cond() != old.$cond() {
                        o.$event(status.$cond());
                    }
                };
            }
            edge!(chassis_opened, on_chassis_open);
            edge!(paper_low, on_paper_low);
            edge!(paper_empty, on_paper_empty);
        });

        if self.polled() && status.cmd_err {
            self.ctx.status = status.clone();
        }
        if self.retry_on_cmd_err(status)? {
            return Ok(());
        }

        let pending = self.suspend_pending();
        if status.region_data_err {
            self.ctx
                .notify(|o| o.on_print_failed(PrintError::DatatypeMismatch));
            self.ctx.update_software_version(&resp.software_version);
            self.ctx.status = status.clone();
            let target = if pending || status.should_suspend() {
                StateId::Suspended
            } else {
                StateId::Idle
            };
            return self.transit(target);
        }

        let mut target = None;
        if self.polled() && !status.busy {
            self.ctx.notify(|o| o.on_print_completed());
            target = Some(if pending || status.should_suspend() {
                StateId::Suspended
            } else {
                StateId::Idle
            });
        }
        self.ctx.status = status.clone();
        if let Some(target) = target {
            self.transit(target)?;
        }
        Ok(())
    }
}

/// Conditions that fail a job in progress.
fn fails_job(status: &Status) -> bool {
    status.ext_power_lost()
        || status.firmware_err()
        || status.nvm_err()
        || status.print_head_err()
        || status.temperature_err()
        || status.general_err()
        || status.print_head_opened()
        || status.paper_jam()
        || !status.top_of_form()
}
