//! Events reported to the application.
//!
//! Callbacks run on whichever thread drives the printer, with the printer
//! locked. They must not call back into the [`crate::Printer`].

/// Why a graphic definition failed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum GraphicError {
    /// Invalid graphic id.
    Id,
    /// The printer rejected the graphic data.
    Corrupt,
    /// Not enough library memory.
    Memory,
}

/// Why a region definition failed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RegionError {
    Id,
    /// The region refers to a graphic the printer doesn't have.
    UndefinedGraphic,
    /// The region's type and attributes don't match.
    DatatypeMismatch,
    Overflow,
}

/// Why a template definition failed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TemplateError {
    Id,
    /// The template refers to a region the printer doesn't have.
    UndefinedRegion,
    Memory,
}

/// Why a print job failed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PrintError {
    /// Field data doesn't fit the template's regions.
    DatatypeMismatch,
}

/// Receiver of printer events. Every method defaults to doing nothing.
///
/// Condition callbacks such as [`Observer::on_paper_low`] carry the new value
/// of the condition.
#[allow(unused_variables)]
pub trait Observer: Send {
    fn on_connected(&self) {}
    fn on_disconnected(&self) {}
    fn on_suspended(&self) {}
    fn on_resumed(&self) {}
    fn on_ready(&self) {}

    fn on_printing(&self) {}
    fn on_print_completed(&self) {}
    fn on_print_failed(&self, error: PrintError) {}

    fn on_define_graphic_success(&self) {}
    fn on_define_graphic_failed(&self, error: GraphicError) {}
    fn on_define_region_success(&self) {}
    fn on_define_region_failed(&self, error: RegionError) {}
    fn on_define_template_success(&self) {}
    fn on_define_template_failed(&self, error: TemplateError) {}

    fn on_crc_ready(&self, crc: u16) {}
    fn on_gat_report_ready(&self, version: &str) {}

    fn on_ext_power_lost(&self) {}
    fn on_ext_power_resumed(&self) {}
    fn on_firmware_err(&self, set: bool) {}
    fn on_nvm_err(&self, set: bool) {}
    fn on_print_head_err(&self, set: bool) {}
    fn on_temperature_err(&self, set: bool) {}
    fn on_general_err(&self, set: bool) {}
    fn on_print_head_open(&self, set: bool) {}
    fn on_paper_jam(&self, set: bool) {}
    fn on_paper_empty(&self, set: bool) {}
    fn on_top_of_form(&self, set: bool) {}
    fn on_chassis_open(&self, set: bool) {}
    fn on_paper_low(&self, set: bool) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Copy, Clone)]
pub struct NullObserver;

impl Observer for NullObserver {}
