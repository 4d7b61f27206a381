//! Printer status as reported in the five flag bytes of a status response.

/// Raw status flags, plus the conditions the driver derives from them.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    // flag 1
    pub busy: bool,
    pub error: bool,
    pub print_head_open: bool,
    pub paper_out: bool,
    pub print_head_err: bool,
    pub voltage_err: bool,
    // flag 2
    pub temperature_err: bool,
    pub lib_ref_err: bool,
    pub region_data_err: bool,
    pub load_lib_err: bool,
    pub buffer_overflow: bool,
    pub job_mem_overflow: bool,
    // flag 3
    pub cmd_err: bool,
    pub no_font: bool,
    pub paper_in_chute: bool,
    pub flash_err: bool,
    pub off_line: bool,
    pub wrong_paper: bool,
    // flag 4
    pub journal_mode: bool,
    pub cutter_err: bool,
    pub paper_jam: bool,
    pub paper_low: bool,
    // flag 5
    pub last_bar_printed: bool,
    pub top_of_form: bool,
    pub ready_to_rx: bool,
    pub door_opened: bool,
    pub power_up_reset: bool,
}

impl Default for Status {
    fn default() -> Self {
        Self {
            busy: false,
            error: false,
            print_head_open: false,
            paper_out: false,
            print_head_err: false,
            voltage_err: false,
            temperature_err: false,
            lib_ref_err: false,
            region_data_err: false,
            load_lib_err: false,
            buffer_overflow: false,
            job_mem_overflow: false,
            cmd_err: false,
            no_font: false,
            paper_in_chute: false,
            flash_err: false,
            off_line: false,
            wrong_paper: false,
            journal_mode: false,
            cutter_err: false,
            paper_jam: false,
            paper_low: false,
            last_bar_printed: false,
            top_of_form: true,
            ready_to_rx: false,
            door_opened: false,
            power_up_reset: false,
        }
    }
}

const fn bit(flags: u8, mask: u8) -> bool {
    flags & mask != 0
}

impl Status {
    /// Decode the five flag bytes of a status response.
    pub fn from_flags(flags: [u8; 5]) -> Self {
        let [f1, f2, f3, f4, f5] = flags;
        Self {
            busy: bit(f1, 0x20),
            error: bit(f1, 0x10),
            print_head_open: bit(f1, 0x08),
            paper_out: bit(f1, 0x04),
            print_head_err: bit(f1, 0x02),
            voltage_err: bit(f1, 0x01),

            temperature_err: bit(f2, 0x20),
            lib_ref_err: bit(f2, 0x10),
            region_data_err: bit(f2, 0x08),
            load_lib_err: bit(f2, 0x04),
            buffer_overflow: bit(f2, 0x02),
            job_mem_overflow: bit(f2, 0x01),

            cmd_err: bit(f3, 0x20),
            no_font: bit(f3, 0x10),
            paper_in_chute: bit(f3, 0x08),
            flash_err: bit(f3, 0x04),
            off_line: bit(f3, 0x02),
            wrong_paper: bit(f3, 0x01),

            journal_mode: bit(f4, 0x08),
            cutter_err: bit(f4, 0x04),
            paper_jam: bit(f4, 0x02),
            paper_low: bit(f4, 0x01),

            last_bar_printed: bit(f5, 0x20),
            top_of_form: bit(f5, 0x10),
            // active low
            ready_to_rx: !bit(f5, 0x08),
            door_opened: bit(f5, 0x04),
            power_up_reset: bit(f5, 0x01),
        }
    }

    pub fn ext_power_lost(&self) -> bool {
        self.voltage_err
    }

    pub fn firmware_err(&self) -> bool {
        self.flash_err
    }

    /// The printer has no separate NVM error flag.
    pub fn nvm_err(&self) -> bool {
        false
    }

    pub fn print_head_err(&self) -> bool {
        self.print_head_err
    }

    pub fn temperature_err(&self) -> bool {
        self.temperature_err
    }

    pub fn general_err(&self) -> bool {
        self.no_font || self.off_line || self.journal_mode
    }

    pub fn chassis_opened(&self) -> bool {
        self.door_opened
    }

    pub fn print_head_opened(&self) -> bool {
        self.print_head_open
    }

    /// Always true. The raw `top_of_form` flag is only consulted by
    /// [`Status::need_clear_err`].
    pub fn top_of_form(&self) -> bool {
        true
    }

    pub fn paper_jam(&self) -> bool {
        self.paper_jam
    }

    pub fn paper_low(&self) -> bool {
        self.paper_low
    }

    pub fn paper_empty(&self) -> bool {
        self.paper_out || self.wrong_paper
    }

    /// Conditions that keep the printer out of `Idle`.
    pub fn should_suspend(&self) -> bool {
        self.ext_power_lost()
            || self.firmware_err()
            || self.nvm_err()
            || self.print_head_err()
            || self.temperature_err()
            || self.general_err()
            || self.print_head_opened()
            || self.paper_jam()
            || self.paper_empty()
            || !self.top_of_form()
    }

    /// Latched conditions the printer only drops after a clear error command.
    pub fn need_clear_err(&self) -> bool {
        self.lib_ref_err
            || self.region_data_err
            || self.load_lib_err
            || self.buffer_overflow
            || self.job_mem_overflow
            || self.cmd_err
            || self.last_bar_printed
            || !self.top_of_form
    }
}
