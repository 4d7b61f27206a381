#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::ErrorKind;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use psa66_driver::{
    Error, GraphicError, Observer, PortSettings, PrintError, Printer, RegionError, RunMode,
    StateId, TemplateError, Transport,
};

pub const TICK: Duration = Duration::from_millis(100);
pub const STATUS_REQUEST: &[u8] = b"^S|^";
pub const CLEAR_ERROR: &[u8] = b"^C|^";

/// A status flag as (flag byte index, bit).
pub type Flag = (usize, u8);

pub const BUSY: Flag = (0, 0x20);
pub const PAPER_OUT: Flag = (0, 0x04);
pub const VOLTAGE_ERR: Flag = (0, 0x01);
pub const REGION_DATA_ERR: Flag = (1, 0x08);
pub const BUFFER_OVERFLOW: Flag = (1, 0x02);
pub const CMD_ERR: Flag = (2, 0x20);
pub const PAPER_JAM: Flag = (3, 0x02);
pub const PAPER_LOW: Flag = (3, 0x01);

/// A status frame with `set` raised on top of a healthy, idle printer.
pub fn status(set: &[Flag]) -> Vec<u8> {
    let mut flags = *b"@@@@P";
    for &(i, bit) in set {
        flags[i] |= bit;
    }
    let mut frame = b"*S|01|GUR126003|".to_vec();
    for &flag in &flags {
        frame.push(flag);
        frame.push(b'|');
    }
    frame.extend_from_slice(b"P0|*");
    frame
}

pub fn crc_frame(crc: u16) -> Vec<u8> {
    let [lo, hi] = crc.to_le_bytes();
    vec![b'*', b'G', b'|', lo, hi, b'|', b'*']
}

/// The far end of the mock serial line: a printer that answers status
/// requests from a script, falling back to `default_reply`.
pub struct Wire {
    rx: VecDeque<u8>,
    pub sent: Vec<Vec<u8>>,
    replies: VecDeque<Vec<u8>>,
    pub default_reply: Option<Vec<u8>>,
    pub crc: Option<u16>,
    do_write_error: bool,
    open: bool,
}

pub type SharedWire = Arc<Mutex<Wire>>;

impl Wire {
    pub fn new() -> SharedWire {
        Arc::new(Mutex::new(Wire {
            rx: VecDeque::new(),
            sent: Vec::new(),
            replies: VecDeque::new(),
            default_reply: Some(status(&[])),
            crc: None,
            do_write_error: false,
            open: false,
        }))
    }

    /// Answer the next status requests with `frames`, in order.
    pub fn script(&mut self, frames: impl IntoIterator<Item = Vec<u8>>) {
        self.replies.extend(frames);
    }

    pub fn trigger_write_error(&mut self) {
        self.do_write_error = true;
    }

    pub fn count_sent(&self, frame: &[u8]) -> usize {
        self.sent.iter().filter(|sent| sent.as_slice() == frame).count()
    }

    pub fn was_sent(&self, frame: &[u8]) -> bool {
        self.count_sent(frame) > 0
    }

    fn respond(&mut self, data: &[u8]) {
        if data == STATUS_REQUEST {
            if let Some(reply) = self.replies.pop_front().or_else(|| self.default_reply.clone()) {
                self.rx.extend(reply);
            }
        } else if data.starts_with(b"^G|") {
            if let Some(crc) = self.crc {
                self.rx.extend(crc_frame(crc));
            }
        }
    }
}

pub struct MockTransport(pub SharedWire);

impl Transport for MockTransport {
    fn open(&mut self, _settings: &PortSettings) -> Result<(), Error> {
        self.0.lock().unwrap().open = true;
        Ok(())
    }

    fn close(&mut self) {
        self.0.lock().unwrap().open = false;
    }

    fn is_open(&self) -> bool {
        self.0.lock().unwrap().open
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        let mut wire = self.0.lock().unwrap();
        let n = wire.rx.len().min(buf.len());
        for (dst, src) in buf.iter_mut().zip(wire.rx.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8], _timeout: Duration) -> Result<usize, Error> {
        let mut wire = self.0.lock().unwrap();
        if wire.do_write_error {
            wire.do_write_error = false;
            return Err(Error::Io {
                port: "mock".into(),
                source: std::io::Error::new(ErrorKind::BrokenPipe, "unplugged"),
            });
        }
        wire.sent.push(data.to_vec());
        wire.respond(data);
        Ok(data.len())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Connected,
    Disconnected,
    Suspended,
    Resumed,
    Ready,
    Printing,
    PrintCompleted,
    PrintFailed(PrintError),
    GraphicDefined,
    GraphicFailed(GraphicError),
    RegionDefined,
    RegionFailed(RegionError),
    TemplateDefined,
    TemplateFailed(TemplateError),
    Crc(u16),
    GatReport(String),
    PowerLost,
    PaperJam(bool),
    PaperEmpty(bool),
    PaperLow(bool),
    GeneralErr(bool),
}

pub type Events = Arc<Mutex<Vec<Event>>>;

#[derive(Default)]
pub struct RecordingObserver(pub Events);

impl RecordingObserver {
    fn push(&self, event: Event) {
        self.0.lock().unwrap().push(event);
    }
}

impl Observer for RecordingObserver {
    fn on_connected(&self) {
        self.push(Event::Connected)
    }
    fn on_disconnected(&self) {
        self.push(Event::Disconnected)
    }
    fn on_suspended(&self) {
        self.push(Event::Suspended)
    }
    fn on_resumed(&self) {
        self.push(Event::Resumed)
    }
    fn on_ready(&self) {
        self.push(Event::Ready)
    }
    fn on_printing(&self) {
        self.push(Event::Printing)
    }
    fn on_print_completed(&self) {
        self.push(Event::PrintCompleted)
    }
    fn on_print_failed(&self, error: PrintError) {
        self.push(Event::PrintFailed(error))
    }
    fn on_define_graphic_success(&self) {
        self.push(Event::GraphicDefined)
    }
    fn on_define_graphic_failed(&self, error: GraphicError) {
        self.push(Event::GraphicFailed(error))
    }
    fn on_define_region_success(&self) {
        self.push(Event::RegionDefined)
    }
    fn on_define_region_failed(&self, error: RegionError) {
        self.push(Event::RegionFailed(error))
    }
    fn on_define_template_success(&self) {
        self.push(Event::TemplateDefined)
    }
    fn on_define_template_failed(&self, error: TemplateError) {
        self.push(Event::TemplateFailed(error))
    }
    fn on_crc_ready(&self, crc: u16) {
        self.push(Event::Crc(crc))
    }
    fn on_gat_report_ready(&self, version: &str) {
        self.push(Event::GatReport(version.to_string()))
    }
    fn on_ext_power_lost(&self) {
        self.push(Event::PowerLost)
    }
    fn on_paper_jam(&self, set: bool) {
        self.push(Event::PaperJam(set))
    }
    fn on_paper_empty(&self, set: bool) {
        self.push(Event::PaperEmpty(set))
    }
    fn on_paper_low(&self, set: bool) {
        self.push(Event::PaperLow(set))
    }
    fn on_general_err(&self, set: bool) {
        self.push(Event::GeneralErr(set))
    }
}

pub struct Harness {
    pub printer: Printer,
    pub wire: SharedWire,
    pub events: Events,
}

impl Harness {
    /// An initialized printer driven by hand. It settles in `Suspended`, or
    /// in `Idle` if `resume` is set.
    pub fn new(resume: bool) -> Harness {
        let _ = env_logger::builder().is_test(true).try_init();
        let wire = Wire::new();
        let printer =
            Printer::with_run_mode(Box::new(MockTransport(wire.clone())), RunMode::Manual);
        let observer = RecordingObserver::default();
        let events = observer.0.clone();
        if resume {
            printer.resume().unwrap();
        }
        printer.init("port=/dev/mock;debug=1", Box::new(observer)).unwrap();
        let harness = Harness {
            printer,
            wire,
            events,
        };
        harness.run_until(if resume {
            StateId::Idle
        } else {
            StateId::Suspended
        });
        harness.events.lock().unwrap().clear();
        harness
    }

    pub fn step(&self, ticks: usize) {
        for _ in 0..ticks {
            self.printer.run(TICK).unwrap();
        }
    }

    /// Run until the machine is in `state`, for at most 100 ticks.
    pub fn run_until(&self, state: StateId) {
        for _ in 0..100 {
            if self.printer.state() == state {
                return;
            }
            self.printer.run(TICK).unwrap();
        }
        assert_eq!(self.printer.state(), state);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn saw(&self, event: &Event) -> bool {
        self.events.lock().unwrap().contains(event)
    }

    pub fn wire(&self) -> std::sync::MutexGuard<'_, Wire> {
        self.wire.lock().unwrap()
    }
}
