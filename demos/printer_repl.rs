use anyhow::{Context, Result};
use std::io::Write;
use std::iter::Peekable;
use std::str::{FromStr, SplitWhitespace};

use psa66_driver::observer::{GraphicError, PrintError, RegionError, TemplateError};
use psa66_driver::{Job, Observer, Printer, Region, SerialTransport, Template};

/// Prints every event it gets.
struct Console;

impl Observer for Console {
    fn on_connected(&self) {
        println!("<< connected");
    }
    fn on_disconnected(&self) {
        println!("<< disconnected");
    }
    fn on_suspended(&self) {
        println!("<< suspended");
    }
    fn on_resumed(&self) {
        println!("<< resumed");
    }
    fn on_ready(&self) {
        println!("<< ready");
    }
    fn on_printing(&self) {
        println!("<< printing");
    }
    fn on_print_completed(&self) {
        println!("<< print completed");
    }
    fn on_print_failed(&self, error: PrintError) {
        println!("<< print failed: {:?}", error);
    }
    fn on_define_graphic_failed(&self, error: GraphicError) {
        println!("<< graphic failed: {:?}", error);
    }
    fn on_define_region_success(&self) {
        println!("<< region defined");
    }
    fn on_define_region_failed(&self, error: RegionError) {
        println!("<< region failed: {:?}", error);
    }
    fn on_define_template_success(&self) {
        println!("<< template defined");
    }
    fn on_define_template_failed(&self, error: TemplateError) {
        println!("<< template failed: {:?}", error);
    }
    fn on_crc_ready(&self, crc: u16) {
        println!("<< CRC {:04X}", crc);
    }
    fn on_gat_report_ready(&self, version: &str) {
        println!("<< firmware {}", version);
    }
    fn on_paper_empty(&self, set: bool) {
        println!("<< paper empty {}", set);
    }
    fn on_paper_low(&self, set: bool) {
        println!("<< paper low {}", set);
    }
}

fn cmd_region(args: &mut CmdScanner, printer: &Printer) -> Result<()> {
    let region = Region {
        id: args.parse_next()?,
        x: args.parse_next()?,
        y: args.parse_next()?,
        width: args.parse_next()?,
        height: args.parse_next()?,
        default_data: args.rest(),
        ..Region::default()
    };
    printer.define_region(&region)?;
    Ok(())
}

fn cmd_template(args: &mut CmdScanner, printer: &Printer) -> Result<()> {
    let id = args.parse_next()?;
    let mut regions = Vec::new();
    while args.has_next() {
        regions.push(args.parse_next()?);
    }
    printer.define_template(&Template { id, regions })?;
    Ok(())
}

/// `print <template> field;field;...`
fn cmd_print(args: &mut CmdScanner, printer: &Printer) -> Result<()> {
    let template_id = args.parse_next()?;
    let fields = args.rest().split(';').map(str::to_string).collect();
    printer.print(&Job::new(template_id, fields))?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    let mut args = std::env::args();
    args.next(); // Skip program name
    let params = args
        .next()
        .unwrap_or_else(|| "port=/dev/ttyUSB0".to_string());

    let printer = Printer::new(Box::new(SerialTransport::new()));
    printer
        .init(&params, Box::new(Console))
        .with_context(|| format!("Failed to init with `{}`", params))?;

    let mut stdout = std::io::stdout();
    loop {
        print!(">> ");
        stdout.flush()?;
        let mut cmd = String::new();
        let mut scan = CmdScanner::read_stdin(&mut cmd)?;
        if let Err(err) = match scan.next() {
            Err(_) => continue,
            Ok("quit") | Ok("q") => break,
            Ok("state") => {
                println!("{:?}", printer.state());
                Ok(())
            }
            Ok("suspend") => printer.suspend().map_err(Into::into),
            Ok("resume") => printer.resume().map_err(Into::into),
            Ok("test") => printer.self_test().map_err(Into::into),
            Ok("gat") => printer.rq_gat_report().map_err(Into::into),
            Ok("crc") => scan
                .parse_next()
                .and_then(|seed| printer.calculate_crc(seed).map_err(Into::into)),
            Ok("feed") => printer.form_feed().map_err(Into::into),
            Ok("currency") => {
                println!("{}", printer.firmware_currency());
                Ok(())
            }
            Ok("region") => cmd_region(&mut scan, &printer),
            Ok("template") => cmd_template(&mut scan, &printer),
            Ok("print") | Ok("p") => cmd_print(&mut scan, &printer),
            Ok(cmd) => {
                println!("Unknown command {}", cmd);
                continue;
            }
        } {
            println!("{:?}", err)
        }
    }
    printer.uninit()?;
    Ok(())
}

struct CmdScanner<'a> {
    splt: Peekable<SplitWhitespace<'a>>,
}

impl<'a> CmdScanner<'a> {
    fn read_stdin(buf: &'a mut String) -> Result<Self> {
        buf.clear();
        std::io::stdin().read_line(buf)?;
        let splt = buf.split_whitespace().peekable();
        Ok(Self { splt })
    }
    fn next(&mut self) -> Result<&str> {
        self.splt.next().context("End of stream")
    }
    fn has_next(&mut self) -> bool {
        self.splt.peek().is_some()
    }
    fn parse_next<T: FromStr>(&mut self) -> Result<T> {
        self.next()?.parse::<T>().ok().context("Parse error")
    }
    /// Remaining words joined by single spaces.
    fn rest(&mut self) -> String {
        self.splt.by_ref().collect::<Vec<_>>().join(" ")
    }
}
