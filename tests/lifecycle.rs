mod common;

use common::*;
use psa66_driver::{NullObserver, Printer, RunMode, StateId};

#[test]
fn init_settles_suspended() {
    let wire = Wire::new();
    let printer = Printer::with_run_mode(Box::new(MockTransport(wire.clone())), RunMode::Manual);
    let observer = RecordingObserver::default();
    let events = observer.0.clone();

    printer.init("port=/dev/mock", Box::new(observer)).unwrap();
    assert_eq!(printer.state(), StateId::Init);
    assert!(wire.lock().unwrap().was_sent(STATUS_REQUEST));

    printer.run(TICK).unwrap();
    assert_eq!(printer.state(), StateId::Suspended);
    assert_eq!(*events.lock().unwrap(), vec![Event::Ready]);

    printer.resume().unwrap();
    assert_eq!(printer.state(), StateId::Idle);
    assert!(events.lock().unwrap().contains(&Event::Resumed));
}

#[test]
fn resume_before_init_goes_idle() {
    let h = Harness::new(true);
    assert_eq!(h.printer.state(), StateId::Idle);
    assert_eq!(h.printer.firmware_currency(), "HKD");
}

#[test]
fn suspend_and_resume() {
    let h = Harness::new(true);
    h.printer.suspend().unwrap();
    assert_eq!(h.printer.state(), StateId::Suspended);
    // suspending twice reports again without moving
    h.printer.suspend().unwrap();
    assert_eq!(h.events(), vec![Event::Suspended, Event::Suspended]);

    h.printer.resume().unwrap();
    assert_eq!(h.printer.state(), StateId::Idle);
    assert_eq!(h.events().last(), Some(&Event::Resumed));
}

#[test]
fn blocking_condition_suspends() {
    let h = Harness::new(true);
    h.wire().default_reply = Some(status(&[PAPER_OUT]));
    h.run_until(StateId::Suspended);
    assert!(h.saw(&Event::PaperEmpty(true)));

    // resume is refused while the paper is out
    h.printer.resume().unwrap();
    assert_eq!(h.printer.state(), StateId::Suspended);
    assert_eq!(h.events().last(), Some(&Event::Suspended));

    h.wire().default_reply = Some(status(&[]));
    h.step(5);
    assert!(h.saw(&Event::PaperEmpty(false)));
    h.printer.resume().unwrap();
    assert_eq!(h.printer.state(), StateId::Idle);
}

#[test]
fn power_loss_is_reported_once() {
    let h = Harness::new(true);
    h.wire().default_reply = Some(status(&[VOLTAGE_ERR, PAPER_LOW]));
    h.run_until(StateId::Suspended);
    h.step(10);
    let events = h.events();
    assert_eq!(events.iter().filter(|e| **e == Event::PowerLost).count(), 1);
    assert_eq!(
        events.iter().filter(|e| **e == Event::PaperLow(true)).count(),
        1
    );
}

#[test]
fn write_error_disconnects_and_reconnects() {
    let h = Harness::new(true);
    h.wire().trigger_write_error();
    h.printer.form_feed().unwrap();
    assert_eq!(h.printer.state(), StateId::Disconnected);
    assert_eq!(h.events(), vec![Event::Disconnected]);

    h.run_until(StateId::Suspended);
    assert_eq!(
        h.events(),
        vec![Event::Disconnected, Event::Connected, Event::Ready]
    );
}

#[test]
fn silent_printer_disconnects() {
    let h = Harness::new(true);
    h.wire().default_reply = None;
    // the alive timeout is 2 s
    h.step(15);
    assert_eq!(h.printer.state(), StateId::Idle);
    h.run_until(StateId::Disconnected);

    // keeps asking while disconnected
    let before = h.wire().count_sent(STATUS_REQUEST);
    h.step(10);
    assert!(h.wire().count_sent(STATUS_REQUEST) > before);
    assert_eq!(h.printer.state(), StateId::Disconnected);
}

#[test]
fn rejected_status_keeps_disconnected() {
    let h = Harness::new(true);
    h.wire().trigger_write_error();
    h.printer.form_feed().unwrap();
    h.wire().default_reply = Some(status(&[CMD_ERR]));
    h.step(20);
    assert_eq!(h.printer.state(), StateId::Disconnected);
    assert!(!h.saw(&Event::Connected));
}

#[test]
fn uninit_closes_port() {
    let h = Harness::new(true);
    h.printer.uninit().unwrap();
    assert_eq!(h.printer.state(), StateId::UnInit);
    assert!(h.printer.run(TICK).is_ok());

    // and the printer can be brought up again
    h.printer.init("port=1", Box::new(NullObserver)).unwrap();
    h.run_until(StateId::Suspended);
}

#[test]
fn background_worker_reaches_ready() {
    let wire = Wire::new();
    let printer = Printer::new(Box::new(MockTransport(wire)));
    let observer = RecordingObserver::default();
    let events = observer.0.clone();
    printer.init("port=/dev/mock", Box::new(observer)).unwrap();

    for _ in 0..200 {
        if printer.state() == StateId::Suspended {
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(10));
    }
    assert_eq!(printer.state(), StateId::Suspended);
    assert_eq!(*events.lock().unwrap(), vec![Event::Ready]);
    printer.uninit().unwrap();
}
