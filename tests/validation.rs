mod common;

use std::cell::RefCell;
use std::rc::Rc;

use common::{FakeFpga, MockPort, PortState, VirtualClock};
use rstest::rstest;
use simps_ate::constants::opcodes::*;
use simps_ate::{ClientConfig, Error, SimpsClient};

fn client_with(fpga: FakeFpga) -> (SimpsClient<MockPort>, Rc<RefCell<PortState>>) {
    let port = PortState::new(fpga.into_responder());
    let clock = Rc::new(VirtualClock::default());
    let client = SimpsClient::from_port(
        MockPort {
            state: Rc::clone(&port),
        },
        clock,
        ClientConfig::default(),
    );
    (client, port)
}

fn echo_opcodes(port: &Rc<RefCell<PortState>>) -> Vec<u8> {
    port.borrow().writes.iter().map(|w| w[0]).collect()
}

#[test]
fn healthy_bus_passes() {
    let (mut client, port) = client_with(FakeFpga::default());

    client.validate_communications().unwrap();

    assert_eq!(
        port.borrow().writes,
        vec![vec![OP_ECHO, 0xAA], vec![OP_ECHO, 0x55]]
    );
}

#[test]
fn falls_back_to_alternate_echo() {
    let fpga = FakeFpga {
        echo: None,
        ..FakeFpga::default()
    };
    let (mut client, port) = client_with(fpga);

    client.validate_communications().unwrap();

    assert_eq!(
        echo_opcodes(&port),
        vec![OP_ECHO, OP_ECHO, OP_ECHO_ALT, OP_ECHO_ALT]
    );
}

#[test]
fn dead_link() {
    let fpga = FakeFpga {
        echo: None,
        echo_alt: None,
        ..FakeFpga::default()
    };
    let (mut client, _) = client_with(fpga);

    let err = client.validate_communications().unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::LinkDead)));
}

#[rstest]
#[case::all_lines_stuck(|_| 0xAA, 0)]
#[case::d0_stuck_low(|b| b & !0x01, 0)]
#[case::d5_stuck_high(|b| b | 0x20, 5)]
#[case::d7_stuck_low(|b| b & !0x80, 7)]
fn stuck_line(#[case] echo: fn(u8) -> u8, #[case] line: u8) {
    let fpga = FakeFpga {
        echo: Some(echo),
        ..FakeFpga::default()
    };
    let (mut client, _) = client_with(fpga);

    let err = client.validate_communications().unwrap_err();
    match err.downcast_ref::<Error>() {
        Some(Error::StuckLine { line: found }) => assert_eq!(*found, line),
        other => panic!("expected a stuck line, got {other:?}"),
    }
}

#[test]
fn reversed_bus() {
    let fpga = FakeFpga {
        echo: Some(|b| b.reverse_bits()),
        ..FakeFpga::default()
    };
    let (mut client, _) = client_with(fpga);

    let err = client.validate_communications().unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::ReversedBus)));
}

#[rstest]
#[case::reserved(OP_RESERVED)]
#[case::program(OP_PROGRAM)]
#[case::set_range(OP_SET_RANGE)]
#[case::set_ps(OP_SET_PS)]
fn echo_rejects_other_opcodes(#[case] opcode: u8) {
    let (mut client, port) = client_with(FakeFpga::default());

    let err = client.echo(opcode, 0xAA).unwrap_err();

    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::ValueOutOfRange(_))));
    assert!(port.borrow().writes.is_empty());
    assert_eq!(port.borrow().purges, 0);
}

#[rstest]
#[case(OP_ECHO)]
#[case(OP_ECHO_ALT)]
fn echo_accepts_echo_opcodes(#[case] opcode: u8) {
    let (mut client, port) = client_with(FakeFpga::default());

    assert_eq!(client.echo(opcode, 0x3C).unwrap(), Some(0x3C));
    assert_eq!(port.borrow().writes, vec![vec![opcode, 0x3C]]);
}

#[test]
fn self_test_passes() {
    let (mut client, port) = client_with(FakeFpga::default());

    client.self_test().unwrap();

    assert_eq!(
        port.borrow().writes,
        vec![vec![OP_ECHO, 0x50], vec![OP_ECHO], vec![OP_ECHO, 0x60]]
    );
}

#[test]
fn self_test_reports_mismatch() {
    let fpga = FakeFpga {
        echo: Some(|b| b ^ 0x10),
        ..FakeFpga::default()
    };
    let (mut client, _) = client_with(fpga);

    let err = client.self_test().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<Error>(),
        Some(Error::EchoMismatch {
            sent: 0x50,
            received: 0x40
        })
    ));
}
