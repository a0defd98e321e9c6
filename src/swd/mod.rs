//! The SWD packet layer.
//!
//! Builds request headers, drives and samples turnaround cycles, exchanges
//! 32-bit payloads and decodes the three-bit acknowledge, on top of the
//! bit-banged [`BitbangDriver`].
//!
//! The layer is written for ORUNDETECT operation: the host always completes
//! the data phase of a transaction, even after a WAIT or FAULT acknowledge,
//! and leaves the resulting overrun for the caller to clear through ABORT.
//! Legacy SWDv1 fault handling (where the data phase is suppressed) is not
//! supported.

pub mod ap;
pub mod dp;

use bitvec::prelude::*;

use crate::bitbang::{BitbangDriver, SwdPins};

/// The port a request addresses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PortType {
    /// The debug port (SW-DP) itself.
    DebugPort,
    /// The access port selected through DP SELECT.
    AccessPort,
}

/// An error on the SWD wire.
#[derive(thiserror::Error, Debug, docsplay::Display, Clone, Copy, PartialEq, Eq)]
pub enum DapError {
    /// Target device responded with a WAIT response to the request.
    WaitResponse,

    /// Target device responded with a FAULT response to the request.
    FaultResponse,

    /// Target device did not respond to the request.
    NoAcknowledge,

    /// Target device responded with an ill-formed acknowledge ({0:#05b}).
    SwdProtocol(u8),
}

const ACK_OK: u8 = 0b001;
const ACK_WAIT: u8 = 0b010;
const ACK_FAULT: u8 = 0b100;
const ACK_NO_RESPONSE: u8 = 0b111;

fn check_ack(ack: u8) -> Result<(), DapError> {
    match ack {
        ACK_OK => Ok(()),
        ACK_WAIT => Err(DapError::WaitResponse),
        ACK_FAULT => Err(DapError::FaultResponse),
        ACK_NO_RESPONSE => Err(DapError::NoAcknowledge),
        other => Err(DapError::SwdProtocol(other)),
    }
}

/// The fixed link-down-up sequence, clocked out LSB-first per byte.
///
/// Whatever state the target's SWJ-DP is in, this leaves it in the SWD
/// reset state: line reset, SWD-to-dormant, then the dormant-to-SWD
/// selection alert and activation, then another line reset.
/// Reference: ADIv5.2 (IHI0031F) figure B5-4.
const WAKEUP_SEQUENCE: [u8; 35] = [
    // Line reset: at least 50 cycles (56 here)
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    // SWD-to-dormant (0xE3BC)
    0xbc, 0xe3,
    // Dormant-to-SWD: resync the selection alert LFSR
    0xff,
    // A zero bit, then the 127-bit selection alert sequence
    0x92, 0xf3, 0x09, 0x62, //
    0x95, 0x2d, 0x85, 0x86, //
    0xe9, 0xaf, 0xdd, 0xe3, //
    0xa2, 0x0e, 0xbc, 0x19,
    // Four zero bits, the 8-bit SWD activation code (0x1A), four more zeros
    0xa0, 0x01,
    // A line reset (50 cycles high), then at least 2 zeros
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x03,
];

/// The trailing four bits of the final byte are not clocked out.
const WAKEUP_BITS: usize = WAKEUP_SEQUENCE.len() * 8 - 4;

/// A host-side SWD transaction engine over a pair of pins.
#[derive(Debug)]
pub struct SwdBus<P: SwdPins> {
    io: BitbangDriver<P>,
}

impl<P: SwdPins> SwdBus<P> {
    /// Creates a bus over the given pins.
    pub fn new(pins: P) -> Self {
        Self {
            io: BitbangDriver::new(pins),
        }
    }

    /// Shared access to the underlying pins.
    pub fn pins(&self) -> &P {
        self.io.pins()
    }

    /// Exclusive access to the underlying pins.
    pub fn pins_mut(&mut self) -> &mut P {
        self.io.pins_mut()
    }

    /// Releases the underlying pins.
    pub fn into_pins(self) -> P {
        self.io.into_pins()
    }

    /// Builds the request byte for a transaction.
    ///
    /// Bit order on the wire: start, APnDP, RnW, A[2], A[3], parity, stop,
    /// park. `address` is the register byte address; only A[3:2] are
    /// transmitted.
    fn request(port: PortType, read: bool, address: u8) -> u8 {
        let ap = matches!(port, PortType::AccessPort);
        let a = (address >> 2) & 0b11;
        let req = 1 | u8::from(ap) << 1 | u8::from(read) << 2 | a << 3 | 1 << 7;
        // Start and park contribute two ones, so the even parity over
        // (APnDP, RnW, A2, A3) survives counting the whole byte.
        let parity = (req.count_ones() & 1) as u8;
        req | parity << 5
    }

    /// Clocks out the full link-down-up sequence.
    pub fn send_wakeup(&mut self) {
        tracing::debug!("sending dormant wakeup sequence ({WAKEUP_BITS} bits)");
        self.io
            .write_bits(&WAKEUP_SEQUENCE.view_bits::<Lsb0>()[..WAKEUP_BITS]);
    }

    /// Issues a TARGETSEL write.
    ///
    /// The DP never drives an acknowledge for TARGETSEL; the five response
    /// cycles are run with SWDIO tri-stated instead.
    pub fn targetsel(&mut self, id: u32) {
        tracing::debug!("TARGETSEL <- {id:#010x}");
        let req = Self::request(PortType::DebugPort, false, dp::TARGETSEL);
        self.io.write_bits(req.view_bits::<Lsb0>());
        self.io.hiz_clocks(5);
        self.send_payload(id);
    }

    /// Performs a read transaction and returns the 32-bit payload.
    ///
    /// The data phase is completed even on a non-OK acknowledge, and the
    /// read parity bit is clocked but not checked.
    pub fn read(&mut self, port: PortType, address: u8) -> Result<u32, DapError> {
        let req = Self::request(port, true, address);
        self.io.write_bits(req.view_bits::<Lsb0>());
        self.io.hiz_clocks(1);
        let ack = self.io.read_bits(3).load_le::<u8>();
        let value = self.io.read_bits(32).load_le::<u32>();
        let _parity = self.io.read_bits(1);
        // Turnaround for the next request
        self.io.hiz_clocks(1);
        check_ack(ack)?;
        tracing::trace!("SWD read  {port:?} {address:#04x} -> {value:#010x}");
        Ok(value)
    }

    /// Performs a write transaction.
    ///
    /// The data phase is driven even on a non-OK acknowledge.
    pub fn write(&mut self, port: PortType, address: u8, value: u32) -> Result<(), DapError> {
        let req = Self::request(port, false, address);
        self.io.write_bits(req.view_bits::<Lsb0>());
        self.io.hiz_clocks(1);
        let ack = self.io.read_bits(3).load_le::<u8>();
        self.io.hiz_clocks(1);
        self.send_payload(value);
        check_ack(ack)?;
        tracing::trace!("SWD write {port:?} {address:#04x} <- {value:#010x}");
        Ok(())
    }

    /// Drives 32 data bits and their even parity bit.
    fn send_payload(&mut self, value: u32) {
        let mut bits: BitVec<u8, Lsb0> = BitVec::with_capacity(33);
        let bytes = value.to_le_bytes();
        bits.extend_from_bitslice(bytes.view_bits::<Lsb0>());
        bits.push(value.count_ones() % 2 == 1);
        self.io.write_bits(&bits);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::fake_dap::FakeDap;
    use crate::swd::ap::ApRegister;
    use crate::swd::dp::DpRegister;

    #[test]
    fn request_bytes_match_known_encodings() {
        // (port, read, byte address) -> request byte, LSB transmitted first
        let cases = [
            (PortType::DebugPort, true, 0x0, 0xA5u8), // DPIDR read
            (PortType::DebugPort, true, 0x4, 0x8D),   // CTRL/STAT read
            (PortType::DebugPort, true, 0xC, 0xBD),   // RDBUF read
            (PortType::DebugPort, false, 0x0, 0x81),  // ABORT write
            (PortType::DebugPort, false, 0x8, 0xB1),  // SELECT write
            (PortType::DebugPort, false, 0xC, 0x99),  // TARGETSEL write
            (PortType::AccessPort, true, 0xC, 0x9F),  // DRW/IDR read
            (PortType::AccessPort, false, 0x4, 0x8B), // TAR write
            (PortType::AccessPort, false, 0xC, 0xBB), // DRW write
        ];
        for (port, read, address, expected) in cases {
            assert_eq!(
                SwdBus::<FakeDap>::request(port, read, address),
                expected,
                "request({port:?}, {read}, {address:#x})"
            );
        }
    }

    #[test]
    fn request_ignores_bank_bits_of_the_address() {
        // AP IDR lives at 0xFC; only A[3:2] go on the wire.
        assert_eq!(
            SwdBus::<FakeDap>::request(PortType::AccessPort, true, ap::Idr::ADDRESS),
            SwdBus::<FakeDap>::request(PortType::AccessPort, true, 0xC),
        );
    }

    #[test]
    fn wakeup_sequence_bit_count() {
        assert_eq!(WAKEUP_BITS, 276);
        // The selection alert sequence is the fixed 128-bit constant from
        // the ADI specification, resync byte excluded.
        assert_eq!(WAKEUP_SEQUENCE[10..18], 0x86852D956209F392u64.to_le_bytes());
        assert_eq!(WAKEUP_SEQUENCE[18..26], 0x19BC0EA2E3DDAFE9u64.to_le_bytes());
    }

    #[test]
    fn read_transaction_round_trips_through_a_simulated_dp() {
        let mut bus = SwdBus::new(FakeDap::new());
        bus.send_wakeup();
        let dpidr = bus.read(PortType::DebugPort, dp::DPIDR::ADDRESS).unwrap();
        assert_eq!(dpidr, 0x2BA01477);
    }

    #[test]
    fn write_transaction_lands_with_correct_parity() {
        let mut bus = SwdBus::new(FakeDap::new());
        bus.send_wakeup();
        bus.read(PortType::DebugPort, dp::DPIDR::ADDRESS).unwrap();
        // Values with odd and even population counts exercise both parity
        // polarities; the fake drops writes with bad parity.
        for value in [0x0000_0001, 0x0000_0003, 0xDEAD_BEEF, 0xFFFF_FFFF] {
            bus.write(PortType::DebugPort, dp::Select::ADDRESS, value)
                .unwrap();
            assert_eq!(bus.pins().select(), value);
        }
    }

    #[test]
    fn read_without_target_reports_no_acknowledge() {
        // A deselected DP stays quiet; the floating line reads as all ones.
        let mut bus = SwdBus::new(FakeDap::new().with_targetsel(0x0100_2927));
        bus.send_wakeup();
        assert_eq!(
            bus.read(PortType::DebugPort, dp::DPIDR::ADDRESS),
            Err(DapError::NoAcknowledge)
        );
    }

    #[test]
    fn targetsel_selects_the_matching_target() {
        let mut bus = SwdBus::new(FakeDap::new().with_targetsel(0x0100_2927));
        bus.send_wakeup();
        bus.targetsel(0x0100_2927);
        assert!(bus.pins().selected());
        let dpidr = bus.read(PortType::DebugPort, dp::DPIDR::ADDRESS).unwrap();
        assert_eq!(dpidr, 0x2BA01477);
    }

    #[test]
    fn targetsel_mismatch_deselects() {
        let mut bus = SwdBus::new(FakeDap::new().with_targetsel(0x0100_2927));
        bus.send_wakeup();
        bus.targetsel(0x0400_2927);
        assert!(!bus.pins().selected());
    }
}
