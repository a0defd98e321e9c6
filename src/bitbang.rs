//! Bit-level I/O on a bit-banged two-wire (SWCLK/SWDIO) bus.

use bitvec::prelude::*;

/// Platform access to the two SWD pins.
///
/// Implementations drive real GPIOs (or a simulation of them, see
/// [`crate::fake_dap`]). The protocol layers only ever change the SWDIO
/// level while the pin is configured as an output, and only sample it while
/// it is tri-stated.
pub trait SwdPins {
    /// Drive SWCLK to the given level.
    fn set_swclk(&mut self, level: bool);

    /// Drive SWDIO to the given level.
    fn set_swdio(&mut self, level: bool);

    /// Enable (`true`) or tri-state (`false`) the SWDIO output driver.
    fn set_swdio_output(&mut self, output: bool);

    /// Sample the SWDIO level.
    fn swdio(&mut self) -> bool;

    /// Wait for half a SWCLK period.
    ///
    /// Protocol correctness does not depend on the exact frequency, only on
    /// respecting the target's maximum SWCLK. A bit-banged GPIO back end
    /// typically busy-waits here (a few MHz is plenty); a simulation can
    /// make this a no-op.
    fn half_period_delay(&mut self);
}

/// Shifts bit sequences over a [`SwdPins`] back end.
///
/// All three primitives clock data LSB-first within each byte and return
/// with SWCLK low.
#[derive(Debug)]
pub struct BitbangDriver<P: SwdPins> {
    pins: P,
}

impl<P: SwdPins> BitbangDriver<P> {
    /// Wraps a set of pins.
    pub fn new(pins: P) -> Self {
        Self { pins }
    }

    /// Shared access to the underlying pins.
    pub fn pins(&self) -> &P {
        &self.pins
    }

    /// Exclusive access to the underlying pins.
    pub fn pins_mut(&mut self) -> &mut P {
        &mut self.pins
    }

    /// Releases the underlying pins.
    pub fn into_pins(self) -> P {
        self.pins
    }

    /// Drives `bits` out on SWDIO, one per SWCLK cycle.
    ///
    /// The target samples on the rising edge, so each bit is presented
    /// before the clock is asserted.
    pub fn write_bits(&mut self, bits: &BitSlice<u8, Lsb0>) {
        self.pins.set_swdio_output(true);
        for bit in bits.iter().by_vals() {
            self.pins.set_swdio(bit);
            self.pins.half_period_delay();
            self.pins.set_swclk(true);
            self.pins.half_period_delay();
            self.pins.set_swclk(false);
        }
    }

    /// Samples `n` bits from SWDIO with the output driver tri-stated.
    ///
    /// The target changes SWDIO after the rising edge, so each bit is
    /// sampled just before the clock is asserted. Bits are packed LSB-first:
    /// the first bit received ends up in bit 0 of the first byte.
    pub fn read_bits(&mut self, n: usize) -> BitVec<u8, Lsb0> {
        let mut bits: BitVec<u8, Lsb0> = BitVec::with_capacity(n);
        self.pins.set_swdio_output(false);
        for _ in 0..n {
            self.pins.half_period_delay();
            bits.push(self.pins.swdio());
            self.pins.set_swclk(true);
            self.pins.half_period_delay();
            self.pins.set_swclk(false);
        }
        bits
    }

    /// Runs `n` SWCLK cycles with SWDIO tri-stated.
    ///
    /// Used for turnaround cycles and for the dead bits around TARGETSEL.
    pub fn hiz_clocks(&mut self, n: usize) {
        self.pins.set_swdio_output(false);
        for _ in 0..n {
            self.pins.half_period_delay();
            self.pins.set_swclk(true);
            self.pins.half_period_delay();
            self.pins.set_swclk(false);
        }
    }
}
