//! An SWD-backed implementation of the RISC-V Debug Module Interface.
//!
//! [`SwdDmi`] is a tiny SWD host: it owns the two wires for the lifetime of
//! the debug session, brings the link up from dormant, and then carries
//! word-addressed DMI accesses to the Debug Module sitting behind an APB
//! Mem-AP inside the target.
//!
//! Link state management is deliberately simple: either the link works, or
//! the caller reruns [`SwdDmi::connect`] from scratch and hopes for the
//! best. Connect is idempotent and may be repeated until it succeeds.

use crate::bitbang::SwdPins;
use crate::swd::ap::{self, ApRegister};
use crate::swd::dp::{self, DpRegister};
use crate::swd::{DapError, PortType, SwdBus};

/// Tuning knobs for the SWD-backed DMI.
#[derive(Debug, Clone)]
pub struct DmiSettings {
    /// CTRL/STAT reads allowed while waiting for the power-up acknowledge
    /// bits during connect.
    pub powerup_ack_reads: usize,

    /// WAIT answers tolerated on a single steady-state access before the
    /// access is abandoned.
    pub dmi_wait_retries: usize,
}

impl Default for DmiSettings {
    fn default() -> Self {
        Self {
            powerup_ack_reads: 10_000,
            dmi_wait_retries: 8,
        }
    }
}

/// An error during link bring-up.
///
/// Whatever the kind, the recovery policy is the same: rerun
/// [`SwdDmi::connect`] from scratch.
#[derive(thiserror::Error, Debug, docsplay::Display, Clone, Copy, PartialEq, Eq)]
pub enum ConnectError {
    /// A DAP transaction failed during link bring-up.
    Dap(#[from] DapError),

    /// The system and debug power domains did not acknowledge the power-up
    /// request.
    PowerUpTimeout,

    /// AP {apsel} is not an APB Mem-AP (IDR = {idr:#010x}).
    NoMemAp {
        /// The probed AP index.
        apsel: u8,
        /// The identification register value that AP returned.
        idr: u32,
    },
}

/// An error during a steady-state DMI access.
#[derive(thiserror::Error, Debug, docsplay::Display, Clone, Copy, PartialEq, Eq)]
pub enum DmiError {
    /// A DAP transaction failed.
    Dap(#[from] DapError),

    /// The target kept answering WAIT after {0} retries.
    WaitTimeout(usize),
}

/// A Debug Module Interface carried over SWD through an APB Mem-AP.
#[derive(Debug)]
pub struct SwdDmi<P: SwdPins> {
    bus: SwdBus<P>,
    targetsel: u32,
    apsel: u8,
    settings: DmiSettings,
    /// The last value written to the Mem-AP TAR, while valid.
    tar_cache: Option<u32>,
}

impl<P: SwdPins> SwdDmi<P> {
    /// Creates a DMI instance without touching the wire.
    ///
    /// A `targetsel` of zero means the link is not multi-drop and no
    /// TARGETSEL is issued during connect.
    pub fn new(pins: P, targetsel: u32, apsel: u8) -> Self {
        Self::with_settings(pins, targetsel, apsel, DmiSettings::default())
    }

    /// Creates a DMI instance with explicit tuning knobs.
    pub fn with_settings(pins: P, targetsel: u32, apsel: u8, settings: DmiSettings) -> Self {
        Self {
            bus: SwdBus::new(pins),
            targetsel,
            apsel,
            settings,
            tar_cache: None,
        }
    }

    /// Shared access to the underlying pins.
    pub fn pins(&self) -> &P {
        self.bus.pins()
    }

    /// Exclusive access to the underlying pins.
    pub fn pins_mut(&mut self) -> &mut P {
        self.bus.pins_mut()
    }

    /// Releases the underlying pins.
    pub fn into_pins(self) -> P {
        self.bus.into_pins()
    }

    /// Brings the SWD link up and prepares the Mem-AP for DMI traffic.
    ///
    /// The sequence, per ADIv5.2 figure B5-4 and the 0.13.2 debug spec:
    /// line cycling into the SWD reset state, TARGETSEL, a DPIDR read to
    /// leave reset, ABORT to make SELECT writable, power-up request and
    /// acknowledge poll, Mem-AP identification, and finally SELECT parked
    /// on the CSW/TAR/DRW bank.
    pub fn connect(&mut self) -> Result<(), ConnectError> {
        tracing::debug!(
            "connect: targetsel={:#010x} apsel={}",
            self.targetsel,
            self.apsel
        );
        self.tar_cache = None;

        // Drive the fixed link cycling sequence, which leaves the DP in the
        // reset state whatever state it was in before.
        self.bus.send_wakeup();

        // TARGETSEL moves every non-matching DP from reset into the
        // deselected state. There is never a response.
        if self.targetsel != 0 {
            self.bus.targetsel(self.targetsel);
        }

        // A DPIDR read is required to leave the reset state. The value does
        // not gate anything: whatever still answers after TARGETSEL is
        // assumed to be the right target.
        let dpidr = dp::DPIDR::from(self.bus.read(PortType::DebugPort, dp::DPIDR::ADDRESS)?);
        let designer = jep106::JEP106Code::new(dpidr.jep_cc(), dpidr.jep_id());
        tracing::debug!(
            "{} {:#010x}: DPv{}, designer {}",
            dp::DPIDR::NAME,
            u32::from(dpidr.clone()),
            dpidr.version(),
            designer.get().unwrap_or("<unknown>")
        );

        // Clear outstanding sticky errors so that SELECT becomes writable.
        let mut abort = dp::Abort(0);
        abort.set_orunerrclr(true);
        abort.set_wderrclr(true);
        abort.set_stkerrclr(true);
        abort.set_stkcmpclr(true);
        self.bus
            .write(PortType::DebugPort, dp::Abort::ADDRESS, abort.into())?;

        // Power up both domains before any AP access. ORUNDETECT goes on at
        // the same time: legacy SWDv1 fault handling is unsupported, and the
        // writes up to this point are constructed so they cannot fault.
        self.bus
            .write(PortType::DebugPort, dp::Select::ADDRESS, dp::Select(0).into())?;
        let mut ctrl = dp::Ctrl(0);
        ctrl.set_csyspwrupreq(true);
        ctrl.set_cdbgpwrupreq(true);
        ctrl.set_orun_detect(true);
        self.bus
            .write(PortType::DebugPort, dp::Ctrl::ADDRESS, ctrl.into())?;

        let mut powered = false;
        for _ in 0..self.settings.powerup_ack_reads {
            let stat = dp::Ctrl::from(self.bus.read(PortType::DebugPort, dp::Ctrl::ADDRESS)?);
            if stat.csyspwrupack() && stat.cdbgpwrupack() {
                powered = true;
                break;
            }
        }
        if !powered {
            tracing::warn!("power-up acknowledge timed out");
            return Err(ConnectError::PowerUpTimeout);
        }

        // Check that the designated AP is an APB Mem-AP before trusting it
        // with DMI traffic. AP reads are posted; the value arrives in RDBUF.
        self.select_ap_bank(ap::bank(ap::Idr::ADDRESS))?;
        self.bus.read(PortType::AccessPort, ap::Idr::ADDRESS)?;
        let idr = ap::Idr::from(self.bus.read(PortType::DebugPort, dp::RdBuff::ADDRESS)?);
        if !idr.is_apb_mem_ap() {
            tracing::warn!("bad {}: {:#010x}", ap::Idr::NAME, u32::from(idr.clone()));
            return Err(ConnectError::NoMemAp {
                apsel: self.apsel,
                idr: idr.into(),
            });
        }
        tracing::debug!("{} {:#010x}", ap::Idr::NAME, u32::from(idr));

        // Park SELECT on the CSW/TAR/DRW bank. The banked BD0-BD3 registers
        // are not used: the DM register map gains nothing from them and they
        // would cost extra bank switching.
        self.select_ap_bank(ap::bank(ap::Csw::ADDRESS))?;

        tracing::debug!("connected");
        Ok(())
    }

    /// Reads the DM register at word address `addr`.
    pub fn read(&mut self, addr: u8) -> Result<u32, DmiError> {
        // DM registers are word-indexed, the Mem-AP is byte-indexed.
        let byte_addr = u32::from(addr) << 2;
        self.set_tar(byte_addr)?;
        // The AP read is posted and returns the previous transfer's data;
        // the fresh value is collected from RDBUF.
        self.retried(|bus| bus.read(PortType::AccessPort, ap::Drw::ADDRESS))?;
        let value = self.retried(|bus| bus.read(PortType::DebugPort, dp::RdBuff::ADDRESS))?;
        tracing::debug!("DMI read  {addr:#04x} -> {value:#010x}");
        Ok(value)
    }

    /// Writes the DM register at word address `addr`.
    pub fn write(&mut self, addr: u8, value: u32) -> Result<(), DmiError> {
        let byte_addr = u32::from(addr) << 2;
        tracing::debug!("DMI write {addr:#04x} <- {value:#010x}");
        self.set_tar(byte_addr)?;
        self.retried(|bus| bus.write(PortType::AccessPort, ap::Drw::ADDRESS, value))
    }

    /// Points the Mem-AP TAR at `byte_addr` unless it already is.
    ///
    /// The cache holds across accesses because DRW auto-increment is never
    /// enabled; it is invalidated by connect.
    fn set_tar(&mut self, byte_addr: u32) -> Result<(), DmiError> {
        if self.tar_cache == Some(byte_addr) {
            tracing::trace!("{} cache hit ({byte_addr:#010x})", ap::Tar::NAME);
            return Ok(());
        }
        self.retried(|bus| bus.write(PortType::AccessPort, ap::Tar::ADDRESS, byte_addr))?;
        self.tar_cache = Some(byte_addr);
        Ok(())
    }

    /// Runs a steady-state transaction with the WAIT retry policy.
    ///
    /// ORUNDETECT mode latches a sticky overrun whenever the target answers
    /// WAIT, so every retry is preceded by an ABORT write clearing it. A
    /// FAULT clears the sticky flags the same way and then fails the access.
    /// ABORT decodes independently of the SELECT banking, so the retry path
    /// never disturbs the AP bank set up by connect.
    fn retried<T>(
        &mut self,
        mut op: impl FnMut(&mut SwdBus<P>) -> Result<T, DapError>,
    ) -> Result<T, DmiError> {
        for attempt in 0..=self.settings.dmi_wait_retries {
            match op(&mut self.bus) {
                Ok(value) => return Ok(value),
                Err(DapError::WaitResponse) => {
                    tracing::debug!("WAIT response, retrying (attempt {attempt})");
                    self.clear_sticky_flags()?;
                }
                Err(DapError::FaultResponse) => {
                    tracing::warn!("FAULT response");
                    self.clear_sticky_flags()?;
                    return Err(DapError::FaultResponse.into());
                }
                Err(other) => return Err(other.into()),
            }
        }
        Err(DmiError::WaitTimeout(self.settings.dmi_wait_retries))
    }

    /// Points DP SELECT at an AP register bank of the configured AP.
    fn select_ap_bank(&mut self, bank: u8) -> Result<(), DapError> {
        let mut select = dp::Select(0);
        select.set_ap_sel(self.apsel);
        select.set_ap_bank_sel(bank);
        self.bus
            .write(PortType::DebugPort, dp::Select::ADDRESS, select.into())
    }

    fn clear_sticky_flags(&mut self) -> Result<(), DapError> {
        let mut abort = dp::Abort(0);
        abort.set_orunerrclr(true);
        abort.set_stkerrclr(true);
        self.bus
            .write(PortType::DebugPort, dp::Abort::ADDRESS, abort.into())
    }
}
