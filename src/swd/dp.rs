//! Debug port (SW-DP) register definitions.

use bitfield::bitfield;

/// A SW-DP register.
pub trait DpRegister: From<u32> + Into<u32> {
    /// The register's byte address; only A[3:2] go on the wire.
    const ADDRESS: u8;
    /// The register's name as in the ADI specification.
    const NAME: &'static str;
}

/// TARGETSEL shares the RDBUF address on the write path; it is only decoded
/// while the DP is in the reset state and is never acknowledged.
pub(crate) const TARGETSEL: u8 = 0xC;

bitfield! {
    /// The ABORT register: write-1-to-clear controls for the sticky error
    /// flags, plus DAPABORT.
    #[derive(Clone)]
    pub struct Abort(u32);
    impl Debug;
    /// Clear the STICKYORUN flag.
    pub _, set_orunerrclr: 4;
    /// Clear the WDATAERR flag.
    pub _, set_wderrclr: 3;
    /// Clear the STICKYERR flag.
    pub _, set_stkerrclr: 2;
    /// Clear the STICKYCMP flag.
    pub _, set_stkcmpclr: 1;
    /// Abort the current AP transaction.
    pub _, set_dapabort: 0;
}

impl From<u32> for Abort {
    fn from(raw: u32) -> Self {
        Abort(raw)
    }
}

impl From<Abort> for u32 {
    fn from(raw: Abort) -> Self {
        raw.0
    }
}

impl DpRegister for Abort {
    const ADDRESS: u8 = 0x0;
    const NAME: &'static str = "ABORT";
}

bitfield! {
    /// The CTRL/STAT register (DP bank 0).
    #[derive(Clone)]
    pub struct Ctrl(u32);
    impl Debug;
    /// System power-up acknowledge.
    pub csyspwrupack, _: 31;
    /// System power-up request.
    pub csyspwrupreq, set_csyspwrupreq: 30;
    /// Debug power-up acknowledge.
    pub cdbgpwrupack, _: 29;
    /// Debug power-up request.
    pub cdbgpwrupreq, set_cdbgpwrupreq: 28;
    /// Write data error flag.
    pub w_data_err, _: 7;
    /// Sticky error flag.
    pub sticky_err, _: 5;
    /// Sticky compare flag.
    pub sticky_cmp, _: 4;
    /// Sticky overrun flag.
    pub sticky_orun, _: 1;
    /// Overrun detection enable.
    pub orun_detect, set_orun_detect: 0;
}

impl From<u32> for Ctrl {
    fn from(raw: u32) -> Self {
        Ctrl(raw)
    }
}

impl From<Ctrl> for u32 {
    fn from(raw: Ctrl) -> Self {
        raw.0
    }
}

impl DpRegister for Ctrl {
    const ADDRESS: u8 = 0x4;
    const NAME: &'static str = "CTRL/STAT";
}

bitfield! {
    /// The SELECT register: AP selection and DP/AP register banking.
    #[derive(Clone)]
    pub struct Select(u32);
    impl Debug;
    /// The index of the selected access port.
    pub u8, ap_sel, set_ap_sel: 31, 24;
    /// The selected AP register bank (A[7:4] of the AP address).
    pub u8, ap_bank_sel, set_ap_bank_sel: 7, 4;
    /// The selected DP register bank.
    pub u8, dp_bank_sel, set_dp_bank_sel: 3, 0;
}

impl From<u32> for Select {
    fn from(raw: u32) -> Self {
        Select(raw)
    }
}

impl From<Select> for u32 {
    fn from(raw: Select) -> Self {
        raw.0
    }
}

impl DpRegister for Select {
    const ADDRESS: u8 = 0x8;
    const NAME: &'static str = "SELECT";
}

bitfield! {
    /// The DPIDR identification register.
    #[derive(Clone)]
    pub struct DPIDR(u32);
    impl Debug;
    /// Revision.
    pub u8, revision, _: 31, 28;
    /// Part number.
    pub u8, part_no, _: 27, 20;
    /// Minimal DP support.
    pub min, _: 16;
    /// DP architecture version.
    pub u8, version, _: 15, 12;
    /// JEP106 continuation code of the designer.
    pub u8, jep_cc, _: 11, 8;
    /// JEP106 identity code of the designer.
    pub u8, jep_id, _: 7, 1;
}

impl From<u32> for DPIDR {
    fn from(raw: u32) -> Self {
        DPIDR(raw)
    }
}

impl From<DPIDR> for u32 {
    fn from(raw: DPIDR) -> Self {
        raw.0
    }
}

impl DpRegister for DPIDR {
    const ADDRESS: u8 = 0x0;
    const NAME: &'static str = "DPIDR";
}

bitfield! {
    /// The RDBUF register: returns the result of the last posted AP read.
    #[derive(Clone)]
    pub struct RdBuff(u32);
    impl Debug;
    /// The captured AP read result.
    pub u32, data, _: 31, 0;
}

impl From<u32> for RdBuff {
    fn from(raw: u32) -> Self {
        RdBuff(raw)
    }
}

impl From<RdBuff> for u32 {
    fn from(raw: RdBuff) -> Self {
        raw.0
    }
}

impl DpRegister for RdBuff {
    const ADDRESS: u8 = 0xC;
    const NAME: &'static str = "RDBUF";
}
