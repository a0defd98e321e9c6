//! Mem-AP register definitions.
//!
//! AP register addresses are full byte addresses; bits [7:4] select the
//! bank through DP SELECT and bits [3:2] go on the wire.

use bitfield::bitfield;

/// A Mem-AP register.
pub trait ApRegister: From<u32> + Into<u32> {
    /// The register's full byte address.
    const ADDRESS: u8;
    /// The register's name as in the ADI specification.
    const NAME: &'static str;
}

/// The SELECT bank holding an AP register.
pub(crate) const fn bank(address: u8) -> u8 {
    address >> 4
}

bitfield! {
    /// The control and status word register (CSW).
    ///
    /// The bridge never reprograms it: the DMI only needs the reset
    /// configuration (32-bit accesses, no auto-increment), so only the
    /// register's bank matters for SELECT.
    #[derive(Clone)]
    pub struct Csw(u32);
    impl Debug;
    /// The address increment mode for DRW accesses.
    pub u8, addr_inc, _: 5, 4;
    /// The access size.
    pub u8, size, _: 2, 0;
}

impl From<u32> for Csw {
    fn from(raw: u32) -> Self {
        Csw(raw)
    }
}

impl From<Csw> for u32 {
    fn from(raw: Csw) -> Self {
        raw.0
    }
}

impl ApRegister for Csw {
    const ADDRESS: u8 = 0x00;
    const NAME: &'static str = "CSW";
}

bitfield! {
    /// The transfer address register (TAR): the bus address used by the
    /// next DRW access.
    #[derive(Clone)]
    pub struct Tar(u32);
    impl Debug;
    /// The transfer address.
    pub u32, address, set_address: 31, 0;
}

impl From<u32> for Tar {
    fn from(raw: u32) -> Self {
        Tar(raw)
    }
}

impl From<Tar> for u32 {
    fn from(raw: Tar) -> Self {
        raw.0
    }
}

impl ApRegister for Tar {
    const ADDRESS: u8 = 0x04;
    const NAME: &'static str = "TAR";
}

bitfield! {
    /// The data read/write register (DRW): accessing it performs the bus
    /// transfer at the address held in TAR.
    #[derive(Clone)]
    pub struct Drw(u32);
    impl Debug;
    /// The transferred data word.
    pub u32, data, set_data: 31, 0;
}

impl From<u32> for Drw {
    fn from(raw: u32) -> Self {
        Drw(raw)
    }
}

impl From<Drw> for u32 {
    fn from(raw: Drw) -> Self {
        raw.0
    }
}

impl ApRegister for Drw {
    const ADDRESS: u8 = 0x0C;
    const NAME: &'static str = "DRW";
}

bitfield! {
    /// The AP identification register.
    #[derive(Clone)]
    pub struct Idr(u32);
    impl Debug;
    /// Revision.
    pub u8, revision, _: 31, 28;
    /// JEP106 code of the designer.
    pub u16, designer, _: 27, 17;
    /// The AP class.
    pub u8, class, _: 16, 13;
    /// Variant of the AP implementation.
    pub u8, variant, _: 7, 4;
    /// The bus type this AP fronts.
    pub u8, ap_type, _: 3, 0;
}

/// IDR CLASS value of a Mem-AP.
const CLASS_MEM_AP: u8 = 0x8;

/// IDR TYPE value of an APB2/APB3 Mem-AP.
const TYPE_APB: u8 = 0x2;

impl Idr {
    /// Whether this AP is the APB Mem-AP a RISC-V Debug Module sits behind.
    pub fn is_apb_mem_ap(&self) -> bool {
        self.class() == CLASS_MEM_AP && self.ap_type() == TYPE_APB
    }
}

impl From<u32> for Idr {
    fn from(raw: u32) -> Self {
        Idr(raw)
    }
}

impl From<Idr> for u32 {
    fn from(raw: Idr) -> Self {
        raw.0
    }
}

impl ApRegister for Idr {
    const ADDRESS: u8 = 0xFC;
    const NAME: &'static str = "IDR";
}
