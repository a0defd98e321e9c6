//! Word addresses of the 0.13.2 RISC-V Debug Module registers.
//!
//! The semantics of these registers live above this crate; the constants
//! are provided so that callers and tests can name what they poke over the
//! DMI.

/// Abstract command data 0.
pub const DATA0: u8 = 0x04;
/// Debug module control.
pub const DMCONTROL: u8 = 0x10;
/// Debug module status.
pub const DMSTATUS: u8 = 0x11;
/// Hart info.
pub const HARTINFO: u8 = 0x12;
/// Halt summary 1.
pub const HALTSUM1: u8 = 0x13;
/// Hart array window select.
pub const HAWINDOWSEL: u8 = 0x14;
/// Hart array window.
pub const HAWINDOW: u8 = 0x15;
/// Abstract control and status.
pub const ABSTRACTCS: u8 = 0x16;
/// Abstract command.
pub const COMMAND: u8 = 0x17;
/// Abstract command autoexec.
pub const ABSTRACTAUTO: u8 = 0x18;
/// Configuration string pointer 0.
pub const CONFSTRPTR0: u8 = 0x19;
/// Configuration string pointer 1.
pub const CONFSTRPTR1: u8 = 0x1A;
/// Configuration string pointer 2.
pub const CONFSTRPTR2: u8 = 0x1B;
/// Configuration string pointer 3.
pub const CONFSTRPTR3: u8 = 0x1C;
/// Next debug module.
pub const NEXTDM: u8 = 0x1D;
/// Program buffer 0.
pub const PROGBUF0: u8 = 0x20;
/// Program buffer 1.
pub const PROGBUF1: u8 = 0x21;
/// System bus access control and status.
pub const SBCS: u8 = 0x38;
/// System bus address 31:0.
pub const SBADDRESS0: u8 = 0x39;
/// System bus data 31:0.
pub const SBDATA0: u8 = 0x3C;
/// Halt summary 0.
pub const HALTSUM0: u8 = 0x40;
