//! Bridge a JTAG-speaking RISC-V debugger onto a target whose Debug Module is
//! only reachable through an ARM Serial Wire Debug port.
//!
//! Some mixed-architecture chips put a RISC-V core (with a standard 0.13.2
//! Debug Module) behind an ARM debug infrastructure: the DM registers appear
//! as an APB peripheral behind a Mem-AP, and the only wire into the chip is
//! SWD. Standard RISC-V debuggers, on the other hand, expect to talk JTAG to
//! a Debug Transport Module. This crate connects the two worlds:
//!
//! ```text
//! host JTAG bits -> [VirtualDtm] -> DMI op -> [SwdDmi] -> SW-DP/Mem-AP -> DM
//! ```
//!
//! [`VirtualDtm`] is a bit-accurate emulation of the JTAG DTM from the RISC-V
//! External Debug Support specification (v0.13.2): it consumes raw
//! TCK/TMS/TDI edges, models the sixteen-state TAP controller and the
//! IDCODE/DTMCS/DMI data registers, and reports each DMI access through a
//! pair of callbacks.
//!
//! [`SwdDmi`] is a small SWD host: it brings the Serial Wire link up from
//! dormant, powers the debug domains, identifies the APB Mem-AP, and then
//! maps word-addressed DMI reads and writes onto Mem-AP TAR/DRW traffic.
//! The two SWD pins are driven through the [`SwdPins`] trait, so the crate
//! runs unchanged on anything from a bit-banged GPIO pair to the simulated
//! target in [`fake_dap`].
//!
//! ```
//! use dtm_bridge::{fake_dap::FakeDap, dm, SwdDmi};
//!
//! let mut target = FakeDap::new();
//! target.set_dm_register(dm::DMSTATUS, 0x0000_0c82);
//!
//! let mut dmi = SwdDmi::new(target, 0, 0);
//! dmi.connect()?;
//! assert_eq!(dmi.read(dm::DMSTATUS)?, 0x0000_0c82);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! The USB or CMSIS-DAP endpoint that produces the JTAG bit stream, the GPIO
//! back end behind [`SwdPins`], and the Debug Module register semantics above
//! the DMI are all out of scope; this crate is the protocol plumbing in
//! between.

#![warn(missing_docs)]

pub mod bitbang;
pub mod dm;
pub mod dmi;
pub mod fake_dap;
pub mod jtag;
pub mod swd;

pub use crate::bitbang::SwdPins;
pub use crate::dmi::{ConnectError, DmiError, DmiSettings, SwdDmi};
pub use crate::jtag::vdtm::VirtualDtm;
pub use crate::jtag::TapState;
pub use crate::swd::DapError;
