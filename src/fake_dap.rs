//! A simulated SWD target for host-side testing.
//!
//! [`FakeDap`] models just enough of an SW-DP with a single APB Mem-AP in
//! front of a RISC-V Debug Module: line resets, TARGETSEL matching, the
//! power-up handshake, banked register access, and posted AP reads through
//! RDBUF. It implements [`SwdPins`], so anything written against the
//! bit-banged bus runs against it unchanged, one clock edge at a time.
//!
//! The model deliberately survives garbage: like a real DP it ignores
//! ill-formed requests and lets a line reset (fifty high bits followed by a
//! low one) cancel whatever it thought was in flight. That is what makes
//! the dormant wakeup sequence, which is noise from the SWD framing's point
//! of view, land the DP in a known state.

use std::collections::{HashMap, VecDeque};

use crate::bitbang::SwdPins;

const ACK_OK: u8 = 0b001;
const ACK_WAIT: u8 = 0b010;
const ACK_FAULT: u8 = 0b100;

/// High cycles needed before a low bit counts as a line reset.
const LINE_RESET_CYCLES: u32 = 50;

/// A decoded request header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Request {
    ap: bool,
    read: bool,
    /// A[3:2] as a byte address (0x0, 0x4, 0x8 or 0xC).
    addr: u8,
}

/// What to do with host data collected after the acknowledge.
#[derive(Clone, Copy, Debug)]
enum Commit {
    Write(Request),
    Targetsel,
}

/// The remainder of a transaction after its request was decoded.
#[derive(Debug)]
struct Transaction {
    /// The DP's wire plan, one entry per SWCLK cycle: `Some(level)` is a
    /// driven bit, `None` a cycle the DP leaves to the line (turnarounds
    /// and the dead cycles of TARGETSEL).
    drive: VecDeque<Option<bool>>,
    /// Host-driven bits (data + parity) to collect once `drive` is empty.
    capture: u8,
    captured: u64,
    capture_count: u8,
    commit: Option<Commit>,
}

/// A pin-level simulation of an SW-DP, an APB Mem-AP and a word-addressed
/// memory standing in for the Debug Module.
#[derive(Debug)]
pub struct FakeDap {
    // Wire state
    swclk: bool,
    host_driving: bool,
    host_level: bool,
    request: Option<(u8, u8)>,
    transaction: Option<Transaction>,
    high_run: u32,
    reset_armed: bool,

    // DP state
    targetsel: u32,
    selected: bool,
    dpidr: u32,
    select: u32,
    ctrl_stat: u32,
    rdbuff: u32,
    /// Stale value handed out directly by the next posted AP read.
    ap_result: u32,
    powerup_reads_left: u32,

    // AP state
    idr: u32,
    csw: u32,
    tar: u32,

    /// The Debug Module's registers, keyed by byte address.
    memory: HashMap<u32, u32>,

    // Fault injection
    pending_waits: u32,
    pending_faults: u32,

    // Bookkeeping for assertions
    line_resets: u32,
    tar_writes: u32,
    abort_writes: u32,
}

impl FakeDap {
    /// Creates a single-drop target that powers up on the second
    /// CTRL/STAT poll and fronts an APB Mem-AP.
    pub fn new() -> Self {
        Self {
            swclk: false,
            host_driving: false,
            host_level: false,
            request: None,
            transaction: None,
            high_run: 0,
            reset_armed: false,

            targetsel: 0,
            selected: false,
            dpidr: 0x2BA01477,
            select: 0,
            ctrl_stat: 0,
            rdbuff: 0,
            ap_result: 0,
            powerup_reads_left: 1,

            idr: 0x04770002,
            csw: 0,
            tar: 0,

            memory: HashMap::new(),

            pending_waits: 0,
            pending_faults: 0,

            line_resets: 0,
            tar_writes: 0,
            abort_writes: 0,
        }
    }

    /// Makes the target multi-drop: it deselects on line reset and answers
    /// only after a matching TARGETSEL.
    pub fn with_targetsel(mut self, targetsel: u32) -> Self {
        self.targetsel = targetsel;
        self
    }

    /// Number of CTRL/STAT reads before the power-up acknowledge appears.
    pub fn with_powerup_delay(mut self, reads: u32) -> Self {
        self.powerup_reads_left = reads;
        self
    }

    /// Overrides the AP identification register.
    pub fn with_idr(mut self, idr: u32) -> Self {
        self.idr = idr;
        self
    }

    /// Overrides the DP identification register.
    pub fn with_dpidr(mut self, dpidr: u32) -> Self {
        self.dpidr = dpidr;
        self
    }

    /// Answers the next `n` AP accesses with WAIT.
    pub fn inject_waits(&mut self, n: u32) {
        self.pending_waits = n;
    }

    /// Answers the next `n` AP accesses with FAULT.
    pub fn inject_faults(&mut self, n: u32) {
        self.pending_faults = n;
    }

    /// A Debug Module register, by word address.
    pub fn dm_register(&self, addr: u8) -> u32 {
        self.memory
            .get(&(u32::from(addr) << 2))
            .copied()
            .unwrap_or(0)
    }

    /// Presets a Debug Module register, by word address.
    pub fn set_dm_register(&mut self, addr: u8, value: u32) {
        self.memory.insert(u32::from(addr) << 2, value);
    }

    /// Whether this DP currently answers requests.
    pub fn selected(&self) -> bool {
        self.selected
    }

    /// The current DP SELECT value.
    pub fn select(&self) -> u32 {
        self.select
    }

    /// The current Mem-AP transfer address.
    pub fn tar(&self) -> u32 {
        self.tar
    }

    /// Completed line resets.
    pub fn line_resets(&self) -> u32 {
        self.line_resets
    }

    /// TAR writes that reached the AP.
    pub fn tar_writes(&self) -> u32 {
        self.tar_writes
    }

    /// ABORT writes that reached the DP.
    pub fn abort_writes(&self) -> u32 {
        self.abort_writes
    }

    fn rising_edge(&mut self) {
        // Line-reset detection runs on every host-driven cycle whatever the
        // protocol state; the wakeup sequence must be able to rescue a DP
        // that has misparsed part of it.
        if self.host_driving {
            if self.host_level {
                self.high_run += 1;
                if self.high_run >= LINE_RESET_CYCLES && !self.reset_armed {
                    self.reset_armed = true;
                    self.request = None;
                    self.transaction = None;
                }
            } else {
                if self.reset_armed {
                    self.line_reset();
                    self.reset_armed = false;
                }
                self.high_run = 0;
            }
        }

        if self.transaction.is_some() {
            self.transaction_edge();
            return;
        }

        // Request collection. Only host-driven bits are meaningful here;
        // a floating line between transactions is not a start bit.
        if !self.host_driving {
            return;
        }
        match self.request.take() {
            None => {
                if self.host_level && !self.reset_armed {
                    // Start bit seen
                    self.request = Some((1, 1));
                }
            }
            Some((bits, count)) => {
                let bits = bits | u8::from(self.host_level) << count;
                if count + 1 == 8 {
                    self.parse_request(bits);
                } else {
                    self.request = Some((bits, count + 1));
                }
            }
        }
    }

    fn transaction_edge(&mut self) {
        let host_driving = self.host_driving;
        let host_level = self.host_level;
        let mut done = false;

        if let Some(t) = self.transaction.as_mut() {
            if !t.drive.is_empty() {
                t.drive.pop_front();
                done = t.drive.is_empty() && t.capture == 0;
            } else {
                if host_driving {
                    t.captured |= u64::from(host_level) << t.capture_count;
                }
                t.capture_count += 1;
                done = t.capture_count == t.capture;
            }
        }

        if done {
            self.finish_transaction();
        }
    }

    fn parse_request(&mut self, bits: u8) {
        self.request = None;

        let ap = bits & 0b10 != 0;
        let read = bits & 0b100 != 0;
        let a = bits >> 3 & 0b11;
        let parity = bits >> 5 & 1;
        let stop = bits >> 6 & 1;
        let park = bits >> 7 & 1;
        let expected = (u8::from(ap) ^ u8::from(read) ^ (a & 1) ^ (a >> 1)) & 1;
        if stop != 0 || park != 1 || parity != expected {
            tracing::trace!("fake-dap: ill-formed request {bits:#04x}, ignoring");
            return;
        }

        self.start_transaction(Request {
            ap,
            read,
            addr: a << 2,
        });
    }

    fn start_transaction(&mut self, req: Request) {
        // A DP write to 0xC is TARGETSEL: decoded even while deselected,
        // never acknowledged.
        if !req.ap && !req.read && req.addr == 0xC {
            self.transaction = Some(Transaction {
                drive: VecDeque::from(vec![None; 5]),
                capture: 33,
                captured: 0,
                capture_count: 0,
                commit: Some(Commit::Targetsel),
            });
            return;
        }

        // A deselected DP is locked out until the next line reset.
        if !self.selected {
            tracing::trace!("fake-dap: deselected, ignoring {req:?}");
            return;
        }

        let ack = if req.ap && self.pending_waits > 0 {
            self.pending_waits -= 1;
            ACK_WAIT
        } else if req.ap && self.pending_faults > 0 {
            self.pending_faults -= 1;
            ACK_FAULT
        } else {
            ACK_OK
        };

        let mut drive: VecDeque<Option<bool>> = VecDeque::new();
        // Turnaround between request and acknowledge
        drive.push_back(None);
        for i in 0..3 {
            drive.push_back(Some(ack >> i & 1 != 0));
        }

        if req.read {
            // The host completes the data phase whatever the acknowledge
            // was; a non-OK answer just carries zeros.
            let value = if ack == ACK_OK { self.read_register(req) } else { 0 };
            for i in 0..32 {
                drive.push_back(Some(value >> i & 1 != 0));
            }
            drive.push_back(Some(value.count_ones() % 2 == 1));
            // Turnaround back to the host
            drive.push_back(None);
            self.transaction = Some(Transaction {
                drive,
                capture: 0,
                captured: 0,
                capture_count: 0,
                commit: None,
            });
        } else {
            // Turnaround before the host-driven data phase
            drive.push_back(None);
            self.transaction = Some(Transaction {
                drive,
                capture: 33,
                captured: 0,
                capture_count: 0,
                commit: (ack == ACK_OK).then_some(Commit::Write(req)),
            });
        }
    }

    fn finish_transaction(&mut self) {
        let Some(t) = self.transaction.take() else {
            return;
        };
        let Some(commit) = t.commit else {
            return;
        };

        let value = (t.captured & 0xFFFF_FFFF) as u32;
        let parity = t.captured >> 32 != 0;
        if parity != (value.count_ones() % 2 == 1) {
            tracing::trace!("fake-dap: bad write parity, dropping {value:#010x}");
            if matches!(commit, Commit::Targetsel) {
                self.selected = false;
            }
            return;
        }

        match commit {
            Commit::Write(req) => self.write_register(req, value),
            Commit::Targetsel => {
                self.selected = value == self.targetsel;
                tracing::debug!(
                    "fake-dap: TARGETSEL {value:#010x} -> {}",
                    if self.selected { "selected" } else { "deselected" }
                );
            }
        }
    }

    fn line_reset(&mut self) {
        self.line_resets += 1;
        self.request = None;
        self.transaction = None;
        // Multi-drop targets wait for TARGETSEL; single-drop ones answer
        // right away.
        self.selected = self.targetsel == 0;
        tracing::debug!("fake-dap: line reset");
    }

    /// The full AP byte address of a request under the current SELECT.
    fn ap_address(&self, req: Request) -> u8 {
        ((self.select >> 4 & 0xF) as u8) << 4 | req.addr
    }

    fn read_register(&mut self, req: Request) -> u32 {
        if req.ap {
            let address = self.ap_address(req);
            let fresh = match address {
                0x00 => self.csw,
                0x04 => self.tar,
                0x0C => self.memory.get(&self.tar).copied().unwrap_or(0),
                0xFC => self.idr,
                _ => 0,
            };
            // AP reads are posted: the response carries the previous
            // result, the fresh value lands in RDBUF.
            let stale = self.ap_result;
            self.ap_result = fresh;
            self.rdbuff = fresh;
            stale
        } else {
            match req.addr {
                0x0 => self.dpidr,
                0x4 => {
                    const REQ: u32 = 1 << 30 | 1 << 28;
                    const ACK: u32 = 1 << 31 | 1 << 29;
                    let mut value = self.ctrl_stat;
                    if value & REQ == REQ {
                        if self.powerup_reads_left == 0 {
                            value |= ACK;
                        } else {
                            self.powerup_reads_left -= 1;
                        }
                    }
                    value
                }
                0x8 => self.select,
                0xC => self.rdbuff,
                _ => 0,
            }
        }
    }

    fn write_register(&mut self, req: Request, value: u32) {
        if req.ap {
            let address = self.ap_address(req);
            match address {
                0x00 => self.csw = value,
                0x04 => {
                    self.tar = value;
                    self.tar_writes += 1;
                }
                0x0C => {
                    self.memory.insert(self.tar, value);
                }
                _ => {}
            }
        } else {
            match req.addr {
                0x0 => self.abort_writes += 1,
                0x4 => self.ctrl_stat = value,
                0x8 => self.select = value,
                _ => {}
            }
        }
    }
}

impl Default for FakeDap {
    fn default() -> Self {
        Self::new()
    }
}

impl SwdPins for FakeDap {
    fn set_swclk(&mut self, level: bool) {
        if level && !self.swclk {
            self.rising_edge();
        }
        self.swclk = level;
    }

    fn set_swdio(&mut self, level: bool) {
        self.host_level = level;
    }

    fn set_swdio_output(&mut self, output: bool) {
        self.host_driving = output;
    }

    fn swdio(&mut self) -> bool {
        // While the fake drives, present the front of its wire plan; an
        // undriven line floats high.
        match &self.transaction {
            Some(t) => match t.drive.front() {
                Some(Some(level)) => *level,
                _ => true,
            },
            None => true,
        }
    }

    fn half_period_delay(&mut self) {}
}
