//! The IEEE 1149.1 TAP controller state machine.

pub mod vdtm;

/// The sixteen states of the JTAG TAP controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TapState {
    /// Test-Logic-Reset: the TAP's reset state; IDCODE is selected.
    TestLogicReset,
    /// Run-Test/Idle.
    RunTestIdle,
    /// Select-DR-Scan.
    SelectDrScan,
    /// Capture-DR: the selected data register is loaded into the shifter.
    CaptureDr,
    /// Shift-DR: the shifter moves one bit per TCK cycle.
    ShiftDr,
    /// Exit1-DR.
    Exit1Dr,
    /// Pause-DR.
    PauseDr,
    /// Exit2-DR.
    Exit2Dr,
    /// Update-DR: the shifted value takes effect.
    UpdateDr,
    /// Select-IR-Scan.
    SelectIrScan,
    /// Capture-IR: the instruction register is loaded into the shifter.
    CaptureIr,
    /// Shift-IR.
    ShiftIr,
    /// Exit1-IR.
    Exit1Ir,
    /// Pause-IR.
    PauseIr,
    /// Exit2-IR.
    Exit2Ir,
    /// Update-IR: the shifted value becomes the instruction.
    UpdateIr,
}

impl TapState {
    /// The state entered on a rising TCK edge with the given TMS level.
    #[must_use]
    pub fn step(self, tms: bool) -> TapState {
        use TapState::*;
        match self {
            TestLogicReset => if tms { TestLogicReset } else { RunTestIdle },
            RunTestIdle => if tms { SelectDrScan } else { RunTestIdle },

            SelectDrScan => if tms { SelectIrScan } else { CaptureDr },
            CaptureDr => if tms { Exit1Dr } else { ShiftDr },
            ShiftDr => if tms { Exit1Dr } else { ShiftDr },
            Exit1Dr => if tms { UpdateDr } else { PauseDr },
            PauseDr => if tms { Exit2Dr } else { PauseDr },
            Exit2Dr => if tms { UpdateDr } else { ShiftDr },
            UpdateDr => if tms { SelectDrScan } else { RunTestIdle },

            SelectIrScan => if tms { TestLogicReset } else { CaptureIr },
            CaptureIr => if tms { Exit1Ir } else { ShiftIr },
            ShiftIr => if tms { Exit1Ir } else { ShiftIr },
            Exit1Ir => if tms { UpdateIr } else { PauseIr },
            PauseIr => if tms { Exit2Ir } else { PauseIr },
            Exit2Ir => if tms { UpdateIr } else { ShiftIr },
            UpdateIr => if tms { SelectDrScan } else { RunTestIdle },
        }
    }
}

#[cfg(test)]
mod test {
    use super::TapState::{self, *};

    const ALL_STATES: [TapState; 16] = [
        TestLogicReset,
        RunTestIdle,
        SelectDrScan,
        CaptureDr,
        ShiftDr,
        Exit1Dr,
        PauseDr,
        Exit2Dr,
        UpdateDr,
        SelectIrScan,
        CaptureIr,
        ShiftIr,
        Exit1Ir,
        PauseIr,
        Exit2Ir,
        UpdateIr,
    ];

    #[test]
    fn five_tms_ones_reset_from_any_state() {
        for start in ALL_STATES {
            let mut state = start;
            for _ in 0..5 {
                state = state.step(true);
            }
            assert_eq!(state, TestLogicReset, "from {start:?}");
        }
    }

    #[test]
    fn reset_self_loops_on_tms_high() {
        assert_eq!(TestLogicReset.step(true), TestLogicReset);
    }

    #[test]
    fn dr_scan_walk() {
        let mut state = RunTestIdle;
        for (tms, expected) in [
            (true, SelectDrScan),
            (false, CaptureDr),
            (false, ShiftDr),
            (false, ShiftDr),
            (true, Exit1Dr),
            (false, PauseDr),
            (false, PauseDr),
            (true, Exit2Dr),
            (false, ShiftDr),
            (true, Exit1Dr),
            (true, UpdateDr),
            (false, RunTestIdle),
        ] {
            state = state.step(tms);
            assert_eq!(state, expected);
        }
    }

    #[test]
    fn ir_scan_walk() {
        let mut state = RunTestIdle;
        for (tms, expected) in [
            (true, SelectDrScan),
            (true, SelectIrScan),
            (false, CaptureIr),
            (false, ShiftIr),
            (true, Exit1Ir),
            (false, PauseIr),
            (true, Exit2Ir),
            (true, UpdateIr),
            (true, SelectDrScan),
        ] {
            state = state.step(tms);
            assert_eq!(state, expected);
        }
    }
}
