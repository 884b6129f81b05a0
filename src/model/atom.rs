//! [`Atom`]: the smallest accountable unit of an observation's sequence.

/// Quality-assurance disposition of an executed atom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display, Default)]
pub enum QAState {
    #[default]
    None,
    Pass,
    Usable,
    Fail,
}

/// One atom of an observation's sequence: a unit of execution time split
/// into program and partner shares, with accumulators updated by
/// [`crate::accounting`] once a night's plan is finalized.
#[derive(Debug, Clone)]
pub struct Atom {
    pub exec_time: chrono::TimeDelta,
    pub prog_time: chrono::TimeDelta,
    pub part_time: chrono::TimeDelta,
    pub program_used: chrono::TimeDelta,
    pub partner_used: chrono::TimeDelta,
    pub not_charged: chrono::TimeDelta,
    pub observed: bool,
    pub qa_state: QAState,
}

impl Atom {
    #[must_use]
    pub fn new(exec_time: chrono::TimeDelta, prog_time: chrono::TimeDelta, part_time: chrono::TimeDelta) -> Self {
        Self {
            exec_time,
            prog_time,
            part_time,
            program_used: chrono::TimeDelta::zero(),
            partner_used: chrono::TimeDelta::zero(),
            not_charged: chrono::TimeDelta::zero(),
            observed: false,
            qa_state: QAState::None,
        }
    }

    /// Resets accumulators and observed/qa flags, used by validation-mode
    /// ingest (`spec.md` §6, mode `VALIDATION`).
    pub fn reset(&mut self) {
        self.program_used = chrono::TimeDelta::zero();
        self.partner_used = chrono::TimeDelta::zero();
        self.not_charged = chrono::TimeDelta::zero();
        self.observed = false;
        self.qa_state = QAState::None;
    }
}
