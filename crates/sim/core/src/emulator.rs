//! Host model of the SIM register block
//!
//! [`EmulatedSim`] implements [`RegisterBank`] with the side effects the
//! engines rely on: FIFOs behind `XMT_BUF`/`RCV_BUF`, write-1-to-clear status
//! latches, live FIFO level flags and the presence pin. The card side of the
//! wire is driven from tests and the CLI through the `card_*`, `shift_out`,
//! `expire` and `set_presence` methods.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use tracing::trace;

use crate::context::TimerKind;
use crate::limits::ModuleLimits;
use crate::registers::{
    IntMask, PortDetect, RDT, RcvBufFlags, RcvStatus, Register, RegisterBank, TDT, XMT_CNT,
    XmtStatus,
};

#[derive(Debug, Default)]
struct State {
    regs: HashMap<Register, u32>,
    rx_fifo: VecDeque<u32>,
    tx_fifo: VecDeque<u8>,
    shifted: Vec<u8>,
    rcv_latch: RcvStatus,
    xmt_latch: XmtStatus,
    presence_pending: bool,
    pin: bool,
    cwt_loads: Vec<u32>,
    gpcnt_loads: Vec<u32>,
}

impl State {
    fn plain(&self, reg: Register) -> u32 {
        self.regs.get(&reg).copied().unwrap_or_default()
    }

    fn int_mask(&self) -> IntMask {
        IntMask::from_bits_retain(self.plain(Register::IntMask))
    }
}

/// Emulated register block of one reader module
#[derive(Debug)]
pub struct EmulatedSim {
    limits: ModuleLimits,
    state: Mutex<State>,
}

impl EmulatedSim {
    /// Create a block in its reset state: every interrupt source masked, FIFOs
    /// empty, no card present
    pub fn new(limits: ModuleLimits) -> Self {
        let mut state = State::default();
        state.regs.insert(Register::IntMask, IntMask::all().bits());
        state
            .regs
            .insert(Register::PortDetect, PortDetect::SDIM.bits());
        Self {
            limits,
            state: Mutex::new(state),
        }
    }

    /// Limits the block was built with
    pub const fn limits(&self) -> &ModuleLimits {
        &self.limits
    }

    /// Card sends characters with good parity
    ///
    /// Characters arriving at a full receive FIFO are lost and latch OEF.
    pub fn card_send(&self, data: &[u8]) {
        let mut state = self.state.lock();
        for &byte in data {
            self.receive(&mut state, u32::from(byte));
        }
    }

    /// Card sends one character the receiver flags with a parity error
    pub fn card_send_with_parity_error(&self, byte: u8) {
        let mut state = self.state.lock();
        self.receive(&mut state, u32::from(byte) | RcvBufFlags::PE.bits());
    }

    fn receive(&self, state: &mut State, raw: u32) {
        if state.rx_fifo.len() >= usize::from(self.limits.rx_fifo_depth) {
            trace!(raw, "emulated rx overrun");
            state.rcv_latch |= RcvStatus::OEF;
        } else {
            state.rx_fifo.push_back(raw);
        }
    }

    /// Clock up to `n` characters out of the transmit FIFO towards the card
    ///
    /// Draining the last character latches ETC and TC.
    pub fn shift_out(&self, n: usize) -> Vec<u8> {
        let mut state = self.state.lock();
        let count = n.min(state.tx_fifo.len());
        let out: Vec<u8> = state.tx_fifo.drain(..count).collect();
        if count > 0 && state.tx_fifo.is_empty() {
            state.xmt_latch |= XmtStatus::ETC | XmtStatus::TC;
        }
        state.shifted.extend_from_slice(&out);
        out
    }

    /// Everything shifted out so far, clearing the record
    pub fn take_shifted(&self) -> Vec<u8> {
        std::mem::take(&mut self.state.lock().shifted)
    }

    /// Move the presence pin; a level change latches the presence interrupt
    pub fn set_presence(&self, present: bool) {
        let mut state = self.state.lock();
        if state.pin != present {
            state.pin = present;
            state.presence_pending = true;
        }
    }

    /// Hardware counter `kind` ran down to zero
    pub fn expire(&self, kind: TimerKind) {
        let mut state = self.state.lock();
        match kind {
            TimerKind::Cwt => state.rcv_latch |= RcvStatus::CWT,
            TimerKind::Gpcnt => state.xmt_latch |= XmtStatus::GPCNT,
        }
    }

    /// Card NACKed a character more often than XTH allows
    pub fn nack_threshold_exceeded(&self) {
        self.state.lock().xmt_latch |= XmtStatus::XTE;
    }

    /// Every value loaded into counter `kind`, oldest first
    pub fn loads(&self, kind: TimerKind) -> Vec<u32> {
        let state = self.state.lock();
        match kind {
            TimerKind::Cwt => state.cwt_loads.clone(),
            TimerKind::Gpcnt => state.gpcnt_loads.clone(),
        }
    }

    /// Whether an unmasked source of the data interrupt line is active
    pub fn data_irq_pending(&self) -> bool {
        let state = self.state.lock();
        let mask = state.int_mask();
        let rcv = self.rcv_status(&state);
        let xmt = self.xmt_status(&state);
        (rcv.contains(RcvStatus::RDRF) && !mask.contains(IntMask::RIM))
            || (xmt.contains(XmtStatus::ETC) && !mask.contains(IntMask::ETCIM))
            || (xmt.contains(XmtStatus::TDTF) && !mask.contains(IntMask::TDTFM))
    }

    /// Whether an unmasked source of the general interrupt line is active
    pub fn general_irq_pending(&self) -> bool {
        let state = self.state.lock();
        let mask = state.int_mask();
        let detect = PortDetect::from_bits_retain(state.plain(Register::PortDetect));
        (state.presence_pending && !detect.contains(PortDetect::SDIM))
            || (state.xmt_latch.contains(XmtStatus::XTE) && !mask.contains(IntMask::XTM))
            || (state.rcv_latch.contains(RcvStatus::OEF) && !mask.contains(IntMask::OIM))
            || (state.rcv_latch.contains(RcvStatus::CWT) && !mask.contains(IntMask::CWTM))
            || (state.xmt_latch.contains(XmtStatus::GPCNT) && !mask.contains(IntMask::GPCNTM))
    }

    fn rcv_status(&self, state: &State) -> RcvStatus {
        let mut status = state.rcv_latch;
        let level = state.rx_fifo.len();
        if level > 0 {
            status |= RcvStatus::RFD;
        }
        let threshold = RDT.get(state.plain(Register::RcvThreshold)).max(1) as usize;
        if level >= threshold {
            status |= RcvStatus::RDRF;
        }
        status
    }

    fn xmt_status(&self, state: &State) -> XmtStatus {
        let mut status = state.xmt_latch;
        let level = state.tx_fifo.len();
        if level == 0 {
            status |= XmtStatus::TFE;
        }
        if level <= TDT.get(state.plain(Register::XmtThreshold)) as usize {
            status |= XmtStatus::TDTF;
        }
        status
    }
}

impl RegisterBank for EmulatedSim {
    fn read(&self, reg: Register) -> u32 {
        let mut state = self.state.lock();
        match reg {
            Register::RcvBuf => state.rx_fifo.pop_front().unwrap_or_default(),
            Register::RcvFifoCnt => state.rx_fifo.len() as u32,
            Register::XmtFifoStat => XMT_CNT.set(0, state.tx_fifo.len() as u32),
            Register::RcvStatus => self.rcv_status(&state).bits(),
            Register::XmtStatus => self.xmt_status(&state).bits(),
            Register::PortDetect => {
                let mut value = state.plain(reg) & (PortDetect::SDIM | PortDetect::SPDS).bits();
                if state.presence_pending {
                    value |= PortDetect::SDI.bits();
                }
                if state.pin {
                    value |= PortDetect::SPDP.bits();
                }
                value
            }
            _ => state.plain(reg),
        }
    }

    fn write(&self, reg: Register, value: u32) {
        let mut state = self.state.lock();
        match reg {
            Register::XmtBuf => {
                if state.tx_fifo.len() >= usize::from(self.limits.tx_fifo_depth) {
                    state.xmt_latch |= XmtStatus::TFO;
                } else {
                    state.tx_fifo.push_back(value as u8);
                }
            }
            Register::RcvBuf | Register::RcvFifoCnt | Register::XmtFifoStat => {}
            Register::RcvStatus => state.rcv_latch.remove(RcvStatus::from_bits_retain(value)),
            Register::XmtStatus => state.xmt_latch.remove(XmtStatus::from_bits_retain(value)),
            Register::PortDetect => {
                if value & PortDetect::SDI.bits() != 0 {
                    state.presence_pending = false;
                }
                let kept = value & (PortDetect::SDIM | PortDetect::SPDS).bits();
                state.regs.insert(reg, kept);
            }
            Register::CharWait => {
                state.cwt_loads.push(value);
                state.regs.insert(reg, value);
            }
            Register::Gpcnt => {
                state.gpcnt_loads.push(value);
                state.regs.insert(reg, value);
            }
            _ => {
                state.regs.insert(reg, value);
            }
        }
    }
}
