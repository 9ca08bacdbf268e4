//! Control surface
//!
//! A [`Session`] is the single entry point for requests from the protocol
//! layer. Every transfer is by value: buffers leave as [`Bytes`] copies and
//! enter as slices copied into the card buffer.

use std::sync::atomic::Ordering;
use std::time::Duration;

use bytes::Bytes;
use crossbeam_channel::Receiver;
use nexum_sim_core::engine::enter_mode;
use nexum_sim_core::registers::IntMask;
use nexum_sim_core::{
    Error, Mode, Notifications, ParityPolicy, PresenceEvent, ReaderStats, Register, RegisterBank,
    Result, TimerKind, TransactionMeta, timer,
};
use tracing::{debug, info};

use crate::driver::Shared;
use crate::platform::{Platform, VoltageLevel};
use crate::reader::Reader;

/// Exclusive control session over a [`SimDriver`](crate::SimDriver)
///
/// Closing (or dropping) the session releases the hardware claims taken at
/// open and lets the next caller open.
#[derive(Debug)]
pub struct Session<'a, B: RegisterBank, P: Platform> {
    shared: &'a Shared<B, P>,
}

impl<'a, B: RegisterBank, P: Platform> Session<'a, B, P> {
    pub(crate) const fn new(shared: &'a Shared<B, P>) -> Self {
        Self { shared }
    }

    fn reader(&self, index: usize) -> Result<&'a Reader<B>> {
        self.shared.reader(index)
    }

    /// Close the session
    pub fn close(self) {}

    /// Number of reader modules
    pub fn modules(&self) -> usize {
        self.shared.readers.len()
    }

    //
    // Platform delegation
    //

    /// Route the module's signals to the card slot
    pub fn configure_pins(&self, index: usize) -> Result<()> {
        self.reader(index)?;
        self.shared.platform.configure_pins(index)
    }

    /// Change the card supply from a voltage code
    pub fn set_voltage(&self, index: usize, code: u8) -> Result<()> {
        self.reader(index)?;
        let level = VoltageLevel::from_code(code)?;
        info!(reader = index, %level, "card supply change");
        self.shared.platform.set_voltage(index, level)
    }

    /// Frequency of the clock feeding the module
    pub fn peripheral_clock_hz(&self, index: usize) -> Result<u32> {
        self.reader(index)?;
        self.shared.platform.peripheral_clock_hz(index)
    }

    /// Enable the interrupt handlers of the module
    ///
    /// Until this is called both entry points return
    /// [`IrqReturn::NotAttached`](crate::IrqReturn::NotAttached). Attaching
    /// enables the NACK threshold and overrun sources and the presence
    /// interrupt; a presence change latched while detached is dropped.
    pub fn attach_interrupts(&self, index: usize) -> Result<()> {
        let reader = self.reader(index)?;
        if self.shared.is_shut_down() {
            return Err(Error::Shutdown);
        }
        let regs = reader.regs();
        regs.clear_presence_pending();
        regs.unmask_irq(IntMask::XTM | IntMask::OIM);
        regs.set_presence_masked(false);
        if !reader.set_attached(true) {
            debug!(reader = index, "interrupts attached");
        }
        Ok(())
    }

    //
    // Transaction state
    //

    /// Route the data interrupt to the engine of `mode` and program it
    pub fn set_mode(&self, index: usize, mode: Mode) -> Result<()> {
        let reader = self.reader(index)?;
        let mut ctx = reader.lock();
        enter_mode(&mut ctx, reader.regs(), mode);
        Ok(())
    }

    /// Current mode of the module
    pub fn mode(&self, index: usize) -> Result<Mode> {
        Ok(self.reader(index)?.lock().mode())
    }

    /// Change the parity handling of the receive engine
    pub fn set_parity_policy(&self, index: usize, policy: ParityPolicy) -> Result<()> {
        self.reader(index)?.lock().set_parity_policy(policy);
        Ok(())
    }

    /// Copy `len` bytes out of the card buffer starting at `offset`
    pub fn read_buffer(&self, index: usize, offset: usize, len: usize) -> Result<Bytes> {
        self.reader(index)?.lock().read_buffer(offset, len)
    }

    /// Copy `data` into the card buffer, resetting the cursors
    pub fn replace_buffer(&self, index: usize, data: &[u8]) -> Result<()> {
        self.reader(index)?.lock().replace_buffer(data)
    }

    /// Snapshot of cursors, lengths and error flag
    pub fn meta(&self, index: usize) -> Result<TransactionMeta> {
        Ok(self.reader(index)?.lock().meta())
    }

    /// Replace cursors, lengths and error flag
    pub fn set_meta(&self, index: usize, meta: TransactionMeta) -> Result<()> {
        self.reader(index)?.lock().set_meta(meta)
    }

    /// Queue `data` for transmission and switch to transmit mode
    ///
    /// Once the last byte left, the module switches to receive and expects
    /// `expected_rx` bytes in reply.
    pub fn stage_transmit(&self, index: usize, data: &[u8], expected_rx: usize) -> Result<()> {
        let reader = self.reader(index)?;
        let mut ctx = reader.lock();
        let capacity = ctx.capacity();
        if expected_rx > capacity {
            return Err(Error::LengthExceedsCapacity {
                len: expected_rx,
                capacity,
            });
        }
        ctx.reset_transaction();
        ctx.replace_buffer(data)?;
        ctx.expect(expected_rx)?;
        debug!(reader = index, len = data.len(), expected_rx, "transmit staged");
        enter_mode(&mut ctx, reader.regs(), Mode::Transmit);
        Ok(())
    }

    /// Prepare a reception of `expected` bytes from the start of the buffer
    pub fn stage_receive(&self, index: usize, mode: Mode, expected: usize) -> Result<()> {
        let reader = self.reader(index)?;
        let mut ctx = reader.lock();
        let capacity = ctx.capacity();
        if expected > capacity {
            return Err(Error::LengthExceedsCapacity {
                len: expected,
                capacity,
            });
        }
        ctx.reset_transaction();
        ctx.expect(expected)?;
        enter_mode(&mut ctx, reader.regs(), mode);
        Ok(())
    }

    /// Whether every queued byte has left the transmitter
    pub fn all_sent(&self, index: usize) -> Result<bool> {
        Ok(self.reader(index)?.lock().all_sent())
    }

    /// Clear the all-sent flag, returning its previous value
    pub fn clear_all_sent(&self, index: usize) -> Result<bool> {
        Ok(self.reader(index)?.lock().clear_all_sent())
    }

    /// Event counters of the module
    pub fn stats(&self, index: usize) -> Result<ReaderStats> {
        Ok(self.reader(index)?.lock().stats())
    }

    //
    // Timers
    //

    /// Arm a logical timeout of `ticks` on counter `kind`
    ///
    /// A zero timeout elapses at once.
    pub fn set_timeout(&self, index: usize, kind: TimerKind, ticks: u32) -> Result<()> {
        let reader = self.reader(index)?;
        let mut ctx = reader.lock();
        let notes = timer::arm(&mut ctx, reader.regs(), kind, ticks);
        self.shared.notifier.raise(notes);
        Ok(())
    }

    /// Residual logical ticks not yet loaded into counter `kind`
    pub fn timeout_remaining(&self, index: usize, kind: TimerKind) -> Result<u32> {
        Ok(self.reader(index)?.lock().remaining(kind))
    }

    /// Stop counter `kind` and drop its residual
    pub fn cancel_timeout(&self, index: usize, kind: TimerKind) -> Result<()> {
        let reader = self.reader(index)?;
        let mut ctx = reader.lock();
        timer::cancel(&mut ctx, reader.regs(), kind);
        Ok(())
    }

    //
    // Notifications
    //

    /// Read and clear every pending notification
    pub fn take_notifications(&self) -> Notifications {
        self.shared.notifier.take()
    }

    /// Block until a notification is pending, then read and clear all of them
    ///
    /// Fails with [`Error::Timeout`] when `timeout` elapses first. Without a
    /// timeout the call only returns on a notification.
    pub fn wait(&self, timeout: Option<Duration>) -> Result<Notifications> {
        self.wait_for(Notifications::all(), timeout)
    }

    /// Block until a notification in `interest` is pending, then read and
    /// clear those; other bits stay pending
    pub fn wait_for(
        &self,
        interest: Notifications,
        timeout: Option<Duration>,
    ) -> Result<Notifications> {
        if self.shared.is_shut_down() {
            return Err(Error::Shutdown);
        }
        let got = self.shared.notifier.wait_for(interest, timeout);
        if got.is_empty() { Err(Error::Timeout) } else { Ok(got) }
    }

    /// Read and clear the last debounced presence event of the module
    pub fn take_presence_event(&self, index: usize) -> Result<Option<PresenceEvent>> {
        Ok(self.shared.line(index)?.take_event())
    }

    /// Receive every future debounced presence event of the module
    pub fn subscribe_presence(&self, index: usize) -> Result<Receiver<PresenceEvent>> {
        Ok(self.shared.line(index)?.subscribe())
    }

    //
    // Raw register access
    //

    /// Read the register at byte `offset`
    pub fn read_register(&self, index: usize, offset: u32) -> Result<u32> {
        let reader = self.reader(index)?;
        let reg = register(offset)?;
        Ok(reader.regs().read(reg))
    }

    /// Read the bits of the register at `offset` selected by `mask`
    pub fn read_register_masked(&self, index: usize, offset: u32, mask: u32) -> Result<u32> {
        let reader = self.reader(index)?;
        let reg = register(offset)?;
        Ok(reader.regs().read_masked(reg, mask))
    }

    /// Write the register at byte `offset`
    ///
    /// A write to [`Register::XmtBuf`] also advances the module's cursor by
    /// one, saturating at the buffer capacity.
    pub fn write_register(&self, index: usize, offset: u32, value: u32) -> Result<()> {
        let reader = self.reader(index)?;
        let reg = register(offset)?;
        let mut ctx = reader.lock();
        reader.regs().write(reg, value);
        if reg == Register::XmtBuf {
            ctx.advance_cursor();
        }
        Ok(())
    }

    /// Replace the bits selected by `mask` in the register at `offset`
    ///
    /// Same cursor side effect as [`Self::write_register`].
    pub fn write_register_masked(
        &self,
        index: usize,
        offset: u32,
        mask: u32,
        value: u32,
    ) -> Result<()> {
        let reader = self.reader(index)?;
        let reg = register(offset)?;
        let mut ctx = reader.lock();
        reader.regs().write_masked(reg, mask, value);
        if reg == Register::XmtBuf {
            ctx.advance_cursor();
        }
        Ok(())
    }
}

impl<B: RegisterBank, P: Platform> Drop for Session<'_, B, P> {
    fn drop(&mut self) {
        for index in 0..self.shared.readers.len() {
            self.shared.platform.release(index);
        }
        self.shared.session_open.store(false, Ordering::Release);
        info!("session closed");
    }
}

fn register(offset: u32) -> Result<Register> {
    Register::from_offset(offset).ok_or(Error::InvalidRegister(offset))
}
