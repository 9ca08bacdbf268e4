//! Register map and typed register access for the SIM block
//!
//! The block is driven through a [`RegisterBank`]: memory-mapped I/O on real
//! hardware, [`crate::emulator::EmulatedSim`] on the host. [`RegisterView`]
//! wraps a bank with the lock that serialises read-modify-write sequences,
//! since interrupt handlers, the presence task and raw control-surface
//! accesses all touch the same registers.

use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use parking_lot::Mutex;
use tracing::trace;

/// Registers of the SIM block, by byte offset
///
/// Offsets `0x14` and `0x34..=0x3C` belong to the unused second port and are
/// not part of the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Register {
    /// Port control (card clock, reset and voltage enable lines)
    PortCntl = 0x00,
    /// Port setup
    Setup = 0x04,
    /// Presence detect: mask, interrupt flag, raw pin, polarity
    PortDetect = 0x08,
    /// Transmit data
    ///
    /// Writes through the control surface also advance the reader's
    /// `write_cursor` by one.
    XmtBuf = 0x0C,
    /// Receive data; every read pops one entry from the receive FIFO
    RcvBuf = 0x10,
    /// General control
    Cntl = 0x18,
    /// Card clock prescaler
    ClkPrescaler = 0x1C,
    /// Receive threshold (RDT, RTH)
    RcvThreshold = 0x20,
    /// Receiver and transmitter enables
    Enable = 0x24,
    /// Transmit status, write-1-to-clear
    XmtStatus = 0x28,
    /// Receive status, write-1-to-clear
    RcvStatus = 0x2C,
    /// Interrupt mask; a set bit masks the source
    IntMask = 0x30,
    /// Data format
    DataFormat = 0x40,
    /// Transmit threshold (TDT, XTH)
    XmtThreshold = 0x44,
    /// Guard time
    GuardCntl = 0x48,
    /// Open drain configuration
    OdConfig = 0x4C,
    /// Reset control
    ResetCntl = 0x50,
    /// Character wait time counter load
    CharWait = 0x54,
    /// General purpose counter load
    Gpcnt = 0x58,
    /// Baud divisor
    Divisor = 0x5C,
    /// Block wait time
    Bwt = 0x60,
    /// Block guard time
    Bgt = 0x64,
    /// Block wait time, high half
    BwtH = 0x68,
    /// Transmit FIFO status
    XmtFifoStat = 0x6C,
    /// Receive FIFO fill level
    RcvFifoCnt = 0x70,
    /// Receive FIFO write pointer
    RcvFifoWptr = 0x74,
    /// Receive FIFO read pointer
    RcvFifoRptr = 0x78,
}

impl Register {
    /// Every register in offset order
    pub const ALL: [Self; 27] = [
        Self::PortCntl,
        Self::Setup,
        Self::PortDetect,
        Self::XmtBuf,
        Self::RcvBuf,
        Self::Cntl,
        Self::ClkPrescaler,
        Self::RcvThreshold,
        Self::Enable,
        Self::XmtStatus,
        Self::RcvStatus,
        Self::IntMask,
        Self::DataFormat,
        Self::XmtThreshold,
        Self::GuardCntl,
        Self::OdConfig,
        Self::ResetCntl,
        Self::CharWait,
        Self::Gpcnt,
        Self::Divisor,
        Self::Bwt,
        Self::Bgt,
        Self::BwtH,
        Self::XmtFifoStat,
        Self::RcvFifoCnt,
        Self::RcvFifoWptr,
        Self::RcvFifoRptr,
    ];

    /// Byte offset of the register
    pub const fn offset(self) -> u32 {
        self as u32
    }

    /// Look up a register by byte offset
    pub fn from_offset(offset: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|reg| reg.offset() == offset)
    }

    /// Bits of the register that are cleared by writing one
    ///
    /// Read-modify-write sequences must never write these back, or they
    /// would acknowledge events nobody has handled.
    pub const fn write_one_to_clear(self) -> u32 {
        match self {
            Self::XmtStatus => u32::MAX,
            Self::RcvStatus => u32::MAX,
            Self::PortDetect => PortDetect::SDI.bits(),
            _ => 0,
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}@{:#04x}", self, self.offset())
    }
}

bitflags! {
    /// RCV_STATUS bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RcvStatus: u32 {
        /// Receive FIFO overrun
        const OEF = 1 << 0;
        /// Receive FIFO holds data
        const RFD = 1 << 4;
        /// Receive FIFO reached the RDT threshold
        const RDRF = 1 << 5;
        /// Character wait time counter expired
        const CWT = 1 << 8;
        /// Receive NACK threshold reached
        const RTE = 1 << 9;
        /// Block wait time expired
        const BWT = 1 << 10;
        /// Block guard time violated
        const BGT = 1 << 11;
    }

    /// XMT_STATUS bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct XmtStatus: u32 {
        /// Transmit NACK threshold exceeded
        const XTE = 1 << 0;
        /// Transmit FIFO empty
        const TFE = 1 << 3;
        /// Early transmit complete: FIFO empty and last byte in the shifter
        const ETC = 1 << 4;
        /// Transmit complete
        const TC = 1 << 5;
        /// Transmit FIFO overflow
        const TFO = 1 << 6;
        /// Transmit FIFO at or below the TDT threshold
        const TDTF = 1 << 7;
        /// General purpose counter expired
        const GPCNT = 1 << 8;
    }

    /// INT_MASK bits; a set bit masks the interrupt source
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct IntMask: u32 {
        /// Receive data
        const RIM = 1 << 0;
        /// Transmit complete
        const TCIM = 1 << 1;
        /// Receive overrun
        const OIM = 1 << 2;
        /// Early transmit complete
        const ETCIM = 1 << 3;
        /// Transmit FIFO empty
        const TFEIM = 1 << 4;
        /// Transmit NACK threshold
        const XTM = 1 << 5;
        /// Transmit FIFO overflow
        const TFOM = 1 << 6;
        /// Transmit data threshold
        const TDTFM = 1 << 7;
        /// General purpose counter
        const GPCNTM = 1 << 8;
        /// Character wait time
        const CWTM = 1 << 9;
        /// Receive NACK threshold
        const RTM = 1 << 10;
        /// Block wait time
        const BWTM = 1 << 11;
        /// Block guard time
        const BGTM = 1 << 12;
        /// Receive FIFO empty
        const RFEM = 1 << 13;
    }

    /// PORT_DETECT bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PortDetect: u32 {
        /// Presence interrupt mask
        const SDIM = 1 << 0;
        /// Presence interrupt pending, write-1-to-clear
        const SDI = 1 << 1;
        /// Raw presence pin level
        const SPDP = 1 << 2;
        /// Presence pin polarity select
        const SPDS = 1 << 3;
    }

    /// CNTL single-bit fields
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Control: u32 {
        /// Inverse convention
        const ICM = 1 << 1;
        /// Automatic NACK on parity error
        const ANACK = 1 << 2;
        /// NACK on receive overrun
        const ONACK = 1 << 3;
        /// Character wait time counter enable
        const CWTEN = 1 << 11;
        /// Block wait time counter enable
        const BWTEN = 1 << 15;
    }

    /// ENABLE bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Enable: u32 {
        /// Receiver enable
        const RCV_EN = 1 << 0;
        /// Transmitter enable
        const XMT_EN = 1 << 1;
    }

    /// Flag bits of an RCV_BUF entry
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RcvBufFlags: u32 {
        /// Parity error on this character
        const PE = 1 << 8;
        /// Framing error on this character
        const FE = 1 << 9;
        /// Character wait time expired before this character
        const CWT = 1 << 10;
    }
}

/// A multi-bit field inside a register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    shift: u32,
    width: u32,
}

impl Field {
    /// Create a field at `shift` spanning `width` bits
    pub const fn new(shift: u32, width: u32) -> Self {
        Self { shift, width }
    }

    /// Unshifted mask of the field
    pub const fn max(self) -> u32 {
        (1 << self.width) - 1
    }

    /// Shifted mask of the field
    pub const fn mask(self) -> u32 {
        self.max() << self.shift
    }

    /// Extract the field from a register value
    pub const fn get(self, reg: u32) -> u32 {
        (reg >> self.shift) & self.max()
    }

    /// Replace the field in a register value, truncating `value` to the width
    pub const fn set(self, reg: u32, value: u32) -> u32 {
        (reg & !self.mask()) | ((value & self.max()) << self.shift)
    }
}

/// GPCNT_CLK_SEL field of CNTL
pub const GPCNT_CLK_SEL: Field = Field::new(9, 2);
/// TDT field of XMT_THRESHOLD
pub const TDT: Field = Field::new(0, 4);
/// XTH (transmit NACK threshold) field of XMT_THRESHOLD
pub const XTH: Field = Field::new(4, 4);
/// RDT field of RCV_THRESHOLD
pub const RDT: Field = Field::new(0, 9);
/// RTH (receive NACK threshold) field of RCV_THRESHOLD
pub const RTH: Field = Field::new(9, 4);
/// Data field of an RCV_BUF entry
pub const RCV_DATA: Field = Field::new(0, 8);
/// Fill level field of RCV_FIFO_CNT
pub const RCV_CNT: Field = Field::new(0, 9);
/// Fill level field of XMT_FIFO_STAT
pub const XMT_CNT: Field = Field::new(8, 5);

/// Clock source of the general purpose counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum GpcntClock {
    /// Counter stopped
    Disabled = 0,
    /// Card clock
    CardClock = 1,
    /// Receive clock
    ReceiveClock = 2,
    /// Elementary time unit
    Etu = 3,
}

impl GpcntClock {
    const fn from_bits(bits: u32) -> Self {
        match bits & 0b11 {
            0 => Self::Disabled,
            1 => Self::CardClock,
            2 => Self::ReceiveClock,
            _ => Self::Etu,
        }
    }
}

/// One entry popped from the receive FIFO
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxByte {
    /// Character value
    pub data: u8,
    /// Parity error flagged by the receiver
    pub parity_error: bool,
}

impl RxByte {
    /// Decode a raw RCV_BUF value
    pub const fn from_raw(raw: u32) -> Self {
        Self {
            data: RCV_DATA.get(raw) as u8,
            parity_error: raw & RcvBufFlags::PE.bits() != 0,
        }
    }
}

/// Raw access to the register block of one reader module
///
/// Implementations perform single, indivisible accesses. Reading
/// [`Register::RcvBuf`] pops the receive FIFO and writing
/// [`Register::XmtBuf`] pushes the transmit FIFO.
pub trait RegisterBank: Send + Sync + fmt::Debug {
    /// Read a register
    fn read(&self, reg: Register) -> u32;

    /// Write a register
    fn write(&self, reg: Register, value: u32);
}

impl<T: RegisterBank + ?Sized> RegisterBank for Arc<T> {
    fn read(&self, reg: Register) -> u32 {
        (**self).read(reg)
    }

    fn write(&self, reg: Register, value: u32) {
        (**self).write(reg, value)
    }
}

impl<T: RegisterBank + ?Sized> RegisterBank for Box<T> {
    fn read(&self, reg: Register) -> u32 {
        (**self).read(reg)
    }

    fn write(&self, reg: Register, value: u32) {
        (**self).write(reg, value)
    }
}

/// Lock-protected, field-level view of a [`RegisterBank`]
pub struct RegisterView<B> {
    bank: B,
    lock: Mutex<()>,
}

impl<B: fmt::Debug> fmt::Debug for RegisterView<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterView")
            .field("bank", &self.bank)
            .field("locked", &self.lock.is_locked())
            .finish()
    }
}

impl<B: RegisterBank> RegisterView<B> {
    /// Wrap a register bank
    pub const fn new(bank: B) -> Self {
        Self {
            bank,
            lock: Mutex::new(()),
        }
    }

    /// Access the underlying bank
    pub const fn bank(&self) -> &B {
        &self.bank
    }

    /// Read a register
    pub fn read(&self, reg: Register) -> u32 {
        let _guard = self.lock.lock();
        let value = self.bank.read(reg);
        trace!(%reg, value = format_args!("{value:#010x}"), "read");
        value
    }

    /// Write a register
    pub fn write(&self, reg: Register, value: u32) {
        let _guard = self.lock.lock();
        trace!(%reg, value = format_args!("{value:#010x}"), "write");
        self.bank.write(reg, value);
    }

    /// Read-modify-write a register under the lock, returning the value written
    ///
    /// Write-1-to-clear bits read back as set are stripped before the write.
    pub fn modify(&self, reg: Register, f: impl FnOnce(u32) -> u32) -> u32 {
        let _guard = self.lock.lock();
        let current = self.bank.read(reg);
        let value = f(current) & !reg.write_one_to_clear();
        trace!(
            %reg,
            from = format_args!("{current:#010x}"),
            to = format_args!("{value:#010x}"),
            "modify"
        );
        self.bank.write(reg, value);
        value
    }

    /// Replace the bits selected by `mask` with those of `value`
    pub fn write_masked(&self, reg: Register, mask: u32, value: u32) -> u32 {
        self.modify(reg, |current| (current & !mask) | (value & mask))
    }

    /// Read the bits selected by `mask`
    pub fn read_masked(&self, reg: Register, mask: u32) -> u32 {
        self.read(reg) & mask
    }

    /// Current interrupt mask
    pub fn int_mask(&self) -> IntMask {
        IntMask::from_bits_retain(self.read(Register::IntMask))
    }

    /// Mask (disable) interrupt sources
    pub fn mask_irq(&self, irq: IntMask) {
        self.modify(Register::IntMask, |v| v | irq.bits());
    }

    /// Unmask (enable) interrupt sources
    pub fn unmask_irq(&self, irq: IntMask) {
        self.modify(Register::IntMask, |v| v & !irq.bits());
    }

    /// Receive status
    pub fn rcv_status(&self) -> RcvStatus {
        RcvStatus::from_bits_retain(self.read(Register::RcvStatus))
    }

    /// Acknowledge receive status bits
    pub fn clear_rcv_status(&self, bits: RcvStatus) {
        self.write(Register::RcvStatus, bits.bits());
    }

    /// Transmit status
    pub fn xmt_status(&self) -> XmtStatus {
        XmtStatus::from_bits_retain(self.read(Register::XmtStatus))
    }

    /// Acknowledge transmit status bits
    pub fn clear_xmt_status(&self, bits: XmtStatus) {
        self.write(Register::XmtStatus, bits.bits());
    }

    /// Bytes waiting in the receive FIFO
    pub fn rx_fifo_count(&self) -> u16 {
        RCV_CNT.get(self.read(Register::RcvFifoCnt)) as u16
    }

    /// Bytes waiting in the transmit FIFO
    pub fn tx_fifo_count(&self) -> u16 {
        XMT_CNT.get(self.read(Register::XmtFifoStat)) as u16
    }

    /// Pop one entry from the receive FIFO
    pub fn pop_rx(&self) -> RxByte {
        RxByte::from_raw(self.read(Register::RcvBuf))
    }

    /// Push one byte into the transmit FIFO
    pub fn push_tx(&self, byte: u8) {
        self.write(Register::XmtBuf, u32::from(byte));
    }

    /// Program the receive data threshold
    pub fn set_rx_threshold(&self, level: u16) {
        self.modify(Register::RcvThreshold, |v| RDT.set(v, u32::from(level)));
    }

    /// Current receive data threshold
    pub fn rx_threshold(&self) -> u16 {
        RDT.get(self.read(Register::RcvThreshold)) as u16
    }

    /// Program the transmit data threshold
    pub fn set_tx_threshold(&self, level: u8) {
        self.modify(Register::XmtThreshold, |v| TDT.set(v, u32::from(level)));
    }

    /// Current transmit data threshold
    pub fn tx_threshold(&self) -> u8 {
        TDT.get(self.read(Register::XmtThreshold)) as u8
    }

    /// Select the clock source of the general purpose counter
    pub fn set_gpcnt_clock(&self, clock: GpcntClock) {
        self.modify(Register::Cntl, |v| GPCNT_CLK_SEL.set(v, clock as u32));
    }

    /// Current clock source of the general purpose counter
    pub fn gpcnt_clock(&self) -> GpcntClock {
        GpcntClock::from_bits(GPCNT_CLK_SEL.get(self.read(Register::Cntl)))
    }

    /// Set or clear CNTL single-bit fields
    pub fn set_control(&self, bits: Control, on: bool) {
        self.modify(Register::Cntl, |v| {
            if on { v | bits.bits() } else { v & !bits.bits() }
        });
    }

    /// Enable or disable the receiver and transmitter
    pub fn set_enable(&self, bits: Enable, on: bool) {
        self.modify(Register::Enable, |v| {
            if on { v | bits.bits() } else { v & !bits.bits() }
        });
    }

    /// Presence detect register
    pub fn port_detect(&self) -> PortDetect {
        PortDetect::from_bits_retain(self.read(Register::PortDetect))
    }

    /// Raw presence pin level
    pub fn presence_pin(&self) -> bool {
        self.port_detect().contains(PortDetect::SPDP)
    }

    /// Mask or unmask the presence interrupt
    pub fn set_presence_masked(&self, masked: bool) {
        self.modify(Register::PortDetect, |v| {
            if masked {
                v | PortDetect::SDIM.bits()
            } else {
                v & !PortDetect::SDIM.bits()
            }
        });
    }

    /// Acknowledge a pending presence interrupt
    pub fn clear_presence_pending(&self) {
        let _guard = self.lock.lock();
        let current = self.bank.read(Register::PortDetect);
        self.bank.write(Register::PortDetect, current | PortDetect::SDI.bits());
    }
}
