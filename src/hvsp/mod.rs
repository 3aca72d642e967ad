//! High-voltage Serial Programming (HVSP) of ATtiny13, ATtiny24/44/84 and
//! ATtiny25/45/85.
//!
//! Four Prog_enable lines carry the protocol: SCI (clock), SDI (data in),
//! SII (instruction in) and SDO (data out); VCC and +12V on RESET are switched
//! by the programmer as well.
//!
//! Every instruction is one frame of 11 SCI cycles. SDI and SII are sampled
//! on the rising edge:
//! - Startbit: "0"
//! - 8 bits data (SDI) and instruction (SII), MSB first
//! - Two stop bits: "00"
//!
//! SDO shifts out a byte MSB first during the same frame; what it carries is
//! selected by earlier instructions. After a write pulse SDO stays low until
//! the internal write finished.

mod hardware;
mod low_level;
mod operations;
mod wait;

pub use self::hardware::{
	Direction,
	LINE_COUNT,
	Line,
	LineBank,
	reliable_sleep,
	spin_wait,
};

pub use self::low_level::{
	BitLink,
	CLOCK_HIGH,
};

pub use self::operations::{
	FuseByte,
	Programmer,
};

pub use self::wait::{
	Bounded,
	ReadyTimeout,
	Unbounded,
	WaitPolicy,
	find_ready_timeout,
};
