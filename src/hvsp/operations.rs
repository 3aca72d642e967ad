use std::fmt;

use super::{
	BitLink,
	Line,
	LineBank,
	WaitPolicy,
};

// (data, instruction) pairs from the "High-voltage Serial Programming
// Instruction Set" table of the ATtiny13/x4/x5 data sheets
mod consts {
	// Instr.1: load command
	pub const LOAD_COMMAND: u8 = 0x4c;
	// Instr.2 of read signature: load address low byte
	pub const LOAD_ADDRESS_LOW: u8 = 0x0c;
	// Instr.2 of write fuse: load data low byte
	pub const LOAD_DATA_LOW: u8 = 0x2c;

	pub const CMD_READ_SIGNATURE: u8 = 0x08;
	pub const CMD_WRITE_FUSE: u8 = 0x40;
	pub const CMD_READ_FUSE: u8 = 0x04;
	pub const CMD_NO_OPERATION: u8 = 0x00;

	// read signature / read low fuse: Instr.3 and Instr.4 (SDO valid in Instr.4)
	pub const READ_LOW_ENABLE: u8 = 0x68;
	pub const READ_LOW_STROBE: u8 = 0x6c;

	// write pulse (Instr.3 / Instr.4) per fuse byte
	pub const WRITE_LOW_PULSE: [u8; 2] = [0x64, 0x6c];
	pub const WRITE_HIGH_PULSE: [u8; 2] = [0x74, 0x7c];
	pub const WRITE_EXTENDED_PULSE: [u8; 2] = [0x66, 0x6e];

	// read select / strobe per fuse byte
	pub const READ_FUSE_LOW: [u8; 2] = [READ_LOW_ENABLE, READ_LOW_STROBE];
	pub const READ_FUSE_HIGH: [u8; 2] = [0x7a, 0x7e];
	pub const READ_FUSE_EXTENDED: [u8; 2] = [0x6a, 0x6e];
}

use self::consts::*;

/// One of the (up to) three fuse bytes.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum FuseByte {
	Low,
	High,
	Extended,
}

impl FuseByte {
	pub const ALL: [FuseByte; 3] = [FuseByte::Low, FuseByte::High, FuseByte::Extended];

	pub fn index(self) -> usize {
		self as usize
	}

	// instructions of the write pulse
	pub fn write_pulse(self) -> [u8; 2] {
		match self {
			FuseByte::Low => WRITE_LOW_PULSE,
			FuseByte::High => WRITE_HIGH_PULSE,
			FuseByte::Extended => WRITE_EXTENDED_PULSE,
		}
	}

	// instructions selecting the byte and shifting it out
	pub fn read_select(self) -> [u8; 2] {
		match self {
			FuseByte::Low => READ_FUSE_LOW,
			FuseByte::High => READ_FUSE_HIGH,
			FuseByte::Extended => READ_FUSE_EXTENDED,
		}
	}
}

impl fmt::Display for FuseByte {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.write_str(match self {
			FuseByte::Low => "low",
			FuseByte::High => "high",
			FuseByte::Extended => "extended",
		})
	}
}

/// The HVSP instruction set on top of a line bank in programming mode.
pub struct Programmer<'a, L: LineBank + ?Sized, W: WaitPolicy + ?Sized> {
	lines: &'a mut L,
	wait: &'a mut W,
}

impl<'a, L: LineBank + ?Sized, W: WaitPolicy + ?Sized> Programmer<'a, L, W> {
	pub fn new(lines: &'a mut L, wait: &'a mut W) -> Self {
		Programmer { lines, wait }
	}

	/// Block until the target releases SDO high after an internal write.
	pub fn wait_for_ready(&mut self) -> crate::AResult<()> {
		let lines = &mut *self.lines;
		self.wait.wait_until(&mut || lines.get_level(Line::DataOut))
	}

	pub fn read_signature_byte(&mut self, index: u8) -> crate::AResult<u8> {
		assert!(index < 3);
		self.lines.transfer(CMD_READ_SIGNATURE, LOAD_COMMAND)?;
		self.lines.transfer(index, LOAD_ADDRESS_LOW)?;
		self.lines.transfer(0x00, READ_LOW_ENABLE)?;
		self.lines.transfer(0x00, READ_LOW_STROBE)
	}

	pub fn read_signature(&mut self) -> crate::AResult<[u8; 3]> {
		Ok([
			self.read_signature_byte(0)?,
			self.read_signature_byte(1)?,
			self.read_signature_byte(2)?,
		])
	}

	pub fn write_fuse(&mut self, fuse: FuseByte, value: u8) -> crate::AResult<()> {
		debug!("write {} fuse 0x{:02x}", fuse, value);
		let [pulse_start, pulse_end] = fuse.write_pulse();

		self.lines.transfer(CMD_WRITE_FUSE, LOAD_COMMAND)?;
		self.lines.transfer(value, LOAD_DATA_LOW)?;
		self.lines.transfer(0x00, pulse_start)?;
		self.lines.transfer(0x00, pulse_end)?;
		with_context!(("{} fuse write pulse", fuse), self.wait_for_ready())?;

		self.lines.transfer(CMD_NO_OPERATION, LOAD_COMMAND)?;
		with_context!(("{} fuse write completion", fuse), self.wait_for_ready())
	}

	pub fn read_fuse(&mut self, fuse: FuseByte) -> crate::AResult<u8> {
		let [select, strobe] = fuse.read_select();

		self.lines.transfer(CMD_READ_FUSE, LOAD_COMMAND)?;
		self.lines.transfer(0x00, select)?;
		let value = self.lines.transfer(0x00, strobe)?;
		debug!("read {} fuse 0x{:02x}", fuse, value);
		Ok(value)
	}

	pub fn write_fuse_low(&mut self, value: u8) -> crate::AResult<()> {
		self.write_fuse(FuseByte::Low, value)
	}

	pub fn write_fuse_high(&mut self, value: u8) -> crate::AResult<()> {
		self.write_fuse(FuseByte::High, value)
	}

	pub fn write_fuse_extended(&mut self, value: u8) -> crate::AResult<()> {
		self.write_fuse(FuseByte::Extended, value)
	}

	pub fn read_fuse_low(&mut self) -> crate::AResult<u8> {
		self.read_fuse(FuseByte::Low)
	}

	pub fn read_fuse_high(&mut self) -> crate::AResult<u8> {
		self.read_fuse(FuseByte::High)
	}

	pub fn read_fuse_extended(&mut self) -> crate::AResult<u8> {
		self.read_fuse(FuseByte::Extended)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::controller::enter_programming_mode;
	use crate::hvsp::{
		Bounded,
		ReadyTimeout,
		Unbounded,
		find_ready_timeout,
	};
	use crate::sim::SimulatedTarget;

	const ATTINY85: [u8; 3] = [0x1e, 0x93, 0x0b];

	fn target() -> SimulatedTarget {
		let mut sim = SimulatedTarget::new(ATTINY85, [0xe2, 0xdf, 0xff]);
		enter_programming_mode(&mut sim).unwrap();
		sim
	}

	#[test]
	fn read_signature_sequence() {
		let mut sim = target();
		let sig = Programmer::new(&mut sim, &mut Unbounded).read_signature().unwrap();
		assert_eq!(sig, ATTINY85);
		assert_eq!(&sim.frames()[..4], &[(0x08, 0x4c), (0x00, 0x0c), (0x00, 0x68), (0x00, 0x6c)]);
		assert_eq!(sim.frames()[5], (0x01, 0x0c));
		assert_eq!(sim.frames()[9], (0x02, 0x0c));
		assert!(sim.violations().is_empty());
	}

	#[test]
	fn write_fuse_sequences() {
		let expected: [(FuseByte, u8, [(u8, u8); 5]); 3] = [
			(FuseByte::Low, 0x62, [(0x40, 0x4c), (0x62, 0x2c), (0x00, 0x64), (0x00, 0x6c), (0x00, 0x4c)]),
			(FuseByte::High, 0xdf, [(0x40, 0x4c), (0xdf, 0x2c), (0x00, 0x74), (0x00, 0x7c), (0x00, 0x4c)]),
			(FuseByte::Extended, 0xff, [(0x40, 0x4c), (0xff, 0x2c), (0x00, 0x66), (0x00, 0x6e), (0x00, 0x4c)]),
		];
		for (fuse, value, frames) in expected.iter() {
			let mut sim = target();
			Programmer::new(&mut sim, &mut Unbounded).write_fuse(*fuse, *value).unwrap();
			assert_eq!(sim.frames(), &frames[..]);
			assert_eq!(sim.writes(), &[(*fuse, *value)]);
			assert_eq!(sim.fuse(*fuse), *value);
		}
	}

	#[test]
	fn read_fuse_sequences() {
		let expected = [
			(FuseByte::Low, [(0x04, 0x4c), (0x00, 0x68), (0x00, 0x6c)], 0xe2),
			(FuseByte::High, [(0x04, 0x4c), (0x00, 0x7a), (0x00, 0x7e)], 0xdf),
			(FuseByte::Extended, [(0x04, 0x4c), (0x00, 0x6a), (0x00, 0x6e)], 0xff),
		];
		for (fuse, frames, value) in expected.iter() {
			let mut sim = target();
			assert_eq!(Programmer::new(&mut sim, &mut Unbounded).read_fuse(*fuse).unwrap(), *value);
			assert_eq!(sim.frames(), &frames[..]);
			assert!(sim.writes().is_empty());
		}
	}

	#[test]
	fn named_operations_match_generic_ones() {
		let mut sim = target();
		{
			let mut wait = Unbounded;
			let mut prog = Programmer::new(&mut sim, &mut wait);
			prog.write_fuse_low(0x6a).unwrap();
			prog.write_fuse_high(0xfe).unwrap();
			prog.write_fuse_extended(0xfd).unwrap();
			assert_eq!(prog.read_fuse_low().unwrap(), 0x6a);
			assert_eq!(prog.read_fuse_high().unwrap(), 0xfe);
			assert_eq!(prog.read_fuse_extended().unwrap(), 0xfd);
		}
		assert_eq!(
			sim.writes(),
			&[(FuseByte::Low, 0x6a), (FuseByte::High, 0xfe), (FuseByte::Extended, 0xfd)]
		);
	}

	#[test]
	fn write_waits_for_busy_target() {
		let mut sim = target();
		sim.set_busy_polls(25);
		Programmer::new(&mut sim, &mut Unbounded).write_fuse(FuseByte::High, 0xdf).unwrap();
		assert_eq!(sim.busy_reads(), 25);
	}

	#[test]
	fn unresponsive_target_times_out_with_bounded_policy() {
		let mut sim = target();
		sim.set_unresponsive(true);
		let err = Programmer::new(&mut sim, &mut Bounded::new(100))
			.write_fuse(FuseByte::Low, 0x62)
			.unwrap_err();
		assert_eq!(find_ready_timeout(&err), Some(ReadyTimeout { polls: 100 }));
	}
}
