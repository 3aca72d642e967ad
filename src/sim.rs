//! A simulated HVSP target for tests and dry runs.
//!
//! `SimulatedTarget` is a `LineBank` that behaves like an ATtiny in the socket:
//! it follows VCC and +12V on RESET, latches Prog_enable, decodes the 11-bit
//! frames on SDI/SII and answers on SDO. Time only advances through `delay`,
//! so timing violations of the host are detected without real waiting.

use std::time::Duration;

use crate::devices::DeviceRecord;
use crate::hvsp::{
	Direction,
	FuseByte,
	LINE_COUNT,
	Line,
	LineBank,
};

const VCC_TO_HIGH_VOLTAGE: Duration = Duration::from_micros(60);
const HIGH_VOLTAGE_TO_SDO_RELEASE: Duration = Duration::from_micros(10);
const SDO_RELEASE_TO_TRAFFIC: Duration = Duration::from_micros(300);
const RESET_RELEASE_TO_VCC_OFF: Duration = Duration::from_micros(10);

const FRAME_BITS: usize = 11;

/// Fuses of a part whose RESET pin was turned into I/O (RSTDISBL programmed).
pub const RESET_DISABLED_FUSES: [u8; 3] = [0x62, 0x5f, 0xff];

#[derive(Clone, Debug)]
pub struct SimulatedTarget {
	signature: [u8; 3],
	fuses: [u8; 3],
	has_extended_fuse: bool,
	stuck: [Option<u8>; 3],
	busy_polls: u32,
	unresponsive: bool,

	// electrical state as driven by the host
	directions: [Direction; LINE_COUNT],
	levels: [bool; LINE_COUNT],
	now: Duration,
	was_powered: bool,
	was_high_voltage: bool,
	powered_at: Option<Duration>,
	high_voltage_at: Option<Duration>,
	reset_released_at: Option<Duration>,
	sdo_released_at: Option<Duration>,
	latched: bool,
	programming: bool,

	// serial state
	bit: usize,
	sdi: u16,
	sii: u16,
	out_register: u8,
	out_shift: u8,
	command: u8,
	address: u8,
	data_latch: u8,
	last_instruction: u8,
	busy: u32,
	stalled: bool,

	// log
	frames: Vec<(u8, u8)>,
	writes: Vec<(FuseByte, u8)>,
	reads: Vec<FuseByte>,
	violations: Vec<String>,
	pulses: usize,
	busy_reads: u32,
	power_cycles: usize,
}

impl SimulatedTarget {
	pub fn new(signature: [u8; 3], fuses: [u8; 3]) -> Self {
		SimulatedTarget {
			signature,
			fuses,
			has_extended_fuse: true,
			stuck: [None; 3],
			busy_polls: 0,
			unresponsive: false,

			directions: [Direction::Input; LINE_COUNT],
			levels: [false; LINE_COUNT],
			now: Duration::from_secs(0),
			was_powered: false,
			was_high_voltage: false,
			powered_at: None,
			high_voltage_at: None,
			reset_released_at: None,
			sdo_released_at: None,
			latched: false,
			programming: false,

			bit: 0,
			sdi: 0,
			sii: 0,
			out_register: 0,
			out_shift: 0,
			command: 0,
			address: 0,
			data_latch: 0,
			last_instruction: 0,
			busy: 0,
			stalled: false,

			frames: Vec::new(),
			writes: Vec::new(),
			reads: Vec::new(),
			violations: Vec::new(),
			pulses: 0,
			busy_reads: 0,
			power_cycles: 0,
		}
	}

	/// A part from the device table with the given current fuses.
	pub fn from_record(record: &DeviceRecord, fuses: [u8; 3]) -> Self {
		let target = SimulatedTarget::new(record.signature.0, fuses);
		if record.fuse_extended == 0 {
			target.without_extended_fuse()
		} else {
			target
		}
	}

	// parts like the ATtiny13 only have low and high fuse bytes
	pub fn without_extended_fuse(mut self) -> Self {
		self.has_extended_fuse = false;
		self.fuses[FuseByte::Extended.index()] = 0xff;
		self
	}

	/// Make reads of `fuse` return `value` whatever was written.
	pub fn set_stuck(&mut self, fuse: FuseByte, value: Option<u8>) {
		self.stuck[fuse.index()] = value;
	}

	/// Number of SDO polls that read "busy" after each write pulse.
	pub fn set_busy_polls(&mut self, polls: u32) {
		self.busy_polls = polls;
	}

	/// Never finish a write pulse.
	pub fn set_unresponsive(&mut self, unresponsive: bool) {
		self.unresponsive = unresponsive;
	}

	pub fn fuse(&self, fuse: FuseByte) -> u8 {
		self.fuses[fuse.index()]
	}

	pub fn fuses(&self) -> [u8; 3] {
		self.fuses
	}

	pub fn frames(&self) -> &[(u8, u8)] {
		&self.frames
	}

	pub fn writes(&self) -> &[(FuseByte, u8)] {
		&self.writes
	}

	pub fn reads(&self) -> &[FuseByte] {
		&self.reads
	}

	pub fn violations(&self) -> &[String] {
		&self.violations
	}

	pub fn pulses(&self) -> usize {
		self.pulses
	}

	pub fn busy_reads(&self) -> u32 {
		self.busy_reads
	}

	pub fn power_cycles(&self) -> usize {
		self.power_cycles
	}

	pub fn now(&self) -> Duration {
		self.now
	}

	pub fn direction(&self, line: Line) -> Direction {
		self.directions[line.index()]
	}

	pub fn level(&self, line: Line) -> bool {
		self.levels[line.index()]
	}

	pub fn is_powered(&self) -> bool {
		self.driven(Line::TargetPower) && self.level(Line::TargetPower)
	}

	pub fn high_voltage_applied(&self) -> bool {
		self.is_powered() && self.driven(Line::HighVoltageReset) && !self.level(Line::HighVoltageReset)
	}

	pub fn in_programming_mode(&self) -> bool {
		self.programming
	}

	/// Forget frames, writes, reads and violations recorded so far.
	pub fn clear_log(&mut self) {
		self.frames.clear();
		self.writes.clear();
		self.reads.clear();
		self.violations.clear();
		self.pulses = 0;
		self.busy_reads = 0;
	}

	fn driven(&self, line: Line) -> bool {
		self.directions[line.index()] == Direction::Output
	}

	fn violation(&mut self, msg: String) {
		warn!("simulated target: {}", msg);
		self.violations.push(msg);
	}

	fn since(&self, t: Option<Duration>) -> Option<Duration> {
		t.map(|t| self.now - t)
	}

	fn reset_serial(&mut self) {
		self.bit = 0;
		self.sdi = 0;
		self.sii = 0;
		self.out_register = 0;
		self.out_shift = 0;
		self.command = 0;
		self.address = 0;
		self.data_latch = 0;
		self.last_instruction = 0;
		self.busy = 0;
		self.stalled = false;
	}

	// track VCC and +12V edges after every change of the host lines
	fn update_supply(&mut self) {
		let powered = self.is_powered();
		let high_voltage = self.high_voltage_applied();

		if powered && !self.was_powered {
			self.power_cycles += 1;
			self.powered_at = Some(self.now);
			self.reset_released_at = None;
			self.latched = false;
			self.programming = false;
			self.reset_serial();
		}

		if !powered && self.was_powered {
			if self.was_high_voltage {
				self.violation("VCC removed while +12V applied to RESET".into());
			} else if let Some(elapsed) = self.since(self.reset_released_at) {
				if elapsed < RESET_RELEASE_TO_VCC_OFF {
					self.violation(format!("VCC removed {:?} after RESET release", elapsed));
				}
			}
			self.powered_at = None;
		}

		if high_voltage && !self.was_high_voltage {
			match self.since(self.powered_at) {
				Some(elapsed) if elapsed >= VCC_TO_HIGH_VOLTAGE => (),
				elapsed => self.violation(format!("+12V applied {:?} after VCC", elapsed)),
			}
			let prog_enable_low = [Line::DataIn, Line::InstructionIn, Line::DataOut].iter()
				.all(|&line| self.driven(line) && !self.level(line));
			if prog_enable_low {
				self.latched = true;
			} else {
				self.violation("Prog_enable not 000 when +12V applied".into());
			}
			self.high_voltage_at = Some(self.now);
			self.sdo_released_at = None;
		}

		if !high_voltage && self.was_high_voltage {
			self.reset_released_at = Some(self.now);
			self.latched = false;
			self.programming = false;
		}

		self.was_powered = powered;
		self.was_high_voltage = high_voltage;
	}

	fn release_sdo(&mut self) {
		if !self.latched {
			return;
		}
		match self.since(self.high_voltage_at) {
			Some(elapsed) if elapsed >= HIGH_VOLTAGE_TO_SDO_RELEASE => (),
			elapsed => self.violation(format!("SDO released {:?} after +12V", elapsed)),
		}
		self.sdo_released_at = Some(self.now);
		self.programming = true;
	}

	fn clock_edge(&mut self) {
		self.pulses += 1;

		if !self.programming {
			self.violation("clock pulse outside programming mode".into());
			return;
		}
		if self.driven(Line::DataOut) {
			self.violation("SDO driven by host during serial traffic".into());
		}
		if let Some(elapsed) = self.since(self.sdo_released_at) {
			if elapsed < SDO_RELEASE_TO_TRAFFIC {
				self.violation(format!("serial traffic {:?} after SDO release", elapsed));
			}
		}

		self.sdi = (self.sdi << 1) | self.level(Line::DataIn) as u16;
		self.sii = (self.sii << 1) | self.level(Line::InstructionIn) as u16;

		if self.bit == 0 {
			self.out_shift = self.out_register;
		} else if self.bit < 8 {
			self.out_shift <<= 1;
		}

		self.bit += 1;
		if self.bit == FRAME_BITS {
			let (sdi, sii) = (self.sdi, self.sii);
			if sdi & 0x403 != 0 || sii & 0x403 != 0 {
				self.violation(format!("frame bits not zero: sdi={:011b} sii={:011b}", sdi, sii));
			}
			self.bit = 0;
			self.sdi = 0;
			self.sii = 0;
			self.execute((sdi >> 2) as u8, (sii >> 2) as u8);
		}
	}

	fn execute(&mut self, data: u8, instruction: u8) {
		self.frames.push((data, instruction));

		match instruction {
			0x4c => self.command = data,
			0x0c => self.address = data,
			0x2c => self.data_latch = data,
			0x68 if self.command == 0x08 => {
				self.out_register = self.signature.get(self.address as usize).cloned().unwrap_or(0xff);
			},
			0x68 if self.command == 0x04 => self.out_register = self.read_fuse(FuseByte::Low),
			0x7a if self.command == 0x04 => self.out_register = self.read_fuse(FuseByte::High),
			0x6a if self.command == 0x04 => self.out_register = self.read_fuse(FuseByte::Extended),
			0x6c if self.command == 0x40 && self.last_instruction == 0x64 => self.write_fuse(FuseByte::Low),
			0x7c if self.command == 0x40 && self.last_instruction == 0x74 => self.write_fuse(FuseByte::High),
			0x6e if self.command == 0x40 && self.last_instruction == 0x66 => self.write_fuse(FuseByte::Extended),
			_ => (),
		}
		self.last_instruction = instruction;
	}

	fn read_fuse(&mut self, fuse: FuseByte) -> u8 {
		self.reads.push(fuse);
		self.stuck[fuse.index()].unwrap_or(self.fuses[fuse.index()])
	}

	fn write_fuse(&mut self, fuse: FuseByte) {
		let value = self.data_latch;
		self.writes.push((fuse, value));
		if fuse == FuseByte::Extended && !self.has_extended_fuse {
			self.violation(format!("write of extended fuse 0x{:02x} on a part without one", value));
		} else {
			self.fuses[fuse.index()] = value;
		}

		if self.unresponsive {
			self.stalled = true;
		} else {
			self.busy = self.busy_polls;
		}
	}

	fn read_sdo(&mut self) -> bool {
		if !self.programming {
			return false;
		}
		if self.bit != 0 {
			return 0 != self.out_shift & 0x80;
		}
		// between frames SDO shows RDY/BSY
		if self.stalled {
			self.busy_reads += 1;
			return false;
		}
		if self.busy > 0 {
			self.busy -= 1;
			self.busy_reads += 1;
			return false;
		}
		true
	}
}

impl LineBank for SimulatedTarget {
	fn set_direction(&mut self, line: Line, direction: Direction) -> crate::AResult<()> {
		let previous = self.directions[line.index()];
		self.directions[line.index()] = direction;
		if line == Line::DataOut && previous == Direction::Output && direction == Direction::Input {
			self.release_sdo();
		}
		self.update_supply();
		Ok(())
	}

	fn set_level(&mut self, line: Line, high: bool) -> crate::AResult<()> {
		let previous = self.levels[line.index()];
		self.levels[line.index()] = high;
		if line == Line::Clock && high && !previous && self.driven(Line::Clock) {
			self.clock_edge();
		}
		self.update_supply();
		Ok(())
	}

	fn get_level(&mut self, line: Line) -> crate::AResult<bool> {
		if line != Line::DataOut {
			return Ok(self.level(line));
		}
		if self.driven(Line::DataOut) {
			self.violation("SDO read while driven by host".into());
			return Ok(self.level(line));
		}
		Ok(self.read_sdo())
	}

	fn delay(&mut self, duration: Duration) {
		self.now += duration;
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::controller::{
		enter_programming_mode,
		leave_programming_mode,
	};
	use crate::hvsp::{
		BitLink,
		Programmer,
		Unbounded,
	};

	const ATTINY45: [u8; 3] = [0x1e, 0x92, 0x06];

	#[test]
	fn standard_entry_and_exit_are_clean() {
		let mut sim = SimulatedTarget::new(ATTINY45, RESET_DISABLED_FUSES);
		enter_programming_mode(&mut sim).unwrap();
		assert!(sim.in_programming_mode());
		assert!(sim.high_voltage_applied());
		leave_programming_mode(&mut sim).unwrap();
		assert!(!sim.is_powered());
		assert!(!sim.high_voltage_applied());
		assert!(sim.level(Line::HighVoltageReset));
		assert!(sim.violations().is_empty(), "{:?}", sim.violations());
	}

	#[test]
	fn early_high_voltage_is_flagged() {
		let mut sim = SimulatedTarget::new(ATTINY45, RESET_DISABLED_FUSES);
		for &line in Line::ALL.iter() {
			sim.set_direction(line, Direction::Output).unwrap();
		}
		sim.set_level(Line::HighVoltageReset, true).unwrap();
		sim.set_level(Line::TargetPower, true).unwrap();
		sim.delay(Duration::from_micros(5));
		sim.set_level(Line::HighVoltageReset, false).unwrap();
		assert_eq!(sim.violations().len(), 1);
	}

	#[test]
	fn traffic_without_sdo_release_is_ignored() {
		let mut sim = SimulatedTarget::new(ATTINY45, RESET_DISABLED_FUSES);
		for &line in Line::ALL.iter() {
			sim.set_direction(line, Direction::Output).unwrap();
		}
		sim.set_level(Line::HighVoltageReset, true).unwrap();
		sim.set_level(Line::TargetPower, true).unwrap();
		sim.delay(Duration::from_micros(60));
		sim.set_level(Line::HighVoltageReset, false).unwrap();
		sim.delay(Duration::from_micros(400));

		sim.transfer(0x08, 0x4c).unwrap();
		assert!(sim.frames().is_empty());
		assert!(!sim.violations().is_empty());
	}

	#[test]
	fn prog_enable_must_be_low_when_latched() {
		let mut sim = SimulatedTarget::new(ATTINY45, RESET_DISABLED_FUSES);
		for &line in Line::ALL.iter() {
			sim.set_direction(line, Direction::Output).unwrap();
		}
		sim.set_level(Line::HighVoltageReset, true).unwrap();
		sim.set_level(Line::DataIn, true).unwrap();
		sim.set_level(Line::TargetPower, true).unwrap();
		sim.delay(Duration::from_micros(60));
		sim.set_level(Line::HighVoltageReset, false).unwrap();
		sim.delay(Duration::from_micros(20));
		sim.set_direction(Line::DataOut, Direction::Input).unwrap();
		assert!(!sim.in_programming_mode());
		assert_eq!(sim.violations().len(), 1);
	}

	#[test]
	fn power_off_under_high_voltage_is_flagged() {
		let mut sim = SimulatedTarget::new(ATTINY45, RESET_DISABLED_FUSES);
		enter_programming_mode(&mut sim).unwrap();
		sim.set_level(Line::TargetPower, false).unwrap();
		assert_eq!(sim.violations().len(), 1);
	}

	#[test]
	fn fuses_survive_power_cycles() {
		let mut sim = SimulatedTarget::new(ATTINY45, RESET_DISABLED_FUSES);
		enter_programming_mode(&mut sim).unwrap();
		Programmer::new(&mut sim, &mut Unbounded).write_fuse(FuseByte::High, 0xdf).unwrap();
		leave_programming_mode(&mut sim).unwrap();

		enter_programming_mode(&mut sim).unwrap();
		assert_eq!(Programmer::new(&mut sim, &mut Unbounded).read_fuse(FuseByte::High).unwrap(), 0xdf);
		leave_programming_mode(&mut sim).unwrap();
		assert_eq!(sim.power_cycles(), 2);
		assert!(sim.violations().is_empty(), "{:?}", sim.violations());
	}

	#[test]
	fn stuck_fuse_reads_back_stuck_value() {
		let mut sim = SimulatedTarget::new(ATTINY45, RESET_DISABLED_FUSES);
		sim.set_stuck(FuseByte::High, Some(0x5f));
		enter_programming_mode(&mut sim).unwrap();
		let mut wait = Unbounded;
		let mut programmer = Programmer::new(&mut sim, &mut wait);
		programmer.write_fuse(FuseByte::High, 0xdf).unwrap();
		assert_eq!(programmer.read_fuse(FuseByte::High).unwrap(), 0x5f);
	}

	#[test]
	fn missing_extended_fuse_reads_ff() {
		let mut sim = SimulatedTarget::new([0x1e, 0x90, 0x07], [0x6a, 0xff, 0x00]).without_extended_fuse();
		enter_programming_mode(&mut sim).unwrap();
		assert_eq!(Programmer::new(&mut sim, &mut Unbounded).read_fuse(FuseByte::Extended).unwrap(), 0xff);
	}
}
