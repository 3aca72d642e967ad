use std::time::Duration;

use super::{
	Line,
	LineBank,
};

// The minimum SCI high time during HVSP is 220 ns.
pub const CLOCK_HIGH: Duration = Duration::from_micros(1);

pub trait BitLink: LineBank {
	// SCI up, hold, SCI down. The target samples SDI/SII on the rising edge.
	fn clock_pulse(&mut self) -> crate::AResult<()> {
		self.set_level(Line::Clock, true)?;
		self.delay(CLOCK_HIGH);
		self.set_level(Line::Clock, false)
	}

	/// Send one data and one instruction byte, most significant bit first,
	/// and return the byte shifted out on SDO in the same frame.
	///
	/// A frame is 11 clock cycles: a zero start bit, 8 payload bits and two
	/// trailing zero bits.
	fn transfer(&mut self, data: u8, instruction: u8) -> crate::AResult<u8> {
		let mut data_bits = data;
		let mut instruction_bits = instruction;
		let mut reply = 0u8;

		// first bit is zero
		self.set_level(Line::DataIn, false)?;
		self.set_level(Line::InstructionIn, false)?;
		self.clock_pulse()?;

		for _ in 0..8 {
			reply <<= 1;
			if self.get_level(Line::DataOut)? {
				reply |= 1;
			}

			self.set_level(Line::DataIn, 0 != data_bits & 0x80)?;
			self.set_level(Line::InstructionIn, 0 != instruction_bits & 0x80)?;
			self.clock_pulse()?;

			data_bits <<= 1;
			instruction_bits <<= 1;
		}

		// last two bits are zero
		self.set_level(Line::DataIn, false)?;
		self.set_level(Line::InstructionIn, false)?;
		self.clock_pulse()?;
		self.clock_pulse()?;

		trace!("transfer data=0x{:02x} instruction=0x{:02x} -> 0x{:02x}", data, instruction, reply);
		Ok(reply)
	}
}

impl<L: LineBank + ?Sized> BitLink for L {
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::hvsp::Direction;

	// records what is on SDI/SII at every rising clock edge and replays a
	// fixed SDO bit sequence
	struct Recorder {
		levels: [bool; 6],
		sdo: Vec<bool>,
		sampled: usize,
		edges: Vec<(bool, bool)>,
		delayed: Duration,
	}

	impl Recorder {
		fn new(sdo: &[bool]) -> Self {
			Recorder {
				levels: [false; 6],
				sdo: sdo.to_vec(),
				sampled: 0,
				edges: Vec::new(),
				delayed: Duration::from_secs(0),
			}
		}
	}

	impl LineBank for Recorder {
		fn set_direction(&mut self, _line: Line, _direction: Direction) -> crate::AResult<()> {
			Ok(())
		}

		fn set_level(&mut self, line: Line, high: bool) -> crate::AResult<()> {
			if line == Line::Clock && high && !self.levels[line.index()] {
				self.edges.push((
					self.levels[Line::DataIn.index()],
					self.levels[Line::InstructionIn.index()],
				));
			}
			self.levels[line.index()] = high;
			Ok(())
		}

		fn get_level(&mut self, line: Line) -> crate::AResult<bool> {
			assert_eq!(line, Line::DataOut);
			let bit = self.sdo[self.sampled % self.sdo.len()];
			self.sampled += 1;
			Ok(bit)
		}

		fn delay(&mut self, duration: Duration) {
			self.delayed += duration;
		}
	}

	fn byte_from_edges(edges: &[(bool, bool)], pick: fn(&(bool, bool)) -> bool) -> u8 {
		edges.iter().fold(0u8, |acc, e| (acc << 1) | pick(e) as u8)
	}

	#[test]
	fn frame_has_eleven_pulses() {
		for &(data, instruction) in &[(0x00, 0x00), (0xff, 0xff), (0x08, 0x4c), (0xa5, 0x5a)] {
			let mut rec = Recorder::new(&[false]);
			rec.transfer(data, instruction).unwrap();
			assert_eq!(rec.edges.len(), 11);
			assert_eq!(rec.delayed, CLOCK_HIGH * 11);
			assert!(!rec.levels[Line::Clock.index()]);
		}
	}

	#[test]
	fn drives_bytes_msb_first_with_zero_framing() {
		let mut rec = Recorder::new(&[false]);
		rec.transfer(0x62, 0x2c).unwrap();

		assert_eq!(rec.edges[0], (false, false));
		assert_eq!(rec.edges[9], (false, false));
		assert_eq!(rec.edges[10], (false, false));
		assert_eq!(byte_from_edges(&rec.edges[1..9], |e| e.0), 0x62);
		assert_eq!(byte_from_edges(&rec.edges[1..9], |e| e.1), 0x2c);
	}

	#[test]
	fn reply_is_sampled_msb_first() {
		let bits = [true, false, false, true, true, true, false, true];
		for &(data, instruction) in &[(0x00, 0x00), (0xff, 0x6c), (0x40, 0x4c)] {
			let mut rec = Recorder::new(&bits);
			assert_eq!(rec.transfer(data, instruction).unwrap(), 0b1001_1101);
			assert_eq!(rec.sampled, 8);
		}
	}
}
