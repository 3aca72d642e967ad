use gpiocdev::line::Offset;

use crate::hvsp::Line;

mod linux;

// OS-specific. for now linux only.
pub use self::linux::{
	GpioButton,
	GpioLed,
	GpioLineBank,
};

pub const DEFAULT_CHIP: &str = "/dev/gpiochip0";

// BCM numbering on a Raspberry Pi header
pub const DEFAULT_BUTTON: Offset = 5;
pub const DEFAULT_LED: Offset = 6;

/// GPIO line offsets of the six programming lines on one chip.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct PinMap {
	pub clock: Offset,
	pub data_in: Offset,
	pub instruction_in: Offset,
	pub data_out: Offset,
	pub target_power: Offset,
	pub high_voltage_reset: Offset,
}

impl Default for PinMap {
	fn default() -> Self {
		PinMap {
			data_in: 17,
			instruction_in: 27,
			data_out: 22,
			clock: 23,
			target_power: 24,
			high_voltage_reset: 25,
		}
	}
}

impl PinMap {
	pub fn offset(&self, line: Line) -> Offset {
		match line {
			Line::Clock => self.clock,
			Line::DataIn => self.data_in,
			Line::InstructionIn => self.instruction_in,
			Line::DataOut => self.data_out,
			Line::TargetPower => self.target_power,
			Line::HighVoltageReset => self.high_voltage_reset,
		}
	}

	pub fn set_offset(&mut self, line: Line, offset: Offset) {
		let slot = match line {
			Line::Clock => &mut self.clock,
			Line::DataIn => &mut self.data_in,
			Line::InstructionIn => &mut self.instruction_in,
			Line::DataOut => &mut self.data_out,
			Line::TargetPower => &mut self.target_power,
			Line::HighVoltageReset => &mut self.high_voltage_reset,
		};
		*slot = offset;
	}

	pub fn validate(&self) -> crate::AResult<()> {
		for (i, &a) in Line::ALL.iter().enumerate() {
			for &b in &Line::ALL[i + 1..] {
				ensure!(self.offset(a) != self.offset(b),
					"{} and {} both mapped to GPIO line {}", a, b, self.offset(a)
				);
			}
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn default_map_is_valid() {
		PinMap::default().validate().unwrap();
	}

	#[test]
	fn duplicate_offsets_are_rejected() {
		let mut pins = PinMap::default();
		pins.set_offset(Line::TargetPower, pins.clock);
		assert_eq!(pins.offset(Line::TargetPower), 23);
		let err = pins.validate().unwrap_err();
		assert!(err.to_string().contains("sci and vcc"));
	}
}
