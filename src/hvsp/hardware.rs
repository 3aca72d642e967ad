use std::fmt;
use std::thread;
use std::time::{
	Duration,
	Instant,
};

pub const LINE_COUNT: usize = 6;

/// The six lines between the programmer and the target socket.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Line {
	/// Serial Clock Input (SCI) on target
	Clock,
	/// Serial Data Input (SDI) on target, Prog_enable[0]
	DataIn,
	/// Serial Instruction Input (SII) on target, Prog_enable[1]
	InstructionIn,
	/// Serial Data Output (SDO) on target, Prog_enable[2]
	DataOut,
	/// VCC to target
	TargetPower,
	/// +12V to RESET on target; inverted by the driver transistor, so a low
	/// level applies the high voltage
	HighVoltageReset,
}

impl Line {
	pub const ALL: [Line; LINE_COUNT] = [
		Line::Clock,
		Line::DataIn,
		Line::InstructionIn,
		Line::DataOut,
		Line::TargetPower,
		Line::HighVoltageReset,
	];

	pub fn index(self) -> usize {
		self as usize
	}

	pub fn name(self) -> &'static str {
		match self {
			Line::Clock => "sci",
			Line::DataIn => "sdi",
			Line::InstructionIn => "sii",
			Line::DataOut => "sdo",
			Line::TargetPower => "vcc",
			Line::HighVoltageReset => "rst",
		}
	}
}

impl fmt::Display for Line {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.write_str(self.name())
	}
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Direction {
	Input,
	Output,
}

/// Spin until `duration` has passed.
///
/// The HVSP windows are a few microseconds; sleeping would hand the CPU to the
/// scheduler for much longer than that.
pub fn spin_wait(duration: Duration) {
	let start = Instant::now();
	while start.elapsed() < duration {
		std::hint::spin_loop();
	}
}

/// Sleep for at least `duration`, even if woken early.
pub fn reliable_sleep(mut duration: Duration) {
	loop {
		let now = Instant::now();
		thread::sleep(duration);
		let elapsed = now.elapsed();
		if elapsed >= duration {
			return;
		}
		duration -= elapsed;
	}
}

/// Exclusive access to the programming lines.
///
/// A level can be set on a line while it is an input; it takes effect once the
/// line is switched to output.
pub trait LineBank {
	fn set_direction(&mut self, line: Line, direction: Direction) -> crate::AResult<()>;
	fn set_level(&mut self, line: Line, high: bool) -> crate::AResult<()>;
	fn get_level(&mut self, line: Line) -> crate::AResult<bool>;

	// wait for (at least) `duration`
	fn delay(&mut self, duration: Duration) {
		spin_wait(duration);
	}
}

impl<'a, L: ?Sized + LineBank> LineBank for &'a mut L {
	fn set_direction(&mut self, line: Line, direction: Direction) -> crate::AResult<()> {
		L::set_direction(*self, line, direction)
	}
	fn set_level(&mut self, line: Line, high: bool) -> crate::AResult<()> {
		L::set_level(*self, line, high)
	}
	fn get_level(&mut self, line: Line) -> crate::AResult<bool> {
		L::get_level(*self, line)
	}
	fn delay(&mut self, duration: Duration) {
		L::delay(*self, duration)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn line_indices_match_table_order() {
		for (i, line) in Line::ALL.iter().enumerate() {
			assert_eq!(line.index(), i);
		}
	}

	#[test]
	fn spin_wait_waits_at_least_duration() {
		let start = Instant::now();
		spin_wait(Duration::from_micros(50));
		assert!(start.elapsed() >= Duration::from_micros(50));
	}
}
