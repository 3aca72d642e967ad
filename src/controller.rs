use std::time::Duration;

use crate::devices::{
	self,
	DEVICES,
	DeviceRecord,
	Signature,
};
use crate::host::{
	Indicator,
	StartTrigger,
};
use crate::hvsp::{
	Direction,
	Line,
	LineBank,
	Programmer,
	WaitPolicy,
	reliable_sleep,
};
use crate::session::{
	FuseSet,
	Outcome,
	Session,
	State,
};

// Lower bounds from "High-voltage Serial Programming Algorithm"; longer is fine.

/// VCC up to +12V on RESET (data sheet: 20 - 60 us)
pub const POWER_SETTLE: Duration = Duration::from_micros(60);
/// keep Prog_enable unchanged after +12V so it gets latched (data sheet: 10 us)
pub const PROG_ENABLE_LATCH: Duration = Duration::from_micros(20);
/// SDO released to first instruction
pub const SDO_RELEASE_SETTLE: Duration = Duration::from_micros(300);
/// RESET back to 0V before VCC is switched off
pub const RESET_RELEASE_SETTLE: Duration = Duration::from_micros(10);

pub const START_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Put the target into HVSP mode.
pub fn enter_programming_mode<L: LineBank + ?Sized>(lines: &mut L) -> crate::AResult<()> {
	for &line in Line::ALL.iter() {
		lines.set_direction(line, Direction::Output)?;
	}

	// Prog_enable, RESET and VCC to 0V; the RESET driver inverts
	lines.set_level(Line::Clock, false)?;
	lines.set_level(Line::InstructionIn, false)?;
	lines.set_level(Line::DataIn, false)?;
	lines.set_level(Line::DataOut, false)?;
	lines.set_level(Line::HighVoltageReset, true)?;
	lines.set_level(Line::TargetPower, false)?;

	lines.set_level(Line::TargetPower, true)?;
	lines.delay(POWER_SETTLE);
	lines.set_level(Line::HighVoltageReset, false)?;
	lines.delay(PROG_ENABLE_LATCH);

	// avoid drive contention on Prog_enable[2] / SDO
	lines.set_direction(Line::DataOut, Direction::Input)?;
	lines.delay(SDO_RELEASE_SETTLE);

	Ok(())
}

/// Leave HVSP mode and power the target down.
///
/// Every step is attempted even if an earlier one failed; the first error is
/// returned.
pub fn leave_programming_mode<L: LineBank + ?Sized>(lines: &mut L) -> crate::AResult<()> {
	let mut first_error = None;
	let mut keep = |result: crate::AResult<()>| {
		if let Err(e) = result {
			error!("power down: {}", e);
			first_error.get_or_insert(e);
		}
	};

	keep(lines.set_level(Line::Clock, false));
	keep(lines.set_level(Line::InstructionIn, false));
	keep(lines.set_level(Line::DataIn, false));
	keep(lines.set_level(Line::HighVoltageReset, true));
	lines.delay(RESET_RELEASE_SETTLE);
	keep(lines.set_level(Line::TargetPower, false));

	match first_error {
		None => Ok(()),
		Some(e) => Err(e),
	}
}

/// Runs the restore procedure on the lines it owns.
pub struct Controller<L: LineBank, W: WaitPolicy> {
	lines: L,
	wait: W,
	devices: &'static [DeviceRecord],
}

impl<L: LineBank, W: WaitPolicy> Controller<L, W> {
	pub fn new(lines: L, wait: W) -> Self {
		Controller::with_devices(lines, wait, &DEVICES)
	}

	pub fn with_devices(lines: L, wait: W, devices: &'static [DeviceRecord]) -> Self {
		Controller {
			lines,
			wait,
			devices,
		}
	}

	pub fn lines(&self) -> &L {
		&self.lines
	}

	pub fn lines_mut(&mut self) -> &mut L {
		&mut self.lines
	}

	pub fn into_lines(self) -> L {
		self.lines
	}

	fn programmer(&mut self) -> Programmer<'_, L, W> {
		Programmer::new(&mut self.lines, &mut self.wait)
	}

	/// One run from PowerUp to Report; returns the finished session.
	///
	/// Fails only if the lines couldn't be brought back to the idle state.
	pub fn run_session(&mut self, indicator: &mut dyn Indicator) -> crate::AResult<Session> {
		let mut session = Session::new();
		let mut state = State::PowerUp;

		loop {
			session.visited.push(state);
			let next = match state {
				State::Idle => break,
				State::PowerUp => self.power_up(&mut session),
				State::Identify => self.identify(&mut session),
				State::Program => self.program(&mut session),
				State::Verify => self.verify(&mut session),
				State::PowerDown => {
					if let Err(e) = with_context!("leaving programming mode", leave_programming_mode(&mut self.lines)) {
						if let Err(report_error) = indicator.report(false) {
							warn!("couldn't report failed power down: {}", report_error);
						}
						return Err(e);
					}
					State::Report
				},
				State::Report => {
					indicator.report(session.is_success())?;
					State::Idle
				},
			};
			debug!("{:?} -> {:?}", state, next);
			state = next;
		}

		Ok(session)
	}

	pub fn run(&mut self, indicator: &mut dyn Indicator) -> crate::AResult<Outcome> {
		let outcome = self.run_session(indicator)?.into_outcome();
		if outcome.is_success() {
			info!("{}", outcome);
		} else {
			error!("{}", outcome);
		}
		Ok(outcome)
	}

	/// Idle loop: run whenever `trigger` asks for it. Returns only on errors.
	pub fn watch(&mut self, trigger: &mut dyn StartTrigger, indicator: &mut dyn Indicator) -> crate::AResult<()> {
		info!("waiting for start signal");
		loop {
			if trigger.start_requested()? {
				self.run(indicator)?;
			} else {
				reliable_sleep(START_POLL_INTERVAL);
			}
		}
	}

	fn power_up(&mut self, session: &mut Session) -> State {
		match with_context!("entering programming mode", enter_programming_mode(&mut self.lines)) {
			Ok(()) => State::Identify,
			Err(e) => session.abort(State::PowerUp, e),
		}
	}

	fn identify(&mut self, session: &mut Session) -> State {
		let signature = match self.programmer().read_signature() {
			Ok(bytes) => Signature(bytes),
			Err(e) => return session.abort(State::Identify, e),
		};

		match devices::identify(self.devices, signature) {
			None => {
				warn!("no supported device has signature {}", signature);
				session.conclude(Outcome::UnknownDevice { signature });
				State::PowerDown
			},
			Some(record) => {
				info!("found {}", record);
				session.device = Some(record);
				session.fuses = Some(FuseSet::from_record(record));
				State::Program
			},
		}
	}

	fn program(&mut self, session: &mut Session) -> State {
		let fuses = match session.fuses {
			Some(fuses) => fuses,
			None => return session.abort(State::Program, format_err!("no device identified")),
		};

		let mut programmer = self.programmer();
		for (fuse, value) in fuses.planned() {
			if let Err(e) = programmer.write_fuse(fuse, value) {
				return session.abort(State::Program, e);
			}
		}
		State::Verify
	}

	fn verify(&mut self, session: &mut Session) -> State {
		let fuses = match session.fuses {
			Some(fuses) => fuses,
			None => return session.abort(State::Verify, format_err!("no device identified")),
		};

		let mut mismatch = None;
		let mut programmer = self.programmer();
		for (fuse, expected) in fuses.planned() {
			match programmer.read_fuse(fuse) {
				Ok(actual) if actual == expected => (),
				Ok(actual) => {
					error!("{} fuse: wrote 0x{:02x}, read back 0x{:02x}", fuse, expected, actual);
					mismatch.get_or_insert(Outcome::VerifyMismatch { fuse, expected, actual });
				},
				Err(e) => return session.abort(State::Verify, e),
			}
		}

		session.conclude(match mismatch {
			Some(outcome) => outcome,
			None => Outcome::Success {
				device: session.device.map_or("", |record| record.name),
			},
		});
		State::PowerDown
	}
}
