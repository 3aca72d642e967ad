use std::fmt;

use crate::devices::{
	DeviceRecord,
	Signature,
};
use crate::hvsp::{
	FuseByte,
	find_ready_timeout,
};

/// Steps of one restore run.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum State {
	Idle,
	PowerUp,
	Identify,
	Program,
	Verify,
	PowerDown,
	Report,
}

/// Fuse bytes to write for an identified part.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct FuseSet {
	pub low: u8,
	pub high: u8,
	// None: the part has no extended fuse byte
	pub extended: Option<u8>,
}

impl FuseSet {
	pub fn from_record(record: &DeviceRecord) -> Self {
		FuseSet {
			low: record.fuse_low,
			high: record.fuse_high,
			extended: if record.fuse_extended != 0 { Some(record.fuse_extended) } else { None },
		}
	}

	/// Bytes to write and verify, in programming order.
	pub fn planned(&self) -> Vec<(FuseByte, u8)> {
		let mut plan = vec![(FuseByte::Low, self.low), (FuseByte::High, self.high)];
		if let Some(extended) = self.extended {
			plan.push((FuseByte::Extended, extended));
		}
		plan
	}
}

/// Result of one run. Only `is_success` leaves the controller towards the
/// operator; the rest is for the log.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Outcome {
	Success {
		device: &'static str,
	},
	UnknownDevice {
		signature: Signature,
	},
	VerifyMismatch {
		fuse: FuseByte,
		expected: u8,
		actual: u8,
	},
	Timeout {
		polls: u64,
	},
	LinkFailure(String),
}

impl Outcome {
	pub fn is_success(&self) -> bool {
		match self {
			Outcome::Success { .. } => true,
			_ => false,
		}
	}

	pub fn from_error(err: &failure::Error) -> Self {
		match find_ready_timeout(err) {
			Some(timeout) => Outcome::Timeout { polls: timeout.polls },
			None => Outcome::LinkFailure(err.to_string()),
		}
	}
}

impl fmt::Display for Outcome {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Outcome::Success { device } => write!(f, "restored default fuses of {}", device),
			Outcome::UnknownDevice { signature } => write!(f, "unknown device with signature {}", signature),
			Outcome::VerifyMismatch { fuse, expected, actual } => write!(f,
				"verify failed for {} fuse: wrote 0x{:02x}, read back 0x{:02x}", fuse, expected, actual
			),
			Outcome::Timeout { polls } => write!(f, "target not ready after {} polls", polls),
			Outcome::LinkFailure(msg) => write!(f, "programming lines failed: {}", msg),
		}
	}
}

/// State of one run; dropped at the end of it.
#[derive(Clone, Debug, Default)]
pub struct Session {
	pub device: Option<&'static DeviceRecord>,
	pub fuses: Option<FuseSet>,
	pub outcome: Option<Outcome>,
	pub visited: Vec<State>,
}

impl Session {
	pub fn new() -> Self {
		Session::default()
	}

	// first decided outcome sticks
	pub fn conclude(&mut self, outcome: Outcome) {
		if self.outcome.is_none() {
			self.outcome = Some(outcome);
		}
	}

	pub fn abort(&mut self, state: State, err: failure::Error) -> State {
		error!("{:?} failed: {}", state, err);
		self.conclude(Outcome::from_error(&err));
		State::PowerDown
	}

	pub fn is_success(&self) -> bool {
		self.outcome.as_ref().map_or(false, Outcome::is_success)
	}

	pub fn into_outcome(self) -> Outcome {
		self.outcome.unwrap_or_else(|| Outcome::LinkFailure("run ended without result".into()))
	}
}
