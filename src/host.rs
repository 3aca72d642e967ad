use std::time::Duration;

use crate::hvsp::reliable_sleep;

/// Something the operator uses to start a run.
pub trait StartTrigger {
	fn start_requested(&mut self) -> crate::AResult<bool>;
}

/// Shows the result of a run to the operator.
pub trait Indicator {
	fn report(&mut self, success: bool) -> crate::AResult<()>;
}

impl<'a, T: ?Sized + StartTrigger> StartTrigger for &'a mut T {
	fn start_requested(&mut self) -> crate::AResult<bool> {
		T::start_requested(*self)
	}
}

impl<'a, I: ?Sized + Indicator> Indicator for &'a mut I {
	fn report(&mut self, success: bool) -> crate::AResult<()> {
		I::report(*self, success)
	}
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct LogIndicator;

impl Indicator for LogIndicator {
	fn report(&mut self, success: bool) -> crate::AResult<()> {
		if success {
			info!("fuse restore successful");
		} else {
			error!("fuse restore failed");
		}
		Ok(())
	}
}

pub const BLINK_STEP: Duration = Duration::from_millis(250);
pub const BLINK_STEPS: usize = 16;

/// LED state for each `BLINK_STEP`: solid on for success, toggling (starting
/// with on) for failure.
pub fn blink_pattern(success: bool) -> [bool; BLINK_STEPS] {
	let mut pattern = [true; BLINK_STEPS];
	if !success {
		for (i, on) in pattern.iter_mut().enumerate() {
			*on = i % 2 == 0;
		}
	}
	pattern
}

/// Play `blink_pattern(success)` on an LED, then switch it off.
pub fn show_result<F>(success: bool, mut set_led: F) -> crate::AResult<()>
where
	F: FnMut(bool) -> crate::AResult<()>,
{
	for &on in blink_pattern(success).iter() {
		set_led(on)?;
		reliable_sleep(BLINK_STEP);
	}
	set_led(false)
}
