/// Target never signalled ready within the poll budget of a `Bounded` policy.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Fail)]
#[fail(display = "target did not signal ready after {} polls", polls)]
pub struct ReadyTimeout {
	pub polls: u64,
}

/// Look for a `ReadyTimeout` anywhere in the cause chain of `err`.
pub fn find_ready_timeout(err: &failure::Error) -> Option<ReadyTimeout> {
	err.iter_chain()
		.filter_map(|cause| cause.downcast_ref::<ReadyTimeout>())
		.next()
		.cloned()
}

/// How to wait for the target to signal completion on SDO.
pub trait WaitPolicy {
	// poll `ready` until it returns true (or the policy gives up)
	fn wait_until(&mut self, ready: &mut dyn FnMut() -> crate::AResult<bool>) -> crate::AResult<()>;
}

impl<'a, W: ?Sized + WaitPolicy> WaitPolicy for &'a mut W {
	fn wait_until(&mut self, ready: &mut dyn FnMut() -> crate::AResult<bool>) -> crate::AResult<()> {
		W::wait_until(*self, ready)
	}
}

impl<W: ?Sized + WaitPolicy> WaitPolicy for Box<W> {
	fn wait_until(&mut self, ready: &mut dyn FnMut() -> crate::AResult<bool>) -> crate::AResult<()> {
		W::wait_until(&mut **self, ready)
	}
}

/// Busy-polls forever. A disconnected target hangs the run here.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct Unbounded;

impl WaitPolicy for Unbounded {
	fn wait_until(&mut self, ready: &mut dyn FnMut() -> crate::AResult<bool>) -> crate::AResult<()> {
		while !ready()? {
			std::hint::spin_loop();
		}
		Ok(())
	}
}

/// Gives up with `ReadyTimeout` once more than `max_polls` polls were negative.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Bounded {
	pub max_polls: u64,
}

impl Bounded {
	pub fn new(max_polls: u64) -> Self {
		Bounded { max_polls }
	}
}

impl WaitPolicy for Bounded {
	fn wait_until(&mut self, ready: &mut dyn FnMut() -> crate::AResult<bool>) -> crate::AResult<()> {
		for _ in 0..=self.max_polls {
			if ready()? {
				return Ok(());
			}
		}
		Err(ReadyTimeout { polls: self.max_polls }.into())
	}
}
