//! Keep the scheduler and the pager away from the programming windows.
//!
//! All HVSP delays are lower bounds, so being preempted never breaks the
//! protocol; it only stretches a run. The data sheet does give an upper limit
//! (60 us) between VCC and +12V though, which a preempted process can miss.

use std::io;
use std::mem;

use libc::{
	MCL_CURRENT,
	MCL_FUTURE,
	SCHED_FIFO,
	c_int,
	mlockall,
	munlockall,
	sched_get_priority_max,
	sched_getparam,
	sched_getscheduler,
	sched_param,
	sched_setscheduler,
};

/// Realtime scheduling and locked memory until dropped.
pub struct RealtimeGuard {
	policy: c_int,
	param: sched_param,
	locked: bool,
}

impl RealtimeGuard {
	pub fn acquire() -> io::Result<Self> {
		let policy = unsafe { sched_getscheduler(0) };
		if -1 == policy {
			return Err(io::Error::last_os_error());
		}
		let mut param: sched_param = unsafe { mem::zeroed() };
		if -1 == unsafe { sched_getparam(0, &mut param) } {
			return Err(io::Error::last_os_error());
		}

		let mut fifo: sched_param = unsafe { mem::zeroed() };
		fifo.sched_priority = unsafe { sched_get_priority_max(SCHED_FIFO) };
		if -1 == unsafe { sched_setscheduler(0, SCHED_FIFO, &fifo) } {
			return Err(io::Error::last_os_error());
		}

		let locked = 0 == unsafe { mlockall(MCL_CURRENT | MCL_FUTURE) };
		if !locked {
			warn!("couldn't lock memory: {}", io::Error::last_os_error());
		}

		debug!("running with SCHED_FIFO priority {}", fifo.sched_priority);
		Ok(RealtimeGuard { policy, param, locked })
	}
}

impl Drop for RealtimeGuard {
	fn drop(&mut self) {
		unsafe {
			if self.locked {
				munlockall();
			}
			if -1 == sched_setscheduler(0, self.policy, &self.param) {
				warn!("couldn't restore scheduling policy: {}", io::Error::last_os_error());
			}
		}
	}
}

/// `RealtimeGuard::acquire`, or `None` with a warning.
pub fn try_realtime() -> Option<RealtimeGuard> {
	match RealtimeGuard::acquire() {
		Ok(guard) => Some(guard),
		Err(e) => {
			warn!("realtime scheduling not available, timing may stretch: {}", e);
			None
		},
	}
}
