use gpiocdev::line::{
	Bias,
	Offset,
	Value,
};
use gpiocdev::request::{
	Config,
	Request,
};

use crate::gpio::PinMap;
use crate::host::{
	Indicator,
	StartTrigger,
	show_result,
};
use crate::hvsp::{
	Direction,
	LINE_COUNT,
	Line,
	LineBank,
};

const CONSUMER: &str = "hvsp-fuse-restore";

fn value(high: bool) -> Value {
	if high { Value::Active } else { Value::Inactive }
}

/// The programming lines as one GPIO character device request.
pub struct GpioLineBank {
	request: Request,
	pins: PinMap,
	directions: [Direction; LINE_COUNT],
	levels: [bool; LINE_COUNT],
}

impl GpioLineBank {
	/// Request the lines and drive the idle state: +12V off (RESET driver
	/// high), VCC off, everything else floating.
	pub fn open(chip: &str, pins: PinMap) -> crate::AResult<Self> {
		pins.validate()?;

		let mut directions = [Direction::Input; LINE_COUNT];
		let mut levels = [false; LINE_COUNT];
		directions[Line::HighVoltageReset.index()] = Direction::Output;
		levels[Line::HighVoltageReset.index()] = true;
		directions[Line::TargetPower.index()] = Direction::Output;

		let config = line_config(&pins, &directions, &levels);
		let request = with_context!(("request GPIO lines on {}", chip),
			Ok(Request::from_config(config)
				.on_chip(chip)
				.with_consumer(CONSUMER)
				.request()?)
		)?;

		info!("{}: sci={} sdi={} sii={} sdo={} vcc={} rst={}", chip,
			pins.clock, pins.data_in, pins.instruction_in, pins.data_out,
			pins.target_power, pins.high_voltage_reset,
		);

		Ok(GpioLineBank {
			request,
			pins,
			directions,
			levels,
		})
	}

	pub fn pins(&self) -> &PinMap {
		&self.pins
	}
}

fn line_config(pins: &PinMap, directions: &[Direction; LINE_COUNT], levels: &[bool; LINE_COUNT]) -> Config {
	let mut config = Config::default();
	for &line in Line::ALL.iter() {
		let offset = pins.offset(line);
		match directions[line.index()] {
			Direction::Output => {
				config.with_line(offset).as_output(value(levels[line.index()]));
			},
			Direction::Input => {
				config.with_line(offset).as_input();
			},
		}
	}
	config
}

impl LineBank for GpioLineBank {
	fn set_direction(&mut self, line: Line, direction: Direction) -> crate::AResult<()> {
		if self.directions[line.index()] == direction {
			return Ok(());
		}
		self.directions[line.index()] = direction;
		let config = line_config(&self.pins, &self.directions, &self.levels);
		with_context!(("switch {} to {:?}", line, direction),
			Ok(self.request.reconfigure(&config)?)
		)
	}

	fn set_level(&mut self, line: Line, high: bool) -> crate::AResult<()> {
		self.levels[line.index()] = high;
		if self.directions[line.index()] == Direction::Output {
			let offset = self.pins.offset(line);
			with_context!(("set {}", line),
				Ok(self.request.set_value(offset, value(high))?)
			)?;
		}
		Ok(())
	}

	fn get_level(&mut self, line: Line) -> crate::AResult<bool> {
		let offset = self.pins.offset(line);
		with_context!(("read {}", line),
			Ok(self.request.value(offset)? == Value::Active)
		)
	}
}

/// Active-low push button with pull-up.
pub struct GpioButton {
	request: Request,
	offset: Offset,
}

impl GpioButton {
	pub fn open(chip: &str, offset: Offset) -> crate::AResult<Self> {
		let mut config = Config::default();
		config.with_line(offset).as_input().as_active_low().with_bias(Bias::PullUp);
		let request = with_context!(("request button line {} on {}", offset, chip),
			Ok(Request::from_config(config)
				.on_chip(chip)
				.with_consumer(CONSUMER)
				.request()?)
		)?;
		Ok(GpioButton { request, offset })
	}
}

impl StartTrigger for GpioButton {
	fn start_requested(&mut self) -> crate::AResult<bool> {
		Ok(self.request.value(self.offset)? == Value::Active)
	}
}

/// Status LED.
pub struct GpioLed {
	request: Request,
	offset: Offset,
}

impl GpioLed {
	pub fn open(chip: &str, offset: Offset, active_low: bool) -> crate::AResult<Self> {
		let mut config = Config::default();
		config.with_line(offset).as_output(Value::Inactive);
		if active_low {
			config.as_active_low();
		}
		let request = with_context!(("request LED line {} on {}", offset, chip),
			Ok(Request::from_config(config)
				.on_chip(chip)
				.with_consumer(CONSUMER)
				.request()?)
		)?;
		Ok(GpioLed { request, offset })
	}

	pub fn set(&mut self, on: bool) -> crate::AResult<()> {
		Ok(self.request.set_value(self.offset, value(on))?)
	}
}

impl Indicator for GpioLed {
	fn report(&mut self, success: bool) -> crate::AResult<()> {
		let request = &self.request;
		let offset = self.offset;
		show_result(success, |on| Ok(request.set_value(offset, value(on))?))
	}
}
