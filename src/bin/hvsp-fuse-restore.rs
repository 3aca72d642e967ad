#[macro_use]
extern crate clap;
#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;

extern crate hvsp_fuse_restore;
use hvsp_fuse_restore::*;

use std::process::exit;

use hvsp_fuse_restore::controller::Controller;
use hvsp_fuse_restore::devices::{
	self,
	DEVICES,
	Signature,
};
use hvsp_fuse_restore::gpio::{
	self as gpio_lines,
	GpioButton,
	GpioLed,
	GpioLineBank,
	PinMap,
};
use hvsp_fuse_restore::host::{
	Indicator,
	LogIndicator,
};
use hvsp_fuse_restore::hvsp::{
	Bounded,
	FuseByte,
	Line,
	Unbounded,
	WaitPolicy,
};
use hvsp_fuse_restore::session::Outcome;
use hvsp_fuse_restore::sim::{
	RESET_DISABLED_FUSES,
	SimulatedTarget,
};

// run finished, but fuses were not restored
const EXIT_NOT_RESTORED: i32 = 2;

fn get_param<T>(matches: &clap::ArgMatches, name: &str) -> AResult<T>
where
	T: std::str::FromStr,
	failure::Error: From<<T as std::str::FromStr>::Err>,
{
	let param = match matches.value_of(name) {
		Some(p) => p,
		None => bail!("missing parameter {}", name),
	};
	param.parse::<T>().map_err(|e| {
		let e = failure::Error::from(e);
		let msg = format!("invalid parameter {}: {}", name, e);
		e.context(msg).into()
	})
}

fn get_param_or<T>(matches: &clap::ArgMatches, name: &str, default: T) -> AResult<T>
where
	T: std::str::FromStr,
	failure::Error: From<<T as std::str::FromStr>::Err>,
{
	if matches.is_present(name) {
		get_param(matches, name)
	} else {
		Ok(default)
	}
}

fn chip(matches: &clap::ArgMatches) -> String {
	matches.value_of("chip").unwrap_or(gpio_lines::DEFAULT_CHIP).to_string()
}

fn pin_map(matches: &clap::ArgMatches) -> AResult<PinMap> {
	let mut pins = PinMap::default();
	for &line in Line::ALL.iter() {
		let offset = get_param_or(matches, line.name(), pins.offset(line))?;
		pins.set_offset(line, offset);
	}
	Ok(pins)
}

fn wait_policy(matches: &clap::ArgMatches) -> AResult<Box<dyn WaitPolicy>> {
	Ok(match matches.value_of("poll_limit") {
		None => Box::new(Unbounded),
		Some(_) => Box::new(Bounded::new(get_param(matches, "poll_limit")?)),
	})
}

fn indicator(matches: &clap::ArgMatches, default_led: Option<u32>) -> AResult<Box<dyn Indicator>> {
	let led = match matches.value_of("led") {
		Some(_) => Some(get_param(matches, "led")?),
		None => default_led,
	};
	Ok(match led {
		None => Box::new(LogIndicator),
		Some(offset) => {
			let mut led = GpioLed::open(&chip(matches), offset, matches.is_present("led_active_low"))?;
			led.set(false)?;
			Box::new(led)
		},
	})
}

fn exit_code(outcome: &Outcome) -> i32 {
	if outcome.is_success() { 0 } else { EXIT_NOT_RESTORED }
}

// "high=5f"
fn parse_stuck(s: &str) -> AResult<(FuseByte, u8)> {
	let mut parts = s.splitn(2, '=');
	let fuse = match parts.next() {
		Some("low") => FuseByte::Low,
		Some("high") => FuseByte::High,
		Some("extended") => FuseByte::Extended,
		_ => bail!("invalid fuse in {:?} (expected low, high or extended)", s),
	};
	let value = match parts.next() {
		Some(v) => u8::from_str_radix(v, 16).map_err(|e| format_err!("invalid fuse value {:?}: {}", v, e))?,
		None => bail!("missing value in {:?} (expected e.g. high=5f)", s),
	};
	Ok((fuse, value))
}

fn list() -> AResult<i32> {
	for record in devices::supported(&DEVICES) {
		println!("{}", record);
	}
	Ok(0)
}

fn restore(matches: &clap::ArgMatches) -> AResult<i32> {
	let lines = GpioLineBank::open(&chip(matches), pin_map(matches)?)?;
	let mut indicator = indicator(matches, None)?;
	let mut controller = Controller::new(lines, wait_policy(matches)?);

	let _realtime = if matches.is_present("realtime") { realtime::try_realtime() } else { None };
	let outcome = controller.run(&mut *indicator)?;
	Ok(exit_code(&outcome))
}

fn watch(matches: &clap::ArgMatches, sub_m: &clap::ArgMatches) -> AResult<i32> {
	let chip = chip(matches);
	let lines = GpioLineBank::open(&chip, pin_map(matches)?)?;
	let mut button = GpioButton::open(&chip, get_param_or(sub_m, "button", gpio_lines::DEFAULT_BUTTON)?)?;
	let mut indicator = indicator(matches, Some(gpio_lines::DEFAULT_LED))?;
	let mut controller = Controller::new(lines, wait_policy(matches)?);

	let _realtime = if matches.is_present("realtime") { realtime::try_realtime() } else { None };
	controller.watch(&mut button, &mut *indicator)?;
	Ok(0)
}

fn simulate(matches: &clap::ArgMatches, sub_m: &clap::ArgMatches) -> AResult<i32> {
	let signature: Signature = get_param_or(sub_m, "signature", DEVICES[6].signature)?;
	let mut target = match devices::identify(&DEVICES, signature) {
		Some(record) => SimulatedTarget::from_record(record, RESET_DISABLED_FUSES),
		None => SimulatedTarget::new(signature.0, RESET_DISABLED_FUSES),
	};
	if let Some(s) = sub_m.value_of("stuck") {
		let (fuse, value) = parse_stuck(s)?;
		target.set_stuck(fuse, Some(value));
	}
	target.set_busy_polls(get_param_or(sub_m, "busy_polls", 0)?);
	if sub_m.is_present("unresponsive") {
		if !matches.is_present("poll_limit") {
			warn!("unresponsive target without --poll-limit: this will hang");
		}
		target.set_unresponsive(true);
	}

	let mut controller = Controller::new(target, wait_policy(matches)?);
	let outcome = controller.run(&mut LogIndicator)?;

	let target = controller.into_lines();
	let fuses = target.fuses();
	println!("fuses: low=0x{:02x} high=0x{:02x} extended=0x{:02x}", fuses[0], fuses[1], fuses[2]);
	for (fuse, value) in target.writes() {
		println!("wrote {} fuse 0x{:02x}", fuse, value);
	}
	for violation in target.violations() {
		println!("timing violation: {}", violation);
	}
	Ok(exit_code(&outcome))
}

fn main_app() -> AResult<i32> {
	let matches = clap_app!(@app (app_from_crate!())
		(@setting SubcommandRequiredElseHelp)
		(global_setting: clap::AppSettings::VersionlessSubcommands)
		(about: "Restore factory default fuses of ATtiny13/x4/x5 parts using High-voltage Serial Programming")
		(@arg chip: --chip +takes_value "GPIO chip device (default /dev/gpiochip0)")
		(@arg sci: --sci +takes_value "GPIO line for SCI (target clock)")
		(@arg sdi: --sdi +takes_value "GPIO line for SDI (target data in)")
		(@arg sii: --sii +takes_value "GPIO line for SII (target instruction in)")
		(@arg sdo: --sdo +takes_value "GPIO line for SDO (target data out)")
		(@arg vcc: --vcc +takes_value "GPIO line switching target VCC")
		(@arg rst: --rst +takes_value "GPIO line driving the (inverting) +12V RESET switch")
		(@arg led: --led +takes_value "GPIO line of the status LED")
		(@arg led_active_low: --("led-active-low") "status LED is on when the line is low")
		(@arg poll_limit: --("poll-limit") +takes_value "give up waiting for the target after this many polls")
		(@arg realtime: --realtime "run with realtime priority and locked memory")
		(@subcommand restore =>
			(about: "restore the part in the socket once")
		)
		(@subcommand watch =>
			(about: "restore whenever the start button is pressed")
			(@arg button: --button +takes_value "GPIO line of the (active low) start button")
		)
		(@subcommand list =>
			(about: "list supported parts and their default fuses")
		)
		(@subcommand simulate =>
			(about: "run against a simulated target")
			(@arg signature: --signature +takes_value "signature of the simulated part (default 1e:93:0b)")
			(@arg stuck: --("stuck-fuse") +takes_value "fuse byte that always reads back a value, e.g. high=5f")
			(@arg busy_polls: --("busy-polls") +takes_value "busy polls after each write pulse")
			(@arg unresponsive: --unresponsive "never finish a write pulse")
		)
	).get_matches();

	match matches.subcommand() {
		("list", _) => list(),
		("restore", _) => restore(&matches),
		("watch", Some(sub_m)) => watch(&matches, sub_m),
		("simulate", Some(sub_m)) => simulate(&matches, sub_m),
		("", _) => bail!("no subcommand"),
		(cmd, _) => bail!("not implemented subcommand {:?}", cmd),
	}
}

fn main() {
	env_logger::from_env(env_logger::Env::default().default_filter_or("info")).init();

	match main_app() {
		Ok(code) => exit(code),
		Err(e) => {
			error!("Error: {}", e);
			exit(1);
		},
	}
}
