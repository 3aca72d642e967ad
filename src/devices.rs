use std::fmt;
use std::str;

// Atmel vendor code, first signature byte of every supported part
const SIGNATURE_0: u8 = 0x1e;

/// The three signature bytes of a part.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Signature(pub [u8; 3]);

impl Signature {
	// reserved as table terminator
	pub const SENTINEL: Signature = Signature([0, 0, 0]);
}

impl fmt::Debug for Signature {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "Signature({})", self)
	}
}

impl fmt::Display for Signature {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{:02x}:{:02x}:{:02x}", self.0[0], self.0[1], self.0[2])
	}
}

impl str::FromStr for Signature {
	type Err = ::failure::Error;

	// "1e:93:0b" or "1e930b"
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let digits: String = s.chars().filter(|&c| c != ':').collect();
		ensure!(
			digits.len() == 6 && digits.chars().all(|c| c.is_ascii_hexdigit()),
			"invalid signature {:?}, expected 3 hex bytes like 1e:93:0b", s
		);

		let mut bytes = [0u8; 3];
		for (i, b) in bytes.iter_mut().enumerate() {
			let part = &digits[2 * i..2 * i + 2];
			*b = with_context!(("invalid signature byte {:?}", part),
				Ok(u8::from_str_radix(part, 16)?)
			)?;
		}
		Ok(Signature(bytes))
	}
}

/// Signature and factory default fuses of one part.
///
/// `fuse_extended == 0x00` means the part has no extended fuse byte; it is
/// neither written nor verified.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct DeviceRecord {
	pub name: &'static str,
	pub signature: Signature,
	pub fuse_low: u8,
	pub fuse_high: u8,
	pub fuse_extended: u8,
}

impl DeviceRecord {
	pub fn is_sentinel(&self) -> bool {
		self.signature.0[0] == 0
	}
}

impl fmt::Display for DeviceRecord {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{} [{}] lfuse=0x{:02x} hfuse=0x{:02x}", self.name, self.signature, self.fuse_low, self.fuse_high)?;
		if self.fuse_extended != 0 {
			write!(f, " efuse=0x{:02x}", self.fuse_extended)?;
		}
		Ok(())
	}
}

macro_rules! device {
	($name:expr, [$s1:expr, $s2:expr], $low:expr, $high:expr, $ext:expr) => {
		DeviceRecord {
			name: $name,
			signature: Signature([SIGNATURE_0, $s1, $s2]),
			fuse_low: $low,
			fuse_high: $high,
			fuse_extended: $ext,
		}
	};
}

/// Supported parts; scanned front to back, terminated by a record with a zero
/// first signature byte.
///
/// Defaults are LFUSE_DEFAULT / HFUSE_DEFAULT / EFUSE_DEFAULT of the avr-libc
/// `iotnxx.h` headers.
pub static DEVICES: [DeviceRecord; 8] = [
	device!("ATtiny13", [0x90, 0x07], 0x6a, 0xff, 0x00),
	device!("ATtiny24", [0x91, 0x0b], 0x62, 0xdf, 0xff),
	device!("ATtiny44", [0x92, 0x07], 0x62, 0xdf, 0xff),
	device!("ATtiny84", [0x93, 0x0c], 0x62, 0xdf, 0xff),
	device!("ATtiny25", [0x91, 0x08], 0x62, 0xdf, 0xff),
	device!("ATtiny45", [0x92, 0x06], 0x62, 0xdf, 0xff),
	device!("ATtiny85", [0x93, 0x0b], 0x62, 0xdf, 0xff),
	DeviceRecord {
		name: "",
		signature: Signature::SENTINEL,
		fuse_low: 0,
		fuse_high: 0,
		fuse_extended: 0,
	},
];

/// First record in `table` (up to the sentinel) matching `signature`.
pub fn identify(table: &[DeviceRecord], signature: Signature) -> Option<&DeviceRecord> {
	table.iter()
		.take_while(|record| !record.is_sentinel())
		.find(|record| record.signature == signature)
}

/// Records before the sentinel.
pub fn supported(table: &[DeviceRecord]) -> impl Iterator<Item = &DeviceRecord> {
	table.iter().take_while(|record| !record.is_sentinel())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn every_listed_device_is_found() {
		for record in supported(&DEVICES) {
			assert_eq!(identify(&DEVICES, record.signature), Some(record));
		}
		assert_eq!(supported(&DEVICES).count(), 7);
	}

	#[test]
	fn attiny85_defaults() {
		let record = identify(&DEVICES, Signature([0x1e, 0x93, 0x0b])).unwrap();
		assert_eq!(record.name, "ATtiny85");
		assert_eq!((record.fuse_low, record.fuse_high, record.fuse_extended), (0x62, 0xdf, 0xff));
	}

	#[test]
	fn attiny13_has_no_extended_fuse() {
		let record = identify(&DEVICES, Signature([0x1e, 0x90, 0x07])).unwrap();
		assert_eq!(record.fuse_extended, 0x00);
	}

	#[test]
	fn unknown_signatures_do_not_match() {
		for sig in &[[0x1e, 0xff, 0xff], [0x00, 0x00, 0x00], [0xff, 0xff, 0xff], [0x1e, 0x93, 0x0a], [0x1f, 0x93, 0x0b]] {
			assert_eq!(identify(&DEVICES, Signature(*sig)), None);
		}
	}

	#[test]
	fn scan_stops_at_sentinel() {
		let table = [
			device!("first", [0x01, 0x01], 1, 1, 0),
			DEVICES[7],
			device!("hidden", [0x02, 0x02], 2, 2, 0),
		];
		assert!(identify(&table, Signature([SIGNATURE_0, 0x01, 0x01])).is_some());
		assert!(identify(&table, Signature([SIGNATURE_0, 0x02, 0x02])).is_none());
	}

	#[test]
	fn first_match_wins() {
		let table = [
			device!("first", [0x01, 0x01], 1, 1, 0),
			device!("second", [0x01, 0x01], 2, 2, 0),
			DEVICES[7],
		];
		assert_eq!(identify(&table, Signature([SIGNATURE_0, 0x01, 0x01])).unwrap().name, "first");
	}

	#[test]
	fn table_invariants() {
		let (last, records) = DEVICES.split_last().unwrap();
		assert!(last.is_sentinel());
		for (i, a) in records.iter().enumerate() {
			assert_ne!(a.signature.0[0], 0, "{} collides with the sentinel", a.name);
			for b in &records[i + 1..] {
				assert_ne!(a.signature, b.signature, "{} and {} share a signature", a.name, b.name);
			}
		}
	}

	#[test]
	fn parse_signature() {
		assert_eq!("1e:93:0b".parse::<Signature>().unwrap(), Signature([0x1e, 0x93, 0x0b]));
		assert_eq!("1E930B".parse::<Signature>().unwrap(), Signature([0x1e, 0x93, 0x0b]));
		assert!("1e:93".parse::<Signature>().is_err());
		assert!("1e:93:zz".parse::<Signature>().is_err());
		// from_str_radix alone would take a sign
		assert!("+1+2+3".parse::<Signature>().is_err());
		assert!("1e:+9:0b".parse::<Signature>().is_err());
		assert_eq!(Signature([0x1e, 0x93, 0x0b]).to_string(), "1e:93:0b");
	}
}
