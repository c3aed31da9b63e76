//! Payload marshalling for object bodies.
//!
//! Object payloads cross the wire as ordered raw byte regions, outside the
//! framed message channels. [`Marshal`] ties the two directions together:
//! `marshall` streams a value's regions into a sink, `ingest` rebuilds the
//! value by draining exactly those regions from a source. Fixed-layout types
//! advertise their total wire size through [`Marshal::WIRE_SIZE`] so a remote
//! load request can carry it; variable-layout types leave it `None` and let
//! the receiver drive the drain.
//!
//! All fixed-layout regions are little-endian, so the wire format does not
//! depend on host byte order.

use std::io;

/// A sink receiving marshalled regions in order.
pub type RegionSink<'a> = dyn FnMut(&[u8]) -> io::Result<()> + 'a;

/// A source filling buffers with marshalled regions in order.
pub type RegionSource<'a> = dyn FnMut(&mut [u8]) -> io::Result<()> + 'a;

/// How a value's bytes travel on the wire.
///
/// Law: for every value `x`, draining the bytes written by `x.marshall(..)`
/// through [`Marshal::ingest`] yields a value equal to `x`.
pub trait Marshal: Send + Sized + 'static {
	/// Total wire size for fixed-layout types; `None` when the layout is
	/// determined by the receiver while ingesting.
	const WIRE_SIZE: Option<u64>;

	/// Streams the value's regions, in order, into `sink`.
	fn marshall(&self, sink: &mut RegionSink<'_>) -> io::Result<()>;

	/// Rebuilds a value by draining exactly the regions `marshall` wrote.
	fn ingest(source: &mut RegionSource<'_>) -> io::Result<Self>;
}

macro_rules! fixed_marshal {
	($($t:ty),* $(,)?) => {$(
		impl Marshal for $t {
			const WIRE_SIZE: Option<u64> = Some(size_of::<$t>() as u64);

			fn marshall(&self, sink: &mut RegionSink<'_>) -> io::Result<()> {
				sink(&self.to_le_bytes())
			}

			fn ingest(source: &mut RegionSource<'_>) -> io::Result<Self> {
				let mut buf = [0u8; size_of::<$t>()];
				source(&mut buf)?;
				Ok(<$t>::from_le_bytes(buf))
			}
		}
	)*};
}

fixed_marshal!(u8, u16, u32, u64, u128, i8, i16, i32, i64, i128, f32, f64);

impl Marshal for bool {
	const WIRE_SIZE: Option<u64> = Some(1);

	fn marshall(&self, sink: &mut RegionSink<'_>) -> io::Result<()> {
		sink(&[u8::from(*self)])
	}

	fn ingest(source: &mut RegionSource<'_>) -> io::Result<Self> {
		let mut buf = [0u8; 1];
		source(&mut buf)?;
		Ok(buf[0] != 0)
	}
}

impl Marshal for String {
	const WIRE_SIZE: Option<u64> = None;

	fn marshall(&self, sink: &mut RegionSink<'_>) -> io::Result<()> {
		sink(&(self.len() as u64).to_le_bytes())?;
		sink(self.as_bytes())
	}

	fn ingest(source: &mut RegionSource<'_>) -> io::Result<Self> {
		let len = u64::ingest(source)?;
		let mut bytes = vec![0u8; len as usize];
		if !bytes.is_empty() {
			source(&mut bytes)?;
		}
		String::from_utf8(bytes)
			.map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
	}
}

impl<T: Marshal> Marshal for Vec<T> {
	const WIRE_SIZE: Option<u64> = None;

	fn marshall(&self, sink: &mut RegionSink<'_>) -> io::Result<()> {
		sink(&(self.len() as u64).to_le_bytes())?;
		for item in self {
			item.marshall(sink)?;
		}
		Ok(())
	}

	fn ingest(source: &mut RegionSource<'_>) -> io::Result<Self> {
		let len = u64::ingest(source)?;
		let mut items = Vec::with_capacity(len as usize);
		for _ in 0..len {
			items.push(T::ingest(source)?);
		}
		Ok(items)
	}
}

impl<T: Marshal> Marshal for Option<T> {
	const WIRE_SIZE: Option<u64> = None;

	fn marshall(&self, sink: &mut RegionSink<'_>) -> io::Result<()> {
		match self {
			None => sink(&[0]),
			Some(value) => {
				sink(&[1])?;
				value.marshall(sink)
			}
		}
	}

	fn ingest(source: &mut RegionSource<'_>) -> io::Result<Self> {
		let mut tag = [0u8; 1];
		source(&mut tag)?;
		match tag[0] {
			0 => Ok(None),
			1 => Ok(Some(T::ingest(source)?)),
			tag => Err(io::Error::new(
				io::ErrorKind::InvalidData,
				format!("invalid option tag {tag}"),
			)),
		}
	}
}

impl<A: Marshal, B: Marshal> Marshal for (A, B) {
	const WIRE_SIZE: Option<u64> = match (A::WIRE_SIZE, B::WIRE_SIZE) {
		(Some(a), Some(b)) => Some(a + b),
		_ => None,
	};

	fn marshall(&self, sink: &mut RegionSink<'_>) -> io::Result<()> {
		self.0.marshall(sink)?;
		self.1.marshall(sink)
	}

	fn ingest(source: &mut RegionSource<'_>) -> io::Result<Self> {
		Ok((A::ingest(source)?, B::ingest(source)?))
	}
}

impl<T: Marshal, const N: usize> Marshal for [T; N] {
	const WIRE_SIZE: Option<u64> = match T::WIRE_SIZE {
		Some(each) => Some(each * N as u64),
		None => None,
	};

	fn marshall(&self, sink: &mut RegionSink<'_>) -> io::Result<()> {
		for item in self {
			item.marshall(sink)?;
		}
		Ok(())
	}

	fn ingest(source: &mut RegionSource<'_>) -> io::Result<Self> {
		let mut items = Vec::with_capacity(N);
		for _ in 0..N {
			items.push(T::ingest(source)?);
		}
		items
			.try_into()
			.map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "array length mismatch"))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn to_bytes<T: Marshal>(value: &T) -> Vec<u8> {
		let mut out = Vec::new();
		value
			.marshall(&mut |region| {
				out.extend_from_slice(region);
				Ok(())
			})
			.unwrap();
		out
	}

	fn from_bytes<T: Marshal>(bytes: &[u8]) -> io::Result<T> {
		let mut pos = 0;
		let mut source = |dst: &mut [u8]| {
			let end = pos + dst.len();
			assert!(end <= bytes.len(), "ingest drained past the marshalled bytes");
			dst.copy_from_slice(&bytes[pos..end]);
			pos = end;
			Ok(())
		};
		let value = T::ingest(&mut source)?;
		assert_eq!(pos, bytes.len(), "ingest left marshalled bytes behind");
		Ok(value)
	}

	fn roundtrip<T: Marshal + PartialEq + std::fmt::Debug>(value: T) {
		let bytes = to_bytes(&value);
		if let Some(n) = T::WIRE_SIZE {
			assert_eq!(bytes.len() as u64, n);
		}
		assert_eq!(from_bytes::<T>(&bytes).unwrap(), value);
	}

	#[test]
	fn fixed_layouts() {
		roundtrip(42u64);
		roundtrip(-7i32);
		roundtrip(3.25f64);
		roundtrip(true);
		roundtrip(u8::MAX);
	}

	#[test]
	fn fixed_layouts_are_little_endian() {
		assert_eq!(to_bytes(&0x0102_0304u32), vec![4, 3, 2, 1]);
	}

	#[test]
	fn strings() {
		roundtrip(String::from("hello-world"));
		roundtrip(String::new());
		assert!(String::WIRE_SIZE.is_none());
	}

	#[test]
	fn rejects_non_utf8_string() {
		let mut bytes = to_bytes(&(2u64));
		bytes.extend_from_slice(&[0xff, 0xfe]);
		assert!(from_bytes::<String>(&bytes).is_err());
	}

	#[test]
	fn vectors() {
		roundtrip(vec![42i32; 10]);
		roundtrip(Vec::<u64>::new());
		roundtrip(vec![String::from("a"), String::from("bb")]);
	}

	#[test]
	fn vector_layout_is_length_prefix_plus_elements() {
		let bytes = to_bytes(&vec![1u8, 2, 3]);
		assert_eq!(bytes.len(), 8 + 3);
		assert_eq!(&bytes[..8], &3u64.to_le_bytes());
		assert_eq!(&bytes[8..], &[1, 2, 3]);
	}

	#[test]
	fn options() {
		roundtrip(Some(42u32));
		roundtrip(None::<u32>);
		roundtrip(Some(String::from("x")));
		assert!(from_bytes::<Option<u8>>(&[9]).is_err());
	}

	#[test]
	fn tuples_concatenate_their_parts() {
		roundtrip((42u32, -1i64));
		roundtrip((String::from("k"), vec![1u8, 2]));
		assert_eq!(<(u32, i64)>::WIRE_SIZE, Some(12));
		assert!(<(u32, String)>::WIRE_SIZE.is_none());
	}

	#[test]
	fn arrays_are_fixed_when_their_elements_are() {
		roundtrip([1u16, 2, 3]);
		roundtrip([String::from("a"), String::from("b")]);
		assert_eq!(<[u16; 3]>::WIRE_SIZE, Some(6));
		assert!(<[String; 2]>::WIRE_SIZE.is_none());
	}
}
