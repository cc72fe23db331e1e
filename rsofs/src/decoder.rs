use std::io::{BufRead, Error, ErrorKind, Result, Seek, SeekFrom, Write};

use bincode::{
	config::{Configuration, Fixint, LittleEndian, NoLimit},
	Decode, Encode,
};

/// All on-disk integers are fixed-width little-endian.
pub(crate) const CONFIG: Configuration<LittleEndian, Fixint, NoLimit> =
	bincode::config::standard()
		.with_fixed_int_encoding()
		.with_little_endian();

/// Positioned codec over the block reader.
#[derive(Debug)]
pub struct Decoder<T> {
	inner: T,
}

impl<T: BufRead> Decoder<T> {
	pub fn new(inner: T) -> Self {
		Self { inner }
	}

	pub fn inner(&self) -> &T {
		&self.inner
	}

	pub fn inner_mut(&mut self) -> &mut T {
		&mut self.inner
	}

	pub fn decode<X: Decode>(&mut self) -> Result<X> {
		bincode::decode_from_std_read(&mut self.inner, CONFIG)
			.map_err(|_| Error::new(ErrorKind::InvalidInput, "failed to decode"))
	}

	pub fn read(&mut self, buf: &mut [u8]) -> Result<()> {
		self.inner.read_exact(buf)
	}
}

impl<T: BufRead + Seek> Decoder<T> {
	pub fn seek(&mut self, pos: u64) -> Result<()> {
		self.inner.seek(SeekFrom::Start(pos))?;
		Ok(())
	}

	pub fn seek_relative(&mut self, off: i64) -> Result<()> {
		self.inner.seek(SeekFrom::Current(off))?;
		Ok(())
	}

	pub fn pos(&mut self) -> Result<u64> {
		self.inner.stream_position()
	}

	pub fn decode_at<X: Decode>(&mut self, pos: u64) -> Result<X> {
		self.seek(pos)?;
		self.decode()
	}

	pub fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> Result<()> {
		self.seek(pos)?;
		self.read(buf)
	}
}

impl<T: BufRead + Write> Decoder<T> {
	pub fn encode<X: Encode>(&mut self, x: &X) -> Result<()> {
		bincode::encode_into_std_write(x, &mut self.inner, CONFIG)
			.map(|_| ())
			.map_err(|_| Error::new(ErrorKind::InvalidInput, "failed to encode"))
	}

	pub fn write(&mut self, buf: &[u8]) -> Result<()> {
		self.inner.write_all(buf)
	}

	pub fn fill(&mut self, byte: u8, mut len: usize) -> Result<()> {
		let chunk = [byte; 64];
		while len > 0 {
			let n = len.min(chunk.len());
			self.inner.write_all(&chunk[0..n])?;
			len -= n;
		}
		Ok(())
	}
}

impl<T: BufRead + Write + Seek> Decoder<T> {
	pub fn encode_at<X: Encode>(&mut self, pos: u64, x: &X) -> Result<()> {
		self.seek(pos)?;
		self.encode(x)
	}

	pub fn write_at(&mut self, pos: u64, buf: &[u8]) -> Result<()> {
		self.seek(pos)?;
		self.write(buf)
	}

	pub fn fill_at(&mut self, pos: u64, byte: u8, len: usize) -> Result<()> {
		self.seek(pos)?;
		self.fill(byte, len)
	}
}

#[cfg(test)]
mod t {
	use std::io::Cursor;

	use super::*;

	#[test]
	fn little_endian_fixed_width() {
		let mut buf = [0u8; 8];
		{
			let mut dec = Decoder::new(Cursor::new(&mut buf[..]));
			dec.encode(&0x1122_3344u32).unwrap();
			dec.encode(&0x55AAu16).unwrap();
		}
		assert_eq!(buf[0..6], [0x44, 0x33, 0x22, 0x11, 0xAA, 0x55]);

		let mut dec = Decoder::new(Cursor::new(&buf[..]));
		assert_eq!(dec.decode::<u32>().unwrap(), 0x1122_3344);
		assert_eq!(dec.decode::<u16>().unwrap(), 0x55AA);
	}

	#[test]
	fn positioned_access() {
		let mut buf = vec![0u8; 64];
		{
			let mut dec = Decoder::new(Cursor::new(&mut buf[..]));
			dec.encode_at(16, &0xDEAD_BEEFu32).unwrap();
			dec.fill_at(32, 0xEE, 8).unwrap();
		}
		let mut dec = Decoder::new(Cursor::new(&buf[..]));
		assert_eq!(dec.decode_at::<u32>(16).unwrap(), 0xDEAD_BEEF);
		assert_eq!(buf[32..40], [0xEE; 8]);
	}
}
