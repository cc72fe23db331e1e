use std::{
	fs::File,
	io::{self, BufRead, Read, Result as IoResult, Seek, SeekFrom, Write},
	path::Path,
};

use crate::data::BLOCK_SIZE;

pub trait Backend: Read + Write + Seek {}

impl<T: Read + Write + Seek> Backend for T {}

/// Block-level access layer.
///
/// `BlockReader` maps random access reads and writes onto whole-block
/// transfers against the backing device. A single block is buffered and
/// written back when the position leaves it.
#[derive(Debug)]
pub struct BlockReader<T: Backend> {
	inner: T,
	block: [u8; BLOCK_SIZE],
	idx:   usize,
	dirty: bool,
	rw:    bool,
}

impl BlockReader<File> {
	pub fn open(path: &Path, rw: bool) -> IoResult<Self> {
		let file = File::options().read(true).write(rw).open(path)?;
		Ok(BlockReader::new(file, rw))
	}
}

impl<T: Backend> BlockReader<T> {
	pub fn new(inner: T, rw: bool) -> Self {
		Self {
			inner,
			block: [0u8; BLOCK_SIZE],
			idx: BLOCK_SIZE,
			dirty: false,
			rw,
		}
	}

	pub fn write_enabled(&self) -> bool {
		self.rw
	}

	/// Get the underlying block size.
	pub fn blksize(&self) -> usize {
		BLOCK_SIZE
	}

	/// Size of the backing device in bytes.
	pub fn nbytes(&mut self) -> IoResult<u64> {
		let pos = self.inner.stream_position()?;
		let end = self.inner.seek(SeekFrom::End(0))?;
		self.inner.seek(SeekFrom::Start(pos))?;
		Ok(end)
	}

	/// Number of whole blocks on the backing device.
	pub fn nblocks(&mut self) -> IoResult<u64> {
		Ok(self.nbytes()? / BLOCK_SIZE as u64)
	}

	fn refill(&mut self) -> IoResult<()> {
		self.flush()?;

		self.block.fill(0u8);
		let mut num = 0;
		while num < self.block.len() {
			match self.inner.read(&mut self.block[num..])? {
				0 => break,
				n => num += n,
			}
		}
		if num < self.block.len() {
			log::error!("BlockReader::refill(): num={num}, eof?");
		}
		self.idx = 0;
		Ok(())
	}

	fn buffered(&self) -> usize {
		self.block.len() - self.idx
	}

	fn refill_if_empty(&mut self) -> IoResult<()> {
		if self.buffered() == 0 {
			self.refill()?;
		}
		Ok(())
	}
}

impl<T: Backend> Read for BlockReader<T> {
	fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
		self.refill_if_empty()?;
		let num = buf.len().min(self.buffered());
		let buf = &mut buf[0..num];
		buf.copy_from_slice(&self.block[self.idx..(self.idx + num)]);
		self.idx += num;
		Ok(num)
	}
}

impl<T: Backend> Write for BlockReader<T> {
	fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
		if !self.rw {
			panic!(
				"BUG: BlockReader::write() should never be called when the medium is not writable"
			);
		}
		self.refill_if_empty()?;
		let num = buf.len().min(self.buffered());
		self.block[self.idx..(self.idx + num)].copy_from_slice(&buf[0..num]);
		self.idx += num;
		self.dirty = true;
		Ok(num)
	}

	fn flush(&mut self) -> IoResult<()> {
		if !self.dirty {
			return Ok(());
		}

		self.inner
			.seek(SeekFrom::Current(-(self.block.len() as i64)))?;

		let mut num = 0;
		while num < self.block.len() {
			match self.inner.write(&self.block[num..])? {
				0 => break,
				n => num += n,
			}
		}
		if num < self.block.len() {
			let pos = self.inner.stream_position()?;
			log::error!("short write: pos={pos}, num={num}, len={}", self.block.len());
		}
		self.dirty = false;
		Ok(())
	}
}

impl<T: Backend> Drop for BlockReader<T> {
	fn drop(&mut self) {
		let _ = self.flush();
	}
}

impl<T: Backend> BufRead for BlockReader<T> {
	fn fill_buf(&mut self) -> IoResult<&[u8]> {
		self.refill_if_empty()?;
		Ok(&self.block[self.idx..])
	}

	fn consume(&mut self, amt: usize) {
		assert!(amt <= self.buffered());
		self.idx += amt;
	}
}

impl<T: Backend> Seek for BlockReader<T> {
	fn seek(&mut self, pos: SeekFrom) -> IoResult<u64> {
		let bs = self.blksize() as u64;
		match pos {
			SeekFrom::Start(pos) => {
				self.flush()?;
				let real = self.inner.seek(SeekFrom::Start(pos / bs * bs))?;
				let rem = pos - real;
				assert!(rem < bs);

				self.refill()?;
				self.idx = rem as usize;

				Ok(real + rem)
			}
			SeekFrom::Current(offset) => {
				let real = self.inner.stream_position()?;
				let cur = real - self.block.len() as u64 + self.idx as u64;
				let newidx = offset + self.idx as i64;
				if newidx >= 0 && newidx < self.blksize() as i64 {
					// The data is already buffered; just adjust the pointer
					self.idx = newidx as usize;
					Ok(real - self.block.len() as u64 + newidx as u64)
				} else if cur as i64 + offset < 0 {
					Err(io::Error::from_raw_os_error(libc::EINVAL))
				} else {
					self.seek(SeekFrom::Start((cur as i64 + offset) as u64))
				}
			}
			SeekFrom::End(offset) => {
				let end = self.nbytes()?;
				let target = end as i64 + offset;
				if target < 0 {
					return Err(io::Error::from_raw_os_error(libc::EINVAL));
				}
				self.seek(SeekFrom::Start(target as u64))
			}
		}
	}
}
