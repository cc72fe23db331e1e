use super::*;

impl<R: Backend> Sofs<R> {
	/// The target path stored in a symlink's first data cluster, a
	/// NUL-terminated string of `size` bytes.
	pub(crate) fn symlink_target(&mut self, inr: u32, ino: &Inode) -> Result<String> {
		if !ino.is_symlink() {
			return Err(Error::BadArgument);
		}
		let len = ino.size as usize;
		if len == 0 || len > MAX_PATH {
			log::error!("symlink {inr} has target length {len}");
			return Err(Error::DirEntryInvalid);
		}

		let mut buf = vec![0u8; BSLPC];
		self.read_file_cluster(inr, 0, &mut buf)?;
		if buf[len] != 0 || buf[0..len].contains(&0) {
			log::error!("symlink {inr} target is not NUL-terminated at {len}");
			return Err(Error::DirEntryInvalid);
		}
		Ok(String::from_utf8_lossy(&buf[0..len]).into_owned())
	}

	/// Store a symlink's target and set its size to the target length.
	pub(crate) fn symlink_store(&mut self, inr: u32, target: &str) -> Result<()> {
		let b = target.as_bytes();
		let mut buf = vec![0u8; BSLPC];
		buf[0..b.len()].copy_from_slice(b);
		self.write_file_cluster(inr, 0, &buf)?;

		let mut ino = self.read_inode(inr)?;
		ino.size = b.len() as u32;
		self.write_inode(inr, &ino)
	}
}

#[cfg(test)]
mod t {
	use super::*;
	use crate::sofs::t::harness;

	#[test]
	fn target_roundtrip() {
		let (_f, mut fs) = harness(1024);
		let inr = fs.alloc_inode(InodeType::Symlink).unwrap();
		fs.symlink_store(inr, "/some/where").unwrap();

		let ino = fs.read_inode(inr).unwrap();
		assert_eq!(ino.size, "/some/where".len() as u32);
		assert_eq!(ino.clucount, 1);
		let target = fs.symlink_target(inr, &ino).unwrap();
		assert_eq!(target, "/some/where");
	}

	#[test]
	fn non_symlink_rejected() {
		let (_f, mut fs) = harness(256);
		let root = fs.read_inode(ROOT_INODE).unwrap();
		assert!(matches!(
			fs.symlink_target(ROOT_INODE, &root),
			Err(Error::BadArgument)
		));
	}
}
