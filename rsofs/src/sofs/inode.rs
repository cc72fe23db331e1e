use super::*;
use crate::sofs::consist::check_inode_in_use;

impl<R: Backend> Sofs<R> {
	/// Fetch an inode slot without the in-use checks. The free-list and the
	/// consistency checker are the only callers that may see free inodes.
	pub(crate) fn get_inode_raw(&mut self, inr: u32) -> Result<Inode> {
		if inr >= self.superblock.itotal {
			return Err(Error::BadArgument);
		}
		let addr = self.superblock.inode_addr(inr);
		Ok(self.file.decode_at(addr)?)
	}

	pub(crate) fn put_inode_raw(&mut self, inr: u32, ino: &Inode) -> Result<()> {
		if inr >= self.superblock.itotal {
			return Err(Error::BadArgument);
		}
		let addr = self.superblock.inode_addr(inr);
		self.file.encode_at(addr, ino)?;
		Ok(())
	}

	/// Read an in-use inode. The time of last access is refreshed in place.
	pub fn read_inode(&mut self, inr: u32) -> Result<Inode> {
		log::trace!("read_inode({inr});");
		let mut ino = self.get_inode_raw(inr)?;
		check_inode_in_use(&ino)?;

		if self.write_enabled() {
			if let InodeAux::Used { mtime, .. } = ino.aux {
				ino.aux = InodeAux::Used {
					atime: self.now(),
					mtime,
				};
			}
			self.put_inode_raw(inr, &ino)?;
		}
		Ok(ino)
	}

	/// Write over an in-use inode slot. The times of last access and last
	/// modification are both set to now.
	pub fn write_inode(&mut self, inr: u32, ino: &Inode) -> Result<()> {
		log::trace!("write_inode({inr});");
		self.assert_rw()?;

		let cur = self.get_inode_raw(inr)?;
		check_inode_in_use(&cur)?;

		let now = self.now();
		let mut ino = ino.clone();
		ino.aux = InodeAux::Used {
			atime: now,
			mtime: now,
		};
		self.put_inode_raw(inr, &ino)
	}

	/// Check the inode's permission bits against a requested operation, a
	/// combination of [`R`], [`W`] and [`X`].
	///
	/// root is always granted reading and writing, and execution whenever
	/// any of the three execute bits is set.
	pub fn access_granted(&mut self, inr: u32, op: u16) -> Result<()> {
		if op == 0 || op & !(R | W | X) != 0 {
			return Err(Error::BadArgument);
		}
		let ino = self.read_inode(inr)?;

		if self.uid == 0 && self.gid == 0 {
			if op & X != 0 && ino.mode & (X << 6 | X << 3 | X) == 0 {
				return Err(Error::AccessDenied);
			}
			return Ok(());
		}

		let class = if ino.owner == self.uid {
			6
		} else if ino.group == self.gid {
			3
		} else {
			0
		};
		if (ino.mode >> class) & op == op {
			Ok(())
		} else {
			Err(Error::AccessDenied)
		}
	}
}
