use bincode::{
	de::Decoder,
	enc::Encoder,
	error::{DecodeError, EncodeError},
	Decode, Encode,
};

use crate::data::*;

impl Inode {
	/// A free inode, linked into the free list at `prev`/`next`.
	pub fn new_free(prev: u32, next: u32) -> Self {
		Self {
			mode:     INODE_FREE,
			refcount: 0,
			owner:    0,
			group:    0,
			size:     0,
			clucount: 0,
			aux:      InodeAux::Free { prev, next },
			direct:   [NULL_CLUSTER; N_DIRECT],
			i1:       NULL_CLUSTER,
			i2:       NULL_CLUSTER,
		}
	}

	/// A freshly allocated inode of the given type with no permissions.
	pub fn new_used(kind: InodeType, owner: u32, group: u32, now: u32) -> Self {
		Self {
			mode:     kind.mode_bit(),
			refcount: 0,
			owner,
			group,
			size:     0,
			clucount: 0,
			aux:      InodeAux::Used {
				atime: now,
				mtime: now,
			},
			direct:   [NULL_CLUSTER; N_DIRECT],
			i1:       NULL_CLUSTER,
			i2:       NULL_CLUSTER,
		}
	}

	pub fn is_free(&self) -> bool {
		self.mode & INODE_FREE != 0
	}

	pub fn is_dir(&self) -> bool {
		self.mode & INODE_DIR != 0
	}

	pub fn is_file(&self) -> bool {
		self.mode & INODE_FILE != 0
	}

	pub fn is_symlink(&self) -> bool {
		self.mode & INODE_SYMLINK != 0
	}

	pub fn kind(&self) -> InodeType {
		match self.mode & INODE_TYPE_MASK {
			INODE_FILE => InodeType::RegularFile,
			INODE_DIR => InodeType::Directory,
			INODE_SYMLINK => InodeType::Symlink,
			mode => unreachable!("invalid file mode: {mode:#x}"),
		}
	}

	pub fn perm(&self) -> u16 {
		self.mode & PERM_MASK
	}

	/// Free-list links; `None` when the inode is in use.
	pub fn free_links(&self) -> Option<(u32, u32)> {
		match self.aux {
			InodeAux::Free { prev, next } => Some((prev, next)),
			InodeAux::Used { .. } => None,
		}
	}

	pub fn set_free_links(&mut self, prev: u32, next: u32) {
		self.aux = InodeAux::Free { prev, next };
	}

	pub fn atime(&self) -> u32 {
		match self.aux {
			InodeAux::Used { atime, .. } => atime,
			InodeAux::Free { .. } => 0,
		}
	}

	pub fn mtime(&self) -> u32 {
		match self.aux {
			InodeAux::Used { mtime, .. } => mtime,
			InodeAux::Free { .. } => 0,
		}
	}
}

impl Decode for Inode {
	fn decode<D: Decoder>(d: &mut D) -> Result<Self, DecodeError> {
		let mode = u16::decode(d)?;
		let refcount = u16::decode(d)?;
		let owner = u32::decode(d)?;
		let group = u32::decode(d)?;
		let size = u32::decode(d)?;
		let clucount = u32::decode(d)?;
		let v1 = u32::decode(d)?;
		let v2 = u32::decode(d)?;
		let direct = <[u32; N_DIRECT]>::decode(d)?;
		let i1 = u32::decode(d)?;
		let i2 = u32::decode(d)?;

		// The overlaid pair is discriminated by the FREE bit.
		let aux = if mode & INODE_FREE != 0 {
			InodeAux::Free { prev: v1, next: v2 }
		} else {
			InodeAux::Used {
				atime: v1,
				mtime: v2,
			}
		};

		Ok(Self {
			mode,
			refcount,
			owner,
			group,
			size,
			clucount,
			aux,
			direct,
			i1,
			i2,
		})
	}
}

impl Encode for Inode {
	fn encode<E: Encoder>(&self, e: &mut E) -> Result<(), EncodeError> {
		let (v1, v2) = match self.aux {
			InodeAux::Free { prev, next } => (prev, next),
			InodeAux::Used { atime, mtime } => (atime, mtime),
		};
		self.mode.encode(e)?;
		self.refcount.encode(e)?;
		self.owner.encode(e)?;
		self.group.encode(e)?;
		self.size.encode(e)?;
		self.clucount.encode(e)?;
		v1.encode(e)?;
		v2.encode(e)?;
		self.direct.encode(e)?;
		self.i1.encode(e)?;
		self.i2.encode(e)?;
		Ok(())
	}
}
