use super::*;
use crate::sofs::consist::check_free_inode;

impl<R: Backend> Sofs<R> {
	/// Allocate a free inode of the given type.
	///
	/// The head of the free list is unlinked, marked in use and initialised:
	/// type bit set with no permissions, owner and group taken from the
	/// mount credentials, sizes and references cleared, both timestamps set
	/// to now.
	pub fn alloc_inode(&mut self, kind: InodeType) -> Result<u32> {
		log::trace!("alloc_inode({kind:?});");
		self.assert_rw()?;

		if self.superblock.ifree == 0 {
			return Err(Error::NoSpace);
		}
		let head = self.superblock.ihdtl;
		if head == NULL_INODE || head >= self.superblock.itotal {
			log::error!("alloc_inode(): ifree={} but ihdtl={head}", self.superblock.ifree);
			return Err(Error::FreeInodeListInvalid);
		}

		let node = self.get_inode_raw(head)?;
		check_free_inode(&node)?;
		let Some((prev, next)) = node.free_links() else {
			return Err(Error::FreeInodeInvalid);
		};

		if prev == next {
			if prev == head {
				// the list had a single element
				self.superblock.ihdtl = NULL_INODE;
			} else {
				// two elements: the survivor becomes self-linked
				let mut other = self.get_inode_raw(next)?;
				check_free_inode(&other)?;
				other.set_free_links(next, next);
				self.put_inode_raw(next, &other)?;
				self.superblock.ihdtl = next;
			}
		} else {
			let mut nxt = self.get_inode_raw(next)?;
			check_free_inode(&nxt)?;
			let Some((_, nxt_next)) = nxt.free_links() else {
				return Err(Error::FreeInodeInvalid);
			};
			nxt.set_free_links(prev, nxt_next);
			self.put_inode_raw(next, &nxt)?;

			let mut prv = self.get_inode_raw(prev)?;
			check_free_inode(&prv)?;
			let Some((prv_prev, _)) = prv.free_links() else {
				return Err(Error::FreeInodeInvalid);
			};
			prv.set_free_links(prv_prev, next);
			self.put_inode_raw(prev, &prv)?;

			self.superblock.ihdtl = next;
		}

		let now = self.now();
		let ino = Inode::new_used(kind, self.uid, self.gid, now);
		self.put_inode_raw(head, &ino)?;

		self.superblock.ifree -= 1;
		self.store_sb()?;

		log::trace!("alloc_inode(): {head}");
		Ok(head)
	}

	/// Return an inode to the free list.
	///
	/// The inode must be in use with no remaining directory entries
	/// (`refcount == 0`) and no data clusters. It is appended at the tail of
	/// the circular list, right before `ihdtl`. Inode 0 can never be freed.
	pub fn free_inode(&mut self, inr: u32) -> Result<()> {
		log::trace!("free_inode({inr});");
		self.assert_rw()?;

		if inr == ROOT_INODE || inr >= self.superblock.itotal {
			return Err(Error::BadArgument);
		}
		let mut ino = self.get_inode_raw(inr)?;
		if ino.is_free() {
			return Err(Error::InodeInUseInvalid);
		}
		if ino.refcount != 0 {
			return Err(Error::BadArgument);
		}
		if ino.clucount != 0 ||
			ino.direct.iter().any(|r| *r != NULL_CLUSTER) ||
			ino.i1 != NULL_CLUSTER ||
			ino.i2 != NULL_CLUSTER
		{
			log::error!("free_inode({inr}): data clusters still attached");
			return Err(Error::InodeRefListInvalid);
		}

		let head = self.superblock.ihdtl;
		let (prev, next) = if head == NULL_INODE {
			// empty list: the node links to itself
			self.superblock.ihdtl = inr;
			(inr, inr)
		} else {
			let mut h = self.get_inode_raw(head)?;
			check_free_inode(&h)?;
			let Some((h_prev, h_next)) = h.free_links() else {
				return Err(Error::FreeInodeListInvalid);
			};
			if h_prev == head {
				// single element
				h.set_free_links(inr, inr);
				self.put_inode_raw(head, &h)?;
				(head, head)
			} else {
				h.set_free_links(inr, h_next);
				self.put_inode_raw(head, &h)?;

				let mut tail = self.get_inode_raw(h_prev)?;
				check_free_inode(&tail)?;
				let Some((tail_prev, _)) = tail.free_links() else {
					return Err(Error::FreeInodeListInvalid);
				};
				tail.set_free_links(tail_prev, inr);
				self.put_inode_raw(h_prev, &tail)?;
				(h_prev, head)
			}
		};

		ino.mode = INODE_FREE;
		ino.aux = InodeAux::Free { prev, next };
		self.put_inode_raw(inr, &ino)?;

		self.superblock.ifree += 1;
		self.store_sb()
	}
}
