use super::*;

/// Allocation status of a data cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterStatus {
	Allocated,
	Free,
}

/// A free inode carries the FREE flag alone and no directory entries.
pub(crate) fn check_free_inode(ino: &Inode) -> crate::error::Result<()> {
	if ino.mode != INODE_FREE || ino.refcount != 0 {
		log::error!(
			"free inode is inconsistent: mode={:#x}, refcount={}",
			ino.mode,
			ino.refcount
		);
		return Err(Error::FreeInodeInvalid);
	}
	Ok(())
}

/// An in-use inode carries exactly one type bit, no FREE flag and nothing
/// outside the permission bits.
pub(crate) fn check_inode_in_use(ino: &Inode) -> crate::error::Result<()> {
	if ino.mode & INODE_FREE != 0 {
		return Err(Error::InodeInUseInvalid);
	}
	let kind = ino.mode & INODE_TYPE_MASK;
	if kind.count_ones() != 1 || ino.mode & !(INODE_TYPE_MASK | PERM_MASK) != 0 {
		log::error!("inode in use is inconsistent: mode={:#x}", ino.mode);
		return Err(Error::InodeInUseInvalid);
	}
	Ok(())
}

impl<R: Backend> Sofs<R> {
	/// Check the layout described by the superblock header.
	pub(crate) fn check_superblock(&self) -> Result<()> {
		let sb = self.sb();

		let header_ok = (sb.magic == MAGIC || sb.magic == MAGIC_INCOMPLETE) &&
			sb.version == VERSION &&
			sb.name.contains(&0) &&
			(sb.mstat == MSTAT_CLEAN || sb.mstat == MSTAT_DIRTY);
		if !header_ok {
			log::error!("superblock header corrupted: {sb:?}");
			return Err(Error::SuperBlockHeaderInvalid);
		}

		let layout_ok = sb.itable_start == 1 &&
			sb.tbfreeclust_start == 1 + sb.itable_size &&
			sb.dzone_start == sb.tbfreeclust_start + sb.tbfreeclust_size &&
			sb.ntotal ==
				1 + sb.itable_size +
					sb.tbfreeclust_size +
					sb.dzone_total * BLOCKS_PER_CLUSTER as u32;
		if !layout_ok {
			log::error!("superblock layout corrupted: {sb:?}");
			return Err(Error::SuperBlockHeaderInvalid);
		}
		Ok(())
	}

	/// Check the inode-table metadata: every inode is either free or in use,
	/// the free census matches `ifree`, and the free list is a well-formed
	/// circular double-linked chain of exactly `ifree` nodes.
	pub(crate) fn check_itable(&mut self) -> Result<()> {
		let sb = self.sb();
		let itotal = sb.itotal;
		let ifree = sb.ifree;
		let ihdtl = sb.ihdtl;

		if sb.itotal != sb.itable_size * IPB as u32 || ifree >= itotal {
			log::error!("inode table metadata corrupted: itotal={itotal}, ifree={ifree}");
			return Err(Error::InodeTableInvalid);
		}
		if ifree == 0 {
			if ihdtl != NULL_INODE {
				return Err(Error::FreeInodeListInvalid);
			}
		} else if ihdtl >= itotal {
			return Err(Error::FreeInodeListInvalid);
		}

		// census over the whole table
		let mut nfree = 0u32;
		for inr in 0..itotal {
			let ino = self.get_inode_raw(inr)?;
			if ino.is_free() {
				check_free_inode(&ino)?;
				nfree += 1;
			} else {
				check_inode_in_use(&ino)?;
			}
		}
		if nfree != ifree {
			log::error!("free inode census mismatch: counted {nfree}, superblock says {ifree}");
			return Err(Error::InodeTableInvalid);
		}

		// walk the circular list
		if ifree > 0 {
			let mut cur = ihdtl;
			for _ in 0..ifree {
				let ino = self.get_inode_raw(cur)?;
				let Some((prev, next)) = ino.free_links() else {
					return Err(Error::FreeInodeListInvalid);
				};
				if prev >= itotal || next >= itotal {
					return Err(Error::FreeInodeListInvalid);
				}
				let nxt = self.get_inode_raw(next)?;
				match nxt.free_links() {
					Some((nxt_prev, _)) if nxt_prev == cur => {}
					_ => {
						log::error!("free list back-link broken at inode {cur}");
						return Err(Error::FreeInodeListInvalid);
					}
				}
				cur = next;
			}
			if cur != ihdtl {
				log::error!("free list does not close after {ifree} nodes");
				return Err(Error::FreeInodeListInvalid);
			}
		}
		Ok(())
	}

	/// Check the data-zone metadata: cache shapes, the FIFO segment between
	/// head and tail, and the free census against `dzone_free`.
	pub(crate) fn check_dzone(&mut self) -> Result<()> {
		let (total, head, tail, ncached) = {
			let sb = self.sb();
			let total = sb.dzone_total;

			if sb.dzone_free >= total {
				log::error!(
					"data zone metadata corrupted: total={total}, free={}",
					sb.dzone_free
				);
				return Err(Error::DataZoneInvalid);
			}
			if sb.tbfreeclust_head >= total || sb.tbfreeclust_tail >= total {
				return Err(Error::FctInvalid);
			}
			if sb.tbfreeclust_size * (RPB as u32) < total {
				return Err(Error::FctInvalid);
			}

			let in_range = |r: u32| r >= 1 && r < total;

			// retrieval cache: the valid region runs from cache_idx up
			let retriev = &sb.dzone_retriev;
			let ridx = retriev.cache_idx as usize;
			if ridx > DZONE_CACHE_SIZE {
				return Err(Error::FreeCacheInvalid);
			}
			if retriev.cache[0..ridx].iter().any(|r| *r != NULL_CLUSTER) ||
				retriev.cache[ridx..].iter().any(|r| !in_range(*r))
			{
				log::error!("retrieval cache corrupted: {retriev:?}");
				return Err(Error::FreeCacheInvalid);
			}

			// insertion cache: the valid region runs from 0 to cache_idx
			let insert = &sb.dzone_insert;
			let iidx = insert.cache_idx as usize;
			if iidx > DZONE_CACHE_SIZE {
				return Err(Error::FreeCacheInvalid);
			}
			if insert.cache[0..iidx].iter().any(|r| !in_range(*r)) ||
				insert.cache[iidx..].iter().any(|r| *r != NULL_CLUSTER)
			{
				log::error!("insertion cache corrupted: {insert:?}");
				return Err(Error::FreeCacheInvalid);
			}

			let ncached = (DZONE_CACHE_SIZE - ridx) as u32 + iidx as u32;
			(total, sb.tbfreeclust_head, sb.tbfreeclust_tail, ncached)
		};

		// occupied FIFO segment [head, tail)
		let mut nfifo = 0u32;
		let mut index = head;
		while index != tail {
			let r = self.fct_get(index)?;
			if r < 1 || r >= total {
				log::error!("FIFO slot {index} holds {r:#x}");
				return Err(Error::FctInvalid);
			}
			nfifo += 1;
			index = (index + 1) % total;
		}

		// drained complement [tail, head)
		if head != tail {
			let mut index = tail;
			while index != head {
				let r = self.fct_get(index)?;
				if r != NULL_CLUSTER {
					log::error!("drained FIFO slot {index} holds {r:#x}");
					return Err(Error::FctInvalid);
				}
				index = (index + 1) % total;
			}
		}

		if ncached + nfifo != self.sb().dzone_free {
			log::error!(
				"free cluster census mismatch: cached={ncached}, fifo={nfifo}, superblock says {}",
				self.sb().dzone_free
			);
			return Err(Error::DataZoneInvalid);
		}
		Ok(())
	}

	/// Search the caches and the FIFO for a reference to the cluster.
	pub(crate) fn cluster_status(&mut self, nclust: u32) -> Result<ClusterStatus> {
		if nclust >= self.sb().dzone_total {
			return Err(Error::BadArgument);
		}

		let sb = self.sb();
		let ridx = (sb.dzone_retriev.cache_idx as usize).min(DZONE_CACHE_SIZE);
		if sb.dzone_retriev.cache[ridx..].contains(&nclust) {
			return Ok(ClusterStatus::Free);
		}
		let iidx = (sb.dzone_insert.cache_idx as usize).min(DZONE_CACHE_SIZE);
		if sb.dzone_insert.cache[0..iidx].contains(&nclust) {
			return Ok(ClusterStatus::Free);
		}

		let total = sb.dzone_total;
		let tail = sb.tbfreeclust_tail;
		let mut index = sb.tbfreeclust_head;
		while index != tail {
			if self.fct_get(index)? == nclust {
				return Ok(ClusterStatus::Free);
			}
			index = (index + 1) % total;
		}
		Ok(ClusterStatus::Allocated)
	}

	/// Recount the cluster references of an in-use inode against `clucount`
	/// and probe that every referenced cluster is actually allocated.
	pub(crate) fn check_inode_refs(&mut self, ino: &Inode) -> Result<()> {
		let total = self.sb().dzone_total;
		let mut count = 0u32;
		let mut data = Vec::new();

		for r in ino.direct {
			if r == NULL_CLUSTER {
				continue;
			}
			if r >= total {
				return Err(Error::InodeRefListInvalid);
			}
			count += 1;
			data.push(r);
		}

		if ino.i1 != NULL_CLUSTER {
			if ino.i1 >= total {
				return Err(Error::InodeRefListInvalid);
			}
			count += 1;
			data.push(ino.i1);
			for r in self.read_ref_cluster(ino.i1)? {
				if r == NULL_CLUSTER {
					continue;
				}
				if r >= total {
					return Err(Error::InodeRefListInvalid);
				}
				count += 1;
				data.push(r);
			}
		}

		if ino.i2 != NULL_CLUSTER {
			if ino.i2 >= total {
				return Err(Error::InodeRefListInvalid);
			}
			count += 1;
			data.push(ino.i2);
			for snd in self.read_ref_cluster(ino.i2)? {
				if snd == NULL_CLUSTER {
					continue;
				}
				if snd >= total {
					return Err(Error::InodeRefListInvalid);
				}
				count += 1;
				data.push(snd);
				for r in self.read_ref_cluster(snd)? {
					if r == NULL_CLUSTER {
						continue;
					}
					if r >= total {
						return Err(Error::InodeRefListInvalid);
					}
					count += 1;
					data.push(r);
				}
			}
		}

		if count != ino.clucount {
			log::error!("clucount mismatch: counted {count}, inode says {}", ino.clucount);
			return Err(Error::InodeRefListInvalid);
		}
		for nclust in data {
			if self.cluster_status(nclust)? == ClusterStatus::Free {
				log::error!("inode references free cluster {nclust}");
				return Err(Error::ClusterNotAllocated);
			}
		}
		Ok(())
	}

	/// Check the shape of a directory: a whole number of clusters, the two
	/// pinned entries first, and every in-use entry naming an in-use inode.
	pub(crate) fn check_dir_contents(&mut self, inr: u32, ino: &Inode) -> Result<()> {
		if !ino.is_dir() {
			return Err(Error::NotDirectory);
		}
		let size = ino.size;
		if size == 0 || size as usize % CLUSTER_SIZE != 0 {
			log::error!("directory {inr} has size {size}");
			return Err(Error::DirInvalid);
		}

		let nclusters = size / CLUSTER_SIZE as u32;
		for ci in 0..nclusters {
			let entries = self.read_dir_cluster(inr, ci)?;
			for (j, e) in entries.iter().enumerate() {
				let idx = ci * DPC as u32 + j as u32;
				match idx {
					0 => {
						if !e.name_is(".") || e.inr != inr {
							return Err(Error::DirInvalid);
						}
					}
					1 => {
						if !e.name_is("..") || e.inr >= self.sb().itotal {
							return Err(Error::DirInvalid);
						}
						let parent = self.get_inode_raw(e.inr)?;
						if parent.is_free() || !parent.is_dir() {
							return Err(Error::DirInvalid);
						}
					}
					_ if e.is_used() => {
						if e.name[MAX_NAME] != 0 || e.inr >= self.sb().itotal {
							return Err(Error::DirEntryInvalid);
						}
						let target = self.get_inode_raw(e.inr)?;
						if target.is_free() {
							log::error!(
								"directory {inr} entry {idx} names free inode {}",
								e.inr
							);
							return Err(Error::DirEntryInvalid);
						}
					}
					_ => {}
				}
			}
		}
		Ok(())
	}
}
