use super::*;
use crate::sofs::consist::ClusterStatus;

impl<R: Backend> Sofs<R> {
	pub(crate) fn fct_get(&mut self, slot: u32) -> Result<u32> {
		if slot >= self.superblock.dzone_total {
			return Err(Error::FctInvalid);
		}
		let addr = self.superblock.fct_addr(slot);
		Ok(self.file.decode_at(addr)?)
	}

	pub(crate) fn fct_put(&mut self, slot: u32, r: u32) -> Result<()> {
		if slot >= self.superblock.dzone_total {
			return Err(Error::FctInvalid);
		}
		let addr = self.superblock.fct_addr(slot);
		self.file.encode_at(addr, &r)?;
		Ok(())
	}

	/// Allocate a free data cluster.
	///
	/// The reference comes from the retrieval cache; an empty cache is
	/// replenished from the FIFO first.
	pub fn alloc_cluster(&mut self) -> Result<u32> {
		log::trace!("alloc_cluster();");
		self.assert_rw()?;

		if self.superblock.dzone_free == 0 {
			return Err(Error::NoSpace);
		}
		if self.superblock.dzone_retriev.cache_idx as usize == DZONE_CACHE_SIZE {
			self.replenish()?;
		}

		let idx = self.superblock.dzone_retriev.cache_idx as usize;
		if idx >= DZONE_CACHE_SIZE {
			return Err(Error::FreeCacheInvalid);
		}
		let nclust = self.superblock.dzone_retriev.cache[idx];
		if nclust == 0 || nclust >= self.superblock.dzone_total {
			log::error!("alloc_cluster(): cache slot {idx} holds {nclust:#x}");
			return Err(Error::FreeCacheInvalid);
		}
		self.superblock.dzone_retriev.cache[idx] = NULL_CLUSTER;
		self.superblock.dzone_retriev.cache_idx += 1;
		self.superblock.dzone_free -= 1;
		self.store_sb()?;

		log::trace!("alloc_cluster(): {nclust}");
		Ok(nclust)
	}

	/// Free a data cluster.
	///
	/// The reference goes to the insertion cache; a full cache is depleted
	/// into the FIFO first. Cluster 0 belongs to the root directory and an
	/// already-free cluster is rejected.
	pub fn free_cluster(&mut self, nclust: u32) -> Result<()> {
		log::trace!("free_cluster({nclust});");
		self.assert_rw()?;

		if nclust == 0 || nclust >= self.superblock.dzone_total {
			return Err(Error::BadArgument);
		}
		if self.cluster_status(nclust)? == ClusterStatus::Free {
			return Err(Error::ClusterNotAllocated);
		}

		if self.superblock.dzone_insert.cache_idx as usize == DZONE_CACHE_SIZE {
			self.deplete()?;
		}
		let idx = self.superblock.dzone_insert.cache_idx as usize;
		self.superblock.dzone_insert.cache[idx] = nclust;
		self.superblock.dzone_insert.cache_idx += 1;
		self.superblock.dzone_free += 1;
		self.store_sb()
	}

	/// Move up to `min(dzone_free, DZONE_CACHE_SIZE)` references from the
	/// FIFO head into the retrieval cache, draining each FIFO slot to
	/// `NULL_CLUSTER`. If the FIFO runs dry mid-refill the insertion cache
	/// is depleted into it and the walk resumes.
	fn replenish(&mut self) -> Result<()> {
		let want = (self.superblock.dzone_free as usize).min(DZONE_CACHE_SIZE);
		let total = self.superblock.dzone_total;
		let mut index = self.superblock.tbfreeclust_head;
		let mut n = DZONE_CACHE_SIZE - want;

		while n < DZONE_CACHE_SIZE {
			if index == self.superblock.tbfreeclust_tail {
				break;
			}
			let r = self.fct_get(index)?;
			if r == NULL_CLUSTER {
				log::error!("replenish(): FIFO slot {index} is empty");
				return Err(Error::FctInvalid);
			}
			self.superblock.dzone_retriev.cache[n] = r;
			self.fct_put(index, NULL_CLUSTER)?;
			index = (index + 1) % total;
			n += 1;
		}

		if n < DZONE_CACHE_SIZE {
			// FIFO exhausted: flush the insertion cache into it and go on.
			self.deplete()?;
			while n < DZONE_CACHE_SIZE {
				let r = self.fct_get(index)?;
				if r == NULL_CLUSTER {
					log::error!("replenish(): FIFO slot {index} is empty after deplete");
					return Err(Error::FctInvalid);
				}
				self.superblock.dzone_retriev.cache[n] = r;
				self.fct_put(index, NULL_CLUSTER)?;
				index = (index + 1) % total;
				n += 1;
			}
		}

		self.superblock.dzone_retriev.cache_idx = (DZONE_CACHE_SIZE - want) as u32;
		self.superblock.tbfreeclust_head = index;
		Ok(())
	}

	/// Flush the insertion cache into the FIFO at the tail.
	fn deplete(&mut self) -> Result<()> {
		let total = self.superblock.dzone_total;
		let mut index = self.superblock.tbfreeclust_tail;

		for cycle in 0..self.superblock.dzone_insert.cache_idx as usize {
			let r = self.superblock.dzone_insert.cache[cycle];
			self.fct_put(index, r)?;
			self.superblock.dzone_insert.cache[cycle] = NULL_CLUSTER;
			index = (index + 1) % total;
		}

		self.superblock.dzone_insert.cache_idx = 0;
		self.superblock.tbfreeclust_tail = index;
		Ok(())
	}
}

#[cfg(test)]
mod t {
	use super::*;
	use crate::sofs::t::harness;

	#[test]
	fn alloc_free_roundtrips_dzone_free() {
		let (_f, mut fs) = harness(1024);
		let free = fs.sb().dzone_free;
		let cl = fs.alloc_cluster().unwrap();
		assert!(cl >= 1 && cl < fs.sb().dzone_total);
		assert_eq!(fs.sb().dzone_free, free - 1);
		fs.free_cluster(cl).unwrap();
		assert_eq!(fs.sb().dzone_free, free);
		fs.check_dzone().unwrap();
	}

	/// The first allocation finds the cache empty and replenishes from the
	/// FIFO head.
	#[test]
	fn first_alloc_replenishes() {
		let (_f, mut fs) = harness(1024);
		assert_eq!(
			fs.sb().dzone_retriev.cache_idx as usize,
			DZONE_CACHE_SIZE
		);
		let cl = fs.alloc_cluster().unwrap();
		assert_eq!(cl, 1);
		assert_eq!(fs.sb().dzone_retriev.cache_idx, 1);
		assert_eq!(fs.sb().tbfreeclust_head, 51);
	}

	#[test]
	fn free_cluster_zero_rejected() {
		let (_f, mut fs) = harness(1024);
		assert!(matches!(fs.free_cluster(0), Err(Error::BadArgument)));
	}

	#[test]
	fn double_free_rejected() {
		let (_f, mut fs) = harness(1024);
		let cl = fs.alloc_cluster().unwrap();
		fs.free_cluster(cl).unwrap();
		assert!(matches!(
			fs.free_cluster(cl),
			Err(Error::ClusterNotAllocated)
		));
		// still sitting in the FIFO after format
		assert!(matches!(
			fs.free_cluster(200),
			Err(Error::ClusterNotAllocated)
		));
	}

	/// Fill the insertion cache past capacity so it depletes into the FIFO.
	#[test]
	fn deplete_on_full_insertion_cache() {
		let (_f, mut fs) = harness(1024);
		let mut got = Vec::new();
		for _ in 0..(DZONE_CACHE_SIZE + 10) {
			got.push(fs.alloc_cluster().unwrap());
		}
		for cl in &got {
			fs.free_cluster(*cl).unwrap();
		}
		assert!(fs.sb().dzone_insert.cache_idx as usize <= DZONE_CACHE_SIZE);
		fs.check_dzone().unwrap();
	}

	/// Allocate every cluster: the refs are distinct, in range, and the pool
	/// ends empty; freeing everything restores the census.
	#[test]
	fn allocate_all_then_free_all() {
		let (_f, mut fs) = harness(1024);
		let free = fs.sb().dzone_free;
		let total = fs.sb().dzone_total;
		let mut got = Vec::new();
		loop {
			match fs.alloc_cluster() {
				Ok(cl) => got.push(cl),
				Err(Error::NoSpace) => break,
				Err(e) => panic!("unexpected error: {e}"),
			}
		}
		assert_eq!(got.len(), free as usize);
		let mut sorted = got.clone();
		sorted.sort_unstable();
		sorted.dedup();
		assert_eq!(sorted.len(), got.len());
		assert!(sorted.iter().all(|cl| *cl >= 1 && *cl < total));

		// A replenish that finds the FIFO exhausted must deplete and resume.
		for cl in got.iter().rev() {
			fs.free_cluster(*cl).unwrap();
		}
		assert_eq!(fs.sb().dzone_free, free);
		fs.check_dzone().unwrap();

		// and the pool is fully reusable afterwards
		for _ in 0..free {
			fs.alloc_cluster().unwrap();
		}
		assert!(matches!(fs.alloc_cluster(), Err(Error::NoSpace)));
	}

	/// Replenish mid-drain: empty the FIFO into the cache, park frees in the
	/// insertion cache, then force the retrieval cache to refill from a FIFO
	/// that only deplete can restock.
	#[test]
	fn replenish_exhausts_fifo_then_depletes() {
		let (_f, mut fs) = harness(256);
		let free = fs.sb().dzone_free as usize;
		let mut got = Vec::new();
		for _ in 0..free {
			got.push(fs.alloc_cluster().unwrap());
		}
		// everything allocated; FIFO and caches are drained
		assert_eq!(fs.sb().dzone_free, 0);
		assert_eq!(
			fs.sb().tbfreeclust_head,
			fs.sb().tbfreeclust_tail
		);

		// park a handful in the insertion cache, then allocate again: the
		// replenish must pull them through a deplete
		for cl in got.iter().take(5) {
			fs.free_cluster(*cl).unwrap();
		}
		let back = fs.alloc_cluster().unwrap();
		assert!(got[0..5].contains(&back));
		fs.check_dzone().unwrap();
	}
}
