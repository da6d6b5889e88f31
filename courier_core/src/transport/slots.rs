/*!
 * Generation-checked slot arena for active transfers.
 *
 * Freed slots are reused, but every reuse bumps the slot's generation, so a
 * handle that outlived its transfer never resolves to a newer one.
 */

/**
 * Opaque key of an active transfer.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct TransferHandle {
    index: usize,
    generation: u32,
}

enum Slot<T> {
    Occupied { generation: u32, value: T },
    Vacant { generation: u32 },
}

pub(crate) struct Slots<T> {
    slots: Vec<Slot<T>>,
    free: Vec<usize>,
    len: usize,
}

impl<T> Slots<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    pub fn insert(&mut self, value: T) -> TransferHandle {
        self.len += 1;

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index];
            let generation = match slot {
                Slot::Vacant { generation } => generation.wrapping_add(1),
                Slot::Occupied { .. } => unreachable!("free list points at an occupied slot"),
            };
            *slot = Slot::Occupied { generation, value };
            return TransferHandle { index, generation };
        }

        let index = self.slots.len();
        self.slots.push(Slot::Occupied {
            generation: 0,
            value,
        });
        TransferHandle {
            index,
            generation: 0,
        }
    }

    /// Removes and returns the value, or `None` for a stale handle.
    pub fn remove(&mut self, handle: TransferHandle) -> Option<T> {
        let slot = self.slots.get_mut(handle.index)?;
        let live = matches!(slot, Slot::Occupied { generation, .. } if *generation == handle.generation);
        if !live {
            return None;
        }

        let vacant = Slot::Vacant {
            generation: handle.generation,
        };
        match std::mem::replace(slot, vacant) {
            Slot::Occupied { value, .. } => {
                self.free.push(handle.index);
                self.len -= 1;
                Some(value)
            }
            Slot::Vacant { .. } => None,
        }
    }

    #[cfg(test)]
    pub fn get(&self, handle: TransferHandle) -> Option<&T> {
        match self.slots.get(handle.index)? {
            Slot::Occupied { generation, value } if *generation == handle.generation => Some(value),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Drops every value without handing it out. Generations survive, so
    /// handles issued before the clear stay stale.
    pub fn clear(&mut self) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Slot::Occupied { generation, .. } = slot {
                let generation = *generation;
                *slot = Slot::Vacant { generation };
                self.free.push(index);
            }
        }
        self.len = 0;
    }
}
