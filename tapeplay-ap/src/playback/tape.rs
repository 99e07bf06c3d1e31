//! CircularEventBuffer ("tape")
//!
//! Fixed-capacity ring of PlaybackEvents. The window `[left, right)` holds
//! already-played history on the left of the head, the currently playing
//! event at the head, and queued events to its right.
//!
//! ```text
//!   left          head                right
//!    |  history    |  current  queued...  |
//! ```
//!
//! Slots live in a `Vec<Option<T>>` arena. Positions are tracked as a
//! physical `left` index plus logical offsets from it, all `usize`, and the
//! physical slot is always `(left + offset) % capacity`, so no index can
//! ever go negative under wraparound. Slots outside the window are `None`.

/// Fixed-capacity ring buffer with a movable head
#[derive(Debug)]
pub struct CircularEventBuffer<T> {
    slots: Vec<Option<T>>,

    /// Physical index of the leftmost element
    left: usize,

    /// Number of elements in the window
    len: usize,

    /// Logical offset of the head from `left` (`head == len` means no current element)
    head: usize,
}

impl<T> CircularEventBuffer<T> {
    /// Create an empty buffer
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be > 0");

        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);

        Self {
            slots,
            left: 0,
            len: 0,
            head: 0,
        }
    }

    fn physical(&self, offset: usize) -> usize {
        (self.left + offset) % self.slots.len()
    }

    /// Insert at the head
    ///
    /// Replaces the current element when there is one and returns it. When
    /// the head sits at the right end the window grows by one; if the window
    /// is already at capacity the value is handed back as `Err`.
    pub fn write(&mut self, value: T) -> Result<Option<T>, T> {
        if self.head == self.len {
            if self.len == self.capacity() {
                return Err(value);
            }
            let idx = self.physical(self.head);
            self.slots[idx] = Some(value);
            self.len += 1;
            return Ok(None);
        }

        let idx = self.physical(self.head);
        Ok(self.slots[idx].replace(value))
    }

    /// Append at the right end, evicting the leftmost element when full
    ///
    /// Returns the evicted element. If the evicted element was the head, the
    /// head moves on to the element after it.
    pub fn shift_right(&mut self, value: T) -> Option<T> {
        let evicted = if self.len == self.capacity() {
            let evicted = self.slots[self.left].take();
            self.left = (self.left + 1) % self.capacity();
            self.len -= 1;
            self.head = self.head.saturating_sub(1);
            evicted
        } else {
            None
        };

        let idx = self.physical(self.len);
        self.slots[idx] = Some(value);
        self.len += 1;
        evicted
    }

    /// Current element (the head)
    pub fn read(&self) -> Option<&T> {
        self.get(self.head)
    }

    /// Mutable access to the current element
    pub fn read_mut(&mut self) -> Option<&mut T> {
        self.get_mut(self.head)
    }

    /// Move the head one element to the right
    ///
    /// The previous head stays in the window as history. Returns false when
    /// there is no current element.
    pub fn advance(&mut self) -> bool {
        if self.head < self.len {
            self.head += 1;
            true
        } else {
            false
        }
    }

    /// Element `index` positions right of the head (0 = current)
    pub fn get_right(&self, index: usize) -> Option<&T> {
        self.get(self.head + index)
    }

    /// Mutable element `index` positions right of the head (0 = current)
    pub fn get_right_mut(&mut self, index: usize) -> Option<&mut T> {
        self.get_mut(self.head + index)
    }

    /// Elements from the head to the right end, in order
    pub fn slice_right(&self) -> Vec<&T> {
        (self.head..self.len).filter_map(|o| self.get(o)).collect()
    }

    /// Every element in the window, left to right
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        (0..self.len).filter_map(move |o| self.get(o))
    }

    /// Every element in the window, in arena order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> + '_ {
        self.slots.iter_mut().filter_map(Option::as_mut)
    }

    /// First element in the window matching `predicate`
    pub fn find_mut<P>(&mut self, mut predicate: P) -> Option<&mut T>
    where
        P: FnMut(&T) -> bool,
    {
        let offset = (0..self.len).find(|&o| self.get(o).map_or(false, &mut predicate))?;
        self.get_mut(offset)
    }

    /// Number of elements in the window (history included)
    pub fn size(&self) -> usize {
        self.len
    }

    /// Number of elements from the head to the right end
    pub fn lookahead(&self) -> usize {
        self.len - self.head
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn get(&self, offset: usize) -> Option<&T> {
        if offset >= self.len {
            return None;
        }
        self.slots[self.physical(offset)].as_ref()
    }

    fn get_mut(&mut self, offset: usize) -> Option<&mut T> {
        if offset >= self.len {
            return None;
        }
        let idx = self.physical(offset);
        self.slots[idx].as_mut()
    }
}
