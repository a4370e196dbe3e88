//! Client slot table.
//!
//! Slots are indices into a vector that grows lazily up to the configured
//! capacity. Freed indices go onto a free list and are reused first, so
//! finding a slot is O(1). A slot holds either nothing or a live
//! connection: freeing drops the connection, which closes its socket.

use std::net::SocketAddr;
use tokio::net::TcpStream;

/// Default number of client slots.
pub const DEFAULT_MAX_CLIENTS: usize = 10;

/// An accepted client connection.
#[derive(Debug)]
pub struct ClientConn {
    pub stream: TcpStream,
    pub peer_addr: SocketAddr,
}

impl ClientConn {
    pub fn new(stream: TcpStream, peer_addr: SocketAddr) -> Self {
        Self { stream, peer_addr }
    }
}

/// Bounded table of client connections indexed by slot.
#[derive(Debug)]
pub struct ClientTable<T> {
    slots: Vec<Option<T>>,
    free: Vec<usize>,
    occupied: usize,
    capacity: Option<usize>,
}

impl<T> ClientTable<T> {
    /// Create a table. `None` means no upper bound on slots.
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            occupied: 0,
            capacity,
        }
    }

    /// Configured upper bound on slots.
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.occupied
    }

    pub fn is_empty(&self) -> bool {
        self.occupied == 0
    }

    pub fn is_full(&self) -> bool {
        self.find_free_slot().is_none()
    }

    /// Index a new connection would be placed at, if any.
    pub fn find_free_slot(&self) -> Option<usize> {
        if let Some(&index) = self.free.last() {
            return Some(index);
        }
        match self.capacity {
            Some(cap) if self.slots.len() >= cap => None,
            _ => Some(self.slots.len()),
        }
    }

    /// Install a connection into a free slot.
    ///
    /// Returns the connection back if `index` is occupied or out of range.
    pub fn occupy(&mut self, index: usize, conn: T) -> Result<(), T> {
        if index == self.slots.len() {
            if self.capacity.is_some_and(|cap| index >= cap) {
                return Err(conn);
            }
            self.slots.push(Some(conn));
        } else {
            match self.slots.get_mut(index) {
                Some(slot) if slot.is_none() => *slot = Some(conn),
                _ => return Err(conn),
            }
            if let Some(pos) = self.free.iter().rposition(|&i| i == index) {
                self.free.swap_remove(pos);
            }
        }
        self.occupied += 1;
        Ok(())
    }

    /// Place a connection in the next free slot.
    ///
    /// Returns the connection back when the table is full.
    pub fn insert(&mut self, conn: T) -> Result<usize, T> {
        match self.find_free_slot() {
            Some(index) => self.occupy(index, conn).map(|()| index),
            None => Err(conn),
        }
    }

    /// Free a slot, returning its connection. Freeing a free slot is a no-op.
    pub fn free(&mut self, index: usize) -> Option<T> {
        let conn = self.slots.get_mut(index)?.take()?;
        self.free.push(index);
        self.occupied -= 1;
        Some(conn)
    }

    /// Free every occupied slot. Returns how many were freed.
    pub fn free_all(&mut self) -> usize {
        let indices = self.indices();
        let count = indices.len();
        for index in indices {
            drop(self.free(index));
        }
        count
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.slots.get(index)?.as_ref()
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.slots.get_mut(index)?.as_mut()
    }

    /// Occupied slot indices in ascending order.
    pub fn indices(&self) -> Vec<usize> {
        self.iter().map(|(index, _)| index).collect()
    }

    /// Occupied slots in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|conn| (index, conn)))
    }
}
