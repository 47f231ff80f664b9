//! Priority-ordered wait queue
//!
//! Очередь отправителей: сначала по приоритету (старший первым), внутри
//! приоритета — FIFO.
//! Sender queue: ordered by priority (highest first), FIFO within a
//! priority.
//!
//! # Layout
//!
//! Nodes live in a slot vector and are addressed by [`NodeId`]. Nodes of
//! equal priority form a cyclic ring; the first node of each ring carries a
//! [`Level`] that links it to the neighbouring rings' heads, highest
//! priority on top.
//!
//! # Invariants
//!
//! - Empty list: `top.is_none()`
//! - Ring of one: `next == prev == self`
//! - Exactly one node per ring carries `level`, and it is the ring's
//!   oldest member
//! - Levels are strictly decreasing in priority from `top` down
//!
//! `first`, `insert` at an existing level's tail and `remove` are O(1);
//! inserting at a new level walks the levels above it.

use alloc::vec::Vec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    #[inline]
    pub(crate) const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, Copy)]
struct Level {
    up: Option<u32>,
    down: Option<u32>,
}

struct Node<T> {
    item: T,
    prio: u8,
    next: u32,
    prev: u32,
    level: Option<Level>,
}

enum Slot<T> {
    Used(Node<T>),
    Free(Option<u32>),
}

pub struct PrioList<T> {
    slots: Vec<Slot<T>>,
    free: Option<u32>,
    top: Option<u32>,
    len: usize,
}

impl<T> PrioList<T> {
    pub const fn new() -> Self {
        Self { slots: Vec::new(), free: None, top: None, len: 0 }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.top.is_none()
    }

    /// Oldest entry of the highest priority.
    #[inline]
    pub fn first_id(&self) -> Option<NodeId> {
        self.top.map(NodeId)
    }

    #[inline]
    pub fn first(&self) -> Option<&T> {
        self.top.map(|i| &self.node(i).item)
    }

    pub fn get(&self, id: NodeId) -> Option<&T> {
        match self.slots.get(id.0 as usize) {
            Some(Slot::Used(n)) => Some(&n.item),
            _ => None,
        }
    }

    pub fn prio(&self, id: NodeId) -> Option<u8> {
        match self.slots.get(id.0 as usize) {
            Some(Slot::Used(n)) => Some(n.prio),
            _ => None,
        }
    }

    /// Queue `item` behind every entry of priority `prio` or higher.
    pub fn insert(&mut self, item: T, prio: u8) -> NodeId {
        let idx = self.alloc(item, prio);
        self.len += 1;

        let mut above = None;
        let mut cur = self.top;
        while let Some(h) = cur {
            let hp = self.node(h).prio;
            if hp == prio {
                // Existing level: append at the ring's tail.
                let tail = self.node(h).prev;
                {
                    let n = self.node_mut(idx);
                    n.next = h;
                    n.prev = tail;
                }
                self.node_mut(tail).next = idx;
                self.node_mut(h).prev = idx;
                return NodeId(idx);
            }
            if hp < prio {
                break;
            }
            above = Some(h);
            cur = self.level(h).down;
        }

        // New level between `above` and `cur`.
        self.node_mut(idx).level = Some(Level { up: above, down: cur });
        match above {
            Some(a) => self.level_mut(a).down = Some(idx),
            None => self.top = Some(idx),
        }
        if let Some(c) = cur {
            self.level_mut(c).up = Some(idx);
        }
        NodeId(idx)
    }

    /// Unlink `id` and return its entry.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not in the list.
    pub fn remove(&mut self, id: NodeId) -> T {
        let idx = id.0;
        let (next, prev, level) = {
            let n = self.node(idx);
            (n.next, n.prev, n.level)
        };

        if next == idx {
            // Last of its priority: drop the level.
            if let Some(l) = level {
                self.relink_level(l, None);
            }
        } else {
            self.node_mut(prev).next = next;
            self.node_mut(next).prev = prev;
            if let Some(l) = level {
                // The next oldest takes over as head of the ring.
                self.node_mut(next).level = Some(l);
                self.relink_level(l, Some(next));
            }
        }

        self.len -= 1;
        let slot = core::mem::replace(&mut self.slots[idx as usize], Slot::Free(self.free));
        self.free = Some(idx);
        match slot {
            Slot::Used(n) => n.item,
            Slot::Free(_) => unreachable!(),
        }
    }

    /// Entries in dequeue order.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter { list: self, head: self.top, cur: self.top }
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    fn alloc(&mut self, item: T, prio: u8) -> u32 {
        let node = |idx| Node { item, prio, next: idx, prev: idx, level: None };
        match self.free {
            Some(idx) => {
                let next_free = match self.slots[idx as usize] {
                    Slot::Free(n) => n,
                    Slot::Used(_) => unreachable!("free list points at a used slot"),
                };
                self.free = next_free;
                self.slots[idx as usize] = Slot::Used(node(idx));
                idx
            }
            None => {
                let idx = self.slots.len() as u32;
                self.slots.push(Slot::Used(node(idx)));
                idx
            }
        }
    }

    /// Point the neighbours of level `l` at `with` (or past it when `None`).
    fn relink_level(&mut self, l: Level, with: Option<u32>) {
        let (down_target, up_target) = match with {
            Some(w) => (Some(w), Some(w)),
            None => (l.down, l.up),
        };
        match l.up {
            Some(u) => self.level_mut(u).down = down_target,
            None => self.top = down_target,
        }
        if let Some(d) = l.down {
            self.level_mut(d).up = up_target;
        }
    }

    fn node(&self, idx: u32) -> &Node<T> {
        match &self.slots[idx as usize] {
            Slot::Used(n) => n,
            Slot::Free(_) => panic!("node {} is not in the list", idx),
        }
    }

    fn node_mut(&mut self, idx: u32) -> &mut Node<T> {
        match &mut self.slots[idx as usize] {
            Slot::Used(n) => n,
            Slot::Free(_) => panic!("node {} is not in the list", idx),
        }
    }

    fn level(&self, idx: u32) -> Level {
        self.node(idx).level.unwrap_or_else(|| panic!("node {} heads no level", idx))
    }

    fn level_mut(&mut self, idx: u32) -> &mut Level {
        match &mut self.node_mut(idx).level {
            Some(l) => l,
            None => panic!("node {} heads no level", idx),
        }
    }
}

impl<T> Default for PrioList<T> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Iter<'a, T> {
    list: &'a PrioList<T>,
    head: Option<u32>,
    cur: Option<u32>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = (NodeId, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let c = self.cur?;
        let head = self.head?;
        let node = self.list.node(c);

        if node.next == head {
            self.head = self.list.level(head).down;
            self.cur = self.head;
        } else {
            self.cur = Some(node.next);
        }
        Some((NodeId(c), &node.item))
    }
}
