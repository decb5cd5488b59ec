// Copyright (c) 2013-2015 Sandstorm Development Group, Inc. and contributors
// Licensed under the MIT License:
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN
// THE SOFTWARE.

//! Capability pointers and the per-message capability table.
//!
//! A capability pointer on the wire only carries an index. The index is
//! resolved against the [`CapTable`] owned by the message, whose entries
//! are opaque hooks supplied by whatever RPC layer sits on top.

use alloc::boxed::Box;
use alloc::vec::Vec;

/// A reference to a capability, as seen by the serialization layer.
pub trait ClientHook: Send + Sync {
    /// Returns a new reference to the same capability.
    fn add_ref(&self) -> Box<dyn ClientHook>;

    /// If this capability is associated with an rpc connection, then this method
    /// returns an identifier for that connection.
    fn get_brand(&self) -> usize;

    /// Returns a (locally) unique identifier for this capabilitiy.
    fn get_ptr(&self) -> usize;
}

impl Clone for Box<dyn ClientHook> {
    fn clone(&self) -> Self {
        self.add_ref()
    }
}

impl core::fmt::Debug for dyn ClientHook {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "ClientHook({:#x})", self.get_ptr())
    }
}

/// Ordered table of the capabilities referenced from a message.
#[derive(Default)]
pub struct CapTable {
    hooks: Vec<Option<Box<dyn ClientHook>>>,
}

impl CapTable {
    pub fn new() -> CapTable {
        CapTable { hooks: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Appends `hook` and returns the index a capability pointer should carry.
    pub fn inject_cap(&mut self, hook: Box<dyn ClientHook>) -> u32 {
        self.hooks.push(Some(hook));
        self.hooks.len() as u32 - 1
    }

    /// Returns a new reference to the capability at `index`, if there is one.
    pub fn extract_cap(&self, index: u32) -> Option<Box<dyn ClientHook>> {
        match self.hooks.get(index as usize) {
            Some(Some(hook)) => Some(hook.add_ref()),
            _ => None,
        }
    }

    /// Releases the entry at `index`. Indices of other entries do not move.
    pub fn drop_cap(&mut self, index: u32) {
        if let Some(slot) = self.hooks.get_mut(index as usize) {
            *slot = None;
        }
    }
}

impl core::fmt::Debug for CapTable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.hooks.iter()).finish()
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use super::ClientHook;
    use alloc::boxed::Box;

    /// A capability that only knows its own identity.
    pub struct LocalHook(pub usize);

    impl ClientHook for LocalHook {
        fn add_ref(&self) -> Box<dyn ClientHook> {
            Box::new(LocalHook(self.0))
        }
        fn get_brand(&self) -> usize {
            0
        }
        fn get_ptr(&self) -> usize {
            self.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_util::LocalHook;
    use super::CapTable;
    use alloc::boxed::Box;

    #[test]
    fn inject_extract_drop() {
        let mut table = CapTable::new();
        assert_eq!(table.inject_cap(Box::new(LocalHook(7))), 0);
        assert_eq!(table.inject_cap(Box::new(LocalHook(9))), 1);
        assert_eq!(table.extract_cap(1).map(|h| h.get_ptr()), Some(9));
        table.drop_cap(0);
        assert!(table.extract_cap(0).is_none());
        assert_eq!(table.extract_cap(1).map(|h| h.get_ptr()), Some(9));
        assert!(table.extract_cap(2).is_none());
        assert_eq!(table.len(), 2);
    }
}
