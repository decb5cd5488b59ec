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

use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::{Error, ErrorKind, Result};

/// Charges every dereference against a budget of words, so that a message
/// whose pointers alias the same object cannot be made to look arbitrarily
/// large to a reader.
///
/// Atomics let a finished message be shared by concurrent readers.
#[derive(Debug)]
pub struct ReadLimiter {
    limit: AtomicUsize,
    limit_reached: AtomicBool,
    enabled: bool,
}

impl ReadLimiter {
    pub fn new(limit: Option<usize>) -> ReadLimiter {
        ReadLimiter {
            limit: AtomicUsize::new(limit.unwrap_or(usize::MAX)),
            limit_reached: AtomicBool::new(false),
            enabled: limit.is_some(),
        }
    }

    #[inline]
    pub fn can_read(&self, amount: usize) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.limit_reached.load(Ordering::Relaxed) {
            return Err(Error::from_kind(ErrorKind::ReadLimitExceeded));
        }

        let prev_limit = self.limit.fetch_sub(amount, Ordering::Relaxed);
        if prev_limit == amount {
            self.limit_reached.store(true, Ordering::Relaxed);
        } else if prev_limit < amount {
            self.limit_reached.store(true, Ordering::Relaxed);
            return Err(Error::from_kind(ErrorKind::ReadLimitExceeded));
        }

        Ok(())
    }
}
