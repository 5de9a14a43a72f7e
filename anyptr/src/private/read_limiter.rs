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

#[cfg(feature = "sync_reader")]
pub use sync::ReadLimiter;

#[cfg(feature = "sync_reader")]
mod sync {
    use crate::{Error, ErrorKind, Result};
    use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    pub struct ReadLimiter {
        limit: AtomicUsize,
        limit_reached: AtomicBool,
    }

    impl ReadLimiter {
        pub fn new(limit: Option<usize>) -> Self {
            match limit {
                Some(value) => Self {
                    limit: AtomicUsize::new(value),
                    limit_reached: AtomicBool::new(false),
                },
                None => Self {
                    limit: AtomicUsize::new(usize::MAX),
                    limit_reached: AtomicBool::new(false),
                },
            }
        }

        #[inline]
        pub fn can_read(&self, amount: usize) -> Result<()> {
            // We use separate AtomicUsize and AtomicBool to avoid a compare-and-swap loop.
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
}

#[cfg(not(feature = "sync_reader"))]
pub use unsync::ReadLimiter;

#[cfg(not(feature = "sync_reader"))]
mod unsync {
    use crate::{Error, ErrorKind, Result};
    use core::cell::Cell;

    pub struct ReadLimiter {
        limit: Cell<usize>,
    }

    impl ReadLimiter {
        pub fn new(limit: Option<usize>) -> Self {
            Self {
                limit: Cell::new(limit.unwrap_or(usize::MAX)),
            }
        }

        #[inline]
        pub fn can_read(&self, amount: usize) -> Result<()> {
            let current = self.limit.get();
            if amount > current {
                Err(Error::from_kind(ErrorKind::ReadLimitExceeded))
            } else {
                self.limit.set(current - amount);
                Ok(())
            }
        }
    }
}
