// Copyright (c) 2013-2016 Sandstorm Development Group, Inc. and contributors
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

//! Calls and resolutions parked on a capability that has not resolved yet.

use futures::channel::oneshot;
use futures::TryFutureExt;

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use anyptr::capability::Promise;
use anyptr::Error;

struct Inner<In, Out>
where
    In: 'static,
    Out: 'static,
{
    next_id: u64,
    map: BTreeMap<u64, (In, oneshot::Sender<Out>)>,
}

/// A FIFO of values, each paired with the sender half of a promise. Entries come
/// out of `drain()` in the order they were pushed.
pub struct SenderQueue<In, Out>
where
    In: 'static,
    Out: 'static,
{
    inner: Rc<RefCell<Inner<In, Out>>>,
}

/// Takes an entry back out of the queue if its promise is dropped before the
/// queue is drained.
struct Remover<In, Out>
where
    In: 'static,
    Out: 'static,
{
    id: u64,
    inner: Weak<RefCell<Inner<In, Out>>>,
}

impl<In, Out> Drop for Remover<In, Out>
where
    In: 'static,
    Out: 'static,
{
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            // Dropped after the borrow ends; the value may own hooks with Drop side effects.
            let removed = inner.borrow_mut().map.remove(&self.id);
            drop(removed);
        }
    }
}

impl<In, Out> SenderQueue<In, Out>
where
    In: 'static,
    Out: 'static,
{
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                next_id: 0,
                map: BTreeMap::new(),
            })),
        }
    }

    /// Parks `value`. The returned promise completes once whoever drains the
    /// queue answers this entry.
    pub fn push(&mut self, value: In) -> Promise<Out, Error> {
        let (sender, receiver) = oneshot::channel();
        let id = self.insert(value, sender);
        let remover = Remover {
            id,
            inner: Rc::downgrade(&self.inner),
        };
        Promise::from_future(
            receiver
                .map_err(|_| Error::failed("queued call was dropped before it resolved".into()))
                .map_ok(move |out| {
                    drop(remover);
                    out
                }),
        )
    }

    /// Parks `value` without anyone waiting on the answer.
    pub fn push_detach(&mut self, value: In) {
        let (sender, _receiver) = oneshot::channel();
        self.insert(value, sender);
    }

    /// Removes every parked entry, oldest first.
    pub fn drain(&mut self) -> Drain<In, Out> {
        let map = std::mem::take(&mut self.inner.borrow_mut().map);
        Drain {
            iter: map.into_values(),
        }
    }

    fn insert(&mut self, value: In, sender: oneshot::Sender<Out>) -> u64 {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.map.insert(id, (value, sender));
        id
    }
}

pub struct Drain<In, Out> {
    iter: std::collections::btree_map::IntoValues<u64, (In, oneshot::Sender<Out>)>,
}

impl<In, Out> Iterator for Drain<In, Out> {
    type Item = (In, oneshot::Sender<Out>);
    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next()
    }
}
