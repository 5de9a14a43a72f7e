// Copyright (c) 2013-2017 Sandstorm Development Group, Inc. and contributors
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

//! Local capabilities and promise pipelining for [anyptr](https://docs.rs/anyptr) messages.
//!
//! A capability wraps either a `Server` running in this process or a promise
//! for some other capability. Calls made on a promise are queued and
//! forwarded, in order, once the promise resolves. A call's results can be
//! pipelined: `RemotePromise::pipeline` hands out capabilities for pointers
//! within results that have not arrived yet.
//!
//! Everything here is single-threaded. Hooks are reference-counted with `Rc`
//! and futures are driven by whichever task polls them.

use anyptr::capability::{FromClientHook, Promise, Server};
use anyptr::private::capability::ClientHook;
use anyptr::{message, Error, MessageSize};

use futures::{Future, FutureExt, TryFutureExt};

use std::rc::Rc;

/// Like `?`, but for functions that return a `Promise<T, E>` rather than a `Result<T, E>`.
///
/// Unwraps a `Result<T, E>`. In the case of an error `Err(e)`, immediately returns from the
/// enclosing function with `Promise::err(e)`.
#[macro_export]
macro_rules! pry {
    ($expr:expr) => {
        match $expr {
            ::std::result::Result::Ok(val) => val,
            ::std::result::Result::Err(err) => {
                return ::anyptr::capability::Promise::err(::std::convert::From::from(err))
            }
        }
    };
}

pub mod broken;
pub mod local;
pub mod queued;
mod sender_queue;

/// Creates a new local capability that dispatches calls to `server`.
pub fn new_client<C, S>(server: S) -> C
where
    C: FromClientHook,
    S: Server + 'static,
{
    C::new(Box::new(local::Client::new(Box::new(server))))
}

/// Converts a promise for a client into a client that queues up any calls
/// that arrive before the promise resolves. If the promise fails, the client
/// becomes broken and every call on it fails with the promise's error.
pub fn new_promise_client<T, F>(client_promise: F) -> T
where
    T: FromClientHook,
    F: Future<Output = Result<T, Error>> + 'static,
{
    let mut queued_client = queued::Client::new(None);
    let weak_client = Rc::downgrade(&queued_client.inner);
    queued_client.drive(Promise::from_future(client_promise.map(move |result| {
        if let Some(inner) = weak_client.upgrade() {
            queued::ClientInner::resolve(&inner, result.map(FromClientHook::into_client_hook));
        }
        Ok(())
    })));
    T::new(Box::new(queued_client))
}

/// Creates a capability whose calls all fail with `error`.
pub fn new_broken_client<T: FromClientHook>(error: Error) -> T {
    T::new(broken::new_cap(error))
}

pub(crate) fn default_when_resolved_impl<C>(client: &C) -> Promise<(), Error>
where
    C: ClientHook + ?Sized,
{
    match client.when_more_resolved() {
        Some(promise) => Promise::from_future(
            promise.and_then(|resolution| resolution.when_resolved()),
        ),
        None => Promise::ok(()),
    }
}

fn new_message(size_hint: Option<MessageSize>) -> message::Builder<message::HeapAllocator> {
    match size_hint {
        None => message::Builder::new_default(),
        Some(hint) => {
            let words = hint
                .word_count
                .saturating_add(1)
                .min(1 << 29) as u32;
            message::Builder::new(message::HeapAllocator::new().first_segment_words(words))
        }
    }
}
