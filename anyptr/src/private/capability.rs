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

use crate::any_pointer;
use crate::capability::{Params, Promise, RemotePromise, Request, Results};
use crate::MessageSize;

pub trait ResponseHook {
    fn get(&self) -> crate::Result<any_pointer::Reader<'_>>;
}

pub trait RequestHook {
    fn get(&mut self) -> any_pointer::Builder<'_>;
    fn send(self: Box<Self>) -> RemotePromise<any_pointer::Owned>;
}

pub trait ClientHook {
    fn add_ref(&self) -> Box<dyn ClientHook>;
    fn new_call(
        &self,
        interface_id: u64,
        method_id: u16,
        size_hint: Option<MessageSize>,
    ) -> Request<any_pointer::Owned, any_pointer::Owned>;

    fn call(
        &self,
        interface_id: u64,
        method_id: u16,
        params: Box<dyn ParamsHook>,
        results: Box<dyn ResultsHook>,
    ) -> Promise<(), crate::Error>;

    /// Returns a (locally) unique identifier for this capability.
    fn get_ptr(&self) -> usize;

    /// If this ClientHook is a promise that has already resolved, returns the inner, resolved
    /// version of the capability. The caller may permanently replace this client with the
    /// resolved one if desired. Returns None if the client isn't a promise or hasn't resolved
    /// yet; use `when_more_resolved()` to distinguish between them.
    fn get_resolved(&self) -> Option<Box<dyn ClientHook>>;

    /// If this client is a settled reference (not a promise), returns None. Otherwise, returns a
    /// promise that eventually resolves to a new client that is closer to being the final,
    /// settled client. Calling this repeatedly should eventually produce a settled client.
    fn when_more_resolved(&self) -> Option<Promise<Box<dyn ClientHook>, crate::Error>>;

    /// Repeatedly calls `when_more_resolved()` until it returns None.
    fn when_resolved(&self) -> Promise<(), crate::Error>;
}

impl Clone for Box<dyn ClientHook> {
    fn clone(&self) -> Self {
        self.add_ref()
    }
}

pub trait ResultsHook {
    fn get(&mut self) -> crate::Result<any_pointer::Builder<'_>>;
}

pub trait ParamsHook {
    fn get(&self) -> crate::Result<any_pointer::Reader<'_>>;
}

pub fn internal_get_typed_params<T>(typeless: Params<any_pointer::Owned>) -> Params<T> {
    Params {
        hook: typeless.hook,
        marker: core::marker::PhantomData,
    }
}

pub fn internal_get_typed_results<T>(typeless: Results<any_pointer::Owned>) -> Results<T> {
    Results {
        hook: typeless.hook,
        marker: core::marker::PhantomData,
    }
}

/// A call that is either still in flight or has already produced its results.
///
/// Hooks are shared: every `any_pointer::Pipeline` derived from one call holds
/// its own reference, obtained through `add_ref()`.
pub trait PipelineHook {
    fn add_ref(&self) -> Box<dyn PipelineHook>;

    /// Returns a capability standing for whatever `ops` leads to within the
    /// call's results. Never blocks; if the results are not in yet, the
    /// returned capability queues calls until they are.
    fn get_pipelined_cap(&self, ops: &[PipelineOp]) -> Box<dyn ClientHook>;

    /// Version of get_pipelined_cap() passing the array by move. May avoid a copy in some cases.
    /// Default implementation just calls the other version.
    fn get_pipelined_cap_move(&self, ops: Vec<PipelineOp>) -> Box<dyn ClientHook> {
        self.get_pipelined_cap(&ops)
    }
}

impl Clone for Box<dyn PipelineHook> {
    fn clone(&self) -> Self {
        self.add_ref()
    }
}

/// One step along the path from a call's results to a pipelined capability.
/// Mirrors `PromisedAnswer.Op` in the RPC protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineOp {
    /// Does nothing. Exists so that an empty path can still be named on the wire.
    Noop,

    /// Follows the pointer field at the given index of the current struct.
    GetPointerField(u16),
}
