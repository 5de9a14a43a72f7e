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

//! Stand-ins for capabilities and pipelines that are not known yet.
//!
//! A queued client parks every call it receives until it learns its real
//! target, then forwards the parked calls in the order they arrived. A queued
//! pipeline hands out queued clients for paths into results that have not
//! come back yet.

use anyptr::any_pointer;
use anyptr::capability::Promise;
use anyptr::private::capability::{ClientHook, ParamsHook, PipelineHook, PipelineOp, ResultsHook};
use anyptr::{Error, MessageSize};

use futures::future::Shared;
use futures::{Future, FutureExt, TryFutureExt};

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::sender_queue::SenderQueue;
use crate::{broken, local};

type QueuedCall = (u64, u16, Box<dyn ParamsHook>, Box<dyn ResultsHook>);

pub struct PipelineInner {
    // Set once the call's results are in.
    redirect: Option<Box<dyn PipelineHook>>,

    promise_to_drive: Shared<Promise<(), Error>>,

    clients_to_resolve: SenderQueue<(Weak<RefCell<ClientInner>>, Vec<PipelineOp>), ()>,
}

impl PipelineInner {
    fn resolve(this: &Rc<RefCell<Self>>, result: Result<Box<dyn PipelineHook>, Error>) {
        assert!(this.borrow().redirect.is_none());
        let pipeline = match result {
            Ok(hook) => hook,
            Err(e) => {
                log::trace!("pipeline broken: {e}");
                Box::new(broken::Pipeline::new(e))
            }
        };
        this.borrow_mut().redirect = Some(pipeline.add_ref());

        let waiting: Vec<_> = this.borrow_mut().clients_to_resolve.drain().collect();
        log::trace!("pipeline resolved with {} queued clients", waiting.len());
        for ((weak_client, ops), waiter) in waiting {
            if let Some(client) = weak_client.upgrade() {
                ClientInner::resolve(&client, Ok(pipeline.get_pipelined_cap_move(ops)));
            }
            let _ = waiter.send(());
        }

        this.borrow_mut().promise_to_drive = Promise::ok(()).shared();
    }
}

/// The producing end of a queued pipeline. Resolves the pipeline to a broken
/// one if dropped without being completed.
pub struct PipelineInnerSender {
    inner: Option<Weak<RefCell<PipelineInner>>>,
}

impl PipelineInnerSender {
    pub fn complete(mut self, pipeline: Box<dyn PipelineHook>) {
        self.resolve(Ok(pipeline));
    }

    /// Breaks the pipeline. Every capability derived from it, before or after
    /// this point, fails with `error`.
    pub fn fail(mut self, error: Error) {
        self.resolve(Err(error));
    }

    fn resolve(&mut self, result: Result<Box<dyn PipelineHook>, Error>) {
        if let Some(inner) = self.inner.take().and_then(|weak| weak.upgrade()) {
            PipelineInner::resolve(&inner, result);
        }
    }
}

impl Drop for PipelineInnerSender {
    fn drop(&mut self) {
        self.resolve(Err(Error::failed(
            "pipeline was dropped before its call returned".into(),
        )));
    }
}

pub struct Pipeline {
    inner: Rc<RefCell<PipelineInner>>,
}

impl Pipeline {
    pub fn new() -> (PipelineInnerSender, Self) {
        let inner = Rc::new(RefCell::new(PipelineInner {
            redirect: None,
            promise_to_drive: Promise::ok(()).shared(),
            clients_to_resolve: SenderQueue::new(),
        }));
        (
            PipelineInnerSender {
                inner: Some(Rc::downgrade(&inner)),
            },
            Self { inner },
        )
    }

    /// Adds `promise` to the work that gets polled whenever a call on one of
    /// this pipeline's clients is polled.
    pub fn drive<F>(&mut self, promise: F)
    where
        F: Future<Output = Result<(), Error>> + 'static + Unpin,
    {
        let previous = self.inner.borrow().promise_to_drive.clone();
        let joined = futures::future::try_join(previous, promise).map_ok(|_| ());
        self.inner.borrow_mut().promise_to_drive = Promise::from_future(joined).shared();
    }
}

impl Clone for Pipeline {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl PipelineHook for Pipeline {
    fn add_ref(&self) -> Box<dyn PipelineHook> {
        Box::new(self.clone())
    }

    fn get_pipelined_cap(&self, ops: &[PipelineOp]) -> Box<dyn ClientHook> {
        self.get_pipelined_cap_move(ops.into())
    }

    fn get_pipelined_cap_move(&self, ops: Vec<PipelineOp>) -> Box<dyn ClientHook> {
        if let Some(p) = &self.inner.borrow().redirect {
            return p.get_pipelined_cap_move(ops);
        }

        let mut client = Client::new(Some(self.inner.clone()));
        client.drive(self.inner.borrow().promise_to_drive.clone());
        let weak_client = Rc::downgrade(&client.inner);
        self.inner
            .borrow_mut()
            .clients_to_resolve
            .push_detach((weak_client, ops));
        Box::new(client)
    }
}

pub struct ClientInner {
    // Set once the real target is known.
    redirect: Option<Box<dyn ClientHook>>,

    // Keeps the originating pipeline alive until this client resolves.
    pipeline_inner: Option<Rc<RefCell<PipelineInner>>>,

    promise_to_drive: Option<Shared<Promise<(), Error>>>,

    // Forwarded on resolution, before any when_more_resolved() waiter hears
    // about it, so that calls made in reaction to the resolution land after
    // the queued ones.
    call_forwarding_queue: SenderQueue<QueuedCall, Promise<(), Error>>,

    client_resolution_queue: SenderQueue<(), Box<dyn ClientHook>>,
}

impl ClientInner {
    pub fn resolve(state: &Rc<RefCell<Self>>, result: Result<Box<dyn ClientHook>, Error>) {
        assert!(state.borrow().redirect.is_none());
        let client = match result {
            Ok(hook) => hook,
            Err(e) => broken::new_cap(e),
        };
        state.borrow_mut().redirect = Some(client.add_ref());

        let calls: Vec<_> = state.borrow_mut().call_forwarding_queue.drain().collect();
        log::trace!("forwarding {} queued calls", calls.len());
        for ((interface_id, method_id, params, results), waiter) in calls {
            let _ = waiter.send(client.call(interface_id, method_id, params, results));
        }

        let waiters: Vec<_> = state.borrow_mut().client_resolution_queue.drain().collect();
        for ((), waiter) in waiters {
            let _ = waiter.send(client.add_ref());
        }

        let mut state = state.borrow_mut();
        state.promise_to_drive.take();
        state.pipeline_inner.take();
    }
}

pub struct Client {
    pub inner: Rc<RefCell<ClientInner>>,
}

impl Client {
    pub fn new(pipeline_inner: Option<Rc<RefCell<PipelineInner>>>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ClientInner {
                redirect: None,
                pipeline_inner,
                promise_to_drive: None,
                call_forwarding_queue: SenderQueue::new(),
                client_resolution_queue: SenderQueue::new(),
            })),
        }
    }

    /// Sets the work that gets polled alongside every call made on this client
    /// before it resolves.
    pub fn drive<F>(&mut self, promise: F)
    where
        F: Future<Output = Result<(), Error>> + 'static + Unpin,
    {
        assert!(self.inner.borrow().promise_to_drive.is_none());
        self.inner.borrow_mut().promise_to_drive = Some(Promise::from_future(promise).shared());
    }

    fn while_driving<T>(&self, promise: Promise<T, Error>) -> Promise<T, Error>
    where
        T: 'static,
    {
        match &self.inner.borrow().promise_to_drive {
            Some(p) => Promise::from_future(
                futures::future::try_join(p.clone(), promise).map_ok(|(_, v)| v),
            ),
            None => promise,
        }
    }
}

impl ClientHook for Client {
    fn add_ref(&self) -> Box<dyn ClientHook> {
        Box::new(Self {
            inner: self.inner.clone(),
        })
    }

    fn new_call(
        &self,
        interface_id: u64,
        method_id: u16,
        size_hint: Option<MessageSize>,
    ) -> anyptr::capability::Request<any_pointer::Owned, any_pointer::Owned> {
        anyptr::capability::Request::new(Box::new(local::Request::new(
            interface_id,
            method_id,
            size_hint,
            self.add_ref(),
        )))
    }

    fn call(
        &self,
        interface_id: u64,
        method_id: u16,
        params: Box<dyn ParamsHook>,
        results: Box<dyn ResultsHook>,
    ) -> Promise<(), Error> {
        if let Some(client) = &self.inner.borrow().redirect {
            return client.call(interface_id, method_id, params, results);
        }

        let forwarded = self
            .inner
            .borrow_mut()
            .call_forwarding_queue
            .push((interface_id, method_id, params, results));
        let keep_alive = self.inner.clone();
        self.while_driving(Promise::from_future(async move {
            let call = forwarded.await?;
            let result = call.await;
            drop(keep_alive);
            result
        }))
    }

    fn get_ptr(&self) -> usize {
        Rc::as_ptr(&self.inner) as usize
    }

    fn get_resolved(&self) -> Option<Box<dyn ClientHook>> {
        self.inner.borrow().redirect.as_ref().map(|c| c.add_ref())
    }

    fn when_more_resolved(&self) -> Option<Promise<Box<dyn ClientHook>, Error>> {
        if let Some(client) = &self.inner.borrow().redirect {
            return Some(Promise::ok(client.add_ref()));
        }

        let resolution = self.inner.borrow_mut().client_resolution_queue.push(());
        Some(self.while_driving(resolution))
    }

    fn when_resolved(&self) -> Promise<(), Error> {
        crate::default_when_resolved_impl(self)
    }
}
