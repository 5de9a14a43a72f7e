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

//! Capabilities backed by a `Server` living in the same process.

use anyptr::any_pointer;
use anyptr::capability::{self, Promise, RemotePromise, Server};
use anyptr::private::capability::{
    ClientHook, ParamsHook, PipelineHook, PipelineOp, RequestHook, ResponseHook, ResultsHook,
};
use anyptr::{message, Error, MessageSize};

use futures::channel::oneshot;
use futures::{FutureExt, TryFutureExt};

use std::cell::RefCell;
use std::rc::Rc;

use crate::{broken, queued};

/// Results of a call whose method body has finished writing them.
pub trait ResultsDoneHook {
    fn add_ref(&self) -> Box<dyn ResultsDoneHook>;
    fn get(&self) -> anyptr::Result<any_pointer::Reader<'_>>;
}

impl Clone for Box<dyn ResultsDoneHook> {
    fn clone(&self) -> Self {
        self.add_ref()
    }
}

pub struct Response {
    results: Box<dyn ResultsDoneHook>,
}

impl Response {
    fn new(results: Box<dyn ResultsDoneHook>) -> Self {
        Self { results }
    }
}

impl ResponseHook for Response {
    fn get(&self) -> anyptr::Result<any_pointer::Reader<'_>> {
        self.results.get()
    }
}

struct Params {
    request: message::Builder<message::HeapAllocator>,
}

impl Params {
    fn new(request: message::Builder<message::HeapAllocator>) -> Self {
        Self { request }
    }
}

impl ParamsHook for Params {
    fn get(&self) -> anyptr::Result<any_pointer::Reader<'_>> {
        self.request.get_root_as_reader()
    }
}

struct Results {
    message: Option<message::Builder<message::HeapAllocator>>,
    results_done_fulfiller: Option<oneshot::Sender<Box<dyn ResultsDoneHook>>>,
}

impl Results {
    fn new(fulfiller: oneshot::Sender<Box<dyn ResultsDoneHook>>) -> Self {
        Self {
            message: Some(message::Builder::new_default()),
            results_done_fulfiller: Some(fulfiller),
        }
    }
}

impl Drop for Results {
    fn drop(&mut self) {
        if let (Some(message), Some(fulfiller)) =
            (self.message.take(), self.results_done_fulfiller.take())
        {
            let _ = fulfiller.send(Box::new(ResultsDone::new(message)));
        }
    }
}

impl ResultsHook for Results {
    fn get(&mut self) -> anyptr::Result<any_pointer::Builder<'_>> {
        match self.message {
            Some(ref mut message) => Ok(message.get_root_as_any()),
            None => Err(Error::failed("results were already released".into())),
        }
    }
}

struct ResultsDoneInner {
    message: message::Builder<message::HeapAllocator>,
}

struct ResultsDone {
    inner: Rc<ResultsDoneInner>,
}

impl ResultsDone {
    fn new(message: message::Builder<message::HeapAllocator>) -> Self {
        Self {
            inner: Rc::new(ResultsDoneInner { message }),
        }
    }
}

impl ResultsDoneHook for ResultsDone {
    fn add_ref(&self) -> Box<dyn ResultsDoneHook> {
        Box::new(Self {
            inner: self.inner.clone(),
        })
    }

    fn get(&self) -> anyptr::Result<any_pointer::Reader<'_>> {
        self.inner.message.get_root_as_reader()
    }
}

pub struct Request {
    message: message::Builder<message::HeapAllocator>,
    interface_id: u64,
    method_id: u16,
    client: Box<dyn ClientHook>,
}

impl Request {
    pub fn new(
        interface_id: u64,
        method_id: u16,
        size_hint: Option<MessageSize>,
        client: Box<dyn ClientHook>,
    ) -> Self {
        Self {
            message: crate::new_message(size_hint),
            interface_id,
            method_id,
            client,
        }
    }
}

impl RequestHook for Request {
    fn get(&mut self) -> any_pointer::Builder<'_> {
        self.message.get_root_as_any()
    }

    fn send(self: Box<Self>) -> RemotePromise<any_pointer::Owned> {
        let Self {
            message,
            interface_id,
            method_id,
            client,
        } = *self;
        let (results_done_fulfiller, results_done_promise) = oneshot::channel();
        let call = client.call(
            interface_id,
            method_id,
            Box::new(Params::new(message)),
            Box::new(Results::new(results_done_fulfiller)),
        );
        let results_done = results_done_promise
            .map_err(|_| Error::failed("call finished without releasing its results".into()));

        let (pipeline_sender, mut pipeline) = queued::Pipeline::new();
        let finished = futures::future::try_join(call, results_done)
            .map(move |joined| match joined {
                Ok(((), results)) => {
                    pipeline_sender.complete(Box::new(Pipeline::new(results.add_ref())));
                    Ok(results)
                }
                Err(e) => {
                    pipeline_sender.fail(e.clone());
                    Err(e)
                }
            })
            .shared();

        pipeline.drive(finished.clone().map_ok(|_| ()));
        let response = finished
            .map_ok(|results| capability::Response::new(Box::new(Response::new(results))));

        RemotePromise {
            promise: Promise::from_future(response),
            pipeline: any_pointer::Pipeline::new(Box::new(pipeline)),
        }
    }
}

/// Pipeline over results that are already in.
pub struct Pipeline {
    results: Box<dyn ResultsDoneHook>,
}

impl Pipeline {
    pub fn new(results: Box<dyn ResultsDoneHook>) -> Self {
        Self { results }
    }
}

impl PipelineHook for Pipeline {
    fn add_ref(&self) -> Box<dyn PipelineHook> {
        Box::new(Self {
            results: self.results.add_ref(),
        })
    }

    fn get_pipelined_cap(&self, ops: &[PipelineOp]) -> Box<dyn ClientHook> {
        match self
            .results
            .get()
            .and_then(|results| results.get_pipelined_cap(ops))
        {
            Ok(cap) => cap,
            Err(e) => broken::new_cap(e),
        }
    }
}

pub struct Client {
    inner: Rc<RefCell<Box<dyn Server>>>,
}

impl Client {
    pub fn new(server: Box<dyn Server>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(server)),
        }
    }
}

impl Clone for Client {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl ClientHook for Client {
    fn add_ref(&self) -> Box<dyn ClientHook> {
        Box::new(self.clone())
    }

    fn new_call(
        &self,
        interface_id: u64,
        method_id: u16,
        size_hint: Option<MessageSize>,
    ) -> capability::Request<any_pointer::Owned, any_pointer::Owned> {
        capability::Request::new(Box::new(Request::new(
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
        // Dispatched on first poll, not here.
        let server = self.inner.clone();
        Promise::from_future(
            futures::future::lazy(move |_| {
                log::trace!("dispatching call {interface_id:#x}.{method_id}");
                let mut server = server.borrow_mut();
                server.dispatch_call(
                    interface_id,
                    method_id,
                    capability::Params::new(params),
                    capability::Results::new(results),
                )
            })
            .flatten(),
        )
    }

    fn get_ptr(&self) -> usize {
        Rc::as_ptr(&self.inner) as usize
    }

    fn get_resolved(&self) -> Option<Box<dyn ClientHook>> {
        None
    }

    fn when_more_resolved(&self) -> Option<Promise<Box<dyn ClientHook>, Error>> {
        None
    }

    fn when_resolved(&self) -> Promise<(), Error> {
        Promise::ok(())
    }
}
