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

#![cfg(test)]

use anyptr::any_pointer;
use anyptr::capability::{self, Promise, Response};
use anyptr::{text, Error, ErrorKind};

use futures::channel::oneshot;
use futures::executor::block_on;
use futures::{FutureExt, TryFutureExt};

use std::cell::RefCell;
use std::rc::Rc;


use impls::{Echo, Factory, ECHO_INTERFACE, FACTORY_INTERFACE};

fn shout(client: &capability::Client, words: &str) -> Promise<Response<any_pointer::Owned>, Error> {
    let mut request =
        client.new_call::<any_pointer::Owned, any_pointer::Owned>(ECHO_INTERFACE, 0, None);
    request.get().unwrap().set_as(words).unwrap();
    request.send().promise
}

fn text_of(response: &Response<any_pointer::Owned>) -> String {
    response
        .get()
        .unwrap()
        .get_as::<text::Reader>()
        .unwrap()
        .to_string()
        .unwrap()
}

fn heard() -> Rc<RefCell<Vec<String>>> {
    Rc::new(RefCell::new(Vec::new()))
}

#[test]
fn local_call() {
    let log = heard();
    let client: capability::Client = anyptr_rpc::new_client(Echo { heard: log.clone() });
    let response = block_on(shout(&client, "hello")).unwrap();
    assert_eq!(text_of(&response), "HELLO");
    assert_eq!(*log.borrow(), vec!["hello".to_string()]);
}

#[test]
fn dispatch_waits_for_poll() {
    let log = heard();
    let client: capability::Client = anyptr_rpc::new_client(Echo { heard: log.clone() });
    let promise = shout(&client, "later");
    assert!(log.borrow().is_empty());
    block_on(promise).unwrap();
    assert_eq!(log.borrow().len(), 1);
}

#[test]
fn unknown_method() {
    let client: capability::Client = anyptr_rpc::new_client(Echo { heard: heard() });
    let request = client.new_call::<any_pointer::Owned, any_pointer::Owned>(ECHO_INTERFACE, 7, None);
    let error = block_on(request.send().promise).err().unwrap();
    assert_eq!(error.kind, ErrorKind::Unimplemented);
}

#[test]
fn pipelined_call() {
    let log = heard();
    let factory: capability::Client = anyptr_rpc::new_client(Factory::new(log.clone()));
    let remote = factory
        .new_call::<any_pointer::Owned, any_pointer::Owned>(FACTORY_INTERFACE, 0, None)
        .send();

    // Made before the factory call has even been dispatched.
    let echo = capability::Client::new(remote.pipeline.get_pointer_field(0).as_cap());
    let response = block_on(shout(&echo, "through the pipe")).unwrap();
    assert_eq!(text_of(&response), "THROUGH THE PIPE");

    block_on(echo.when_resolved()).unwrap();
    assert!(echo.hook.get_resolved().is_some());

    let factory_response = block_on(remote.promise).unwrap();
    let results = factory_response.get().unwrap();
    assert!(results.is_struct());

    // Derived after the results arrived: goes straight to the echo.
    let again = capability::Client::new(remote.pipeline.get_pointer_field(0).as_cap());
    let response = block_on(shout(&again, "direct")).unwrap();
    assert_eq!(text_of(&response), "DIRECT");
    assert_eq!(
        *log.borrow(),
        vec!["through the pipe".to_string(), "direct".to_string()]
    );
}

#[test]
fn queued_calls_keep_order() {
    let log = heard();
    let (open_gate, gate) = oneshot::channel();
    let mut factory = Factory::new(log.clone());
    factory.gate = Some(gate);
    let factory: capability::Client = anyptr_rpc::new_client(factory);

    let mut remote = factory
        .new_call::<any_pointer::Owned, any_pointer::Owned>(FACTORY_INTERFACE, 0, None)
        .send();
    // Dispatches the factory call, which then parks on the gate.
    assert!((&mut remote.promise).now_or_never().is_none());

    let echo = capability::Client::new(remote.pipeline.get_pointer_field(0).as_cap());
    let first = shout(&echo, "one");
    let second = shout(&echo, "two");
    let third = shout(&echo, "three");
    assert!(log.borrow().is_empty());

    open_gate.send(()).unwrap();
    let (a, b, c) = block_on(futures::future::try_join3(first, second, third)).unwrap();
    assert_eq!(text_of(&a), "ONE");
    assert_eq!(text_of(&b), "TWO");
    assert_eq!(text_of(&c), "THREE");
    assert_eq!(
        *log.borrow(),
        vec!["one".to_string(), "two".to_string(), "three".to_string()]
    );
    block_on(remote.promise).unwrap();
}

#[test]
fn failed_call_breaks_pipeline() {
    let log = heard();
    let mut factory = Factory::new(log.clone());
    factory.refusal = Some(Error::failed("factory is closed".into()));
    let factory: capability::Client = anyptr_rpc::new_client(factory);

    let remote = factory
        .new_call::<any_pointer::Owned, any_pointer::Owned>(FACTORY_INTERFACE, 0, None)
        .send();
    let early = capability::Client::new(remote.pipeline.get_pointer_field(0).as_cap());
    let deeper = capability::Client::new(
        remote
            .pipeline
            .get_pointer_field(0)
            .get_pointer_field(3)
            .as_cap(),
    );

    let error = block_on(shout(&early, "anyone?")).err().unwrap();
    assert_eq!(error.kind, ErrorKind::Failed);
    assert!(error.extra.contains("factory is closed"));

    let error = block_on(shout(&deeper, "anyone?")).err().unwrap();
    assert!(error.extra.contains("factory is closed"));

    let error = block_on(remote.promise).err().unwrap();
    assert!(error.extra.contains("factory is closed"));

    let late = capability::Client::new(remote.pipeline.get_pointer_field(0).as_cap());
    let error = block_on(shout(&late, "anyone?")).err().unwrap();
    assert!(error.extra.contains("factory is closed"));
    assert!(log.borrow().is_empty());
}

#[test]
fn null_pipelined_capability() {
    let client: capability::Client = anyptr_rpc::new_client(Echo { heard: heard() });
    let mut request =
        client.new_call::<any_pointer::Owned, any_pointer::Owned>(ECHO_INTERFACE, 0, None);
    request.get().unwrap().set_as("text, not a struct").unwrap();
    let remote = request.send();
    let missing = capability::Client::new(remote.pipeline.get_pointer_field(0).as_cap());
    assert!(block_on(shout(&missing, "hello?")).is_err());
    block_on(remote.promise).unwrap();
}

#[test]
fn promise_client_queues_until_resolved() {
    let log = heard();
    let (resolve, resolution) = oneshot::channel::<capability::Client>();
    let client: capability::Client = anyptr_rpc::new_promise_client(
        resolution.map_err(|_| Error::failed("resolution was dropped".into())),
    );
    assert!(client.hook.get_resolved().is_none());

    let first = shout(&client, "one");
    let second = shout(&client, "two");

    let echo: capability::Client = anyptr_rpc::new_client(Echo { heard: log.clone() });
    assert!(resolve.send(echo).is_ok());
    assert!(log.borrow().is_empty());

    let (a, b) = block_on(futures::future::try_join(first, second)).unwrap();
    assert_eq!(text_of(&a), "ONE");
    assert_eq!(text_of(&b), "TWO");
    assert_eq!(*log.borrow(), vec!["one".to_string(), "two".to_string()]);
    assert!(client.hook.get_resolved().is_some());

    // Now forwarded without queueing.
    let response = block_on(shout(&client, "three")).unwrap();
    assert_eq!(text_of(&response), "THREE");
}

#[test]
fn rejected_promise_client() {
    let (resolve, resolution) = oneshot::channel::<capability::Client>();
    let client: capability::Client = anyptr_rpc::new_promise_client(
        resolution.map_err(|_| Error::disconnected("never resolved".into())),
    );
    let pending = shout(&client, "hello?");
    drop(resolve);

    let error = block_on(pending).err().unwrap();
    assert_eq!(error.kind, ErrorKind::Disconnected);
    assert!(error.extra.contains("never resolved"));

    let error = block_on(shout(&client, "still there?")).err().unwrap();
    assert_eq!(error.kind, ErrorKind::Disconnected);
}

#[test]
fn broken_client() {
    let client: capability::Client =
        anyptr_rpc::new_broken_client(Error::overloaded("try again later".into()));
    let error = block_on(shout(&client, "hi")).err().unwrap();
    assert_eq!(error.kind, ErrorKind::Overloaded);

    let mut request =
        client.new_call::<any_pointer::Owned, any_pointer::Owned>(ECHO_INTERFACE, 0, None);
    request.get().unwrap().set_as("ignored").unwrap();
    let remote = request.send();
    let derived = capability::Client::new(remote.pipeline.get_pointer_field(2).as_cap());
    let error = block_on(shout(&derived, "hi")).err().unwrap();
    assert_eq!(error.kind, ErrorKind::Overloaded);
    assert!(error.extra.contains("try again later"));
    assert!(block_on(client.when_resolved()).is_ok());
}

#[test]
fn results_outlive_server() {
    let log = heard();
    let response = {
        let client: capability::Client = anyptr_rpc::new_client(Echo { heard: log.clone() });
        block_on(shout(&client, "bye")).unwrap()
    };
    assert_eq!(text_of(&response), "BYE");
}
