#![no_main]

use std::sync::Arc;

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use reqtxn::http::StatusCode;
use reqtxn::transaction::state::*;
use reqtxn::{BodyMode, Error, RequestExecutor, RequestPart, ResponseHead};
use reqtxn::{ExecutorHandle, QueueHandle, QueueToken};
use tokio::sync::oneshot;

struct NoopExecutor;

impl RequestExecutor for NoopExecutor {
    fn write_request_body_part(&self, _part: RequestPart) {}
    fn demand_response_body_stream(&self) {}
    fn cancel_request(&self) {}
}

struct NoopToken;

impl QueueToken for NoopToken {
    fn cancel(&self) {}
}

const MODES: &[BodyMode] = &[
    BodyMode::None,
    BodyMode::InMemory(10),
    BodyMode::KnownLength(100),
    BodyMode::UnknownLength,
];

const CHUNKS: &[&[u8]] = &[b"", b"a", b"0123456789", &[0; 64]];

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    let (tx, mut rx) = oneshot::channel();
    let mode = MODES[(data[0] as usize) % MODES.len()];
    let mut machine = StateMachine::new(tx, mode);

    let mut resolved = 0;
    let mut finished = false;

    // Keep waiters alive so sends to them do not fail silently.
    let mut receivers = Vec::new();

    for (i, b) in data[1..].iter().enumerate() {
        let chunk = Bytes::from_static(CHUNKS[i % CHUNKS.len()]);

        match b % 16 {
            0 => drop(machine.request_was_queued(QueueHandle::new(Arc::new(NoopToken)))),
            1 => drop(machine.will_execute_request(ExecutorHandle::new(Arc::new(NoopExecutor)))),
            2 => drop(machine.resume_request_body_stream()),
            3 => machine.withdraw_request_body_demand(),
            4 => drop(machine.write_next_request_part(chunk)),
            5 => {
                let (tx, rx) = oneshot::channel();
                receivers.push(rx);
                drop(machine.wait_for_request_body_demand(tx));
            }
            6 => machine.pause_request_body_stream(),
            7 => drop(machine.finish_request_body_stream(Ok(()))),
            8 => drop(machine.receive_response_head(ResponseHead::new(StatusCode::OK))),
            9 => {
                let (tx, rx) = oneshot::channel();
                drop(rx);
                drop(machine.wait_for_response_head(tx));
            }
            10 => drop(machine.receive_response_body_part(chunk)),
            11 => {
                let (tx, rx) = oneshot::channel();
                drop(rx);
                drop(machine.consume_next_response_part(tx));
            }
            12 => drop(machine.succeed()),
            13 => drop(machine.fail(Error::ConnectionFailure("fuzz".into()))),
            14 => drop(machine.cancel()),
            _ => drop(machine.deadline_exceeded()),
        }

        if rx.try_recv().is_ok() {
            resolved += 1;
        }

        // Terminal is absorbing.
        if finished {
            assert!(machine.is_finished());
        }
        finished = machine.is_finished();

        assert!(resolved <= 1);
        assert_eq!(finished, resolved == 1);
    }
});
