//! Scripted in-memory transport for unit tests
//!
//! Answers each request frame with the response registered for its code,
//! records every flush/write/read in order, and can inject errors. Clones
//! share one link, so a test keeps a handle while the client owns another.
//!
//! Reads and writes yield once before completing so concurrent futures get
//! a chance to interleave, which is what the lock tests need.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::vec::Vec;

use embassy_futures::yield_now;

use crate::drivers::msp::{decode_frame, encode_request, Direction};
use crate::transport::{Transport, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockError {
    /// Device gone
    Unplugged,
    /// Recoverable UART hiccup
    Overrun,
}

impl TransportError for MockError {
    fn is_fatal(&self) -> bool {
        matches!(self, MockError::Unplugged)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireEvent {
    Flush,
    Write(Vec<u8>),
    Read(usize),
}

#[derive(Default)]
struct Link {
    responses: HashMap<u8, Vec<u8>>,
    rx: Vec<u8>,
    events: Vec<WireEvent>,
    read_errors: VecDeque<MockError>,
    write_error: Option<MockError>,
    read_chunk: Option<usize>,
}

#[derive(Clone, Default)]
pub struct MockTransport {
    link: Rc<RefCell<Link>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `frame` as the answer every time a request with `code` is written.
    pub fn respond_to(&self, code: u8, frame: Vec<u8>) {
        self.link.borrow_mut().responses.insert(code, frame);
    }

    pub fn fail_next_read(&self, err: MockError) {
        self.link.borrow_mut().read_errors.push_back(err);
    }

    /// Fail every write from now on.
    pub fn fail_writes(&self, err: MockError) {
        self.link.borrow_mut().write_error = Some(err);
    }

    /// Deliver at most `n` bytes per read call.
    pub fn set_read_chunk(&self, n: usize) {
        self.link.borrow_mut().read_chunk = Some(n);
    }

    pub fn events(&self) -> Vec<WireEvent> {
        self.link.borrow().events.clone()
    }

    pub fn written_frames(&self) -> Vec<Vec<u8>> {
        self.link
            .borrow()
            .events
            .iter()
            .filter_map(|e| match e {
                WireEvent::Write(frame) => Some(frame.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn write_count(&self) -> usize {
        self.written_frames().len()
    }
}

impl Transport for MockTransport {
    type Error = MockError;

    async fn write(&mut self, data: &[u8]) -> Result<usize, MockError> {
        yield_now().await;

        let mut link = self.link.borrow_mut();
        if let Some(err) = link.write_error {
            return Err(err);
        }
        link.events.push(WireEvent::Write(data.to_vec()));

        if let Ok(frame) = decode_frame(data) {
            if let Some(response) = link.responses.get(&frame.code).cloned() {
                link.rx.extend_from_slice(&response);
            }
        }
        Ok(data.len())
    }

    async fn read(&mut self, buffer: &mut [u8]) -> Result<usize, MockError> {
        yield_now().await;

        let mut link = self.link.borrow_mut();
        if let Some(err) = link.read_errors.pop_front() {
            return Err(err);
        }

        let chunk = link.read_chunk.unwrap_or(usize::MAX);
        let n = buffer.len().min(link.rx.len()).min(chunk);
        buffer[..n].copy_from_slice(&link.rx[..n]);
        link.rx.drain(..n);
        link.events.push(WireEvent::Read(n));
        Ok(n)
    }

    async fn flush(&mut self) -> Result<(), MockError> {
        let mut link = self.link.borrow_mut();
        link.rx.clear();
        link.events.push(WireEvent::Flush);
        Ok(())
    }
}

/// A well-formed `$M>` response frame.
pub fn response_frame(code: u8, payload: &[u8]) -> Vec<u8> {
    let mut frame = encode_request(code as u16, payload).unwrap().to_vec();
    frame[2] = Direction::Response.marker();
    frame
}

pub fn attitude_payload(roll: i16, pitch: i16, yaw: i16) -> Vec<u8> {
    [roll, pitch, yaw].iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub fn channels_payload(values: [i16; 8]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}
