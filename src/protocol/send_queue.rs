//! Outbound frames waiting for send quota.

use std::collections::VecDeque;

use log::*;

use super::frame::Frame;
use crate::error::Result;

/// Outcome of handing queued frames to the transport.
///
/// `sent` counts the bytes accepted before `result` was decided, so it is
/// meaningful on failure too.
#[derive(Debug)]
#[must_use]
pub struct Drained {
    /// Payload bytes handed to the transport.
    pub sent: u64,
    /// The first rejection, if any. The rejected frame is still queued.
    pub result: Result<()>,
}

/// An ordered queue of outbound frames, drained as the transport grants quota.
///
/// A frame larger than the remaining quota is split: the prefix that fits is
/// sent as a non-final frame and the rest stays at the head of the queue.
/// Frames leave the queue in the order they were enqueued.
#[derive(Debug, Default)]
pub struct SendQueue {
    frames: VecDeque<Frame>,
    quota: u64,
    buffered_amount: u64,
}

impl SendQueue {
    /// Create an empty queue with no quota.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes the transport currently allows us to send.
    pub fn quota(&self) -> u64 {
        self.quota
    }

    /// Payload bytes still queued, including the remainder of a split frame.
    pub fn buffered_amount(&self) -> u64 {
        self.buffered_amount
    }

    /// Number of queued frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Tell whether nothing is waiting to be sent.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Queue a frame and send as much as the quota allows.
    pub fn enqueue<F>(&mut self, frame: Frame, send: F) -> Drained
    where
        F: FnMut(Frame) -> Result<()>,
    {
        self.buffered_amount += frame.len() as u64;
        self.frames.push_back(frame);
        self.drain(send)
    }

    /// Add to the send quota and send as much as it now allows.
    pub fn grant_quota<F>(&mut self, quota: u64, send: F) -> Drained
    where
        F: FnMut(Frame) -> Result<()>,
    {
        self.quota = self.quota.saturating_add(quota);
        trace!("Send quota granted: +{} = {}", quota, self.quota);
        self.drain(send)
    }

    /// Hand queued frames to `send` while there is quota left.
    ///
    /// Quota and the buffered amount only shrink once `send` accepted a frame.
    /// If `send` fails, the frame stays at the head of the queue untouched and
    /// draining stops there.
    pub fn drain<F>(&mut self, mut send: F) -> Drained
    where
        F: FnMut(Frame) -> Result<()>,
    {
        let mut sent = 0u64;
        while self.quota > 0 {
            let Some(front) = self.frames.front_mut() else { break };

            let len = front.len() as u64;
            if len <= self.quota {
                if let Err(err) = send(front.clone()) {
                    return Drained { sent, result: Err(err) };
                }
                self.frames.pop_front();
                self.quota -= len;
                self.buffered_amount -= len;
                sent += len;
                continue;
            }

            // The quota is smaller than the frame here, so it fits into usize.
            let at = self.quota as usize;
            if let Err(err) = send(front.clone().split_to(at)) {
                return Drained { sent, result: Err(err) };
            }
            front.split_to(at);
            trace!("Frame split at {} bytes, {} bytes left queued", at, front.len());
            self.buffered_amount -= self.quota;
            sent += self.quota;
            self.quota = 0;
        }
        Drained { sent, result: Ok(()) }
    }
}
