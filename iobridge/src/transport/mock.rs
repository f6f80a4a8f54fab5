//! Scripted transport for tests.
//!
//! Replays a queue of fetch results and counts everything the code under
//! test does with it, so tests can check ordering and the one-outstanding
//! transaction rule without a kernel driver.

use std::collections::VecDeque;
use std::sync::{mpsc, Mutex};

use super::{FetchOutcome, RawEvent, SlaveTransport};
use crate::error::{Error, Result};

/// Counters captured by [`MockTransport`].
#[derive(Debug, Clone, Default)]
pub(crate) struct MockStats {
    pub fetch_calls: u64,
    pub fetched: u64,
    pub committed: u64,
    pub max_outstanding: u64,
    /// Fetches issued while a previous event was still uncommitted.
    pub fetches_while_outstanding: u64,
    pub bytes_read: usize,
    pub writes: Vec<Vec<u8>>,
}

#[derive(Default)]
struct State {
    script: VecDeque<Result<FetchOutcome>>,
    payloads: VecDeque<Vec<u8>>,
    write_limit: Option<usize>,
    commit_code: Option<i32>,
    outstanding: u64,
    /// Signals fetch entry, then blocks it until released.
    gate: Option<(mpsc::Sender<()>, mpsc::Receiver<()>)>,
    stats: MockStats,
}

#[derive(Default)]
pub(crate) struct MockTransport {
    state: Mutex<State>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a message header.
    pub fn push_event(&self, event: RawEvent) -> &Self {
        self.lock().script.push_back(Ok(FetchOutcome::Event(event)));
        self
    }

    /// Queue an empty poll.
    pub fn push_empty(&self) -> &Self {
        self.lock().script.push_back(Ok(FetchOutcome::Empty));
        self
    }

    /// Queue a fetch failure.
    pub fn push_fault(&self, code: i32) -> &Self {
        self.lock()
            .script
            .push_back(Err(Error::DriverFault { op: "fetch", code }));
        self
    }

    /// Queue bytes the next `read_bytes` call hands out.
    pub fn push_payload(&self, bytes: &[u8]) -> &Self {
        self.lock().payloads.push_back(bytes.to_vec());
        self
    }

    /// Accept at most `limit` bytes per write.
    pub fn limit_writes(&self, limit: usize) {
        self.lock().write_limit = Some(limit);
    }

    /// Make every commit return this driver status.
    pub fn fail_commits(&self, code: i32) {
        self.lock().commit_code = Some(code);
    }

    /// Block the next fetch until released.
    ///
    /// Returns a receiver that fires once the fetch has started and the
    /// sender that lets it continue.
    pub fn hold_next_fetch(&self) -> (mpsc::Receiver<()>, mpsc::Sender<()>) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        self.lock().gate = Some((entered_tx, release_rx));
        (entered_rx, release_tx)
    }

    pub fn stats(&self) -> MockStats {
        self.lock().stats.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }
}

impl SlaveTransport for MockTransport {
    fn fetch_pending(&self) -> Result<FetchOutcome> {
        let gate = self.lock().gate.take();
        if let Some((entered, release)) = gate {
            let _ = entered.send(());
            let _ = release.recv();
        }

        let mut state = self.lock();
        state.stats.fetch_calls += 1;
        if state.outstanding > 0 {
            state.stats.fetches_while_outstanding += 1;
        }

        let outcome = state.script.pop_front().unwrap_or(Ok(FetchOutcome::Empty));
        if let Ok(FetchOutcome::Event(_)) = outcome {
            state.stats.fetched += 1;
            state.outstanding += 1;
            state.stats.max_outstanding = state.stats.max_outstanding.max(state.outstanding);
        }
        outcome
    }

    fn read_bytes(&self, buf: &mut [u8]) -> Result<usize> {
        let mut state = self.lock();
        let payload = state.payloads.pop_front().unwrap_or_default();
        let n = payload.len().min(buf.len());
        buf[..n].copy_from_slice(&payload[..n]);
        state.stats.bytes_read += n;
        Ok(n)
    }

    fn write_bytes(&self, buf: &[u8]) -> Result<usize> {
        let mut state = self.lock();
        let n = state.write_limit.map_or(buf.len(), |l| l.min(buf.len()));
        state.stats.writes.push(buf[..n].to_vec());
        Ok(n)
    }

    fn commit(&self) -> Result<()> {
        let mut state = self.lock();
        state.stats.committed += 1;
        state.outstanding = state.outstanding.saturating_sub(1);
        match state.commit_code {
            Some(code) => Err(Error::DriverFault { op: "commit", code }),
            None => Ok(()),
        }
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}
