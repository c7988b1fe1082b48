//! The multi-threaded driver: a pending-block queue, an encoded-block map,
//! and one writer thread that keeps the stream in order.
//!
//! Sealed RLE1 blocks go onto a queue under a single mutex. Worker threads
//! pull blocks off, encode each one into a private deferred bit log, and
//! park the finished log in a map keyed by block id. The thread that owns
//! the [`ParallelWriter`] is the only one touching the real output: it
//! removes consecutive ids from the map, folds each block CRC into the
//! stream CRC, and replays the logs into the bit sink, so blocks written
//! out of order by the workers still leave in order.
//!
//! Intake stalls once ten blocks per worker are resident anywhere in the
//! system, which caps memory no matter how far the workers fall behind.
//! A worker that panics raises a fatal flag; the writer surfaces the first
//! recorded error and stops.

use std::collections::{HashMap, VecDeque};
use std::io::{self, Write};
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, info, trace};

use crate::bitstream::bitlog::BitLog;
use crate::bitstream::bitwriter::BitWriter;
use crate::tools::crc::do_stream_crc;
use crate::tools::rle1::Rle1Encoder;

use super::compress::{clamp_level, compress_block_size};
use super::compress_block::compress_block;

/// Upper bound on worker threads.
pub const MAX_WORKERS: usize = 128;

/// Resident blocks allowed per worker before intake stalls.
const BLOCKS_PER_WORKER: usize = 10;

/// Backstop on the writer's waits. The fatal flag and the worker count are
/// not guarded by the state mutex, so their wakeups can race the wait;
/// timing out and rechecking covers the miss.
const WRITER_WAIT: Duration = Duration::from_millis(50);

/// A sealed RLE1 block waiting for a worker. Immutable once enqueued.
struct RawBlock {
    id: u32,
    rle1_data: Vec<u8>,
    block_crc: u32,
}

/// Everything guarded by the processing mutex.
#[derive(Default)]
struct ProcState {
    pending: VecDeque<RawBlock>,
    encoded: HashMap<u32, BitLog>,
    next_input_block_id: u32,
    pending_writing_blocks: usize,
    is_done_reading: bool,
}

struct Shared {
    state: Mutex<ProcState>,
    /// Signalled on enqueue, on encoded-block insert, on worker exit, and
    /// when reading finishes.
    work_cond: Condvar,
    active_workers: Mutex<usize>,
    fatal: AtomicBool,
    fatal_error: Mutex<Option<io::Error>>,
}

impl Shared {
    fn new() -> Self {
        Self {
            state: Mutex::new(ProcState::default()),
            work_cond: Condvar::new(),
            active_workers: Mutex::new(0),
            fatal: AtomicBool::new(false),
            fatal_error: Mutex::new(None),
        }
    }

    /// A poisoned mutex means a worker died mid-update; the fatal flag
    /// already covers that, so recover the guard and keep going.
    fn state(&self) -> MutexGuard<'_, ProcState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn active_workers(&self) -> MutexGuard<'_, usize> {
        self.active_workers.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_fatal(&self) -> bool {
        self.fatal.load(Ordering::Acquire)
    }

    /// Record the first error and wake everyone so they can stop.
    fn raise_fatal(&self, err: io::Error) {
        let mut slot = self.fatal_error.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_none() {
            *slot = Some(err);
        }
        drop(slot);
        self.fatal.store(true, Ordering::Release);
        self.work_cond.notify_all();
    }

    fn take_fatal(&self) -> io::Error {
        let mut slot = self.fatal_error.lock().unwrap_or_else(|e| e.into_inner());
        slot.take().unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::Other, "block compression worker failed")
        })
    }
}

/// Runs on worker exit, unwinding or not: publishes the failure if the
/// thread is panicking and always gives back its worker slot.
struct WorkerGuard {
    shared: Arc<Shared>,
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        if thread::panicking() {
            self.shared.raise_fatal(io::Error::new(
                io::ErrorKind::Other,
                "block compression worker panicked",
            ));
        }
        let mut active = self.shared.active_workers();
        *active = active.saturating_sub(1);
        drop(active);
        self.shared.work_cond.notify_all();
    }
}

fn worker_loop(shared: Arc<Shared>) {
    let _guard = WorkerGuard {
        shared: Arc::clone(&shared),
    };
    loop {
        if shared.is_fatal() {
            return;
        }
        let block = {
            let mut state = shared.state();
            loop {
                if let Some(block) = state.pending.pop_front() {
                    break block;
                }
                if state.is_done_reading || shared.is_fatal() {
                    return;
                }
                state = shared
                    .work_cond
                    .wait(state)
                    .unwrap_or_else(|e| e.into_inner());
            }
        };

        trace!("worker encoding block {}", block.id);
        let mut log = BitLog::with_capacity(block.rle1_data.len());
        compress_block(&mut log, &block.rle1_data, block.block_crc);
        log.set_block_crc(block.block_crc);

        let mut state = shared.state();
        state.encoded.insert(block.id, log);
        state.pending_writing_blocks += 1;
        drop(state);
        shared.work_cond.notify_all();
    }
}

/// Multi-threaded bzip2 writer. Bytes written in are carved into blocks and
/// compressed on background threads; finished blocks leave through this
/// writer in block order. `flush` is refused because the stream has no
/// block boundary to flush at; `close` finalizes everything.
pub struct ParallelWriter<W: Write> {
    bw: BitWriter<W>,
    rle1: Rle1Encoder,
    shared: Arc<Shared>,
    handles: Vec<JoinHandle<()>>,
    max_workers: usize,
    level: usize,
    next_output_block_id: u32,
    stream_crc: u32,
    raw_in: u64,
    closed: bool,
}

impl<W: Write> ParallelWriter<W> {
    /// Workers start lazily, when the first block is sealed.
    pub fn new(writer: W, level: usize, workers: usize) -> Self {
        let level = clamp_level(level);
        let max_workers = workers.clamp(1, MAX_WORKERS);
        let mut bw = BitWriter::new(writer);
        bw.stream_header(level as u8);
        Self {
            bw,
            rle1: Rle1Encoder::new(compress_block_size(level)),
            shared: Arc::new(Shared::new()),
            handles: Vec::with_capacity(max_workers),
            max_workers,
            level,
            next_output_block_id: 0,
            stream_crc: 0,
            raw_in: 0,
            closed: false,
        }
    }

    /// All workers start immediately; used when the caller owns the whole
    /// input and blocks will arrive as fast as it can read.
    pub fn new_eager(writer: W, level: usize, workers: usize) -> Self {
        let mut w = Self::new(writer, level, workers);
        w.spawn_workers(w.max_workers);
        w
    }

    pub fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        self.write_all(&[byte])
    }

    /// Bring the live worker count up to `target`.
    fn spawn_workers(&mut self, target: usize) {
        let target = target.min(self.max_workers);
        let mut active = self.shared.active_workers();
        while *active < target {
            // Count the worker before it runs so its exit guard always has
            // a slot to give back
            *active += 1;
            let shared = Arc::clone(&self.shared);
            let name = format!("parbzip2-worker-{}", self.handles.len());
            match thread::Builder::new()
                .name(name)
                .spawn(move || worker_loop(shared))
            {
                Ok(handle) => self.handles.push(handle),
                Err(e) => {
                    *active = active.saturating_sub(1);
                    error!("could not spawn compression worker: {}", e);
                    break;
                }
            }
        }
    }

    /// Blocks not yet replayed to the output: queued, being encoded, or
    /// sitting encoded in the map.
    fn resident(&self, state: &ProcState) -> usize {
        (state.next_input_block_id - self.next_output_block_id) as usize
    }

    /// Remove the next in-order encoded block from the map, if it is there.
    fn take_ready(state: &mut ProcState, next_output: u32) -> Option<BitLog> {
        let log = state.encoded.remove(&next_output)?;
        debug_assert!(state.pending_writing_blocks > 0);
        state.pending_writing_blocks = state.pending_writing_blocks.saturating_sub(1);
        Some(log)
    }

    /// Fold the block CRC and replay the log into the real sink.
    fn write_encoded(&mut self, log: &BitLog) -> io::Result<()> {
        trace!("replaying block {}", self.next_output_block_id);
        self.stream_crc = do_stream_crc(self.stream_crc, log.block_crc());
        log.replay(&mut self.bw);
        self.next_output_block_id += 1;
        self.bw.write_out()
    }

    /// Replay every consecutively-ready block.
    fn drain_ready(&mut self) -> io::Result<()> {
        loop {
            if self.shared.is_fatal() {
                return Err(self.shared.take_fatal());
            }
            let log = {
                let mut state = self.shared.state();
                Self::take_ready(&mut state, self.next_output_block_id)
            };
            match log {
                Some(log) => self.write_encoded(&log)?,
                None => return Ok(()),
            }
        }
    }

    /// Seal the current RLE1 block and hand it to the workers, draining
    /// finished blocks first if the system is at its residency cap.
    fn enqueue_block(&mut self) -> io::Result<()> {
        let rle1 = mem::replace(
            &mut self.rle1,
            Rle1Encoder::new(compress_block_size(self.level)),
        );
        self.raw_in += rle1.raw_len();
        let (data, block_crc) = rle1.finish();
        if data.is_empty() {
            return Ok(());
        }

        self.spawn_workers(self.max_workers);

        let cap = BLOCKS_PER_WORKER * self.max_workers;
        let mut state = self.shared.state();
        while self.resident(&state) >= cap {
            if self.shared.is_fatal() {
                drop(state);
                return Err(self.shared.take_fatal());
            }
            if let Some(log) = Self::take_ready(&mut state, self.next_output_block_id) {
                drop(state);
                self.write_encoded(&log)?;
                state = self.shared.state();
            } else {
                state = self
                    .shared
                    .work_cond
                    .wait_timeout(state, WRITER_WAIT)
                    .unwrap_or_else(|e| e.into_inner())
                    .0;
            }
        }

        let id = state.next_input_block_id;
        state.next_input_block_id += 1;
        debug!("enqueued block {} ({} rle1 bytes)", id, data.len());
        state.pending.push_back(RawBlock {
            id,
            rle1_data: data,
            block_crc,
        });
        drop(state);
        self.shared.work_cond.notify_all();

        // Keep output moving between enqueues instead of piling up
        self.drain_ready()
    }

    /// Finish the stream: compress the partial block, drain everything,
    /// verify the system emptied out, and write the footer. Safe to call
    /// more than once.
    pub fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let result = self.finish();

        if result.is_err() {
            // Nothing more will be written; let the workers run out
            let mut state = self.shared.state();
            state.pending.clear();
            state.is_done_reading = true;
            drop(state);
            self.shared.work_cond.notify_all();
        }
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
        result
    }

    fn finish(&mut self) -> io::Result<()> {
        if !self.rle1.is_empty() {
            self.enqueue_block()?;
        }
        {
            let mut state = self.shared.state();
            state.is_done_reading = true;
        }
        self.shared.work_cond.notify_all();

        loop {
            if self.shared.is_fatal() {
                return Err(self.shared.take_fatal());
            }
            let mut state = self.shared.state();
            if state.next_input_block_id == self.next_output_block_id {
                break;
            }
            // The readiness check and the wait share one lock hold, so an
            // insert between them cannot slip past unnoticed
            if let Some(log) = Self::take_ready(&mut state, self.next_output_block_id) {
                drop(state);
                self.write_encoded(&log)?;
                continue;
            }
            // Workers exit once the queue empties; if blocks are still
            // queued with fewer workers than blocks, top the pool back up
            let active = *self.shared.active_workers();
            if active == 0 && state.pending.is_empty() {
                drop(state);
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    "compression workers exited before finishing every block",
                ));
            }
            if active < self.max_workers && state.pending.len() > active {
                let depth = state.pending.len();
                drop(state);
                debug!("restarting workers for {} queued blocks", depth);
                self.spawn_workers(depth);
                continue;
            }
            let _state = self
                .shared
                .work_cond
                .wait_timeout(state, WRITER_WAIT)
                .unwrap_or_else(|e| e.into_inner())
                .0;
        }

        // The drain loop can only exit with everything accounted for
        let state = self.shared.state();
        if !state.pending.is_empty()
            || !state.encoded.is_empty()
            || state.pending_writing_blocks != 0
        {
            drop(state);
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "block accounting out of balance at end of stream",
            ));
        }
        drop(state);

        self.bw.stream_footer(self.stream_crc);
        self.bw.flush_writer()?;
        info!(
            "compressed {} bytes to {} bytes on {} workers",
            self.raw_in,
            self.bw.bytes_written(),
            self.max_workers
        );
        Ok(())
    }
}

impl<W: Write> Write for ParallelWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "write on a closed compressor",
            ));
        }
        if self.shared.is_fatal() {
            return Err(self.shared.take_fatal());
        }
        let mut off = 0;
        while off < buf.len() {
            off += self.rle1.write(&buf[off..]);
            if self.rle1.is_full() {
                self.enqueue_block()?;
            }
        }
        Ok(buf.len())
    }

    /// The stream cannot flush mid-block: bits queued in the sink belong to
    /// a block boundary that does not exist yet.
    fn flush(&mut self) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "bzip2 streams cannot flush mid-block; close() finalizes the stream",
        ))
    }
}

impl<W: Write> Drop for ParallelWriter<W> {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.close() {
                error!("error finishing bzip2 stream on drop: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::compression::compress::SequentialWriter;

    fn pseudo_random(len: usize, mut seed: u32) -> Vec<u8> {
        let mut data = Vec::with_capacity(len);
        for _ in 0..len {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            data.push(seed as u8);
        }
        data
    }

    fn sequential_bytes(data: &[u8], level: usize) -> Vec<u8> {
        let mut out = Vec::new();
        let mut w = SequentialWriter::new(&mut out, level);
        w.write_all(data).unwrap();
        w.close().unwrap();
        drop(w);
        out
    }

    fn parallel_bytes(data: &[u8], level: usize, workers: usize) -> Vec<u8> {
        let mut out = Vec::new();
        let mut w = ParallelWriter::new(&mut out, level, workers);
        w.write_all(data).unwrap();
        w.close().unwrap();
        drop(w);
        out
    }

    #[test]
    fn parallel_matches_sequential() {
        let data = pseudo_random(250_000, 0xC0FFEE);
        let expected = sequential_bytes(&data, 1);
        for workers in [1, 2, 8] {
            assert_eq!(parallel_bytes(&data, 1, workers), expected);
        }
    }

    #[test]
    fn chunked_writes_match_bulk_write() {
        let data = pseudo_random(200_000, 7);
        let bulk = parallel_bytes(&data, 1, 4);
        let mut out = Vec::new();
        let mut w = ParallelWriter::new(&mut out, 1, 4);
        for chunk in data.chunks(7) {
            w.write_all(chunk).unwrap();
        }
        w.close().unwrap();
        drop(w);
        assert_eq!(out, bulk);
    }

    #[test]
    fn empty_stream_has_no_blocks() {
        let out = parallel_bytes(&[], 9, 4);
        assert_eq!(
            out,
            vec![0x42, 0x5A, 0x68, 0x39, 0x17, 0x72, 0x45, 0x38, 0x50, 0x90, 0, 0, 0, 0]
        );
    }

    #[test]
    fn flush_is_refused() {
        let mut w = ParallelWriter::new(Vec::new(), 9, 1);
        w.write_all(b"data").unwrap();
        assert_eq!(w.flush().unwrap_err().kind(), io::ErrorKind::Unsupported);
        w.close().unwrap();
    }

    #[test]
    fn close_is_idempotent_and_write_after_close_fails() {
        let mut w = ParallelWriter::new(Vec::new(), 9, 2);
        w.write_all(b"some bytes").unwrap();
        w.close().unwrap();
        w.close().unwrap();
        assert!(w.write(b"more").is_err());
    }

    #[test]
    fn eager_workers_spawn_up_front() {
        let w: ParallelWriter<Vec<u8>> = ParallelWriter::new_eager(Vec::new(), 9, 3);
        assert_eq!(*w.shared.active_workers(), 3);
        drop(w);
    }
}
