//! Named broadcast streams with independent subscriber cursors.
//!
//! ```text
//!                      ┌──────────── Channel ────────────┐
//!  publish(i) ───────▶ │ [first .. next)  retained Arc<T> │ ───▶ Subscription (cursor a)
//!                      │ closure: None | Closed | Failed  │ ───▶ Subscription (cursor b)
//!                      └───────────── watch<next> ────────┘
//! ```
//!
//! Items are appended with consecutive indices and never mutated. Readers
//! that fall out of the retention window get [`StreamError::FellBehind`].

use crate::audio::part::{AudioStreamPart, StreamId};
use crate::config::RouterConfig;
use crate::error::{IngestError, Result, StreamError};
use futures_util::Stream;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, trace, warn};

/// Items that carry their own position in a stream.
pub trait Sequenced: Send + Sync + 'static {
    fn index(&self) -> u64;

    /// Payload size counted against the byte retention limit.
    fn byte_len(&self) -> usize;
}

impl Sequenced for AudioStreamPart {
    fn index(&self) -> u64 {
        u64::from(self.index)
    }

    fn byte_len(&self) -> usize {
        self.data.len()
    }
}

pub type AudioStreamRouter = StreamRouter<AudioStreamPart>;

/// How much history each stream keeps for late or slow subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub max_items: usize,
    pub max_bytes: usize,
    /// Ended streams kept registered; the oldest beyond this are dropped.
    pub max_ended_streams: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::from(&RouterConfig::default())
    }
}

impl From<&RouterConfig> for RetentionPolicy {
    fn from(config: &RouterConfig) -> Self {
        Self {
            max_items: config.retention_parts.max(1),
            max_bytes: config.retention_bytes,
            max_ended_streams: config.ended_streams,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Closure {
    Closed,
    Failed(String),
}

struct ChannelState<T> {
    items: VecDeque<Arc<T>>,
    /// Index of `items[0]`, or `next` when empty.
    first: u64,
    next: u64,
    bytes: usize,
    closure: Option<Closure>,
}

struct Channel<T> {
    id: StreamId,
    state: Mutex<ChannelState<T>>,
    notify: watch::Sender<u64>,
}

impl<T> Channel<T> {
    fn new(id: StreamId) -> Self {
        let (notify, _) = watch::channel(0);
        Self {
            id,
            state: Mutex::new(ChannelState {
                items: VecDeque::new(),
                first: 0,
                next: 0,
                bytes: 0,
                closure: None,
            }),
            notify,
        }
    }

    /// Marks the stream ended. The first closure wins.
    fn end(&self, closure: Closure) -> bool {
        let mut state = self.state.lock();
        if state.closure.is_some() {
            return false;
        }
        state.closure = Some(closure);
        let next = state.next;
        drop(state);
        self.notify.send_replace(next);
        true
    }
}

/// Point-in-time view of one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamStats {
    pub oldest: u64,
    pub next: u64,
    pub retained: usize,
    pub bytes: usize,
    pub ended: bool,
}

struct Registry<T> {
    channels: HashMap<StreamId, Arc<Channel<T>>>,
    /// Ended streams still registered, oldest first.
    ended: VecDeque<StreamId>,
}

/// Registry of named streams.
pub struct StreamRouter<T> {
    streams: Mutex<Registry<T>>,
    retention: RetentionPolicy,
}

impl<T: Sequenced> Default for StreamRouter<T> {
    fn default() -> Self {
        Self::new(RetentionPolicy::default())
    }
}

impl<T: Sequenced> StreamRouter<T> {
    pub fn new(retention: RetentionPolicy) -> Self {
        Self {
            streams: Mutex::new(Registry {
                channels: HashMap::new(),
                ended: VecDeque::new(),
            }),
            retention,
        }
    }

    pub fn retention(&self) -> RetentionPolicy {
        self.retention
    }

    fn channel(&self, id: &StreamId) -> std::result::Result<Arc<Channel<T>>, StreamError> {
        self.streams
            .lock()
            .channels
            .get(id)
            .cloned()
            .ok_or_else(|| StreamError::StreamNotFound {
                stream_id: id.to_string(),
            })
    }

    /// Registers a stream. Returns false if it already exists.
    pub fn open(&self, id: StreamId) -> bool {
        let mut streams = self.streams.lock();
        if streams.channels.contains_key(&id) {
            return false;
        }
        debug!(stream_id = %id, "stream opened");
        streams.channels.insert(id.clone(), Arc::new(Channel::new(id)));
        true
    }

    pub fn contains(&self, id: &StreamId) -> bool {
        self.streams.lock().channels.contains_key(id)
    }

    pub fn stream_ids(&self) -> Vec<StreamId> {
        let mut ids: Vec<StreamId> = self.streams.lock().channels.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Appends an item. Its index must follow the previous one.
    pub fn publish(&self, id: &StreamId, item: T) -> Result<()> {
        let channel = self.channel(id)?;
        let mut state = channel.state.lock();

        if state.closure.is_some() {
            return Err(StreamError::Closed {
                stream_id: id.to_string(),
            }
            .into());
        }
        if item.index() != state.next {
            return Err(IngestError::IndexMismatch {
                stream_id: id.to_string(),
                expected: state.next,
                actual: item.index(),
            });
        }

        state.bytes += item.byte_len();
        state.items.push_back(Arc::new(item));
        state.next += 1;

        while state.items.len() > self.retention.max_items
            || (state.bytes > self.retention.max_bytes && state.items.len() > 1)
        {
            if let Some(evicted) = state.items.pop_front() {
                state.bytes -= evicted.byte_len();
                state.first += 1;
            }
        }

        let next = state.next;
        trace!(stream_id = %id, index = next - 1, oldest = state.first, "published");
        drop(state);
        channel.notify.send_replace(next);
        Ok(())
    }

    /// Attaches a reader starting at `from_index`.
    pub fn subscribe(
        &self,
        id: &StreamId,
        from_index: u64,
    ) -> std::result::Result<Subscription<T>, StreamError> {
        let channel = self.channel(id)?;
        let changes = channel.notify.subscribe();
        Ok(Subscription {
            channel,
            cursor: from_index,
            changes,
        })
    }

    /// Ends a stream cleanly; readers drain what is retained, then see the end.
    pub fn close(&self, id: &StreamId) -> std::result::Result<(), StreamError> {
        if self.channel(id)?.end(Closure::Closed) {
            debug!(stream_id = %id, "stream closed");
            self.retire(id);
        }
        Ok(())
    }

    /// Ends a stream with an error marker.
    pub fn fail(&self, id: &StreamId, reason: &str) -> std::result::Result<(), StreamError> {
        if self.channel(id)?.end(Closure::Failed(reason.to_string())) {
            warn!(stream_id = %id, reason, "stream failed");
            self.retire(id);
        }
        Ok(())
    }

    /// Records an ended stream and drops the oldest ended ones past the limit.
    /// Attached readers hold their own channel and are unaffected.
    fn retire(&self, id: &StreamId) {
        let mut streams = self.streams.lock();
        if !streams.channels.contains_key(id) {
            return;
        }
        streams.ended.push_back(id.clone());
        while streams.ended.len() > self.retention.max_ended_streams {
            let Some(oldest) = streams.ended.pop_front() else {
                break;
            };
            streams.channels.remove(&oldest);
            debug!(stream_id = %oldest, "ended stream evicted");
        }
    }

    /// Drops a stream from the registry. Attached readers keep what is
    /// retained; a stream that was still open ends as failed.
    pub fn remove(&self, id: &StreamId) -> bool {
        let channel = {
            let mut streams = self.streams.lock();
            let Some(channel) = streams.channels.remove(id) else {
                return false;
            };
            streams.ended.retain(|ended| ended != id);
            channel
        };
        channel.end(Closure::Failed("stream removed".to_string()));
        debug!(stream_id = %id, "stream removed");
        true
    }

    pub fn stats(&self, id: &StreamId) -> Option<StreamStats> {
        let channel = self.streams.lock().channels.get(id).cloned()?;
        let state = channel.state.lock();
        Some(StreamStats {
            oldest: state.first,
            next: state.next,
            retained: state.items.len(),
            bytes: state.bytes,
            ended: state.closure.is_some(),
        })
    }
}

enum Step<T> {
    Item(Arc<T>),
    End,
    Wait,
}

/// A reader with its own cursor. Dropping it detaches it.
pub struct Subscription<T> {
    channel: Arc<Channel<T>>,
    cursor: u64,
    changes: watch::Receiver<u64>,
}

impl<T: Sequenced> Subscription<T> {
    pub fn stream_id(&self) -> &StreamId {
        &self.channel.id
    }

    /// Index of the next item this reader will receive.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    fn step(&mut self) -> std::result::Result<Step<T>, StreamError> {
        let state = self.channel.state.lock();
        if self.cursor < state.first {
            return Err(StreamError::FellBehind {
                requested: self.cursor,
                oldest: state.first,
            });
        }
        if self.cursor < state.next {
            let position = (self.cursor - state.first) as usize;
            if let Some(item) = state.items.get(position).cloned() {
                self.cursor += 1;
                return Ok(Step::Item(item));
            }
        }
        match &state.closure {
            Some(Closure::Closed) => Ok(Step::End),
            Some(Closure::Failed(reason)) => Err(StreamError::Aborted {
                reason: reason.clone(),
            }),
            None => Ok(Step::Wait),
        }
    }

    /// Returns the next item without waiting; `Ok(None)` if none is ready yet
    /// or the stream has ended.
    pub fn try_recv(&mut self) -> std::result::Result<Option<Arc<T>>, StreamError> {
        match self.step()? {
            Step::Item(item) => Ok(Some(item)),
            Step::End | Step::Wait => Ok(None),
        }
    }

    /// Waits for the next item. `Ok(None)` means the stream ended cleanly.
    pub async fn recv(&mut self) -> std::result::Result<Option<Arc<T>>, StreamError> {
        loop {
            self.changes.borrow_and_update();
            match self.step()? {
                Step::Item(item) => return Ok(Some(item)),
                Step::End => return Ok(None),
                Step::Wait => {}
            }
            if self.changes.changed().await.is_err() {
                return Ok(None);
            }
        }
    }

    /// Adapts the subscription into a `Stream` that ends after the first error.
    pub fn into_stream(self) -> impl Stream<Item = std::result::Result<Arc<T>, StreamError>> {
        futures_util::stream::unfold(Some(self), |state| async move {
            let mut subscription = state?;
            match subscription.recv().await {
                Ok(Some(item)) => Some((Ok(item), Some(subscription))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}
