//! Single-use pull cursors over streamed store records.

use log::warn;

use geostore_driver::{RawFeature, RawFeatureReader};

use crate::Error;

type OpenFn = Box<dyn FnOnce() -> Result<Box<dyn RawFeatureReader>, Error> + Send>;
type CastFn<T> = Box<dyn FnMut(RawFeature) -> Result<T, Error> + Send>;

/// A forward-only cursor over a lazily opened record stream.
///
/// Each raw record pulled is cast to the cursor's entity type. The stream
/// is not opened until the first record is requested, so constructing a
/// cursor never touches the store. Stream and cast errors are not
/// surfaced to the caller: the cursor logs them, closes itself, and reads
/// as exhausted from then on.
///
/// A cursor holds a scarce backing resource. Callers that do not exhaust
/// it must call `close()`; `Drop` closes as a backstop, but the explicit
/// call remains the documented protocol.
///
/// Deliberately not an `Iterator`: `skip` must not cast the records it
/// passes over and `for_each` must close on return, and the std adapters
/// of the same names would take precedence over both.
pub struct Cursor<T> {
    open: Option<OpenFn>,
    reader: Option<Box<dyn RawFeatureReader>>,
    cast: CastFn<T>,
    index: i64,
    closed: bool,
}

impl<T> Cursor<T> {
    /// A cursor that opens its stream on first use.
    pub fn new(
        open: impl FnOnce() -> Result<Box<dyn RawFeatureReader>, Error> + Send + 'static,
        cast: impl FnMut(RawFeature) -> Result<T, Error> + Send + 'static,
    ) -> Self {
        Cursor {
            open: Some(Box::new(open)),
            reader: None,
            cast: Box::new(cast),
            index: -1,
            closed: false,
        }
    }

    /// A cursor over an already-open stream.
    pub fn from_reader(
        reader: Box<dyn RawFeatureReader>,
        cast: impl FnMut(RawFeature) -> Result<T, Error> + Send + 'static,
    ) -> Self {
        Cursor {
            open: None,
            reader: Some(reader),
            cast: Box::new(cast),
            index: -1,
            closed: false,
        }
    }

    /// An already-exhausted cursor.
    pub fn empty() -> Self {
        Cursor {
            open: None,
            reader: None,
            cast: Box::new(|_| Err(Error::invalid("empty cursor"))),
            index: -1,
            closed: true,
        }
    }

    /// The position of the most recently returned record, starting at -1
    /// before any record has been read. Monotonic across the cursor's
    /// lifetime.
    pub fn index(&self) -> i64 {
        self.index
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Whether another record is available. Opens the stream on first
    /// use. A stream error closes the cursor and reads as exhaustion.
    pub fn has_next(&mut self) -> bool {
        if self.closed {
            return false;
        }
        if self.reader.is_none() {
            match self.open.take() {
                Some(open) => match open() {
                    Ok(reader) => self.reader = Some(reader),
                    Err(err) => {
                        warn!("cursor failed to open: {}", err);
                        self.close();
                        return false;
                    }
                },
                None => {
                    self.close();
                    return false;
                }
            }
        }
        match self.reader.as_mut().map(|r| r.has_next()) {
            Some(Ok(more)) => {
                if !more {
                    self.close();
                }
                more
            }
            Some(Err(err)) => {
                warn!("cursor stream error: {}", err);
                self.close();
                false
            }
            None => false,
        }
    }

    /// The next entity, or `None` once exhausted.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<T> {
        self.read(1).pop()
    }

    /// Pull up to `count` records, casting each. Returns fewer than
    /// `count` if the stream is exhausted mid-read, never more.
    pub fn read(&mut self, count: usize) -> Vec<T> {
        let mut entities = Vec::with_capacity(count);
        while entities.len() < count {
            match self.pull() {
                Some(raw) => match (self.cast)(raw) {
                    Ok(entity) => entities.push(entity),
                    Err(err) => {
                        warn!("cursor cast error: {}", err);
                        self.close();
                        break;
                    }
                },
                None => break,
            }
        }
        entities
    }

    /// Advance past up to `count` records without casting them.
    pub fn skip(&mut self, count: usize) -> &mut Self {
        for _ in 0..count {
            if self.pull().is_none() {
                break;
            }
        }
        self
    }

    /// Read up to `count` records, then unconditionally close.
    pub fn get(&mut self, count: usize) -> Vec<T> {
        let entities = self.read(count);
        self.close();
        entities
    }

    /// The first remaining entity, closing the cursor afterwards.
    pub fn first(&mut self) -> Option<T> {
        self.get(1).pop()
    }

    /// Call `each` on every remaining entity with a 0-based position
    /// local to this call. Returning `false` stops early. The cursor is
    /// closed when this returns.
    pub fn for_each(&mut self, mut each: impl FnMut(T, usize) -> bool) {
        let mut position = 0;
        while let Some(entity) = self.next() {
            if !each(entity, position) {
                break;
            }
            position += 1;
        }
        self.close();
    }

    /// Release the underlying stream. Idempotent, and safe on a cursor
    /// that was never opened. A closed cursor never reopens.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.open = None;
        if let Some(mut reader) = self.reader.take() {
            reader.close();
        }
    }

    /// One raw record off the stream, advancing the index.
    fn pull(&mut self) -> Option<RawFeature> {
        if !self.has_next() {
            return None;
        }
        match self.reader.as_mut()?.next() {
            Ok(raw) => {
                self.index += 1;
                Some(raw)
            }
            Err(err) => {
                warn!("cursor stream error: {}", err);
                self.close();
                None
            }
        }
    }
}

impl<T> Drop for Cursor<T> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<T> std::fmt::Debug for Cursor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("index", &self.index)
            .field("opened", &self.reader.is_some())
            .field("closed", &self.closed)
            .finish()
    }
}
