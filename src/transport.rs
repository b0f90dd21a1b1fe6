//! Connection state machine that samples, encodes and delivers metric events.

use cadence::MetricSink;
use log::*;
use rand::{
    rngs::StdRng,
    SeedableRng,
};

use std::{
    fmt,
    mem,
    ops::{
        Deref,
        DerefMut,
    },
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
    },
};

use crate::{
    dimension::Dimensions,
    encoder::{
        encode,
        DimensionFormat,
        MetricType,
        MetricValue,
    },
    sampler::should_send,
    DEFAULT_MAX_BUFFER_SIZE,
};

#[derive(Debug)]
enum Mode {
    Immediate,
    Buffering {
        buffer: Vec<String>,
        max_size: usize,
    },
}

/// Owns the metric sink and the batching buffer.
///
/// In immediate mode every reported event is emitted to the sink as its own datagram.
/// After [`open_buffer`](Self::open_buffer) events are collected and emitted as a single
/// newline-joined datagram whenever the buffer reaches its capacity, on
/// [`flush`](Self::flush) and on [`close_buffer`](Self::close_buffer).
///
/// Delivery is best-effort: sink errors are logged and never returned to the caller.
/// A `Transport` does no locking of its own; see [`SharedTransport`] for a handle that
/// can be used from several facades or threads.
pub struct Transport<S: MetricSink> {
    sink: S,
    mode: Mode,
    format: DimensionFormat,
    max_buffer_size: usize,
    rng: StdRng,
}

impl<S: MetricSink> Transport<S> {
    /// Creates a transport in immediate mode with default settings.
    pub fn new(sink: S) -> Self {
        Self::from_parts(
            sink,
            DimensionFormat::default(),
            DEFAULT_MAX_BUFFER_SIZE,
            StdRng::from_os_rng(),
        )
    }

    pub(crate) fn from_parts(
        sink: S,
        format: DimensionFormat,
        max_buffer_size: usize,
        rng: StdRng,
    ) -> Self {
        Self {
            sink,
            mode: Mode::Immediate,
            format,
            max_buffer_size: clamp_capacity(max_buffer_size),
            rng,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn dimension_format(&self) -> DimensionFormat {
        self.format
    }

    /// Capacity used by [`batch`](Self::batch) when none is given explicitly.
    pub fn max_buffer_size(&self) -> usize {
        self.max_buffer_size
    }

    pub fn is_buffering(&self) -> bool {
        matches!(self.mode, Mode::Buffering { .. })
    }

    /// Number of payloads waiting in the buffer.
    pub fn buffered(&self) -> usize {
        match &self.mode {
            Mode::Immediate => 0,
            Mode::Buffering { buffer, .. } => buffer.len(),
        }
    }

    /// Reports a metric event.
    ///
    /// Events gated out by the sampler are dropped silently.
    pub fn report<V: Into<MetricValue>>(
        &mut self,
        name: &str,
        metric_type: MetricType,
        value: V,
        dimensions: &Dimensions,
        sample_rate: f64,
    ) {
        if !should_send(&mut self.rng, sample_rate) {
            trace!("sampled out: {}", name);
            return;
        }

        let payload = encode(
            name,
            metric_type,
            value.into(),
            dimensions,
            sample_rate,
            self.format,
        );

        match &mut self.mode {
            Mode::Immediate => do_send(&self.sink, &payload),

            Mode::Buffering { buffer, max_size } => {
                trace!("buffer: {}", payload);

                buffer.push(payload);
                if buffer.len() >= *max_size {
                    flush_buffer(&self.sink, buffer);
                }
            }
        }
    }

    /// Switches to buffering mode with the given capacity.
    ///
    /// If a buffer is already open its contents are flushed first. A capacity of 0 is
    /// treated as 1.
    pub fn open_buffer(&mut self, max_size: usize) {
        let max_size = clamp_capacity(max_size);

        if let Mode::Buffering { buffer, .. } = &mut self.mode {
            debug!("buffer already open, flushing {} metrics", buffer.len());
            flush_buffer(&self.sink, buffer);
        }

        trace!("open buffer: {}", max_size);
        self.mode = Mode::Buffering {
            buffer: Vec::with_capacity(max_size.min(DEFAULT_MAX_BUFFER_SIZE)),
            max_size,
        };
    }

    /// Flushes any buffered payloads and switches back to immediate mode.
    pub fn close_buffer(&mut self) {
        if let Mode::Buffering { mut buffer, .. } = mem::replace(&mut self.mode, Mode::Immediate) {
            trace!("close buffer");
            flush_buffer(&self.sink, &mut buffer);
        }
    }

    /// Sends buffered payloads now, staying in buffering mode.
    pub fn flush(&mut self) {
        if let Mode::Buffering { buffer, .. } = &mut self.mode {
            flush_buffer(&self.sink, buffer);
        }
    }

    /// Opens a buffer that is closed, and thereby flushed, when the returned guard is
    /// dropped. This includes unwinding out of a panic.
    ///
    /// ```
    /// use cadence::NopMetricSink;
    /// use monasca_statsd::{MetricType, Transport, Dimensions};
    ///
    /// let mut transport = Transport::new(NopMetricSink);
    /// {
    ///     let mut batch = transport.batch(10);
    ///     batch.report("a", MetricType::Counter, 1, &Dimensions::new(), 1.0);
    ///     batch.report("b", MetricType::Counter, 1, &Dimensions::new(), 1.0);
    /// }
    ///
    /// assert!(!transport.is_buffering());
    /// ```
    pub fn batch(&mut self, max_size: usize) -> Batch<'_, S> {
        self.open_buffer(max_size);
        Batch { transport: self }
    }

    /// Runs `f` inside a [`batch`](Self::batch) scope using the default capacity.
    pub fn with_batch<F, R>(&mut self, f: F) -> R
    where
        F: FnOnce(&mut Transport<S>) -> R,
    {
        let max_size = self.max_buffer_size;
        let mut batch = self.batch(max_size);
        f(&mut *batch)
    }
}

impl<S: MetricSink> Drop for Transport<S> {
    fn drop(&mut self) {
        self.close_buffer();
    }
}

impl<S: MetricSink + fmt::Debug> fmt::Debug for Transport<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("sink", &self.sink)
            .field("mode", &self.mode)
            .field("format", &self.format)
            .field("max_buffer_size", &self.max_buffer_size)
            .finish()
    }
}

fn clamp_capacity(max_size: usize) -> usize {
    if max_size == 0 {
        warn!("buffer capacity must be positive, using 1");
        1
    } else {
        max_size
    }
}

fn do_send<S: MetricSink>(sink: &S, datagram: &str) {
    match sink.emit(datagram) {
        Ok(n) => {
            debug!("sent {} bytes", n);
        }

        Err(e) => {
            error!("failed to send metrics: {:?}", e);
        }
    }
}

fn flush_buffer<S: MetricSink>(sink: &S, buffer: &mut Vec<String>) {
    if buffer.is_empty() {
        return;
    }

    trace!("flush: {} metrics", buffer.len());

    let datagram = buffer.join("\n");
    buffer.clear();
    do_send(sink, &datagram);
}

/// Scope guard returned by [`Transport::batch`].
pub struct Batch<'a, S: MetricSink> {
    transport: &'a mut Transport<S>,
}

impl<S: MetricSink> Deref for Batch<'_, S> {
    type Target = Transport<S>;

    fn deref(&self) -> &Self::Target {
        self.transport
    }
}

impl<S: MetricSink> DerefMut for Batch<'_, S> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.transport
    }
}

impl<S: MetricSink> Drop for Batch<'_, S> {
    fn drop(&mut self) {
        self.transport.close_buffer();
    }
}

/// Cloneable handle to a [`Transport`] shared by a client and its metric facades.
///
/// Calls are serialized through a mutex, so buffer appends and capacity flushes from
/// different threads never interleave.
pub struct SharedTransport<S: MetricSink> {
    inner: Arc<Mutex<Transport<S>>>,
}

impl<S: MetricSink> Clone for SharedTransport<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S: MetricSink> From<Transport<S>> for SharedTransport<S> {
    fn from(transport: Transport<S>) -> Self {
        Self::new(transport)
    }
}

impl<S: MetricSink + fmt::Debug> fmt::Debug for SharedTransport<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SharedTransport").field(&*self.lock()).finish()
    }
}

impl<S: MetricSink> SharedTransport<S> {
    pub fn new(transport: Transport<S>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(transport)),
        }
    }

    /// Locks the transport for direct access.
    ///
    /// Holding the guard while reporting through a facade of the same transport
    /// deadlocks.
    pub fn lock(&self) -> MutexGuard<'_, Transport<S>> {
        // a panic while reporting cannot leave the transport half-updated
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn report<V: Into<MetricValue>>(
        &self,
        name: &str,
        metric_type: MetricType,
        value: V,
        dimensions: &Dimensions,
        sample_rate: f64,
    ) {
        self.lock()
            .report(name, metric_type, value, dimensions, sample_rate);
    }

    pub fn open_buffer(&self, max_size: usize) {
        self.lock().open_buffer(max_size);
    }

    pub fn close_buffer(&self) {
        self.lock().close_buffer();
    }

    pub fn flush(&self) {
        self.lock().flush();
    }

    /// Shared counterpart of [`Transport::batch`]. The lock is only taken to open and
    /// to close the buffer, so facades can report while the guard is alive.
    pub fn batch(&self, max_size: usize) -> SharedBatch<S> {
        self.open_buffer(max_size);
        SharedBatch {
            transport: self.clone(),
        }
    }
}

/// Scope guard returned by [`SharedTransport::batch`].
pub struct SharedBatch<S: MetricSink> {
    transport: SharedTransport<S>,
}

impl<S: MetricSink> Drop for SharedBatch<S> {
    fn drop(&mut self) {
        self.transport.close_buffer();
    }
}


#[cfg(test)]
mod tests {
    use super::{
        testing::*,
        *,
    };
    use crate::dimensions;
    use std::{
        io::{
            Error,
            ErrorKind,
            Result,
        },
        panic::{
            catch_unwind,
            AssertUnwindSafe,
        },
    };

    fn transport(sink: RecordingSink) -> Transport<RecordingSink> {
        Transport::from_parts(
            sink,
            DimensionFormat::Plain,
            DEFAULT_MAX_BUFFER_SIZE,
            StdRng::seed_from_u64(42),
        )
    }

    fn count(t: &mut Transport<RecordingSink>, name: &str) {
        t.report(name, MetricType::Counter, 1, &Dimensions::new(), 1.0);
    }

    #[test]
    fn immediate_sends_each_payload() {
        pretty_env_logger::try_init().ok();

        let sink = RecordingSink::default();
        let mut t = transport(sink.clone());

        count(&mut t, "page.views");
        t.report(
            "gauge",
            MetricType::Gauge,
            1.5,
            &dimensions! { "env" => "test" },
            1.0,
        );

        assert_eq!(
            vec!["page.views:1|c".to_string(), "gauge:1.5|g|#env:test".to_string()],
            sink.datagrams()
        );
    }

    #[test]
    fn zero_rate_is_dropped() {
        let sink = RecordingSink::default();
        let mut t = transport(sink.clone());

        for _ in 0..1000 {
            t.report("x", MetricType::Counter, 1, &Dimensions::new(), 0.0);
        }

        assert!(sink.datagrams().is_empty());
    }

    #[test]
    fn sampled_frequency() {
        let sink = RecordingSink::default();
        let mut t = transport(sink.clone());

        for _ in 0..10_000 {
            t.report("sampled", MetricType::Counter, 1, &Dimensions::new(), 0.3);
        }

        let datagrams = sink.datagrams();
        assert!(
            (2850..=3150).contains(&datagrams.len()),
            "emitted {}",
            datagrams.len()
        );
        assert_eq!("sampled:1|c|@0.3", datagrams[0]);
    }

    #[test]
    fn buffer_flushes_at_capacity() {
        pretty_env_logger::try_init().ok();

        let sink = RecordingSink::default();
        let mut t = transport(sink.clone());

        t.open_buffer(50);
        for _ in 0..51 {
            count(&mut t, "mycounter");
        }

        let expected = vec!["mycounter:1|c"; 50].join("\n");
        assert_eq!(vec![expected.clone()], sink.datagrams());
        assert_eq!(1, t.buffered());

        t.close_buffer();

        assert_eq!(
            vec![expected, "mycounter:1|c".to_string()],
            sink.datagrams()
        );
        assert!(!t.is_buffering());
    }

    #[test]
    fn closing_empty_buffer_sends_nothing() {
        let sink = RecordingSink::default();
        let mut t = transport(sink.clone());

        t.open_buffer(10);
        t.close_buffer();
        t.close_buffer();

        assert!(sink.datagrams().is_empty());
    }

    #[test]
    fn flush_keeps_buffering() {
        let sink = RecordingSink::default();
        let mut t = transport(sink.clone());

        t.open_buffer(10);
        count(&mut t, "a");
        count(&mut t, "b");
        t.flush();
        count(&mut t, "c");

        assert_eq!(vec!["a:1|c\nb:1|c".to_string()], sink.take());
        assert!(t.is_buffering());
        assert_eq!(1, t.buffered());
    }

    #[test]
    fn reopening_flushes_pending() {
        let sink = RecordingSink::default();
        let mut t = transport(sink.clone());

        t.open_buffer(10);
        count(&mut t, "a");
        t.open_buffer(2);
        count(&mut t, "b");
        count(&mut t, "c");

        assert_eq!(
            vec!["a:1|c".to_string(), "b:1|c\nc:1|c".to_string()],
            sink.datagrams()
        );
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let sink = RecordingSink::default();
        let mut t = transport(sink.clone());

        t.open_buffer(0);
        count(&mut t, "a");
        count(&mut t, "b");

        assert_eq!(vec!["a:1|c".to_string(), "b:1|c".to_string()], sink.datagrams());
    }

    #[test]
    fn huge_capacity_is_not_preallocated() {
        let sink = RecordingSink::default();
        let mut t = transport(sink.clone());

        t.open_buffer(usize::MAX);
        count(&mut t, "a");
        assert!(sink.datagrams().is_empty());

        t.close_buffer();

        assert_eq!(vec!["a:1|c".to_string()], sink.datagrams());
    }

    #[test]
    fn batch_flushes_on_drop() {
        let sink = RecordingSink::default();
        let mut t = transport(sink.clone());

        {
            let mut batch = t.batch(50);
            count(&mut batch, "site.views");
            count(&mut batch, "site.timer");
            assert!(sink.datagrams().is_empty());
        }

        assert_eq!(vec!["site.views:1|c\nsite.timer:1|c".to_string()], sink.datagrams());
        assert!(!t.is_buffering());
    }

    #[test]
    fn batch_flushes_on_panic() {
        let sink = RecordingSink::default();
        let mut t = transport(sink.clone());

        let result = catch_unwind(AssertUnwindSafe(|| {
            let mut batch = t.batch(50);
            count(&mut batch, "a");
            count(&mut batch, "b");
            panic!("caller failure");
        }));

        assert!(result.is_err());
        assert_eq!(vec!["a:1|c\nb:1|c".to_string()], sink.datagrams());
        assert!(!t.is_buffering());
    }

    fn fail() -> Result<()> {
        Err(Error::new(ErrorKind::Other, "caller failure"))
    }

    #[test]
    fn with_batch_flushes_on_error() {
        let sink = RecordingSink::default();
        let mut t = transport(sink.clone());

        let result: Result<()> = t.with_batch(|t| {
            count(t, "a");
            count(t, "b");
            fail()?;
            count(t, "c");
            Ok(())
        });

        assert!(result.is_err());
        assert_eq!(vec!["a:1|c\nb:1|c".to_string()], sink.datagrams());
    }

    #[test]
    fn drop_flushes_open_buffer() {
        let sink = RecordingSink::default();

        {
            let mut t = transport(sink.clone());
            t.open_buffer(10);
            count(&mut t, "a");
        }

        assert_eq!(vec!["a:1|c".to_string()], sink.datagrams());
    }

    #[test]
    fn transmit_errors_are_swallowed() {
        pretty_env_logger::try_init().ok();

        let mut t = Transport::from_parts(
            BrokenSink,
            DimensionFormat::Plain,
            2,
            StdRng::seed_from_u64(1),
        );

        t.report("no.error", MetricType::Gauge, 1, &Dimensions::new(), 1.0);

        t.open_buffer(2);
        t.report("no.error", MetricType::Gauge, 1, &Dimensions::new(), 1.0);
        t.report("no.error", MetricType::Gauge, 1, &Dimensions::new(), 1.0);
        t.report("no.error", MetricType::Gauge, 1, &Dimensions::new(), 1.0);
        t.close_buffer();

        assert_eq!(0, t.buffered());
    }

    #[test]
    fn shared_batch_spans_clones() {
        let sink = RecordingSink::default();
        let shared = SharedTransport::new(transport(sink.clone()));
        let other = shared.clone();

        {
            let _batch = shared.batch(10);
            other.report("a", MetricType::Set, 3, &Dimensions::new(), 1.0);
            shared.report("b", MetricType::Set, 4, &Dimensions::new(), 1.0);
        }

        assert_eq!(vec!["a:3|s\nb:4|s".to_string()], sink.datagrams());
    }
}
