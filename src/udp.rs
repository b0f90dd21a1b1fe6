//! Asynchronous datagram sink that sends over UDP using the Tokio runtime.

use cadence::{
    ErrorKind as MetricErrorKind,
    MetricError,
    MetricResult,
    MetricSink,
};

use std::{
    io::Result,
    net::SocketAddr,
    panic::{
        RefUnwindSafe,
        UnwindSafe,
    },
};

use tokio::{
    net::UdpSocket,
    sync::mpsc::{
        channel,
        Sender,
    },
};

use crate::{
    builder::Builder,
    transport::Transport,
    worker::TrySend,
    MetricFuture,
};

impl Builder {
    /// Creates a transport whose datagrams are queued without blocking and sent by a
    /// worker future over the given Tokio UDP socket.
    ///
    /// # Errors
    ///
    /// Returns an error when the destination is invalid or does not resolve, or when
    /// the configured queue capacity is 0.
    pub fn build_async(
        &self,
        socket: UdpSocket,
    ) -> MetricResult<(Transport<TokioUdpSink>, MetricFuture)> {
        let addr = self.resolve(socket.local_addr().ok())?;
        let (sink, worker_fut) = TokioUdpSink::from(addr, socket, self.queue_cap)?;

        Ok((self.build_with_sink(sink), worker_fut))
    }
}

/// Metric sink that allows clients to enqueue datagrams without blocking, and sending
/// them asynchronously via UDP using Tokio runtime.
///
/// Every emitted string is sent as exactly one datagram; batching is the job of the
/// [`Transport`] in front of it. Exceeding the configured queue capacity results in a
/// `WouldBlock` error, which the transport logs and drops.
///
/// ## Important!
/// The client is responsible for polling the asynchronous processing future, which is created along
/// with the sink, in a manner appropriate for the application (e.g., spawning it in a Tokio task pool).
///
/// The client should also wait for this future to complete *after* dropping the transport.
///
/// ### Example
///
/// ```no_run
/// use monasca_statsd::{dimensions, Builder, Client};
/// use tokio::{spawn, net::UdpSocket};
///
/// # #[tokio::main]
/// # async fn main() -> cadence::MetricResult<()> {
/// let socket = UdpSocket::bind("0.0.0.0:0").await?;
/// let mut builder = Builder::new();
/// builder.host("metrics.example.com");
/// let (transport, process) = builder.build_async(socket)?;
///
/// // Spawn the future!
/// let processing_job = spawn(process);
///
/// {
///     let client = Client::from_transport(transport)
///         .with_name("my.service")
///         .with_dimensions(dimensions! { "env" => "prod" });
///
///     // Emit metrics!
///     client.counter("requests", None).increment(1);
///     client.gauge("", None).send("queue.depth", 7);
///
///     // the client drops here, and the sink along with it
/// }
///
/// // Wait for the processing job to complete!
/// processing_job.await.unwrap();
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct TokioUdpSink {
    tx: Sender<String>,
}

// we don't let tx panic
impl UnwindSafe for TokioUdpSink {}
impl RefUnwindSafe for TokioUdpSink {}

impl TokioUdpSink {
    /// Creates a new sink for the given statsd address using a previously bound UDP
    /// socket and the given queue capacity.
    pub fn from(
        addr: SocketAddr,
        socket: UdpSocket,
        queue_cap: usize,
    ) -> MetricResult<(Self, MetricFuture)> {
        if queue_cap == 0 {
            return Err(MetricError::from((
                MetricErrorKind::InvalidInput,
                "Queue capacity must be greater than 0",
            )));
        }

        let (tx, rx) = channel(queue_cap);
        let worker_fut = worker(rx, socket, addr);

        Ok((Self { tx }, Box::pin(worker_fut)))
    }
}

impl TrySend for TokioUdpSink {
    fn sender(&self) -> &Sender<String> {
        &self.tx
    }
}

impl MetricSink for TokioUdpSink {
    fn emit(&self, metric: &str) -> Result<usize> {
        self.try_send(metric.to_string())?;
        Ok(metric.len())
    }
}

define_worker!(UdpSocket, SocketAddr);
