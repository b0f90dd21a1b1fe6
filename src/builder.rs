//! Builder for customizing a [`Transport`](crate::Transport) and its metric sink.

use cadence::{
    ErrorKind as MetricErrorKind,
    MetricError,
    MetricResult,
    MetricSink,
    UdpMetricSink,
};

use log::*;
use rand::{
    rngs::StdRng,
    SeedableRng,
};

use std::net::{
    SocketAddr,
    ToSocketAddrs,
    UdpSocket,
};

use crate::{
    encoder::DimensionFormat,
    transport::Transport,
    DEFAULT_HOST,
    DEFAULT_MAX_BUFFER_SIZE,
    DEFAULT_PORT,
    DEFAULT_QUEUE_CAPACITY,
};

/// Builder allows you to override various default parameter values before creating a
/// [`Transport`].
///
/// ```no_run
/// use monasca_statsd::{Builder, DimensionFormat};
///
/// let mut builder = Builder::new();
/// builder
///     .host("metrics.example.com")
///     .max_buffer_size(20)
///     .dimension_format(DimensionFormat::Mapping);
///
/// let transport = builder.build()?;
/// # Ok::<(), cadence::MetricError>(())
/// ```
#[derive(Clone, Debug)]
pub struct Builder {
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) queue_cap: usize,
    pub(crate) max_buffer_size: usize,
    pub(crate) format: DimensionFormat,
    pub(crate) seed: Option<u64>,
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder {
    pub fn new() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            queue_cap: DEFAULT_QUEUE_CAPACITY,
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            format: DimensionFormat::default(),
            seed: None,
        }
    }

    /// Sets the statsd host name or address (default: [DEFAULT_HOST](crate::DEFAULT_HOST)).
    pub fn host<T: Into<String>>(&mut self, host: T) -> &mut Self {
        self.host = host.into();
        self
    }

    /// Sets the statsd port (default: [DEFAULT_PORT](crate::DEFAULT_PORT)).
    pub fn port(&mut self, port: u16) -> &mut Self {
        self.port = port;
        self
    }

    /// Sets the maximum queue capacity of the asynchronous sink
    /// (default: [DEFAULT_QUEUE_CAPACITY](crate::DEFAULT_QUEUE_CAPACITY)).
    pub fn queue_cap(&mut self, queue_cap: usize) -> &mut Self {
        self.queue_cap = queue_cap;
        self
    }

    /// Sets the number of metrics a batch holds before it is flushed
    /// (default: [DEFAULT_MAX_BUFFER_SIZE](crate::DEFAULT_MAX_BUFFER_SIZE)).
    pub fn max_buffer_size(&mut self, max_buffer_size: usize) -> &mut Self {
        self.max_buffer_size = max_buffer_size;
        self
    }

    /// Sets how dimensions are rendered on the wire (default: [DimensionFormat::Plain]).
    pub fn dimension_format(&mut self, format: DimensionFormat) -> &mut Self {
        self.format = format;
        self
    }

    /// Seeds the sampling RNG, making sampled output reproducible.
    pub fn seed(&mut self, seed: u64) -> &mut Self {
        self.seed = Some(seed);
        self
    }

    /// Creates a transport that sends datagrams from the calling thread over a freshly
    /// bound UDP socket.
    ///
    /// # Errors
    ///
    /// Returns an error when the destination is invalid or does not resolve, or when no
    /// local socket can be bound.
    pub fn build(&self) -> MetricResult<Transport<UdpMetricSink>> {
        let addr = self.resolve(None)?;
        let bind_addr = if addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind_addr)?;

        self.build_with_socket(socket)
    }

    /// Like [`build`](Self::build), using a previously bound UDP socket.
    pub fn build_with_socket(&self, socket: UdpSocket) -> MetricResult<Transport<UdpMetricSink>> {
        let addr = self.resolve(socket.local_addr().ok())?;
        let sink = UdpMetricSink::from(addr, socket)?;

        Ok(self.build_with_sink(sink))
    }

    /// Creates a transport that delivers datagrams to an arbitrary sink.
    pub fn build_with_sink<S: MetricSink>(&self, sink: S) -> Transport<S> {
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Transport::from_parts(sink, self.format, self.max_buffer_size, rng)
    }

    /// Resolves the configured destination, preferring an address of the same family as
    /// `local` (IPv4 when unknown).
    pub(crate) fn resolve(&self, local: Option<SocketAddr>) -> MetricResult<SocketAddr> {
        if self.host.is_empty() {
            return Err(MetricError::from((
                MetricErrorKind::InvalidInput,
                "Host must not be empty",
            )));
        }

        if self.port == 0 {
            return Err(MetricError::from((
                MetricErrorKind::InvalidInput,
                "Port must be greater than 0",
            )));
        }

        let addrs: Vec<SocketAddr> = (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .collect();

        let want_ipv4 = local.map_or(true, |local| local.is_ipv4());
        let addr = addrs
            .iter()
            .find(|addr| addr.is_ipv4() == want_ipv4)
            .or_else(|| addrs.first())
            .copied()
            .ok_or_else(|| {
                MetricError::from((MetricErrorKind::InvalidInput, "No socket addresses yielded"))
            })?;

        debug!("statsd destination {}:{} -> {}", self.host, self.port, addr);
        Ok(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::RecordingSink;
    use crate::{
        dimensions,
        Dimensions,
        MetricType,
    };

    #[test]
    fn defaults() {
        let builder = Builder::new();

        assert_eq!("localhost", builder.host);
        assert_eq!(8125, builder.port);
        assert_eq!(50, builder.max_buffer_size);
        assert_eq!(DimensionFormat::Plain, builder.format);
    }

    #[test]
    fn resolve_loopback() -> MetricResult<()> {
        let mut builder = Builder::new();
        builder.host("127.0.0.1").port(9125);

        assert_eq!("127.0.0.1:9125".parse::<SocketAddr>().unwrap(), builder.resolve(None)?);

        Ok(())
    }

    #[test]
    fn bad_address() {
        let mut builder = Builder::new();
        builder.host("bad address");

        assert!(builder.build().is_err());
    }

    #[test]
    fn empty_host_and_zero_port() {
        let mut builder = Builder::new();
        builder.host("");
        assert_eq!(
            Some(MetricErrorKind::InvalidInput),
            builder.build().err().map(|e| e.kind())
        );

        let mut builder = Builder::new();
        builder.host("127.0.0.1").port(0);
        assert_eq!(
            Some(MetricErrorKind::InvalidInput),
            builder.build().err().map(|e| e.kind())
        );
    }

    #[test]
    fn build_udp() -> MetricResult<()> {
        let mut builder = Builder::new();
        builder.host("127.0.0.1");

        let transport = builder.build()?;
        assert!(!transport.is_buffering());

        Ok(())
    }

    #[test]
    fn build_with_sink_applies_settings() {
        let sink = RecordingSink::default();
        let mut builder = Builder::new();
        builder
            .max_buffer_size(2)
            .dimension_format(DimensionFormat::Mapping)
            .seed(3);

        let mut transport = builder.build_with_sink(sink.clone());
        assert_eq!(2, transport.max_buffer_size());

        transport.with_batch(|t| {
            let dims = dimensions! { "env" => "test" };
            t.report("a", MetricType::Counter, 1, &dims, 1.0);
            t.report("b", MetricType::Counter, 1, &dims, 1.0);
            t.report("c", MetricType::Counter, 1, &dims, 1.0);
        });

        assert_eq!(
            vec![
                "a:1|c|#{'env': 'test'}\nb:1|c|#{'env': 'test'}".to_string(),
                "c:1|c|#{'env': 'test'}".to_string(),
            ],
            sink.datagrams()
        );
    }

    #[test]
    fn seeded_sampling_is_reproducible() {
        let run = || {
            let sink = RecordingSink::default();
            let mut builder = Builder::new();
            builder.seed(99);

            let mut transport = builder.build_with_sink(sink.clone());
            for i in 0..100 {
                transport.report("s", MetricType::Set, i, &Dimensions::new(), 0.5);
            }

            sink.datagrams()
        };

        assert_eq!(run(), run());
    }

    #[test]
    fn udp_round_trip() -> MetricResult<()> {
        pretty_env_logger::try_init().ok();

        let server = UdpSocket::bind("127.0.0.1:0")?;
        let port = server.local_addr()?.port();

        let mut builder = Builder::new();
        builder.host("127.0.0.1").port(port);

        let mut transport = builder.build()?;
        transport.report("page.views", MetricType::Counter, 1, &Dimensions::new(), 1.0);

        let mut buf = [0; 8192];
        let (received, addr) = server.recv_from(&mut buf)?;

        debug!(
            "received {} bytes from {} with {}",
            received,
            addr,
            String::from_utf8_lossy(&buf[..received])
        );

        assert_eq!("page.views:1|c", String::from_utf8_lossy(&buf[..received]));

        Ok(())
    }
}
