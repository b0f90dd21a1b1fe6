//! Name and dimension defaults shared by a family of metric facades.

use cadence::{
    MetricResult,
    MetricSink,
    UdpMetricSink,
};

use crate::{
    builder::Builder,
    dimension::Dimensions,
    metrics::{
        Binding,
        Counter,
        Gauge,
        Histogram,
        Set,
        Timer,
    },
    transport::{
        SharedBatch,
        SharedTransport,
        Transport,
    },
};

/// Entry point for emitting metrics.
///
/// A client holds an optional name prefix, a set of default dimensions and the
/// [`SharedTransport`] used by every facade it creates. Each facade takes a snapshot of
/// the client's name and dimensions when it is created.
///
/// ```
/// use cadence::NopMetricSink;
/// use monasca_statsd::{dimensions, Client, Transport};
///
/// let client = Client::from_transport(Transport::new(NopMetricSink))
///     .with_name("api")
///     .with_dimensions(dimensions! { "env" => "test" });
///
/// let requests = client.counter("requests", Some(&dimensions! { "method" => "GET" }));
/// assert_eq!("api.requests", requests.name());
/// requests.increment(1);
/// ```
pub struct Client<S: MetricSink> {
    name: Option<String>,
    dimensions: Dimensions,
    transport: SharedTransport<S>,
}

impl<S: MetricSink> Clone for Client<S> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            dimensions: self.dimensions.clone(),
            transport: self.transport.clone(),
        }
    }
}

impl Client<UdpMetricSink> {
    /// Creates a client sending from the calling thread to the given statsd host and port,
    /// with all other settings defaulted.
    ///
    /// # Errors
    ///
    /// Returns an error when the destination is invalid or does not resolve.
    pub fn connect<T: Into<String>>(host: T, port: u16) -> MetricResult<Self> {
        let mut builder = Builder::new();
        builder.host(host).port(port);

        Ok(Self::from_transport(builder.build()?))
    }
}

impl<S: MetricSink> Client<S> {
    pub fn from_transport(transport: Transport<S>) -> Self {
        Self::from_shared(SharedTransport::new(transport))
    }

    /// Creates a client on a transport that may already be shared with other clients.
    pub fn from_shared(transport: SharedTransport<S>) -> Self {
        Self {
            name: None,
            dimensions: Dimensions::new(),
            transport,
        }
    }

    /// Sets the prefix prepended to every metric name.
    pub fn with_name<T: Into<String>>(mut self, name: T) -> Self {
        let name = name.into();
        self.name = if name.is_empty() { None } else { Some(name) };
        self
    }

    /// Sets the dimensions attached to every metric.
    pub fn with_dimensions(mut self, dimensions: Dimensions) -> Self {
        self.dimensions = dimensions;
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn dimensions(&self) -> &Dimensions {
        &self.dimensions
    }

    pub fn transport(&self) -> &SharedTransport<S> {
        &self.transport
    }

    pub fn counter(&self, name: &str, dimensions: Option<&Dimensions>) -> Counter<S> {
        self.counter_on(name, dimensions, &self.transport)
    }

    pub fn gauge(&self, name: &str, dimensions: Option<&Dimensions>) -> Gauge<S> {
        self.gauge_on(name, dimensions, &self.transport)
    }

    pub fn histogram(&self, name: &str, dimensions: Option<&Dimensions>) -> Histogram<S> {
        self.histogram_on(name, dimensions, &self.transport)
    }

    pub fn set(&self, name: &str, dimensions: Option<&Dimensions>) -> Set<S> {
        self.set_on(name, dimensions, &self.transport)
    }

    pub fn timer(&self, name: &str, dimensions: Option<&Dimensions>) -> Timer<S> {
        self.timer_on(name, dimensions, &self.transport)
    }

    /// Like [`counter`](Self::counter), reporting through `transport` instead of the
    /// client's own transport. The client's name and dimensions still apply.
    pub fn counter_on(
        &self,
        name: &str,
        dimensions: Option<&Dimensions>,
        transport: &SharedTransport<S>,
    ) -> Counter<S> {
        Counter::new(self.bind(name, dimensions, transport))
    }

    pub fn gauge_on(
        &self,
        name: &str,
        dimensions: Option<&Dimensions>,
        transport: &SharedTransport<S>,
    ) -> Gauge<S> {
        Gauge::new(self.bind(name, dimensions, transport))
    }

    pub fn histogram_on(
        &self,
        name: &str,
        dimensions: Option<&Dimensions>,
        transport: &SharedTransport<S>,
    ) -> Histogram<S> {
        Histogram::new(self.bind(name, dimensions, transport))
    }

    pub fn set_on(
        &self,
        name: &str,
        dimensions: Option<&Dimensions>,
        transport: &SharedTransport<S>,
    ) -> Set<S> {
        Set::new(self.bind(name, dimensions, transport))
    }

    pub fn timer_on(
        &self,
        name: &str,
        dimensions: Option<&Dimensions>,
        transport: &SharedTransport<S>,
    ) -> Timer<S> {
        Timer::new(self.bind(name, dimensions, transport))
    }

    /// See [`Transport::open_buffer`].
    pub fn open_buffer(&self, max_size: usize) {
        self.transport.open_buffer(max_size);
    }

    /// See [`Transport::close_buffer`].
    pub fn close_buffer(&self) {
        self.transport.close_buffer();
    }

    pub fn flush(&self) {
        self.transport.flush();
    }

    /// Batches everything reported through this client's transport until the returned
    /// guard is dropped.
    pub fn batch(&self, max_size: usize) -> SharedBatch<S> {
        self.transport.batch(max_size)
    }

    /// Runs `f` inside a [`batch`](Self::batch) scope using the transport's default
    /// buffer size.
    pub fn with_batch<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&Self) -> R,
    {
        let max_size = self.transport.lock().max_buffer_size();
        let _batch = self.batch(max_size);
        f(self)
    }

    fn bind(
        &self,
        name: &str,
        dimensions: Option<&Dimensions>,
        transport: &SharedTransport<S>,
    ) -> Binding<S> {
        Binding::new(
            join_name(self.name.as_deref(), name),
            self.dimensions.merge_opt(dimensions),
            transport.clone(),
        )
    }
}

/// Joins `prefix` and `name` with a dot, or returns whichever one is non-empty.
pub(crate) fn join_name(prefix: Option<&str>, name: &str) -> String {
    match prefix {
        Some(prefix) if !prefix.is_empty() => {
            if name.is_empty() {
                prefix.to_string()
            } else {
                format!("{}.{}", prefix, name)
            }
        }

        _ => name.to_string(),
    }
}
