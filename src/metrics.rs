//! Per-type metric facades created by a [`Client`](crate::Client).
//!
//! Every facade call ends in exactly one [`SharedTransport::report`].

use cadence::MetricSink;
use std::{
    future::Future,
    ops::{
        AddAssign,
        SubAssign,
    },
};

use tokio::time::Instant;

use crate::{
    client::join_name,
    dimension::Dimensions,
    encoder::{
        MetricType,
        MetricValue,
    },
    transport::SharedTransport,
};

/// Effective name, effective dimensions and transport of one facade.
pub(crate) struct Binding<S: MetricSink> {
    name: String,
    dimensions: Dimensions,
    transport: SharedTransport<S>,
}

impl<S: MetricSink> Clone for Binding<S> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            dimensions: self.dimensions.clone(),
            transport: self.transport.clone(),
        }
    }
}

impl<S: MetricSink> Binding<S> {
    pub(crate) fn new(name: String, dimensions: Dimensions, transport: SharedTransport<S>) -> Self {
        Self {
            name,
            dimensions,
            transport,
        }
    }

    fn report<V: Into<MetricValue>>(
        &self,
        suffix: &str,
        metric_type: MetricType,
        value: V,
        dimensions: Option<&Dimensions>,
        sample_rate: f64,
    ) {
        let name = join_name(Some(self.name.as_str()), suffix);
        let dimensions = self.dimensions.merge_opt(dimensions);
        self.transport
            .report(&name, metric_type, value, &dimensions, sample_rate);
    }
}

macro_rules! facade {
    ($(#[$attr:meta])* $Facade:ident) => {
        $(#[$attr])*
        pub struct $Facade<S: MetricSink> {
            binding: Binding<S>,
        }

        impl<S: MetricSink> Clone for $Facade<S> {
            fn clone(&self) -> Self {
                Self {
                    binding: self.binding.clone(),
                }
            }
        }

        impl<S: MetricSink> $Facade<S> {
            pub(crate) fn new(binding: Binding<S>) -> Self {
                Self { binding }
            }

            /// Effective metric name, including the client prefix.
            pub fn name(&self) -> &str {
                &self.binding.name
            }

            /// Effective dimensions, client defaults merged with the facade's own.
            pub fn dimensions(&self) -> &Dimensions {
                &self.binding.dimensions
            }
        }
    };
}

facade!(
    /// Counter (`c`) bound to a single metric name.
    ///
    /// `counter += n` and `counter -= n` are shorthand for `increment(n)` and
    /// `decrement(n)`.
    Counter
);

facade!(
    /// Gauge (`g`) facade; [`send`](Gauge::send) appends its name to the facade name.
    Gauge
);

facade!(
    /// Histogram (`h`) facade.
    Histogram
);

facade!(
    /// Set (`s`) facade.
    Set
);

facade!(
    /// Timer (`ms`) facade. Elapsed times are reported in milliseconds.
    Timer
);

impl<S: MetricSink> Counter<S> {
    pub fn increment<V: Into<MetricValue>>(&self, value: V) {
        self.increment_with(value, None, 1.0);
    }

    pub fn increment_with<V: Into<MetricValue>>(
        &self,
        value: V,
        dimensions: Option<&Dimensions>,
        sample_rate: f64,
    ) {
        self.binding
            .report("", MetricType::Counter, value, dimensions, sample_rate);
    }

    pub fn decrement<V: Into<MetricValue>>(&self, value: V) {
        self.decrement_with(value, None, 1.0);
    }

    /// Reports `-value`; integer values saturate.
    pub fn decrement_with<V: Into<MetricValue>>(
        &self,
        value: V,
        dimensions: Option<&Dimensions>,
        sample_rate: f64,
    ) {
        self.increment_with(-value.into(), dimensions, sample_rate);
    }
}

impl<S: MetricSink, V: Into<MetricValue>> AddAssign<V> for Counter<S> {
    fn add_assign(&mut self, value: V) {
        self.increment(value);
    }
}

impl<S: MetricSink, V: Into<MetricValue>> SubAssign<V> for Counter<S> {
    fn sub_assign(&mut self, value: V) {
        self.decrement(value);
    }
}

macro_rules! send_impl {
    ($Facade:ident, $metric_type:expr) => {
        impl<S: MetricSink> $Facade<S> {
            /// Reports `value` under `<facade name>.<name>`; an empty `name` reports under
            /// the facade name alone.
            pub fn send<V: Into<MetricValue>>(&self, name: &str, value: V) {
                self.send_with(name, value, None, 1.0);
            }

            pub fn send_with<V: Into<MetricValue>>(
                &self,
                name: &str,
                value: V,
                dimensions: Option<&Dimensions>,
                sample_rate: f64,
            ) {
                self.binding
                    .report(name, $metric_type, value, dimensions, sample_rate);
            }
        }
    };
}

send_impl!(Gauge, MetricType::Gauge);
send_impl!(Histogram, MetricType::Histogram);
send_impl!(Set, MetricType::Set);

impl<S: MetricSink> Timer<S> {
    pub fn timing<V: Into<MetricValue>>(&self, name: &str, value: V) {
        self.timing_with(name, value, None, 1.0);
    }

    pub fn timing_with<V: Into<MetricValue>>(
        &self,
        name: &str,
        value: V,
        dimensions: Option<&Dimensions>,
        sample_rate: f64,
    ) {
        self.binding
            .report(name, MetricType::Timer, value, dimensions, sample_rate);
    }

    /// Runs `f` and reports how long it took.
    ///
    /// Nothing is reported if `f` panics.
    pub fn time<F, R>(&self, name: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        self.time_with(name, None, 1.0, f)
    }

    pub fn time_with<F, R>(
        &self,
        name: &str,
        dimensions: Option<&Dimensions>,
        sample_rate: f64,
        f: F,
    ) -> R
    where
        F: FnOnce() -> R,
    {
        let started = Instant::now();
        let result = f();
        self.timing_with(name, started.elapsed(), dimensions, sample_rate);
        result
    }

    /// Awaits `fut` and reports how long it took to complete.
    pub async fn time_async<F>(&self, name: &str, fut: F) -> F::Output
    where
        F: Future,
    {
        let started = Instant::now();
        let output = fut.await;
        self.timing(name, started.elapsed());
        output
    }

    /// Starts timing a scope; the elapsed time is reported when the returned guard is
    /// dropped, including when unwinding out of a panic.
    pub fn start(&self, name: &str) -> TimerScope<'_, S> {
        self.start_with(name, None, 1.0)
    }

    pub fn start_with(
        &self,
        name: &str,
        dimensions: Option<&Dimensions>,
        sample_rate: f64,
    ) -> TimerScope<'_, S> {
        TimerScope {
            timer: self,
            name: name.to_string(),
            dimensions: dimensions.cloned(),
            sample_rate,
            started: Instant::now(),
        }
    }
}

/// Scope guard returned by [`Timer::start`].
pub struct TimerScope<'a, S: MetricSink> {
    timer: &'a Timer<S>,
    name: String,
    dimensions: Option<Dimensions>,
    sample_rate: f64,
    started: Instant,
}

impl<S: MetricSink> Drop for TimerScope<'_, S> {
    fn drop(&mut self) {
        self.timer.timing_with(
            &self.name,
            self.started.elapsed(),
            self.dimensions.as_ref(),
            self.sample_rate,
        );
    }
}
