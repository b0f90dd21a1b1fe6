#![allow(clippy::type_complexity)]

//! StatsD client with dimensions.
//!
//! Metric events (counters, gauges, histograms, sets and timers) are encoded as
//!
//! ```text
//! <name>:<value>|<type>[|@<sample-rate>][|#<dimensions>]
//! ```
//!
//! and delivered over UDP, either one datagram per event or batched into newline-joined
//! datagrams of up to a fixed number of events.
//!
//! A [`Transport`] owns the sink and the batching buffer. A [`Client`] wraps a shared
//! transport together with a name prefix and default dimensions, and hands out
//! [`Counter`], [`Gauge`], [`Histogram`], [`Set`] and [`Timer`] facades.
//!
//! ### Example
//!
//! ```no_run
//! use monasca_statsd::{dimensions, Client};
//!
//! let client = Client::connect("localhost", monasca_statsd::DEFAULT_PORT)?
//!     .with_name("api")
//!     .with_dimensions(dimensions! { "env" => "prod" });
//!
//! client.counter("requests", None).increment(1);
//!
//! {
//!     let _batch = client.batch(20);
//!     client.gauge("pool", None).send("active", 12);
//!     client.histogram("upload", None).send("size", 1445);
//!     // both metrics leave in one datagram here
//! }
//!
//! let timer = client.timer("db", None);
//! let rows = timer.time("query", || 42);
//! # let _ = rows;
//! # Ok::<(), cadence::MetricError>(())
//! ```

use std::{
    future::Future,
    pin::Pin,
};

#[macro_use]
mod worker;

mod builder;
mod client;
mod dimension;
mod encoder;
mod metrics;
mod sampler;
mod transport;
mod udp;

pub use crate::{
    builder::Builder,
    client::Client,
    dimension::{
        DimensionValue,
        Dimensions,
    },
    encoder::{
        encode,
        DimensionFormat,
        MetricType,
        MetricValue,
    },
    metrics::{
        Counter,
        Gauge,
        Histogram,
        Set,
        Timer,
        TimerScope,
    },
    sampler::should_send,
    transport::{
        Batch,
        SharedBatch,
        SharedTransport,
        Transport,
    },
    udp::TokioUdpSink,
};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 8125;
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 50;
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Processing future of an asynchronous sink; see [`TokioUdpSink`].
pub type MetricFuture = Pin<Box<dyn Future<Output = ()> + Send + Sync + 'static>>;
