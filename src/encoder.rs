//! Wire encoding of a single metric event.
//!
//! ```text
//! <name>:<value>|<type>[|@<sample-rate>][|#<dimensions>]
//! ```
//!
//! Nothing is escaped: names, dimension keys and dimension values must not contain
//! `:`, `|`, `#` or `,`.

use std::{
    fmt::{
        self,
        Write,
    },
    ops::Neg,
    time::Duration,
};

use crate::dimension::{
    DimensionValue,
    Dimensions,
};

/// StatsD metric type, rendered as the type tag of the payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MetricType {
    Counter,
    Gauge,
    Histogram,
    Set,
    Timer,
}

impl MetricType {
    pub fn tag(self) -> &'static str {
        match self {
            MetricType::Counter => "c",
            MetricType::Gauge => "g",
            MetricType::Histogram => "h",
            MetricType::Set => "s",
            MetricType::Timer => "ms",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Numeric value of a metric event.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MetricValue {
    Int(i64),
    UInt(u64),
    Float(f64),
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Int(v) => write!(f, "{}", v),
            MetricValue::UInt(v) => write!(f, "{}", v),
            MetricValue::Float(v) => write_float(f, *v),
        }
    }
}

/// Integers saturate; unsigned values above `i64::MAX` become `i64::MIN`.
impl Neg for MetricValue {
    type Output = MetricValue;

    fn neg(self) -> Self::Output {
        match self {
            MetricValue::Int(v) => MetricValue::Int(v.saturating_neg()),
            MetricValue::UInt(v) => MetricValue::Int(i64::try_from(v).map_or(i64::MIN, |v| -v)),
            MetricValue::Float(v) => MetricValue::Float(-v),
        }
    }
}

macro_rules! metric_value_from {
    ($variant:ident, $target:ty, $($t:ty),+) => {
        $(
            impl From<$t> for MetricValue {
                fn from(v: $t) -> Self {
                    MetricValue::$variant(<$target>::from(v))
                }
            }
        )+
    };
}

metric_value_from!(Int, i64, i8, i16, i32, i64);
metric_value_from!(UInt, u64, u8, u16, u32, u64);
metric_value_from!(Float, f64, f32, f64);

/// Durations are reported in milliseconds.
impl From<Duration> for MetricValue {
    fn from(v: Duration) -> Self {
        MetricValue::Float(v.as_secs_f64() * 1000.0)
    }
}

/// Rendering of the dimension set after the `|#` marker.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DimensionFormat {
    /// `env:test,shard:3`
    #[default]
    Plain,
    /// `{'env': 'test', 'shard': 3}`, as emitted by the Python monasca-statsd client and
    /// understood by agents that parse its mapping literal.
    Mapping,
}

/// Floats always carry a decimal point so the receiver can tell them from integers.
pub(crate) fn write_float<W: Write + ?Sized>(w: &mut W, v: f64) -> fmt::Result {
    if v.is_finite() && v.fract() == 0.0 {
        write!(w, "{:.1}", v)
    } else {
        write!(w, "{}", v)
    }
}

fn write_mapping_value<W: Write>(w: &mut W, v: &DimensionValue) -> fmt::Result {
    match v {
        DimensionValue::Str(s) => write!(w, "'{}'", s),
        DimensionValue::Bool(true) => w.write_str("True"),
        DimensionValue::Bool(false) => w.write_str("False"),
        other => write!(w, "{}", other),
    }
}

fn write_dimensions<W: Write>(
    w: &mut W,
    dimensions: &Dimensions,
    format: DimensionFormat,
) -> fmt::Result {
    match format {
        DimensionFormat::Plain => {
            for (i, (k, v)) in dimensions.iter().enumerate() {
                if i > 0 {
                    w.write_char(',')?;
                }

                write!(w, "{}:{}", k, v)?;
            }
        }

        DimensionFormat::Mapping => {
            w.write_char('{')?;
            for (i, (k, v)) in dimensions.iter().enumerate() {
                if i > 0 {
                    w.write_str(", ")?;
                }

                write!(w, "'{}': ", k)?;
                write_mapping_value(w, v)?;
            }

            w.write_char('}')?;
        }
    }

    Ok(())
}

/// Encodes one metric event into its wire payload.
///
/// The sample rate is only written when it is below 1, and the dimension section only
/// when `dimensions` is non-empty.
pub fn encode(
    name: &str,
    metric_type: MetricType,
    value: MetricValue,
    dimensions: &Dimensions,
    sample_rate: f64,
    format: DimensionFormat,
) -> String {
    let mut payload = String::with_capacity(name.len() + 32);

    // writing into a String cannot fail
    let _ = write!(payload, "{}:{}|{}", name, value, metric_type);

    if sample_rate < 1.0 {
        payload.push_str("|@");
        let _ = write!(payload, "{}", sample_rate);
    }

    if !dimensions.is_empty() {
        payload.push_str("|#");
        let _ = write_dimensions(&mut payload, dimensions, format);
    }

    payload
}
