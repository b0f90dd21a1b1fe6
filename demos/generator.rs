//! Emits a fixed mix of metrics against a statsd agent, for exercising the agent's
//! dimension handling.
//!
//! Reads the `[main]` table (`iterations`, `delay`, `host`, `port`) from the TOML file
//! named by the first argument, or `generator.toml` in the working directory.

use log::*;
use rand::Rng;
use serde::Deserialize;
use std::{
    env,
    error::Error,
    fs,
};

use tokio::{
    net::UdpSocket,
    spawn,
    task::block_in_place,
    time::{
        sleep,
        Duration,
    },
};

use monasca_statsd::*;

const DEFAULT_CONFIG: &str = "generator.toml";

#[derive(Debug, Deserialize)]
struct ConfigFile {
    main: Config,
}

#[derive(Debug, Deserialize)]
struct Config {
    iterations: u32,
    /// Seconds between rounds.
    delay: u64,
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn read_config(path: &str) -> Result<Config, Box<dyn Error + Send + Sync + 'static>> {
    let content = fs::read_to_string(path)?;
    let file: ConfigFile = toml::from_str(&content)?;

    Ok(file.main)
}

async fn send_messages<S: cadence::MetricSink>(client: &Client<S>, config: &Config) {
    for index in 1..=config.iterations {
        info!("starting iteration {} of {}", index, config.iterations);

        client.counter("teraflops", None).increment(5);

        let (gauge_value, hist_value, set_value) = {
            let mut rng = rand::rng();
            (
                rng.random_range(1.0..10.0),
                rng.random_range(1..100),
                rng.random_range(1..100),
            )
        };

        client.gauge("", None).send_with(
            "num_of_teraflops",
            gauge_value,
            Some(&dimensions! { "origin" => "dev", "environment" => "test" }),
            1.0,
        );

        client.histogram("hist", None).send_with(
            "file.upload.size",
            hist_value,
            Some(&dimensions! { "version" => "1.0" }),
            1.0,
        );

        client.set("hist", None).send_with(
            "load_time",
            set_value,
            Some(&dimensions! { "page_name" => "mypage.html" }),
            1.0,
        );

        let timer = client.timer("timer", None);
        timer.time_with(
            "config_db_time",
            Some(&dimensions! { "db_name" => "mydb" }),
            1.0,
            || block_in_place(|| std::thread::sleep(Duration::from_millis(200))),
        );

        timer
            .time_async("time_block", sleep(Duration::from_millis(300)))
            .await;

        info!(
            "completed iteration {}, sleeping for {}s",
            index, config.delay
        );

        sleep(Duration::from_secs(config.delay)).await;
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync + 'static>> {
    pretty_env_logger::init();

    let path = env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    let config = read_config(&path)?;

    info!("config: {:?}", config);

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    let mut builder = Builder::new();
    builder.host(config.host.as_str()).port(config.port);

    let (transport, process) = builder.build_async(socket)?;
    let processing_job = spawn(process);

    {
        let client = Client::from_transport(transport).with_name("statsd-generator");
        send_messages(&client, &config).await;
    }

    processing_job.await?;

    Ok(())
}
