// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Gateway entry point: loads configuration, wires a UDP transport to
//! the core dispatcher, and runs until terminated. The UDP transport
//! here is one concrete [`sngw::transport::Transport`] implementation
//! among the several the core names but does not design (§6); BLE or
//! loopback deployments supply their own.

use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use log::{error, info, warn};
use sngw::commands::{DispatcherToTransportCmd, SchedulerToDispatcherCmd, TransportToDispatcherCmd};
use sngw::config::Config;
use sngw::constants::{CHANNEL_CAPACITY, DEFAULT_CONFIG, SCHEDULER_TICK};
use sngw::dispatcher::Dispatcher;
use sngw::error::Error;
use sngw::metrics::Metrics;
use sngw::runtime::Runtime;
use sngw::scheduler::Scheduler;
use sngw::types::NetworkAddress;
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(name = "sngw", version, about = "MQTT-SN gateway runtime")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG)]
    config: String,

    /// UDP address to listen on.
    #[arg(short, long, default_value = "0.0.0.0:1883")]
    bind: String,

    /// Parse the config file and exit instead of running.
    #[arg(short, long)]
    test: bool,
}

struct UdpReader {
    socket: UdpSocket,
    stopped: Arc<AtomicBool>,
}

impl UdpReader {
    /// Block until the next datagram arrives, or return `None` once
    /// `stopped` has been raised. Read timeouts are transparent retries,
    /// not shutdown signals.
    fn receive(&self) -> Result<Option<(NetworkAddress, Vec<u8>)>, Error> {
        let mut buf = [0u8; 1500];
        loop {
            if self.stopped.load(Ordering::Relaxed) {
                return Ok(None);
            }
            match self.socket.recv_from(&mut buf) {
                Ok((len, peer)) => return Ok(Some((NetworkAddress::new(peer.to_string()), buf[..len].to_vec()))),
                Err(ref err) if matches!(err.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) => {}
                Err(err) => return Err(err.into()),
            }
        }
    }
}

fn load_config(path: &str) -> Result<Config, Error> {
    let contents = std::fs::read_to_string(path)?;
    Config::load(&contents)
}

fn main() -> Result<(), Error> {
    let cli = Cli::parse();

    if cli.test {
        let config = load_config(&cli.config)?;
        println!("configuration file {} is valid (max_sessions={})", cli.config, config.max_sessions);
        return Ok(());
    }

    let config = load_config(&cli.config)?;
    sngw::log::init_log(&config.log)?;
    info!("starting sngw gateway, bind={}", cli.bind);

    let tokio_runtime = tokio::runtime::Runtime::new()?;
    tokio_runtime.block_on(run(config, &cli.bind))
}

async fn run(config: Config, bind: &str) -> Result<(), Error> {
    let socket = UdpSocket::bind(bind)?;
    socket.set_read_timeout(Some(Duration::from_millis(200)))?;
    let writer_socket = socket.try_clone()?;
    let stopped = Arc::new(AtomicBool::new(false));
    let reader = UdpReader { socket, stopped: Arc::clone(&stopped) };

    let (transport_tx, transport_rx) = mpsc::channel::<TransportToDispatcherCmd>(CHANNEL_CAPACITY);
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<DispatcherToTransportCmd>(CHANNEL_CAPACITY);
    let (scheduler_tx, scheduler_rx) = mpsc::channel::<SchedulerToDispatcherCmd>(1);

    let reader_task = tokio::task::spawn_blocking(move || loop {
        match reader.receive() {
            Ok(Some((from, bytes))) => {
                if transport_tx.blocking_send(TransportToDispatcherCmd::Datagram(from, bytes)).is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(err) => {
                error!("transport read error: {err}");
                break;
            }
        }
    });

    let writer_task = tokio::task::spawn_blocking(move || {
        while let Some(cmd) = outbound_rx.blocking_recv() {
            let result = match cmd {
                DispatcherToTransportCmd::Send(to, bytes) => writer_socket.send_to(&bytes, to.as_str()),
                DispatcherToTransportCmd::Broadcast(_) => {
                    warn!("broadcast requested but this transport has no broadcast domain");
                    continue;
                }
            };
            if let Err(err) = result {
                warn!("transport send error: {err}");
            }
        }
    });

    let scheduler_ticker = tokio::spawn(async move {
        let mut interval = tokio::time::interval(SCHEDULER_TICK);
        loop {
            interval.tick().await;
            if scheduler_tx.send(SchedulerToDispatcherCmd::Tick).await.is_err() {
                break;
            }
        }
    });

    let runtime = Runtime::new(
        config.session_limits(),
        config.subscription_limits(),
        config.retry_policy(),
        config.predefined_alias_entries(),
    );
    let metrics = Arc::new(Metrics::new());
    let scheduler = Scheduler::new(config.max_retries);
    let dispatcher = Dispatcher::new(runtime, config.protocol_version.into(), config.integrity_enabled, metrics);

    dispatcher.run(transport_rx, scheduler_rx, outbound_tx, scheduler).await;

    stopped.store(true, Ordering::Relaxed);
    scheduler_ticker.abort();
    let _ = reader_task.await;
    let _ = writer_task.await;
    Ok(())
}
