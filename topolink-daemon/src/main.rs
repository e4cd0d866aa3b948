//
// Copyright (c) The Topolink Contributors
//
// SPDX-License-Identifier: MIT
//

#![warn(rust_2018_idioms)]

mod config;
mod error;

use std::sync::Arc;
use std::time::Duration;

use clap::{App, Arg};
use config::{Config, EXPIRATION_INTERVAL};
use tokio::sync::mpsc;
use topolink_export::SchedulerConfig;
use topolink_graph::{Graph, Metrics};
use topolink_http::ServerConfig;
use topolink_net::{ReceiverConfig, SenderConfig};
use topolink_utils::task::Task;
use tracing::{error, info};

/// Platform-provided machine identity (glossary: "stable
/// platform-provided identity string"), falling back to the hostname
/// when `/etc/machine-id` is unavailable (e.g. in a container without
/// systemd).
fn local_machine_id() -> String {
    std::fs::read_to_string("/etc/machine-id")
        .map(|s| s.trim().to_owned())
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(local_hostname)
}

fn local_hostname() -> String {
    nix::unistd::gethostname()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "unknown-host".to_owned())
}

fn init_tracing(log_level: &config::LogLevel) {
    let env_filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(
            format!("topolink={}", log_level.as_str()).parse().unwrap(),
        )
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

/// A fatal error lifted from one of the long-running tasks via the
/// supervisor channel (§7: "the first such error triggers shutdown").
enum SupervisorEvent {
    ReceiverFailed(topolink_net::Error),
}

fn main() {
    let matches = App::new("Topolink discovery daemon")
        .version(clap::crate_version!())
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("file")
                .help("Specify a configuration file."),
        )
        .get_matches();

    let config = match Config::load(matches.value_of("config")) {
        Ok(config) => config,
        Err(error) => {
            error.log();
            eprintln!("{error}");
            std::process::exit(1);
        }
    };

    init_tracing(&config.log_level);

    let http_addr = match config.http_socket_addr() {
        Ok(addr) => addr,
        Err(error) => {
            error.log();
            eprintln!("{error}");
            std::process::exit(1);
        }
    };

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to create async runtime")
        .block_on(run(config, http_addr));
}

async fn run(config: Config, http_addr: std::net::SocketAddr) {
    let machine_id = local_machine_id();
    let hostname = local_hostname();
    info!(machine_id, hostname, "starting up");

    let graph = Arc::new(Graph::new());
    let metrics = Arc::new(Metrics::new());

    let (supervisor_tx, mut supervisor_rx) = mpsc::unbounded_channel::<SupervisorEvent>();

    let sender_config = SenderConfig {
        send_interval: config.send_interval,
        multicast_address: config.multicast_address,
        multicast_port: config.multicast_port,
        include_neighbors: config.include_neighbors,
        local_machine_id: machine_id.clone(),
        local_hostname: hostname.clone(),
    };
    let sender_task = Task::spawn_supervised({
        let graph = Arc::clone(&graph);
        let metrics = Arc::clone(&metrics);
        move || {
            topolink_net::run_sender(Arc::clone(&graph), Arc::clone(&metrics), sender_config.clone())
        }
    });

    let receiver_config = ReceiverConfig {
        multicast_address: config.multicast_address,
        multicast_port: config.multicast_port,
        include_neighbors: config.include_neighbors,
        local_machine_id: machine_id.clone(),
    };
    let receiver_task = Task::spawn({
        let graph = Arc::clone(&graph);
        let metrics = Arc::clone(&metrics);
        let supervisor_tx = supervisor_tx.clone();
        async move {
            if let Err(error) = topolink_net::run_receiver(graph, metrics, receiver_config).await {
                let _ = supervisor_tx.send(SupervisorEvent::ReceiverFailed(error));
            }
        }
    });

    let scheduler_config = SchedulerConfig {
        export_interval: config.export_interval,
        expiration_interval: EXPIRATION_INTERVAL,
        node_timeout: config.node_timeout,
        output_path: config.resolved_output_file(),
        show_segments: config.show_segments,
    };
    let scheduler_task = Task::spawn_supervised({
        let graph = Arc::clone(&graph);
        let metrics = Arc::clone(&metrics);
        move || {
            topolink_export::run_scheduler(
                Arc::clone(&graph),
                Arc::clone(&metrics),
                scheduler_config.clone(),
            )
        }
    });

    let server_config = ServerConfig {
        bind_addr: http_addr,
        show_segments: config.show_segments,
    };
    let http_task = Task::spawn_supervised({
        let graph = Arc::clone(&graph);
        let metrics = Arc::clone(&metrics);
        move || topolink_http::run(Arc::clone(&graph), Arc::clone(&metrics), server_config.clone())
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
        }
        Some(event) = supervisor_rx.recv() => {
            match event {
                SupervisorEvent::ReceiverFailed(error) => {
                    error.log();
                    error!("fatal error in receiver task, shutting down");
                }
            }
        }
    }

    drop(sender_task);
    drop(receiver_task);
    drop(scheduler_task);
    drop(http_task);

    // Brief drain window for in-flight work (§5: "waits briefly (~100ms)
    // for drain").
    tokio::time::sleep(Duration::from_millis(100)).await;
    info!("shut down");
}
