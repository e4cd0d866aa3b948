//
// Copyright (c) The Topolink Contributors
//
// SPDX-License-Identifier: MIT
//

//! Two independent tickers (§4.6): one exports the graph to disk whenever
//! it has changed, the other expires stale nodes. The exporter always
//! writes the DOT rendering; `/graph.json` and `/graph.nwdiag` are served
//! live from `topolink-http` instead.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use topolink_graph::{Graph, Metrics};
use tracing::{error, info, warn};

use crate::serialize::{self, Snapshot};

#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    pub export_interval: Duration,
    pub expiration_interval: Duration,
    pub node_timeout: Duration,
    pub output_path: PathBuf,
    pub show_segments: bool,
}

/// Runs both the export and expiration tickers forever. Intended to be
/// wrapped in `topolink_utils::task::Task::spawn_supervised`.
pub async fn run(graph: Arc<Graph>, metrics: Arc<Metrics>, config: SchedulerConfig) {
    let mut export_tick = tokio::time::interval(config.export_interval);
    export_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut expire_tick = tokio::time::interval(config.expiration_interval);
    expire_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = export_tick.tick() => {
                export_if_changed(&graph, &metrics, &config).await;
            }
            _ = expire_tick.tick() => {
                let removed = graph.remove_expired(config.node_timeout);
                if removed > 0 {
                    info!(removed, "expired stale nodes");
                }
            }
        }
    }
}

async fn export_if_changed(graph: &Graph, metrics: &Metrics, config: &SchedulerConfig) {
    if !graph.has_changes() {
        return;
    }

    let nodes = graph.get_nodes();
    let edges = graph.get_edges();
    let segments = config.show_segments.then(|| graph.get_network_segments());
    let snapshot = Snapshot::new(nodes, edges, segments);
    let bytes = serialize::to_dot(&snapshot);

    match write_atomically(&config.output_path, &bytes).await {
        Ok(()) => {
            graph.clear_changes();
        }
        Err(error) => {
            // Failure to write leaves the change bit set, so the next
            // tick retries (§4.6: "does not clear changes").
            metrics.record_write_failure();
            warn!(path = %config.output_path.display(), error = %error, "failed to write graph export");
        }
    }
}

/// Writes `bytes` to `path` by first writing a sibling `.tmp` file and
/// then renaming it into place, so readers never observe a partial file.
async fn write_atomically(path: &std::path::Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp_path = sibling_tmp_path(path);
    let path = path.to_path_buf();
    let bytes = bytes.to_vec();

    tokio::task::spawn_blocking(move || {
        std::fs::write(&tmp_path, &bytes)?;
        std::fs::rename(&tmp_path, &path)
    })
    .await
    .unwrap_or_else(|e| {
        error!(error = %e, "export writer task panicked");
        Ok(())
    })
}

fn sibling_tmp_path(path: &std::path::Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use topolink_graph::{Graph, InterfaceDetails, Metrics};

    fn config(output_path: PathBuf) -> SchedulerConfig {
        SchedulerConfig {
            export_interval: Duration::from_secs(60),
            expiration_interval: Duration::from_secs(30),
            node_timeout: Duration::from_secs(90),
            output_path,
            show_segments: false,
        }
    }

    #[tokio::test]
    async fn export_writes_file_and_clears_change_bit() {
        let graph = Arc::new(Graph::new());
        let mut interfaces = BTreeMap::new();
        interfaces.insert("e0".to_string(), InterfaceDetails::default());
        graph.set_local_node("local", "host-a", interfaces);
        assert!(graph.has_changes());

        let dir = std::env::temp_dir().join(format!("topolink-export-test-{:p}", &graph));
        let config = config(dir.clone());
        let metrics = Metrics::new();

        export_if_changed(&graph, &metrics, &config).await;
        assert!(!graph.has_changes());
        let contents = std::fs::read_to_string(&dir).unwrap();
        assert!(contents.contains("host-a"));
        let _ = std::fs::remove_file(&dir);
    }

    #[tokio::test]
    async fn export_is_skipped_when_graph_is_unchanged() {
        let graph = Arc::new(Graph::new());
        let dir =
            std::env::temp_dir().join(format!("topolink-export-test-unchanged-{:p}", &graph));
        let config = config(dir.clone());
        let metrics = Metrics::new();

        export_if_changed(&graph, &metrics, &config).await;
        assert!(!dir.exists());
    }
}
