// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::services::timenode::stats::{InMemoryStats, TimeNodeStats};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub async fn spawn_metrics_server(
    port: u16,
    stats: Arc<InMemoryStats>,
    shutdown: CancellationToken,
) -> Option<SocketAddr> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::warn!(target: "metrics", error = %e, "Metrics server failed to bind");
            return None;
        }
    };

    let local = listener.local_addr().ok();
    if let Some(addr) = local {
        tracing::info!(target: "metrics", %addr, "Metrics server listening");
    }

    tokio::spawn(async move {
        loop {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };
            match accepted {
                Ok((mut socket, _)) => {
                    let body = render_metrics(&stats);
                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                }
                Err(e) => {
                    tracing::warn!(target: "metrics", error = %e, "Metrics accept error");
                    continue;
                }
            }
        }
    });

    local
}

fn counter(body: &mut String, name: &str, value: u64) {
    body.push_str(&format!("# TYPE {name} counter\n{name} {value}\n"));
}

pub fn render_metrics(stats: &InMemoryStats) -> String {
    let c: &TimeNodeStats = stats.counters();
    let mut body = String::new();
    counter(&mut body, "timenode_discovered", c.discovered.load(Ordering::Relaxed));
    counter(&mut body, "timenode_claims_succeeded", c.claims_succeeded.load(Ordering::Relaxed));
    counter(&mut body, "timenode_claims_failed", c.claims_failed.load(Ordering::Relaxed));
    counter(
        &mut body,
        "timenode_executions_succeeded",
        c.executions_succeeded.load(Ordering::Relaxed),
    );
    counter(
        &mut body,
        "timenode_executions_failed",
        c.executions_failed.load(Ordering::Relaxed),
    );
    counter(&mut body, "timenode_route_errors", c.route_errors.load(Ordering::Relaxed));
    counter(&mut body, "timenode_reconnects", c.reconnects.load(Ordering::Relaxed));
    body.push_str(&format!(
        "# TYPE timenode_active_buckets gauge\ntimenode_active_buckets {}\n",
        c.active_buckets.load(Ordering::Relaxed)
    ));

    let mut accounts = stats.accounts();
    accounts.sort();
    for account in accounts {
        let (bounty, cost) = stats.totals(account);
        body.push_str(&format!(
            "# TYPE timenode_bounty_wei gauge\ntimenode_bounty_wei{{account=\"{account:#x}\"}} {bounty}\n"
        ));
        body.push_str(&format!(
            "# TYPE timenode_cost_wei gauge\ntimenode_cost_wei{{account=\"{account:#x}\"}} {cost}\n"
        ));
    }

    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::timenode::stats::StatsSink;
    use alloy::primitives::{Address, U256};

    #[tokio::test]
    async fn metrics_endpoint_serves() {
        let counters = Arc::new(TimeNodeStats::default());
        let stats = Arc::new(InMemoryStats::new(counters.clone()));
        TimeNodeStats::bump(&counters.discovered);
        stats.executed(
            Address::repeat_byte(0xaa),
            Address::repeat_byte(0x01),
            U256::from(7u64),
            U256::from(1_000u64),
            true,
        );

        let shutdown = CancellationToken::new();
        let addr = spawn_metrics_server(0, stats.clone(), shutdown.clone())
            .await
            .expect("bind metrics");

        let body = reqwest::get(format!("http://127.0.0.1:{}", addr.port()))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        shutdown.cancel();

        assert!(body.contains("timenode_discovered 1\n"));
        assert!(body.contains(
            "timenode_bounty_wei{account=\"0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa\"} 1000"
        ));
        assert!(body.contains("timenode_cost_wei{account=\"0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa\"} 7"));
    }
}
