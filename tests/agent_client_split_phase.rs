use std::sync::Arc;

use anyhow::Context as _;
use axum::{Router, http::StatusCode};
use cni_agent::{
    client::AgentClient,
    domain::{Container, InterfaceResult, NetConf},
    http::build_router,
    state::AgentStore,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};

struct ServerHandle {
    base_url: String,
    shutdown_tx: Option<oneshot::Sender<()>>,
    join: JoinHandle<anyhow::Result<()>>,
}

impl ServerHandle {
    async fn shutdown(mut self) -> anyhow::Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.join
            .await
            .context("join server task")?
            .context("server exited with error")?;
        Ok(())
    }
}

async fn spawn_agent() -> anyhow::Result<ServerHandle> {
    spawn_server(build_router(Arc::new(AgentStore::new()))).await
}

async fn spawn_server(router: Router) -> anyhow::Result<ServerHandle> {
    let listener = TcpListener::bind(("127.0.0.1", 0))
        .await
        .context("bind agent listener")?;
    let addr = listener.local_addr().context("agent local_addr")?;
    let base_url = format!("http://{addr}");

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let join = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
            .map_err(|e| anyhow::anyhow!("axum serve: {e}"))?;
        Ok(())
    });

    Ok(ServerHandle {
        base_url,
        shutdown_tx: Some(shutdown_tx),
        join,
    })
}

fn interfaces_for(sandbox: &str) -> anyhow::Result<Vec<InterfaceResult>> {
    serde_json::from_value(json!([
        {
            "cniVersion": "0.3.1",
            "interfaces": [
                {"name": "veth0a1b", "mac": "0a:58:0a:0a:00:05"},
                {"name": "eth0", "mac": "0a:58:0a:0a:00:06", "sandbox": sandbox}
            ],
            "ips": [{"interface": 1, "address": "10.10.0.5/16", "gateway": "10.10.0.1"}],
            "routes": [{"dst": "0.0.0.0/0"}]
        }
    ]))
    .context("build interface results")
}

#[tokio::test]
async fn split_phase_add_then_del() -> anyhow::Result<()> {
    let server = spawn_agent().await?;
    let client = AgentClient::new(&server.base_url)?;

    // ADD, first half: the network and the container are registered.
    let netconf: NetConf = serde_json::from_value(json!({
        "cniVersion": "0.3.1",
        "name": "nuage-net",
        "type": "nuage-cni",
        "ipam": {"type": "host-local"}
    }))?;
    client.create_network(&netconf).await?;
    let err = client.create_network(&netconf).await.unwrap_err();
    assert!(err.is_conflict(), "unexpected error: {err}");

    let container: Container = serde_json::from_value(json!({
        "name": "podA_default",
        "uuid": "0b7c2fd4-5a51-4a43-8c40-6f7f0d6c5d7e"
    }))?;
    client.put_container("podA_default", &container).await?;
    client.put_container("podA_default", &container).await?;

    // ADD, second half: a separate process picks the state back up.
    let client = AgentClient::new(&server.base_url)?;
    assert_eq!(client.get_network("nuage-net").await?, netconf);
    assert_eq!(client.get_container("podA_default").await?, container);

    let results = interfaces_for("podA_default")?;
    client.create_interfaces(&results).await?;
    assert_eq!(client.get_interfaces("podA_default").await?, results);
    let err = client.create_interfaces(&results).await.unwrap_err();
    assert!(err.is_conflict(), "unexpected error: {err}");

    let health = client.health().await?;
    assert_eq!(
        (health.networkconfigs, health.containers, health.interfaces),
        (1, 1, 1)
    );

    // DEL.
    client.delete_interfaces("podA_default").await?;
    client.delete_container("podA_default").await?;
    client.delete_network("nuage-net").await?;

    let err = client.get_container("podA_default").await.unwrap_err();
    assert!(err.is_not_found(), "unexpected error: {err}");
    let err = client.delete_interfaces("podA_default").await.unwrap_err();
    assert!(err.is_not_found(), "unexpected error: {err}");

    assert!(client.list_networks().await?.is_empty());
    assert!(client.list_containers().await?.is_empty());
    assert!(client.list_interfaces().await?.is_empty());

    server.shutdown().await
}

#[tokio::test]
async fn put_interfaces_recovers_state_by_name() -> anyhow::Result<()> {
    let server = spawn_agent().await?;
    let client = AgentClient::new(&server.base_url)?;

    let err = client
        .create_interfaces(&interfaces_for("")?)
        .await
        .unwrap_err();
    match &err {
        cni_agent::client::ClientError::Api { code, .. } => {
            assert_eq!(code, "container_interfaces_cannot_create")
        }
        other => panic!("unexpected error: {other}"),
    }

    // No owner in the payload: the path name is authoritative.
    client
        .put_interfaces("podB_default", &interfaces_for("")?)
        .await?;
    let replacement = interfaces_for("podB_default")?;
    client.put_interfaces("podB_default", &replacement).await?;

    assert_eq!(client.list_interfaces().await?, vec![replacement]);

    server.shutdown().await
}

#[tokio::test]
async fn concurrent_container_puts_are_all_kept() -> anyhow::Result<()> {
    let server = spawn_agent().await?;
    let client = AgentClient::new(&server.base_url)?;

    let mut tasks = Vec::new();
    for i in 0..16 {
        let client = client.clone();
        tasks.push(tokio::spawn(async move {
            let name = format!("pod{i}_default");
            let container: Container = serde_json::from_value(json!({"name": name}))?;
            client.put_container(&name, &container).await?;
            anyhow::Ok(())
        }));
    }
    for task in tasks {
        task.await.context("join put task")??;
    }

    let mut names: Vec<String> = client
        .list_containers()
        .await?
        .into_iter()
        .map(|c| c.name)
        .collect();
    names.sort();
    let mut expected: Vec<String> = (0..16).map(|i| format!("pod{i}_default")).collect();
    expected.sort();
    assert_eq!(names, expected);

    server.shutdown().await
}

#[tokio::test]
async fn plugin_specific_fields_survive_the_handoff() -> anyhow::Result<()> {
    let server = spawn_agent().await?;
    let client = AgentClient::new(&server.base_url)?;

    let raw_netconf = json!({
        "cniVersion": "0.3.1",
        "name": "nuage-net",
        "type": "nuage-cni",
        "dns": {"nameservers": ["1.1.1.1"], "vendorOpt": true},
        "vsd": {"enterprise": "acme", "domain": "k8s"}
    });
    let netconf: NetConf = serde_json::from_value(raw_netconf.clone())?;
    client.create_network(&netconf).await?;

    let raw_results = json!([
        {
            "cniVersion": "0.3.1",
            "interfaces": [
                {"name": "eth0", "mtu": 1450, "sandbox": "podC_default"},
                {"mac": "0a:58:0a:0a:00:07"}
            ],
            "ips": [{"version": "4", "address": "10.10.0.7/16", "policyGroup": "pg-1"}],
            "routes": []
        }
    ]);
    let results: Vec<InterfaceResult> = serde_json::from_value(raw_results.clone())?;
    client.create_interfaces(&results).await?;

    // A fresh client stands in for the DEL phase process.
    let client = AgentClient::new(&server.base_url)?;
    assert_eq!(
        serde_json::to_value(client.get_network("nuage-net").await?)?,
        raw_netconf
    );
    assert_eq!(
        serde_json::to_value(client.get_interfaces("podC_default").await?)?,
        raw_results
    );

    server.shutdown().await
}

#[tokio::test]
async fn names_with_reserved_characters_address_one_entry() -> anyhow::Result<()> {
    let server = spawn_agent().await?;
    let client = AgentClient::new(&server.base_url)?;

    let name = "runc/9f8e#7d?6c";
    let container: Container = serde_json::from_value(json!({"name": name}))?;
    client.put_container(name, &container).await?;

    assert_eq!(client.get_container(name).await?, container);
    let err = client.get_container("runc").await.unwrap_err();
    assert!(err.is_not_found(), "unexpected error: {err}");

    client.delete_container(name).await?;
    assert!(client.list_containers().await?.is_empty());

    server.shutdown().await
}

#[tokio::test]
async fn non_json_error_body_is_kept_as_message() -> anyhow::Result<()> {
    let router =
        Router::new().fallback(|| async { (StatusCode::BAD_GATEWAY, "upstream agent unavailable") });
    let server = spawn_server(router).await?;
    let client = AgentClient::new(&server.base_url)?;

    match client.list_containers().await.unwrap_err() {
        cni_agent::client::ClientError::Api {
            status,
            code,
            message,
        } => {
            assert_eq!(status, StatusCode::BAD_GATEWAY);
            assert_eq!(code, "unknown");
            assert_eq!(message, "upstream agent unavailable");
        }
        other => panic!("unexpected error: {other}"),
    }

    server.shutdown().await
}
