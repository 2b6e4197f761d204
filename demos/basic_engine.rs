//! Minimal wiring example: brings an `EngineController` up and down with the in-process test
//! doubles for every out-of-core collaborator (CA, acceptors). A real embedder substitutes its
//! own certificate authority and listener sockets for these.

use std::sync::Arc;

use flowdivert::ca::NullCertificateAuthority;
use flowdivert::callbacks::{Acceptor, FixedPortAcceptor};
use flowdivert::config::EngineOptions;
use flowdivert::engine::{AcceptorFactory, EngineController};
use flowdivert::firewall::FirewallAuthority;
use flowdivert::sinks::MessageSinks;

#[cfg(target_os = "windows")]
use flowdivert::capture::windivert_backend::WinDivertDriver;
#[cfg(target_os = "windows")]
use flowdivert::resolver::win_net_table::WinNetTableResolver;

#[cfg(not(target_os = "windows"))]
use flowdivert::capture::stub_backend::StubDriver;
#[cfg(not(target_os = "windows"))]
use flowdivert::resolver::StaticResolver;

struct LoopbackAcceptorFactory;

impl AcceptorFactory for LoopbackAcceptorFactory {
    fn bind(&self, http_port: u16, https_port: u16) -> anyhow::Result<(Box<dyn Acceptor>, Box<dyn Acceptor>)> {
        let http_port = if http_port == 0 { 18080 } else { http_port };
        let https_port = if https_port == 0 { 18443 } else { https_port };
        Ok((Box::new(FixedPortAcceptor(http_port)), Box::new(FixedPortAcceptor(https_port))))
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "flowdivert=info".into()),
        )
        .init();

    let firewall = FirewallAuthority::new(|binary_path| {
        tracing::info!(binary_path, "firewall check");
        true
    });

    #[cfg(target_os = "windows")]
    let engine = EngineController::new(
        Arc::new(WinDivertDriver),
        Arc::new(WinNetTableResolver),
        firewall,
        MessageSinks::new(),
        Arc::new(NullCertificateAuthority),
        Arc::new(LoopbackAcceptorFactory),
        EngineOptions::default(),
    );

    #[cfg(not(target_os = "windows"))]
    let engine = EngineController::new(
        Arc::new(StubDriver),
        Arc::new(StaticResolver::new()),
        firewall,
        MessageSinks::new(),
        Arc::new(NullCertificateAuthority),
        Arc::new(LoopbackAcceptorFactory),
        EngineOptions::default(),
    );

    match engine.start() {
        Ok(()) => {
            tracing::info!(
                http_port = engine.get_http_port(),
                https_port = engine.get_https_port(),
                "engine started"
            );
            let _ = engine.stop();
        }
        Err(e) => {
            tracing::error!("engine failed to start: {e:#}");
        }
    }
}
