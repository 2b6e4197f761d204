//! Engine controller (spec §4.7) — the top-level orchestrator. Owns the diverter (worker pool +
//! UDP blocker) and the out-of-core collaborators (certificate authority, acceptors), and wires
//! them together in the order spec §4.7 mandates.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::ca::CertificateAuthority;
use crate::callbacks::Acceptor;
use crate::capture::{filter, CaptureDriver};
use crate::config::EngineOptions;
use crate::error::DivertError;
use crate::firewall::FirewallAuthority;
use crate::flowkey::FlowTables;
use crate::ports::ListenerPorts;
use crate::resolver::ProcessResolver;
use crate::sinks::MessageSinks;
use crate::udp_blocker::{UdpBlocker, UDP_DROP_FILTER};
use crate::worker::WorkerPool;

/// Builds the two listener acceptors for the requested (possibly ephemeral, port 0) ports.
/// Out-of-core in the real system; this trait is the seam a caller plugs a real listener into.
pub trait AcceptorFactory: Send + Sync {
    fn bind(&self, http_port: u16, https_port: u16) -> anyhow::Result<(Box<dyn Acceptor>, Box<dyn Acceptor>)>;
}

struct RunningAcceptors {
    http: Box<dyn Acceptor>,
    https: Box<dyn Acceptor>,
}

/// Owns everything `start`/`stop` need to bring the engine up and down in the spec's mandated
/// order: CA trust -> acceptors -> diverter configured -> diverter started; reversed on stop.
pub struct EngineController<D: CaptureDriver + 'static, R: ProcessResolver + 'static> {
    driver: Arc<D>,
    resolver: Arc<R>,
    firewall: FirewallAuthority,
    sinks: MessageSinks,
    ca: Arc<dyn CertificateAuthority>,
    acceptor_factory: Arc<dyn AcceptorFactory>,
    options: Mutex<EngineOptions>,
    tables: Arc<FlowTables>,
    listener_ports: Arc<ListenerPorts>,
    tcp_pool: WorkerPool<D>,
    udp_blocker: Mutex<UdpBlocker<D>>,
    acceptors: Mutex<Option<RunningAcceptors>>,
    running: AtomicBool,
}

impl<D: CaptureDriver + 'static, R: ProcessResolver + 'static> EngineController<D, R> {
    pub fn new(
        driver: Arc<D>,
        resolver: Arc<R>,
        firewall: FirewallAuthority,
        sinks: MessageSinks,
        ca: Arc<dyn CertificateAuthority>,
        acceptor_factory: Arc<dyn AcceptorFactory>,
        options: EngineOptions,
    ) -> Self {
        Self {
            tcp_pool: WorkerPool::new(Arc::clone(&driver)),
            driver,
            resolver,
            firewall,
            sinks,
            ca,
            acceptor_factory,
            listener_ports: Arc::new(ListenerPorts::new(options.http_listener_port, options.https_listener_port)),
            options: Mutex::new(options),
            tables: Arc::new(FlowTables::new()),
            udp_blocker: Mutex::new(UdpBlocker::new()),
            acceptors: Mutex::new(None),
            running: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn get_http_port(&self) -> u16 {
        self.listener_ports.http().to_host()
    }

    pub fn get_https_port(&self) -> u16 {
        self.listener_ports.https().to_host()
    }

    pub fn get_root_ca_pem(&self) -> String {
        self.ca.root_ca_pem()
    }

    /// Port setters are accepted only while stopped (spec §6).
    pub fn set_http_port(&self, port: u16) -> Result<(), DivertError> {
        if self.is_running() {
            return Err(DivertError::InvalidState("cannot change ports while running".into()));
        }
        self.options.lock().unwrap().http_listener_port = port;
        Ok(())
    }

    pub fn set_https_port(&self, port: u16) -> Result<(), DivertError> {
        if self.is_running() {
            return Err(DivertError::InvalidState("cannot change ports while running".into()));
        }
        self.options.lock().unwrap().https_listener_port = port;
        Ok(())
    }

    /// Start order (spec §4.7): CA trust established -> acceptors created and listening ->
    /// diverter configured with acceptor ports -> diverter started.
    pub fn start(&self) -> Result<(), DivertError> {
        if self.is_running() {
            return Err(DivertError::InvalidState("engine already running".into()));
        }

        self.ca
            .install_trust()
            .map_err(DivertError::CertificateAuthority)?;

        let options = self.options.lock().unwrap().clone();
        let (http, https) = self
            .acceptor_factory
            .bind(options.http_listener_port, options.https_listener_port)
            .map_err(DivertError::from)?;

        self.listener_ports.set_http(http.bound_port());
        self.listener_ports.set_https(https.bound_port());
        *self.acceptors.lock().unwrap() = Some(RunningAcceptors { http, https });

        // check_filter is exercised before any capture handle is opened, so a malformed filter
        // is reported as a fatal init error rather than surfacing as an open() failure.
        if let Err(e) = self.driver.check_filter(filter::TCP_REWRITE) {
            *self.acceptors.lock().unwrap() = None;
            return Err(e);
        }
        if let Err(e) = self.driver.check_filter(UDP_DROP_FILTER) {
            *self.acceptors.lock().unwrap() = None;
            return Err(e);
        }

        if let Err(e) = self.tcp_pool.start(
            filter::TCP_REWRITE,
            Arc::clone(&self.tables),
            Arc::clone(&self.listener_ports),
            Arc::clone(&self.resolver),
            self.firewall.clone(),
            self.sinks.clone(),
            options.effective_queue_len(),
            options.effective_queue_time_ms(),
        ) {
            *self.acceptors.lock().unwrap() = None;
            return Err(e);
        }

        if let Err(e) = self.udp_blocker.lock().unwrap().open(self.driver.as_ref()) {
            let _ = self.tcp_pool.stop();
            *self.acceptors.lock().unwrap() = None;
            return Err(e);
        }

        self.running.store(true, Ordering::Relaxed);
        self.sinks.info("engine started");
        Ok(())
    }

    /// Stop order reverses start: diverter stopped -> acceptors dropped.
    pub fn stop(&self) -> Result<(), DivertError> {
        if !self.is_running() {
            return Err(DivertError::InvalidState("engine already stopped".into()));
        }

        self.udp_blocker.lock().unwrap().close(self.driver.as_ref());
        self.tcp_pool.stop()?;
        *self.acceptors.lock().unwrap() = None;

        self.running.store(false, Ordering::Relaxed);
        self.sinks.info("engine stopped");
        Ok(())
    }
}
