//! Worker pool & lifecycle (spec §4.6, §5) — one capture-reading thread per logical core,
//! sharing one TCP handle; start/stop serialized by a single mutex, matching the teacher's
//! `CaptureEngine` start/stop/`Drop` pattern generalized from one sniff thread to N rewrite
//! threads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::capture::{new_packet_buffer, CaptureDriver, Direction, Layer, OpenFlags, QueueParam};
use crate::classifier::{classify, ClassifyDecision};
use crate::error::DivertError;
use crate::firewall::FirewallAuthority;
use crate::flowkey::FlowTables;
use crate::ports::ListenerPorts;
use crate::resolver::{ProcessResolver, TcpTableCache};
use crate::rewriter::rewrite;
use crate::sinks::MessageSinks;

/// `Stopped -> Running -> Stopped`, no intermediate states exposed (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    Stopped,
    Running,
}

struct RunningPool<D: CaptureDriver> {
    handle: Arc<D::Handle>,
    running: Arc<AtomicBool>,
    threads: Vec<std::thread::JoinHandle<()>>,
}

/// Owns the TCP capture handle and its worker threads. `D` is the platform `CaptureDriver`;
/// shared state (`tables`, `listener_ports`) is handed to every worker via `Arc`.
pub struct WorkerPool<D: CaptureDriver> {
    driver: Arc<D>,
    lifecycle: Mutex<Option<RunningPool<D>>>,
}

impl<D: CaptureDriver + 'static> WorkerPool<D> {
    pub fn new(driver: Arc<D>) -> Self {
        Self { driver, lifecycle: Mutex::new(None) }
    }

    pub fn state(&self) -> PoolState {
        if self.lifecycle.lock().unwrap().is_some() {
            PoolState::Running
        } else {
            PoolState::Stopped
        }
    }

    /// Opens the TCP rewrite handle, sets queue parameters, and spawns one worker per logical
    /// core (spec §4.6 `start` steps 1-4). Fails atomically: any handle opened on a later
    /// failure path in the same call is closed before returning.
    #[allow(clippy::too_many_arguments)]
    pub fn start<R>(
        &self,
        filter: &str,
        tables: Arc<FlowTables>,
        listener_ports: Arc<ListenerPorts>,
        resolver: Arc<R>,
        firewall: FirewallAuthority,
        sinks: MessageSinks,
        queue_len: u64,
        queue_time_ms: u64,
    ) -> Result<(), DivertError>
    where
        R: ProcessResolver + 'static,
    {
        let mut lifecycle = self.lifecycle.lock().unwrap();
        if lifecycle.is_some() {
            return Err(DivertError::InvalidState("worker pool already running".into()));
        }

        let handle = self.driver.open(filter, Layer::Network, i16::MIN, OpenFlags::normal())?;
        if let Err(e) = self.driver.set_param(&handle, QueueParam::Length, queue_len) {
            self.driver.close(handle);
            return Err(DivertError::from(e));
        }
        if let Err(e) = self.driver.set_param(&handle, QueueParam::Time, queue_time_ms) {
            self.driver.close(handle);
            return Err(DivertError::from(e));
        }

        let running = Arc::new(AtomicBool::new(true));
        let worker_count = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);

        let handle = Arc::new(handle);
        let mut threads = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            let driver = Arc::clone(&self.driver);
            let handle = Arc::clone(&handle);
            let running = Arc::clone(&running);
            let tables = Arc::clone(&tables);
            let listener_ports = Arc::clone(&listener_ports);
            let resolver = Arc::clone(&resolver);
            let firewall = firewall.clone();
            let sinks = sinks.clone();
            let join = std::thread::Builder::new()
                .name("flowdivert-worker".into())
                .spawn(move || {
                    run_worker(
                        driver.as_ref(),
                        handle.as_ref(),
                        &running,
                        &tables,
                        &listener_ports,
                        resolver.as_ref(),
                        &firewall,
                        &sinks,
                    );
                })
                .expect("failed to spawn diversion worker thread");
            threads.push(join);
        }

        sinks.info(&format!("worker pool started with {worker_count} threads"));
        *lifecycle = Some(RunningPool { handle, running, threads });
        Ok(())
    }

    /// Sets `running = false`, joins every worker, then closes the handle (spec §4.6 `stop`).
    pub fn stop(&self) -> Result<(), DivertError> {
        let mut lifecycle = self.lifecycle.lock().unwrap();
        let Some(pool) = lifecycle.take() else {
            return Err(DivertError::InvalidState("worker pool already stopped".into()));
        };
        pool.running.store(false, Ordering::Relaxed);
        for thread in pool.threads {
            let _ = thread.join();
        }
        // Every worker's `Arc<D::Handle>` clone was dropped when its thread exited above, so
        // exactly one strong reference (this pool's own) remains.
        match Arc::try_unwrap(pool.handle) {
            Ok(handle) => self.driver.close(handle),
            Err(_) => unreachable!("all worker threads were joined before this point"),
        }
        Ok(())
    }
}

#[allow(clippy::too_many_arguments)]
fn run_worker<D, R>(
    driver: &D,
    handle: &D::Handle,
    running: &AtomicBool,
    tables: &FlowTables,
    listener_ports: &ListenerPorts,
    resolver: &R,
    firewall: &FirewallAuthority,
    sinks: &MessageSinks,
) where
    D: CaptureDriver,
    R: ProcessResolver,
{
    let mut buf = new_packet_buffer();
    let mut table_cache = TcpTableCache::new(64);

    while running.load(Ordering::Relaxed) {
        let (len, mut meta) = match driver.recv(handle, &mut buf) {
            Ok(r) => r,
            Err(e) => {
                sinks.warn(&format!("capture recv failed: {e:#}"));
                std::thread::sleep(std::time::Duration::from_millis(100));
                continue;
            }
        };

        let packet = &mut buf[..len];
        match classify(packet, tables, listener_ports, resolver, firewall, &mut table_cache, sinks) {
            ClassifyDecision::PassThrough => {}
            ClassifyDecision::Drop => continue,
            ClassifyDecision::Rewrite(leg) => {
                rewrite(packet, leg, listener_ports);
                meta.direction = Direction::Inbound;
                if let Err(e) = driver.send(handle, packet, &meta) {
                    sinks.warn(&format!("capture send failed: {e:#}"));
                }
                continue;
            }
        }

        if let Err(e) = driver.send(handle, packet, &meta) {
            sinks.warn(&format!("capture send failed: {e:#}"));
        }
    }
}
