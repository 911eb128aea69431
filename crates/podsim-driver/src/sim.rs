use anyhow::{Context, bail};
use core::time::Duration;
use podsim::{
    AddrPool, ConcurrentSet, Dispatcher, DispatcherConfig, FuncError, Funcs, Renderer,
    SharedCache, TemplateValue,
};
use serde::Serialize;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use crate::config::DriverConfig;

const CONDITIONS: [&str; 3] = ["Initialized", "ContainersReady", "Ready"];

/// What the simulated pod looks like to the status template.
#[derive(Debug, Serialize)]
struct PodState<'a> {
    name: String,
    namespace: &'a str,
    phase: &'a str,
    #[serde(rename = "podIP")]
    pod_ip: IpAddr,
    #[serde(rename = "hostIP")]
    host_ip: IpAddr,
    message: String,
    conditions: &'a [&'a str],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Report {
    pub objects: usize,
    pub ready: usize,
    pub failed: usize,
    pub panicked: usize,
    pub distinct_ips: usize,
    pub allocated: usize,
    pub free: usize,
    pub elapsed: Duration,
}

/// State shared by every reconcile task.
struct Sim {
    pool: AddrPool,
    renderer: Renderer,
    funcs: Funcs,
    template: String,
    host_ip: IpAddr,
    work: Duration,
    churn: bool,
    patches: SharedCache<String, serde_json::Value>,
    ready: ConcurrentSet<String>,
    in_use: ConcurrentSet<IpAddr>,
    seen: ConcurrentSet<IpAddr>,
    failed: AtomicUsize,
}

impl Sim {
    fn new(config: &DriverConfig) -> Self {
        Self {
            pool: AddrPool::new(config.pod_range),
            renderer: Renderer::new(),
            funcs: Funcs::new().with("quote", quote),
            template: config.template.clone(),
            host_ip: config.host_ip,
            work: config.work,
            churn: config.churn,
            patches: SharedCache::new(),
            ready: ConcurrentSet::new(),
            in_use: ConcurrentSet::new(),
            seen: ConcurrentSet::new(),
            failed: AtomicUsize::new(0),
        }
    }

    /// Brings pod `index` to running: assigns an IP, renders its status
    /// patch and records it as ready.
    fn reconcile(&self, index: usize) -> anyhow::Result<()> {
        let name = format!("pod-{index}");
        let pod_ip = self.pool.acquire()?;
        if !self.in_use.put(pod_ip) {
            bail!("{pod_ip} handed out twice");
        }
        self.seen.put(pod_ip);

        if !self.work.is_zero() {
            std::thread::sleep(self.work);
        }

        let state = PodState {
            message: format!("{name} is running on {}", self.host_ip),
            name,
            namespace: "default",
            phase: "Running",
            pod_ip,
            host_ip: self.host_ip,
            conditions: &CONDITIONS,
        };
        let patch = self
            .renderer
            .render_value(&self.template, &state, &self.funcs)
            .with_context(|| format!("rendering status of {}", state.name))?;

        tracing::trace!(pod = %state.name, %pod_ip, "status patch rendered");
        self.patches.set(state.name.clone(), patch);
        self.ready.put(state.name);

        if self.churn {
            self.in_use.delete(&pod_ip);
            self.pool.release(pod_ip);
        }
        Ok(())
    }
}

/// Template function wrapping its argument in double quotes, so the value
/// survives YAML parsing as a string.
fn quote(args: &[TemplateValue]) -> Result<TemplateValue, FuncError> {
    let text = match args {
        [TemplateValue::String(text)] => text.clone(),
        [other] => other.to_string(),
        _ => return Err(FuncError::ExactlyXArgs("quote".to_owned(), 1)),
    };
    serde_json::to_string(&text)
        .map(TemplateValue::from)
        .map_err(|e| FuncError::Generic(e.to_string()))
}

/// Reconciles `config.objects` pods on an elastic dispatcher and reports the
/// outcome once all of them have finished.
pub fn run(config: &DriverConfig) -> anyhow::Result<Report> {
    let sim = Arc::new(Sim::new(config));
    let dispatcher = Dispatcher::with_config(DispatcherConfig {
        capacity: config.capacity,
        idle_timeout: config.idle_timeout,
    });

    let start = Instant::now();
    for index in 0..config.objects {
        let sim = Arc::clone(&sim);
        dispatcher.submit(move || {
            if let Err(e) = sim.reconcile(index) {
                sim.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(pod = index, "reconcile failed: {e:#}");
            }
        })?;
    }
    dispatcher.wait();
    let elapsed = start.elapsed();

    let mut unpatched = 0;
    sim.ready.for_each(|name| {
        if !sim.patches.contains(name) {
            unpatched += 1;
        }
    });
    if unpatched > 0 {
        bail!("{unpatched} ready pods have no status patch");
    }

    Ok(Report {
        objects: config.objects,
        ready: sim.ready.size(),
        failed: sim.failed.load(Ordering::Relaxed),
        panicked: dispatcher.panicked(),
        distinct_ips: sim.seen.size(),
        allocated: sim.pool.allocated_len(),
        free: sim.pool.free_len(),
        elapsed,
    })
}
