//! Top-level orchestration: wires the config, validator, registry, per-service starters, the
//! control-socket accept loop, and the shutdown coordinator together.

use std::os::unix::net::{UnixListener, UnixStream};
use std::thread;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::config::Config;
use crate::dependency::{self, WaitOutcome};
use crate::error::ProcessManagerError;
use crate::ipc::{self, ControlResponse};
use crate::registry::{CancelHandle, Registry, StartedMarkers};
use crate::runner::{self, RunOutcome};
use crate::shutdown::Coordinator;
use crate::validate;

/// The running supervisor: a validated config plus the machinery to run it to completion.
pub struct Supervisor {
    config: Config,
}

impl Supervisor {
    /// Validate `config` (C2) and wrap it for running. Fails fast: no process is spawned if
    /// validation fails.
    pub fn new(config: Config) -> Result<Self, ProcessManagerError> {
        validate::validate(&config)?;
        Ok(Supervisor { config })
    }

    /// Run the daemon to completion: start every enabled service, serve the control socket, and
    /// block until the shutdown coordinator has driven the registry to empty and exited.
    pub fn run(&self) -> Result<(), ProcessManagerError> {
        let registry = Registry::new();
        let markers = StartedMarkers::new();

        let _ = ipc::cleanup_socket();
        let socket_path = ipc::socket_path().map_err(|e| {
            ProcessManagerError::ServiceStartError {
                service: "<control-socket>".into(),
                source: std::io::Error::other(e.to_string()),
            }
        })?;

        let listener = UnixListener::bind(&socket_path).map_err(|e| {
            ProcessManagerError::ServiceStartError {
                service: "<control-socket>".into(),
                source: e,
            }
        })?;
        listener
            .set_nonblocking(true)
            .map_err(ProcessManagerError::ConfigReadError)?;

        let coordinator = Coordinator::install(
            registry.clone(),
            Duration::from_secs(self.config.timeouts.global_shutdown),
            socket_path,
        );
        let global_cancel = coordinator.cancel_handle();

        let name_width = self
            .config
            .services
            .keys()
            .map(|n| n.len())
            .max()
            .unwrap_or(0);

        let mut starters = Vec::new();
        for (name, spec) in self.config.services.clone() {
            if !spec.enabled {
                continue;
            }
            let registry = registry.clone();
            let markers = markers.clone();
            let timeouts = self.config.timeouts.clone();
            let cancel = global_cancel.clone();
            let coordinator = coordinator.clone();
            starters.push(thread::spawn(move || {
                start_one_service(&name, &spec, &timeouts, &registry, &markers, name_width, &cancel, &coordinator);
            }));
        }

        info!("control socket listening, entering accept loop");
        while !global_cancel.is_cancelled() {
            match listener.accept() {
                Ok((stream, _)) => {
                    let registry = registry.clone();
                    let coordinator = coordinator.clone();
                    let config = self.config.clone();
                    let markers = markers.clone();
                    thread::spawn(move || {
                        handle_connection(stream, &registry, &markers, &config, name_width, &coordinator);
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(100));
                }
                Err(e) => {
                    warn!(error = %e, "control socket accept error");
                    thread::sleep(Duration::from_millis(100));
                }
            }
        }

        for handle in starters {
            let _ = handle.join();
        }
        Ok(())
    }
}

#[allow(clippy::too_many_arguments)]
fn start_one_service(
    name: &str,
    spec: &crate::config::ServiceSpec,
    timeouts: &crate::config::Timeouts,
    registry: &Registry,
    markers: &StartedMarkers,
    name_width: usize,
    global_cancel: &CancelHandle,
    coordinator: &Coordinator,
) {
    if let Some(pre_script) = &spec.pre_script {
        if let Err(err) = runner::run_script(pre_script) {
            error!(service = name, error = %err, "pre-script failed");
            if spec.required {
                coordinator.trigger();
            }
            return;
        }
    }

    let deps: Vec<(String, Duration)> = spec
        .depends_on
        .iter()
        .map(|dep| (dep.clone(), Duration::from_secs(spec.wait_after.get_wait(dep))))
        .collect();

    match dependency::wait_for_all(
        markers,
        global_cancel,
        &deps,
        Duration::from_secs(timeouts.dependency_wait),
    ) {
        WaitOutcome::Ready => {}
        WaitOutcome::Cancelled => return,
        WaitOutcome::TimedOut => {
            warn!(service = name, "abandoned: dependency wait timed out");
            return;
        }
    }

    if global_cancel.is_cancelled() {
        return;
    }

    let outcome = runner::run_service(name, spec, timeouts, registry, markers, name_width, global_cancel);
    if let RunOutcome::SpawnFailed(reason) = outcome {
        error!(service = name, reason = %reason, "service failed to start");
        if spec.required {
            coordinator.trigger();
        }
    }
}

fn handle_connection(
    mut stream: UnixStream,
    registry: &Registry,
    markers: &StartedMarkers,
    config: &Config,
    name_width: usize,
    coordinator: &Coordinator,
) {
    let command = match ipc::read_command(&mut stream) {
        Ok(c) => c,
        Err(_) => return,
    };

    let registry_for_restart = registry.clone();
    let markers_for_restart = markers.clone();
    let config_for_restart = config.clone();
    let coordinator_for_restart = coordinator.clone();
    let response: ControlResponse = ipc::handle_command(command, registry, move |service_name| {
        restart_service(
            service_name,
            &registry_for_restart,
            &markers_for_restart,
            &config_for_restart,
            name_width,
            &coordinator_for_restart,
        );
    });

    let _ = ipc::write_response(&mut stream, &response);
}

fn restart_service(
    name: &str,
    registry: &Registry,
    markers: &StartedMarkers,
    config: &Config,
    name_width: usize,
    coordinator: &Coordinator,
) {
    let Some(spec) = config.services.get(name).cloned() else {
        return;
    };

    if let Some(process) = registry.get(name) {
        runner::request_stop(&process);
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while std::time::Instant::now() < deadline && registry.get(name).is_some() {
            thread::sleep(Duration::from_millis(100));
        }
        if let Some(process) = registry.get(name) {
            if let Some(pid) = process.get_pid() {
                let _ = nix::sys::signal::kill(
                    nix::unistd::Pid::from_raw(pid as i32),
                    nix::sys::signal::Signal::SIGKILL,
                );
            }
            registry.remove_active(name);
        }
    }

    thread::sleep(Duration::from_secs(1));

    let timeouts = config.timeouts.clone();
    let name = name.to_string();
    let registry = registry.clone();
    let markers = markers.clone();
    let cancel = coordinator.cancel_handle();
    thread::spawn(move || {
        runner::run_service(&name, &spec, &timeouts, &registry, &markers, name_width, &cancel);
    });
}
