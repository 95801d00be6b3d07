use std::error::Error;
use std::fs;
use std::process;

use tracing::error;
use tracing_subscriber::EnvFilter;

use supervisor::cli::{Cli, Commands, parse_args};
use supervisor::config::load_config;
use supervisor::ipc::{self, ControlCommand};
use supervisor::supervisor::Supervisor;

fn main() -> Result<(), Box<dyn Error>> {
    let args = parse_args();
    init_logging(&args);

    let exit_code = match &args.command {
        None => run_daemon(&args),
        Some(Commands::List) => run_client(ControlCommand::ListServices, |resp| {
            let services = resp.services.unwrap_or_default();
            println!(
                "{:<20} {:<10} {:>8} {:>10} {:<9} {}",
                "NAME", "STATE", "PID", "UPTIME", "REQUIRED", "LAST_ERROR"
            );
            for s in services {
                println!(
                    "{:<20} {:<10} {:>8} {:>9}s {:<9} {}",
                    s.name, s.state, s.pid, s.uptime, s.required, s.last_error
                );
            }
        }),
        Some(Commands::Status) => run_client(ControlCommand::GetStatus, |resp| {
            println!("System Status: {}", resp.message.unwrap_or_default());
        }),
        Some(Commands::Restart { name }) => run_client(
            ControlCommand::RestartService {
                service_name: name.clone(),
            },
            |resp| {
                println!("{}", resp.message.unwrap_or_default());
            },
        ),
        Some(Commands::Install { dir }) => run_install(dir),
    };

    process::exit(exit_code);
}

fn run_daemon(args: &Cli) -> i32 {
    let config = match load_config(args.config.as_deref()) {
        Ok(c) => c,
        Err(err) => {
            error!(error = %err, "failed to load config");
            eprintln!("error: {err}");
            return 1;
        }
    };

    let supervisor = match Supervisor::new(config) {
        Ok(s) => s,
        Err(err) => {
            error!(error = %err, "config validation failed");
            eprintln!("error: {err}");
            return 1;
        }
    };

    if let Err(err) = supervisor.run() {
        error!(error = %err, "supervisor exited with an error");
        eprintln!("error: {err}");
        return 1;
    }
    0
}

fn run_client(command: ControlCommand, on_success: impl FnOnce(ipc::ControlResponse)) -> i32 {
    match ipc::send_command(&command) {
        Ok(response) => {
            on_success(response);
            0
        }
        Err(err) => {
            eprintln!("error: {err}");
            1
        }
    }
}

fn run_install(dir: &str) -> i32 {
    let current_exe = match std::env::current_exe() {
        Ok(p) => p,
        Err(err) => {
            eprintln!("error: could not resolve current executable: {err}");
            return 1;
        }
    };

    let target = std::path::Path::new(dir).join("supervisor");
    let _ = fs::remove_file(&target);

    #[cfg(unix)]
    {
        if let Err(err) = std::os::unix::fs::symlink(&current_exe, &target) {
            eprintln!("error: failed to install symlink at {target:?}: {err}");
            return 1;
        }
    }

    println!("installed {target:?} -> {current_exe:?}");
    0
}

fn init_logging(args: &Cli) {
    let filter = if args.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
