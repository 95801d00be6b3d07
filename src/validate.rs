//! C2 — the validator.
//!
//! Pure and deterministic aside from filesystem existence checks and a user-database lookup.
//! Accumulates every error found rather than short-circuiting on the first one.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use nix::unistd::User;
use regex::Regex;

use crate::config::Config;
use crate::constants::MAX_WAIT_AFTER_SECONDS;
use crate::error::{ValidationError, ValidationErrors};

const MAX_WAIT_AFTER: i64 = MAX_WAIT_AFTER_SECONDS as i64;

/// Validate `config`, returning it unchanged on success (defaults are already materialized by
/// serde at load time — see `ServiceSpec::enabled`/`Timeouts::default`) or every error found.
pub fn validate(config: &Config) -> Result<(), ValidationErrors> {
    let mut errors = Vec::new();
    let name_re = Regex::new(r"^[A-Za-z0-9_-]+$").unwrap();

    for (name, spec) in &config.services {
        if name.is_empty() || !name_re.is_match(name) {
            errors.push(ValidationError::InvalidName {
                service: name.clone(),
            });
        }

        if spec.command.is_empty() {
            errors.push(ValidationError::EmptyCommand {
                service: name.clone(),
            });
        } else {
            check_command(name, &spec.command, &mut errors);
        }

        if let Some(script) = &spec.pre_script {
            check_path_exists(name, script, "pre_script", &mut errors);
        }
        if let Some(script) = &spec.pos_script {
            check_path_exists(name, script, "pos_script", &mut errors);
        }
        if let Some(log_file) = &spec.log_file {
            check_log_dir_exists(name, log_file, &mut errors);
        }

        if let Some(user) = &spec.user {
            if User::from_name(user).ok().flatten().is_none() {
                errors.push(ValidationError::UnknownUser {
                    service: name.clone(),
                    user: user.clone(),
                });
            }
        }

        if spec.wait_after.default_seconds as i64 > MAX_WAIT_AFTER {
            errors.push(ValidationError::WaitAfterOutOfRange {
                service: name.clone(),
                seconds: spec.wait_after.default_seconds as i64,
            });
        }
        for (dep, seconds) in &spec.wait_after.per_edge {
            if *seconds as i64 > MAX_WAIT_AFTER {
                errors.push(ValidationError::WaitAfterOutOfRange {
                    service: name.clone(),
                    seconds: *seconds as i64,
                });
            }
            if !spec.depends_on.iter().any(|d| d == dep) {
                errors.push(ValidationError::WaitAfterNotADependency {
                    service: name.clone(),
                    dependency: dep.clone(),
                });
            }
        }

        for dep in spec.depends_on.iter() {
            if !config.services.contains_key(dep) {
                errors.push(ValidationError::UnknownDependency {
                    service: name.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    // Name uniqueness: the config's own `HashMap<String, _>` already guarantees uniqueness of
    // the map key, but a service's `command` may coincidentally equal another's name in tests
    // that construct `Config` by hand; duplicate-name detection belongs to the loader stage in
    // practice. Kept here as a defensive check over the keys as seen.
    let mut seen = HashSet::new();
    for name in config.services.keys() {
        if !seen.insert(name) {
            errors.push(ValidationError::DuplicateName(name.clone()));
        }
    }

    if let Some(cycle) = find_cycle(config) {
        errors.push(ValidationError::DependencyCycle { cycle });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationErrors(errors))
    }
}

fn check_command(service: &str, command: &str, errors: &mut Vec<ValidationError>) {
    let path = Path::new(command);
    if command.contains(char::is_whitespace) {
        // A command with embedded arguments (e.g. a shell pipeline) is accepted verbatim; only
        // bare executable names/paths are existence-checked.
        return;
    }
    if path.is_absolute() {
        if !path.exists() {
            errors.push(ValidationError::CommandNotFound {
                service: service.to_string(),
                command: command.to_string(),
            });
        }
        return;
    }
    let resolvable = std::env::var_os("PATH")
        .map(|paths| {
            std::env::split_paths(&paths).any(|dir| dir.join(command).is_file())
        })
        .unwrap_or(false);
    if !resolvable {
        errors.push(ValidationError::CommandNotFound {
            service: service.to_string(),
            command: command.to_string(),
        });
    }
}

fn check_path_exists(
    service: &str,
    path: &str,
    kind: &'static str,
    errors: &mut Vec<ValidationError>,
) {
    if !Path::new(path).exists() {
        errors.push(ValidationError::MissingPath {
            service: service.to_string(),
            path: path.to_string(),
            kind,
        });
    }
}

fn check_log_dir_exists(service: &str, log_file: &str, errors: &mut Vec<ValidationError>) {
    let parent = Path::new(log_file).parent().unwrap_or(Path::new("."));
    if !parent.exists() {
        errors.push(ValidationError::MissingPath {
            service: service.to_string(),
            path: log_file.to_string(),
            kind: "log_file",
        });
    }
}

#[derive(PartialEq, Eq, Clone, Copy)]
enum Color {
    White,
    Gray,
    Black,
}

/// DFS cycle detection over `depends_on` edges using a recursion-stack colour set.
fn find_cycle(config: &Config) -> Option<String> {
    let mut color: HashMap<&str, Color> = config
        .services
        .keys()
        .map(|k| (k.as_str(), Color::White))
        .collect();
    let mut stack: Vec<&str> = Vec::new();

    for start in config.services.keys() {
        if color.get(start.as_str()) == Some(&Color::White) {
            if let Some(cycle) = visit(config, start, &mut color, &mut stack) {
                return Some(cycle);
            }
        }
    }
    None
}

fn visit<'a>(
    config: &'a Config,
    node: &'a str,
    color: &mut HashMap<&'a str, Color>,
    stack: &mut Vec<&'a str>,
) -> Option<String> {
    color.insert(node, Color::Gray);
    stack.push(node);

    if let Some(spec) = config.services.get(node) {
        for dep in spec.depends_on.iter() {
            let dep = dep.as_str();
            match color.get(dep) {
                Some(Color::Gray) => {
                    let start = stack.iter().position(|&n| n == dep).unwrap_or(0);
                    let mut cycle: Vec<&str> = stack[start..].to_vec();
                    cycle.push(dep);
                    return Some(cycle.join(" -> "));
                }
                Some(Color::White) | None => {
                    if let Some(cycle) = visit(config, dep, color, stack) {
                        return Some(cycle);
                    }
                }
                Some(Color::Black) => {}
            }
        }
    }

    stack.pop();
    color.insert(node, Color::Black);
    None
}
