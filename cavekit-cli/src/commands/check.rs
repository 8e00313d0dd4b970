//! Validate a deployment file before serving it.
//!
//! Errors are things the server would reject or silently mis-route:
//! duplicate tome ids, invalid transition tables, routes that name no
//! machine, paths missing their leading slash, locations pointing at
//! tomes that do not exist. Warnings are survivable degradations, such
//! as a persistence backend the server would substitute with memory.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{bail, Result};
use serde::Serialize;

use cavekit_types::Spelunk;

use crate::site::SiteConfig;

#[derive(Debug, Default, Serialize)]
pub struct CheckReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

pub fn check(config_path: &Path, json: bool) -> Result<()> {
    let site = SiteConfig::from_file(config_path)?;
    let report = check_site(&site);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for warning in &report.warnings {
            println!("warning: {warning}");
        }
        for error in &report.errors {
            println!("error: {error}");
        }
        if report.errors.is_empty() {
            println!(
                "ok: {} tome(s), {} warning(s)",
                site.tomes.len(),
                report.warnings.len()
            );
        }
    }

    if !report.errors.is_empty() {
        bail!(
            "{} error(s) in {}",
            report.errors.len(),
            config_path.display()
        );
    }
    Ok(())
}

pub fn check_site(site: &SiteConfig) -> CheckReport {
    let mut report = CheckReport::default();

    let mut ids: BTreeSet<&str> = BTreeSet::new();
    for tome in &site.tomes {
        if !ids.insert(tome.id.as_str()) {
            report
                .errors
                .push(format!("duplicate tome id \"{}\"", tome.id));
        }
    }

    for tome in &site.tomes {
        if tome.machines.is_empty() {
            report
                .warnings
                .push(format!("tome \"{}\" declares no machines", tome.id));
        }
        for (key, spec) in &tome.machines {
            if let Err(err) = spec.machine.validate() {
                report
                    .errors
                    .push(format!("tome \"{}\" machine \"{}\": {}", tome.id, key, err));
            }
        }
        if let Some(routing) = &tome.routing {
            if !routing.base_path.starts_with('/') {
                report.errors.push(format!(
                    "tome \"{}\": base path \"{}\" must start with '/'",
                    tome.id, routing.base_path
                ));
            }
            for (name, binding) in &routing.routes {
                if !binding.path.starts_with('/') {
                    report.errors.push(format!(
                        "tome \"{}\" route \"{}\": path \"{}\" must start with '/'",
                        tome.id, name, binding.path
                    ));
                }
                if !tome.machines.contains_key(name) {
                    report.errors.push(format!(
                        "tome \"{}\" route \"{}\" names no machine in the tome",
                        tome.id, name
                    ));
                }
            }
        }
        if let Some(persistence) = &tome.persistence {
            if persistence.enabled {
                let adapter = persistence.adapter.as_deref().unwrap_or("memory");
                let available =
                    adapter == "memory" || (adapter == "file" && site.store.is_some());
                if !available {
                    report.warnings.push(format!(
                        "tome \"{}\" wants backend \"{}\"; the server will fall back to memory",
                        tome.id, adapter
                    ));
                }
            }
        }
    }

    check_spelunk(&site.cave.spelunk, "", &ids, &mut report);
    report
}

fn check_spelunk(node: &Spelunk, at: &str, ids: &BTreeSet<&str>, report: &mut CheckReport) {
    let here = if at.is_empty() { "." } else { at };
    if let Some(tome_id) = &node.tome_id {
        if !ids.contains(tome_id.as_str()) {
            report.errors.push(format!(
                "location \"{here}\": unknown tome id \"{tome_id}\""
            ));
        }
    }
    for tome in &node.tomes {
        if !ids.contains(tome.as_str()) {
            report.warnings.push(format!(
                "location \"{here}\": tome list names unknown \"{tome}\""
            ));
        }
    }
    for (segment, child) in &node.child_caves {
        let path = if at.is_empty() {
            segment.clone()
        } else {
            format!("{at}/{segment}")
        };
        check_spelunk(child, &path, ids, report);
    }
}
