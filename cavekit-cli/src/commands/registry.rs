//! Print the cave's address book: every top-level location and where
//! it mounts.

use std::path::Path;

use anyhow::Result;
use serde_json::json;

use crate::site::SiteConfig;

pub fn registry(config_path: &Path, json: bool) -> Result<()> {
    let site = SiteConfig::from_file(config_path)?;
    let addresses: Vec<_> = site
        .cave
        .spelunk
        .child_caves
        .iter()
        .map(|(name, child)| {
            json!({
                "name": name,
                "route": child.route,
                "container": child.container,
                "tome_id": child.tome_id,
            })
        })
        .collect();

    if json {
        let payload = json!({
            "cave": site.cave.name,
            "addresses": addresses,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!("{} ({} addresses)", site.cave.name, addresses.len());
        for entry in &addresses {
            println!(
                "- {}  route={}  container={}  tome={}",
                entry["name"].as_str().unwrap_or("?"),
                entry["route"].as_str().unwrap_or("-"),
                entry["container"].as_str().unwrap_or("-"),
                entry["tome_id"].as_str().unwrap_or("-"),
            );
        }
    }
    Ok(())
}
