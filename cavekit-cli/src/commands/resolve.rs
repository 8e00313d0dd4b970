//! Resolve a location path to its render target.

use std::path::Path;

use anyhow::Result;

use cavekit_core::Cave;

use crate::site::SiteConfig;

pub fn resolve(config_path: &Path, location: &str, json: bool) -> Result<()> {
    let site = SiteConfig::from_file(config_path)?;
    let cave = Cave::new(site.cave);
    let target = cave.render_target(location);

    if json {
        println!("{}", serde_json::to_string_pretty(&target)?);
    } else {
        println!("route:     {}", target.route.as_deref().unwrap_or("-"));
        println!("container: {}", target.container.as_deref().unwrap_or("-"));
        println!("tome_id:   {}", target.tome_id.as_deref().unwrap_or("-"));
        let tomes = if target.tomes.is_empty() {
            "-".to_string()
        } else {
            target.tomes.join(", ")
        };
        println!("tomes:     {tomes}");
        if cave.fallback_count() > 0 {
            println!("(unroutable path; this is the root's target)");
        }
    }
    Ok(())
}
