use anyhow::Result;

use tenderbridge_core::{ExtractionConfig, GovernmentClassifier, RoleResolver};

pub fn run(config: &ExtractionConfig, buyer: Option<&str>, winner: Option<&str>) -> Result<()> {
    let resolver = RoleResolver::new(GovernmentClassifier::from_bank(&config.government)?);
    let resolution = resolver.resolve(buyer, winner);

    println!("{}", serde_json::to_string_pretty(&resolution)?);
    Ok(())
}
