use anyhow::Result;

use tenderbridge_core::{ExtractionConfig, GovernmentClassifier};

pub fn run(config: &ExtractionConfig, names: &[String]) -> Result<()> {
    let classifier = GovernmentClassifier::from_bank(&config.government)?;

    for name in names {
        println!("{}\t{}", classifier.classify(name), name.trim());
    }

    Ok(())
}
