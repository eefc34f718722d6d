use {
  cinder_vm::GenesisState,
  std::{fs::File, io::BufReader, path::Path},
};

/// Reads the genesis state of a chain from a JSON file.
pub fn load(path: &Path) -> anyhow::Result<GenesisState> {
  let genesis: GenesisState =
    serde_json::from_reader(BufReader::new(File::open(path)?))?;
  genesis.initial_configuration.validate()?;
  Ok(genesis)
}

#[cfg(test)]
mod tests {
  use {
    cinder_primitives::TimePoint,
    cinder_vm::{ChainConfig, GenesisState},
    ed25519_dalek::Keypair,
  };

  #[test]
  fn omitted_fields_take_defaults() -> anyhow::Result<()> {
    let key = Keypair::generate(&mut rand::thread_rng());
    let genesis = GenesisState::new(TimePoint::from_secs(1_600_000_000), key.public.into());

    let mut json = serde_json::to_value(&genesis)?;
    let object = json.as_object_mut().expect("genesis is an object");
    object.remove("initial_configuration");
    object.remove("accounts");

    let parsed: GenesisState = serde_json::from_value(json)?;
    assert_eq!(parsed, genesis);
    assert_eq!(parsed.initial_configuration, ChainConfig::default());
    Ok(())
  }
}
