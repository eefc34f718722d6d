use {
  crate::{
    mempool::{next_timestamp, Mempool},
    settings::SystemSettings,
    storage::OnDiskStore,
  },
  cinder_vm::{BlockDelta, Controller, Snapshot, WasmRuntime},
  clap::Parser,
  std::{collections::VecDeque, fs::File, io::BufWriter},
  tokio::time::{interval, MissedTickBehavior},
  tracing::{info, warn},
  tracing_subscriber::{EnvFilter, FmtSubscriber},
};

mod genesis;
mod mempool;
mod settings;
mod storage;

fn start_chain(settings: &SystemSettings) -> anyhow::Result<Controller> {
  let genesis = genesis::load(settings.genesis())?;
  let runtime = WasmRuntime::default();
  match settings.snapshot() {
    Some(path) => {
      let snapshot = Snapshot::read_from(File::open(path)?)?;
      if snapshot.chain_id != genesis.chain_id()? {
        anyhow::bail!("snapshot {} is not of this chain", path.display());
      }
      Ok(Controller::from_snapshot(&snapshot, runtime)?)
    }
    None => Ok(Controller::new(&genesis, runtime)?),
  }
}

/// Makes every block but the most recent ones irreversible and
/// mirrors their changes to disk.
fn advance_irreversible(
  controller: &mut Controller,
  deltas: &mut VecDeque<BlockDelta>,
  storage: Option<&OnDiskStore>,
  keep: u64,
) -> anyhow::Result<()> {
  let head = controller.head().height;
  let target = head.saturating_sub(keep);
  if target <= controller.irreversible().height {
    return Ok(());
  }
  controller.mark_irreversible(target)?;
  while deltas.front().map(|d| d.height <= target) == Some(true) {
    if let Some(delta) = deltas.pop_front() {
      if let Some(storage) = storage {
        storage.apply(&delta)?;
      }
    }
  }
  Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // configure logging, filtered through RUST_LOG
  tracing::subscriber::set_global_default(
    FmtSubscriber::builder()
      .with_env_filter(EnvFilter::from_default_env())
      .finish(),
  )?;

  // gather CLI parameters
  let settings = SystemSettings::parse();
  info!("startup settings: {settings:#?}");

  let mut controller = start_chain(&settings)?;
  info!(
    "chain {} at block {}",
    controller.chain_id(),
    controller.head().height
  );

  // the on-disk mirror starts from the committed state
  let storage = settings.storage()?;
  if let Some(storage) = &storage {
    storage.import(&controller.snapshot()?)?;
  }

  let mut mempool = Mempool::default();
  if let Some(path) = settings.transactions() {
    for tx in mempool::read_feed(path).await? {
      mempool.consume(tx);
    }
    info!("{} transactions queued from {}", mempool.len(), path.display());
  }

  let mut deltas = VecDeque::new();
  let mut produced = 0;
  let mut interval = interval(settings.block_time());
  interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

  loop {
    tokio::select! {
      _ = interval.tick() => {
        let timestamp = next_timestamp(controller.head().timestamp);
        let block = mempool.produce(&mut controller, timestamp, settings.producer())?;
        info!(
          "produced block {} with {} transactions, {} pending",
          block.header.height,
          block.receipts.len(),
          mempool.len()
        );
        deltas.push_back(block.delta);
        advance_irreversible(
          &mut controller,
          &mut deltas,
          storage.as_ref(),
          settings.reversible_blocks(),
        )?;

        produced += 1;
        if settings.blocks().map(|n| produced >= n) == Some(true) {
          break;
        }
      }
      _ = tokio::signal::ctrl_c() => {
        warn!("interrupted");
        break;
      }
    }
  }

  let (hits, misses) = controller.runtime().cache().stats();
  info!("module cache: {hits} hits, {misses} misses");

  // everything produced so far becomes final on shutdown
  advance_irreversible(&mut controller, &mut deltas, storage.as_ref(), 0)?;
  if let Some(path) = settings.snapshot_out() {
    let mut writer = BufWriter::new(File::create(&path)?);
    controller.snapshot()?.write_to(&mut writer)?;
    info!(
      "snapshot of block {} written to {}",
      controller.irreversible().height,
      path.display()
    );
  }
  Ok(())
}
