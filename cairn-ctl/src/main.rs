use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use cairn_client::{api::TrailId, SyncConfig};
use cairn_mock_server::{MockStore, Seed};

mod replay;

#[derive(structopt::StructOpt)]
struct Opt {
    /// Synchronizer configuration (JSON), defaults are used if absent
    #[structopt(short, long, env = "CAIRN_CONFIG", parse(from_os_str))]
    config: Option<PathBuf>,

    /// Documents to load into the store before starting (JSON, as output by
    /// generate-test-data)
    #[structopt(short, long, parse(from_os_str))]
    seed: Option<PathBuf>,

    /// Trail whose comments to follow
    #[structopt(short, long, default_value = "demo")]
    trail: String,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(structopt::StructOpt)]
enum Command {
    /// Run a comment session script, then print the resulting comment tree
    Replay {
        /// One JSON step per line
        #[structopt(parse(from_os_str))]
        script: PathBuf,
    },

    /// Print the comment tree of the trail
    Dump,
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<SyncConfig> {
    let Some(path) = path else {
        return Ok(SyncConfig::default());
    };
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {path:?}"))?;
    let config: SyncConfig = serde_json::from_str(&data)
        .with_context(|| format!("parsing config file {path:?}"))?;
    config.validate().context("validating config")?;
    Ok(config)
}

fn load_store(seed: Option<&PathBuf>) -> anyhow::Result<MockStore> {
    let Some(path) = seed else {
        return Ok(MockStore::new());
    };
    let data =
        std::fs::read_to_string(path).with_context(|| format!("reading seed file {path:?}"))?;
    let seed: Seed =
        serde_json::from_str(&data).with_context(|| format!("parsing seed file {path:?}"))?;
    let num = seed.documents.len();
    let store = MockStore::from_seed(seed).context("loading seed")?;
    tracing::info!(documents = num, "loaded seed");
    Ok(store)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let opt = <Opt as structopt::StructOpt>::from_args();
    let config = load_config(opt.config.as_ref())?;
    let store = Arc::new(load_store(opt.seed.as_ref())?);
    let trail = TrailId(opt.trail);
    let mut session = replay::Session::new(store, config, trail)?;

    match opt.cmd {
        Command::Replay { script } => {
            let data = std::fs::read_to_string(&script)
                .with_context(|| format!("reading script {script:?}"))?;
            let steps = replay::parse_script(&data)?;
            session.run(steps).await;
        }
        Command::Dump => session.process(),
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&*session.tree()).context("serializing comment tree")?
    );
    Ok(())
}
