use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use maci_coordinator::config::CoordinatorConfig;
use maci_coordinator::crypto::Keypair;
use maci_coordinator::logging;
use maci_coordinator::output::{verify_tally, TallyData};
use maci_coordinator::relay::{HttpGateway, MessageRelay};
use maci_coordinator::replicator::{RecordedLedger, ReplayOptions, Replicator};
use maci_coordinator::CoreError;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Cli
{
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command
{
    /// Replay the ledger, process every message batch and tally the poll.
    Run
    {
        #[arg(long, short, help = "Coordinator config path")]
        config: PathBuf,

        #[arg(long, help = "Directory receiving the circuit inputs of every batch")]
        inputs_dir: Option<PathBuf>,

        #[arg(long, help = "Unix time used to check the poll has ended; defaults to now")]
        now: Option<u64>,
    },

    /// Check every commitment in a tally file.
    Verify
    {
        #[arg(long, short)]
        tally: PathBuf,

        #[arg(long)]
        vote_option_tree_depth: usize,
    },

    /// Print a fresh coordinator keypair.
    GenKeypair,
}

#[tokio::main]
async fn main()
{
    logging::init();

    let cli = Cli::parse();
    let outcome = match cli.command
    {
        Command::Run { config, inputs_dir, now } => run(config, inputs_dir, now).await,
        Command::Verify { tally, vote_option_tree_depth } => verify(tally, vote_option_tree_depth),
        Command::GenKeypair => gen_keypair(),
    };

    if let Err(err) = outcome
    {
        error!("{err}");
        std::process::exit(1);
    }
}

async fn run(config_path: PathBuf, inputs_dir: Option<PathBuf>, now: Option<u64>) -> Result<(), CoreError>
{
    let config = CoordinatorConfig::from_path(&config_path)?;
    let keypair = config.coordinator_keypair()?;

    let ledger = RecordedLedger::load(&config.ledger_dump)?;
    let relay = MessageRelay::new(Box::new(HttpGateway::new(&config.ipfs)?))
        .with_backup_files(&config.ipfs_backup_files[..])?;

    let options = ReplayOptions {
        maci_address: config.maci_address.clone(),
        poll_id: config.poll_id,
        from_block: config.from_block,
        end_block: config.end_block,
        blocks_per_request: config.blocks_per_request,
        sleep: config.sleep_ms.map(Duration::from_millis),
        logs_output_path: config.logs_output_path.clone(),
    };

    let mut state = Replicator::new(&ledger, &relay, options).generate_state(&keypair).await?;
    let mut poll = state.take_poll(config.poll_id)?;

    let now = now.unwrap_or_else(|| chrono::Utc::now().timestamp().max(0) as u64);
    let mut rng = rand::thread_rng();

    if let Some(dir) = &inputs_dir
    {
        fs::create_dir_all(dir)?;
    }

    let mut batch = 0;
    while poll.has_unprocessed_messages()
    {
        let processed = poll.process_messages(now, &mut rng)?;
        if let Some(dir) = &inputs_dir
        {
            let path = dir.join(format!("process_{batch}.json"));
            fs::write(path, serde_json::to_string_pretty(&processed.circuit_inputs)?)?;
        }
        batch += 1;
    }

    let mut batch = 0;
    while poll.has_untallied_ballots()
    {
        let inputs = poll.tally_votes(&mut rng)?;
        if let Some(dir) = &inputs_dir
        {
            let path = dir.join(format!("tally_{batch}.json"));
            fs::write(path, serde_json::to_string_pretty(&inputs)?)?;
        }
        batch += 1;
    }

    let tally = TallyData::from_poll(&config.maci_address, &poll)?;
    tally.write(&config.tally_output_path)?;

    if let Some(path) = &config.state_output_path
    {
        poll.save(path)?;
    }

    info!(poll_id = config.poll_id, commitment = %maci_coordinator::field::to_decimal(&tally.new_tally_commitment), "poll tallied");
    Ok(())
}

fn verify(path: PathBuf, vote_option_tree_depth: usize) -> Result<(), CoreError>
{
    let tally = TallyData::read(&path)?;
    verify_tally(&tally, vote_option_tree_depth)?;
    info!(path = %path.display(), "tally commitments match");
    Ok(())
}

fn gen_keypair() -> Result<(), CoreError>
{
    let keypair = Keypair::random(&mut rand::thread_rng());
    println!("{}", serde_json::to_string_pretty(&keypair)?);
    Ok(())
}
