use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tictactoe_client::{
    resolve_contract_address, Config, GameBackend, GameContract, LocalWalletSession,
    PreferenceStore, SessionClient,
};

const USAGE: &str = "usage: e2e_tools <create|join|move|state|count|watch|set-address|clear-address> ...\n\
  create                 create a session, print its id\n\
  join <id>              join an existing session\n\
  move <id> <pos 0-8>    submit a move\n\
  state <id>             print the session snapshot as JSON\n\
  count                  print the total number of sessions\n\
  watch <id>             select the session and print view changes\n\
  set-address <0x...>    store the contract address preference\n\
  clear-address          reset the stored contract address";

// Internal helper that parses or transforms values for `parse_arg`.
fn parse_arg<T: FromStr>(args: &[String], index: usize, name: &str) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    let raw = args
        .get(index)
        .ok_or_else(|| anyhow::anyhow!("missing <{}> argument\n{}", name, USAGE))?;
    raw.parse::<T>()
        .map_err(|e| anyhow::anyhow!("invalid <{}> argument: {}", name, e))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tictactoe_client=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!("{}", USAGE);
        std::process::exit(1);
    }

    let config = Config::from_env()?;
    config.validate()?;
    let store = PreferenceStore::from_config(&config);

    // Preference maintenance works without a signer or RPC round-trip.
    match args[1].as_str() {
        "set-address" => {
            let address: String = parse_arg(&args, 2, "address")?;
            store.save(&address)?;
            println!("stored contract address {}", address);
            return Ok(());
        }
        "clear-address" => {
            store.clear()?;
            println!("cleared stored contract address");
            return Ok(());
        }
        _ => {}
    }

    let contract_address = resolve_contract_address(&config, &store).ok_or_else(|| {
        anyhow::anyhow!(
            "No contract address configured; run `e2e_tools set-address <0x...>` or set TICTACTOE_CONTRACT_ADDRESS"
        )
    })?;
    let wallet = LocalWalletSession::from_config(&config)?
        .ok_or_else(|| anyhow::anyhow!("PLAYER_PRIVATE_KEY is required for this command"))?;

    tracing::info!("Using contract {} as {}", contract_address, wallet.address());
    let backend = Arc::new(GameContract::connect(
        &config,
        &contract_address,
        wallet.signer(),
    )?);

    match args[1].as_str() {
        "create" => {
            let session_id = backend.create_game().await?;
            println!("{}", session_id);
        }
        "join" => {
            let session_id: u64 = parse_arg(&args, 2, "id")?;
            backend.join_game(session_id).await?;
            println!("joined session {}", session_id);
        }
        "move" => {
            let session_id: u64 = parse_arg(&args, 2, "id")?;
            let position: u8 = parse_arg(&args, 3, "pos")?;
            backend.make_move(session_id, position).await?;
            println!("move submitted");
        }
        "state" => {
            let session_id: u64 = parse_arg(&args, 2, "id")?;
            let game = backend.get_game(session_id).await?;
            println!("{}", serde_json::to_string_pretty(&game)?);
        }
        "count" => {
            println!("{}", backend.game_count().await?);
        }
        "watch" => {
            let session_id: u64 = parse_arg(&args, 2, "id")?;
            watch_session(backend, Arc::new(wallet), &config, session_id).await?;
        }
        other => {
            eprintln!("unknown subcommand: {}", other);
            eprintln!("{}", USAGE);
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Runs the real session client (poll loop included) against the session and
/// prints the view whenever it changes. Ctrl-C to stop.
async fn watch_session(
    backend: Arc<GameContract>,
    wallet: Arc<LocalWalletSession>,
    config: &Config,
    session_id: u64,
) -> anyhow::Result<()> {
    let client = SessionClient::new(backend, wallet, config.poll_interval());
    client.connect().await?;
    client.select_session(session_id).await?;

    let mut last_fingerprint = String::new();
    loop {
        tokio::time::sleep(Duration::from_millis(500)).await;
        let view = client.view().await;
        // fetched_at changes on every poll; fingerprint only what matters.
        let fingerprint = format!(
            "{} {:?}",
            view.phase.as_str(),
            view.game
                .as_ref()
                .map(|game| (game.state, game.current_turn, game.board, game.winner))
        );
        if fingerprint != last_fingerprint {
            println!("{}", serde_json::to_string_pretty(&view)?);
            last_fingerprint = fingerprint;
        }
    }
}
