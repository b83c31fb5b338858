//! Terminal harness: one channel, typed commands standing in for a chat transport.

use monster_battle::battle::session::PlayerAction;
use monster_battle::persistence::FileRosterStore;
use monster_battle::{BattleError, BattleService, Catalog, ChannelId, Chunk, EngineConfig, TrainerId};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;

const CHANNEL: ChannelId = ChannelId(1);

const HELP: &str = "\
look | go <n> | wild | challenge | join [slot] | fight <n> | switch <n> | catch | run | next
starter <name> | squad | stats <n> | storage | page <n> | dex [number|name] | swap <a> <b>
deposit <n> | withdraw <n> | release <n,n,...> | confirm | heal | save | reset [yes|no]
as <id> [name] | help | quit";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::load(Path::new(&path)),
        None => EngineConfig::default().with_env_overrides(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            return;
        }
    };

    let catalog = match Catalog::builtin() {
        Ok(catalog) => Arc::new(catalog),
        Err(e) => {
            eprintln!("Error loading reference data: {}", e);
            return;
        }
    };

    let store = Arc::new(FileRosterStore::new(config.save_dir.clone()));
    let service = BattleService::new(catalog, config, store);
    tokio::spawn(log_session_events(service.subscribe_events()));

    let mut trainer = TrainerId(1);
    println!("{}", HELP);
    show(service.look(CHANNEL).await);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((&command, args)) = words.split_first() else {
            continue;
        };
        let slot = |i: usize| args.get(i).and_then(|s| s.parse::<usize>().ok()).map(|n| n.saturating_sub(1));

        let result = match (command, slot(0), slot(1)) {
            ("quit" | "exit", _, _) => break,
            ("help", _, _) => {
                println!("{}", HELP);
                continue;
            }
            ("as", _, _) => {
                match args.first().and_then(|s| s.parse::<u64>().ok()) {
                    Some(id) => {
                        trainer = TrainerId(id);
                        if let Some(name) = args.get(1) {
                            if let Err(e) = service.register_trainer(trainer, &name.to_uppercase()).await {
                                println!("! {}", e);
                            }
                        }
                        println!("Acting as trainer {}.", trainer);
                    }
                    None => println!("usage: as <id> [name]"),
                }
                continue;
            }
            ("next", _, _) => {
                match service.advance(CHANNEL).await {
                    Some(chunk) => print_chunk(&chunk),
                    None => println!("(nothing more)"),
                }
                continue;
            }
            ("look", _, _) => service.look(CHANNEL).await,
            ("go", Some(n), _) => service.travel(CHANNEL, n).await,
            ("wild", _, _) => service.start_wild_encounter(CHANNEL).await,
            ("challenge", _, _) => service.start_trainer_challenge(CHANNEL).await,
            ("join", choice, _) => service.join(CHANNEL, trainer, choice).await,
            ("fight", Some(n), _) => act(&service, trainer, PlayerAction::Fight { move_index: n }).await,
            ("switch", Some(n), _) => act(&service, trainer, PlayerAction::Switch { target_index: n }).await,
            ("catch", _, _) => act(&service, trainer, PlayerAction::Capture).await,
            ("run", _, _) => act(&service, trainer, PlayerAction::Run).await,
            ("starter", _, _) => match args.first() {
                Some(name) => service.pick_starter(CHANNEL, trainer, name).await,
                None => {
                    println!("usage: starter <name>");
                    continue;
                }
            },
            ("squad", _, _) => service.show_squad(CHANNEL, trainer).await,
            ("storage", _, _) => service.show_storage(CHANNEL, trainer).await,
            ("page", Some(n), _) => service.set_page(CHANNEL, trainer, n).await,
            ("stats", Some(n), _) => service.show_stats(CHANNEL, trainer, n).await,
            ("dex", _, _) => match args.first() {
                Some(query) => service.dex_entry(CHANNEL, trainer, query).await,
                None => service.show_dex(CHANNEL, trainer).await,
            },
            ("swap", Some(a), Some(b)) => service.swap(CHANNEL, trainer, a, b).await,
            ("deposit", Some(n), _) => service.deposit(CHANNEL, trainer, n).await,
            ("withdraw", Some(n), _) => service.withdraw(CHANNEL, trainer, n).await,
            ("release", _, _) => {
                let indices: Vec<usize> = args
                    .iter()
                    .flat_map(|a| a.split(','))
                    .filter_map(|s| s.trim().parse::<usize>().ok())
                    .map(|n| n.saturating_sub(1))
                    .collect();
                service.preview_release(CHANNEL, trainer, &indices).await
            }
            ("confirm", _, _) => service.confirm_release(CHANNEL, trainer).await,
            ("heal", _, _) => service.heal(CHANNEL, trainer).await,
            ("save", _, _) => service.save(CHANNEL, trainer).await,
            ("reset", _, _) => match args.first().copied() {
                Some("yes") => service.confirm_reset(CHANNEL, trainer).await,
                Some("no") => service.cancel_reset(CHANNEL, trainer).await,
                _ => service.reset(CHANNEL, trainer).await,
            },
            _ => {
                println!("Unknown command. Type help.");
                continue;
            }
        };
        show(result);
    }

    service.shutdown().await;
}

async fn act(service: &BattleService, trainer: TrainerId, action: PlayerAction) -> Result<Option<Chunk>, BattleError> {
    service.submit_action(CHANNEL, trainer, action).await
}

fn show(result: Result<Option<Chunk>, BattleError>) {
    match result {
        Ok(Some(chunk)) => print_chunk(&chunk),
        Ok(None) => println!("(queued; type next)"),
        Err(e) => println!("! {}", e),
    }
}

fn print_chunk(chunk: &Chunk) {
    println!("{}", chunk.text);
}

async fn log_session_events(mut events: broadcast::Receiver<monster_battle::SessionEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(json) => tracing::info!(event = %json, "session event"),
                Err(e) => tracing::warn!("Failed to encode session event: {}", e),
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "session event log fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
