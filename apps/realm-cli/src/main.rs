use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use realm_common::{EntityId, EntityKind};
use realm_entity::{Blueprint, BufferedSession};
use realm_persist::PersistentStore;
use realm_tools::WorldInspector;
use realm_world::{WorldConfig, WorldManager};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "realm-cli", about = "CLI tool for realm operations")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Store directory
    #[arg(short, long, global = true, default_value = "realm-store")]
    store: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and crate info
    Info,
    /// Create the store and the fallback location, plus any named rooms
    Init {
        /// Room to create (repeatable)
        #[arg(short, long = "room")]
        rooms: Vec<String>,
    },
    /// Register a new character
    AddPlayer {
        name: String,
        secret: String,
        /// Starting location id (defaults to the fallback location)
        #[arg(short, long)]
        location: Option<EntityId>,
    },
    /// Authenticate a character, show where it stands, and log it out again
    Login { name: String, secret: String },
    /// List stored entities, or show one entity and its contents
    Inspect { id: Option<EntityId> },
    /// Load the world and run the tick loop
    Run {
        /// Number of ticks to simulate
        #[arg(short, long, default_value = "10")]
        ticks: u64,
        /// World config (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Override the configured autosave period
        #[arg(long)]
        autosave_every: Option<u64>,
        /// Do not sleep between ticks
        #[arg(long)]
        fast: bool,
    },
}

fn open_world(store: &Path, config: WorldConfig) -> anyhow::Result<WorldManager> {
    let backend = PersistentStore::open(store)
        .with_context(|| format!("opening store at {}", store.display()))?;
    Ok(WorldManager::new(config, backend)?)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match cli.command {
        Commands::Info => {
            println!("realm-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("common: {}", realm_common::crate_info());
            println!("entity: {}", realm_entity::crate_info());
            println!("kernel: {}", realm_kernel::crate_info());
            println!("persist: {}", realm_persist::crate_info());
            println!("world: {}", realm_world::crate_info());
            println!("tools: {}", realm_tools::crate_info());
        }
        Commands::Init { rooms } => {
            let mut world = open_world(&cli.store, WorldConfig::default())?;
            for name in rooms {
                let id = world.create_entity(EntityKind::Room, None, Blueprint::named(&name))?;
                println!("room {name}: {id}");
            }
            println!("fallback: {}", world.fallback_id());
            println!("{}", WorldInspector::summary(&world));
        }
        Commands::AddPlayer {
            name,
            secret,
            location,
        } => {
            let mut world = open_world(&cli.store, WorldConfig::default())?;
            let id = world.create_player(&name, &secret, location)?;
            let summary = world.shutdown();
            println!("player {name}: {id} (saved {})", summary.saved);
        }
        Commands::Login { name, secret } => {
            let mut world = open_world(&cli.store, WorldConfig::default())?;
            let id = match world.load_player(&name, &secret) {
                Ok(id) => id,
                Err(err) if err.is_user_facing() => bail!("login refused: {err}"),
                Err(err) => return Err(err.into()),
            };
            world.attach_session(id, BufferedSession::new())?;
            if let Some(info) = WorldInspector::inspect_entity(&world, id) {
                println!("{info}");
                if let Some(location) = info.container {
                    print!("{}", WorldInspector::render_tree(&world, location));
                }
            }
            world.shutdown();
        }
        Commands::Inspect { id: None } => {
            let store = PersistentStore::open(&cli.store)?;
            let entities = store.entities()?;
            for (id, kind) in &entities {
                println!("{id} {kind}");
            }
            println!("{} stored entities", entities.len());
        }
        Commands::Inspect { id: Some(id) } => {
            let mut world = open_world(&cli.store, WorldConfig::default())?;
            if world.lookup(id)?.is_none() {
                bail!("no such entity: {id}");
            }
            if let Some(info) = WorldInspector::inspect_entity(&world, id) {
                println!("{info}");
            }
            print!("{}", WorldInspector::render_tree(&world, id));
        }
        Commands::Run {
            ticks,
            config,
            autosave_every,
            fast,
        } => {
            let mut config = match config {
                Some(path) => WorldConfig::from_json_file(&path)
                    .with_context(|| format!("reading config {}", path.display()))?,
                None => WorldConfig::default(),
            };
            if let Some(n) = autosave_every {
                config.autosave_every_ticks = n;
            }
            let interval = config.tick_interval();
            let mut world = open_world(&cli.store, config)?;
            let loaded = world.load_all(false)?;
            println!(
                "loaded {} entities ({} failed, {} pruned, {} relocated)",
                loaded.loaded, loaded.failed, loaded.pruned, loaded.relocated
            );

            for _ in 0..ticks {
                let report = world.tick();
                tracing::debug!(?report, "tick");
                if !fast {
                    std::thread::sleep(interval);
                }
            }
            println!("{}", WorldInspector::summary(&world));
            let saved = world.shutdown();
            println!("saved {} entities ({} failed)", saved.saved, saved.failed);
        }
    }

    Ok(())
}
