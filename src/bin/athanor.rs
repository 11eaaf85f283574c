//! athanor CLI: operator interface to the workshop backend.

use std::path::PathBuf;
use std::sync::Arc;

use athanor::audit::AuditSink;
use athanor::config::{Config, Settings};
use athanor::db::Db;
use athanor::db::pgmq::PgmqQueue;
use athanor::ledger::StockLedger;
use athanor::mission::MissionService;
use athanor::model::*;
use athanor::monitor::Monitor;
use athanor::store::AuditStore;
use athanor::telemetry::{TelemetryConfig, init_telemetry};
use athanor::transmutation::TransmutationService;
use athanor::worker::{HandlerRegistry, PoolConfig, TransmutationHandler, WorkerPool};
use clap::{Parser, Subcommand};
use secrecy::ExposeSecret;

#[derive(Parser)]
#[command(name = "athanor", about = "Stock, transmutations and missions for the workshop")]
struct Cli {
    /// Settings file (TOML). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Who is acting: "system" or a user UUID
    #[arg(long, global = true, default_value = "system")]
    actor: Actor,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the worker pool and the periodic monitor until Ctrl-C
    Serve {
        /// Override the configured worker concurrency
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Material stock
    Material {
        #[command(subcommand)]
        action: MaterialAction,
    },
    /// Transmutation requests
    Transmutation {
        #[command(subcommand)]
        action: TransmutationAction,
    },
    /// The alchemist roster
    Alchemist {
        #[command(subcommand)]
        action: AlchemistAction,
    },
    /// Missions
    Mission {
        #[command(subcommand)]
        action: MissionAction,
    },
    /// Audit trail
    Audit {
        #[command(subcommand)]
        action: AuditAction,
    },
}

#[derive(Subcommand)]
enum MaterialAction {
    /// Add a material to the inventory
    Create {
        name: String,
        unit: String,
        #[arg(long, default_value_t = 0.0)]
        quantity: f64,
    },
    /// List materials
    List {
        /// Case-insensitive match on name or unit
        #[arg(long)]
        query: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
    /// Show a material
    Show { id: MaterialId },
    /// Change a material's quantity by a signed delta
    Adjust {
        id: MaterialId,
        #[arg(allow_hyphen_values = true)]
        delta: f64,
        #[arg(long, default_value = "manual adjustment")]
        reason: String,
    },
    /// Change a material's name or unit; quantity is untouched
    Rename {
        id: MaterialId,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        unit: Option<String>,
    },
    /// Delete a material
    Delete { id: MaterialId },
}

#[derive(Subcommand)]
enum TransmutationAction {
    /// Request a transmutation and enqueue it for processing
    Create {
        name: String,
        cost: f64,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// List transmutations
    List {
        /// Filter by state (pending, completed, failed)
        #[arg(long)]
        state: Option<TransmutationState>,
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Show a transmutation
    Show { id: TransmutationId },
    /// Enqueue a still-pending transmutation again
    Requeue { id: TransmutationId },
}

#[derive(Subcommand)]
enum AlchemistAction {
    /// Register an alchemist
    Create {
        name: String,
        #[arg(long, default_value = "")]
        rank: String,
        #[arg(long, default_value = "")]
        specialty: String,
    },
    /// List the roster by name
    List {
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
}

#[derive(Subcommand)]
enum MissionAction {
    /// Create a mission
    Create {
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "medium")]
        priority: MissionPriority,
        /// Assign to a registered alchemist
        #[arg(long)]
        alchemist: Option<AlchemistId>,
        #[arg(long, default_value = "")]
        materials: String,
    },
    /// List missions
    List {
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Change a mission's state or file its final report
    Update {
        id: MissionId,
        #[arg(long)]
        state: Option<MissionState>,
        #[arg(long)]
        report: Option<String>,
    },
}

#[derive(Subcommand)]
enum AuditAction {
    /// Show the most recent audit events
    List {
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Enter an audit event by hand
    Record {
        #[arg(long)]
        action: String,
        #[arg(long)]
        entity: String,
        #[arg(long, default_value = "")]
        detail: String,
    },
}

/// Everything a short-lived command needs.
struct App {
    db: Arc<Db>,
    queue: Arc<PgmqQueue>,
    audit: AuditSink,
    settings: Settings,
}

impl App {
    async fn connect(config: &Config, settings: Settings) -> anyhow::Result<Self> {
        let db = Arc::new(Db::connect(config.database_url.expose_secret()).await?);
        db.migrate().await?;
        let queue = Arc::new(PgmqQueue::create(Arc::clone(&db), &settings.queue.name).await?);
        let (audit, _writer) = AuditSink::spawn(db.clone(), settings.audit.buffer);
        Ok(Self {
            db,
            queue,
            audit,
            settings,
        })
    }

    fn ledger(&self) -> StockLedger {
        StockLedger::new(self.db.clone(), self.audit.clone())
    }

    fn transmutations(&self) -> TransmutationService {
        TransmutationService::new(self.db.clone(), self.queue.clone())
    }

    fn missions(&self) -> MissionService {
        MissionService::new(self.db.clone(), self.db.clone(), self.audit.clone())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;
    let settings = match cli.config {
        Some(ref path) => Settings::load(path)?,
        None => Settings::default(),
    };

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "athanor".to_string(),
        log_level: config.log_level.clone(),
    })?;

    let app = App::connect(&config, settings).await?;
    let actor = cli.actor;

    let result = match cli.command {
        Command::Serve { concurrency } => cmd_serve(&app, concurrency).await,
        Command::Material { action } => cmd_material(&app, action, actor).await,
        Command::Transmutation { action } => cmd_transmutation(&app, action).await,
        Command::Alchemist { action } => cmd_alchemist(&app, action).await,
        Command::Mission { action } => cmd_mission(&app, action, actor).await,
        Command::Audit { action } => cmd_audit(&app, action, actor).await,
    };

    // Audit writes are asynchronous; don't exit before they land.
    app.audit.flush().await;
    result
}

async fn cmd_serve(app: &App, concurrency: Option<usize>) -> anyhow::Result<()> {
    let worker = &app.settings.worker;
    app.queue.listen().await?;

    let handler = TransmutationHandler::new(app.db.clone(), app.audit.clone())
        .with_simulated_work(worker.simulated_work());
    let registry = HandlerRegistry::new().register(TRANSMUTATION_JOB, Arc::new(handler));

    let pool = WorkerPool::new(
        app.queue.clone(),
        Arc::new(registry),
        PoolConfig {
            concurrency: concurrency.unwrap_or(worker.concurrency),
            visibility_timeout: worker.visibility_timeout(),
            poll_interval: worker.poll_interval(),
            max_deliveries: worker.max_deliveries,
        },
    );

    let monitor = Monitor::new(
        app.ledger(),
        app.db.clone(),
        app.db.clone(),
        app.audit.clone(),
        &app.settings.monitor,
    );

    let (p, m) = (pool.clone(), monitor.clone());
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        p.shutdown();
        m.shutdown();
    });

    let (pool_result, ()) = tokio::join!(pool.run(), monitor.run());
    pool_result?;
    Ok(())
}

async fn cmd_material(app: &App, action: MaterialAction, actor: Actor) -> anyhow::Result<()> {
    let ledger = app.ledger();
    match action {
        MaterialAction::Create {
            name,
            unit,
            quantity,
        } => {
            let material = ledger.create(NewMaterial::new(name, unit, quantity)).await?;
            println!("Created: {} ({})", material.id, material.name);
        }
        MaterialAction::List { query, limit } => {
            let materials = ledger.list(&MaterialFilter { query }, limit).await?;
            if materials.is_empty() {
                println!("No materials found.");
                return Ok(());
            }
            println!("{:<36}  {:<24}  {:>14}  UNIT", "ID", "NAME", "QUANTITY");
            println!("{}", "-".repeat(90));
            for m in &materials {
                println!("{:<36}  {:<24}  {:>14.3}  {}", m.id, m.name, m.quantity, m.unit);
            }
            println!("\n{} material(s)", materials.len());
        }
        MaterialAction::Show { id } => {
            let m = ledger.get(id).await?;
            println!("ID:         {}", m.id);
            println!("Name:       {}", m.name);
            println!("Quantity:   {:.3} {}", m.quantity, m.unit);
            println!("Created:    {}", m.created_at);
            println!("Updated:    {}", m.updated_at);
        }
        MaterialAction::Adjust { id, delta, reason } => {
            let m = ledger.adjust(id, delta, &reason, actor).await?;
            println!("{}: {:.3} {}", m.name, m.quantity, m.unit);
        }
        MaterialAction::Rename { id, name, unit } => {
            let m = ledger.rename(id, MaterialRename { name, unit }, actor).await?;
            println!("Renamed: {} ({}, {})", m.id, m.name, m.unit);
        }
        MaterialAction::Delete { id } => {
            ledger.delete(id).await?;
            println!("Deleted: {id}");
        }
    }
    Ok(())
}

async fn cmd_transmutation(app: &App, action: TransmutationAction) -> anyhow::Result<()> {
    let service = app.transmutations();
    match action {
        TransmutationAction::Create {
            name,
            cost,
            description,
        } => {
            let t = service
                .create(NewTransmutation::new(name, cost).description(description))
                .await?;
            println!("Created: {} (state: {})", t.id, t.state);
        }
        TransmutationAction::List { state, limit } => {
            let items = service.list(state, limit).await?;
            if items.is_empty() {
                println!("No transmutations found.");
                return Ok(());
            }
            println!(
                "{:<36}  {:<24}  {:>10}  {:<10}  CREATED",
                "ID", "NAME", "COST", "STATE"
            );
            println!("{}", "-".repeat(100));
            for t in &items {
                println!(
                    "{:<36}  {:<24}  {:>10.2}  {:<10}  {}",
                    t.id,
                    t.name,
                    t.cost,
                    t.state,
                    t.created_at.format("%Y-%m-%d %H:%M")
                );
            }
            println!("\n{} transmutation(s)", items.len());
        }
        TransmutationAction::Show { id } => {
            let t = service.get(id).await?;
            println!("ID:          {}", t.id);
            println!("Name:        {}", t.name);
            println!("Description: {}", t.description);
            println!("Cost:        {:.2}", t.cost);
            println!("State:       {}", t.state);
            if !t.result.is_empty() {
                println!("Result:      {}", t.result);
            }
            println!("Created:     {}", t.created_at);
            if let Some(resolved) = t.resolved_at {
                println!("Resolved:    {resolved}");
            }
        }
        TransmutationAction::Requeue { id } => {
            let msg_id = service.requeue(id).await?;
            println!("Requeued: {id} (message {msg_id})");
        }
    }
    Ok(())
}

async fn cmd_alchemist(app: &App, action: AlchemistAction) -> anyhow::Result<()> {
    let service = app.missions();
    match action {
        AlchemistAction::Create {
            name,
            rank,
            specialty,
        } => {
            let a = service
                .register_alchemist(NewAlchemist::new(name).rank(rank).specialty(specialty))
                .await?;
            println!("Registered: {} ({})", a.id, a.name);
        }
        AlchemistAction::List { limit } => {
            let roster = service.list_alchemists(limit).await?;
            if roster.is_empty() {
                println!("No alchemists registered.");
                return Ok(());
            }
            println!("{:<36}  {:<24}  {:<12}  SPECIALTY", "ID", "NAME", "RANK");
            println!("{}", "-".repeat(90));
            for a in &roster {
                println!("{:<36}  {:<24}  {:<12}  {}", a.id, a.name, a.rank, a.specialty);
            }
            println!("\n{} alchemist(s)", roster.len());
        }
    }
    Ok(())
}

async fn cmd_mission(app: &App, action: MissionAction, actor: Actor) -> anyhow::Result<()> {
    let service = app.missions();
    match action {
        MissionAction::Create {
            title,
            description,
            priority,
            alchemist,
            materials,
        } => {
            let mut new = NewMission::new(title)
                .description(description)
                .priority(priority)
                .materials(materials);
            if let Some(alchemist) = alchemist {
                new = new.alchemist(alchemist);
            }
            let mission = service.create(new).await?;
            println!("Created: {} (state: {})", mission.id, mission.state);
        }
        MissionAction::List { limit } => {
            let missions = service.list(limit).await?;
            if missions.is_empty() {
                println!("No missions found.");
                return Ok(());
            }
            println!(
                "{:<36}  {:<28}  {:<6}  {:<11}  ALCHEMIST",
                "ID", "TITLE", "PRI", "STATE"
            );
            println!("{}", "-".repeat(100));
            for m in &missions {
                let alchemist = match m.alchemist {
                    Some(id) => service.get_alchemist(id).await?.name,
                    None => "-".to_string(),
                };
                println!(
                    "{:<36}  {:<28}  {:<6}  {:<11}  {}",
                    m.id, m.title, m.priority, m.state, alchemist
                );
            }
            println!("\n{} mission(s)", missions.len());
        }
        MissionAction::Update { id, state, report } => {
            let update = MissionUpdate {
                state,
                final_report: report,
            };
            let mission = service.update(id, update, actor).await?;
            println!("Updated: {} (state: {})", mission.id, mission.state);
        }
    }
    Ok(())
}

async fn cmd_audit(app: &App, action: AuditAction, actor: Actor) -> anyhow::Result<()> {
    match action {
        AuditAction::Record {
            action,
            entity,
            detail,
        } => {
            app.audit.submit(actor, &action, &entity, detail).await?;
            println!("Recorded: {action} on {entity}");
        }
        AuditAction::List { limit } => {
            let events = app.db.list_audit(limit).await?;
            if events.is_empty() {
                println!("No audit events.");
                return Ok(());
            }
            for e in &events {
                println!(
                    "{}  {:<36}  {:<22}  {:<13}  {}",
                    e.recorded_at.format("%Y-%m-%d %H:%M:%S"),
                    e.actor,
                    e.action,
                    e.entity,
                    e.detail
                );
            }
        }
    }
    Ok(())
}
