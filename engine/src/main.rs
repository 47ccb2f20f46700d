use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use cortex_agent::AgentRuntime;
use cortex_bus::{Handler, HandlerResult, InMemoryBus, MessageBus};
use cortex_config::CortexConfig;
use cortex_cos::{ChiefOfStaff, CosConfig, DecompositionExecutor, NaiveDecompositionProvider, PersonaConfig};
use cortex_refcode::{FileSequenceStore, ReferenceCodeGenerator};
use cortex_registries::{
    AgentRegistry, AuthorityRegistry, ContextRegistry, DelegationRegistry, FileContextStore,
    PendingPlanRegistry, RetryCounterRegistry, WorkflowRegistry,
};
use cortex_skills::PipelineRunner;
use cortex_supervision::{SupervisionConfig, SupervisionService};
use cortex_types::envelope::EnvelopeContext;
use cortex_types::{Message, MessageEnvelope, Priority, Skill};
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "cortex-engine")]
#[command(about = "Headless multi-agent orchestration runtime")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Starts the Chief of Staff and the supervision sweep and runs until
    /// interrupted.
    Serve {
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        state_dir: Option<PathBuf>,
    },
    /// Submits a single goal to the Chief of Staff and prints the
    /// assembled reply.
    Run {
        goal: String,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        state_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { config, state_dir } => {
            let config = CortexConfig::load(config.as_deref(), state_dir).await?;
            let runtime = build_runtime(&config).await?;
            info!(state_dir = %config.state_dir.display(), "cortex-engine serving");

            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for shutdown signal")?;

            info!("shutting down");
            runtime.supervision.stop().await;
            runtime.agent_runtime.stop_all().await;
        }
        Command::Run { goal, config, state_dir } => {
            let config = CortexConfig::load(config.as_deref(), state_dir).await?;
            let runtime = build_runtime(&config).await?;

            let sink = Arc::new(Mutex::new(None));
            runtime
                .bus
                .start_consuming("engine.oneshot", Arc::new(ReplyCapture(sink.clone())))
                .await?;

            let request = MessageEnvelope {
                message: Message::TaskRequest {
                    message_id: Uuid::new_v4(),
                    correlation_id: None,
                    timestamp: chrono::Utc::now(),
                    content: goal,
                },
                reference_code: runtime.refcode_generator.generate().await?,
                authority_claims: vec![],
                context: EnvelopeContext {
                    reply_to: Some("engine.oneshot".to_string()),
                    ..Default::default()
                },
                priority: Priority::Normal,
                sla: None,
            };
            runtime.bus.publish(request, "agent.cos").await?;

            let reply = wait_for_reply(&sink).await;
            match reply {
                Some(Message::TaskReply { content, .. }) => println!("{content}"),
                Some(other) => println!("{other:?}"),
                None => println!("no reply received within the timeout"),
            }

            runtime.supervision.stop().await;
            runtime.agent_runtime.stop_all().await;
        }
    }

    Ok(())
}

struct ReplyCapture(Arc<Mutex<Option<Message>>>);

#[async_trait::async_trait]
impl Handler for ReplyCapture {
    async fn handle(&self, envelope: MessageEnvelope) -> HandlerResult {
        *self.0.lock().await = Some(envelope.message);
        Ok(())
    }
}

async fn wait_for_reply(sink: &Arc<Mutex<Option<Message>>>) -> Option<Message> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
    while tokio::time::Instant::now() < deadline {
        if let Some(message) = sink.lock().await.take() {
            return Some(message);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    None
}

struct Runtime {
    bus: Arc<dyn MessageBus>,
    refcode_generator: Arc<ReferenceCodeGenerator>,
    agent_runtime: AgentRuntime,
    supervision: Arc<SupervisionService>,
}

/// Wires up one process's worth of the runtime: the bus, every registry,
/// a Chief of Staff running the naive decomposition pipeline, and the
/// supervision sweep. Grounded on the teacher's `build_state` — one
/// function assembling every shared component before anything starts
/// consuming.
async fn build_runtime(config: &CortexConfig) -> anyhow::Result<Runtime> {
    let bus: Arc<dyn MessageBus> = Arc::new(InMemoryBus::new());
    let refcode_generator = Arc::new(ReferenceCodeGenerator::new(Arc::new(FileSequenceStore::new(
        config.refcode_path(),
    ))));

    let agent_registry = AgentRegistry::new();
    let delegation_registry = DelegationRegistry::new();
    let workflow_registry = WorkflowRegistry::new();
    let pending_plan_registry = PendingPlanRegistry::new();
    let retry_registry = RetryCounterRegistry::new();
    let context_registry = ContextRegistry::new(Arc::new(FileContextStore::new(config.context_dir())));
    let authority_registry = AuthorityRegistry::new();

    let mut skill_runner = PipelineRunner::new();
    skill_runner.register(Arc::new(DecompositionExecutor::new(Arc::new(
        NaiveDecompositionProvider,
    ))));

    let persona = PersonaConfig {
        agent_id: "cos".to_string(),
        name: "Chief of Staff".to_string(),
        capabilities: vec![],
        pipeline: vec![Skill {
            id: "decompose".to_string(),
            executor_type: "decomposition".to_string(),
            category: None,
        }],
        escalation_target: config.escalation_target.clone(),
        model_tier: None,
    };

    let cos_config = CosConfig {
        confidence_threshold: config.confidence_threshold,
        max_retries: config.max_retries,
        context_registry: Some(context_registry),
        authority_registry: Some(authority_registry),
    };

    let chief_of_staff = Arc::new(ChiefOfStaff::new(
        persona,
        cos_config,
        bus.clone(),
        refcode_generator.clone(),
        agent_registry.clone(),
        delegation_registry.clone(),
        workflow_registry.clone(),
        pending_plan_registry,
        retry_registry.clone(),
        skill_runner,
    ));

    let agent_runtime = AgentRuntime::new(bus.clone(), agent_registry.clone(), None);
    agent_runtime.start_agent(chief_of_staff, None, None).await;

    let supervision = SupervisionService::new(
        bus.clone(),
        delegation_registry,
        retry_registry,
        agent_runtime.clone(),
        SupervisionConfig {
            tick_interval: Duration::from_secs(config.supervision_interval_seconds),
            max_retries: config.max_retries,
            cos_agent_id: "cos".to_string(),
            escalation_target: config.escalation_target.clone(),
        },
    );
    supervision.start().await;

    Ok(Runtime {
        bus,
        refcode_generator,
        agent_runtime,
        supervision,
    })
}
