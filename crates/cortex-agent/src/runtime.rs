use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use cortex_bus::MessageBus;
use cortex_registries::{AgentRegistry, AuthorityRegistry};
use cortex_types::AuthorityTier;
use tokio::sync::RwLock;

use crate::{Agent, AgentHarness};

/// C6: owns a collection of harnesses keyed by agent id, plus a
/// team-to-members map. Grounded on
/// `tandem-server::agent_teams::AgentTeamRuntime`'s multi-map shape.
#[derive(Clone)]
pub struct AgentRuntime {
    bus: Arc<dyn MessageBus>,
    agent_registry: AgentRegistry,
    authority_registry: Option<AuthorityRegistry>,
    harnesses: Arc<RwLock<HashMap<String, Arc<AgentHarness>>>>,
    teams: Arc<RwLock<HashMap<String, HashSet<String>>>>,
}

impl AgentRuntime {
    pub fn new(
        bus: Arc<dyn MessageBus>,
        agent_registry: AgentRegistry,
        authority_registry: Option<AuthorityRegistry>,
    ) -> Self {
        Self {
            bus,
            agent_registry,
            authority_registry,
            harnesses: Arc::new(RwLock::new(HashMap::new())),
            teams: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn start_agent(
        &self,
        agent: Arc<dyn Agent>,
        team_id: Option<&str>,
        team_ceiling: Option<AuthorityTier>,
    ) {
        let agent_id = agent.id().to_string();
        let harness = AgentHarness::new(
            agent,
            self.bus.clone(),
            self.agent_registry.clone(),
            self.authority_registry.clone(),
            team_ceiling,
        );
        harness.start().await;
        self.harnesses.write().await.insert(agent_id.clone(), harness);

        if let Some(team_id) = team_id {
            self.teams
                .write()
                .await
                .entry(team_id.to_string())
                .or_default()
                .insert(agent_id);
        }
    }

    pub async fn stop_agent(&self, agent_id: &str) {
        if let Some(harness) = self.harnesses.write().await.remove(agent_id) {
            harness.stop().await;
        }
        let mut teams = self.teams.write().await;
        for members in teams.values_mut() {
            members.remove(agent_id);
        }
    }

    pub async fn stop_team(&self, team_id: &str) {
        let members: Vec<String> = self
            .teams
            .read()
            .await
            .get(team_id)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .collect();
        for member in members {
            self.stop_agent(&member).await;
        }
    }

    pub async fn running_agent_ids(&self) -> Vec<String> {
        self.harnesses.read().await.keys().cloned().collect()
    }

    pub async fn team_agent_ids(&self, team_id: &str) -> Vec<String> {
        self.teams
            .read()
            .await
            .get(team_id)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .collect()
    }

    /// Whether a given agent currently has a running harness — consulted
    /// by the supervision service (§4.8) to decide alternate-agent
    /// re-dispatch.
    pub async fn is_running(&self, agent_id: &str) -> bool {
        self.harnesses.read().await.contains_key(agent_id)
    }

    /// Stops every agent; used on host shutdown (§4.6).
    pub async fn stop_all(&self) {
        let ids: Vec<String> = self.running_agent_ids().await;
        for id in ids {
            self.stop_agent(&id).await;
        }
    }
}
