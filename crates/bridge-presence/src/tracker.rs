use std::collections::{HashMap, HashSet};

use bridge_core::model::{ActivitySnapshot, AgentStatus, AgentStatusUpdate, PresenceSnapshot};
use serde_json::json;

use crate::normalize::{agent_id_from_session_key, normalize_agent_id};

/// Reconciles presence snapshots, recent activity, and operator overrides
/// into per-agent status updates.
#[derive(Debug)]
pub struct PresenceTracker {
    busy_window_ms: u64,
    presence_agents: HashSet<String>,
    recent_activity: HashMap<String, ActivitySnapshot>,
    paused_agents: HashSet<String>,
}

impl PresenceTracker {
    pub fn new(busy_window_ms: u64) -> Self {
        Self {
            busy_window_ms,
            presence_agents: HashSet::new(),
            recent_activity: HashMap::new(),
            paused_agents: HashSet::new(),
        }
    }

    pub fn is_paused(&self, agent_id: &str) -> bool {
        self.paused_agents.contains(agent_id)
    }

    pub fn pause(&mut self, agent_id: &str) {
        self.paused_agents.insert(agent_id.to_string());
    }

    pub fn clear_pause(&mut self, agent_id: &str) {
        self.paused_agents.remove(agent_id);
    }

    /// Resolves the status an agent should currently report, per the
    /// `paused > busy > online` priority.
    pub fn resolve_status(&self, agent_id: &str, now_ms: u64) -> AgentStatus {
        if self.paused_agents.contains(agent_id) {
            return AgentStatus::Paused;
        }
        if let Some(activity) = self.recent_activity.get(agent_id) {
            if now_ms.saturating_sub(activity.last_activity_ms) <= self.busy_window_ms {
                return AgentStatus::Busy;
            }
        }
        AgentStatus::Online
    }

    /// Records activity for `agent_id`. Any live activity clears a paused
    /// override, per the invariant that pause does not survive renewed use.
    pub fn track_session_activity(&mut self, agent_id: &str, now_ms: u64, session_key: Option<String>) {
        self.recent_activity.insert(
            agent_id.to_string(),
            ActivitySnapshot {
                last_activity_ms: now_ms,
                session_key,
            },
        );
        self.paused_agents.remove(agent_id);
    }

    /// Marks every currently-present agent `offline`, clearing presence.
    pub fn apply_disconnect(&mut self, now_ms: u64) -> Vec<AgentStatusUpdate> {
        let updates = self
            .presence_agents
            .iter()
            .map(|agent_id| AgentStatusUpdate {
                agent_id: agent_id.clone(),
                status: AgentStatus::Offline,
                last_seen: now_ms,
                session_info: Some(json!({"reason": "gateway_disconnected"})),
            })
            .collect();
        self.presence_agents.clear();
        updates
    }

    /// Reconciles a presence snapshot against the previously-known set of
    /// present agents, returning status updates for both the newly-present
    /// agents and any agent that dropped out of this snapshot.
    pub fn apply_presence_snapshot(
        &mut self,
        snapshot: &PresenceSnapshot,
        now_ms: u64,
        aliases: &HashMap<String, String>,
    ) -> Vec<AgentStatusUpdate> {
        let mut present = HashSet::new();
        let mut updates = Vec::new();

        for entry in &snapshot.entries {
            let raw_id = entry
                .session_key
                .as_deref()
                .and_then(agent_id_from_session_key)
                .or_else(|| entry.agent_id.clone())
                .unwrap_or_else(|| entry.device_id.clone());
            let agent_id = normalize_agent_id(&raw_id, aliases);
            present.insert(agent_id.clone());

            let status = self.resolve_status(&agent_id, now_ms);
            updates.push(AgentStatusUpdate {
                agent_id,
                status,
                last_seen: now_ms,
                session_info: entry
                    .session_key
                    .as_ref()
                    .map(|key| json!({"sessionKey": key})),
            });
        }

        for stale in self.presence_agents.difference(&present) {
            updates.push(AgentStatusUpdate {
                agent_id: stale.clone(),
                status: AgentStatus::Offline,
                last_seen: now_ms,
                session_info: None,
            });
        }

        self.presence_agents = present;
        updates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_core::model::PresenceEntry;

    fn snapshot(entries: Vec<PresenceEntry>) -> PresenceSnapshot {
        PresenceSnapshot {
            entries,
            observed_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn unit_resolve_status_defaults_to_online() {
        let tracker = PresenceTracker::new(120_000);
        assert_eq!(tracker.resolve_status("agent_1", 1_000), AgentStatus::Online);
    }

    #[test]
    fn functional_resolve_status_busy_within_activity_window() {
        let mut tracker = PresenceTracker::new(120_000);
        tracker.track_session_activity("agent_1", 1_000, None);
        assert_eq!(tracker.resolve_status("agent_1", 60_000), AgentStatus::Busy);
        assert_eq!(tracker.resolve_status("agent_1", 200_000), AgentStatus::Online);
    }

    #[test]
    fn regression_p5_pause_survives_until_activity() {
        let mut tracker = PresenceTracker::new(120_000);
        tracker.pause("agent_1");
        assert_eq!(tracker.resolve_status("agent_1", 1_000), AgentStatus::Paused);
        tracker.track_session_activity("agent_1", 2_000, None);
        assert_eq!(tracker.resolve_status("agent_1", 2_000), AgentStatus::Busy);
    }

    #[test]
    fn regression_p4_snapshot_marks_missing_agents_offline_exactly_once() {
        let mut tracker = PresenceTracker::new(120_000);
        let first = snapshot(vec![PresenceEntry {
            device_id: "dev1".into(),
            agent_id: Some("agent_1".into()),
            ..Default::default()
        }]);
        tracker.apply_presence_snapshot(&first, 1_000, &HashMap::new());

        let second = snapshot(vec![]);
        let updates = tracker.apply_presence_snapshot(&second, 2_000, &HashMap::new());
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].agent_id, "agent_1");
        assert_eq!(updates[0].status, AgentStatus::Offline);

        // Re-applying the same empty snapshot should not emit another offline
        // update for an agent no longer tracked as present.
        let updates_again = tracker.apply_presence_snapshot(&second, 3_000, &HashMap::new());
        assert!(updates_again.is_empty());
    }

    #[test]
    fn functional_apply_disconnect_clears_presence_and_emits_offline() {
        let mut tracker = PresenceTracker::new(120_000);
        let snap = snapshot(vec![
            PresenceEntry {
                device_id: "dev1".into(),
                agent_id: Some("agent_1".into()),
                ..Default::default()
            },
            PresenceEntry {
                device_id: "dev2".into(),
                agent_id: Some("agent_2".into()),
                ..Default::default()
            },
        ]);
        tracker.apply_presence_snapshot(&snap, 1_000, &HashMap::new());
        let updates = tracker.apply_disconnect(2_000);
        assert_eq!(updates.len(), 2);
        assert!(updates.iter().all(|u| u.status == AgentStatus::Offline));
        assert!(tracker.apply_disconnect(3_000).is_empty());
    }

    #[test]
    fn functional_apply_presence_snapshot_derives_agent_id_from_session_key() {
        let mut tracker = PresenceTracker::new(120_000);
        let snap = snapshot(vec![PresenceEntry {
            device_id: "dev1".into(),
            session_key: Some("agent:agent_alpha:main".into()),
            ..Default::default()
        }]);
        let updates = tracker.apply_presence_snapshot(&snap, 1_000, &HashMap::new());
        assert_eq!(updates[0].agent_id, "agent_alpha");
    }
}
