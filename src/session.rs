//! Session persistence: the repository contract (spec.md §6) plus a
//! reference file-backed implementation (spec.md §4.7).
//!
//! No concrete provider adapter lives in this crate, and likewise no
//! database-backed `SessionRepository` — the reference implementation here
//! is deliberately a thin `std::fs`/`tokio::fs` layer, matching the base's
//! preference for direct filesystem use over a persistence crate.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::types::Message;

/// A session record: top-level metadata plus whatever a caller wants to
/// stash (e.g. a conversation manager's `get_state()` output).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub created_at: String,
    pub data: Value,
}

/// An agent record within a session: identity plus conversation-manager
/// restoration state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub agent_id: String,
    pub created_at: String,
    pub conversation_state: Value,
}

/// A persisted message, addressed by a monotone integer index per agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub index: u64,
    pub created_at: String,
    pub message: Message,
}

/// The session-repository contract (spec.md §6). Implementors must reject
/// identifiers containing path separators ([`Error::InvalidIdentifier`]) and
/// preserve `created_at` across updates.
///
/// Multi-agent records (`create_multi_agent`/`read_multi_agent`/
/// `update_multi_agent`) track which agent ids participate in a session
/// that coordinates more than one agent; the core does not otherwise
/// interpret this beyond persisting it.
#[async_trait::async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create_session(&self, session_id: &str, data: Value) -> Result<SessionRecord>;
    async fn read_session(&self, session_id: &str) -> Result<SessionRecord>;
    async fn delete_session(&self, session_id: &str) -> Result<()>;

    async fn create_agent(&self, session_id: &str, agent_id: &str) -> Result<AgentRecord>;
    async fn read_agent(&self, session_id: &str, agent_id: &str) -> Result<AgentRecord>;
    async fn update_agent(
        &self,
        session_id: &str,
        agent_id: &str,
        conversation_state: Value,
    ) -> Result<AgentRecord>;

    async fn create_message(
        &self,
        session_id: &str,
        agent_id: &str,
        message: Message,
    ) -> Result<MessageRecord>;
    async fn read_message(
        &self,
        session_id: &str,
        agent_id: &str,
        index: u64,
    ) -> Result<MessageRecord>;
    async fn update_message(
        &self,
        session_id: &str,
        agent_id: &str,
        index: u64,
        message: Message,
    ) -> Result<MessageRecord>;
    async fn list_messages(
        &self,
        session_id: &str,
        agent_id: &str,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<MessageRecord>>;

    async fn create_multi_agent(&self, session_id: &str, agent_ids: Vec<String>) -> Result<Value>;
    async fn read_multi_agent(&self, session_id: &str) -> Result<Value>;
    async fn update_multi_agent(&self, session_id: &str, agent_ids: Vec<String>) -> Result<Value>;
}

/// Rejects identifiers containing a path separator or `..`, so a caller-
/// supplied session/agent id can never escape the repository root.
fn validate_identifier(id: &str) -> Result<()> {
    if id.is_empty() || id.contains('/') || id.contains('\\') || id.contains("..") {
        return Err(Error::invalid_identifier(id));
    }
    Ok(())
}

fn now_rfc3339() -> String {
    // No wall-clock dependency in this crate beyond what the caller already
    // pulls in for its own timestamps; a file-backed repository only needs
    // *a* stable string, not a specific clock source.
    humantime_like_timestamp()
}

/// A monotonically-nondecreasing, human-readable timestamp derived from
/// `std::time::SystemTime`, avoiding a dependency on a time-formatting
/// crate the rest of the core has no other use for.
fn humantime_like_timestamp() -> String {
    let duration = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}.{:09}", duration.as_secs(), duration.subsec_nanos())
}

/// Reference file-backed [`SessionRepository`]: one JSON file per message
/// under `session_<id>/agents/agent_<id>/messages/message_<N>.json`, one per
/// agent record, one per session record, all written atomically via a
/// `<path>.tmp` + rename.
pub struct FileSessionRepository {
    root: PathBuf,
}

impl FileSessionRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn session_dir(&self, session_id: &str) -> PathBuf {
        self.root.join(format!("session_{session_id}"))
    }

    fn session_file(&self, session_id: &str) -> PathBuf {
        self.session_dir(session_id).join("session.json")
    }

    fn agent_dir(&self, session_id: &str, agent_id: &str) -> PathBuf {
        self.session_dir(session_id)
            .join("agents")
            .join(format!("agent_{agent_id}"))
    }

    fn agent_file(&self, session_id: &str, agent_id: &str) -> PathBuf {
        self.agent_dir(session_id, agent_id).join("agent.json")
    }

    fn messages_dir(&self, session_id: &str, agent_id: &str) -> PathBuf {
        self.agent_dir(session_id, agent_id).join("messages")
    }

    fn message_file(&self, session_id: &str, agent_id: &str, index: u64) -> PathBuf {
        self.messages_dir(session_id, agent_id)
            .join(format!("message_{index}.json"))
    }

    fn multi_agent_file(&self, session_id: &str) -> PathBuf {
        self.session_dir(session_id).join("multi_agent.json")
    }

    /// Serialize `value` and write it to `path` atomically: write to
    /// `<path>.tmp`, then rename over the final path. The rename is the
    /// commit point — a reader never observes a partially-written file.
    async fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::session(format!("creating {}: {e}", parent.display())))?;
        }
        let body = serde_json::to_vec_pretty(value)?;
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &body)
            .await
            .map_err(|e| Error::session(format!("writing {}: {e}", tmp_path.display())))?;
        tokio::fs::rename(&tmp_path, path)
            .await
            .map_err(|e| Error::session(format!("renaming into {}: {e}", path.display())))?;
        Ok(())
    }

    async fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
        let body = tokio::fs::read(path)
            .await
            .map_err(|_| Error::not_found(path.display().to_string()))?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait::async_trait]
impl SessionRepository for FileSessionRepository {
    async fn create_session(&self, session_id: &str, data: Value) -> Result<SessionRecord> {
        validate_identifier(session_id)?;
        let record = SessionRecord {
            session_id: session_id.to_string(),
            created_at: now_rfc3339(),
            data,
        };
        Self::write_atomic(&self.session_file(session_id), &record).await?;
        Ok(record)
    }

    async fn read_session(&self, session_id: &str) -> Result<SessionRecord> {
        validate_identifier(session_id)?;
        Self::read_json(&self.session_file(session_id)).await
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        validate_identifier(session_id)?;
        let dir = self.session_dir(session_id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::not_found(session_id.to_string()))
            }
            Err(e) => Err(Error::session(format!("deleting {}: {e}", dir.display()))),
        }
    }

    async fn create_agent(&self, session_id: &str, agent_id: &str) -> Result<AgentRecord> {
        validate_identifier(session_id)?;
        validate_identifier(agent_id)?;
        let record = AgentRecord {
            agent_id: agent_id.to_string(),
            created_at: now_rfc3339(),
            conversation_state: Value::Null,
        };
        Self::write_atomic(&self.agent_file(session_id, agent_id), &record).await?;
        Ok(record)
    }

    async fn read_agent(&self, session_id: &str, agent_id: &str) -> Result<AgentRecord> {
        validate_identifier(session_id)?;
        validate_identifier(agent_id)?;
        Self::read_json(&self.agent_file(session_id, agent_id)).await
    }

    async fn update_agent(
        &self,
        session_id: &str,
        agent_id: &str,
        conversation_state: Value,
    ) -> Result<AgentRecord> {
        validate_identifier(session_id)?;
        validate_identifier(agent_id)?;
        let existing: AgentRecord = self.read_agent(session_id, agent_id).await?;
        let record = AgentRecord {
            agent_id: agent_id.to_string(),
            created_at: existing.created_at,
            conversation_state,
        };
        Self::write_atomic(&self.agent_file(session_id, agent_id), &record).await?;
        Ok(record)
    }

    async fn create_message(
        &self,
        session_id: &str,
        agent_id: &str,
        message: Message,
    ) -> Result<MessageRecord> {
        validate_identifier(session_id)?;
        validate_identifier(agent_id)?;
        let dir = self.messages_dir(session_id, agent_id);
        let next_index = match tokio::fs::read_dir(&dir).await {
            Ok(mut entries) => {
                let mut max = None;
                while let Ok(Some(entry)) = entries.next_entry().await {
                    if let Some(idx) = parse_message_index(&entry.file_name()) {
                        max = Some(max.map_or(idx, |m: u64| m.max(idx)));
                    }
                }
                max.map(|m| m + 1).unwrap_or(0)
            }
            Err(_) => 0,
        };
        let record = MessageRecord {
            index: next_index,
            created_at: now_rfc3339(),
            message,
        };
        Self::write_atomic(
            &self.message_file(session_id, agent_id, next_index),
            &record,
        )
        .await?;
        Ok(record)
    }

    async fn read_message(
        &self,
        session_id: &str,
        agent_id: &str,
        index: u64,
    ) -> Result<MessageRecord> {
        validate_identifier(session_id)?;
        validate_identifier(agent_id)?;
        Self::read_json(&self.message_file(session_id, agent_id, index)).await
    }

    async fn update_message(
        &self,
        session_id: &str,
        agent_id: &str,
        index: u64,
        message: Message,
    ) -> Result<MessageRecord> {
        validate_identifier(session_id)?;
        validate_identifier(agent_id)?;
        let existing = self.read_message(session_id, agent_id, index).await?;
        let record = MessageRecord {
            index,
            created_at: existing.created_at,
            message,
        };
        Self::write_atomic(&self.message_file(session_id, agent_id, index), &record).await?;
        Ok(record)
    }

    async fn list_messages(
        &self,
        session_id: &str,
        agent_id: &str,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<MessageRecord>> {
        validate_identifier(session_id)?;
        validate_identifier(agent_id)?;
        let dir = self.messages_dir(session_id, agent_id);
        let mut indices = Vec::new();
        if let Ok(mut entries) = tokio::fs::read_dir(&dir).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                if let Some(idx) = parse_message_index(&entry.file_name()) {
                    indices.push(idx);
                }
            }
        }
        indices.sort_unstable();

        let offset = offset.unwrap_or(0);
        let mut selected = indices.into_iter().skip(offset);
        let mut records = Vec::new();
        loop {
            if let Some(limit) = limit {
                if records.len() >= limit {
                    break;
                }
            }
            let Some(idx) = selected.next() else { break };
            records.push(self.read_message(session_id, agent_id, idx).await?);
        }
        Ok(records)
    }

    async fn create_multi_agent(&self, session_id: &str, agent_ids: Vec<String>) -> Result<Value> {
        validate_identifier(session_id)?;
        for id in &agent_ids {
            validate_identifier(id)?;
        }
        let value = serde_json::json!({ "agent_ids": agent_ids });
        Self::write_atomic(&self.multi_agent_file(session_id), &value).await?;
        Ok(value)
    }

    async fn read_multi_agent(&self, session_id: &str) -> Result<Value> {
        validate_identifier(session_id)?;
        Self::read_json(&self.multi_agent_file(session_id)).await
    }

    async fn update_multi_agent(&self, session_id: &str, agent_ids: Vec<String>) -> Result<Value> {
        self.create_multi_agent(session_id, agent_ids).await
    }
}

fn parse_message_index(file_name: &std::ffi::OsStr) -> Option<u64> {
    file_name
        .to_str()?
        .strip_prefix("message_")?
        .strip_suffix(".json")?
        .parse()
        .ok()
}
