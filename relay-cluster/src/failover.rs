//! Session failover - move sessions off a node that went offline
//!
//! Ownership moves synchronously: the failing node's session map is drained
//! in one step and every session is attached to the replacement before any
//! I/O happens. Reconnecting and resuming playback then runs as one task per
//! session, so a slow or failing guild cannot hold up the others.

use crate::error::{RelayError, Result};
use crate::hooks::panic_message;
use crate::node::Node;
use crate::session::{ChannelId, GuildId, Session, Track, VoiceBridge};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Outcome of a failover run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailoverReport {
    /// Guilds whose ownership moved to the replacement node
    pub migrated: Vec<GuildId>,
    /// Guilds whose playback was restarted on the replacement node
    pub resumed: Vec<GuildId>,
    /// Guilds whose reconnect/resume sequence failed
    pub failed: Vec<GuildId>,
}

impl FailoverReport {
    pub fn is_empty(&self) -> bool {
        self.migrated.is_empty()
    }
}

/// Playback state captured before the voice connection is released
#[derive(Debug, Clone)]
struct Playback {
    playing: bool,
    track: Option<Track>,
    position: u64,
    channel_id: Option<ChannelId>,
}

impl Playback {
    fn capture(session: &dyn Session) -> Self {
        Self {
            playing: session.is_playing(),
            track: session.current_track(),
            position: session.position(),
            channel_id: session.channel_id(),
        }
    }
}

/// Move every session hosted on `from` to `to`.
pub async fn migrate_sessions(
    from: &Arc<Node>,
    to: &Arc<Node>,
    voice: Arc<dyn VoiceBridge>,
) -> FailoverReport {
    if Arc::ptr_eq(from, to) {
        warn!("Refusing to fail node {} over to itself", from);
        return FailoverReport::default();
    }

    let sessions = from.sessions().drain();
    if sessions.is_empty() {
        debug!("Node {} has no sessions to fail over", from);
        return FailoverReport::default();
    }

    info!(
        "Failing over {} sessions from node {} to node {}",
        sessions.len(),
        from,
        to
    );

    let mut report = FailoverReport::default();
    let mut tasks = JoinSet::new();

    for session in sessions {
        let guild_id = session.guild_id();
        let playback = Playback::capture(session.as_ref());

        session.attach(to);
        to.sessions().insert(Arc::clone(&session));
        report.migrated.push(guild_id);

        let voice = Arc::clone(&voice);
        tasks.spawn(async move {
            let outcome = AssertUnwindSafe(resume(session.as_ref(), voice.as_ref(), playback))
                .catch_unwind()
                .await;
            (guild_id, outcome)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((guild_id, Ok(Ok(true)))) => report.resumed.push(guild_id),
            Ok((_, Ok(Ok(false)))) => {}
            Ok((guild_id, Ok(Err(e)))) => {
                warn!(
                    "Failed to resume guild {} on node {} after failover: {}",
                    guild_id, to, e
                );
                report.failed.push(guild_id);
            }
            Ok((guild_id, Err(panic))) => {
                warn!(
                    "Resuming guild {} on node {} panicked: {}",
                    guild_id,
                    to,
                    panic_message(panic.as_ref())
                );
                report.failed.push(guild_id);
            }
            Err(e) => warn!("Failover task did not complete: {}", e),
        }
    }

    report.resumed.sort_unstable();
    report.failed.sort_unstable();

    info!(
        "Failover from node {} finished: {} migrated, {} resumed, {} failed",
        from,
        report.migrated.len(),
        report.resumed.len(),
        report.failed.len()
    );
    report
}

/// Release the old voice connection and restart playback where it stopped.
///
/// Returns whether playback was resumed.
async fn resume(session: &dyn Session, voice: &dyn VoiceBridge, playback: Playback) -> Result<bool> {
    let guild_id = session.guild_id();

    if let Err(e) = voice.disconnect(guild_id).await {
        warn!("Could not release voice connection for guild {}: {}", guild_id, e);
    }

    if !playback.playing {
        return Ok(false);
    }

    let channel_id = playback.channel_id.ok_or_else(|| {
        RelayError::Session(format!("guild {} has no voice channel to rejoin", guild_id))
    })?;

    session.connect(channel_id).await?;
    if let Some(track) = playback.track {
        session.queue_front(track);
    }
    session.play().await?;
    session.seek(playback.position).await?;
    Ok(true)
}
